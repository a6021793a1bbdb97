//! Ear-clipping triangulation of simple polygons

use crate::geometry::Vec2;

/// Consecutive points closer than this are merged
const DEDUPE_TOLERANCE: f32 = 1e-4;
/// Vertices whose turn has a smaller cross product are treated as collinear
const COLLINEAR_EPSILON: f32 = 1e-5;
/// Hard cap on clipping iterations. Self-intersecting input stops early
/// and yields whatever triangles were found up to that point.
const MAX_ITERATIONS: usize = 10_000;
/// Indices are 16-bit
const MAX_VERTICES: usize = u16::MAX as usize;

/// Output of [`triangulate_polygon`]: cleaned outline plus triangle indices into it
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Triangulation {
    pub points: Vec<Vec2>,
    pub indices: Vec<u16>,
}

impl Triangulation {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Triangulate a simple polygon given as an outline.
///
/// The outline is cleaned first: near-duplicate neighbours and an explicit
/// closing point are dropped, then collinear vertices are removed. Either
/// winding order is accepted.
pub fn triangulate_polygon(outline: &[Vec2]) -> Triangulation {
    let points = strip_collinear(&dedupe(outline));
    if points.len() < 3 || points.len() > MAX_VERTICES {
        return Triangulation::default();
    }

    let ccw = signed_area(&points) > 0.0;
    let mut remaining: Vec<usize> = (0..points.len()).collect();
    let mut indices = Vec::with_capacity((points.len() - 2) * 3);

    let mut guard = 0;
    while remaining.len() > 2 && guard < MAX_ITERATIONS {
        guard += 1;
        let Some(ear) = find_ear(&points, &remaining, ccw) else {
            break;
        };

        let len = remaining.len();
        let prev = remaining[(ear + len - 1) % len];
        let curr = remaining[ear];
        let next = remaining[(ear + 1) % len];
        indices.extend([prev as u16, curr as u16, next as u16]);
        remaining.remove(ear);
    }

    if remaining.len() > 2 {
        tracing::trace!(
            left = remaining.len(),
            "triangulation stopped before consuming the polygon"
        );
    }

    Triangulation { points, indices }
}

fn find_ear(points: &[Vec2], remaining: &[usize], ccw: bool) -> Option<usize> {
    let len = remaining.len();
    (0..len).find(|&i| {
        let prev = remaining[(i + len - 1) % len];
        let curr = remaining[i];
        let next = remaining[(i + 1) % len];
        let (a, b, c) = (points[prev], points[curr], points[next]);

        is_convex(a, b, c, ccw)
            && !remaining
                .iter()
                .filter(|&&idx| idx != prev && idx != curr && idx != next)
                .any(|&idx| point_in_triangle(points[idx], a, b, c))
    })
}

fn dedupe(outline: &[Vec2]) -> Vec<Vec2> {
    let mut out: Vec<Vec2> = Vec::with_capacity(outline.len());
    for &p in outline {
        if out
            .last()
            .map_or(true, |last| !last.approx_eq(p, DEDUPE_TOLERANCE))
        {
            out.push(p);
        }
    }
    if out.len() > 1 && out[0].approx_eq(out[out.len() - 1], DEDUPE_TOLERANCE) {
        out.pop();
    }
    out
}

fn strip_collinear(points: &[Vec2]) -> Vec<Vec2> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }
    (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let curr = points[i];
            let next = points[(i + 1) % n];
            (curr - prev).cross(next - curr).abs() >= COLLINEAR_EPSILON
        })
        .map(|i| points[i])
        .collect()
}

fn signed_area(points: &[Vec2]) -> f32 {
    let n = points.len();
    let twice: f32 = (0..n)
        .map(|i| points[i].cross(points[(i + 1) % n]))
        .sum();
    twice * 0.5
}

fn is_convex(a: Vec2, b: Vec2, c: Vec2, ccw: bool) -> bool {
    let cross = (b - a).cross(c - b);
    if ccw {
        cross > 0.0
    } else {
        cross < 0.0
    }
}

fn sign(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    (p.x - a.x) * (b.y - a.y) - (b.x - a.x) * (p.y - a.y)
}

fn point_in_triangle(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> bool {
    let b1 = sign(p, a, b) < 0.0;
    let b2 = sign(p, b, c) < 0.0;
    let b3 = sign(p, c, a) < 0.0;
    b1 == b2 && b2 == b3
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular_polygon(n: usize, radius: f32) -> Vec<Vec2> {
        (0..n)
            .map(|i| {
                let angle = i as f32 / n as f32 * std::f32::consts::TAU;
                Vec2::new(radius * angle.cos(), radius * angle.sin())
            })
            .collect()
    }

    #[test]
    fn test_convex_polygon_index_count() {
        for n in 3..=12 {
            let tri = triangulate_polygon(&regular_polygon(n, 10.0));
            assert_eq!(tri.indices.len(), 3 * (n - 2), "n = {n}");
        }
    }

    #[test]
    fn test_collinear_point_is_ignored() {
        let square = [
            Vec2::new(0.0, 0.0),
            Vec2::new(4.0, 0.0),
            Vec2::new(4.0, 4.0),
            Vec2::new(0.0, 4.0),
        ];
        let with_midpoint = [
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(4.0, 0.0),
            Vec2::new(4.0, 4.0),
            Vec2::new(0.0, 4.0),
        ];
        assert_eq!(triangulate_polygon(&square), triangulate_polygon(&with_midpoint));
    }

    #[test]
    fn test_closing_duplicate_and_winding() {
        let cw = [
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 3.0),
            Vec2::new(3.0, 3.0),
            Vec2::new(3.0, 0.0),
            Vec2::new(0.0, 0.0),
        ];
        let tri = triangulate_polygon(&cw);
        assert_eq!(tri.points.len(), 4);
        assert_eq!(tri.triangle_count(), 2);
    }

    #[test]
    fn test_concave_polygon() {
        // L shape: six vertices, four triangles
        let l_shape = [
            Vec2::new(0.0, 0.0),
            Vec2::new(5.0, 0.0),
            Vec2::new(5.0, 2.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(2.0, 4.0),
            Vec2::new(0.0, 4.0),
        ];
        assert_eq!(triangulate_polygon(&l_shape).triangle_count(), 4);
    }

    #[test]
    fn test_degenerate_input() {
        assert!(triangulate_polygon(&[]).is_empty());
        assert!(triangulate_polygon(&[Vec2::ZERO, Vec2::new(1.0, 1.0)]).is_empty());
        let line = [Vec2::ZERO, Vec2::new(1.0, 1.0), Vec2::new(2.0, 2.0)];
        assert!(triangulate_polygon(&line).is_empty());
    }
}
