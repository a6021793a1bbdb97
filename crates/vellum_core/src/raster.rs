//! Scanline rasterization for the software backend
//!
//! Rasterizers never touch buffers directly. They report covered pixels
//! through a `plot` callback so callers decide between overwrite and blend.
//! Every entry point takes a clip rectangle and only plots inside it, so the
//! work is bounded by the clip area rather than the shape size.

use crate::geometry::{PixelRect, Vec2};

/// Even-odd scanline fill of a closed polygon outline
pub fn fill_polygon(points: &[Vec2], clip: PixelRect, mut plot: impl FnMut(i32, i32)) {
    if points.len() < 3 || clip.is_empty() {
        return;
    }
    if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return;
    }

    let (min_y, max_y) = points
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p.y), hi.max(p.y))
        });
    let top = min_y.floor().max(clip.y0 as f32);
    let bottom = max_y.ceil().min((clip.y1 - 1) as f32);
    if top > bottom {
        return;
    }

    let mut crossings: Vec<f32> = Vec::with_capacity(8);
    for y in (top as i32)..=(bottom as i32) {
        let fy = y as f32;
        crossings.clear();
        for i in 0..points.len() {
            let p1 = points[i];
            let p2 = points[(i + 1) % points.len()];
            if (p1.y <= fy && fy < p2.y) || (p2.y <= fy && fy < p1.y) {
                crossings.push(p1.x + (fy - p1.y) * (p2.x - p1.x) / (p2.y - p1.y));
            }
        }
        crossings.sort_by(|a, b| a.total_cmp(b));

        for pair in crossings.chunks_exact(2) {
            let left = pair[0].ceil().max(clip.x0 as f32);
            let right = pair[1].floor().min((clip.x1 - 1) as f32);
            if left > right {
                continue;
            }
            for x in (left as i32)..=(right as i32) {
                plot(x, y);
            }
        }
    }
}

/// Liang-Barsky clip of the segment `a`-`b` to the closed box spanned by
/// `bounds`. Returns `None` when no part of the segment is inside.
pub fn clip_segment(a: Vec2, b: Vec2, bounds: PixelRect) -> Option<(Vec2, Vec2)> {
    let (ax, ay) = (a.x as f64, a.y as f64);
    let (dx, dy) = (b.x as f64 - ax, b.y as f64 - ay);
    if !(ax.is_finite() && ay.is_finite() && dx.is_finite() && dy.is_finite()) {
        return None;
    }

    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    let edges = [
        (-dx, ax - bounds.x0 as f64),
        (dx, bounds.x1 as f64 - ax),
        (-dy, ay - bounds.y0 as f64),
        (dy, bounds.y1 as f64 - ay),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            t0 = t0.max(t);
        } else {
            t1 = t1.min(t);
        }
        if t0 > t1 {
            return None;
        }
    }

    let at = |t: f64| Vec2::new((ax + dx * t) as f32, (ay + dy * t) as f32);
    let start = if t0 == 0.0 { a } else { at(t0) };
    let end = if t1 == 1.0 { b } else { at(t1) };
    Some((start, end))
}

/// Bresenham line between integer endpoints, both inclusive.
///
/// The segment is clipped to `clip` first, so endpoints may lie anywhere in
/// the `i32` range.
pub fn draw_line(
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
    clip: PixelRect,
    mut plot: impl FnMut(i32, i32),
) {
    if clip.is_empty() {
        return;
    }
    let from = Vec2::new(x0 as f32, y0 as f32);
    let to = Vec2::new(x1 as f32, y1 as f32);
    let Some((from, to)) = clip_segment(from, to, clip) else {
        return;
    };

    let (x0, y0) = (from.x.round() as i64, from.y.round() as i64);
    let (x1, y1) = (to.x.round() as i64, to.y.round() as i64);
    let dx = (x1 - x0).abs();
    let dy = (y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx - dy;
    let (mut x, mut y) = (x0, y0);

    let cols = clip.x0 as i64..clip.x1 as i64;
    let rows = clip.y0 as i64..clip.y1 as i64;
    loop {
        if cols.contains(&x) && rows.contains(&y) {
            plot(x as i32, y as i32);
        }
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 > -dy {
            err -= dy;
            x += sx;
        }
        if e2 < dx {
            err += dx;
            y += sy;
        }
    }
}

/// Filled disc centred on a pixel: every pixel whose centre distance is at
/// most `radius`, restricted to `clip`
pub fn fill_circle_at(
    cx: i32,
    cy: i32,
    radius: f32,
    clip: PixelRect,
    mut plot: impl FnMut(i32, i32),
) {
    if radius.is_nan() || radius < 0.0 || clip.is_empty() {
        return;
    }
    let reach = radius.ceil().min(i32::MAX as f32) as i64;
    let (cx, cy) = (cx as i64, cy as i64);
    let rows = (cy - reach).max(clip.y0 as i64)..=(cy + reach).min(clip.y1 as i64 - 1);
    let cols = (cx - reach).max(clip.x0 as i64)..=(cx + reach).min(clip.x1 as i64 - 1);
    let r2 = radius as f64 * radius as f64;

    for y in rows {
        let dy = (y - cy) as f64;
        for x in cols.clone() {
            let dx = (x - cx) as f64;
            if dx * dx + dy * dy <= r2 {
                plot(x as i32, y as i32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BIG: PixelRect = PixelRect::new(-100, -100, 100, 100);

    #[test]
    fn test_fill_square_covers_interior() {
        let square = [
            Vec2::new(1.0, 1.0),
            Vec2::new(4.0, 1.0),
            Vec2::new(4.0, 4.0),
            Vec2::new(1.0, 4.0),
        ];
        let mut hits = Vec::new();
        fill_polygon(&square, BIG, |x, y| hits.push((x, y)));
        assert!(hits.contains(&(2, 2)));
        assert!(hits.contains(&(1, 1)));
        assert!(!hits.contains(&(0, 2)));
        assert!(!hits.iter().any(|&(_, y)| y == 4));
    }

    #[test]
    fn test_fill_huge_polygon_stays_in_clip() {
        let huge = [
            Vec2::new(-1e9, -1e9),
            Vec2::new(1e9, -1e9),
            Vec2::new(1e9, 1e9),
            Vec2::new(-1e9, 1e9),
        ];
        let mut hits = Vec::new();
        fill_polygon(&huge, PixelRect::from_size(4, 3), |x, y| hits.push((x, y)));
        assert_eq!(hits.len(), 12);
        assert!(hits.iter().all(|&(x, y)| (0..4).contains(&x) && (0..3).contains(&y)));
    }

    #[test]
    fn test_fill_outside_clip_plots_nothing() {
        let square = [
            Vec2::new(50.0, 50.0),
            Vec2::new(60.0, 50.0),
            Vec2::new(60.0, 60.0),
            Vec2::new(50.0, 60.0),
        ];
        let mut count = 0;
        fill_polygon(&square, PixelRect::from_size(8, 8), |_, _| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_line_endpoints() {
        let mut hits = Vec::new();
        draw_line(0, 0, 5, 2, BIG, |x, y| hits.push((x, y)));
        assert_eq!(hits.first(), Some(&(0, 0)));
        assert_eq!(hits.last(), Some(&(5, 2)));
        assert_eq!(hits.len(), 6);
    }

    #[test]
    fn test_line_across_full_range() {
        let mut hits = Vec::new();
        draw_line(i32::MIN, 0, i32::MAX, 0, PixelRect::from_size(6, 2), |x, y| {
            hits.push((x, y))
        });
        assert_eq!(hits, (0..6).map(|x| (x, 0)).collect::<Vec<_>>());

        let mut count = 0;
        draw_line(i32::MIN, i32::MIN, i32::MIN, i32::MAX, BIG, |_, _| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_clip_segment() {
        let bounds = PixelRect::new(0, 0, 10, 10);
        let (a, b) = clip_segment(Vec2::new(-10.0, 5.0), Vec2::new(20.0, 5.0), bounds).unwrap();
        assert!(a.approx_eq(Vec2::new(0.0, 5.0), 1e-4));
        assert!(b.approx_eq(Vec2::new(10.0, 5.0), 1e-4));

        let inside = (Vec2::new(1.0, 2.0), Vec2::new(3.0, 4.0));
        assert_eq!(clip_segment(inside.0, inside.1, bounds), Some(inside));
        assert!(clip_segment(Vec2::new(-5.0, -1.0), Vec2::new(20.0, -1.0), bounds).is_none());
        assert!(clip_segment(Vec2::new(f32::NAN, 0.0), Vec2::new(1.0, 1.0), bounds).is_none());
    }

    #[test]
    fn test_circle_stamp() {
        let mut count = 0;
        fill_circle_at(0, 0, 1.0, BIG, |_, _| count += 1);
        assert_eq!(count, 5);

        // radius 1.5 reaches the diagonals but not distance 2
        let mut hits = Vec::new();
        fill_circle_at(0, 0, 1.5, BIG, |x, y| hits.push((x, y)));
        assert_eq!(hits.len(), 9);
        assert!(hits.contains(&(1, 1)));
        assert!(!hits.contains(&(0, 2)));
    }

    #[test]
    fn test_circle_clipped() {
        let mut hits = Vec::new();
        fill_circle_at(0, 0, 1e30, PixelRect::from_size(3, 2), |x, y| hits.push((x, y)));
        assert_eq!(hits.len(), 6);
    }
}
