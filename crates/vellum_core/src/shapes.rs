//! Outline generation for primitive shapes
//!
//! Neither backend has a native rounded-rect or circle primitive; these
//! outlines are triangulated or rasterized like any other polygon.

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use crate::geometry::Vec2;

/// Arc segments per rounded corner
pub const CORNER_SEGMENTS: usize = 8;

/// Outline of a rounded rectangle, clockwise on screen starting at the top-left arc.
///
/// The radius is clamped to half the smaller side.
pub fn rounded_rect_points(x: f32, y: f32, w: f32, h: f32, radius: f32) -> Vec<Vec2> {
    let r = radius.min(w / 2.0).min(h / 2.0).max(0.0);
    let mut points = Vec::with_capacity(4 * (CORNER_SEGMENTS + 1));

    let corners = [
        (Vec2::new(x + r, y + r), PI, 1.5 * PI),
        (Vec2::new(x + w - r, y + r), 1.5 * PI, TAU),
        (Vec2::new(x + w - r, y + h - r), 0.0, FRAC_PI_2),
        (Vec2::new(x + r, y + h - r), FRAC_PI_2, PI),
    ];
    for (center, start, end) in corners {
        arc_points(&mut points, center, r, start, end, CORNER_SEGMENTS);
    }
    points
}

/// Append `segments + 1` points along an arc, both endpoints included
pub fn arc_points(
    out: &mut Vec<Vec2>,
    center: Vec2,
    radius: f32,
    start: f32,
    end: f32,
    segments: usize,
) {
    let segments = segments.max(1);
    for i in 0..=segments {
        let t = start + (end - start) * i as f32 / segments as f32;
        out.push(Vec2::new(
            center.x + radius * t.cos(),
            center.y + radius * t.sin(),
        ));
    }
}

/// Number of segments used for a circle of radius `r`
pub fn circle_segments(r: f32) -> usize {
    ((2.0 * r) as usize).max(16)
}

/// Closed circle outline without a repeated end point
pub fn circle_points(cx: f32, cy: f32, r: f32) -> Vec<Vec2> {
    let segments = circle_segments(r);
    (0..segments)
        .map(|i| {
            let t = i as f32 / segments as f32 * TAU;
            Vec2::new(cx + r * t.cos(), cy + r * t.sin())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circle_segment_count() {
        assert_eq!(circle_points(0.0, 0.0, 2.0).len(), 16);
        assert_eq!(circle_points(0.0, 0.0, 20.0).len(), 40);
    }

    #[test]
    fn test_rounded_rect_bounds() {
        let points = rounded_rect_points(10.0, 20.0, 40.0, 10.0, 100.0);
        assert_eq!(points.len(), 4 * (CORNER_SEGMENTS + 1));
        for p in &points {
            assert!(p.x >= 10.0 - 1e-3 && p.x <= 50.0 + 1e-3);
            assert!(p.y >= 20.0 - 1e-3 && p.y <= 30.0 + 1e-3);
        }
        // first point is the left end of the top-left arc
        assert!(points[0].approx_eq(Vec2::new(10.0, 25.0), 1e-4));
    }
}
