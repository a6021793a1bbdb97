//! Points and integer pixel rectangles

use std::ops::{Add, Mul, Sub};

/// A 2D point or vector in pixel space
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }

    /// Z component of the 3D cross product
    pub fn cross(self, other: Vec2) -> f32 {
        self.x * other.y - self.y * other.x
    }

    pub fn approx_eq(self, other: Vec2, tolerance: f32) -> bool {
        (self.x - other.x).abs() < tolerance && (self.y - other.y).abs() < tolerance
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl From<(f32, f32)> for Vec2 {
    fn from((x, y): (f32, f32)) -> Self {
        Vec2::new(x, y)
    }
}

/// Half-open integer rectangle `[x0, x1) x [y0, y1)` in top-left pixel coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl PixelRect {
    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Rectangle covering a whole `width` x `height` surface
    pub const fn from_size(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn width(&self) -> i32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> i32 {
        self.y1 - self.y0
    }

    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    /// Intersect with `[0, width) x [0, height)`. May return an empty rect.
    pub fn clamp_to(&self, width: i32, height: i32) -> PixelRect {
        PixelRect {
            x0: self.x0.clamp(0, width.max(0)),
            y0: self.y0.clamp(0, height.max(0)),
            x1: self.x1.clamp(0, width.max(0)),
            y1: self.y1.clamp(0, height.max(0)),
        }
    }

    /// Resolve an optional region against a surface: `None` means the whole
    /// surface, anything else is clipped to it. Returns `None` when nothing remains.
    pub fn resolve(region: Option<PixelRect>, width: i32, height: i32) -> Option<PixelRect> {
        let rect = region
            .unwrap_or_else(|| PixelRect::from_size(width, height))
            .clamp_to(width, height);
        (!rect.is_empty()).then_some(rect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_clamp() {
        let r = PixelRect::new(-4, 2, 20, 9).clamp_to(10, 5);
        assert_eq!(r, PixelRect::new(0, 2, 10, 5));
        assert_eq!(r.width(), 10);
        assert_eq!(r.height(), 3);
    }

    #[test]
    fn test_rect_resolve() {
        assert_eq!(
            PixelRect::resolve(None, 4, 3),
            Some(PixelRect::new(0, 0, 4, 3))
        );
        assert_eq!(PixelRect::resolve(Some(PixelRect::new(5, 5, 9, 9)), 4, 3), None);
        assert_eq!(PixelRect::resolve(Some(PixelRect::default()), 4, 3), None);
    }

    #[test]
    fn test_cross() {
        assert_eq!(Vec2::new(1.0, 0.0).cross(Vec2::new(0.0, 1.0)), 1.0);
        assert_eq!(Vec2::new(0.0, 1.0).cross(Vec2::new(1.0, 0.0)), -1.0);
    }
}
