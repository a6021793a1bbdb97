//! Path operations and curve flattening

use smallvec::SmallVec;

use crate::geometry::Vec2;

/// Samples taken per curve segment when flattening
pub const CURVE_STEPS: usize = 16;

/// A single path command
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PathOp {
    Move(Vec2),
    Line(Vec2),
    Quad { control: Vec2, end: Vec2 },
    Cubic { control1: Vec2, control2: Vec2, end: Vec2 },
    Close,
}

/// An ordered list of path commands
#[derive(Clone, Debug, Default)]
pub struct Path {
    ops: SmallVec<[PathOp; 16]>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: PathOp) {
        self.ops.push(op);
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    pub fn ops(&self) -> &[PathOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// True when the last command closes the subpath
    pub fn is_closed(&self) -> bool {
        matches!(self.ops.last(), Some(PathOp::Close))
    }

    /// Flatten the path into a single polyline.
    ///
    /// Curves are sampled at `t = i / 16` for `i` in `1..=16`. `Close`
    /// appends the start point of the current subpath.
    pub fn flatten(&self) -> Vec<Vec2> {
        let mut points = Vec::with_capacity(self.ops.len() * 2);
        let mut current = Vec2::ZERO;
        let mut start = Vec2::ZERO;

        for op in &self.ops {
            match *op {
                PathOp::Move(p) => {
                    points.push(p);
                    current = p;
                    start = p;
                }
                PathOp::Line(p) => {
                    points.push(p);
                    current = p;
                }
                PathOp::Quad { control, end } => {
                    for i in 1..=CURVE_STEPS {
                        let t = i as f32 / CURVE_STEPS as f32;
                        points.push(quad_bezier(current, control, end, t));
                    }
                    current = end;
                }
                PathOp::Cubic {
                    control1,
                    control2,
                    end,
                } => {
                    for i in 1..=CURVE_STEPS {
                        let t = i as f32 / CURVE_STEPS as f32;
                        points.push(cubic_bezier(current, control1, control2, end, t));
                    }
                    current = end;
                }
                PathOp::Close => {
                    points.push(start);
                    current = start;
                }
            }
        }

        points
    }
}

/// Evaluate a quadratic Bezier at `t`
pub fn quad_bezier(p0: Vec2, p1: Vec2, p2: Vec2, t: f32) -> Vec2 {
    let mt = 1.0 - t;
    let a = mt * mt;
    let b = 2.0 * mt * t;
    let c = t * t;
    Vec2::new(
        a * p0.x + b * p1.x + c * p2.x,
        a * p0.y + b * p1.y + c * p2.y,
    )
}

/// Evaluate a cubic Bezier at `t`
pub fn cubic_bezier(p0: Vec2, p1: Vec2, p2: Vec2, p3: Vec2, t: f32) -> Vec2 {
    let mt = 1.0 - t;
    let a = mt * mt * mt;
    let b = 3.0 * mt * mt * t;
    let c = 3.0 * mt * t * t;
    let d = t * t * t;
    Vec2::new(
        a * p0.x + b * p1.x + c * p2.x + d * p3.x,
        a * p0.y + b * p1.y + c * p2.y + d * p3.y,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bezier_endpoints() {
        let p0 = Vec2::new(1.0, 2.0);
        let p1 = Vec2::new(5.0, -3.0);
        let p2 = Vec2::new(9.0, 4.0);
        let p3 = Vec2::new(-2.0, 8.0);
        assert_eq!(quad_bezier(p0, p1, p2, 0.0), p0);
        assert_eq!(quad_bezier(p0, p1, p2, 1.0), p2);
        assert_eq!(cubic_bezier(p0, p1, p2, p3, 0.0), p0);
        assert_eq!(cubic_bezier(p0, p1, p2, p3, 1.0), p3);
    }

    #[test]
    fn test_flatten_fixed_steps() {
        let mut path = Path::new();
        path.push(PathOp::Move(Vec2::new(0.0, 0.0)));
        path.push(PathOp::Quad {
            control: Vec2::new(5.0, 10.0),
            end: Vec2::new(10.0, 0.0),
        });
        let points = path.flatten();
        assert_eq!(points.len(), 1 + CURVE_STEPS);
        assert_eq!(*points.last().unwrap(), Vec2::new(10.0, 0.0));
    }

    #[test]
    fn test_close_returns_to_start() {
        let mut path = Path::new();
        path.push(PathOp::Move(Vec2::new(1.0, 1.0)));
        path.push(PathOp::Line(Vec2::new(4.0, 1.0)));
        path.push(PathOp::Line(Vec2::new(4.0, 4.0)));
        path.push(PathOp::Close);
        assert!(path.is_closed());
        let points = path.flatten();
        assert_eq!(points.len(), 4);
        assert_eq!(points[3], Vec2::new(1.0, 1.0));
    }
}
