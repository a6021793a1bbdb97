//! Vellum Core
//!
//! Backend-independent building blocks for the vellum canvas engine.
//!
//! # Features
//!
//! - Affine 3x3 transforms
//! - Path operations with fixed-step Bezier flattening
//! - Ear-clipping polygon triangulation
//! - Rounded rect and circle outlines
//! - RGBA8 pixel buffers: alpha-over blending, scaling, cropping, flipping
//! - Scanline rasterization for the software backend
//! - A fixed-width 5x7 pixel font

pub mod color;
pub mod font;
pub mod geometry;
pub mod matrix;
pub mod path;
pub mod pixels;
pub mod raster;
pub mod shapes;
pub mod triangulate;

pub use color::Rgba;
pub use font::{Glyph, PixelFont};
pub use geometry::{PixelRect, Vec2};
pub use matrix::Matrix3;
pub use path::{cubic_bezier, quad_bezier, Path, PathOp};
pub use shapes::{circle_points, rounded_rect_points};
pub use triangulate::{triangulate_polygon, Triangulation};
