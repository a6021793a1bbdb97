//! Vellum Paint/Canvas API
//!
//! An immediate-mode 2D drawing surface on top of a `vellum_gpu` driver.
//!
//! # Features
//!
//! - Rects, rounded rects, circles, lines and Bezier paths
//! - Fill and stroke colors with alpha-over blending
//! - Save/restore transform stack
//! - Pixel-font text and RGBA8 image drawing
//! - Offscreen layers composited through post-processing effects
//! - Transparent fallback to the software rasterizer when no GPU is available

pub mod canvas;
pub mod config;
pub mod effects;
pub mod error;
pub mod pipeline;

pub use canvas::{FrameTexture, GpuCanvas};
pub use config::CanvasConfig;
pub use effects::{
    BlurEffect, ChromaticAberrationEffect, ColorGradeEffect, CustomEffect, Effect, EffectContext,
    GlowEffect, PixelateEffect, ShaderCache, ShadowEffect, VignetteEffect,
};
pub use error::{CanvasError, Result};
pub use pipeline::GpuPipeline;
