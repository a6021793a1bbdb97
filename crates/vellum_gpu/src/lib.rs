//! Vellum GPU drivers
//!
//! One [`Driver`] trait over four backends: a CPU software rasterizer,
//! desktop OpenGL, Metal and WebGL. Callers normally go through
//! [`new_driver`], which honours the `VELLUM_GPU_BACKEND` override and
//! falls back to software when no hardware context can be created.
//!
//! # Features
//!
//! - Textures, framebuffers and shaders as driver-owned handles that
//!   release their GPU objects on drop
//! - Interleaved vertex layouts inferred from the vertex count or given
//!   explicitly
//! - Bundled GLSL and Metal sources for the built-in effects
//! - Pixel readback from framebuffers and textures

pub mod backend;
pub mod driver;
pub mod error;
pub mod layout;
pub mod shaders;
pub mod software;
pub mod types;

mod worker;
#[macro_use]
mod hosted;

#[cfg(not(target_os = "macos"))]
mod gl;
pub mod metal;

pub use backend::{Backend, BACKEND_ENV};
pub use driver::{new_driver, Driver, Framebuffer, Shader, Texture, TexturePixels};
pub use error::{GpuError, Result};
pub use layout::{VertexAttribute, VertexFormat, VertexLayout};
pub use shaders::load_shader_source;
pub use software::{SoftwareDriver, SoftwareFramebuffer, SoftwareShader, SoftwareTexture};
pub use types::{BlendMode, DrawCall, GlslSource, ShaderSource, UniformValue};

#[cfg(not(any(target_os = "macos", target_arch = "wasm32")))]
pub use gl::OpenGlDriver;
#[cfg(target_arch = "wasm32")]
pub use gl::WebGlDriver;
#[cfg(target_os = "macos")]
pub use metal::MetalDriver;
