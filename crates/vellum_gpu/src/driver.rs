//! The driver abstraction
//!
//! A canvas talks to one [`Driver`] without knowing the concrete backend.
//! Resources are owned values: dropping a texture, framebuffer or shader
//! releases its native object exactly once.

use std::any::Any;
use std::fmt;

use vellum_core::PixelRect;

use crate::backend::Backend;
use crate::error::{GpuError, Result};
use crate::software::SoftwareDriver;
use crate::types::{DrawCall, ShaderSource, UniformValue};

/// Pixel store of fixed size
pub trait Texture: Send + Sync + fmt::Debug {
    /// Identifier unique within the owning driver
    fn id(&self) -> u32;

    fn size(&self) -> (i32, i32);

    /// Write RGBA8 `pixels` into `region` (the whole texture when `None`).
    /// Writes are clamped to the texture bounds.
    fn upload(&self, pixels: &[u8], region: Option<PixelRect>);

    fn backend(&self) -> Backend;

    fn as_any(&self) -> &dyn Any;
}

/// Render target wrapping exactly one texture
pub trait Framebuffer: Send + Sync + fmt::Debug {
    fn id(&self) -> u32;

    fn size(&self) -> (i32, i32);

    /// Make this the active target for subsequent `clear`/`draw` calls
    fn bind(&self);

    fn texture(&self) -> &dyn Texture;

    fn as_any(&self) -> &dyn Any;
}

/// Compiled program with retained uniform values
pub trait Shader: Send + Sync + fmt::Debug {
    fn id(&self) -> u32;

    /// Store a uniform for the next draw. Unknown names are ignored; a value
    /// whose shape contradicts the declared type is rejected.
    fn set_uniform(&self, name: &str, value: UniformValue) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

/// RGBA8 readback of a texture region
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TexturePixels {
    pub pixels: Vec<u8>,
    pub width: i32,
    pub height: i32,
}

/// Backend capability surface
pub trait Driver: Send + Sync + fmt::Debug {
    fn backend(&self) -> Backend;

    /// Acquire the native context. Idempotent.
    fn init(&self) -> Result<()>;

    /// Release the native context. Resources created earlier become inert.
    fn dispose(&self);

    /// Zero-initialized texture; non-positive sizes are rejected
    fn new_texture(&self, width: i32, height: i32) -> Result<Box<dyn Texture>>;

    /// Render target with its own backing texture, bound on creation
    fn new_framebuffer(&self, width: i32, height: i32) -> Result<Box<dyn Framebuffer>>;

    fn new_shader(&self, source: &ShaderSource) -> Result<Box<dyn Shader>>;

    /// Clear the currently bound target
    fn clear(&self, r: f32, g: f32, b: f32, a: f32);

    fn draw(&self, call: &DrawCall<'_>);

    /// Tightly packed RGBA8 for `rect` clipped to the framebuffer, top row first.
    /// `None` reads everything; an empty clip yields `Ok(None)`.
    fn read_pixels(&self, fb: &dyn Framebuffer, rect: Option<PixelRect>)
        -> Result<Option<Vec<u8>>>;

    /// Texture contents, cropped to `rect` when given
    fn read_texture_pixels(
        &self,
        texture: &dyn Texture,
        rect: Option<PixelRect>,
    ) -> Result<Option<TexturePixels>> {
        let _ = (texture, rect);
        Err(GpuError::unsupported(format!(
            "{} driver cannot read textures",
            self.backend()
        )))
    }

    fn max_texture_size(&self) -> i32;

    /// Identity of this driver instance, used to key shader caches
    fn instance_id(&self) -> u64;

    fn as_any(&self) -> &dyn Any;
}

/// Create and initialize a driver.
///
/// `Auto` tries the native backend for this platform and falls back to
/// [`SoftwareDriver`]; it never fails. Any other request fails with
/// `Unsupported` when that backend is unavailable.
pub fn new_driver(backend: Backend) -> Result<Box<dyn Driver>> {
    match backend {
        Backend::Auto => {
            for &candidate in Backend::auto_candidates() {
                match create_hardware(candidate) {
                    Ok(driver) => {
                        tracing::info!("GPU driver selected: {}", candidate);
                        return Ok(driver);
                    }
                    Err(err) => tracing::debug!("skipping {} backend: {}", candidate, err),
                }
            }
            tracing::info!("GPU driver selected: software");
            Ok(Box::new(SoftwareDriver::new()))
        }
        Backend::Software => Ok(Box::new(SoftwareDriver::new())),
        other => create_hardware(other),
    }
}

fn create_hardware(backend: Backend) -> Result<Box<dyn Driver>> {
    let driver: Box<dyn Driver> = match backend {
        #[cfg(not(any(target_os = "macos", target_arch = "wasm32")))]
        Backend::OpenGL => Box::new(crate::gl::OpenGlDriver::new()),
        #[cfg(target_os = "macos")]
        Backend::Metal => Box::new(crate::metal::MetalDriver::new()),
        #[cfg(target_arch = "wasm32")]
        Backend::WebGL => Box::new(crate::gl::WebGlDriver::new()),
        other => {
            return Err(GpuError::unsupported(format!(
                "{other} backend is not available on this platform"
            )))
        }
    };
    driver.init()?;
    Ok(driver)
}

/// Process-unique driver identity
pub(crate) fn next_instance_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}
