//! CPU driver
//!
//! Textures are plain RGBA8 buffers. The canvas writes pixels directly in
//! software mode, so `draw` is a no-op here. This driver is the universal
//! fallback and never fails to initialize.

use std::any::Any;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use vellum_core::pixels::{buffer_len, clear_pixels, clip_upload, crop_pixels, float_to_byte};
use vellum_core::{PixelRect, Rgba};

use crate::backend::Backend;
use crate::driver::{next_instance_id, Driver, Framebuffer, Shader, Texture, TexturePixels};
use crate::error::{check_size, GpuError, Result};
use crate::types::{DrawCall, ShaderSource, UniformValue};

pub const SOFTWARE_MAX_TEXTURE_SIZE: i32 = 16384;

/// Uniform values by name
pub type Uniforms = FxHashMap<String, UniformValue>;

/// CPU pixel kernel: `(src, width, height, uniforms) -> dst`
pub type PixelKernel = Arc<dyn Fn(&[u8], i32, i32, &Uniforms) -> Vec<u8> + Send + Sync>;

type PixelStore = Arc<Mutex<Vec<u8>>>;

/// Weak handle on the last-bound framebuffer's pixels
type CurrentTarget = Arc<Mutex<Option<Weak<Mutex<Vec<u8>>>>>>;

/// Driver that renders on the CPU
#[derive(Debug)]
pub struct SoftwareDriver {
    instance: u64,
    next_id: AtomicU32,
    current: CurrentTarget,
}

impl Default for SoftwareDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareDriver {
    pub fn new() -> Self {
        Self {
            instance: next_instance_id(),
            next_id: AtomicU32::new(1),
            current: Arc::new(Mutex::new(None)),
        }
    }

    fn alloc_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Concrete-typed texture, used by the canvas in software mode
    pub fn create_texture(&self, width: i32, height: i32) -> Result<SoftwareTexture> {
        check_size(width, height)?;
        Ok(SoftwareTexture {
            id: self.alloc_id(),
            width,
            height,
            store: Arc::new(Mutex::new(vec![0u8; buffer_len(width, height)])),
        })
    }

    /// Concrete-typed framebuffer, bound on creation
    pub fn create_framebuffer(&self, width: i32, height: i32) -> Result<SoftwareFramebuffer> {
        let texture = self.create_texture(width, height)?;
        let fb = SoftwareFramebuffer {
            id: self.alloc_id(),
            texture,
            current: Arc::clone(&self.current),
        };
        fb.bind();
        Ok(fb)
    }

    /// Shader whose `kernel` runs on the CPU when applied by a custom effect
    pub fn new_pixel_shader<F>(&self, kernel: F) -> SoftwareShader
    where
        F: Fn(&[u8], i32, i32, &Uniforms) -> Vec<u8> + Send + Sync + 'static,
    {
        SoftwareShader {
            id: self.alloc_id(),
            uniforms: Mutex::new(Uniforms::default()),
            kernel: Some(Arc::new(kernel)),
        }
    }

    fn texture_of<'a>(&self, texture: &'a dyn Texture) -> Result<&'a SoftwareTexture> {
        texture
            .as_any()
            .downcast_ref::<SoftwareTexture>()
            .ok_or_else(|| GpuError::unsupported("texture belongs to another backend"))
    }
}

impl Driver for SoftwareDriver {
    fn backend(&self) -> Backend {
        Backend::Software
    }

    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn dispose(&self) {
        *self.current.lock() = None;
    }

    fn new_texture(&self, width: i32, height: i32) -> Result<Box<dyn Texture>> {
        Ok(Box::new(self.create_texture(width, height)?))
    }

    fn new_framebuffer(&self, width: i32, height: i32) -> Result<Box<dyn Framebuffer>> {
        Ok(Box::new(self.create_framebuffer(width, height)?))
    }

    fn new_shader(&self, _source: &ShaderSource) -> Result<Box<dyn Shader>> {
        Ok(Box::new(SoftwareShader {
            id: self.alloc_id(),
            uniforms: Mutex::new(Uniforms::default()),
            kernel: None,
        }))
    }

    fn clear(&self, r: f32, g: f32, b: f32, a: f32) {
        let target = self.current.lock().clone();
        if let Some(store) = target.and_then(|weak| weak.upgrade()) {
            let color = Rgba::new(
                float_to_byte(r),
                float_to_byte(g),
                float_to_byte(b),
                float_to_byte(a),
            );
            clear_pixels(&mut store.lock(), color);
        }
    }

    fn draw(&self, call: &DrawCall<'_>) {
        tracing::trace!(
            vertices = call.vertices.len(),
            "software driver ignores draw calls"
        );
    }

    fn read_pixels(
        &self,
        fb: &dyn Framebuffer,
        rect: Option<PixelRect>,
    ) -> Result<Option<Vec<u8>>> {
        let texture = self.texture_of(fb.texture())?;
        Ok(texture.crop(rect).map(|px| px.pixels))
    }

    fn read_texture_pixels(
        &self,
        texture: &dyn Texture,
        rect: Option<PixelRect>,
    ) -> Result<Option<TexturePixels>> {
        Ok(self.texture_of(texture)?.crop(rect))
    }

    fn max_texture_size(&self) -> i32 {
        SOFTWARE_MAX_TEXTURE_SIZE
    }

    fn instance_id(&self) -> u64 {
        self.instance
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// RGBA8 buffer in main memory
#[derive(Debug)]
pub struct SoftwareTexture {
    id: u32,
    width: i32,
    height: i32,
    store: PixelStore,
}

impl SoftwareTexture {
    /// Copy of the current contents
    pub fn snapshot(&self) -> Vec<u8> {
        self.store.lock().clone()
    }

    pub fn with_pixels<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.store.lock())
    }

    pub fn with_pixels_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.store.lock())
    }

    fn crop(&self, rect: Option<PixelRect>) -> Option<TexturePixels> {
        let store = self.store.lock();
        crop_pixels(&store, self.width, self.height, rect).map(|(pixels, width, height)| {
            TexturePixels {
                pixels,
                width,
                height,
            }
        })
    }
}

impl Texture for SoftwareTexture {
    fn id(&self) -> u32 {
        self.id
    }

    fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    fn upload(&self, pixels: &[u8], region: Option<PixelRect>) {
        let Some((rect, data)) = clip_upload(pixels, region, self.width, self.height) else {
            return;
        };
        let mut store = self.store.lock();
        let row_bytes = rect.width() as usize * 4;
        for (row, y) in data.chunks_exact(row_bytes).zip(rect.y0..rect.y1) {
            let dst = (y as usize * self.width as usize + rect.x0 as usize) * 4;
            store[dst..dst + row_bytes].copy_from_slice(row);
        }
    }

    fn backend(&self) -> Backend {
        Backend::Software
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Render target over a [`SoftwareTexture`]
#[derive(Debug)]
pub struct SoftwareFramebuffer {
    id: u32,
    texture: SoftwareTexture,
    current: CurrentTarget,
}

impl SoftwareFramebuffer {
    pub fn software_texture(&self) -> &SoftwareTexture {
        &self.texture
    }
}

impl Framebuffer for SoftwareFramebuffer {
    fn id(&self) -> u32 {
        self.id
    }

    fn size(&self) -> (i32, i32) {
        self.texture.size()
    }

    fn bind(&self) {
        *self.current.lock() = Some(Arc::downgrade(&self.texture.store));
    }

    fn texture(&self) -> &dyn Texture {
        &self.texture
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Placeholder program, optionally carrying a CPU kernel
pub struct SoftwareShader {
    id: u32,
    uniforms: Mutex<Uniforms>,
    kernel: Option<PixelKernel>,
}

impl std::fmt::Debug for SoftwareShader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareShader")
            .field("id", &self.id)
            .field("has_kernel", &self.kernel.is_some())
            .finish()
    }
}

impl SoftwareShader {
    pub fn has_kernel(&self) -> bool {
        self.kernel.is_some()
    }

    /// Run the kernel with stored uniforms overlaid by `extra`.
    /// Returns `None` without a kernel or when the output size is wrong.
    pub fn run(&self, src: &[u8], width: i32, height: i32, extra: &Uniforms) -> Option<Vec<u8>> {
        let kernel = self.kernel.as_ref()?;
        let mut merged = self.uniforms.lock().clone();
        merged.extend(extra.iter().map(|(k, v)| (k.clone(), *v)));
        let out = kernel(src, width, height, &merged);
        (out.len() == buffer_len(width, height)).then_some(out)
    }
}

impl Shader for SoftwareShader {
    fn id(&self) -> u32 {
        self.id
    }

    fn set_uniform(&self, name: &str, value: UniformValue) -> Result<()> {
        self.uniforms.lock().insert(name.to_string(), value);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::pixels::get_pixel;

    #[test]
    fn test_non_positive_sizes_rejected() {
        let driver = SoftwareDriver::new();
        for (w, h) in [(0, 4), (4, 0), (-1, 3)] {
            let err = driver.new_texture(w, h).unwrap_err();
            assert!(err.is_unsupported());
            assert!(driver.new_framebuffer(w, h).unwrap_err().is_unsupported());
        }
    }

    #[test]
    fn test_clear_targets_last_bound() {
        let driver = SoftwareDriver::new();
        let a = driver.create_framebuffer(2, 2).unwrap();
        let b = driver.create_framebuffer(2, 2).unwrap();
        driver.clear(1.0, 0.0, 0.0, 1.0);
        assert_eq!(a.software_texture().snapshot(), vec![0u8; 16]);
        a.bind();
        driver.clear(0.0, 0.0, 1.0, 1.0);
        let px = b.software_texture().snapshot();
        assert_eq!(get_pixel(&px, 2, 2, 1, 1), Some(Rgba::new(255, 0, 0, 255)));
        let px = a.software_texture().snapshot();
        assert_eq!(get_pixel(&px, 2, 2, 0, 0), Some(Rgba::new(0, 0, 255, 255)));
    }

    #[test]
    fn test_upload_clamped_and_cropped_read() {
        let driver = SoftwareDriver::new();
        let tex = driver.create_texture(3, 3).unwrap();
        let white = [255u8; 16];
        tex.upload(&white, Some(PixelRect::new(2, 2, 4, 4)));
        let px = tex.snapshot();
        assert_eq!(get_pixel(&px, 3, 3, 2, 2), Some(Rgba::WHITE));
        assert_eq!(get_pixel(&px, 3, 3, 1, 1), Some(Rgba::TRANSPARENT));

        let read = driver
            .read_texture_pixels(&tex, Some(PixelRect::new(2, 2, 3, 3)))
            .unwrap()
            .unwrap();
        assert_eq!((read.width, read.height), (1, 1));
        assert_eq!(read.pixels, vec![255; 4]);
        assert!(driver
            .read_texture_pixels(&tex, Some(PixelRect::new(3, 0, 3, 3)))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_pixel_shader_merges_uniforms() {
        let driver = SoftwareDriver::new();
        let shader = driver.new_pixel_shader(|src, _, _, uniforms| {
            let v = match uniforms.get("uValue") {
                Some(UniformValue::Int(v)) => *v as u8,
                _ => 0,
            };
            vec![v; src.len()]
        });
        shader.set_uniform("uValue", UniformValue::Int(3)).unwrap();
        let src = vec![0u8; 4];
        assert_eq!(shader.run(&src, 1, 1, &Uniforms::default()), Some(vec![3; 4]));

        let mut extra = Uniforms::default();
        extra.insert("uValue".into(), UniformValue::Int(9));
        assert_eq!(shader.run(&src, 1, 1, &extra), Some(vec![9; 4]));
    }
}
