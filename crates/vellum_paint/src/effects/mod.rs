//! Post-processing effects
//!
//! Every effect reads a source texture and writes a destination framebuffer
//! of the same size. On a hardware driver it draws full-target quads with a
//! bundled program; whenever that is not possible it runs a CPU version
//! over RGBA8 buffers. Effects never fail: a size mismatch or unreadable
//! source leaves the destination untouched.

mod blur;
mod color;
mod custom;
mod glow;
mod pixelate;

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use vellum_core::{Matrix3, Rgba};
use vellum_gpu::software::SoftwareTexture;
use vellum_gpu::{
    load_shader_source, BlendMode, DrawCall, Driver, Framebuffer, Shader, Texture, TexturePixels,
    UniformValue, VertexFormat,
};

use crate::pipeline::{clip_quad, QuadBatch};

pub use blur::BlurEffect;
pub use color::{ChromaticAberrationEffect, ColorGradeEffect, VignetteEffect};
pub use custom::CustomEffect;
pub use glow::{GlowEffect, ShadowEffect};
pub use pixelate::PixelateEffect;

/// A post-processing operation from `src` into `dst`
pub trait Effect: Send + Sync {
    fn apply(&self, src: &dyn Texture, dst: &dyn Framebuffer, ctx: &EffectContext<'_>);
}

/// Compiled effect programs for one canvas, keyed by driver instance and
/// program name. Failed compilations are remembered so they are not retried
/// on every frame.
#[derive(Default)]
pub struct ShaderCache {
    shaders: Mutex<FxHashMap<(u64, &'static str), Option<Arc<dyn Shader>>>>,
}

impl std::fmt::Debug for ShaderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderCache")
            .field("entries", &self.shaders.lock().len())
            .finish()
    }
}

impl ShaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached program `name` for `driver`, compiling it on first use
    pub fn get(&self, driver: &dyn Driver, name: &'static str) -> Option<Arc<dyn Shader>> {
        let key = (driver.instance_id(), name);
        if let Some(entry) = self.shaders.lock().get(&key) {
            return entry.clone();
        }

        let compiled = load_shader_source(name)
            .and_then(|source| driver.new_shader(&source))
            .map(Arc::<dyn Shader>::from);
        let entry = match compiled {
            Ok(shader) => {
                if let Err(err) = shader.set_uniform("uTexture", UniformValue::Int(0)) {
                    tracing::debug!("{} effect: {}", name, err);
                }
                Some(shader)
            }
            Err(err) => {
                tracing::debug!("{} effect program unavailable: {}", name, err);
                None
            }
        };
        self.shaders.lock().insert(key, entry.clone());
        entry
    }

    pub fn len(&self) -> usize {
        self.shaders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every program; the next `get` recompiles
    pub fn clear(&self) {
        self.shaders.lock().clear();
    }
}

/// What an effect may use while applying
#[derive(Clone, Copy)]
pub struct EffectContext<'a> {
    pub driver: &'a dyn Driver,
    pub shaders: &'a ShaderCache,
}

impl<'a> EffectContext<'a> {
    pub fn new(driver: &'a dyn Driver, shaders: &'a ShaderCache) -> Self {
        Self { driver, shaders }
    }

    pub fn is_accelerated(&self) -> bool {
        self.driver.backend().is_hardware()
    }
}

/// Full-target draws into one destination on a hardware driver
pub(crate) struct GpuPass<'a> {
    pub ctx: &'a EffectContext<'a>,
    pub dst: &'a dyn Framebuffer,
    pub width: i32,
    pub height: i32,
}

impl<'a> GpuPass<'a> {
    pub fn shader(&self, name: &'static str) -> Option<Arc<dyn Shader>> {
        self.ctx.shaders.get(self.ctx.driver, name)
    }

    pub fn framebuffer(&self) -> Option<Box<dyn Framebuffer>> {
        self.ctx
            .driver
            .new_framebuffer(self.width, self.height)
            .map_err(|err| tracing::debug!("effect scratch target: {}", err))
            .ok()
    }

    pub fn clear(&self, target: &dyn Framebuffer) {
        target.bind();
        self.ctx.driver.clear(0.0, 0.0, 0.0, 0.0);
    }

    /// Draw `texture` over all of `target`, shifted by a pixel offset
    pub fn draw(
        &self,
        shader: &dyn Shader,
        texture: &dyn Texture,
        target: &dyn Framebuffer,
        blend: BlendMode,
        offset: (f32, f32),
    ) {
        if let Err(err) = shader.set_uniform("uTransform", Matrix3::IDENTITY.into()) {
            tracing::debug!("effect transform: {}", err);
        }
        let quad: QuadBatch = clip_quad(self.width, self.height, offset.0, offset.1);
        let layout = VertexFormat::PosUv.layout();
        self.ctx.driver.draw(
            &DrawCall::new(shader, &quad.vertices, &quad.indices)
                .with_texture(texture)
                .with_target(target)
                .with_blend(blend)
                .with_layout(&layout),
        );
    }

    /// Plain copy through the bundled texture program
    pub fn copy(
        &self,
        texture: &dyn Texture,
        target: &dyn Framebuffer,
        blend: BlendMode,
    ) -> Option<()> {
        let shader = self.shader("texture")?;
        self.draw(shader.as_ref(), texture, target, blend, (0.0, 0.0));
        Some(())
    }
}

/// Set a uniform, logging rather than failing on a rejected value
pub(crate) fn set(shader: &dyn Shader, name: &str, value: impl Into<UniformValue>) {
    if let Err(err) = shader.set_uniform(name, value.into()) {
        tracing::debug!("effect uniform {}: {}", name, err);
    }
}

/// RGBA8 contents of `texture`, through the driver or straight from a
/// software texture
pub(crate) fn texture_pixels(texture: &dyn Texture, driver: &dyn Driver) -> Option<TexturePixels> {
    if let Some(software) = texture.as_any().downcast_ref::<SoftwareTexture>() {
        let (width, height) = software.size();
        return Some(TexturePixels {
            pixels: software.snapshot(),
            width,
            height,
        });
    }
    driver
        .read_texture_pixels(texture, None)
        .map_err(|err| tracing::debug!("texture readback failed: {}", err))
        .ok()
        .flatten()
}

/// `texture` itself when the driver can sample it, otherwise a temporary
/// copy uploaded to the driver
enum NativeSource<'a> {
    Borrowed(&'a dyn Texture),
    Uploaded(Box<dyn Texture>),
}

impl<'a> NativeSource<'a> {
    fn new(texture: &'a dyn Texture, driver: &dyn Driver) -> Option<Self> {
        if texture.backend() == driver.backend() {
            return Some(Self::Borrowed(texture));
        }
        let pixels = texture_pixels(texture, driver)?;
        let uploaded = driver.new_texture(pixels.width, pixels.height).ok()?;
        uploaded.upload(&pixels.pixels, None);
        Some(Self::Uploaded(uploaded))
    }

    fn get(&self) -> &dyn Texture {
        match self {
            Self::Borrowed(texture) => *texture,
            Self::Uploaded(texture) => texture.as_ref(),
        }
    }
}

/// Shared driver for every effect: size check, accelerated attempt, then
/// the CPU version. `cpu` returns `None` to leave the destination as is.
pub(crate) fn run(
    src: &dyn Texture,
    dst: &dyn Framebuffer,
    ctx: &EffectContext<'_>,
    gpu: impl FnOnce(&GpuPass<'_>, &dyn Texture) -> Option<()>,
    cpu: impl FnOnce(&[u8], i32, i32) -> Option<Vec<u8>>,
) {
    let (width, height) = src.size();
    if dst.size() != (width, height) {
        tracing::debug!(
            "effect skipped: source {}x{} does not match destination {:?}",
            width,
            height,
            dst.size()
        );
        return;
    }

    if ctx.is_accelerated() {
        if let Some(source) = NativeSource::new(src, ctx.driver) {
            let pass = GpuPass {
                ctx,
                dst,
                width,
                height,
            };
            if gpu(&pass, source.get()).is_some() {
                return;
            }
        }
        tracing::debug!("effect falling back to CPU");
    }

    let Some(source) = texture_pixels(src, ctx.driver) else {
        return;
    };
    if let Some(out) = cpu(&source.pixels, width, height) {
        dst.texture().upload(&out, None);
    }
}

/// Per-channel box average along one axis with edge clamping
fn box_pass(src: &[u8], width: i32, height: i32, radius: i32, horizontal: bool) -> Vec<u8> {
    let mut out = vec![0u8; src.len()];
    let count = (2 * radius + 1) as u32;
    for y in 0..height {
        for x in 0..width {
            let mut sum = [0u32; 4];
            for k in -radius..=radius {
                let (sx, sy) = if horizontal {
                    ((x + k).clamp(0, width - 1), y)
                } else {
                    (x, (y + k).clamp(0, height - 1))
                };
                let i = (sy * width + sx) as usize * 4;
                for (acc, v) in sum.iter_mut().zip(&src[i..i + 4]) {
                    *acc += *v as u32;
                }
            }
            let o = (y * width + x) as usize * 4;
            for (dst, acc) in out[o..o + 4].iter_mut().zip(sum) {
                *dst = (acc / count) as u8;
            }
        }
    }
    out
}

/// Separable box blur; a radius of zero or less copies
pub(crate) fn box_blur(src: &[u8], width: i32, height: i32, radius: i32) -> Vec<u8> {
    if radius <= 0 || width <= 0 || height <= 0 {
        return src.to_vec();
    }
    let horizontal = box_pass(src, width, height, radius, true);
    box_pass(&horizontal, width, height, radius, false)
}

/// `color` with its alpha scaled by `factor`
pub(crate) fn tint(color: Rgba, factor: f32) -> Rgba {
    let alpha = (color.a as f32 / 255.0 * factor).clamp(0.0, 1.0);
    Rgba::new(color.r, color.g, color.b, vellum_core::pixels::float_to_byte(alpha))
}
