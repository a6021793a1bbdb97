//! Blur-based glow and drop shadow

use vellum_core::pixels::blend_pixel;
use vellum_core::Rgba;
use vellum_gpu::{BlendMode, Framebuffer, Texture};

use super::blur::blur_gpu;
use super::{box_blur, run, set, tint, Effect, EffectContext};

/// Colored halo around the source's opaque areas
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlowEffect {
    pub radius: f32,
    pub intensity: f32,
    pub color: Rgba,
}

impl Default for GlowEffect {
    fn default() -> Self {
        Self {
            radius: 4.0,
            intensity: 1.0,
            color: Rgba::WHITE,
        }
    }
}

impl Effect for GlowEffect {
    fn apply(&self, src: &dyn Texture, dst: &dyn Framebuffer, ctx: &EffectContext<'_>) {
        let radius = self.radius.round() as i32;
        let intensity = self.intensity;
        let color = self.color;

        run(
            src,
            dst,
            ctx,
            |pass, source| {
                if intensity <= 0.0 {
                    return pass.copy(source, pass.dst, BlendMode::None);
                }
                let glow = pass.shader("glow")?;
                let blurred = pass.framebuffer()?;
                blur_gpu(pass, source, blurred.as_ref(), radius)?;

                pass.clear(pass.dst);
                pass.copy(source, pass.dst, BlendMode::Alpha)?;
                let [r, g, b, a] = color.to_f32_array();
                set(glow.as_ref(), "uGlowColor", [r, g, b, (a * intensity).clamp(0.0, 1.0)]);
                pass.draw(
                    glow.as_ref(),
                    blurred.texture(),
                    pass.dst,
                    BlendMode::Additive,
                    (0.0, 0.0),
                );
                Some(())
            },
            |pixels, width, height| {
                let mut out = pixels.to_vec();
                if intensity <= 0.0 {
                    return Some(out);
                }
                let blurred = box_blur(pixels, width, height, radius);
                for (i, px) in blurred.chunks_exact(4).enumerate() {
                    if px[3] == 0 {
                        continue;
                    }
                    let halo = tint(color, px[3] as f32 / 255.0 * intensity);
                    let (x, y) = (i as i32 % width, i as i32 / width);
                    blend_pixel(&mut out, width, height, x, y, halo);
                }
                Some(out)
            },
        );
    }
}

/// Blurred, tinted copy of the source drawn behind it at an offset
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowEffect {
    pub offset_x: f32,
    pub offset_y: f32,
    pub blur: f32,
    pub color: Rgba,
}

impl Default for ShadowEffect {
    fn default() -> Self {
        Self {
            offset_x: 2.0,
            offset_y: 2.0,
            blur: 2.0,
            color: Rgba::new(0, 0, 0, 128),
        }
    }
}

impl Effect for ShadowEffect {
    fn apply(&self, src: &dyn Texture, dst: &dyn Framebuffer, ctx: &EffectContext<'_>) {
        let radius = self.blur.round() as i32;
        let (dx, dy) = (self.offset_x.round() as i32, self.offset_y.round() as i32);
        let color = self.color;

        run(
            src,
            dst,
            ctx,
            |pass, source| {
                let tinted = pass.shader("glow")?;
                let blurred = pass.framebuffer()?;
                blur_gpu(pass, source, blurred.as_ref(), radius)?;

                pass.clear(pass.dst);
                set(tinted.as_ref(), "uGlowColor", color.to_f32_array());
                pass.draw(
                    tinted.as_ref(),
                    blurred.texture(),
                    pass.dst,
                    BlendMode::Alpha,
                    (dx as f32, dy as f32),
                );
                pass.copy(source, pass.dst, BlendMode::Alpha)
            },
            |pixels, width, height| {
                let blurred = box_blur(pixels, width, height, radius);
                let mut out = vec![0u8; pixels.len()];
                for (i, px) in blurred.chunks_exact(4).enumerate() {
                    if px[3] == 0 {
                        continue;
                    }
                    let (x, y) = (i as i32 % width, i as i32 / width);
                    let shade = tint(color, px[3] as f32 / 255.0);
                    blend_pixel(&mut out, width, height, x + dx, y + dy, shade);
                }
                for (i, px) in pixels.chunks_exact(4).enumerate() {
                    if px[3] == 0 {
                        continue;
                    }
                    let (x, y) = (i as i32 % width, i as i32 / width);
                    blend_pixel(&mut out, width, height, x, y, Rgba::from_slice(px));
                }
                Some(out)
            },
        );
    }
}
