//! Per-pixel color effects

use vellum_core::pixels::float_to_byte;
use vellum_gpu::{BlendMode, Framebuffer, Texture};

use super::{run, set, Effect, EffectContext};

/// Red sampled from the left and blue from the right by `amount` pixels
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChromaticAberrationEffect {
    pub amount: f32,
}

impl Effect for ChromaticAberrationEffect {
    fn apply(&self, src: &dyn Texture, dst: &dyn Framebuffer, ctx: &EffectContext<'_>) {
        let amount = self.amount;
        let shift = amount.round() as i32;

        run(
            src,
            dst,
            ctx,
            |pass, source| {
                let shader = pass.shader("chromatic")?;
                let offset = [amount / pass.width as f32, amount / pass.height as f32];
                set(shader.as_ref(), "uOffset", offset);
                pass.draw(shader.as_ref(), source, pass.dst, BlendMode::None, (0.0, 0.0));
                Some(())
            },
            |pixels, width, height| {
                let mut out = pixels.to_vec();
                if shift == 0 {
                    return Some(out);
                }
                for y in 0..height {
                    for x in 0..width {
                        let at = |sx: i32| ((y * width + sx.clamp(0, width - 1)) * 4) as usize;
                        let i = at(x);
                        out[i] = pixels[at(x - shift)];
                        out[i + 2] = pixels[at(x + shift) + 2];
                    }
                }
                Some(out)
            },
        );
    }
}

/// Edge darkening past `radius` (normalized distance from the center),
/// fading in over `softness`
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VignetteEffect {
    pub radius: f32,
    pub softness: f32,
}

impl VignetteEffect {
    pub const DEFAULT_RADIUS: f32 = 0.7;
    pub const DEFAULT_SOFTNESS: f32 = 0.3;

    /// Radius and softness with non-positive values replaced by defaults
    pub fn resolved(&self) -> (f32, f32) {
        let radius = if self.radius > 0.0 {
            self.radius
        } else {
            Self::DEFAULT_RADIUS
        };
        let softness = if self.softness > 0.0 {
            self.softness
        } else {
            Self::DEFAULT_SOFTNESS
        };
        (radius, softness)
    }
}

impl Effect for VignetteEffect {
    fn apply(&self, src: &dyn Texture, dst: &dyn Framebuffer, ctx: &EffectContext<'_>) {
        let (radius, softness) = self.resolved();

        run(
            src,
            dst,
            ctx,
            |pass, source| {
                let shader = pass.shader("vignette")?;
                set(shader.as_ref(), "uRadius", radius);
                set(shader.as_ref(), "uSoftness", softness);
                pass.draw(shader.as_ref(), source, pass.dst, BlendMode::None, (0.0, 0.0));
                Some(())
            },
            |pixels, width, height| {
                let mut out = pixels.to_vec();
                let cx = (width - 1) as f32 / 2.0;
                let cy = (height - 1) as f32 / 2.0;
                let max_dist = cx.hypot(cy).max(f32::EPSILON);
                for (i, px) in out.chunks_exact_mut(4).enumerate() {
                    if px[3] == 0 {
                        continue;
                    }
                    let x = (i as i32 % width) as f32;
                    let y = (i as i32 / width) as f32;
                    let dist = (x - cx).hypot(y - cy) / max_dist;
                    if dist <= radius {
                        continue;
                    }
                    let factor = 1.0 - ((dist - radius) / softness).min(1.0);
                    for c in &mut px[..3] {
                        *c = float_to_byte(*c as f32 / 255.0 * factor);
                    }
                }
                Some(out)
            },
        );
    }
}

/// Brightness, contrast, saturation and hue adjustments, applied in that
/// order. Zero for every field is the identity; `hue` is in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ColorGradeEffect {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub hue: f32,
}

impl ColorGradeEffect {
    /// Grade one normalized RGB triple
    pub fn grade(&self, rgb: [f32; 3]) -> [f32; 3] {
        let [mut r, mut g, mut b] = rgb;
        if self.brightness != 0.0 {
            [r, g, b] = [r, g, b].map(|c| (c + self.brightness).clamp(0.0, 1.0));
        }
        if self.contrast != 0.0 {
            let factor = 1.0 + self.contrast;
            [r, g, b] = [r, g, b].map(|c| ((c - 0.5) * factor + 0.5).clamp(0.0, 1.0));
        }
        if self.saturation != 0.0 {
            let luma = 0.2126 * r + 0.7152 * g + 0.0722 * b;
            let factor = 1.0 + self.saturation;
            [r, g, b] = [r, g, b].map(|c| (luma + (c - luma) * factor).clamp(0.0, 1.0));
        }
        if self.hue != 0.0 {
            [r, g, b] = rotate_hue([r, g, b], self.hue);
        }
        [r, g, b]
    }
}

/// Luminance-preserving hue rotation
fn rotate_hue([r, g, b]: [f32; 3], angle: f32) -> [f32; 3] {
    let (sa, ca) = angle.sin_cos();
    let m = [
        [
            0.213 + ca * 0.787 - sa * 0.213,
            0.715 - ca * 0.715 - sa * 0.715,
            0.072 - ca * 0.072 + sa * 0.928,
        ],
        [
            0.213 - ca * 0.213 + sa * 0.143,
            0.715 + ca * 0.285 + sa * 0.140,
            0.072 - ca * 0.072 - sa * 0.283,
        ],
        [
            0.213 - ca * 0.213 - sa * 0.787,
            0.715 - ca * 0.715 + sa * 0.715,
            0.072 + ca * 0.928 + sa * 0.072,
        ],
    ];
    m.map(|row| (row[0] * r + row[1] * g + row[2] * b).clamp(0.0, 1.0))
}

impl Effect for ColorGradeEffect {
    fn apply(&self, src: &dyn Texture, dst: &dyn Framebuffer, ctx: &EffectContext<'_>) {
        let grade = *self;

        run(
            src,
            dst,
            ctx,
            |pass, source| {
                let shader = pass.shader("colorgrade")?;
                set(shader.as_ref(), "uBrightness", grade.brightness);
                set(shader.as_ref(), "uContrast", grade.contrast);
                set(shader.as_ref(), "uSaturation", grade.saturation);
                set(shader.as_ref(), "uHue", grade.hue);
                pass.draw(shader.as_ref(), source, pass.dst, BlendMode::None, (0.0, 0.0));
                Some(())
            },
            |pixels, _, _| {
                let mut out = pixels.to_vec();
                for px in out.chunks_exact_mut(4) {
                    if px[3] == 0 {
                        continue;
                    }
                    let rgb = [px[0], px[1], px[2]].map(|c| c as f32 / 255.0);
                    let graded = grade.grade(rgb);
                    for (c, v) in px.iter_mut().zip(graded) {
                        *c = float_to_byte(v);
                    }
                }
                Some(out)
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_grade() {
        let grade = ColorGradeEffect::default();
        assert_eq!(grade.grade([0.2, 0.4, 0.6]), [0.2, 0.4, 0.6]);
    }

    #[test]
    fn test_full_desaturation_is_gray() {
        let grade = ColorGradeEffect {
            saturation: -1.0,
            ..Default::default()
        };
        let [r, g, b] = grade.grade([1.0, 0.0, 0.0]);
        assert!((r - 0.2126).abs() < 1e-5);
        assert_eq!(r, g);
        assert_eq!(g, b);
    }

    #[test]
    fn test_hue_zero_turn_keeps_color() {
        let [r, g, b] = rotate_hue([0.3, 0.5, 0.7], 0.0);
        assert!((r - 0.3).abs() < 1e-3);
        assert!((g - 0.5).abs() < 1e-3);
        assert!((b - 0.7).abs() < 1e-3);
    }

    #[test]
    fn test_vignette_defaults() {
        assert_eq!(VignetteEffect::default().resolved(), (0.7, 0.3));
        let custom = VignetteEffect {
            radius: 0.5,
            softness: -1.0,
        };
        assert_eq!(custom.resolved(), (0.5, 0.3));
    }
}
