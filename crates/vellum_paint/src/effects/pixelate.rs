//! Block pixelation

use vellum_gpu::{BlendMode, Framebuffer, Texture};

use super::{run, set, Effect, EffectContext};

/// Averages color over `pixel_size` x `pixel_size` tiles; sizes that round
/// to 1 or less copy the source
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PixelateEffect {
    pub pixel_size: f32,
}

impl PixelateEffect {
    pub fn new(pixel_size: f32) -> Self {
        Self { pixel_size }
    }
}

fn pixelate(src: &[u8], width: i32, height: i32, block: i32) -> Vec<u8> {
    let mut out = src.to_vec();
    if block <= 1 {
        return out;
    }
    for by in (0..height).step_by(block as usize) {
        for bx in (0..width).step_by(block as usize) {
            let ys = by..(by + block).min(height);
            let xs = bx..(bx + block).min(width);
            let index = |x: i32, y: i32| (y * width + x) as usize * 4;

            let mut sum = [0u32; 4];
            let mut count = 0u32;
            for y in ys.clone() {
                for x in xs.clone() {
                    let i = index(x, y);
                    for (acc, v) in sum.iter_mut().zip(&src[i..i + 4]) {
                        *acc += *v as u32;
                    }
                    count += 1;
                }
            }
            if count == 0 {
                continue;
            }
            let average = sum.map(|s| (s / count) as u8);
            for y in ys.clone() {
                for x in xs.clone() {
                    let i = index(x, y);
                    out[i..i + 4].copy_from_slice(&average);
                }
            }
        }
    }
    out
}

impl Effect for PixelateEffect {
    fn apply(&self, src: &dyn Texture, dst: &dyn Framebuffer, ctx: &EffectContext<'_>) {
        let block = self.pixel_size.round() as i32;

        run(
            src,
            dst,
            ctx,
            |pass, source| {
                if block <= 1 {
                    return pass.copy(source, pass.dst, BlendMode::None);
                }
                let shader = pass.shader("pixelate")?;
                set(shader.as_ref(), "uPixelSize", block as f32);
                set(shader.as_ref(), "uResolution", [pass.width as f32, pass.height as f32]);
                pass.draw(shader.as_ref(), source, pass.dst, BlendMode::None, (0.0, 0.0));
                Some(())
            },
            |pixels, width, height| Some(pixelate(pixels, width, height, block)),
        );
    }
}
