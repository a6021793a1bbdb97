//! Separable box blur

use vellum_gpu::{BlendMode, Framebuffer, Texture};

use super::{box_blur, run, set, Effect, EffectContext, GpuPass};

/// Widest radius the bundled blur program samples
const MAX_GPU_RADIUS: f32 = 32.0;

/// Box blur of `radius` pixels in both directions
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BlurEffect {
    pub radius: f32,
}

impl BlurEffect {
    pub fn new(radius: f32) -> Self {
        Self { radius }
    }

    fn pixel_radius(&self) -> i32 {
        self.radius.round() as i32
    }
}

/// Two blur passes from `src` into `target` through a scratch framebuffer
pub(super) fn blur_gpu(
    pass: &GpuPass<'_>,
    src: &dyn Texture,
    target: &dyn Framebuffer,
    radius: i32,
) -> Option<()> {
    if radius <= 0 {
        return pass.copy(src, target, BlendMode::None);
    }
    if radius as f32 > MAX_GPU_RADIUS {
        return None;
    }
    let shader = pass.shader("blur")?;
    let scratch = pass.framebuffer()?;

    set(shader.as_ref(), "uRadius", radius as f32);
    set(shader.as_ref(), "uDirection", [1.0 / pass.width as f32, 0.0]);
    pass.draw(shader.as_ref(), src, scratch.as_ref(), BlendMode::None, (0.0, 0.0));

    set(shader.as_ref(), "uDirection", [0.0, 1.0 / pass.height as f32]);
    pass.draw(shader.as_ref(), scratch.texture(), target, BlendMode::None, (0.0, 0.0));
    Some(())
}

impl Effect for BlurEffect {
    fn apply(&self, src: &dyn Texture, dst: &dyn Framebuffer, ctx: &EffectContext<'_>) {
        let radius = self.pixel_radius();
        run(
            src,
            dst,
            ctx,
            |pass, source| blur_gpu(pass, source, pass.dst, radius),
            |pixels, width, height| Some(box_blur(pixels, width, height, radius)),
        );
    }
}
