//! Caller-supplied programs

use std::sync::Arc;

use vellum_gpu::software::Uniforms;
use vellum_gpu::{BlendMode, Framebuffer, Shader, SoftwareShader, Texture, UniformValue};

use super::{run, set, Effect, EffectContext};

/// Runs a caller's shader over the source.
///
/// On a hardware driver the shader must come from the same driver and is
/// drawn as a full-target quad. A [`SoftwareShader`] with a pixel kernel
/// runs on the CPU; its stored uniforms are overlaid by [`uniforms`](Self::uniforms).
#[derive(Clone)]
pub struct CustomEffect {
    pub shader: Arc<dyn Shader>,
    pub uniforms: Uniforms,
}

impl std::fmt::Debug for CustomEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomEffect")
            .field("shader", &self.shader)
            .field("uniforms", &self.uniforms.len())
            .finish()
    }
}

impl CustomEffect {
    pub fn new(shader: Arc<dyn Shader>) -> Self {
        Self {
            shader,
            uniforms: Uniforms::default(),
        }
    }

    pub fn with_uniform(mut self, name: impl Into<String>, value: impl Into<UniformValue>) -> Self {
        self.uniforms.insert(name.into(), value.into());
        self
    }

    fn software_shader(&self) -> Option<&SoftwareShader> {
        self.shader.as_any().downcast_ref::<SoftwareShader>()
    }
}

impl Effect for CustomEffect {
    fn apply(&self, src: &dyn Texture, dst: &dyn Framebuffer, ctx: &EffectContext<'_>) {
        run(
            src,
            dst,
            ctx,
            |pass, source| {
                if self.software_shader().is_some() {
                    return None;
                }
                for (name, value) in &self.uniforms {
                    set(self.shader.as_ref(), name, *value);
                }
                set(self.shader.as_ref(), "uTexture", 0);
                pass.draw(self.shader.as_ref(), source, pass.dst, BlendMode::None, (0.0, 0.0));
                Some(())
            },
            |pixels, width, height| {
                let output = self
                    .software_shader()
                    .and_then(|shader| shader.run(pixels, width, height, &self.uniforms));
                Some(output.unwrap_or_else(|| pixels.to_vec()))
            },
        );
    }
}
