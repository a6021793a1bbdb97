//! OpenGL and WebGL driver
//!
//! Both backends share one implementation over `glow`. GL contexts are
//! thread-affine, so on native targets every GL call runs on a dedicated
//! render thread; on wasm32 calls run inline on the page's thread.

#[cfg(not(target_arch = "wasm32"))]
mod native;
mod state;
#[cfg(target_arch = "wasm32")]
mod web;

use crate::types::UniformValue;

use state::GlState;

#[cfg(not(target_arch = "wasm32"))]
hosted_driver!(
    /// Desktop OpenGL through a headless context
    OpenGlDriver,
    GlState,
    crate::backend::Backend::OpenGL
);

#[cfg(target_arch = "wasm32")]
hosted_driver!(
    /// WebGL 2 or 1 on the page's canvas
    WebGlDriver,
    GlState,
    crate::backend::Backend::WebGL
);

/// Whether a value can be written to a uniform of GL type `gl_type`
fn accepts(gl_type: u32, value: &UniformValue) -> bool {
    match value {
        UniformValue::Int(_) => matches!(gl_type, glow::INT | glow::BOOL | glow::SAMPLER_2D),
        UniformValue::Float(_) => gl_type == glow::FLOAT,
        UniformValue::Vec2(_) => gl_type == glow::FLOAT_VEC2,
        UniformValue::Vec4(_) => gl_type == glow::FLOAT_VEC4,
        UniformValue::Mat3(_) => gl_type == glow::FLOAT_MAT3,
        UniformValue::Mat4(_) => gl_type == glow::FLOAT_MAT4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GpuError;
    use vellum_core::Matrix3;

    #[test]
    fn test_uniform_type_check() {
        assert!(accepts(glow::SAMPLER_2D, &UniformValue::Int(0)));
        assert!(accepts(glow::FLOAT_MAT3, &UniformValue::Mat3(Matrix3::IDENTITY)));
        assert!(accepts(glow::FLOAT_VEC2, &UniformValue::Vec2([1.0, 2.0])));
        assert!(!accepts(glow::FLOAT, &UniformValue::Vec4([0.0; 4])));
        assert!(!accepts(glow::FLOAT_MAT4, &UniformValue::Mat3(Matrix3::IDENTITY)));
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn test_uninitialized_driver_refuses_resources() {
        use crate::backend::Backend;
        use crate::driver::Driver;

        let driver = OpenGlDriver::new();
        assert_eq!(driver.backend(), Backend::OpenGL);
        assert_eq!(driver.max_texture_size(), 8192);
        assert!(driver.new_texture(4, 4).unwrap_err().is_unsupported());
        // size validation comes first
        let err = driver.new_framebuffer(0, 4).unwrap_err();
        assert_eq!(err, GpuError::InvalidSize { width: 0, height: 4 });
    }
}
