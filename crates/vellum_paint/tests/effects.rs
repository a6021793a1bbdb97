use std::sync::Arc;

use vellum_core::pixels::get_pixel;
use vellum_core::Rgba;
use vellum_gpu::software::{SoftwareFramebuffer, Uniforms};
use vellum_gpu::{Framebuffer, SoftwareDriver, Texture, UniformValue};
use vellum_paint::{
    BlurEffect, ChromaticAberrationEffect, ColorGradeEffect, CustomEffect, Effect, EffectContext,
    GlowEffect, PixelateEffect, ShaderCache, ShadowEffect, VignetteEffect,
};

/// Source texture filled from `pixels`, plus an empty destination
fn setup(
    driver: &SoftwareDriver,
    pixels: &[u8],
    width: i32,
    height: i32,
) -> (Box<dyn Texture>, SoftwareFramebuffer) {
    let src = driver.create_texture(width, height).unwrap();
    src.upload(pixels, None);
    let dst = driver.create_framebuffer(width, height).unwrap();
    (Box::new(src), dst)
}

fn apply(effect: &dyn Effect, pixels: &[u8], width: i32, height: i32) -> Vec<u8> {
    let driver = SoftwareDriver::new();
    let shaders = ShaderCache::new();
    let (src, dst) = setup(&driver, pixels, width, height);
    effect.apply(src.as_ref(), &dst, &EffectContext::new(&driver, &shaders));
    dst.software_texture().snapshot()
}

fn gradient(width: i32, height: i32) -> Vec<u8> {
    let mut pixels = Vec::new();
    for y in 0..height {
        for x in 0..width {
            pixels.extend_from_slice(&[(x * 40) as u8, (y * 40) as u8, 128, 255]);
        }
    }
    pixels
}

fn at(pixels: &[u8], width: i32, height: i32, x: i32, y: i32) -> Rgba {
    get_pixel(pixels, width, height, x, y).unwrap()
}

#[test]
fn zero_radius_blur_is_identity() {
    let src = gradient(5, 4);
    assert_eq!(apply(&BlurEffect::new(0.0), &src, 5, 4), src);
}

#[test]
fn unit_pixelate_is_identity() {
    let src = gradient(6, 3);
    assert_eq!(apply(&PixelateEffect::new(1.0), &src, 6, 3), src);
}

#[test]
fn pixelate_averages_blocks() {
    let src = gradient(4, 4);
    let out = apply(&PixelateEffect::new(2.0), &src, 4, 4);
    assert_eq!(at(&out, 4, 4, 0, 0), at(&out, 4, 4, 1, 1));
    assert_ne!(at(&out, 4, 4, 0, 0), at(&out, 4, 4, 2, 0));
}

#[test]
fn chromatic_aberration_shifts_red_and_blue() {
    let mut src = vec![0u8; 5 * 4];
    for (x, px) in src.chunks_exact_mut(4).enumerate() {
        px.copy_from_slice(&[x as u8 * 10, 7, x as u8 * 20, 255]);
    }
    let out = apply(&ChromaticAberrationEffect { amount: 1.0 }, &src, 5, 1);
    let px = at(&out, 5, 1, 2, 0);
    assert_eq!(px, Rgba::new(10, 7, 60, 255));
    // clamped at the edges
    assert_eq!(at(&out, 5, 1, 0, 0).r, 0);
    assert_eq!(at(&out, 5, 1, 4, 0).b, 80);
}

#[test]
fn vignette_darkens_corners_only() {
    let src = vec![200u8; 9 * 9 * 4];
    let out = apply(&VignetteEffect::default(), &src, 9, 9);
    assert_eq!(at(&out, 9, 9, 4, 4), at(&src, 9, 9, 4, 4));
    let corner = at(&out, 9, 9, 0, 0);
    assert!(corner.r < 200);
    assert_eq!(corner.a, 200);
}

#[test]
fn neutral_color_grade_keeps_pixels() {
    let src = gradient(3, 3);
    let out = apply(&ColorGradeEffect::default(), &src, 3, 3);
    for (a, b) in out.iter().zip(&src) {
        assert!(a.abs_diff(*b) <= 1, "{a} vs {b}");
    }
}

#[test]
fn desaturated_grade_is_gray() {
    let src = [255u8, 0, 0, 255];
    let gray = ColorGradeEffect {
        saturation: -1.0,
        ..Default::default()
    };
    let px = at(&apply(&gray, &src, 1, 1), 1, 1, 0, 0);
    assert_eq!(px.r, px.g);
    assert_eq!(px.g, px.b);
}

#[test]
fn glow_keeps_source_and_adds_halo() {
    let mut src = vec![0u8; 7 * 7 * 4];
    let center = (3 * 7 + 3) * 4;
    src[center..center + 4].copy_from_slice(&[255, 255, 255, 255]);
    let glow = GlowEffect {
        radius: 1.0,
        intensity: 1.0,
        color: Rgba::new(0, 255, 0, 255),
    };
    let out = apply(&glow, &src, 7, 7);
    assert_eq!(at(&out, 7, 7, 3, 3).a, 255);
    assert!(at(&out, 7, 7, 3, 4).a > 0);
    assert_eq!(at(&out, 7, 7, 0, 0).a, 0);
}

#[test]
fn shadow_lands_at_offset() {
    let mut src = vec![0u8; 8 * 8 * 4];
    let i = (2 * 8 + 2) * 4;
    src[i..i + 4].copy_from_slice(&[255, 0, 0, 255]);
    let shadow = ShadowEffect {
        offset_x: 3.0,
        offset_y: 3.0,
        blur: 0.0,
        color: Rgba::new(0, 0, 0, 255),
    };
    let out = apply(&shadow, &src, 8, 8);
    assert_eq!(at(&out, 8, 8, 2, 2), Rgba::new(255, 0, 0, 255));
    assert!(at(&out, 8, 8, 5, 5).a > 0);
}

#[test]
fn custom_kernel_receives_uniforms() {
    let driver = SoftwareDriver::new();
    let shader = driver.new_pixel_shader(|src: &[u8], _w, _h, uniforms: &Uniforms| {
        let level = match uniforms.get("uLevel") {
            Some(UniformValue::Float(v)) => (*v * 255.0) as u8,
            _ => 0,
        };
        src.chunks_exact(4).flat_map(|px| [level, px[1], px[2], px[3]]).collect()
    });
    let effect = CustomEffect::new(Arc::new(shader)).with_uniform("uLevel", 1.0f32);

    let shaders = ShaderCache::new();
    let (src, dst) = setup(&driver, &[1, 2, 3, 4], 1, 1);
    effect.apply(src.as_ref(), &dst, &EffectContext::new(&driver, &shaders));
    assert_eq!(dst.software_texture().snapshot(), vec![255, 2, 3, 4]);
}

#[test]
fn custom_without_kernel_copies_source() {
    let driver = SoftwareDriver::new();
    let shader = vellum_gpu::load_shader_source("texture")
        .and_then(|source| vellum_gpu::Driver::new_shader(&driver, &source))
        .unwrap();
    let effect = CustomEffect::new(Arc::from(shader));
    let src = gradient(2, 2);
    let shaders = ShaderCache::new();
    let (texture, dst) = setup(&driver, &src, 2, 2);
    effect.apply(texture.as_ref(), &dst, &EffectContext::new(&driver, &shaders));
    assert_eq!(dst.software_texture().snapshot(), src);
}

#[test]
fn mismatched_sizes_leave_destination_untouched() {
    let driver = SoftwareDriver::new();
    let shaders = ShaderCache::new();
    let src = driver.create_texture(4, 4).unwrap();
    src.upload(&[255; 4 * 4 * 4], None);
    let dst = driver.create_framebuffer(3, 4).unwrap();
    BlurEffect::new(0.0).apply(&src, &dst, &EffectContext::new(&driver, &shaders));
    assert!(dst.software_texture().snapshot().iter().all(|&b| b == 0));
    assert_eq!(dst.size(), (3, 4));
}
