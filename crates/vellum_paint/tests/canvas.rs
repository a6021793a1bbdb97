use std::time::{Duration, Instant};

use vellum_core::pixels::get_pixel;
use vellum_core::{PixelFont, Rgba};
use vellum_gpu::software::SoftwareTexture;
use vellum_gpu::{
    Backend, DrawCall, Driver, Framebuffer, GpuError, Result as GpuResult, Shader, ShaderSource,
    SoftwareDriver, Texture, TexturePixels,
};
use vellum_paint::{BlurEffect, GpuCanvas, PixelateEffect};

const RED: Rgba = Rgba::new(255, 0, 0, 255);
const GREEN: Rgba = Rgba::new(0, 255, 0, 255);

/// `RUST_LOG=vellum_paint=debug` shows fallback decisions
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn software_canvas(width: i32, height: i32) -> GpuCanvas {
    GpuCanvas::with_driver(width, height, Box::new(SoftwareDriver::new())).unwrap()
}

fn pixel_at(canvas: &GpuCanvas, x: i32, y: i32) -> Rgba {
    let (w, h) = canvas.size();
    get_pixel(&canvas.end().unwrap(), w, h, x, y).unwrap()
}

/// Drawing cost follows the canvas size, so even enormous shapes finish fast
fn within_a_second(draw: impl FnOnce()) {
    let start = Instant::now();
    draw();
    let elapsed = start.elapsed();
    assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");
}

fn all_pixels(canvas: &GpuCanvas, color: Rgba) -> bool {
    canvas.end().unwrap().chunks_exact(4).all(|px| Rgba::from_slice(px) == color)
}

#[test]
fn fill_rect_covers_whole_canvas() {
    let mut canvas = software_canvas(8, 8);
    canvas.begin();
    canvas.clear(Rgba::TRANSPARENT);
    canvas.set_fill_color(RED);
    canvas.fill_rect(0.0, 0.0, 8.0, 8.0);
    assert_eq!(pixel_at(&canvas, 4, 4), RED);
    assert_eq!(pixel_at(&canvas, 0, 0), RED);
}

#[test]
fn blur_spreads_a_single_pixel() {
    let mut canvas = software_canvas(5, 5);
    canvas.set_fill_color(Rgba::WHITE);
    canvas.fill_rect(2.0, 2.0, 0.5, 0.5);
    assert_eq!(pixel_at(&canvas, 2, 2), Rgba::WHITE);
    assert_eq!(pixel_at(&canvas, 2, 3).a, 0);

    canvas.apply_effect(&BlurEffect::new(1.0));
    assert!(pixel_at(&canvas, 2, 3).a > 0);
}

#[test]
fn empty_layer_round_trip_leaves_pixels_unchanged() {
    let mut canvas = software_canvas(6, 6);
    canvas.clear(Rgba::new(10, 20, 30, 255));
    canvas.set_fill_color(GREEN);
    canvas.fill_circle(3.0, 3.0, 2.0);
    let before = canvas.end().unwrap();

    canvas.push_layer();
    assert_eq!(canvas.layer_count(), 2);
    assert!(canvas.end().unwrap().iter().all(|&b| b == 0));
    canvas.pop_layer(&[]);

    assert_eq!(canvas.layer_count(), 1);
    assert_eq!(canvas.end().unwrap(), before);
}

#[test]
fn pop_without_push_is_ignored() {
    let mut canvas = software_canvas(2, 2);
    canvas.clear(RED);
    canvas.pop_layer(&[]);
    assert_eq!(canvas.layer_count(), 1);
    assert_eq!(pixel_at(&canvas, 1, 1), RED);
}

#[test]
fn layer_composites_over_base_through_effects() {
    let mut canvas = software_canvas(8, 8);
    canvas.clear(Rgba::BLACK);
    canvas.push_layer();
    canvas.set_fill_color(RED);
    canvas.fill_rect(0.0, 0.0, 4.0, 4.0);
    canvas.pop_layer(&[&PixelateEffect::new(1.0), &BlurEffect::new(0.0)]);

    assert_eq!(canvas.layer_count(), 1);
    assert_eq!(pixel_at(&canvas, 1, 1), RED);
    assert_eq!(pixel_at(&canvas, 6, 6), Rgba::BLACK);
}

#[test]
fn invalid_shapes_are_skipped() {
    let mut canvas = software_canvas(4, 4);
    canvas.fill_rect(0.0, 0.0, 0.0, 4.0);
    canvas.stroke_rect(0.0, 0.0, 4.0, -1.0);
    canvas.fill_circle(2.0, 2.0, 0.0);
    canvas.stroke_circle(2.0, 2.0, -1.0);
    canvas.fill_rounded_rect(0.0, 0.0, -2.0, 2.0, 1.0);
    canvas.begin_path();
    canvas.move_to(0.0, 0.0);
    canvas.line_to(3.0, 3.0);
    canvas.fill();
    assert!(canvas.end().unwrap().iter().all(|&b| b == 0));
}

#[test]
fn rounded_rect_without_radius_fills_square() {
    let mut canvas = software_canvas(6, 6);
    canvas.set_fill_color(GREEN);
    canvas.fill_rounded_rect(1.0, 1.0, 3.0, 3.0, 0.0);
    assert_eq!(pixel_at(&canvas, 1, 1), GREEN);
    assert_eq!(pixel_at(&canvas, 3, 3), GREEN);
}

#[test]
fn stroke_rect_leaves_interior_empty() {
    let mut canvas = software_canvas(10, 10);
    canvas.set_stroke_color(RED);
    canvas.stroke_rect(1.0, 1.0, 7.0, 7.0);
    assert_eq!(pixel_at(&canvas, 1, 1), RED);
    assert_eq!(pixel_at(&canvas, 8, 4), RED);
    assert_eq!(pixel_at(&canvas, 4, 4), Rgba::TRANSPARENT);
}

#[test]
fn filled_path_with_curves() {
    let mut canvas = software_canvas(16, 16);
    canvas.set_fill_color(GREEN);
    canvas.begin_path();
    canvas.move_to(2.0, 2.0);
    canvas.line_to(14.0, 2.0);
    canvas.quadratic_to(15.0, 8.0, 14.0, 14.0);
    canvas.bezier_to(10.0, 15.0, 6.0, 15.0, 2.0, 14.0);
    canvas.close_path();
    canvas.fill();
    assert_eq!(pixel_at(&canvas, 8, 8), GREEN);
    assert_eq!(pixel_at(&canvas, 0, 0), Rgba::TRANSPARENT);
}

#[test]
fn closed_path_stroke_returns_to_start() {
    let mut canvas = software_canvas(10, 10);
    canvas.set_stroke_color(RED);
    canvas.begin_path();
    canvas.move_to(1.0, 1.0);
    canvas.line_to(8.0, 1.0);
    canvas.line_to(8.0, 8.0);
    canvas.close_path();
    canvas.stroke();
    // closing diagonal from (8, 8) back to (1, 1)
    assert_eq!(pixel_at(&canvas, 4, 4), RED);
    assert_eq!(pixel_at(&canvas, 1, 8), Rgba::TRANSPARENT);
}

#[test]
fn text_renders_font_cells() {
    let mut canvas = software_canvas(20, 10);
    canvas.set_fill_color(Rgba::WHITE);
    canvas.draw_text("Hi", 1.0, 1.0);

    let frame = canvas.end().unwrap();
    let glyph = PixelFont::glyph('H').unwrap();
    for gy in 0..PixelFont::HEIGHT {
        for gx in 0..PixelFont::WIDTH {
            let px = get_pixel(&frame, 20, 10, 1 + gx, 1 + gy).unwrap();
            assert_eq!(px == Rgba::WHITE, glyph.is_set(gx, gy), "cell {gx},{gy}");
        }
    }

    let lit: usize = frame.chunks_exact(4).filter(|px| px[3] != 0).count();
    let expected: usize = ['H', 'I']
        .iter()
        .map(|ch| PixelFont::glyph(*ch).unwrap().cells().count())
        .sum();
    assert_eq!(lit, expected);
}

#[test]
fn unknown_glyph_advances_without_drawing() {
    let mut canvas = software_canvas(20, 10);
    canvas.draw_text("\u{2603}", 0.0, 0.0);
    assert!(canvas.end().unwrap().iter().all(|&b| b == 0));
}

#[test]
fn image_draws_at_offset_and_scales() {
    let mut image = Vec::new();
    for color in [RED, GREEN, GREEN, RED] {
        image.extend_from_slice(&color.to_array());
    }

    let mut canvas = software_canvas(8, 8);
    canvas.draw_image(&image, 2, 2, 1.0, 1.0);
    assert_eq!(pixel_at(&canvas, 1, 1), RED);
    assert_eq!(pixel_at(&canvas, 2, 1), GREEN);
    assert_eq!(pixel_at(&canvas, 0, 0), Rgba::TRANSPARENT);

    canvas.clear(Rgba::TRANSPARENT);
    canvas.draw_image_scaled(&image, 2, 2, 0.0, 0.0, 4.0, 4.0);
    assert_eq!(pixel_at(&canvas, 1, 1), RED);
    assert_eq!(pixel_at(&canvas, 3, 0), GREEN);
    assert_eq!(pixel_at(&canvas, 3, 3), RED);
}

#[test]
fn short_image_buffer_is_ignored() {
    let mut canvas = software_canvas(4, 4);
    canvas.draw_image(&[255; 8], 2, 2, 0.0, 0.0);
    assert!(canvas.end().unwrap().iter().all(|&b| b == 0));
}

#[test]
fn scaled_image_size_truncates() {
    let mut canvas = software_canvas(8, 2);
    canvas.draw_image_scaled(&Rgba::WHITE.to_array(), 1, 1, 0.0, 0.0, 3.9, 1.0);
    assert_eq!(pixel_at(&canvas, 2, 0), Rgba::WHITE);
    assert_eq!(pixel_at(&canvas, 3, 0), Rgba::TRANSPARENT);
}

#[test]
fn oversized_fill_is_clipped_to_canvas() {
    let mut canvas = software_canvas(8, 8);
    canvas.set_fill_color(RED);
    within_a_second(|| canvas.fill_rect(-1e5, -1e5, 2e5, 2e5));
    assert!(all_pixels(&canvas, RED));
}

#[test]
fn partially_offscreen_fill_keeps_visible_part() {
    let mut canvas = software_canvas(8, 8);
    canvas.set_fill_color(GREEN);
    within_a_second(|| canvas.fill_rect(-1e6, 4.0, 1e6 + 2.0, 1e6));
    assert_eq!(pixel_at(&canvas, 0, 4), GREEN);
    assert_eq!(pixel_at(&canvas, 1, 7), GREEN);
    assert_eq!(pixel_at(&canvas, 3, 4), Rgba::TRANSPARENT);
    assert_eq!(pixel_at(&canvas, 0, 3), Rgba::TRANSPARENT);
}

#[test]
fn offscreen_fills_leave_canvas_untouched() {
    let mut canvas = software_canvas(8, 8);
    within_a_second(|| {
        canvas.fill_rect(1e6, 1e6, 1e6, 1e6);
        canvas.fill_rect(-3e6, 0.0, 1e6, 8.0);
        canvas.fill_circle(-5e5, -5e5, 1e5);
    });
    assert!(all_pixels(&canvas, Rgba::TRANSPARENT));
}

#[test]
fn lines_beyond_integer_range_are_clipped() {
    let mut canvas = software_canvas(8, 8);
    canvas.set_stroke_color(RED);
    within_a_second(|| {
        canvas.draw_line(-3e9, 0.0, 3e9, 0.0);
        canvas.draw_line(-3e9, -3e9, -3e9, 3e9);
    });
    for x in 0..8 {
        assert_eq!(pixel_at(&canvas, x, 0), RED);
    }
    assert_eq!(pixel_at(&canvas, 0, 1), Rgba::TRANSPARENT);
}

#[test]
fn wide_stroke_of_huge_rect_paints_visible_edges() {
    let mut canvas = software_canvas(8, 8);
    canvas.set_stroke_color(GREEN);
    canvas.set_stroke_width(4.0);
    within_a_second(|| canvas.stroke_rect(2.0, 2.0, 1e7, 1e7));
    assert_eq!(pixel_at(&canvas, 5, 2), GREEN);
    assert_eq!(pixel_at(&canvas, 2, 5), GREEN);
    assert_eq!(pixel_at(&canvas, 5, 0), GREEN);
    assert_eq!(pixel_at(&canvas, 6, 6), Rgba::TRANSPARENT);
}

#[test]
fn huge_scaled_image_samples_only_visible_pixels() {
    let image: Vec<u8> = [RED, GREEN, GREEN, RED].iter().flat_map(|c| c.to_array()).collect();
    let mut canvas = software_canvas(8, 8);
    within_a_second(|| canvas.draw_image_scaled(&image, 2, 2, 0.0, 0.0, 1e6, 1e6));
    assert!(all_pixels(&canvas, RED));
}

#[test]
fn offscreen_images_are_skipped() {
    let image = vec![255u8; 4 * 4 * 4];
    let mut canvas = software_canvas(8, 8);
    within_a_second(|| {
        canvas.draw_image_scaled(&image, 4, 4, -2e6, 0.0, 1e6, 1e6);
        canvas.draw_image(&image, 4, 4, 100.0, 100.0);
    });
    assert!(all_pixels(&canvas, Rgba::TRANSPARENT));

    canvas.draw_image(&image, 4, 4, -2.0, 6.0);
    assert_eq!(pixel_at(&canvas, 1, 7), Rgba::WHITE);
    assert_eq!(pixel_at(&canvas, 2, 7), Rgba::TRANSPARENT);
    assert_eq!(pixel_at(&canvas, 1, 5), Rgba::TRANSPARENT);
}

#[test]
fn end_to_texture_snapshots_frame() {
    let mut canvas = software_canvas(3, 2);
    canvas.clear(RED);
    let texture = canvas.end_to_texture().unwrap();
    assert_eq!(texture.size(), (3, 2));
    let pixels = texture
        .as_any()
        .downcast_ref::<SoftwareTexture>()
        .unwrap()
        .snapshot();
    assert_eq!(pixels, canvas.end().unwrap());
}

#[test]
fn resize_reallocates_cleared_surface() {
    let mut canvas = software_canvas(4, 4);
    canvas.clear(RED);
    canvas.resize(6, 3).unwrap();
    assert_eq!(canvas.size(), (6, 3));
    let frame = canvas.end().unwrap();
    assert_eq!(frame.len(), 6 * 3 * 4);
    assert!(frame.iter().all(|&b| b == 0));
    assert!(canvas.resize(0, 3).is_err());
}

#[test]
fn rotation_about_origin() {
    let mut canvas = software_canvas(10, 10);
    canvas.set_fill_color(RED);
    canvas.translate(5.0, 5.0);
    canvas.rotate(std::f32::consts::FRAC_PI_2);
    // (1..3, 0..1) rotates a quarter turn onto (-1..0, 1..3)
    canvas.fill_rect(1.0, 0.0, 2.0, 1.0);
    assert_eq!(pixel_at(&canvas, 4, 7), RED);
    assert_eq!(pixel_at(&canvas, 7, 5), Rgba::TRANSPARENT);
}

/// Claims to be hardware but cannot build any resource
#[derive(Debug)]
struct BrokenDriver;

impl Driver for BrokenDriver {
    fn backend(&self) -> Backend {
        Backend::OpenGL
    }

    fn init(&self) -> GpuResult<()> {
        Ok(())
    }

    fn dispose(&self) {}

    fn new_texture(&self, _: i32, _: i32) -> GpuResult<Box<dyn Texture>> {
        Err(GpuError::unsupported("broken"))
    }

    fn new_framebuffer(&self, _: i32, _: i32) -> GpuResult<Box<dyn Framebuffer>> {
        Err(GpuError::unsupported("broken"))
    }

    fn new_shader(&self, _: &ShaderSource) -> GpuResult<Box<dyn Shader>> {
        Err(GpuError::ShaderLink("broken".into()))
    }

    fn clear(&self, _: f32, _: f32, _: f32, _: f32) {}

    fn draw(&self, _: &DrawCall<'_>) {}

    fn read_pixels(
        &self,
        _: &dyn Framebuffer,
        _: Option<vellum_core::PixelRect>,
    ) -> GpuResult<Option<Vec<u8>>> {
        Ok(None)
    }

    fn read_texture_pixels(
        &self,
        _: &dyn Texture,
        _: Option<vellum_core::PixelRect>,
    ) -> GpuResult<Option<TexturePixels>> {
        Ok(None)
    }

    fn max_texture_size(&self) -> i32 {
        0
    }

    fn instance_id(&self) -> u64 {
        u64::MAX
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[test]
fn broken_hardware_driver_rebuilds_on_software() {
    init_logging();
    let mut canvas = GpuCanvas::with_driver(4, 4, Box::new(BrokenDriver)).unwrap();
    assert!(!canvas.is_gpu());
    assert_eq!(canvas.backend(), Backend::Software);

    canvas.set_fill_color(GREEN);
    canvas.fill_rect(0.0, 0.0, 4.0, 4.0);
    assert_eq!(pixel_at(&canvas, 2, 2), GREEN);
}

#[test]
fn default_canvas_always_draws() {
    init_logging();
    let mut canvas = GpuCanvas::new(4, 4).unwrap();
    canvas.clear(RED);
    let frame = canvas.end().unwrap();
    assert_eq!(frame.len(), 4 * 4 * 4);
}
