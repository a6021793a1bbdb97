//! The drawing surface
//!
//! A [`GpuCanvas`] renders either through a hardware driver (geometry is
//! built on the CPU in pixel space and drawn with the pipeline's programs)
//! or straight into RGBA8 buffers with the software rasterizer. The choice
//! is made once at construction; any failure on the hardware path rebuilds
//! the canvas on software.

use std::ops::{Deref, Range};

use vellum_core::pixels::{blend_pixel, buffer_len, clear_pixels, get_pixel, set_pixel};
use vellum_core::{
    circle_points, raster, rounded_rect_points, triangulate_polygon, Matrix3, Path, PathOp,
    PixelFont, PixelRect, Rgba, Vec2,
};
use vellum_gpu::{
    new_driver, Backend, BlendMode, DrawCall, Driver, Framebuffer, GpuError,
    Result as GpuResult, SoftwareDriver, SoftwareFramebuffer, Texture,
};

use crate::config::CanvasConfig;
use crate::effects::{Effect, EffectContext, ShaderCache};
use crate::error::Result;
use crate::pipeline::{rect_corners, GpuPipeline, QuadBatch};

enum Surface {
    Gpu {
        layers: Vec<Box<dyn Framebuffer>>,
        pipeline: GpuPipeline,
        driver: Box<dyn Driver>,
    },
    Raster {
        layers: Vec<SoftwareFramebuffer>,
        /// Always a [`SoftwareDriver`]
        driver: Box<dyn Driver>,
    },
}

impl Surface {
    fn gpu(driver: Box<dyn Driver>, width: i32, height: i32) -> GpuResult<Self> {
        let pipeline = GpuPipeline::new(driver.as_ref(), width, height)?;
        let base = driver.new_framebuffer(width, height)?;
        Ok(Surface::Gpu {
            layers: vec![base],
            pipeline,
            driver,
        })
    }

    fn raster(driver: Box<dyn Driver>, width: i32, height: i32) -> GpuResult<Self> {
        let driver: Box<dyn Driver> = if driver.as_any().is::<SoftwareDriver>() {
            driver
        } else {
            Box::new(SoftwareDriver::new())
        };
        let base = raster_target(driver.as_ref(), width, height)?;
        Ok(Surface::Raster {
            layers: vec![base],
            driver,
        })
    }

    fn driver(&self) -> &dyn Driver {
        match self {
            Surface::Gpu { driver, .. } | Surface::Raster { driver, .. } => driver.as_ref(),
        }
    }
}

fn raster_target(driver: &dyn Driver, width: i32, height: i32) -> GpuResult<SoftwareFramebuffer> {
    driver
        .as_any()
        .downcast_ref::<SoftwareDriver>()
        .ok_or_else(|| GpuError::unsupported("raster surface without a software driver"))?
        .create_framebuffer(width, height)
}

fn check_size(width: i32, height: i32) -> GpuResult<()> {
    if width <= 0 || height <= 0 {
        return Err(GpuError::InvalidSize { width, height });
    }
    Ok(())
}

/// Overwrite opaque colors, blend translucent ones
fn paint(pixels: &mut [u8], width: i32, height: i32, x: i32, y: i32, color: Rgba) {
    if color.is_opaque() {
        set_pixel(pixels, width, height, x, y, color);
    } else {
        blend_pixel(pixels, width, height, x, y, color);
    }
}

fn blend_for(color: Rgba) -> BlendMode {
    if color.is_opaque() {
        BlendMode::None
    } else {
        BlendMode::Alpha
    }
}

fn round_point(p: Vec2) -> (i32, i32) {
    (p.x.round() as i32, p.y.round() as i32)
}

/// Columns and rows of a `size` image placed at `origin` whose mapped
/// position can land on a `surface`-sized layer
fn visible_span(
    transform: &Matrix3,
    origin: Vec2,
    size: (i32, i32),
    surface: (i32, i32),
) -> Option<(Range<i32>, Range<i32>)> {
    let inverse = transform.invert()?;
    let (w, h) = (surface.0 as f32 + 1.0, surface.1 as f32 + 1.0);
    let corners = [
        Vec2::new(-1.0, -1.0),
        Vec2::new(w, -1.0),
        Vec2::new(w, h),
        Vec2::new(-1.0, h),
    ]
    .map(|c| inverse.apply(c));
    let (mut lo, mut hi) = (corners[0], corners[0]);
    for c in &corners[1..] {
        lo = Vec2::new(lo.x.min(c.x), lo.y.min(c.y));
        hi = Vec2::new(hi.x.max(c.x), hi.y.max(c.y));
    }

    let span = |from: f32, to: f32, len: i32| {
        let start = from.floor().max(0.0).min(len as f32) as i32;
        let end = (to.ceil() + 1.0).max(0.0).min(len as f32) as i32;
        start..end
    };
    let cols = span(lo.x - origin.x, hi.x - origin.x, size.0);
    let rows = span(lo.y - origin.y, hi.y - origin.y, size.1);
    (!cols.is_empty() && !rows.is_empty()).then_some((cols, rows))
}

/// Quad covering a `width`-wide line from `a` to `b`, `None` when degenerate
fn line_quad(a: Vec2, b: Vec2, width: f32) -> Option<[Vec2; 4]> {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len = dx.hypot(dy);
    if len == 0.0 {
        return None;
    }
    let half = if width > 0.0 { width / 2.0 } else { 0.5 };
    let (nx, ny) = (-dy / len * half, dx / len * half);
    Some([
        Vec2::new(a.x + nx, a.y + ny),
        Vec2::new(a.x - nx, a.y - ny),
        Vec2::new(b.x - nx, b.y - ny),
        Vec2::new(b.x + nx, b.y + ny),
    ])
}

/// Texture returned by [`GpuCanvas::end_to_texture`]
pub enum FrameTexture<'a> {
    /// The canvas's own layer texture, valid until the next draw
    Borrowed(&'a dyn Texture),
    /// A snapshot owned by the caller
    Owned(Box<dyn Texture>),
}

impl<'a> Deref for FrameTexture<'a> {
    type Target = dyn Texture + 'a;

    fn deref(&self) -> &Self::Target {
        match self {
            FrameTexture::Borrowed(texture) => *texture,
            FrameTexture::Owned(texture) => texture.as_ref(),
        }
    }
}

/// Immediate-mode 2D canvas over a GPU or software driver
pub struct GpuCanvas {
    width: i32,
    height: i32,
    shaders: ShaderCache,
    surface: Surface,
    transform: Matrix3,
    saved: Vec<Matrix3>,
    fill_color: Rgba,
    stroke_color: Rgba,
    stroke_width: f32,
    path: Path,
    current: Option<Vec2>,
    subpath_start: Vec2,
}

impl std::fmt::Debug for GpuCanvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuCanvas")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("backend", &self.backend())
            .field("layers", &self.layer_count())
            .finish()
    }
}

impl GpuCanvas {
    /// Canvas on the best available driver
    pub fn new(width: i32, height: i32) -> Result<Self> {
        check_size(width, height)?;
        let driver = new_driver(Backend::Auto).unwrap_or_else(|err| {
            tracing::debug!("auto driver failed ({}); using software", err);
            Box::new(SoftwareDriver::new()) as Box<dyn Driver>
        });
        Self::with_driver(width, height, driver)
    }

    /// Canvas on a caller-chosen driver. A driver that fails to initialize,
    /// or a hardware surface that cannot be built, is replaced by software.
    pub fn with_driver(width: i32, height: i32, driver: Box<dyn Driver>) -> Result<Self> {
        check_size(width, height)?;

        let surface = match driver.init() {
            Err(err) => {
                tracing::debug!("{} driver init failed: {}; using software", driver.backend(), err);
                Surface::raster(Box::new(SoftwareDriver::new()), width, height)?
            }
            Ok(()) if driver.backend() == Backend::Software => {
                Surface::raster(driver, width, height)?
            }
            Ok(()) => {
                let backend = driver.backend();
                match Surface::gpu(driver, width, height) {
                    Ok(surface) => surface,
                    Err(err) => {
                        tracing::debug!(
                            "{} canvas setup failed: {}; rebuilding on software",
                            backend,
                            err
                        );
                        Surface::raster(Box::new(SoftwareDriver::new()), width, height)?
                    }
                }
            }
        };

        tracing::info!(
            "canvas created: {}x{} on {}",
            width,
            height,
            surface.driver().backend()
        );
        Ok(Self {
            width,
            height,
            shaders: ShaderCache::new(),
            surface,
            transform: Matrix3::IDENTITY,
            saved: Vec::new(),
            fill_color: Rgba::WHITE,
            stroke_color: Rgba::WHITE,
            stroke_width: 1.0,
            path: Path::new(),
            current: None,
            subpath_start: Vec2::ZERO,
        })
    }

    /// Canvas sized and backed as configured; an unavailable backend falls
    /// back to software
    pub fn from_config(config: &CanvasConfig) -> Result<Self> {
        check_size(config.width, config.height)?;
        let driver = new_driver(config.backend).unwrap_or_else(|err| {
            tracing::debug!("{} backend unavailable ({}); using software", config.backend, err);
            Box::new(SoftwareDriver::new()) as Box<dyn Driver>
        });
        Self::with_driver(config.width, config.height, driver)
    }

    pub fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    pub fn backend(&self) -> Backend {
        self.surface.driver().backend()
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self.surface, Surface::Gpu { .. })
    }

    pub fn driver(&self) -> &dyn Driver {
        self.surface.driver()
    }

    pub fn shader_cache(&self) -> &ShaderCache {
        &self.shaders
    }

    /// Number of layers including the base
    pub fn layer_count(&self) -> usize {
        match &self.surface {
            Surface::Gpu { layers, .. } => layers.len(),
            Surface::Raster { layers, .. } => layers.len(),
        }
    }

    /// Reallocate at a new size. Contents and pushed layers are discarded.
    pub fn resize(&mut self, width: i32, height: i32) -> Result<()> {
        check_size(width, height)?;
        match &mut self.surface {
            Surface::Gpu {
                layers,
                pipeline,
                driver,
            } => {
                let base = driver.new_framebuffer(width, height)?;
                *layers = vec![base];
                pipeline.set_projection(width, height);
            }
            Surface::Raster { layers, driver } => {
                let base = raster_target(driver.as_ref(), width, height)?;
                *layers = vec![base];
            }
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Start a frame: the path is reset
    pub fn begin(&mut self) {
        self.begin_path();
    }

    /// RGBA8 pixels of the current layer
    pub fn end(&self) -> Option<Vec<u8>> {
        match &self.surface {
            Surface::Gpu { layers, driver, .. } => driver
                .read_pixels(layers.last()?.as_ref(), None)
                .map_err(|err| tracing::debug!("frame readback failed: {}", err))
                .ok()
                .flatten(),
            Surface::Raster { layers, .. } => Some(layers.last()?.software_texture().snapshot()),
        }
    }

    /// The frame as a texture: the live layer texture on GPU, a copy on
    /// software
    pub fn end_to_texture(&self) -> Option<FrameTexture<'_>> {
        match &self.surface {
            Surface::Gpu { layers, .. } => Some(FrameTexture::Borrowed(layers.last()?.texture())),
            Surface::Raster { layers, driver } => {
                let pixels = layers.last()?.software_texture().snapshot();
                let texture = driver.new_texture(self.width, self.height).ok()?;
                texture.upload(&pixels, None);
                Some(FrameTexture::Owned(texture))
            }
        }
    }

    // === State ===

    pub fn set_fill_color(&mut self, color: Rgba) {
        self.fill_color = color;
    }

    pub fn set_stroke_color(&mut self, color: Rgba) {
        self.stroke_color = color;
    }

    /// Non-positive widths reset to 1
    pub fn set_stroke_width(&mut self, width: f32) {
        self.stroke_width = if width > 0.0 { width } else { 1.0 };
    }

    pub fn fill_color(&self) -> Rgba {
        self.fill_color
    }

    pub fn stroke_color(&self) -> Rgba {
        self.stroke_color
    }

    pub fn stroke_width(&self) -> f32 {
        self.stroke_width
    }

    pub fn transform(&self) -> Matrix3 {
        self.transform
    }

    pub fn save(&mut self) {
        self.saved.push(self.transform);
    }

    pub fn restore(&mut self) {
        if let Some(transform) = self.saved.pop() {
            self.transform = transform;
        }
    }

    pub fn translate(&mut self, x: f32, y: f32) {
        self.transform = self.transform.mul(&Matrix3::translate(x, y));
    }

    pub fn rotate(&mut self, radians: f32) {
        self.transform = self.transform.mul(&Matrix3::rotate(radians));
    }

    pub fn scale(&mut self, sx: f32, sy: f32) {
        self.transform = self.transform.mul(&Matrix3::scale(sx, sy));
    }

    /// Fill the current layer with `color`, ignoring the transform
    pub fn clear(&mut self, color: Rgba) {
        match &self.surface {
            Surface::Gpu { layers, driver, .. } => {
                if let Some(top) = layers.last() {
                    top.bind();
                    let [r, g, b, a] = color.to_f32_array();
                    driver.clear(r, g, b, a);
                }
            }
            Surface::Raster { .. } => self.with_pixels(|pixels, _, _| clear_pixels(pixels, color)),
        }
    }

    // === Shapes ===

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        if w <= 0.0 || h <= 0.0 {
            return;
        }
        self.fill_polygon(&rect_corners(x, y, w, h), self.fill_color);
    }

    pub fn stroke_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        if w <= 0.0 || h <= 0.0 {
            return;
        }
        self.stroke_points(&rect_corners(x, y, w, h), true);
    }

    pub fn fill_rounded_rect(&mut self, x: f32, y: f32, w: f32, h: f32, radius: f32) {
        if w <= 0.0 || h <= 0.0 {
            return;
        }
        if radius <= 0.0 {
            self.fill_rect(x, y, w, h);
            return;
        }
        self.fill_polygon(&rounded_rect_points(x, y, w, h, radius), self.fill_color);
    }

    pub fn fill_circle(&mut self, cx: f32, cy: f32, r: f32) {
        if r <= 0.0 {
            return;
        }
        self.fill_polygon(&circle_points(cx, cy, r), self.fill_color);
    }

    pub fn stroke_circle(&mut self, cx: f32, cy: f32, r: f32) {
        if r <= 0.0 {
            return;
        }
        self.stroke_points(&circle_points(cx, cy, r), true);
    }

    pub fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.stroke_points(&[Vec2::new(x1, y1), Vec2::new(x2, y2)], false);
    }

    // === Paths ===

    pub fn begin_path(&mut self) {
        self.path.clear();
        self.current = None;
    }

    pub fn move_to(&mut self, x: f32, y: f32) {
        let p = Vec2::new(x, y);
        self.path.push(PathOp::Move(p));
        self.current = Some(p);
        self.subpath_start = p;
    }

    pub fn line_to(&mut self, x: f32, y: f32) {
        if self.current.is_none() {
            return;
        }
        let p = Vec2::new(x, y);
        self.path.push(PathOp::Line(p));
        self.current = Some(p);
    }

    pub fn quadratic_to(&mut self, cx: f32, cy: f32, x: f32, y: f32) {
        if self.current.is_none() {
            return;
        }
        let end = Vec2::new(x, y);
        self.path.push(PathOp::Quad {
            control: Vec2::new(cx, cy),
            end,
        });
        self.current = Some(end);
    }

    pub fn bezier_to(&mut self, c1x: f32, c1y: f32, c2x: f32, c2y: f32, x: f32, y: f32) {
        if self.current.is_none() {
            return;
        }
        let end = Vec2::new(x, y);
        self.path.push(PathOp::Cubic {
            control1: Vec2::new(c1x, c1y),
            control2: Vec2::new(c2x, c2y),
            end,
        });
        self.current = Some(end);
    }

    pub fn close_path(&mut self) {
        if self.current.is_none() {
            return;
        }
        self.path.push(PathOp::Close);
        self.current = Some(self.subpath_start);
    }

    pub fn fill(&mut self) {
        if self.path.is_empty() {
            return;
        }
        let points = self.path.flatten();
        self.fill_polygon(&points, self.fill_color);
    }

    pub fn stroke(&mut self) {
        if self.path.is_empty() {
            return;
        }
        let points = self.path.flatten();
        self.stroke_points(&points, self.path.is_closed());
    }

    // === Images and text ===

    /// Draw an RGBA8 image at its natural size
    pub fn draw_image(&mut self, pixels: &[u8], width: i32, height: i32, x: f32, y: f32) {
        self.draw_image_scaled(pixels, width, height, x, y, width as f32, height as f32);
    }

    /// Draw an RGBA8 image scaled to `dw` x `dh`
    #[allow(clippy::too_many_arguments)]
    pub fn draw_image_scaled(
        &mut self,
        pixels: &[u8],
        width: i32,
        height: i32,
        x: f32,
        y: f32,
        dw: f32,
        dh: f32,
    ) {
        if width <= 0 || height <= 0 || dw <= 0.0 || dh <= 0.0 {
            return;
        }
        if pixels.len() < buffer_len(width, height) {
            tracing::debug!("image skipped: {} bytes for {}x{}", pixels.len(), width, height);
            return;
        }

        if let Surface::Gpu { driver, .. } = &self.surface {
            let texture = match driver.new_texture(width, height) {
                Ok(texture) => texture,
                Err(err) => {
                    tracing::debug!("image texture: {}", err);
                    return;
                }
            };
            texture.upload(pixels, None);
            let mut quad = QuadBatch::textured();
            quad.push_textured(self.map_corners(rect_corners(x, y, dw, dh)));
            self.draw_textured(texture.as_ref(), &quad, BlendMode::Alpha);
            return;
        }

        let (sw, sh) = (dw as i32, dh as i32);
        if sw <= 0 || sh <= 0 {
            return;
        }
        let transform = self.transform;
        self.with_pixels(|dst, w, h| {
            let Some((cols, rows)) = visible_span(&transform, Vec2::new(x, y), (sw, sh), (w, h))
            else {
                return;
            };
            // nearest-neighbour sampling, one source lookup per destination pixel
            for sy in rows {
                let src_y = (sy as i64 * height as i64 / sh as i64) as i32;
                for sx in cols.clone() {
                    let src_x = (sx as i64 * width as i64 / sw as i64) as i32;
                    let Some(color) = get_pixel(pixels, width, height, src_x, src_y) else {
                        continue;
                    };
                    let p = transform.apply(Vec2::new(x + sx as f32, y + sy as f32));
                    let (px, py) = round_point(p);
                    paint(dst, w, h, px, py, color);
                }
            }
        });
    }

    /// Draw `text` in the built-in pixel font with its top-left at `(x, y)`
    pub fn draw_text(&mut self, text: &str, x: f32, y: f32) {
        if text.is_empty() {
            return;
        }
        let color = self.fill_color;
        let cells = text.chars().enumerate().flat_map(|(i, ch)| {
            let origin = x + (i as i32 * PixelFont::advance()) as f32;
            PixelFont::glyph(ch)
                .into_iter()
                .flat_map(move |glyph| glyph.cells().collect::<Vec<_>>())
                .map(move |(gx, gy)| Vec2::new(origin + gx as f32, y + gy as f32))
        });

        if self.is_gpu() {
            let mut batch = QuadBatch::solid();
            for cell in cells {
                let corners = self.map_corners(rect_corners(cell.x, cell.y, 1.0, 1.0));
                if !batch.push_solid(corners, color) {
                    self.draw_solid(&batch.vertices, &batch.indices, blend_for(color));
                    batch.clear();
                    batch.push_solid(corners, color);
                }
            }
            self.draw_solid(&batch.vertices, &batch.indices, blend_for(color));
            return;
        }

        let points: Vec<(i32, i32)> = cells.map(|p| round_point(self.transform.apply(p))).collect();
        self.with_pixels(|pixels, w, h| {
            for (px, py) in points {
                paint(pixels, w, h, px, py, color);
            }
        });
    }

    // === Layers and effects ===

    /// Run `effect` over the current layer in place
    pub fn apply_effect(&mut self, effect: &dyn Effect) {
        let (width, height) = (self.width, self.height);
        let shaders = &self.shaders;
        match &mut self.surface {
            Surface::Gpu { layers, driver, .. } => {
                let driver: &dyn Driver = driver.as_ref();
                let Some(top) = layers.last_mut() else {
                    return;
                };
                let dst = match driver.new_framebuffer(width, height) {
                    Ok(fb) => fb,
                    Err(err) => {
                        tracing::debug!("effect target: {}", err);
                        return;
                    }
                };
                effect.apply(top.texture(), dst.as_ref(), &EffectContext::new(driver, shaders));
                *top = dst;
            }
            Surface::Raster { layers, driver } => {
                let driver: &dyn Driver = driver.as_ref();
                let Some(top) = layers.last_mut() else {
                    return;
                };
                let Ok(dst) = raster_target(driver, width, height) else {
                    return;
                };
                effect.apply(top.texture(), &dst, &EffectContext::new(driver, shaders));
                *top = dst;
            }
        }
    }

    /// Start drawing into a new transparent layer
    pub fn push_layer(&mut self) {
        let (width, height) = (self.width, self.height);
        let pushed = match &mut self.surface {
            Surface::Gpu { layers, driver, .. } => driver
                .new_framebuffer(width, height)
                .map(|fb| layers.push(fb)),
            Surface::Raster { layers, driver } => {
                raster_target(driver.as_ref(), width, height).map(|fb| layers.push(fb))
            }
        };
        if let Err(err) = pushed {
            tracing::debug!("push_layer failed: {}", err);
        }
    }

    /// Remove the current layer, run it through `effects` in order and
    /// composite the result onto the layer below
    pub fn pop_layer(&mut self, effects: &[&dyn Effect]) {
        if self.layer_count() < 2 {
            tracing::debug!("pop_layer without a pushed layer");
            return;
        }
        let (width, height) = (self.width, self.height);
        let shaders = &self.shaders;
        match &mut self.surface {
            Surface::Gpu {
                layers,
                pipeline,
                driver,
            } => {
                let driver: &dyn Driver = driver.as_ref();
                let Some(mut layer) = layers.pop() else {
                    return;
                };
                let ctx = EffectContext::new(driver, shaders);
                for effect in effects {
                    match driver.new_framebuffer(width, height) {
                        Ok(next) => {
                            effect.apply(layer.texture(), next.as_ref(), &ctx);
                            layer = next;
                        }
                        Err(err) => {
                            tracing::debug!("layer effect target: {}", err);
                            break;
                        }
                    }
                }

                let Some(target) = layers.last() else {
                    return;
                };
                let mut quad = QuadBatch::textured();
                quad.push_textured(rect_corners(0.0, 0.0, width as f32, height as f32));
                driver.draw(
                    &DrawCall::new(pipeline.texture(), &quad.vertices, &quad.indices)
                        .with_texture(layer.texture())
                        .with_target(target.as_ref())
                        .with_blend(BlendMode::Alpha)
                        .with_layout(pipeline.texture_layout()),
                );
            }
            Surface::Raster { layers, driver } => {
                let driver: &dyn Driver = driver.as_ref();
                let Some(mut layer) = layers.pop() else {
                    return;
                };
                let ctx = EffectContext::new(driver, shaders);
                for effect in effects {
                    let Ok(next) = raster_target(driver, width, height) else {
                        break;
                    };
                    effect.apply(layer.texture(), &next, &ctx);
                    layer = next;
                }

                let Some(target) = layers.last() else {
                    return;
                };
                layer.software_texture().with_pixels(|src| {
                    target.software_texture().with_pixels_mut(|dst| {
                        for (i, px) in src.chunks_exact(4).enumerate() {
                            if px[3] == 0 {
                                continue;
                            }
                            let (x, y) = (i as i32 % width, i as i32 / width);
                            blend_pixel(dst, width, height, x, y, Rgba::from_slice(px));
                        }
                    })
                });
            }
        }
    }

    /// Release every resource now; dropping the canvas does the same
    pub fn dispose(self) {
        drop(self);
    }

    // === Internals ===

    fn map_corners(&self, corners: [Vec2; 4]) -> [Vec2; 4] {
        corners.map(|p| self.transform.apply(p))
    }

    fn with_pixels(&self, f: impl FnOnce(&mut [u8], i32, i32)) {
        if let Surface::Raster { layers, .. } = &self.surface {
            if let Some(top) = layers.last() {
                let (width, height) = top.size();
                top.software_texture()
                    .with_pixels_mut(|pixels| f(pixels, width, height));
            }
        }
    }

    fn draw_solid(&self, vertices: &[f32], indices: &[u16], blend: BlendMode) {
        let Surface::Gpu {
            layers,
            pipeline,
            driver,
        } = &self.surface
        else {
            return;
        };
        let Some(target) = layers.last() else {
            return;
        };
        if vertices.is_empty() || indices.is_empty() {
            return;
        }
        driver.draw(
            &DrawCall::new(pipeline.solid(), vertices, indices)
                .with_target(target.as_ref())
                .with_blend(blend)
                .with_layout(pipeline.solid_layout()),
        );
    }

    fn draw_textured(&self, texture: &dyn Texture, quad: &QuadBatch, blend: BlendMode) {
        let Surface::Gpu {
            layers,
            pipeline,
            driver,
        } = &self.surface
        else {
            return;
        };
        let Some(target) = layers.last() else {
            return;
        };
        driver.draw(
            &DrawCall::new(pipeline.texture(), &quad.vertices, &quad.indices)
                .with_texture(texture)
                .with_target(target.as_ref())
                .with_blend(blend)
                .with_layout(pipeline.texture_layout()),
        );
    }

    /// Fill a polygon given in user space
    fn fill_polygon(&self, points: &[Vec2], color: Rgba) {
        if points.len() < 3 {
            return;
        }
        let mapped: Vec<Vec2> = points.iter().map(|p| self.transform.apply(*p)).collect();

        if self.is_gpu() {
            let triangulation = triangulate_polygon(&mapped);
            if triangulation.is_empty() {
                return;
            }
            let [r, g, b, a] = color.to_f32_array();
            let vertices: Vec<f32> = triangulation
                .points
                .iter()
                .flat_map(|p| [p.x, p.y, r, g, b, a])
                .collect();
            self.draw_solid(&vertices, &triangulation.indices, blend_for(color));
            return;
        }

        self.with_pixels(|pixels, w, h| {
            raster::fill_polygon(&mapped, PixelRect::from_size(w, h), |x, y| {
                paint(pixels, w, h, x, y, color)
            });
        });
    }

    /// Stroke consecutive user-space points with the stroke color and width
    fn stroke_points(&self, points: &[Vec2], closed: bool) {
        if points.len() < 2 {
            return;
        }
        let mut mapped: Vec<Vec2> = points.iter().map(|p| self.transform.apply(*p)).collect();
        if closed && mapped.len() > 2 {
            mapped.push(mapped[0]);
        }
        let color = self.stroke_color;
        let width = self.stroke_width;

        if self.is_gpu() {
            let mut batch = QuadBatch::solid();
            for segment in mapped.windows(2) {
                let Some(corners) = line_quad(segment[0], segment[1], width) else {
                    continue;
                };
                if !batch.push_solid(corners, color) {
                    self.draw_solid(&batch.vertices, &batch.indices, blend_for(color));
                    batch.clear();
                    batch.push_solid(corners, color);
                }
            }
            self.draw_solid(&batch.vertices, &batch.indices, blend_for(color));
            return;
        }

        let radius = (width > 1.0).then_some(width / 2.0);
        // disc centres this far outside the layer can still reach it
        let reach = radius.map_or(1, |r| (r.ceil() as i32).saturating_add(1));
        self.with_pixels(|pixels, w, h| {
            let layer = PixelRect::from_size(w, h);
            let centres =
                PixelRect::new(-reach, -reach, w.saturating_add(reach), h.saturating_add(reach));
            for segment in mapped.windows(2) {
                let Some((a, b)) = raster::clip_segment(segment[0], segment[1], centres) else {
                    continue;
                };
                let (x0, y0) = round_point(a);
                let (x1, y1) = round_point(b);
                raster::draw_line(x0, y0, x1, y1, centres, |x, y| match radius {
                    Some(r) => raster::fill_circle_at(x, y, r, layer, |cx, cy| {
                        paint(pixels, w, h, cx, cy, color)
                    }),
                    None => paint(pixels, w, h, x, y, color),
                });
            }
        });
    }
}

impl Drop for GpuCanvas {
    fn drop(&mut self) {
        self.shaders.clear();
        match &mut self.surface {
            Surface::Gpu { layers, driver, .. } => {
                layers.clear();
                driver.dispose();
            }
            Surface::Raster { layers, driver } => {
                layers.clear();
                driver.dispose();
            }
        }
    }
}
