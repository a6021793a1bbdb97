//! Baseline GPU programs and quad geometry

use vellum_core::{Matrix3, Rgba, Vec2};
use vellum_gpu::{
    load_shader_source, Driver, GpuError, Shader, UniformValue, VertexFormat, VertexLayout,
};

/// Largest vertex index a `u16` index buffer can address
pub const MAX_VERTICES: usize = u16::MAX as usize;

/// Solid-color and textured-quad programs plus the pixel-space projection
#[derive(Debug)]
pub struct GpuPipeline {
    solid: Box<dyn Shader>,
    texture: Box<dyn Shader>,
    projection: Matrix3,
    solid_layout: VertexLayout,
    texture_layout: VertexLayout,
}

impl GpuPipeline {
    pub fn new(driver: &dyn Driver, width: i32, height: i32) -> Result<Self, GpuError> {
        let solid = driver.new_shader(&load_shader_source("solid")?)?;
        let texture = driver.new_shader(&load_shader_source("texture")?)?;
        texture.set_uniform("uTexture", UniformValue::Int(0))?;

        let mut pipeline = Self {
            solid,
            texture,
            projection: Matrix3::IDENTITY,
            solid_layout: VertexFormat::PosColor.layout(),
            texture_layout: VertexFormat::PosUv.layout(),
        };
        pipeline.set_projection(width, height);
        Ok(pipeline)
    }

    /// Map `0..width` x `0..height` (y down) to clip space; identity for an
    /// empty size
    pub fn projection(width: i32, height: i32) -> Matrix3 {
        if width <= 0 || height <= 0 {
            return Matrix3::IDENTITY;
        }
        let sx = 2.0 / width as f32;
        let sy = -2.0 / height as f32;
        Matrix3([sx, 0.0, -1.0, 0.0, sy, 1.0, 0.0, 0.0, 1.0])
    }

    pub fn set_projection(&mut self, width: i32, height: i32) {
        self.projection = Self::projection(width, height);
        for shader in [&self.solid, &self.texture] {
            if let Err(err) = shader.set_uniform("uTransform", self.projection.into()) {
                tracing::debug!("pipeline projection not applied: {}", err);
            }
        }
    }

    pub fn current_projection(&self) -> Matrix3 {
        self.projection
    }

    pub fn solid(&self) -> &dyn Shader {
        self.solid.as_ref()
    }

    pub fn texture(&self) -> &dyn Shader {
        self.texture.as_ref()
    }

    pub fn solid_layout(&self) -> &VertexLayout {
        &self.solid_layout
    }

    pub fn texture_layout(&self) -> &VertexLayout {
        &self.texture_layout
    }
}

/// Interleaved geometry for one draw call
#[derive(Clone, Debug, Default)]
pub struct QuadBatch {
    pub vertices: Vec<f32>,
    pub indices: Vec<u16>,
    floats_per_vertex: usize,
}

impl QuadBatch {
    pub fn solid() -> Self {
        Self {
            floats_per_vertex: VertexFormat::PosColor.floats_per_vertex(),
            ..Default::default()
        }
    }

    pub fn textured() -> Self {
        Self {
            floats_per_vertex: VertexFormat::PosUv.floats_per_vertex(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / self.floats_per_vertex.max(1)
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }

    /// Append a colored quad with corners in drawing order. Returns false
    /// when the batch has no room left for four more vertices.
    pub fn push_solid(&mut self, corners: [Vec2; 4], color: Rgba) -> bool {
        let base = self.vertex_count();
        if base + 4 > MAX_VERTICES {
            return false;
        }
        let [r, g, b, a] = color.to_f32_array();
        for p in corners {
            self.vertices.extend_from_slice(&[p.x, p.y, r, g, b, a]);
        }
        self.push_quad_indices(base);
        true
    }

    /// Append a textured quad; the first corner samples the image's top-left
    pub fn push_textured(&mut self, corners: [Vec2; 4]) -> bool {
        let base = self.vertex_count();
        if base + 4 > MAX_VERTICES {
            return false;
        }
        const UV: [[f32; 2]; 4] = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];
        for (p, uv) in corners.into_iter().zip(UV) {
            self.vertices.extend_from_slice(&[p.x, p.y, uv[0], uv[1]]);
        }
        self.push_quad_indices(base);
        true
    }

    fn push_quad_indices(&mut self, base: usize) {
        let b = base as u16;
        self.indices.extend_from_slice(&[b, b + 1, b + 2, b + 2, b + 3, b]);
    }
}

/// Corners of an axis-aligned rect, clockwise from the top-left
pub fn rect_corners(x: f32, y: f32, w: f32, h: f32) -> [Vec2; 4] {
    [
        Vec2::new(x, y),
        Vec2::new(x + w, y),
        Vec2::new(x + w, y + h),
        Vec2::new(x, y + h),
    ]
}

/// Full-target quad in clip space, shifted by a pixel offset
pub fn clip_quad(width: i32, height: i32, offset_x: f32, offset_y: f32) -> QuadBatch {
    let dx = if width > 0 { offset_x / width as f32 * 2.0 } else { 0.0 };
    let dy = if height > 0 { -offset_y / height as f32 * 2.0 } else { 0.0 };
    let mut quad = QuadBatch::textured();
    quad.push_textured([
        Vec2::new(-1.0 + dx, 1.0 + dy),
        Vec2::new(1.0 + dx, 1.0 + dy),
        Vec2::new(1.0 + dx, -1.0 + dy),
        Vec2::new(-1.0 + dx, -1.0 + dy),
    ]);
    quad
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_gpu::SoftwareDriver;

    #[test]
    fn test_projection_maps_corners() {
        let m = GpuPipeline::projection(200, 100);
        let top_left = m.apply(Vec2::new(0.0, 0.0));
        let bottom_right = m.apply(Vec2::new(200.0, 100.0));
        assert!(top_left.approx_eq(Vec2::new(-1.0, 1.0), 1e-6));
        assert!(bottom_right.approx_eq(Vec2::new(1.0, -1.0), 1e-6));
        assert!(GpuPipeline::projection(0, 10).is_identity());
    }

    #[test]
    fn test_pipeline_builds_on_software() {
        let driver = SoftwareDriver::new();
        let pipeline = GpuPipeline::new(&driver, 4, 4).unwrap();
        assert_eq!(pipeline.solid_layout().stride, 24);
        assert_eq!(pipeline.texture_layout().stride, 16);
        assert!(!pipeline.current_projection().is_identity());
    }

    #[test]
    fn test_solid_quad_indices() {
        let mut batch = QuadBatch::solid();
        assert!(batch.push_solid(rect_corners(0.0, 0.0, 1.0, 1.0), Rgba::WHITE));
        assert!(batch.push_solid(rect_corners(1.0, 1.0, 1.0, 1.0), Rgba::BLACK));
        assert_eq!(batch.vertices.len(), 48);
        assert_eq!(&batch.indices[6..], &[4, 5, 6, 6, 7, 4]);
        assert_eq!(batch.vertex_count(), 8);
    }

    #[test]
    fn test_batch_refuses_overflow() {
        let mut batch = QuadBatch::solid();
        let corners = rect_corners(0.0, 0.0, 1.0, 1.0);
        while batch.push_solid(corners, Rgba::WHITE) {}
        assert!(batch.vertex_count() + 4 > MAX_VERTICES);
        assert_eq!(batch.vertex_count() % 4, 0);
    }

    #[test]
    fn test_clip_quad_offset() {
        let quad = clip_quad(10, 20, 5.0, 10.0);
        assert_eq!(&quad.vertices[0..4], &[0.0, 0.0, 0.0, 1.0]);
        assert_eq!(quad.indices, vec![0, 1, 2, 2, 3, 0]);
    }
}
