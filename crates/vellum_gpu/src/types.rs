//! Draw submission types shared by all drivers

use vellum_core::{Matrix3, PixelRect, Rgba};

use crate::driver::{Framebuffer, Shader, Texture};
use crate::layout::{VertexFormat, VertexLayout};

/// How a draw combines with the target
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Overwrite the target
    #[default]
    None,
    /// Standard over-compositing
    Alpha,
    /// Source added onto destination
    Additive,
}

/// A shader parameter value
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec4([f32; 4]),
    Mat3(Matrix3),
    Mat4([f32; 16]),
}

impl UniformValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            UniformValue::Int(_) => "int",
            UniformValue::Float(_) => "float",
            UniformValue::Vec2(_) => "float2",
            UniformValue::Vec4(_) => "float4",
            UniformValue::Mat3(_) => "float3x3",
            UniformValue::Mat4(_) => "float4x4",
        }
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(v: [f32; 2]) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(v: [f32; 4]) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<Matrix3> for UniformValue {
    fn from(m: Matrix3) -> Self {
        UniformValue::Mat3(m)
    }
}

impl From<Rgba> for UniformValue {
    fn from(c: Rgba) -> Self {
        UniformValue::Vec4(c.to_f32_array())
    }
}

/// GLSL vertex and fragment text
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlslSource {
    pub vertex: String,
    pub fragment: String,
}

/// Per-backend shader text; each driver picks the variant it understands
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderSource {
    pub glsl: Option<GlslSource>,
    pub metal: Option<String>,
}

impl ShaderSource {
    pub fn glsl(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            glsl: Some(GlslSource {
                vertex: vertex.into(),
                fragment: fragment.into(),
            }),
            metal: None,
        }
    }

    pub fn metal(source: impl Into<String>) -> Self {
        Self {
            glsl: None,
            metal: Some(source.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.glsl.is_none() && self.metal.is_none()
    }
}

/// One geometry submission. Borrowed for the duration of `Driver::draw` only.
#[derive(Clone, Copy)]
pub struct DrawCall<'a> {
    pub shader: &'a dyn Shader,
    pub vertices: &'a [f32],
    pub indices: &'a [u16],
    pub texture: Option<&'a dyn Texture>,
    /// `None` draws into whatever target was bound last
    pub target: Option<&'a dyn Framebuffer>,
    pub blend: BlendMode,
    pub scissor: Option<PixelRect>,
    pub layout: Option<&'a VertexLayout>,
}

impl<'a> DrawCall<'a> {
    pub fn new(shader: &'a dyn Shader, vertices: &'a [f32], indices: &'a [u16]) -> Self {
        Self {
            shader,
            vertices,
            indices,
            texture: None,
            target: None,
            blend: BlendMode::None,
            scissor: None,
            layout: None,
        }
    }

    pub fn with_texture(mut self, texture: &'a dyn Texture) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_target(mut self, target: &'a dyn Framebuffer) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_scissor(mut self, scissor: PixelRect) -> Self {
        self.scissor = Some(scissor);
        self
    }

    pub fn with_layout(mut self, layout: &'a VertexLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Explicit layout, or the length-based guess when none was given
    pub fn resolved_layout(&self) -> VertexLayout {
        match self.layout {
            Some(layout) => layout.clone(),
            None => VertexFormat::infer(self.vertices.len()).layout(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        let floats = self.resolved_layout().floats_per_vertex().max(1);
        self.vertices.len() / floats
    }
}

/// A draw with every borrowed input copied, ready to cross to a render thread.
/// Resources are referenced by worker-local ids.
pub(crate) struct QueuedDraw {
    pub program: u32,
    pub uniforms: Vec<(String, UniformValue)>,
    pub vertices: Vec<f32>,
    pub indices: Vec<u16>,
    pub texture: Option<u32>,
    pub target: Option<u32>,
    pub blend: BlendMode,
    pub scissor: Option<PixelRect>,
    pub layout: VertexLayout,
}

impl QueuedDraw {
    pub fn new(
        call: &DrawCall<'_>,
        program: u32,
        uniforms: Vec<(String, UniformValue)>,
        texture: Option<u32>,
        target: Option<u32>,
    ) -> Self {
        Self {
            program,
            uniforms,
            vertices: call.vertices.to_vec(),
            indices: call.indices.to_vec(),
            texture,
            target,
            blend: call.blend,
            scissor: call.scissor,
            layout: call.resolved_layout(),
        }
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}
