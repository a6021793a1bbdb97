//! Vertex layouts
//!
//! Attribute slots are fixed across backends: 0 = position, 1 = texture
//! coordinate, 2 = color. Every vertex component is a 32-bit float.

use smallvec::{smallvec, SmallVec};

pub const ATTR_POSITION: u32 = 0;
pub const ATTR_TEXCOORD: u32 = 1;
pub const ATTR_COLOR: u32 = 2;

/// One vertex attribute within an interleaved float buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    /// Component count (1..=4)
    pub components: i32,
    /// Byte offset from the start of the vertex
    pub offset: i32,
}

/// Interleaved vertex layout
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexLayout {
    /// Bytes per vertex
    pub stride: i32,
    pub attributes: SmallVec<[VertexAttribute; 3]>,
}

impl VertexLayout {
    pub fn floats_per_vertex(&self) -> usize {
        (self.stride / 4) as usize
    }
}

/// The fixed vertex formats the engine emits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexFormat {
    /// pos2 + uv2 + color4
    PosUvColor,
    /// pos2 + color4
    PosColor,
    /// pos2 + uv2
    PosUv,
    /// pos2
    Pos,
}

impl VertexFormat {
    /// Guess the format from the length of a flat float array.
    ///
    /// Legacy fallback for draw calls without an explicit layout: a length
    /// divisible by 8 is always taken as pos2+uv2+color4, even when the
    /// caller meant something else.
    pub fn infer(float_count: usize) -> VertexFormat {
        if float_count == 0 {
            VertexFormat::Pos
        } else if float_count % 8 == 0 {
            VertexFormat::PosUvColor
        } else if float_count % 6 == 0 {
            VertexFormat::PosColor
        } else if float_count % 4 == 0 {
            VertexFormat::PosUv
        } else {
            VertexFormat::Pos
        }
    }

    pub fn floats_per_vertex(self) -> usize {
        2 + self.uv_components() + self.color_components()
    }

    pub fn uv_components(self) -> usize {
        match self {
            VertexFormat::PosUvColor | VertexFormat::PosUv => 2,
            VertexFormat::PosColor | VertexFormat::Pos => 0,
        }
    }

    pub fn color_components(self) -> usize {
        match self {
            VertexFormat::PosUvColor | VertexFormat::PosColor => 4,
            VertexFormat::PosUv | VertexFormat::Pos => 0,
        }
    }

    pub fn layout(self) -> VertexLayout {
        let stride = self.floats_per_vertex() as i32 * 4;
        let mut attributes: SmallVec<[VertexAttribute; 3]> = smallvec![VertexAttribute {
            location: ATTR_POSITION,
            components: 2,
            offset: 0,
        }];
        let mut offset = 8;
        if self.uv_components() > 0 {
            attributes.push(VertexAttribute {
                location: ATTR_TEXCOORD,
                components: 2,
                offset,
            });
            offset += 8;
        }
        if self.color_components() > 0 {
            attributes.push(VertexAttribute {
                location: ATTR_COLOR,
                components: 4,
                offset,
            });
        }
        VertexLayout { stride, attributes }
    }
}
