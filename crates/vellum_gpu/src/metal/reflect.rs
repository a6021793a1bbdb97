//! Metal Shading Language scanning
//!
//! Metal has no runtime uniform lookup by name, so the driver scans the
//! source once for entry points, vertex attributes and
//! `constant T& name [[buffer(N)]]` parameters, then writes uniform bytes at
//! those indices on every draw. Pure text processing; built and tested on
//! every platform.

use std::sync::OnceLock;

use regex::Regex;
use vellum_core::Matrix3;

use crate::types::UniformValue;

pub const DEFAULT_VERTEX_ENTRY: &str = "vertex_main";
pub const DEFAULT_FRAGMENT_ENTRY: &str = "fragment_main";

/// Buffer index of the interleaved vertex data
pub const VERTEX_BUFFER_INDEX: u64 = 0;

/// Shader stage a buffer parameter belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
}

/// One `constant T& name [[buffer(N)]]` parameter
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferBinding {
    pub name: String,
    pub type_name: String,
    pub index: u64,
    pub stage: Stage,
}

impl BufferBinding {
    /// Byte size of the declared type, `None` for types the engine never writes
    pub fn size(&self) -> Option<usize> {
        type_size(&self.type_name)
    }
}

/// One `[[attribute(N)]]` vertex input
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexInput {
    pub index: u64,
    pub components: u32,
    /// Byte offset within the interleaved vertex
    pub offset: u64,
}

/// Everything the driver needs to build pipelines and bind uniforms
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetalReflection {
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub inputs: Vec<VertexInput>,
    /// Bytes per vertex
    pub vertex_stride: u64,
    pub bindings: Vec<BufferBinding>,
}

impl MetalReflection {
    pub fn binding(&self, name: &str) -> Option<&BufferBinding> {
        self.bindings.iter().find(|b| b.name == name)
    }
}

fn buffer_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"constant\s+([A-Za-z0-9x]+)\s*&?\s*([A-Za-z0-9_]+)\s*\[\[buffer\((\d+)\)\]\]")
            .expect("valid buffer pattern")
    })
}

fn entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(vertex|fragment)\s+[A-Za-z0-9_]+\s+([A-Za-z0-9_]+)\s*\(")
            .expect("valid entry pattern")
    })
}

fn attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(float[234]?)\s+[A-Za-z0-9_]+\s*\[\[attribute\((\d+)\)\]\]")
            .expect("valid attribute pattern")
    })
}

/// Scan a Metal library source
pub fn reflect(source: &str) -> MetalReflection {
    // (byte offset, stage, name) of each entry point declaration
    let entries: Vec<(usize, Stage, &str)> = entry_regex()
        .captures_iter(source)
        .filter_map(|cap| {
            let start = cap.get(0)?.start();
            let stage = match cap.get(1)?.as_str() {
                "vertex" => Stage::Vertex,
                _ => Stage::Fragment,
            };
            Some((start, stage, cap.get(2)?.as_str()))
        })
        .collect();

    let entry = |stage: Stage, default: &str| {
        entries
            .iter()
            .find(|(_, s, _)| *s == stage)
            .map_or_else(|| default.to_string(), |(_, _, name)| name.to_string())
    };

    let bindings = buffer_regex()
        .captures_iter(source)
        .filter_map(|cap| {
            let at = cap.get(0)?.start();
            let index = cap.get(3)?.as_str().parse().ok()?;
            // the closest entry declaration before the parameter owns it
            let stage = entries
                .iter()
                .filter(|(start, _, _)| *start < at)
                .last()
                .map_or(Stage::Fragment, |(_, stage, _)| *stage);
            Some(BufferBinding {
                name: cap.get(2)?.as_str().to_string(),
                type_name: cap.get(1)?.as_str().to_string(),
                index,
                stage,
            })
        })
        .collect();

    let mut inputs: Vec<VertexInput> = attribute_regex()
        .captures_iter(source)
        .filter_map(|cap| {
            let components = match cap.get(1)?.as_str() {
                "float" => 1,
                "float2" => 2,
                "float3" => 3,
                _ => 4,
            };
            Some(VertexInput {
                index: cap.get(2)?.as_str().parse().ok()?,
                components,
                offset: 0,
            })
        })
        .collect();
    inputs.sort_by_key(|input| input.index);
    inputs.dedup_by_key(|input| input.index);

    let mut offset = 0;
    for input in &mut inputs {
        input.offset = offset;
        offset += input.components as u64 * 4;
    }

    MetalReflection {
        vertex_entry: entry(Stage::Vertex, DEFAULT_VERTEX_ENTRY),
        fragment_entry: entry(Stage::Fragment, DEFAULT_FRAGMENT_ENTRY),
        inputs,
        vertex_stride: offset.max(8),
        bindings,
    }
}

/// Byte size of a Metal scalar, vector or matrix type
pub fn type_size(type_name: &str) -> Option<usize> {
    Some(match type_name {
        "float" | "int" | "uint" => 4,
        "float2" | "int2" => 8,
        "float3" | "float4" | "int4" => 16,
        "float3x3" => 48,
        "float4x4" => 64,
        _ => return None,
    })
}

/// Expand an affine 3x3 into a column-major 4x4 acting on `(x, y, 0, 1)`
pub fn matrix3_to_metal(m: &Matrix3) -> [f32; 16] {
    let [a, b, c, d, e, f, ..] = m.0;
    [
        a, d, 0.0, 0.0, //
        b, e, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        c, f, 0.0, 1.0,
    ]
}

/// Bytes for `value` laid out as `type_name`, or `None` when the shapes
/// are incompatible
pub fn uniform_bytes(type_name: &str, value: &UniformValue) -> Option<Vec<u8>> {
    let floats: Vec<f32> = match (type_name, value) {
        ("int" | "uint", UniformValue::Int(v)) => return Some(v.to_ne_bytes().to_vec()),
        ("float", UniformValue::Float(v)) => vec![*v],
        ("float2", UniformValue::Vec2(v)) => v.to_vec(),
        ("float4", UniformValue::Vec4(v)) => v.to_vec(),
        ("float4x4", UniformValue::Mat3(m)) => matrix3_to_metal(m).to_vec(),
        ("float4x4", UniformValue::Mat4(m)) => m.to_vec(),
        ("float3x3", UniformValue::Mat3(m)) => {
            // three columns, each padded to 16 bytes
            let c = m.to_cols_array();
            vec![c[0], c[1], c[2], 0.0, c[3], c[4], c[5], 0.0, c[6], c[7], c[8], 0.0]
        }
        _ => return None,
    };
    Some(bytemuck::cast_slice(&floats).to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shaders::{BLUR_METAL, COLORGRADE_METAL, SOLID_METAL, TEXTURE_METAL};

    #[test]
    fn test_reflect_bundled_blur() {
        let r = reflect(BLUR_METAL);
        assert_eq!(r.vertex_entry, "vertex_main");
        assert_eq!(r.fragment_entry, "fragment_main");
        assert_eq!(r.vertex_stride, 16);

        let transform = r.binding("uTransform").unwrap();
        assert_eq!(transform.index, 1);
        assert_eq!(transform.stage, Stage::Vertex);
        assert_eq!(transform.size(), Some(64));

        let direction = r.binding("uDirection").unwrap();
        assert_eq!((direction.index, direction.stage), (2, Stage::Fragment));
        assert_eq!(r.binding("uRadius").unwrap().type_name, "float");
    }

    #[test]
    fn test_vertex_inputs_and_stride() {
        let solid = reflect(SOLID_METAL);
        assert_eq!(solid.vertex_stride, 24);
        assert_eq!(solid.inputs.len(), 2);
        assert_eq!(solid.inputs[1].components, 4);
        assert_eq!(solid.inputs[1].offset, 8);

        let textured = reflect(TEXTURE_METAL);
        assert_eq!(textured.vertex_stride, 16);
        assert!(textured.binding("uTexture").is_none());
    }

    #[test]
    fn test_custom_entry_points() {
        let src = "vertex Out vs(In in [[stage_in]]) {}\nfragment float4 fs(Out in [[stage_in]], constant float& uAmount [[buffer(4)]]) {}";
        let r = reflect(src);
        assert_eq!(r.vertex_entry, "vs");
        assert_eq!(r.fragment_entry, "fs");
        assert_eq!(r.binding("uAmount").unwrap().index, 4);
        // no attributes declared: position-only stride
        assert_eq!(r.vertex_stride, 8);
    }

    #[test]
    fn test_colorgrade_bindings() {
        let r = reflect(COLORGRADE_METAL);
        let names: Vec<_> = r
            .bindings
            .iter()
            .filter(|b| b.stage == Stage::Fragment)
            .map(|b| (b.name.as_str(), b.index))
            .collect();
        assert_eq!(
            names,
            vec![("uBrightness", 2), ("uContrast", 3), ("uSaturation", 4), ("uHue", 5)]
        );
    }

    #[test]
    fn test_matrix3_packing() {
        let m = Matrix3::translate(3.0, 4.0).mul(&Matrix3::scale(2.0, 5.0));
        let packed = matrix3_to_metal(&m);
        assert_eq!(&packed[0..4], &[2.0, 0.0, 0.0, 0.0]);
        assert_eq!(&packed[4..8], &[0.0, 5.0, 0.0, 0.0]);
        assert_eq!(&packed[12..16], &[3.0, 4.0, 0.0, 1.0]);
    }

    #[test]
    fn test_uniform_shape_validation() {
        assert_eq!(uniform_bytes("float", &UniformValue::Float(1.0)).map(|b| b.len()), Some(4));
        assert_eq!(
            uniform_bytes("float4x4", &UniformValue::Mat3(Matrix3::IDENTITY)).map(|b| b.len()),
            Some(64)
        );
        assert_eq!(
            uniform_bytes("float3x3", &UniformValue::Mat3(Matrix3::IDENTITY)).map(|b| b.len()),
            Some(48)
        );
        assert!(uniform_bytes("float", &UniformValue::Vec2([0.0; 2])).is_none());
        assert!(uniform_bytes("float2", &UniformValue::Int(1)).is_none());
        assert_eq!(type_size("half"), None);
    }
}
