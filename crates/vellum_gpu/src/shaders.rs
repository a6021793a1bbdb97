//! Embedded shader assets
//!
//! Every program ships as paired GLSL (vertex and fragment in one text,
//! split on `// Vertex shader` / `// Fragment shader` marker comments) and
//! as a Metal library with `vertex_main` / `fragment_main` entry points.
//!
//! GLSL is written against GLSL 1.10 / GLSL ES 1.00 so the same text runs
//! on desktop OpenGL and WebGL. Metal uniforms are declared as
//! `constant T& name [[buffer(N)]]`, with the vertex buffer at index 0.

use crate::error::{GpuError, Result};
use crate::types::{GlslSource, ShaderSource};

macro_rules! solid_vertex_glsl {
    () => {
        r#"// Vertex shader
attribute vec2 aPosition;
attribute vec4 aColor;
uniform mat3 uTransform;
varying vec4 vColor;

void main() {
    vec3 pos = uTransform * vec3(aPosition, 1.0);
    gl_Position = vec4(pos.xy, 0.0, 1.0);
    vColor = aColor;
}
"#
    };
}

macro_rules! textured_vertex_glsl {
    () => {
        r#"// Vertex shader
attribute vec2 aPosition;
attribute vec2 aTexCoord;
uniform mat3 uTransform;
varying vec2 vTexCoord;

void main() {
    vec3 pos = uTransform * vec3(aPosition, 1.0);
    gl_Position = vec4(pos.xy, 0.0, 1.0);
    vTexCoord = aTexCoord;
}
"#
    };
}

macro_rules! fragment_glsl {
    ($body:literal) => {
        concat!(
            "// Fragment shader\n#ifdef GL_ES\nprecision mediump float;\n#endif\n",
            $body
        )
    };
}

macro_rules! metal_textured_prelude {
    () => {
        r#"#include <metal_stdlib>
using namespace metal;

struct VertexIn {
    float2 position [[attribute(0)]];
    float2 uv [[attribute(1)]];
};

struct VertexOut {
    float4 position [[position]];
    float2 uv;
};

vertex VertexOut vertex_main(VertexIn in [[stage_in]],
                             constant float4x4& uTransform [[buffer(1)]]) {
    VertexOut out;
    out.position = uTransform * float4(in.position, 0.0, 1.0);
    // textures are stored top row first
    out.uv = float2(in.uv.x, 1.0 - in.uv.y);
    return out;
}

constexpr sampler linearSampler(filter::linear, address::clamp_to_edge);
"#
    };
}

pub const SOLID_GLSL: &str = concat!(
    solid_vertex_glsl!(),
    fragment_glsl!(
        r#"varying vec4 vColor;

void main() {
    gl_FragColor = vColor;
}
"#
    )
);

pub const SOLID_METAL: &str = r#"#include <metal_stdlib>
using namespace metal;

struct VertexIn {
    float2 position [[attribute(0)]];
    float4 color [[attribute(1)]];
};

struct VertexOut {
    float4 position [[position]];
    float4 color;
};

vertex VertexOut vertex_main(VertexIn in [[stage_in]],
                             constant float4x4& uTransform [[buffer(1)]]) {
    VertexOut out;
    out.position = uTransform * float4(in.position, 0.0, 1.0);
    out.color = in.color;
    return out;
}

fragment float4 fragment_main(VertexOut in [[stage_in]]) {
    return in.color;
}
"#;

pub const TEXTURE_GLSL: &str = concat!(
    textured_vertex_glsl!(),
    fragment_glsl!(
        r#"uniform sampler2D uTexture;
varying vec2 vTexCoord;

void main() {
    gl_FragColor = texture2D(uTexture, vTexCoord);
}
"#
    )
);

pub const TEXTURE_METAL: &str = concat!(
    metal_textured_prelude!(),
    r#"
fragment float4 fragment_main(VertexOut in [[stage_in]],
                              texture2d<float> uTexture [[texture(0)]]) {
    return uTexture.sample(linearSampler, in.uv);
}
"#
);

pub const BLUR_GLSL: &str = concat!(
    textured_vertex_glsl!(),
    fragment_glsl!(
        r#"uniform sampler2D uTexture;
uniform vec2 uDirection;
uniform float uRadius;
varying vec2 vTexCoord;

void main() {
    vec4 sum = vec4(0.0);
    float count = 0.0;
    for (int i = -32; i <= 32; i++) {
        float offset = float(i);
        if (abs(offset) <= uRadius) {
            sum += texture2D(uTexture, vTexCoord + uDirection * offset);
            count += 1.0;
        }
    }
    gl_FragColor = sum / max(count, 1.0);
}
"#
    )
);

pub const BLUR_METAL: &str = concat!(
    metal_textured_prelude!(),
    r#"
fragment float4 fragment_main(VertexOut in [[stage_in]],
                              texture2d<float> uTexture [[texture(0)]],
                              constant float2& uDirection [[buffer(2)]],
                              constant float& uRadius [[buffer(3)]]) {
    float4 sum = float4(0.0);
    float count = 0.0;
    int r = int(min(uRadius, 32.0));
    for (int i = -r; i <= r; i++) {
        sum += uTexture.sample(linearSampler, in.uv + uDirection * float(i));
        count += 1.0;
    }
    return sum / max(count, 1.0);
}
"#
);

pub const GLOW_GLSL: &str = concat!(
    textured_vertex_glsl!(),
    fragment_glsl!(
        r#"uniform sampler2D uTexture;
uniform vec4 uGlowColor;
varying vec2 vTexCoord;

void main() {
    float alpha = texture2D(uTexture, vTexCoord).a;
    gl_FragColor = vec4(uGlowColor.rgb, alpha * uGlowColor.a);
}
"#
    )
);

pub const GLOW_METAL: &str = concat!(
    metal_textured_prelude!(),
    r#"
fragment float4 fragment_main(VertexOut in [[stage_in]],
                              texture2d<float> uTexture [[texture(0)]],
                              constant float4& uGlowColor [[buffer(2)]]) {
    float alpha = uTexture.sample(linearSampler, in.uv).a;
    return float4(uGlowColor.rgb, alpha * uGlowColor.a);
}
"#
);

pub const CHROMATIC_GLSL: &str = concat!(
    textured_vertex_glsl!(),
    fragment_glsl!(
        r#"uniform sampler2D uTexture;
uniform vec2 uOffset;
varying vec2 vTexCoord;

void main() {
    vec4 base = texture2D(uTexture, vTexCoord);
    vec2 shift = vec2(uOffset.x, 0.0);
    float r = texture2D(uTexture, vTexCoord - shift).r;
    float b = texture2D(uTexture, vTexCoord + shift).b;
    gl_FragColor = vec4(r, base.g, b, base.a);
}
"#
    )
);

pub const CHROMATIC_METAL: &str = concat!(
    metal_textured_prelude!(),
    r#"
fragment float4 fragment_main(VertexOut in [[stage_in]],
                              texture2d<float> uTexture [[texture(0)]],
                              constant float2& uOffset [[buffer(2)]]) {
    float4 base = uTexture.sample(linearSampler, in.uv);
    float2 shift = float2(uOffset.x, 0.0);
    float r = uTexture.sample(linearSampler, in.uv - shift).r;
    float b = uTexture.sample(linearSampler, in.uv + shift).b;
    return float4(r, base.g, b, base.a);
}
"#
);

pub const VIGNETTE_GLSL: &str = concat!(
    textured_vertex_glsl!(),
    fragment_glsl!(
        r#"uniform sampler2D uTexture;
uniform float uRadius;
uniform float uSoftness;
varying vec2 vTexCoord;

void main() {
    vec4 color = texture2D(uTexture, vTexCoord);
    float dist = distance(vTexCoord, vec2(0.5)) / 0.70710678;
    float falloff = clamp((dist - uRadius) / max(uSoftness, 0.0001), 0.0, 1.0);
    gl_FragColor = vec4(color.rgb * (1.0 - falloff), color.a);
}
"#
    )
);

pub const VIGNETTE_METAL: &str = concat!(
    metal_textured_prelude!(),
    r#"
fragment float4 fragment_main(VertexOut in [[stage_in]],
                              texture2d<float> uTexture [[texture(0)]],
                              constant float& uRadius [[buffer(2)]],
                              constant float& uSoftness [[buffer(3)]]) {
    float4 color = uTexture.sample(linearSampler, in.uv);
    float dist = distance(in.uv, float2(0.5)) / 0.70710678;
    float falloff = clamp((dist - uRadius) / max(uSoftness, 0.0001), 0.0, 1.0);
    return float4(color.rgb * (1.0 - falloff), color.a);
}
"#
);

pub const PIXELATE_GLSL: &str = concat!(
    textured_vertex_glsl!(),
    fragment_glsl!(
        r#"uniform sampler2D uTexture;
uniform float uPixelSize;
uniform vec2 uResolution;
varying vec2 vTexCoord;

void main() {
    vec2 block = uPixelSize / uResolution;
    vec2 uv = (floor(vTexCoord / block) + 0.5) * block;
    gl_FragColor = texture2D(uTexture, uv);
}
"#
    )
);

pub const PIXELATE_METAL: &str = concat!(
    metal_textured_prelude!(),
    r#"
fragment float4 fragment_main(VertexOut in [[stage_in]],
                              texture2d<float> uTexture [[texture(0)]],
                              constant float& uPixelSize [[buffer(2)]],
                              constant float2& uResolution [[buffer(3)]]) {
    float2 block = uPixelSize / uResolution;
    float2 uv = (floor(in.uv / block) + 0.5) * block;
    return uTexture.sample(linearSampler, uv);
}
"#
);

pub const COLORGRADE_GLSL: &str = concat!(
    textured_vertex_glsl!(),
    fragment_glsl!(
        r#"uniform sampler2D uTexture;
uniform float uBrightness;
uniform float uContrast;
uniform float uSaturation;
uniform float uHue;
varying vec2 vTexCoord;

vec3 rotateHue(vec3 c, float angle) {
    float ca = cos(angle);
    float sa = sin(angle);
    mat3 m = mat3(
        0.213 + ca * 0.787 - sa * 0.213, 0.213 - ca * 0.213 + sa * 0.143, 0.213 - ca * 0.213 - sa * 0.787,
        0.715 - ca * 0.715 - sa * 0.715, 0.715 + ca * 0.285 + sa * 0.140, 0.715 - ca * 0.715 + sa * 0.715,
        0.072 - ca * 0.072 + sa * 0.928, 0.072 - ca * 0.072 - sa * 0.283, 0.072 + ca * 0.928 + sa * 0.072);
    return clamp(m * c, 0.0, 1.0);
}

void main() {
    vec4 color = texture2D(uTexture, vTexCoord);
    vec3 rgb = clamp(color.rgb + uBrightness, 0.0, 1.0);
    rgb = clamp((rgb - 0.5) * (1.0 + uContrast) + 0.5, 0.0, 1.0);
    float luma = dot(rgb, vec3(0.2126, 0.7152, 0.0722));
    rgb = clamp(luma + (rgb - luma) * (1.0 + uSaturation), 0.0, 1.0);
    rgb = rotateHue(rgb, uHue);
    gl_FragColor = vec4(rgb, color.a);
}
"#
    )
);

pub const COLORGRADE_METAL: &str = concat!(
    metal_textured_prelude!(),
    r#"
static float3 rotateHue(float3 c, float angle) {
    float ca = cos(angle);
    float sa = sin(angle);
    float3x3 m = float3x3(
        float3(0.213 + ca * 0.787 - sa * 0.213, 0.213 - ca * 0.213 + sa * 0.143, 0.213 - ca * 0.213 - sa * 0.787),
        float3(0.715 - ca * 0.715 - sa * 0.715, 0.715 + ca * 0.285 + sa * 0.140, 0.715 - ca * 0.715 + sa * 0.715),
        float3(0.072 - ca * 0.072 + sa * 0.928, 0.072 - ca * 0.072 - sa * 0.283, 0.072 + ca * 0.928 + sa * 0.072));
    return clamp(m * c, 0.0, 1.0);
}

fragment float4 fragment_main(VertexOut in [[stage_in]],
                              texture2d<float> uTexture [[texture(0)]],
                              constant float& uBrightness [[buffer(2)]],
                              constant float& uContrast [[buffer(3)]],
                              constant float& uSaturation [[buffer(4)]],
                              constant float& uHue [[buffer(5)]]) {
    float4 color = uTexture.sample(linearSampler, in.uv);
    float3 rgb = clamp(color.rgb + uBrightness, 0.0, 1.0);
    rgb = clamp((rgb - 0.5) * (1.0 + uContrast) + 0.5, 0.0, 1.0);
    float luma = dot(rgb, float3(0.2126, 0.7152, 0.0722));
    rgb = clamp(luma + (rgb - luma) * (1.0 + uSaturation), 0.0, 1.0);
    rgb = rotateHue(rgb, uHue);
    return float4(rgb, color.a);
}
"#
);

/// `(name, glsl, metal)` for every bundled program
const ASSETS: &[(&str, Option<&str>, Option<&str>)] = &[
    ("solid", Some(SOLID_GLSL), Some(SOLID_METAL)),
    ("texture", Some(TEXTURE_GLSL), Some(TEXTURE_METAL)),
    ("blur", Some(BLUR_GLSL), Some(BLUR_METAL)),
    ("glow", Some(GLOW_GLSL), Some(GLOW_METAL)),
    ("chromatic", Some(CHROMATIC_GLSL), Some(CHROMATIC_METAL)),
    ("vignette", Some(VIGNETTE_GLSL), Some(VIGNETTE_METAL)),
    ("pixelate", Some(PIXELATE_GLSL), Some(PIXELATE_METAL)),
    ("colorgrade", Some(COLORGRADE_GLSL), Some(COLORGRADE_METAL)),
];

/// Strip a `shaders/` prefix and any file extension
pub fn normalize_shader_name(name: &str) -> String {
    let name = name.trim();
    let name = name.strip_prefix("shaders/").unwrap_or(name);
    let name = name.rsplit('/').next().unwrap_or(name);
    match name.rfind('.') {
        Some(dot) if dot > 0 => name[..dot].to_string(),
        _ => name.to_string(),
    }
}

/// Load a bundled program by logical name (`"blur"`, `"shaders/blur.glsl"`, ...)
pub fn load_shader_source(name: &str) -> Result<ShaderSource> {
    let key = normalize_shader_name(name);
    if key.is_empty() {
        return Err(GpuError::ShaderSource("empty shader name".into()));
    }

    let (glsl, metal) = ASSETS
        .iter()
        .find(|(asset, _, _)| *asset == key)
        .map(|&(_, glsl, metal)| (glsl, metal))
        .unwrap_or((None, None));

    let glsl = glsl.map(split_glsl).transpose()?;
    if glsl.is_none() && metal.is_none() {
        return Err(GpuError::ShaderSource(format!("shader {key:?} not found")));
    }

    Ok(ShaderSource {
        glsl,
        metal: metal.map(str::to_string),
    })
}

/// Split combined GLSL text on its marker comments
pub fn split_glsl(source: &str) -> Result<GlslSource> {
    #[derive(PartialEq)]
    enum Stage {
        Preamble,
        Vertex,
        Fragment,
    }

    let mut stage = Stage::Preamble;
    let mut vertex = String::new();
    let mut fragment = String::new();

    for line in source.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("//") {
            if trimmed.contains("Vertex shader") {
                stage = Stage::Vertex;
                continue;
            }
            if trimmed.contains("Fragment shader") {
                stage = Stage::Fragment;
                continue;
            }
        }
        let target = match stage {
            Stage::Preamble => continue,
            Stage::Vertex => &mut vertex,
            Stage::Fragment => &mut fragment,
        };
        target.push_str(line);
        target.push('\n');
    }

    let vertex = vertex.trim();
    let fragment = fragment.trim();
    if vertex.is_empty() || fragment.is_empty() {
        return Err(GpuError::ShaderSource(
            "GLSL source needs both vertex and fragment sections".into(),
        ));
    }

    Ok(GlslSource {
        vertex: format!("{vertex}\n"),
        fragment: format!("{fragment}\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_shader_name("blur"), "blur");
        assert_eq!(normalize_shader_name("shaders/blur.glsl"), "blur");
        assert_eq!(normalize_shader_name(" glow.metal "), "glow");
    }

    #[test]
    fn test_load_all_bundled() {
        for name in [
            "solid",
            "texture",
            "blur",
            "glow",
            "chromatic",
            "vignette",
            "pixelate",
            "colorgrade",
        ] {
            let src = load_shader_source(name).unwrap();
            let glsl = src.glsl.unwrap();
            assert!(glsl.vertex.contains("void main()"), "{name}");
            assert!(glsl.fragment.contains("gl_FragColor"), "{name}");
            assert!(!glsl.vertex.contains("gl_FragColor"), "{name}");
            assert!(src.metal.unwrap().contains("fragment_main"), "{name}");
        }
    }

    #[test]
    fn test_missing_shader() {
        assert!(matches!(
            load_shader_source("nope"),
            Err(GpuError::ShaderSource(_))
        ));
        assert!(load_shader_source("  ").is_err());
    }

    #[test]
    fn test_split_requires_both_stages() {
        assert!(split_glsl("// Vertex shader\nvoid main() {}\n").is_err());
        let parts = split_glsl("// Vertex shader\nA\n// Fragment shader\nB\n").unwrap();
        assert_eq!(parts.vertex, "A\n");
        assert_eq!(parts.fragment, "B\n");
    }
}
