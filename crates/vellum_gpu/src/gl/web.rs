//! WebGL context acquisition

use wasm_bindgen::JsCast;
use web_sys::{HtmlCanvasElement, WebGl2RenderingContext, WebGlRenderingContext};

use super::state::GlState;
use crate::error::{GpuError, Result};

/// Element id looked up before a detached canvas is created
pub const CANVAS_ID: &str = "vellum-canvas";

pub(super) fn create_state() -> Result<GlState> {
    let canvas = find_canvas()?;
    let gl = context(&canvas)?;
    GlState::new(gl, None)
}

fn find_canvas() -> Result<HtmlCanvasElement> {
    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| GpuError::unsupported("no browser document"))?;

    let element = match document.get_element_by_id(CANVAS_ID) {
        Some(element) => element,
        None => document
            .create_element("canvas")
            .map_err(|e| GpuError::Unsupported(format!("create canvas: {e:?}")))?,
    };
    element
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| GpuError::Unsupported(format!("#{CANVAS_ID} is not a canvas")))
}

/// WebGL 2, then WebGL 1, then the prefixed experimental context
fn context(canvas: &HtmlCanvasElement) -> Result<glow::Context> {
    if let Ok(Some(ctx)) = canvas.get_context("webgl2") {
        if let Ok(ctx) = ctx.dyn_into::<WebGl2RenderingContext>() {
            tracing::debug!("using WebGL 2");
            return Ok(glow::Context::from_webgl2_context(ctx));
        }
    }
    for name in ["webgl", "experimental-webgl"] {
        if let Ok(Some(ctx)) = canvas.get_context(name) {
            if let Ok(ctx) = ctx.dyn_into::<WebGlRenderingContext>() {
                tracing::debug!("using {}", name);
                return Ok(glow::Context::from_webgl1_context(ctx));
            }
        }
    }
    Err(GpuError::unsupported("WebGL is not available"))
}
