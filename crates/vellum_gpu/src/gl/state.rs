//! GL object tables and commands, executed on the render thread
//!
//! All GL calls in the crate go through [`GlState`]. Public handles only
//! carry the integer ids used as keys here.

use glow::{HasContext, PixelPackData, PixelUnpackData};
use rustc_hash::FxHashMap;
use vellum_core::pixels::flip_vertical;
use vellum_core::PixelRect;

use crate::driver::TexturePixels;
use crate::error::{GpuError, Result};
use crate::hosted::HostedState;
use crate::layout::{ATTR_COLOR, ATTR_POSITION, ATTR_TEXCOORD};
use crate::types::{BlendMode, GlslSource, QueuedDraw, ShaderSource, UniformValue};
use crate::worker::RenderWorker;

/// Keeps a native context alive; dropped after every GL object is deleted
pub(crate) trait ContextGuard {}

struct TextureEntry {
    raw: glow::Texture,
    width: i32,
    height: i32,
}

struct FramebufferEntry {
    raw: glow::Framebuffer,
    width: i32,
    height: i32,
}

struct ProgramEntry {
    raw: glow::Program,
    locations: FxHashMap<String, Option<glow::UniformLocation>>,
}

pub(crate) struct GlState {
    gl: glow::Context,
    textures: FxHashMap<u32, TextureEntry>,
    framebuffers: FxHashMap<u32, FramebufferEntry>,
    programs: FxHashMap<u32, ProgramEntry>,
    bound: Option<u32>,
    vao: Option<glow::VertexArray>,
    vbo: glow::Buffer,
    ebo: glow::Buffer,
    vbo_capacity: usize,
    ebo_capacity: usize,
    read_fbo: glow::Framebuffer,
    next_id: u32,
    // dropped last
    _context: Option<Box<dyn ContextGuard>>,
}

// wasm32 without atomics has exactly one thread; the state never moves
#[cfg(target_arch = "wasm32")]
unsafe impl Send for GlState {}

impl GlState {
    pub fn new(gl: glow::Context, context: Option<Box<dyn ContextGuard>>) -> Result<Self> {
        let unsupported = |e: String| GpuError::Unsupported(format!("GL setup failed: {e}"));
        unsafe {
            // VAOs are optional on GL 2.1 and WebGL 1
            let vao = gl.create_vertex_array().ok();
            let vbo = gl.create_buffer().map_err(unsupported)?;
            let ebo = gl.create_buffer().map_err(unsupported)?;
            let read_fbo = gl.create_framebuffer().map_err(unsupported)?;
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);

            Ok(Self {
                gl,
                textures: FxHashMap::default(),
                framebuffers: FxHashMap::default(),
                programs: FxHashMap::default(),
                bound: None,
                vao,
                vbo,
                ebo,
                vbo_capacity: 0,
                ebo_capacity: 0,
                read_fbo,
                next_id: 1,
                _context: context,
            })
        }
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Compile and link. Returns the program id and its active uniforms
    /// with their GL types.
    fn link_program(&mut self, source: &GlslSource) -> Result<(u32, FxHashMap<String, u32>)> {
        let gl = &self.gl;
        unsafe {
            let vertex = compile_stage(gl, glow::VERTEX_SHADER, "vertex", &source.vertex)?;
            let fragment =
                match compile_stage(gl, glow::FRAGMENT_SHADER, "fragment", &source.fragment) {
                    Ok(stage) => stage,
                    Err(err) => {
                        gl.delete_shader(vertex);
                        return Err(err);
                    }
                };

            let program = match gl.create_program() {
                Ok(program) => program,
                Err(e) => {
                    gl.delete_shader(vertex);
                    gl.delete_shader(fragment);
                    return Err(GpuError::ShaderLink(e));
                }
            };
            gl.attach_shader(program, vertex);
            gl.attach_shader(program, fragment);
            gl.bind_attrib_location(program, ATTR_POSITION, "aPosition");
            gl.bind_attrib_location(program, ATTR_TEXCOORD, "aTexCoord");
            gl.bind_attrib_location(program, ATTR_COLOR, "aColor");
            gl.link_program(program);

            // stages are released whatever the link outcome
            gl.detach_shader(program, vertex);
            gl.detach_shader(program, fragment);
            gl.delete_shader(vertex);
            gl.delete_shader(fragment);

            if !gl.get_program_link_status(program) {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                tracing::warn!("GL program link failed: {}", log);
                return Err(GpuError::ShaderLink(log));
            }

            let mut declared = FxHashMap::default();
            for index in 0..gl.get_active_uniforms(program) {
                if let Some(uniform) = gl.get_active_uniform(program, index) {
                    let name = uniform.name.trim_end_matches("[0]").to_string();
                    declared.insert(name, uniform.utype);
                }
            }

            let id = self.alloc_id();
            self.programs.insert(
                id,
                ProgramEntry {
                    raw: program,
                    locations: FxHashMap::default(),
                },
            );
            Ok((id, declared))
        }
    }

    unsafe fn read_bound(&self, raw: glow::Framebuffer, rect: PixelRect, height: i32) -> Vec<u8> {
        let mut pixels = vec![0u8; rect.width() as usize * rect.height() as usize * 4];
        self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(raw));
        self.gl.read_pixels(
            rect.x0,
            height - rect.y1,
            rect.width(),
            rect.height(),
            glow::RGBA,
            glow::UNSIGNED_BYTE,
            PixelPackData::Slice(Some(&mut pixels)),
        );
        flip_vertical(&mut pixels, rect.width(), rect.height());
        pixels
    }
}

impl HostedState for GlState {
    /// GL type enum reported by `glGetActiveUniform`
    type UniformType = u32;

    #[cfg(not(target_arch = "wasm32"))]
    fn start() -> Result<RenderWorker<Self>> {
        RenderWorker::spawn("vellum-gl", super::native::create_state)
    }

    #[cfg(target_arch = "wasm32")]
    fn start() -> Result<RenderWorker<Self>> {
        Ok(RenderWorker::inline("vellum-webgl", super::web::create_state()?))
    }

    fn texture_size_cap() -> i32 {
        if cfg!(target_arch = "wasm32") {
            4096
        } else {
            8192
        }
    }

    fn accepts(declared: &u32, value: &UniformValue) -> bool {
        super::accepts(*declared, value)
    }

    fn max_texture_size(&self) -> i32 {
        unsafe { self.gl.get_parameter_i32(glow::MAX_TEXTURE_SIZE) }
    }

    fn create_texture(&mut self, width: i32, height: i32) -> Result<u32> {
        let raw = unsafe {
            let gl = &self.gl;
            let raw = gl
                .create_texture()
                .map_err(|e| GpuError::Unsupported(format!("create_texture: {e}")))?;
            gl.bind_texture(glow::TEXTURE_2D, Some(raw));
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                width,
                height,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelUnpackData::Slice(None),
            );
            for (param, value) in [
                (glow::TEXTURE_MIN_FILTER, glow::LINEAR),
                (glow::TEXTURE_MAG_FILTER, glow::LINEAR),
                (glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE),
                (glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE),
            ] {
                gl.tex_parameter_i32(glow::TEXTURE_2D, param, value as i32);
            }
            gl.bind_texture(glow::TEXTURE_2D, None);
            raw
        };

        // zero-initialize explicitly; a null upload leaves contents undefined
        let zeros = vec![0u8; width as usize * height as usize * 4];
        let id = self.alloc_id();
        self.textures.insert(id, TextureEntry { raw, width, height });
        self.upload(id, PixelRect::from_size(width, height), zeros);
        Ok(id)
    }

    /// Upload tightly packed, top-row-first pixels into `rect`.
    /// Rows are flipped so texture row 0 is the bottom, matching render targets.
    fn upload(&mut self, id: u32, rect: PixelRect, mut pixels: Vec<u8>) {
        let Some(entry) = self.textures.get(&id) else {
            return;
        };
        flip_vertical(&mut pixels, rect.width(), rect.height());
        let gl_y = entry.height - rect.y1;
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(entry.raw));
            self.gl.tex_sub_image_2d(
                glow::TEXTURE_2D,
                0,
                rect.x0,
                gl_y,
                rect.width(),
                rect.height(),
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelUnpackData::Slice(Some(&pixels)),
            );
            self.gl.bind_texture(glow::TEXTURE_2D, None);
        }
    }

    fn delete_texture(&mut self, id: u32) {
        if let Some(entry) = self.textures.remove(&id) {
            unsafe { self.gl.delete_texture(entry.raw) };
        }
    }

    /// Framebuffer with a fresh color texture. Returns `(framebuffer, texture)` ids.
    fn create_framebuffer(&mut self, width: i32, height: i32) -> Result<(u32, u32)> {
        let texture = self.create_texture(width, height)?;
        let Some(tex_raw) = self.textures.get(&texture).map(|t| t.raw) else {
            return Err(GpuError::Unsupported("texture vanished".into()));
        };

        let raw = match unsafe { self.gl.create_framebuffer() } {
            Ok(raw) => raw,
            Err(e) => {
                self.delete_texture(texture);
                return Err(GpuError::Unsupported(format!("create_framebuffer: {e}")));
            }
        };

        let status = unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(raw));
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(tex_raw),
                0,
            );
            self.gl.check_framebuffer_status(glow::FRAMEBUFFER)
        };
        if status != glow::FRAMEBUFFER_COMPLETE {
            tracing::warn!("framebuffer {}x{} incomplete: 0x{:x}", width, height, status);
            unsafe {
                self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
                self.gl.delete_framebuffer(raw);
            }
            self.delete_texture(texture);
            self.bound = None;
            return Err(GpuError::FramebufferIncomplete(status));
        }

        let id = self.alloc_id();
        self.framebuffers.insert(id, FramebufferEntry { raw, width, height });
        self.bind_framebuffer(id);
        Ok((id, texture))
    }

    fn bind_framebuffer(&mut self, id: u32) {
        let Some(entry) = self.framebuffers.get(&id) else {
            return;
        };
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(entry.raw));
            self.gl.viewport(0, 0, entry.width, entry.height);
        }
        self.bound = Some(id);
    }

    fn delete_framebuffer(&mut self, id: u32) {
        if let Some(entry) = self.framebuffers.remove(&id) {
            if self.bound == Some(id) {
                unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, None) };
                self.bound = None;
            }
            unsafe { self.gl.delete_framebuffer(entry.raw) };
        }
    }

    fn create_program(&mut self, source: &ShaderSource) -> Result<(u32, FxHashMap<String, u32>)> {
        let glsl = source
            .glsl
            .as_ref()
            .ok_or_else(|| GpuError::ShaderSource("no GLSL source provided".into()))?;
        self.link_program(glsl)
    }

    fn delete_program(&mut self, id: u32) {
        if let Some(entry) = self.programs.remove(&id) {
            unsafe { self.gl.delete_program(entry.raw) };
        }
    }

    fn clear(&mut self, r: f32, g: f32, b: f32, a: f32) {
        unsafe {
            self.gl.disable(glow::SCISSOR_TEST);
            self.gl.clear_color(r, g, b, a);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    fn draw(&mut self, call: QueuedDraw) {
        if call.indices.is_empty() || call.vertices.is_empty() {
            return;
        }
        if let Some(target) = call.target {
            self.bind_framebuffer(target);
        }
        let target_height = self
            .bound
            .and_then(|id| self.framebuffers.get(&id))
            .map_or(0, |fb| fb.height);

        let Some(program) = self.programs.get_mut(&call.program) else {
            tracing::debug!("draw with unknown program {}", call.program);
            return;
        };
        let gl = &self.gl;

        unsafe {
            let raw = program.raw;
            gl.use_program(Some(raw));
            for (name, value) in &call.uniforms {
                let location = program
                    .locations
                    .entry(name.clone())
                    .or_insert_with(|| gl.get_uniform_location(raw, name));
                if let Some(location) = location {
                    apply_uniform(gl, location, value);
                }
            }

            gl.active_texture(glow::TEXTURE0);
            let texture = call
                .texture
                .and_then(|id| self.textures.get(&id))
                .map(|t| t.raw);
            gl.bind_texture(glow::TEXTURE_2D, texture);

            match call.blend {
                BlendMode::None => gl.disable(glow::BLEND),
                BlendMode::Alpha => {
                    gl.enable(glow::BLEND);
                    gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
                }
                BlendMode::Additive => {
                    gl.enable(glow::BLEND);
                    gl.blend_func(glow::SRC_ALPHA, glow::ONE);
                }
            }

            match call.scissor {
                Some(rect) => {
                    gl.enable(glow::SCISSOR_TEST);
                    gl.scissor(
                        rect.x0,
                        target_height - rect.y1,
                        rect.width().max(0),
                        rect.height().max(0),
                    );
                }
                None => gl.disable(glow::SCISSOR_TEST),
            }

            if let Some(vao) = self.vao {
                gl.bind_vertex_array(Some(vao));
            }

            let vertex_bytes: &[u8] = bytemuck::cast_slice(&call.vertices);
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo));
            if vertex_bytes.len() > self.vbo_capacity {
                gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, vertex_bytes, glow::DYNAMIC_DRAW);
                self.vbo_capacity = vertex_bytes.len();
            } else {
                gl.buffer_sub_data_u8_slice(glow::ARRAY_BUFFER, 0, vertex_bytes);
            }

            let index_bytes: &[u8] = bytemuck::cast_slice(&call.indices);
            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(self.ebo));
            if index_bytes.len() > self.ebo_capacity {
                gl.buffer_data_u8_slice(
                    glow::ELEMENT_ARRAY_BUFFER,
                    index_bytes,
                    glow::DYNAMIC_DRAW,
                );
                self.ebo_capacity = index_bytes.len();
            } else {
                gl.buffer_sub_data_u8_slice(glow::ELEMENT_ARRAY_BUFFER, 0, index_bytes);
            }

            for location in [ATTR_POSITION, ATTR_TEXCOORD, ATTR_COLOR] {
                gl.disable_vertex_attrib_array(location);
            }
            for attr in &call.layout.attributes {
                gl.enable_vertex_attrib_array(attr.location);
                gl.vertex_attrib_pointer_f32(
                    attr.location,
                    attr.components,
                    glow::FLOAT,
                    false,
                    call.layout.stride,
                    attr.offset,
                );
            }

            gl.draw_elements(
                glow::TRIANGLES,
                call.indices.len() as i32,
                glow::UNSIGNED_SHORT,
                0,
            );

            gl.disable(glow::SCISSOR_TEST);
            if self.vao.is_some() {
                gl.bind_vertex_array(None);
            }
        }
    }

    /// Read a framebuffer region, top row first
    fn read_framebuffer(&mut self, id: u32, rect: Option<PixelRect>) -> Result<Option<Vec<u8>>> {
        let (raw, width, height) = self
            .framebuffers
            .get(&id)
            .map(|fb| (fb.raw, fb.width, fb.height))
            .ok_or_else(|| GpuError::Unsupported(format!("unknown framebuffer {id}")))?;
        let Some(rect) = PixelRect::resolve(rect, width, height) else {
            return Ok(None);
        };
        let pixels = unsafe { self.read_bound(raw, rect, height) };
        if let Some(bound) = self.bound.and_then(|b| self.framebuffers.get(&b)) {
            unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(bound.raw)) };
        }
        Ok(Some(pixels))
    }

    /// Read a texture region through the scratch framebuffer, top row first
    fn read_texture(&mut self, id: u32, rect: Option<PixelRect>) -> Result<Option<TexturePixels>> {
        let (raw, width, height) = self
            .textures
            .get(&id)
            .map(|t| (t.raw, t.width, t.height))
            .ok_or_else(|| GpuError::Unsupported(format!("unknown texture {id}")))?;
        let Some(rect) = PixelRect::resolve(rect, width, height) else {
            return Ok(None);
        };

        let pixels = unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(self.read_fbo));
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(raw),
                0,
            );
            let status = self.gl.check_framebuffer_status(glow::FRAMEBUFFER);
            let pixels = (status == glow::FRAMEBUFFER_COMPLETE)
                .then(|| self.read_bound(self.read_fbo, rect, height));
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                None,
                0,
            );
            let restore = self.bound.and_then(|b| self.framebuffers.get(&b)).map(|fb| fb.raw);
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, restore);
            match pixels {
                Some(pixels) => pixels,
                None => return Err(GpuError::FramebufferIncomplete(status)),
            }
        };

        Ok(Some(TexturePixels {
            pixels,
            width: rect.width(),
            height: rect.height(),
        }))
    }
}

impl Drop for GlState {
    fn drop(&mut self) {
        let gl = &self.gl;
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            for (_, fb) in self.framebuffers.drain() {
                gl.delete_framebuffer(fb.raw);
            }
            for (_, tex) in self.textures.drain() {
                gl.delete_texture(tex.raw);
            }
            for (_, program) in self.programs.drain() {
                gl.delete_program(program.raw);
            }
            if let Some(vao) = self.vao.take() {
                gl.delete_vertex_array(vao);
            }
            gl.delete_buffer(self.vbo);
            gl.delete_buffer(self.ebo);
            gl.delete_framebuffer(self.read_fbo);
        }
    }
}

unsafe fn compile_stage(
    gl: &glow::Context,
    kind: u32,
    stage: &'static str,
    source: &str,
) -> Result<glow::Shader> {
    let shader = gl
        .create_shader(kind)
        .map_err(|log| GpuError::ShaderCompile { stage, log })?;
    gl.shader_source(shader, source);
    gl.compile_shader(shader);
    if !gl.get_shader_compile_status(shader) {
        let log = gl.get_shader_info_log(shader);
        gl.delete_shader(shader);
        tracing::warn!("GL {} shader compile failed: {}", stage, log);
        return Err(GpuError::ShaderCompile { stage, log });
    }
    Ok(shader)
}

unsafe fn apply_uniform(
    gl: &glow::Context,
    location: &glow::UniformLocation,
    value: &UniformValue,
) {
    let location = Some(location);
    match *value {
        UniformValue::Int(v) => gl.uniform_1_i32(location, v),
        UniformValue::Float(v) => gl.uniform_1_f32(location, v),
        UniformValue::Vec2([x, y]) => gl.uniform_2_f32(location, x, y),
        UniformValue::Vec4([x, y, z, w]) => gl.uniform_4_f32(location, x, y, z, w),
        // WebGL rejects transpose=true, so matrices go up column-major
        UniformValue::Mat3(m) => gl.uniform_matrix_3_f32_slice(location, false, &m.to_cols_array()),
        UniformValue::Mat4(m) => gl.uniform_matrix_4_f32_slice(location, false, &m),
    }
}
