//! Metal objects and command encoding, executed on the render thread

use std::ffi::c_void;
use std::ptr;

use objc2::rc::autoreleasepool;
use objc2::runtime::{AnyObject, Bool};
use objc2::{class, msg_send};
use objc2_foundation::NSString;
use rustc_hash::FxHashMap;
use vellum_core::PixelRect;

use super::ffi::*;
use super::reflect::{reflect, uniform_bytes, MetalReflection, Stage, VERTEX_BUFFER_INDEX};
use crate::driver::TexturePixels;
use crate::error::{GpuError, Result};
use crate::hosted::HostedState;
use crate::types::{BlendMode, QueuedDraw, ShaderSource, UniformValue};
use crate::worker::RenderWorker;

const BLEND_MODES: [BlendMode; 3] = [BlendMode::None, BlendMode::Alpha, BlendMode::Additive];

struct TextureEntry {
    raw: Object,
    width: i32,
    height: i32,
}

struct Program {
    /// One pipeline per entry of [`BLEND_MODES`]
    pipelines: Vec<Object>,
    reflection: MetalReflection,
}

impl Program {
    fn pipeline(&self, blend: BlendMode) -> Option<&Object> {
        let index = BLEND_MODES.iter().position(|mode| *mode == blend)?;
        self.pipelines.get(index)
    }
}

pub(crate) struct MetalState {
    device: Object,
    queue: Object,
    textures: FxHashMap<u32, TextureEntry>,
    /// Framebuffer id to color texture id
    framebuffers: FxHashMap<u32, u32>,
    programs: FxHashMap<u32, Program>,
    bound: Option<u32>,
    next_id: u32,
}

impl MetalState {
    fn new() -> Result<Self> {
        let device = system_default_device()
            .ok_or_else(|| GpuError::unsupported("no default Metal device"))?;
        let queue = unsafe { owned(msg_send![&*device, newCommandQueue]) }
            .ok_or_else(|| GpuError::unsupported("failed to create Metal command queue"))?;
        tracing::debug!("Metal device and command queue created");
        Ok(Self {
            device,
            queue,
            textures: FxHashMap::default(),
            framebuffers: FxHashMap::default(),
            programs: FxHashMap::default(),
            bound: None,
            next_id: 1,
        })
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Run one render pass into `target`, then wait for the GPU
    fn render_pass(
        &self,
        target: &AnyObject,
        clear: Option<MTLClearColor>,
        encode: impl FnOnce(&AnyObject),
    ) {
        autoreleasepool(|_| unsafe {
            let pass: *mut AnyObject =
                msg_send![class!(MTLRenderPassDescriptor), renderPassDescriptor];
            let Some(pass) = pass.as_ref() else {
                return;
            };
            let attachments: *mut AnyObject = msg_send![pass, colorAttachments];
            let attachment: *mut AnyObject =
                msg_send![attachments, objectAtIndexedSubscript: 0u64];
            let Some(attachment) = attachment.as_ref() else {
                return;
            };
            let _: () = msg_send![attachment, setTexture: target];
            let _: () = msg_send![attachment, setStoreAction: STORE_ACTION_STORE];
            match clear {
                Some(color) => {
                    let _: () = msg_send![attachment, setLoadAction: LOAD_ACTION_CLEAR];
                    let _: () = msg_send![attachment, setClearColor: color];
                }
                None => {
                    let _: () = msg_send![attachment, setLoadAction: LOAD_ACTION_LOAD];
                }
            }

            let command: *mut AnyObject = msg_send![&*self.queue, commandBuffer];
            let Some(command) = command.as_ref() else {
                return;
            };
            let encoder: *mut AnyObject =
                msg_send![command, renderCommandEncoderWithDescriptor: pass];
            let Some(encoder) = encoder.as_ref() else {
                return;
            };
            encode(encoder);
            let _: () = msg_send![encoder, endEncoding];
            let _: () = msg_send![command, commit];
            let _: () = msg_send![command, waitUntilCompleted];
        });
    }

    /// Make GPU writes to a managed texture visible to the CPU
    fn synchronize(&self, texture: &AnyObject) {
        autoreleasepool(|_| unsafe {
            let command: *mut AnyObject = msg_send![&*self.queue, commandBuffer];
            let Some(command) = command.as_ref() else {
                return;
            };
            let blit: *mut AnyObject = msg_send![command, blitCommandEncoder];
            if let Some(blit) = blit.as_ref() {
                let _: () = msg_send![blit, synchronizeResource: texture];
                let _: () = msg_send![blit, endEncoding];
            }
            let _: () = msg_send![command, commit];
            let _: () = msg_send![command, waitUntilCompleted];
        });
    }

    fn read_region(&self, texture: &AnyObject, rect: PixelRect) -> Vec<u8> {
        self.synchronize(texture);
        let mut pixels = vec![0u8; rect.width() as usize * rect.height() as usize * 4];
        let region = MTLRegion::new_2d(rect.x0, rect.y0, rect.width(), rect.height());
        unsafe {
            let _: () = msg_send![
                texture,
                getBytes: pixels.as_mut_ptr().cast::<c_void>(),
                bytesPerRow: rect.width() as u64 * 4,
                fromRegion: region,
                mipmapLevel: 0u64
            ];
        }
        pixels
    }

    fn new_function(&self, library: &AnyObject, name: &str) -> Result<Object> {
        let ns_name = NSString::from_str(name);
        unsafe { owned(msg_send![library, newFunctionWithName: &*ns_name]) }
            .ok_or_else(|| GpuError::ShaderLink(format!("entry point {name} not found")))
    }

    fn new_pipeline(
        &self,
        vertex: &AnyObject,
        fragment: &AnyObject,
        reflection: &MetalReflection,
        blend: BlendMode,
    ) -> Result<Object> {
        autoreleasepool(|_| unsafe {
            let descriptor = owned(msg_send![class!(MTLRenderPipelineDescriptor), new])
                .ok_or_else(|| GpuError::unsupported("MTLRenderPipelineDescriptor"))?;
            let _: () = msg_send![&*descriptor, setVertexFunction: vertex];
            let _: () = msg_send![&*descriptor, setFragmentFunction: fragment];

            let vertex_descriptor: *mut AnyObject =
                msg_send![class!(MTLVertexDescriptor), vertexDescriptor];
            if let Some(vertex_descriptor) = vertex_descriptor.as_ref() {
                let attributes: *mut AnyObject = msg_send![vertex_descriptor, attributes];
                for input in &reflection.inputs {
                    let attribute: *mut AnyObject =
                        msg_send![attributes, objectAtIndexedSubscript: input.index];
                    let format = match input.components {
                        1 => VERTEX_FORMAT_FLOAT,
                        2 => VERTEX_FORMAT_FLOAT2,
                        3 => VERTEX_FORMAT_FLOAT3,
                        _ => VERTEX_FORMAT_FLOAT4,
                    };
                    let _: () = msg_send![attribute, setFormat: format];
                    let _: () = msg_send![attribute, setOffset: input.offset];
                    let _: () = msg_send![attribute, setBufferIndex: VERTEX_BUFFER_INDEX];
                }
                let layouts: *mut AnyObject = msg_send![vertex_descriptor, layouts];
                let layout: *mut AnyObject =
                    msg_send![layouts, objectAtIndexedSubscript: VERTEX_BUFFER_INDEX];
                let _: () = msg_send![layout, setStride: reflection.vertex_stride];
                let _: () = msg_send![layout, setStepFunction: STEP_FUNCTION_PER_VERTEX];
                let _: () = msg_send![layout, setStepRate: 1u64];
                let _: () = msg_send![&*descriptor, setVertexDescriptor: vertex_descriptor];
            }

            let attachments: *mut AnyObject = msg_send![&*descriptor, colorAttachments];
            let color: *mut AnyObject = msg_send![attachments, objectAtIndexedSubscript: 0u64];
            let _: () = msg_send![color, setPixelFormat: PIXEL_FORMAT_RGBA8_UNORM];
            let destination = match blend {
                BlendMode::None => None,
                BlendMode::Alpha => Some(BLEND_FACTOR_ONE_MINUS_SOURCE_ALPHA),
                BlendMode::Additive => Some(BLEND_FACTOR_ONE),
            };
            let _: () = msg_send![color, setBlendingEnabled: Bool::new(destination.is_some())];
            if let Some(destination) = destination {
                let _: () = msg_send![color, setRgbBlendOperation: BLEND_OPERATION_ADD];
                let _: () = msg_send![color, setAlphaBlendOperation: BLEND_OPERATION_ADD];
                let _: () = msg_send![color, setSourceRGBBlendFactor: BLEND_FACTOR_SOURCE_ALPHA];
                let _: () = msg_send![color, setSourceAlphaBlendFactor: BLEND_FACTOR_SOURCE_ALPHA];
                let _: () = msg_send![color, setDestinationRGBBlendFactor: destination];
                let _: () = msg_send![color, setDestinationAlphaBlendFactor: destination];
            }

            let mut error: *mut AnyObject = ptr::null_mut();
            let pipeline: *mut AnyObject = msg_send![
                &*self.device,
                newRenderPipelineStateWithDescriptor: &*descriptor,
                error: &mut error as *mut *mut AnyObject
            ];
            owned(pipeline).ok_or_else(|| {
                let message = error_message(error);
                tracing::warn!("Metal pipeline creation failed: {}", message);
                GpuError::ShaderLink(message)
            })
        })
    }

    fn encode_draw(
        &self,
        encoder: &AnyObject,
        program: &Program,
        pipeline: &AnyObject,
        draw: &QueuedDraw,
        target: (i32, i32),
    ) {
        let (width, height) = target;
        unsafe {
            let _: () = msg_send![encoder, setRenderPipelineState: pipeline];
            let viewport = MTLViewport {
                origin_x: 0.0,
                origin_y: 0.0,
                width: width as f64,
                height: height as f64,
                znear: 0.0,
                zfar: 1.0,
            };
            let _: () = msg_send![encoder, setViewport: viewport];

            if let Some(rect) = draw.scissor {
                let clipped = rect.clamp_to(width, height);
                let scissor = MTLScissorRect {
                    x: clipped.x0 as u64,
                    y: clipped.y0 as u64,
                    width: clipped.width() as u64,
                    height: clipped.height() as u64,
                };
                let _: () = msg_send![encoder, setScissorRect: scissor];
            }

            let vertex_bytes: &[u8] = bytemuck::cast_slice(&draw.vertices);
            let index_bytes: &[u8] = bytemuck::cast_slice(&draw.indices);
            let vertex_buffer = owned(msg_send![
                &*self.device,
                newBufferWithBytes: vertex_bytes.as_ptr().cast::<c_void>(),
                length: vertex_bytes.len() as u64,
                options: STORAGE_MODE_SHARED
            ]);
            let index_buffer = owned(msg_send![
                &*self.device,
                newBufferWithBytes: index_bytes.as_ptr().cast::<c_void>(),
                length: index_bytes.len() as u64,
                options: STORAGE_MODE_SHARED
            ]);
            let (Some(vertex_buffer), Some(index_buffer)) = (vertex_buffer, index_buffer) else {
                tracing::debug!("Metal buffer allocation failed; draw skipped");
                return;
            };
            let _: () = msg_send![
                encoder,
                setVertexBuffer: &*vertex_buffer,
                offset: 0u64,
                atIndex: VERTEX_BUFFER_INDEX
            ];

            for binding in &program.reflection.bindings {
                let Some(bytes) = draw
                    .uniform(&binding.name)
                    .and_then(|value| uniform_bytes(&binding.type_name, value))
                else {
                    continue;
                };
                let data = bytes.as_ptr().cast::<c_void>();
                let length = bytes.len() as u64;
                match binding.stage {
                    Stage::Vertex => {
                        let _: () = msg_send![encoder, setVertexBytes: data, length: length, atIndex: binding.index];
                    }
                    Stage::Fragment => {
                        let _: () = msg_send![encoder, setFragmentBytes: data, length: length, atIndex: binding.index];
                    }
                }
            }

            if let Some(texture) = draw.texture.and_then(|id| self.textures.get(&id)) {
                let _: () = msg_send![encoder, setFragmentTexture: &*texture.raw, atIndex: 0u64];
            }

            let _: () = msg_send![
                encoder,
                drawIndexedPrimitives: PRIMITIVE_TRIANGLE,
                indexCount: draw.indices.len() as u64,
                indexType: INDEX_TYPE_UINT16,
                indexBuffer: &*index_buffer,
                indexBufferOffset: 0u64
            ];
        }
    }
}

impl HostedState for MetalState {
    /// Metal type name of the `[[buffer(N)]]` parameter
    type UniformType = String;

    fn start() -> Result<RenderWorker<Self>> {
        RenderWorker::spawn("vellum-metal", MetalState::new)
    }

    fn texture_size_cap() -> i32 {
        8192
    }

    fn max_texture_size(&self) -> i32 {
        0
    }

    fn create_texture(&mut self, width: i32, height: i32) -> Result<u32> {
        let raw = autoreleasepool(|_| unsafe {
            let descriptor: *mut AnyObject = msg_send![
                class!(MTLTextureDescriptor),
                texture2DDescriptorWithPixelFormat: PIXEL_FORMAT_RGBA8_UNORM,
                width: width as u64,
                height: height as u64,
                mipmapped: Bool::NO
            ];
            let descriptor = descriptor
                .as_ref()
                .ok_or_else(|| GpuError::unsupported("MTLTextureDescriptor"))?;
            let _: () = msg_send![
                descriptor,
                setUsage: TEXTURE_USAGE_SHADER_READ | TEXTURE_USAGE_RENDER_TARGET
            ];
            let _: () = msg_send![descriptor, setStorageMode: STORAGE_MODE_MANAGED];
            owned(msg_send![&*self.device, newTextureWithDescriptor: descriptor])
                .ok_or_else(|| GpuError::unsupported(format!("Metal texture {width}x{height}")))
        })?;

        let id = self.alloc_id();
        self.textures.insert(id, TextureEntry { raw, width, height });
        let zeroed = vec![0u8; width as usize * height as usize * 4];
        self.upload(id, PixelRect::from_size(width, height), zeroed);
        Ok(id)
    }

    fn upload(&mut self, id: u32, rect: PixelRect, pixels: Vec<u8>) {
        let Some(texture) = self.textures.get(&id) else {
            return;
        };
        let region = MTLRegion::new_2d(rect.x0, rect.y0, rect.width(), rect.height());
        unsafe {
            let _: () = msg_send![
                &*texture.raw,
                replaceRegion: region,
                mipmapLevel: 0u64,
                withBytes: pixels.as_ptr().cast::<c_void>(),
                bytesPerRow: rect.width() as u64 * 4
            ];
        }
    }

    fn delete_texture(&mut self, id: u32) {
        self.textures.remove(&id);
    }

    fn create_framebuffer(&mut self, width: i32, height: i32) -> Result<(u32, u32)> {
        let texture = self.create_texture(width, height)?;
        let id = self.alloc_id();
        self.framebuffers.insert(id, texture);
        self.bound = Some(id);
        Ok((id, texture))
    }

    fn bind_framebuffer(&mut self, id: u32) {
        if self.framebuffers.contains_key(&id) {
            self.bound = Some(id);
        }
    }

    fn delete_framebuffer(&mut self, id: u32) {
        self.framebuffers.remove(&id);
        if self.bound == Some(id) {
            self.bound = None;
        }
    }

    fn create_program(
        &mut self,
        source: &ShaderSource,
    ) -> Result<(u32, FxHashMap<String, String>)> {
        let text = source
            .metal
            .as_deref()
            .ok_or_else(|| GpuError::ShaderSource("no Metal source provided".into()))?;
        let reflection = reflect(text);

        let library = autoreleasepool(|_| unsafe {
            let ns_source = NSString::from_str(text);
            let mut error: *mut AnyObject = ptr::null_mut();
            let library: *mut AnyObject = msg_send![
                &*self.device,
                newLibraryWithSource: &*ns_source,
                options: ptr::null::<AnyObject>(),
                error: &mut error as *mut *mut AnyObject
            ];
            owned(library).ok_or_else(|| {
                let log = error_message(error);
                tracing::warn!("Metal library compile failed: {}", log);
                GpuError::ShaderCompile {
                    stage: "metal",
                    log,
                }
            })
        })?;

        let vertex = self.new_function(&library, &reflection.vertex_entry)?;
        let fragment = self.new_function(&library, &reflection.fragment_entry)?;
        let pipelines = BLEND_MODES
            .iter()
            .map(|&blend| self.new_pipeline(&vertex, &fragment, &reflection, blend))
            .collect::<Result<Vec<_>>>()?;

        let declared = reflection
            .bindings
            .iter()
            .map(|b| (b.name.clone(), b.type_name.clone()))
            .collect();
        let id = self.alloc_id();
        self.programs.insert(id, Program { pipelines, reflection });
        Ok((id, declared))
    }

    fn delete_program(&mut self, id: u32) {
        self.programs.remove(&id);
    }

    fn clear(&mut self, r: f32, g: f32, b: f32, a: f32) {
        let Some(texture) = self
            .bound
            .and_then(|fb| self.framebuffers.get(&fb))
            .and_then(|tex| self.textures.get(tex))
        else {
            return;
        };
        let color = MTLClearColor {
            red: r as f64,
            green: g as f64,
            blue: b as f64,
            alpha: a as f64,
        };
        self.render_pass(&texture.raw, Some(color), |_| {});
    }

    fn draw(&mut self, draw: QueuedDraw) {
        if draw.indices.is_empty() || draw.vertices.is_empty() {
            return;
        }
        if let Some(target) = draw.target {
            self.bind_framebuffer(target);
        }
        let Some(target) = self
            .bound
            .and_then(|fb| self.framebuffers.get(&fb))
            .and_then(|tex| self.textures.get(tex))
        else {
            tracing::debug!("Metal draw without a bound framebuffer");
            return;
        };
        let Some(program) = self.programs.get(&draw.program) else {
            return;
        };
        let Some(pipeline) = program.pipeline(draw.blend) else {
            return;
        };
        if draw.layout.stride as u64 != program.reflection.vertex_stride {
            tracing::debug!(
                "vertex stride {} does not match the shader's {}; draw skipped",
                draw.layout.stride,
                program.reflection.vertex_stride
            );
            return;
        }
        if draw
            .scissor
            .is_some_and(|rect| rect.clamp_to(target.width, target.height).is_empty())
        {
            return;
        }

        let size = (target.width, target.height);
        self.render_pass(&target.raw, None, |encoder| {
            self.encode_draw(encoder, program, pipeline, &draw, size)
        });
    }

    fn read_framebuffer(&mut self, id: u32, rect: Option<PixelRect>) -> Result<Option<Vec<u8>>> {
        let texture = self
            .framebuffers
            .get(&id)
            .ok_or_else(|| GpuError::unsupported(format!("unknown framebuffer {id}")))?;
        Ok(self.read_texture(*texture, rect)?.map(|px| px.pixels))
    }

    fn read_texture(&mut self, id: u32, rect: Option<PixelRect>) -> Result<Option<TexturePixels>> {
        let texture = self
            .textures
            .get(&id)
            .ok_or_else(|| GpuError::unsupported(format!("unknown texture {id}")))?;
        let Some(rect) = PixelRect::resolve(rect, texture.width, texture.height) else {
            return Ok(None);
        };
        Ok(Some(TexturePixels {
            pixels: self.read_region(&texture.raw, rect),
            width: rect.width(),
            height: rect.height(),
        }))
    }

    fn accepts(declared: &String, value: &UniformValue) -> bool {
        uniform_bytes(declared, value).is_some()
    }
}
