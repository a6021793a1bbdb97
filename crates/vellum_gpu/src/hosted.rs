//! Drivers whose native state is hosted on a render worker
//!
//! OpenGL, WebGL and Metal share this layer. The backend state implements
//! [`HostedState`]; public handles carry a worker-local id plus a reference
//! to the worker, and their `Drop` queues the release of the native object.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use vellum_core::pixels::clip_upload;
use vellum_core::PixelRect;

use crate::backend::Backend;
use crate::driver::{next_instance_id, Driver, Framebuffer, Shader, Texture, TexturePixels};
use crate::error::{check_size, GpuError, Result};
use crate::types::{DrawCall, QueuedDraw, ShaderSource, UniformValue};
use crate::worker::RenderWorker;

/// Backend state living on the render worker. Ids are allocated by the state.
pub(crate) trait HostedState: Sized + 'static {
    /// Declared type of a program uniform
    type UniformType: Clone + fmt::Debug + Send + Sync + 'static;

    /// Build the worker and its state
    fn start() -> Result<RenderWorker<Self>>;

    /// Upper bound on texture edges for this backend
    fn texture_size_cap() -> i32;

    /// What the device reports, 0 when unknown
    fn max_texture_size(&self) -> i32;

    fn create_texture(&mut self, width: i32, height: i32) -> Result<u32>;

    /// Write tightly packed, top-row-first pixels into an in-bounds rect
    fn upload(&mut self, id: u32, rect: PixelRect, pixels: Vec<u8>);

    fn delete_texture(&mut self, id: u32);

    /// Returns `(framebuffer, color texture)` ids; the framebuffer is bound
    fn create_framebuffer(&mut self, width: i32, height: i32) -> Result<(u32, u32)>;

    fn bind_framebuffer(&mut self, id: u32);

    fn delete_framebuffer(&mut self, id: u32);

    /// Returns the program id and its uniforms by name
    fn create_program(
        &mut self,
        source: &ShaderSource,
    ) -> Result<(u32, FxHashMap<String, Self::UniformType>)>;

    fn delete_program(&mut self, id: u32);

    fn clear(&mut self, r: f32, g: f32, b: f32, a: f32);

    fn draw(&mut self, draw: QueuedDraw);

    fn read_framebuffer(&mut self, id: u32, rect: Option<PixelRect>) -> Result<Option<Vec<u8>>>;

    fn read_texture(&mut self, id: u32, rect: Option<PixelRect>) -> Result<Option<TexturePixels>>;

    /// Whether `value` may be written to a uniform declared as `declared`
    fn accepts(declared: &Self::UniformType, value: &UniformValue) -> bool;
}

type Worker<S> = Arc<RenderWorker<S>>;

/// Driver over a [`HostedState`]; call [`Driver::init`] before use
pub(crate) struct HostedDriver<S: HostedState> {
    backend: Backend,
    instance: u64,
    worker: Mutex<Option<Worker<S>>>,
    max_texture_size: AtomicI32,
}

impl<S: HostedState> fmt::Debug for HostedDriver<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedDriver")
            .field("backend", &self.backend)
            .field("instance", &self.instance)
            .field("initialized", &self.worker.lock().is_some())
            .finish()
    }
}

impl<S: HostedState> HostedDriver<S> {
    pub fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            instance: next_instance_id(),
            worker: Mutex::new(None),
            max_texture_size: AtomicI32::new(0),
        }
    }

    fn worker(&self) -> Result<Worker<S>> {
        self.worker.lock().clone().ok_or_else(|| {
            GpuError::unsupported(format!("{} driver is not initialized", self.backend))
        })
    }

    fn texture_of<'a>(&self, texture: &'a dyn Texture) -> Option<&'a HostedTexture<S>> {
        texture
            .as_any()
            .downcast_ref::<HostedTexture<S>>()
            .filter(|t| t.driver == self.instance)
    }

    fn framebuffer_of<'a>(&self, fb: &'a dyn Framebuffer) -> Option<&'a HostedFramebuffer<S>> {
        fb.as_any()
            .downcast_ref::<HostedFramebuffer<S>>()
            .filter(|fb| fb.texture.driver == self.instance)
    }

    fn texture_handle(
        &self,
        id: u32,
        width: i32,
        height: i32,
        worker: Worker<S>,
    ) -> HostedTexture<S> {
        HostedTexture {
            id,
            width,
            height,
            backend: self.backend,
            driver: self.instance,
            worker,
        }
    }
}

impl<S: HostedState> Driver for HostedDriver<S> {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn init(&self) -> Result<()> {
        let mut slot = self.worker.lock();
        if slot.is_some() {
            return Ok(());
        }

        let worker = Arc::new(S::start()?);
        let reported = worker.call(|state| state.max_texture_size())?;
        let max = if reported > 0 {
            reported.min(S::texture_size_cap())
        } else {
            S::texture_size_cap()
        };
        self.max_texture_size.store(max, Ordering::Relaxed);
        tracing::info!("{} driver initialized (max texture {})", self.backend, max);
        *slot = Some(worker);
        Ok(())
    }

    fn dispose(&self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.stop();
            tracing::debug!("{} driver disposed", self.backend);
        }
    }

    fn new_texture(&self, width: i32, height: i32) -> Result<Box<dyn Texture>> {
        check_size(width, height)?;
        let worker = self.worker()?;
        let id = worker.call(move |state| state.create_texture(width, height))??;
        Ok(Box::new(self.texture_handle(id, width, height, worker)))
    }

    fn new_framebuffer(&self, width: i32, height: i32) -> Result<Box<dyn Framebuffer>> {
        check_size(width, height)?;
        let worker = self.worker()?;
        let (id, texture) = worker.call(move |state| state.create_framebuffer(width, height))??;
        Ok(Box::new(HostedFramebuffer {
            id,
            texture: self.texture_handle(texture, width, height, Arc::clone(&worker)),
            worker,
        }))
    }

    fn new_shader(&self, source: &ShaderSource) -> Result<Box<dyn Shader>> {
        let source = source.clone();
        let worker = self.worker()?;
        let (id, declared) = worker.call(move |state| state.create_program(&source))??;
        Ok(Box::new(HostedShader {
            id,
            declared,
            values: Mutex::new(FxHashMap::default()),
            worker,
        }))
    }

    fn clear(&self, r: f32, g: f32, b: f32, a: f32) {
        if let Ok(worker) = self.worker() {
            worker.post(move |state| state.clear(r, g, b, a));
        }
    }

    fn draw(&self, call: &DrawCall<'_>) {
        let Ok(worker) = self.worker() else {
            return;
        };
        let Some(shader) = call.shader.as_any().downcast_ref::<HostedShader<S>>() else {
            tracing::warn!("{} driver: draw with a foreign shader", self.backend);
            return;
        };

        let texture = match call.texture {
            Some(texture) => match self.texture_of(texture) {
                Some(texture) => Some(texture.id),
                None => {
                    tracing::warn!("{} driver: draw with a foreign texture", self.backend);
                    return;
                }
            },
            None => None,
        };
        let target = match call.target {
            Some(fb) => match self.framebuffer_of(fb) {
                Some(fb) => Some(fb.id),
                None => {
                    tracing::warn!("{} driver: draw into a foreign framebuffer", self.backend);
                    return;
                }
            },
            None => None,
        };

        let uniforms = shader
            .values
            .lock()
            .iter()
            .map(|(name, value)| (name.clone(), *value))
            .collect();
        let draw = QueuedDraw::new(call, shader.id, uniforms, texture, target);
        worker.post(move |state| state.draw(draw));
    }

    fn read_pixels(
        &self,
        fb: &dyn Framebuffer,
        rect: Option<PixelRect>,
    ) -> Result<Option<Vec<u8>>> {
        let fb = self
            .framebuffer_of(fb)
            .ok_or_else(|| GpuError::unsupported("framebuffer belongs to another driver"))?;
        let id = fb.id;
        self.worker()?
            .call(move |state| state.read_framebuffer(id, rect))?
    }

    fn read_texture_pixels(
        &self,
        texture: &dyn Texture,
        rect: Option<PixelRect>,
    ) -> Result<Option<TexturePixels>> {
        let texture = self
            .texture_of(texture)
            .ok_or_else(|| GpuError::unsupported("texture belongs to another driver"))?;
        let id = texture.id;
        self.worker()?
            .call(move |state| state.read_texture(id, rect))?
    }

    fn max_texture_size(&self) -> i32 {
        match self.max_texture_size.load(Ordering::Relaxed) {
            0 => S::texture_size_cap(),
            max => max,
        }
    }

    fn instance_id(&self) -> u64 {
        self.instance
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<S: HostedState> Drop for HostedDriver<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Texture handle
pub(crate) struct HostedTexture<S: HostedState> {
    id: u32,
    width: i32,
    height: i32,
    backend: Backend,
    driver: u64,
    worker: Worker<S>,
}

impl<S: HostedState> fmt::Debug for HostedTexture<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedTexture")
            .field("backend", &self.backend)
            .field("id", &self.id)
            .field("size", &(self.width, self.height))
            .finish()
    }
}

impl<S: HostedState> Texture for HostedTexture<S> {
    fn id(&self) -> u32 {
        self.id
    }

    fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    fn upload(&self, pixels: &[u8], region: Option<PixelRect>) {
        let Some((rect, data)) = clip_upload(pixels, region, self.width, self.height) else {
            return;
        };
        let id = self.id;
        self.worker.post(move |state| state.upload(id, rect, data));
    }

    fn backend(&self) -> Backend {
        self.backend
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<S: HostedState> Drop for HostedTexture<S> {
    fn drop(&mut self) {
        let id = self.id;
        self.worker.post(move |state| state.delete_texture(id));
    }
}

/// Framebuffer handle owning its color texture
pub(crate) struct HostedFramebuffer<S: HostedState> {
    id: u32,
    texture: HostedTexture<S>,
    worker: Worker<S>,
}

impl<S: HostedState> fmt::Debug for HostedFramebuffer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedFramebuffer")
            .field("id", &self.id)
            .field("texture", &self.texture)
            .finish()
    }
}

impl<S: HostedState> Framebuffer for HostedFramebuffer<S> {
    fn id(&self) -> u32 {
        self.id
    }

    fn size(&self) -> (i32, i32) {
        self.texture.size()
    }

    fn bind(&self) {
        let id = self.id;
        self.worker.post(move |state| state.bind_framebuffer(id));
    }

    fn texture(&self) -> &dyn Texture {
        &self.texture
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<S: HostedState> Drop for HostedFramebuffer<S> {
    fn drop(&mut self) {
        // the color texture is released right after by its own Drop
        let id = self.id;
        self.worker.post(move |state| state.delete_framebuffer(id));
    }
}

/// Program handle with uniforms staged for the next draw
pub(crate) struct HostedShader<S: HostedState> {
    id: u32,
    declared: FxHashMap<String, S::UniformType>,
    values: Mutex<FxHashMap<String, UniformValue>>,
    worker: Worker<S>,
}

impl<S: HostedState> fmt::Debug for HostedShader<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedShader")
            .field("id", &self.id)
            .field("uniforms", &self.declared.len())
            .finish()
    }
}

impl<S: HostedState> Shader for HostedShader<S> {
    fn id(&self) -> u32 {
        self.id
    }

    fn set_uniform(&self, name: &str, value: UniformValue) -> Result<()> {
        let Some(declared) = self.declared.get(name) else {
            return Ok(());
        };
        if !S::accepts(declared, &value) {
            return Err(GpuError::Uniform {
                name: name.to_string(),
                reason: format!("declared as {declared:?}, got {}", value.type_name()),
            });
        }
        self.values.lock().insert(name.to_string(), value);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<S: HostedState> Drop for HostedShader<S> {
    fn drop(&mut self) {
        let id = self.id;
        self.worker.post(move |state| state.delete_program(id));
    }
}

/// Public newtype over [`HostedDriver`] for one backend
macro_rules! hosted_driver {
    ($(#[$meta:meta])* $name:ident, $state:ty, $backend:expr) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name($crate::hosted::HostedDriver<$state>);

        impl $name {
            /// Uninitialized driver; [`Driver::init`](crate::Driver::init) acquires the device
            pub fn new() -> Self {
                Self($crate::hosted::HostedDriver::with_backend($backend))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl $crate::driver::Driver for $name {
            fn backend(&self) -> $crate::backend::Backend {
                $crate::driver::Driver::backend(&self.0)
            }

            fn init(&self) -> $crate::error::Result<()> {
                $crate::driver::Driver::init(&self.0)
            }

            fn dispose(&self) {
                $crate::driver::Driver::dispose(&self.0)
            }

            fn new_texture(
                &self,
                width: i32,
                height: i32,
            ) -> $crate::error::Result<Box<dyn $crate::driver::Texture>> {
                $crate::driver::Driver::new_texture(&self.0, width, height)
            }

            fn new_framebuffer(
                &self,
                width: i32,
                height: i32,
            ) -> $crate::error::Result<Box<dyn $crate::driver::Framebuffer>> {
                $crate::driver::Driver::new_framebuffer(&self.0, width, height)
            }

            fn new_shader(
                &self,
                source: &$crate::types::ShaderSource,
            ) -> $crate::error::Result<Box<dyn $crate::driver::Shader>> {
                $crate::driver::Driver::new_shader(&self.0, source)
            }

            fn clear(&self, r: f32, g: f32, b: f32, a: f32) {
                $crate::driver::Driver::clear(&self.0, r, g, b, a)
            }

            fn draw(&self, call: &$crate::types::DrawCall<'_>) {
                $crate::driver::Driver::draw(&self.0, call)
            }

            fn read_pixels(
                &self,
                fb: &dyn $crate::driver::Framebuffer,
                rect: Option<vellum_core::PixelRect>,
            ) -> $crate::error::Result<Option<Vec<u8>>> {
                $crate::driver::Driver::read_pixels(&self.0, fb, rect)
            }

            fn read_texture_pixels(
                &self,
                texture: &dyn $crate::driver::Texture,
                rect: Option<vellum_core::PixelRect>,
            ) -> $crate::error::Result<Option<$crate::driver::TexturePixels>> {
                $crate::driver::Driver::read_texture_pixels(&self.0, texture, rect)
            }

            fn max_texture_size(&self) -> i32 {
                $crate::driver::Driver::max_texture_size(&self.0)
            }

            fn instance_id(&self) -> u64 {
                $crate::driver::Driver::instance_id(&self.0)
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }
    };
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::layout::VertexFormat;

    /// CPU stand-in recording what reaches the worker
    #[derive(Default)]
    struct FakeState {
        textures: FxHashMap<u32, (i32, i32, Vec<u8>)>,
        programs: Vec<u32>,
        draws: Vec<(u32, usize, Vec<(String, UniformValue)>)>,
        next_id: u32,
    }

    impl FakeState {
        fn alloc(&mut self) -> u32 {
            self.next_id += 1;
            self.next_id
        }
    }

    impl HostedState for FakeState {
        type UniformType = &'static str;

        fn start() -> Result<RenderWorker<Self>> {
            RenderWorker::spawn("test-hosted", || Ok(FakeState::default()))
        }

        fn texture_size_cap() -> i32 {
            64
        }

        fn max_texture_size(&self) -> i32 {
            4096
        }

        fn create_texture(&mut self, width: i32, height: i32) -> Result<u32> {
            let id = self.alloc();
            let len = (width * height * 4) as usize;
            self.textures.insert(id, (width, height, vec![0; len]));
            Ok(id)
        }

        fn upload(&mut self, id: u32, rect: PixelRect, pixels: Vec<u8>) {
            if let Some((w, _, store)) = self.textures.get_mut(&id) {
                let row = rect.width() as usize * 4;
                for (src, y) in pixels.chunks_exact(row).zip(rect.y0..rect.y1) {
                    let at = (y as usize * *w as usize + rect.x0 as usize) * 4;
                    store[at..at + row].copy_from_slice(src);
                }
            }
        }

        fn delete_texture(&mut self, id: u32) {
            self.textures.remove(&id);
        }

        fn create_framebuffer(&mut self, width: i32, height: i32) -> Result<(u32, u32)> {
            let texture = self.create_texture(width, height)?;
            Ok((self.alloc(), texture))
        }

        fn bind_framebuffer(&mut self, _id: u32) {}

        fn delete_framebuffer(&mut self, _id: u32) {}

        fn create_program(
            &mut self,
            _source: &ShaderSource,
        ) -> Result<(u32, FxHashMap<String, &'static str>)> {
            let id = self.alloc();
            self.programs.push(id);
            let mut declared = FxHashMap::default();
            declared.insert("uAmount".to_string(), "float");
            Ok((id, declared))
        }

        fn delete_program(&mut self, id: u32) {
            self.programs.retain(|p| *p != id);
        }

        fn clear(&mut self, _r: f32, _g: f32, _b: f32, _a: f32) {}

        fn draw(&mut self, draw: QueuedDraw) {
            self.draws.push((draw.program, draw.layout.floats_per_vertex(), draw.uniforms));
        }

        fn read_framebuffer(
            &mut self,
            _id: u32,
            _rect: Option<PixelRect>,
        ) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }

        fn read_texture(
            &mut self,
            id: u32,
            rect: Option<PixelRect>,
        ) -> Result<Option<TexturePixels>> {
            let (w, h, store) = &self.textures[&id];
            Ok(vellum_core::pixels::crop_pixels(store, *w, *h, rect).map(
                |(pixels, width, height)| TexturePixels {
                    pixels,
                    width,
                    height,
                },
            ))
        }

        fn accepts(declared: &&'static str, value: &UniformValue) -> bool {
            *declared == value.type_name()
        }
    }

    fn driver() -> HostedDriver<FakeState> {
        let driver = HostedDriver::with_backend(Backend::OpenGL);
        driver.init().unwrap();
        driver
    }

    #[test]
    fn test_max_texture_size_is_capped() {
        let driver = driver();
        assert_eq!(driver.max_texture_size(), 64);
        driver.init().unwrap();
    }

    #[test]
    fn test_upload_then_read_texture() {
        let driver = driver();
        let tex = driver.new_texture(2, 2).unwrap();
        tex.upload(&[9u8; 4], Some(PixelRect::new(1, 1, 2, 2)));
        let read = driver.read_texture_pixels(tex.as_ref(), None).unwrap().unwrap();
        assert_eq!(&read.pixels[12..16], &[9, 9, 9, 9]);
        assert_eq!(&read.pixels[0..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_uniforms_are_validated_and_snapshotted() {
        let driver = driver();
        let shader = driver.new_shader(&ShaderSource::default()).unwrap();
        shader.set_uniform("uAmount", UniformValue::Float(0.5)).unwrap();
        shader.set_uniform("uUnknown", UniformValue::Int(1)).unwrap();
        assert!(matches!(
            shader.set_uniform("uAmount", UniformValue::Int(1)),
            Err(GpuError::Uniform { .. })
        ));

        let layout = VertexFormat::PosColor.layout();
        let vertices = [0.0f32; 18];
        let indices = [0u16, 1, 2];
        driver.draw(&DrawCall::new(shader.as_ref(), &vertices, &indices).with_layout(&layout));
        shader.set_uniform("uAmount", UniformValue::Float(1.0)).unwrap();

        let worker = driver.worker().unwrap();
        let draws = worker.call(|state| state.draws.clone()).unwrap();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].1, 6);
        assert_eq!(draws[0].2, vec![("uAmount".to_string(), UniformValue::Float(0.5))]);
    }

    #[test]
    fn test_drop_releases_on_worker() {
        let driver = driver();
        let shader = driver.new_shader(&ShaderSource::default()).unwrap();
        let fb = driver.new_framebuffer(1, 1).unwrap();
        drop(shader);
        drop(fb);
        let worker = driver.worker().unwrap();
        let (programs, textures) = worker
            .call(|state| (state.programs.len(), state.textures.len()))
            .unwrap();
        assert_eq!((programs, textures), (0, 0));
    }

    #[test]
    fn test_foreign_resources_rejected() {
        let a = driver();
        let b = driver();
        let tex = a.new_texture(1, 1).unwrap();
        assert!(b.read_texture_pixels(tex.as_ref(), None).is_err());
        a.dispose();
        assert!(a.new_texture(1, 1).unwrap_err().is_unsupported());
    }
}
