//! Headless desktop GL contexts
//!
//! Linux and the BSDs use OSMesa, Windows uses a legacy WGL context on a
//! hidden window. Libraries are loaded at runtime, so a missing driver is an
//! `Unsupported` error rather than a link failure. Contexts are created on
//! and stay current on the render thread.

use std::ffi::{c_void, CString};

use super::state::{ContextGuard, GlState};
use crate::error::{GpuError, Result};

/// Build a context on the calling thread and wrap it in a [`GlState`]
pub(super) fn create_state() -> Result<GlState> {
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        let context = osmesa::OsMesaContext::new()?;
        let gl = unsafe {
            glow::Context::from_loader_function(|name| context.proc_address(name))
        };
        log_context(&gl);
        GlState::new(gl, Some(Box::new(context)))
    }

    #[cfg(windows)]
    {
        let context = wgl::WglContext::new()?;
        let gl = unsafe {
            glow::Context::from_loader_function(|name| context.proc_address(name))
        };
        log_context(&gl);
        GlState::new(gl, Some(Box::new(context)))
    }

    #[cfg(not(any(all(unix, not(target_os = "macos")), windows)))]
    {
        Err(GpuError::unsupported("no headless OpenGL context on this platform"))
    }
}

#[allow(dead_code)]
fn log_context(gl: &glow::Context) {
    use glow::HasContext;
    let version = gl.version();
    tracing::debug!(
        "OpenGL context {}.{} {}",
        version.major,
        version.minor,
        version.vendor_info
    );
}

#[allow(dead_code)]
fn symbol_name(name: &str) -> Option<CString> {
    CString::new(name).ok()
}

#[allow(dead_code)]
fn load_error(what: &str, err: impl std::fmt::Display) -> GpuError {
    GpuError::Unsupported(format!("{what}: {err}"))
}

#[cfg(all(unix, not(target_os = "macos")))]
mod osmesa {
    use super::*;
    use libloading::Library;
    use std::os::raw::c_char;

    const OSMESA_RGBA: u32 = 0x1908;
    const GL_UNSIGNED_BYTE: u32 = 0x1401;

    const LIBRARY_NAMES: &[&str] = &["libOSMesa.so.8", "libOSMesa.so.6", "libOSMesa.so"];

    type CreateContextExt =
        unsafe extern "C" fn(u32, i32, i32, i32, *mut c_void) -> *mut c_void;
    type MakeCurrent = unsafe extern "C" fn(*mut c_void, *mut c_void, u32, i32, i32) -> u8;
    type DestroyContext = unsafe extern "C" fn(*mut c_void);
    type GetProcAddress = unsafe extern "C" fn(*const c_char) -> *const c_void;

    /// Off-screen Mesa context. Rendering only ever targets FBOs, so the
    /// default surface is a single pixel.
    pub(super) struct OsMesaContext {
        context: *mut c_void,
        destroy: DestroyContext,
        get_proc: GetProcAddress,
        _surface: Box<[u8; 4]>,
        _library: Library,
    }

    impl OsMesaContext {
        pub fn new() -> Result<Self> {
            let library = LIBRARY_NAMES
                .iter()
                .find_map(|name| unsafe { Library::new(name).ok() })
                .ok_or_else(|| GpuError::unsupported("OSMesa library not found"))?;

            unsafe {
                let create = *library
                    .get::<CreateContextExt>(b"OSMesaCreateContextExt\0")
                    .map_err(|e| load_error("OSMesaCreateContextExt", e))?;
                let make_current = *library
                    .get::<MakeCurrent>(b"OSMesaMakeCurrent\0")
                    .map_err(|e| load_error("OSMesaMakeCurrent", e))?;
                let destroy = *library
                    .get::<DestroyContext>(b"OSMesaDestroyContext\0")
                    .map_err(|e| load_error("OSMesaDestroyContext", e))?;
                let get_proc = *library
                    .get::<GetProcAddress>(b"OSMesaGetProcAddress\0")
                    .map_err(|e| load_error("OSMesaGetProcAddress", e))?;

                let context = create(OSMESA_RGBA, 24, 8, 0, std::ptr::null_mut());
                if context.is_null() {
                    return Err(GpuError::unsupported("OSMesaCreateContextExt failed"));
                }

                let mut surface = Box::new([0u8; 4]);
                let current = make_current(
                    context,
                    surface.as_mut_ptr().cast(),
                    GL_UNSIGNED_BYTE,
                    1,
                    1,
                );
                if current == 0 {
                    destroy(context);
                    return Err(GpuError::unsupported("OSMesaMakeCurrent failed"));
                }

                Ok(Self {
                    context,
                    destroy,
                    get_proc,
                    _surface: surface,
                    _library: library,
                })
            }
        }

        pub fn proc_address(&self, name: &str) -> *const c_void {
            match symbol_name(name) {
                Some(name) => unsafe { (self.get_proc)(name.as_ptr()) },
                None => std::ptr::null(),
            }
        }
    }

    impl ContextGuard for OsMesaContext {}

    impl Drop for OsMesaContext {
        fn drop(&mut self) {
            unsafe { (self.destroy)(self.context) };
        }
    }
}

#[cfg(windows)]
mod wgl {
    use super::*;
    use libloading::Library;
    use std::os::raw::c_char;

    type Handle = *mut c_void;

    const WS_POPUP: u32 = 0x8000_0000;
    const PFD_DOUBLEBUFFER: u32 = 0x0000_0001;
    const PFD_DRAW_TO_WINDOW: u32 = 0x0000_0004;
    const PFD_SUPPORT_OPENGL: u32 = 0x0000_0020;
    const PFD_TYPE_RGBA: u8 = 0;

    #[repr(C)]
    #[derive(Default)]
    struct PixelFormatDescriptor {
        size: u16,
        version: u16,
        flags: u32,
        pixel_type: u8,
        color_bits: u8,
        red_bits: u8,
        red_shift: u8,
        green_bits: u8,
        green_shift: u8,
        blue_bits: u8,
        blue_shift: u8,
        alpha_bits: u8,
        alpha_shift: u8,
        accum_bits: u8,
        accum_red_bits: u8,
        accum_green_bits: u8,
        accum_blue_bits: u8,
        accum_alpha_bits: u8,
        depth_bits: u8,
        stencil_bits: u8,
        aux_buffers: u8,
        layer_type: u8,
        reserved: u8,
        layer_mask: u32,
        visible_mask: u32,
        damage_mask: u32,
    }

    type CreateWindowExA = unsafe extern "system" fn(
        u32,
        *const c_char,
        *const c_char,
        u32,
        i32,
        i32,
        i32,
        i32,
        Handle,
        Handle,
        Handle,
        *mut c_void,
    ) -> Handle;
    type DestroyWindow = unsafe extern "system" fn(Handle) -> i32;
    type GetDc = unsafe extern "system" fn(Handle) -> Handle;
    type ReleaseDc = unsafe extern "system" fn(Handle, Handle) -> i32;
    type ChoosePixelFormat =
        unsafe extern "system" fn(Handle, *const PixelFormatDescriptor) -> i32;
    type SetPixelFormat =
        unsafe extern "system" fn(Handle, i32, *const PixelFormatDescriptor) -> i32;
    type WglCreateContext = unsafe extern "system" fn(Handle) -> Handle;
    type WglMakeCurrent = unsafe extern "system" fn(Handle, Handle) -> i32;
    type WglDeleteContext = unsafe extern "system" fn(Handle) -> i32;
    type WglGetProcAddress = unsafe extern "system" fn(*const c_char) -> *const c_void;

    /// Legacy WGL context on an invisible 1x1 window. Only the compatibility
    /// profile is requested since the engine's GLSL targets version 1.10.
    pub(super) struct WglContext {
        window: Handle,
        dc: Handle,
        context: Handle,
        destroy_window: DestroyWindow,
        release_dc: ReleaseDc,
        make_current: WglMakeCurrent,
        delete_context: WglDeleteContext,
        get_proc: WglGetProcAddress,
        opengl32: Library,
        _gdi32: Library,
        _user32: Library,
    }

    impl WglContext {
        pub fn new() -> Result<Self> {
            unsafe {
                let user32 =
                    Library::new("user32.dll").map_err(|e| load_error("user32.dll", e))?;
                let gdi32 = Library::new("gdi32.dll").map_err(|e| load_error("gdi32.dll", e))?;
                let opengl32 =
                    Library::new("opengl32.dll").map_err(|e| load_error("opengl32.dll", e))?;

                let create_window = *user32
                    .get::<CreateWindowExA>(b"CreateWindowExA\0")
                    .map_err(|e| load_error("CreateWindowExA", e))?;
                let destroy_window = *user32
                    .get::<DestroyWindow>(b"DestroyWindow\0")
                    .map_err(|e| load_error("DestroyWindow", e))?;
                let get_dc = *user32
                    .get::<GetDc>(b"GetDC\0")
                    .map_err(|e| load_error("GetDC", e))?;
                let release_dc = *user32
                    .get::<ReleaseDc>(b"ReleaseDC\0")
                    .map_err(|e| load_error("ReleaseDC", e))?;
                let choose_format = *gdi32
                    .get::<ChoosePixelFormat>(b"ChoosePixelFormat\0")
                    .map_err(|e| load_error("ChoosePixelFormat", e))?;
                let set_format = *gdi32
                    .get::<SetPixelFormat>(b"SetPixelFormat\0")
                    .map_err(|e| load_error("SetPixelFormat", e))?;
                let create_context = *opengl32
                    .get::<WglCreateContext>(b"wglCreateContext\0")
                    .map_err(|e| load_error("wglCreateContext", e))?;
                let make_current = *opengl32
                    .get::<WglMakeCurrent>(b"wglMakeCurrent\0")
                    .map_err(|e| load_error("wglMakeCurrent", e))?;
                let delete_context = *opengl32
                    .get::<WglDeleteContext>(b"wglDeleteContext\0")
                    .map_err(|e| load_error("wglDeleteContext", e))?;
                let get_proc = *opengl32
                    .get::<WglGetProcAddress>(b"wglGetProcAddress\0")
                    .map_err(|e| load_error("wglGetProcAddress", e))?;

                // the predefined STATIC class avoids registering a window class
                let window = create_window(
                    0,
                    b"STATIC\0".as_ptr().cast(),
                    b"vellum\0".as_ptr().cast(),
                    WS_POPUP,
                    0,
                    0,
                    1,
                    1,
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                );
                if window.is_null() {
                    return Err(GpuError::unsupported("failed to create hidden window"));
                }
                let dc = get_dc(window);

                let descriptor = PixelFormatDescriptor {
                    size: std::mem::size_of::<PixelFormatDescriptor>() as u16,
                    version: 1,
                    flags: PFD_DRAW_TO_WINDOW | PFD_SUPPORT_OPENGL | PFD_DOUBLEBUFFER,
                    pixel_type: PFD_TYPE_RGBA,
                    color_bits: 32,
                    alpha_bits: 8,
                    depth_bits: 24,
                    stencil_bits: 8,
                    ..Default::default()
                };
                let format = choose_format(dc, &descriptor);
                let context = if format != 0 && set_format(dc, format, &descriptor) != 0 {
                    create_context(dc)
                } else {
                    std::ptr::null_mut()
                };
                if context.is_null() || make_current(dc, context) == 0 {
                    if !context.is_null() {
                        delete_context(context);
                    }
                    release_dc(window, dc);
                    destroy_window(window);
                    return Err(GpuError::unsupported("WGL context creation failed"));
                }

                Ok(Self {
                    window,
                    dc,
                    context,
                    destroy_window,
                    release_dc,
                    make_current,
                    delete_context,
                    get_proc,
                    opengl32,
                    _gdi32: gdi32,
                    _user32: user32,
                })
            }
        }

        /// Extension entry points come from `wglGetProcAddress`, GL 1.1 ones
        /// only from opengl32.dll itself.
        pub fn proc_address(&self, name: &str) -> *const c_void {
            let Some(name) = symbol_name(name) else {
                return std::ptr::null();
            };
            unsafe {
                let ptr = (self.get_proc)(name.as_ptr());
                match ptr as isize {
                    -1 | 0..=3 => self
                        .opengl32
                        .get::<*const c_void>(name.as_bytes_with_nul())
                        .map(|symbol| *symbol)
                        .unwrap_or(std::ptr::null()),
                    _ => ptr,
                }
            }
        }
    }

    impl ContextGuard for WglContext {}

    impl Drop for WglContext {
        fn drop(&mut self) {
            unsafe {
                (self.make_current)(std::ptr::null_mut(), std::ptr::null_mut());
                (self.delete_context)(self.context);
                (self.release_dc)(self.window, self.dc);
                (self.destroy_window)(self.window);
            }
        }
    }
}
