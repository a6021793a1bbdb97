//! Raw Metal bindings
//!
//! Objective-C messaging goes through `objc2`; Metal structs are declared
//! here with their encodings.

use objc2::rc::Retained;
use objc2::runtime::AnyObject;
use objc2::{msg_send, Encode, Encoding};
use objc2_foundation::NSString;

#[link(name = "Metal", kind = "framework")]
#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn MTLCreateSystemDefaultDevice() -> *mut AnyObject;
}

pub(super) type Object = Retained<AnyObject>;

pub const PIXEL_FORMAT_RGBA8_UNORM: u64 = 70;

pub const TEXTURE_USAGE_SHADER_READ: u64 = 1;
pub const TEXTURE_USAGE_RENDER_TARGET: u64 = 4;
pub const STORAGE_MODE_SHARED: u64 = 0;
pub const STORAGE_MODE_MANAGED: u64 = 1;

pub const LOAD_ACTION_LOAD: u64 = 1;
pub const LOAD_ACTION_CLEAR: u64 = 2;
pub const STORE_ACTION_STORE: u64 = 1;

pub const PRIMITIVE_TRIANGLE: u64 = 3;
pub const INDEX_TYPE_UINT16: u64 = 0;

pub const VERTEX_FORMAT_FLOAT: u64 = 28;
pub const VERTEX_FORMAT_FLOAT2: u64 = 29;
pub const VERTEX_FORMAT_FLOAT3: u64 = 30;
pub const VERTEX_FORMAT_FLOAT4: u64 = 31;
pub const STEP_FUNCTION_PER_VERTEX: u64 = 1;

pub const BLEND_FACTOR_ONE: u64 = 1;
pub const BLEND_FACTOR_SOURCE_ALPHA: u64 = 4;
pub const BLEND_FACTOR_ONE_MINUS_SOURCE_ALPHA: u64 = 5;
pub const BLEND_OPERATION_ADD: u64 = 0;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct MTLOrigin {
    pub x: u64,
    pub y: u64,
    pub z: u64,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct MTLSize {
    pub width: u64,
    pub height: u64,
    pub depth: u64,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct MTLRegion {
    pub origin: MTLOrigin,
    pub size: MTLSize,
}

impl MTLRegion {
    pub fn new_2d(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            origin: MTLOrigin {
                x: x as u64,
                y: y as u64,
                z: 0,
            },
            size: MTLSize {
                width: width as u64,
                height: height as u64,
                depth: 1,
            },
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct MTLScissorRect {
    pub x: u64,
    pub y: u64,
    pub width: u64,
    pub height: u64,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct MTLViewport {
    pub origin_x: f64,
    pub origin_y: f64,
    pub width: f64,
    pub height: f64,
    pub znear: f64,
    pub zfar: f64,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct MTLClearColor {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub alpha: f64,
}

unsafe impl Encode for MTLOrigin {
    const ENCODING: Encoding = Encoding::Struct(
        "?",
        &[Encoding::ULongLong, Encoding::ULongLong, Encoding::ULongLong],
    );
}

unsafe impl Encode for MTLSize {
    const ENCODING: Encoding = Encoding::Struct(
        "?",
        &[Encoding::ULongLong, Encoding::ULongLong, Encoding::ULongLong],
    );
}

unsafe impl Encode for MTLRegion {
    const ENCODING: Encoding = Encoding::Struct("?", &[MTLOrigin::ENCODING, MTLSize::ENCODING]);
}

unsafe impl Encode for MTLScissorRect {
    const ENCODING: Encoding = Encoding::Struct(
        "?",
        &[
            Encoding::ULongLong,
            Encoding::ULongLong,
            Encoding::ULongLong,
            Encoding::ULongLong,
        ],
    );
}

unsafe impl Encode for MTLViewport {
    const ENCODING: Encoding = Encoding::Struct(
        "?",
        &[
            Encoding::Double,
            Encoding::Double,
            Encoding::Double,
            Encoding::Double,
            Encoding::Double,
            Encoding::Double,
        ],
    );
}

unsafe impl Encode for MTLClearColor {
    const ENCODING: Encoding = Encoding::Struct(
        "?",
        &[
            Encoding::Double,
            Encoding::Double,
            Encoding::Double,
            Encoding::Double,
        ],
    );
}

/// The default GPU, or `None` on machines without Metal support
pub fn system_default_device() -> Option<Object> {
    unsafe { Retained::from_raw(MTLCreateSystemDefaultDevice()) }
}

/// Take ownership of a +1 reference (`new...` selectors)
pub unsafe fn owned(ptr: *mut AnyObject) -> Option<Object> {
    Retained::from_raw(ptr)
}

/// `localizedDescription` of an `NSError` out-parameter
pub unsafe fn error_message(error: *mut AnyObject) -> String {
    if error.is_null() {
        return "unknown error".to_string();
    }
    let description: *mut NSString = msg_send![error, localizedDescription];
    match description.as_ref() {
        Some(description) => description.to_string(),
        None => "unknown error".to_string(),
    }
}
