//! Metal driver
//!
//! Metal objects are created and encoded on a dedicated render thread.
//! Each draw is its own command buffer and completes before the next
//! command runs, so readbacks always observe prior draws.

pub mod reflect;

#[cfg(target_os = "macos")]
mod ffi;
#[cfg(target_os = "macos")]
mod state;

#[cfg(target_os = "macos")]
hosted_driver!(
    /// Apple Metal on the system default device
    MetalDriver,
    state::MetalState,
    crate::backend::Backend::Metal
);

#[cfg(all(test, target_os = "macos"))]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::driver::Driver;

    #[test]
    fn test_uninitialized_driver() {
        let driver = MetalDriver::new();
        assert_eq!(driver.backend(), Backend::Metal);
        assert!(driver.new_texture(2, 2).unwrap_err().is_unsupported());
    }
}
