//! GPU driver error types

use thiserror::Error;

/// Driver and resource-creation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GpuError {
    /// Backend or feature not available on this platform
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Requested a texture or framebuffer with a non-positive dimension
    #[error("Unsupported size {width}x{height}")]
    InvalidSize { width: i32, height: i32 },

    /// A shader stage failed to compile
    #[error("{stage} shader compile failed: {log}")]
    ShaderCompile { stage: &'static str, log: String },

    /// Program link or pipeline creation failed
    #[error("Shader link failed: {0}")]
    ShaderLink(String),

    /// Shader source missing or malformed
    #[error("Shader source error: {0}")]
    ShaderSource(String),

    /// Framebuffer completeness check failed with the given status
    #[error("Framebuffer incomplete (status 0x{0:x})")]
    FramebufferIncomplete(u32),

    /// A uniform value does not match the declared type
    #[error("Uniform {name}: {reason}")]
    Uniform { name: String, reason: String },

    /// The render worker thread is gone or failed to start
    #[error("Render worker error: {0}")]
    Worker(String),
}

impl GpuError {
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// True for the recoverable "fall back to software" family
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_) | Self::InvalidSize { .. })
    }
}

/// Result type for GPU operations
pub type Result<T> = std::result::Result<T, GpuError>;

/// Reject non-positive dimensions
pub(crate) fn check_size(width: i32, height: i32) -> Result<()> {
    if width <= 0 || height <= 0 {
        return Err(GpuError::InvalidSize { width, height });
    }
    Ok(())
}
