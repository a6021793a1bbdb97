//! Canvas error types

use thiserror::Error;
use vellum_gpu::GpuError;

/// Errors surfaced by canvas construction and configuration
#[derive(Error, Debug)]
pub enum CanvasError {
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Config read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for canvas operations
pub type Result<T> = std::result::Result<T, CanvasError>;
