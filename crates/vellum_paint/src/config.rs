//! Canvas configuration
//!
//! Loaded from TOML, then optionally overridden from the environment:
//!
//! - `VELLUM_GPU_BACKEND=software`
//! - `VELLUM_CANVAS_WIDTH=640`
//! - `VELLUM_CANVAS_HEIGHT=480`

use std::path::Path;

use serde::{Deserialize, Serialize};
use vellum_gpu::Backend;

use crate::error::Result;

pub const WIDTH_ENV: &str = "VELLUM_CANVAS_WIDTH";
pub const HEIGHT_ENV: &str = "VELLUM_CANVAS_HEIGHT";

fn env_i32(name: &str) -> Option<i32> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<i32>().ok())
        .filter(|v| *v > 0)
}

/// Size and backend of a [`GpuCanvas`](crate::GpuCanvas)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: i32,
    pub height: i32,
    pub backend: Backend,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 200,
            backend: Backend::Auto,
        }
    }
}

impl CanvasConfig {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Apply `VELLUM_GPU_BACKEND`, `VELLUM_CANVAS_WIDTH` and
    /// `VELLUM_CANVAS_HEIGHT`. Unset or unparsable values leave the field
    /// as it was.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(backend) = Backend::from_env() {
            self.backend = backend;
        }
        if let Some(width) = env_i32(WIDTH_ENV) {
            self.width = width;
        }
        if let Some(height) = env_i32(HEIGHT_ENV) {
            self.height = height;
        }
        tracing::debug!(
            "canvas config: {}x{} backend={}",
            self.width,
            self.height,
            self.backend
        );
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CanvasConfig::default();
        assert_eq!((config.width, config.height), (320, 200));
        assert_eq!(config.backend, Backend::Auto);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = CanvasConfig::from_toml("width = 64\nbackend = \"cpu\"\n").unwrap();
        assert_eq!(config.width, 64);
        assert_eq!(config.height, 200);
        assert_eq!(config.backend, Backend::Software);
    }

    #[test]
    fn test_parse_error() {
        let err = CanvasConfig::from_toml("width = \"wide\"").unwrap_err();
        assert!(matches!(err, crate::CanvasError::Config(_)));
    }

    #[test]
    fn test_serialize_lowercase_backend() {
        let config = CanvasConfig::new(8, 8).with_backend(Backend::OpenGL);
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("backend = \"opengl\""));
    }
}
