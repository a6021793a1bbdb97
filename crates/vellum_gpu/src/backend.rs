//! Backend identifiers and selection

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GpuError;

/// Environment variable consulted by [`Backend::from_env`]
pub const BACKEND_ENV: &str = "VELLUM_GPU_BACKEND";

/// Rendering backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Best available: native acceleration first, then software
    #[default]
    Auto,
    #[serde(alias = "gl")]
    OpenGL,
    Metal,
    #[serde(alias = "cpu")]
    Software,
    WebGL,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Auto => "auto",
            Backend::OpenGL => "opengl",
            Backend::Metal => "metal",
            Backend::Software => "software",
            Backend::WebGL => "webgl",
        }
    }

    pub fn is_hardware(&self) -> bool {
        matches!(self, Backend::OpenGL | Backend::Metal | Backend::WebGL)
    }

    /// Backend requested through `VELLUM_GPU_BACKEND`, if set and valid
    pub fn from_env() -> Option<Backend> {
        let raw = std::env::var(BACKEND_ENV).ok()?;
        match raw.parse() {
            Ok(backend) => Some(backend),
            Err(err) => {
                tracing::debug!("ignoring {}: {}", BACKEND_ENV, err);
                None
            }
        }
    }

    /// Native backends `Auto` tries on this target, in order
    pub fn auto_candidates() -> &'static [Backend] {
        if cfg!(target_os = "macos") {
            &[Backend::Metal]
        } else if cfg!(target_arch = "wasm32") {
            &[Backend::WebGL]
        } else {
            &[Backend::OpenGL]
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = GpuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Backend::Auto),
            "opengl" | "gl" => Ok(Backend::OpenGL),
            "metal" => Ok(Backend::Metal),
            "webgl" => Ok(Backend::WebGL),
            "software" | "cpu" => Ok(Backend::Software),
            other => Err(GpuError::Unsupported(format!("unknown backend {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("GL".parse::<Backend>().unwrap(), Backend::OpenGL);
        assert_eq!(" opengl ".parse::<Backend>().unwrap(), Backend::OpenGL);
        assert_eq!("cpu".parse::<Backend>().unwrap(), Backend::Software);
        assert_eq!("Metal".parse::<Backend>().unwrap(), Backend::Metal);
        assert_eq!("webgl".parse::<Backend>().unwrap(), Backend::WebGL);
        assert_eq!("".parse::<Backend>().unwrap(), Backend::Auto);
        assert!("vulkan".parse::<Backend>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for b in [
            Backend::Auto,
            Backend::OpenGL,
            Backend::Metal,
            Backend::Software,
            Backend::WebGL,
        ] {
            assert_eq!(b.to_string().parse::<Backend>().unwrap(), b);
        }
    }
}
