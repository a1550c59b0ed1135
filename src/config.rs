//! Configuration for the canvas library and harness
//!
//! Loaded from TOML files (harness) or JSON strings (host side), e.g.
//!
//! ```toml
//! log_filter = "jawt_canvas=debug"
//! script = [
//!     { event = "shown" },
//!     { event = "resized", width = 640, height = 480 },
//!     { event = "hidden" },
//! ]
//!
//! [library]
//! name = "jawt_canvas"
//! resource_root = "build/resources"
//!
//! [canvas]
//! width = 300
//! height = 300
//! ```

use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::event::{CanvasEvent, Size};
use crate::harness::ScriptStep;

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Toml(toml::de::Error),
    Json(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "could not read {}: {}", path.display(), source)
            }
            ConfigError::Toml(e) => write!(f, "invalid TOML config: {}", e),
            ConfigError::Json(e) => write!(f, "invalid JSON config: {}", e),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml(e) => Some(e),
            ConfigError::Json(e) => Some(e),
        }
    }
}

/// Where the packaged native library lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Library name without platform prefix/suffix
    pub name: String,
    /// Directory holding the `{os}-{arch}/` resource folders. When unset the
    /// library is assumed to be loaded already.
    pub resource_root: Option<PathBuf>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            name: "jawt_canvas".to_string(),
            resource_root: None,
        }
    }
}

/// Initial canvas geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasSettings {
    pub width: i32,
    pub height: i32,
}

impl CanvasSettings {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl Default for CanvasSettings {
    fn default() -> Self {
        Self {
            width: 300,
            height: 300,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// `env_logger` filter; `RUST_LOG` wins when both are set
    pub log_filter: Option<String>,
    pub library: LibraryConfig,
    pub canvas: CanvasSettings,
    /// Lifecycle events replayed by the harness
    pub script: Vec<ScriptStep>,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            log_filter: None,
            library: LibraryConfig::default(),
            canvas: CanvasSettings::default(),
            script: default_script(),
        }
    }
}

/// Open a window, paint, resize, paint again, close it
fn default_script() -> Vec<ScriptStep> {
    vec![
        ScriptStep::new(CanvasEvent::Attached),
        ScriptStep::new(CanvasEvent::Shown),
        ScriptStep::new(CanvasEvent::Paint),
        ScriptStep::with_size(CanvasEvent::Resized, 640, 480),
        ScriptStep::new(CanvasEvent::Paint),
        ScriptStep::new(CanvasEvent::Hidden),
        ScriptStep::new(CanvasEvent::Detached),
    ]
}

impl CanvasConfig {
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(ConfigError::Toml)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(ConfigError::Json)
    }

    /// Read a config file. `.json` files are parsed as JSON, everything else as TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            _ => Self::from_toml_str(&contents),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CanvasConfig::default();
        assert_eq!(config.library.name, "jawt_canvas");
        assert_eq!(config.canvas.size(), Size::new(300, 300));
        assert_eq!(config.script.first(), Some(&ScriptStep::new(CanvasEvent::Attached)));
        assert_eq!(config.script.last(), Some(&ScriptStep::new(CanvasEvent::Detached)));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = CanvasConfig::from_toml_str(
            r#"
            log_filter = "debug"

            [canvas]
            width = 800
            "#,
        )
        .unwrap();

        assert_eq!(config.log_filter.as_deref(), Some("debug"));
        assert_eq!(config.canvas.size(), Size::new(800, 300));
        assert_eq!(config.library, LibraryConfig::default());
        assert_eq!(config.script, default_script());
    }

    #[test]
    fn test_json_config() {
        let config = CanvasConfig::from_json_str(
            r#"{"library": {"resource_root": "res"}, "script": [{"event": "shown"}]}"#,
        )
        .unwrap();

        assert_eq!(config.library.resource_root, Some(PathBuf::from("res")));
        assert_eq!(config.script, vec![ScriptStep::new(CanvasEvent::Shown)]);
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.toml");
        std::fs::write(&path, "[library]\nname = \"demo\"\n").unwrap();

        let config = CanvasConfig::load(&path).unwrap();
        assert_eq!(config.library.name, "demo");

        let err = CanvasConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_invalid_event_name() {
        let err = CanvasConfig::from_toml_str(r#"script = [{ event = "exploded" }]"#).unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }
}
