//! `studio.toml` plus environment overrides.
//!
//! ```toml
//! project_name = "Field survey"
//! project_file = "data/project.json"
//! default_mode = "2D"
//! units = "meters"
//! projection = "EPSG:3857"
//! max_pending_actions = 64
//!
//! [container]
//! id = "map"
//! width = 1280
//! height = 720
//! ```

use std::path::{Path, PathBuf};

use render::backend::ContainerRef;
use render::view_state::ViewMode;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const ENV_PROJECT: &str = "STUDIO_PROJECT";
pub const ENV_DEFAULT_MODE: &str = "STUDIO_DEFAULT_MODE";
pub const ENV_UNITS: &str = "STUDIO_UNITS";
pub const ENV_PROJECTION: &str = "STUDIO_PROJECTION";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub id: String,
    pub width: u32,
    pub height: u32,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            id: "map".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

impl ContainerConfig {
    pub fn to_ref(&self) -> ContainerRef {
        ContainerRef::new(self.id.clone(), self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub project_name: String,
    /// Snapshot location; in-memory only when unset.
    pub project_file: Option<PathBuf>,
    /// Mode of a freshly created project.
    pub default_mode: ViewMode,
    pub units: String,
    pub projection: String,
    pub max_pending_actions: usize,
    pub container: ContainerConfig,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            project_name: "Untitled".to_string(),
            project_file: None,
            default_mode: ViewMode::TwoD,
            units: catalog::DEFAULT_UNITS.to_string(),
            projection: catalog::DEFAULT_PROJECTION.to_string(),
            max_pending_actions: 64,
            container: ContainerConfig::default(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    InvalidValue { key: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "failed to read {}: {e}", path.display()),
            ConfigError::Parse(path, e) => write!(f, "failed to parse {}: {e}", path.display()),
            ConfigError::InvalidValue { key, value } => write!(f, "invalid {key}: `{value}`"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl StudioConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    /// Applies `STUDIO_*` overrides read through `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(project) = lookup(ENV_PROJECT).filter(|v| !v.trim().is_empty()) {
            self.project_file = Some(PathBuf::from(project));
        }
        if let Some(mode) = lookup(ENV_DEFAULT_MODE) {
            self.default_mode = ViewMode::parse(&mode).ok_or(ConfigError::InvalidValue {
                key: ENV_DEFAULT_MODE,
                value: mode,
            })?;
        }
        if let Some(units) = lookup(ENV_UNITS) {
            if compute::DistanceUnit::parse(&units).is_none() {
                return Err(ConfigError::InvalidValue {
                    key: ENV_UNITS,
                    value: units,
                });
            }
            self.units = units;
        }
        if let Some(projection) = lookup(ENV_PROJECTION).filter(|v| !v.trim().is_empty()) {
            self.projection = projection;
        }
        Ok(())
    }

    /// File (if any), then the process environment. A missing file means defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => match Self::load(p) {
                Err(ConfigError::Io(path, e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(path = %path.display(), "config file not found, using defaults");
                    Self::default()
                }
                loaded => loaded?,
            },
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, StudioConfig};
    use pretty_assertions::assert_eq;
    use render::view_state::ViewMode;
    use std::collections::HashMap;
    use std::path::PathBuf;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: StudioConfig = toml::from_str(
            r#"
            project_name = "Survey"
            default_mode = "3D"

            [container]
            width = 640
            "#,
        )
        .unwrap();
        assert_eq!(config.project_name, "Survey");
        assert_eq!(config.default_mode, ViewMode::ThreeD);
        assert_eq!(config.container.width, 640);
        assert_eq!(config.container.id, "map");
        assert_eq!(config.max_pending_actions, 64);
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("STUDIO_PROJECT", "/tmp/p.json"),
            ("STUDIO_DEFAULT_MODE", "canvas"),
            ("STUDIO_UNITS", "km"),
        ]);
        let mut config = StudioConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.project_file, Some(PathBuf::from("/tmp/p.json")));
        assert_eq!(config.default_mode, ViewMode::Canvas);
        assert_eq!(config.units, "km");
        assert_eq!(config.projection, "EPSG:3857");

        let err = StudioConfig::default()
            .apply_overrides(|k| (k == "STUDIO_DEFAULT_MODE").then(|| "4D".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "STUDIO_DEFAULT_MODE", .. }));
    }

    #[test]
    fn load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studio.toml");
        std::fs::write(&path, "max_pending_actions = \"many\"").unwrap();
        let err = StudioConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("studio.toml"));
        let missing = dir.path().join("missing.toml");
        assert!(matches!(StudioConfig::load(&missing), Err(ConfigError::Io(..))));
        assert_eq!(StudioConfig::resolve(Some(&missing)).unwrap().container.id, "map");
    }
}
