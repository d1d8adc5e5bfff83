//! Service configuration.
//!
//! Values come from the environment first. An optional YAML file is laid
//! over them, so a file only needs the keys it changes:
//!
//! ```yaml
//! render:
//!   max_instances: 2
//!   working_dir: /var/lib/terrain/work
//! session:
//!   max_inactive_secs: 600
//! ```

use anyhow::{anyhow, Context, Result};
use dem_assembly::DemConfig;
use render_control::{RenderConfig, SessionConfig};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::{Path, PathBuf};

/// HTTP-facing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Capabilities document of the view (WTS) endpoint.
    pub wts_capabilities: Option<PathBuf>,
    /// Capabilities document of the DEM endpoint.
    pub dem_capabilities: Option<PathBuf>,
    /// Capabilities document of the profile endpoint.
    pub profile_capabilities: Option<PathBuf>,
    /// Capabilities document of the sheet-number endpoint.
    pub sheet_capabilities: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let path = |key: &str| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        Self {
            wts_capabilities: path("TERRAIN_WTS_CAPABILITIES"),
            dem_capabilities: path("TERRAIN_DEM_CAPABILITIES"),
            profile_capabilities: path("TERRAIN_PROFILE_CAPABILITIES"),
            sheet_capabilities: path("TERRAIN_SHEET_CAPABILITIES"),
        }
    }
}

/// Complete configuration of the terrain API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub dem: DemConfig,
    pub render: RenderConfig,
    pub session: SessionConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            service: ServiceConfig::from_env(),
            dem: DemConfig::from_env(),
            render: RenderConfig::from_env(),
            session: SessionConfig::from_env(),
        }
    }

    /// Environment configuration, overlaid with `file` when given, then
    /// validated.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config = match file {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                Self::from_env().overlay_yaml(&text)?
            }
            None => Self::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Replace every value that `yaml` sets.
    pub fn overlay_yaml(&self, yaml: &str) -> Result<Self> {
        let overlay: Value = serde_yaml::from_str(yaml).context("invalid YAML configuration")?;
        let mut base = serde_yaml::to_value(self)?;
        merge(&mut base, overlay);
        serde_yaml::from_value(base).context("configuration does not match the expected layout")
    }

    /// Validate all sections.
    pub fn validate(&self) -> Result<()> {
        self.dem.validate().map_err(|e| anyhow!("dem: {}", e))?;
        self.render.validate().map_err(|e| anyhow!("render: {}", e))?;
        self.session.validate().map_err(|e| anyhow!("session: {}", e))?;
        Ok(())
    }
}

fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
