use crate::core::config::{validate_config, RouterConfig};
use crate::core::error::AppError;
use signalbox_types::ErrorCategory;
use std::fs;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "signalbox.toml";

/// Loads `signalbox.toml`, falling back to defaults when absent.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from an explicit path; the file must exist.
    pub fn load(path: &Path) -> Result<RouterConfig, AppError> {
        let text = fs::read_to_string(path).map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("failed to read config {}: {}", path.display(), err),
            )
            .with_code("RTR-CFG-001")
        })?;
        let config: RouterConfig = toml::from_str(&text).map_err(|err| {
            AppError::new(
                ErrorCategory::ValidationError,
                format!("invalid config {}: {}", path.display(), err),
            )
            .with_code("RTR-CFG-002")
        })?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load the workspace config if present, defaults otherwise.
    pub fn load_or_default(workspace: &Path) -> Result<RouterConfig, AppError> {
        let path = workspace.join(DEFAULT_CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            debug!(path = %path.display(), "no config file; using defaults");
            let config = RouterConfig::default();
            validate_config(&config)?;
            Ok(config)
        }
    }
}
