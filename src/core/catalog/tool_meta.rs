//! Per-tool metadata documents: the mode/selection preconditions and
//! descriptive text the firewall and matchers consume.

use crate::core::catalog::workflow::SurfaceFormat;
use crate::core::error::AppError;
use serde::{Deserialize, Serialize};
use signalbox_types::{ErrorCategory, ModeRequirement};
use std::fs;
use std::path::Path;

/// Metadata for one executor tool. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mode_required: ModeRequirement,
    #[serde(default)]
    pub requires_selection: bool,
    #[serde(default)]
    pub sample_prompts: Vec<String>,
}

/// Load one tool metadata file, inferring the syntax from the extension.
pub fn load_tool_file(path: &Path) -> Result<ToolMetadata, AppError> {
    let format = SurfaceFormat::from_extension(path).ok_or_else(|| {
        AppError::new(
            ErrorCategory::ValidationError,
            format!("{}: unsupported tool metadata extension", path.display()),
        )
        .with_code("RTR-CAT-005")
    })?;
    let text = fs::read_to_string(path).map_err(|err| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to read {}: {}", path.display(), err),
        )
        .with_code("RTR-CAT-002")
    })?;
    parse_tool_str(&text, format, &path.display().to_string())
}

/// Parse and validate a tool metadata document from text.
pub fn parse_tool_str(
    text: &str,
    format: SurfaceFormat,
    source: &str,
) -> Result<ToolMetadata, AppError> {
    let parse_error = |err: String| {
        AppError::new(
            ErrorCategory::ValidationError,
            format!("failed to parse {}: {}", source, err),
        )
        .with_code("RTR-CAT-006")
    };
    let metadata: ToolMetadata = match format {
        SurfaceFormat::Yaml => {
            serde_yaml::from_str(text).map_err(|err| parse_error(err.to_string()))?
        }
        SurfaceFormat::Json => {
            serde_json::from_str(text).map_err(|err| parse_error(err.to_string()))?
        }
    };

    if metadata.name.trim().is_empty() {
        return Err(AppError::new(
            ErrorCategory::ValidationError,
            format!("{}: name: must not be empty", source),
        )
        .with_code("RTR-CAT-006"));
    }
    Ok(metadata)
}
