//! Workflow definition schema: parameters, modifiers, steps, and the two
//! surface syntaxes (YAML and JSON) that decode into it.

use crate::core::error::AppError;
use crate::core::expression::{calculate_expression, ExpressionEngine};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use signalbox_types::ErrorCategory;
use std::fs;
use std::path::Path;

/// Surface syntax of a workflow or tool-metadata document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceFormat {
    Yaml,
    Json,
}

impl SurfaceFormat {
    pub fn from_extension(path: &Path) -> Option<SurfaceFormat> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Some(SurfaceFormat::Yaml),
            Some("json") => Some(SurfaceFormat::Json),
            _ => None,
        }
    }

    pub fn from_content_type(content_type: &str) -> Option<SurfaceFormat> {
        match content_type.trim().to_lowercase().as_str() {
            "yaml" | "yml" | "application/yaml" | "text/yaml" => Some(SurfaceFormat::Yaml),
            "json" | "application/json" => Some(SurfaceFormat::Json),
            _ => None,
        }
    }
}

/// Declared parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Float,
    Int,
    Bool,
    String,
    Enum,
}

/// Schema of one workflow parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<(f64, f64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub semantic_hints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl ParameterSchema {
    pub fn is_computed(&self) -> bool {
        self.computed.is_some()
    }

    /// Whether the client must supply this parameter when nothing else
    /// resolves it.
    pub fn is_client_required(&self) -> bool {
        self.default.is_none() && self.computed.is_none()
    }
}

/// A declared modifier phrase: parameter overrides plus optional rejection
/// signals. `negative_signals` is never itself a parameter.
///
/// The wire form is flat: override keys sit directly in the phrase map
/// next to the reserved `negative_signals` key, so serde impls are
/// written by hand.
#[derive(Debug, Clone, Default)]
pub struct ModifierSpec {
    pub overrides: Map<String, Value>,
    pub negative_signals: Vec<String>,
}

impl Serialize for ModifierSpec {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let extra = usize::from(!self.negative_signals.is_empty());
        let mut map = serializer.serialize_map(Some(self.overrides.len() + extra))?;
        for (name, value) in &self.overrides {
            map.serialize_entry(name, value)?;
        }
        if !self.negative_signals.is_empty() {
            map.serialize_entry("negative_signals", &self.negative_signals)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ModifierSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        let mut body = Map::deserialize(deserializer)?;
        let negative_signals = match body.remove("negative_signals") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(signal) => Ok(signal),
                    other => Err(D::Error::custom(format!(
                        "negative_signals entries must be strings, got {}",
                        type_name(&other)
                    ))),
                })
                .collect::<Result<Vec<String>, D::Error>>()?,
            Some(other) => {
                return Err(D::Error::custom(format!(
                    "negative_signals must be a list, got {}",
                    type_name(&other)
                )))
            }
        };
        Ok(ModifierSpec {
            overrides: body,
            negative_signals,
        })
    }
}

/// One workflow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub tool: String,
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub disable_adaptation: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Unknown boolean keys from the source document, in declaration
    /// order; consulted by adaptation as semantic filters. Flattened so a
    /// serialized step round-trips through the loader.
    #[serde(flatten)]
    pub filters: IndexMap<String, bool>,
}

impl WorkflowStep {
    /// Core steps survive every adaptation level.
    pub fn is_core(&self) -> bool {
        !self.optional || self.disable_adaptation
    }
}

/// A loaded workflow definition. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub trigger_keywords: Vec<String>,
    /// Scene proportion patterns this workflow is a good match for,
    /// e.g. `phone_like`, `tower_like`.
    #[serde(default)]
    pub shape_patterns: Vec<String>,
    #[serde(default)]
    pub parameters: IndexMap<String, ParameterSchema>,
    #[serde(default)]
    pub modifiers: IndexMap<String, ModifierSpec>,
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowDefinition {
    pub fn core_steps(&self) -> impl Iterator<Item = &WorkflowStep> {
        self.steps.iter().filter(|s| s.is_core())
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSchema> {
        self.parameters.get(name)
    }
}

// Raw deserialization forms. The public structs above are produced from
// these so unknown step keys and modifier shapes can be checked with
// path-qualified errors instead of serde's defaults.

#[derive(Debug, Deserialize)]
struct RawWorkflow {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    trigger_keywords: Vec<String>,
    #[serde(default)]
    shape_patterns: Vec<String>,
    #[serde(default)]
    parameters: IndexMap<String, ParameterSchema>,
    #[serde(default)]
    modifiers: IndexMap<String, ModifierSpec>,
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    tool: Option<String>,
    params: Option<Map<String, Value>>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    disable_adaptation: bool,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(flatten)]
    extra: IndexMap<String, Value>,
}

/// Load a workflow definition from a file, inferring the surface syntax
/// from the extension.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition, AppError> {
    let format = SurfaceFormat::from_extension(path).ok_or_else(|| {
        AppError::new(
            ErrorCategory::ValidationError,
            format!("{}: unsupported workflow file extension", path.display()),
        )
        .with_code("RTR-CAT-001")
    })?;
    let text = fs::read_to_string(path).map_err(|err| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to read {}: {}", path.display(), err),
        )
        .with_code("RTR-CAT-002")
    })?;
    parse_workflow_str(&text, format, &path.display().to_string())
}

/// Parse and validate a workflow document from text.
pub fn parse_workflow_str(
    text: &str,
    format: SurfaceFormat,
    source: &str,
) -> Result<WorkflowDefinition, AppError> {
    let raw: RawWorkflow = match format {
        SurfaceFormat::Yaml => serde_yaml::from_str(text).map_err(|err| {
            AppError::new(
                ErrorCategory::ValidationError,
                format!("failed to parse {}: {}", source, err),
            )
            .with_code("RTR-CAT-003")
        })?,
        SurfaceFormat::Json => serde_json::from_str(text).map_err(|err| {
            AppError::new(
                ErrorCategory::ValidationError,
                format!("failed to parse {}: {}", source, err),
            )
            .with_code("RTR-CAT-003")
        })?,
    };
    let definition = convert_workflow(raw, source)?;
    validate_workflow(&definition, source)?;
    Ok(definition)
}

fn convert_workflow(raw: RawWorkflow, source: &str) -> Result<WorkflowDefinition, AppError> {
    let mut issues = Vec::new();

    let mut steps = Vec::with_capacity(raw.steps.len());
    for (position, raw_step) in raw.steps.into_iter().enumerate() {
        let mut filters = IndexMap::new();
        for (key, value) in raw_step.extra {
            match value {
                Value::Bool(flag) => {
                    filters.insert(key, flag);
                }
                other => issues.push(format!(
                    "steps[{}].{}: non-standard keys must be boolean, got {}",
                    position,
                    key,
                    type_name(&other)
                )),
            }
        }
        let tool = match raw_step.tool {
            Some(tool) if !tool.trim().is_empty() => tool,
            _ => {
                issues.push(format!("steps[{}].tool: required field missing", position));
                continue;
            }
        };
        let params = match raw_step.params {
            Some(params) => params,
            None => {
                issues.push(format!("steps[{}].params: required field missing", position));
                continue;
            }
        };
        steps.push(WorkflowStep {
            tool,
            params,
            description: raw_step.description,
            condition: raw_step.condition,
            optional: raw_step.optional,
            disable_adaptation: raw_step.disable_adaptation,
            tags: raw_step.tags,
            filters,
        });
    }

    let mut parameters = raw.parameters;
    for (name, schema) in parameters.iter_mut() {
        schema.name = name.clone();
    }

    if !issues.is_empty() {
        return Err(validation_error(source, &issues));
    }

    Ok(WorkflowDefinition {
        name: raw.name,
        description: raw.description,
        trigger_keywords: raw.trigger_keywords,
        shape_patterns: raw.shape_patterns,
        parameters,
        modifiers: raw.modifiers,
        steps,
    })
}

fn validate_workflow(definition: &WorkflowDefinition, source: &str) -> Result<(), AppError> {
    let mut issues = Vec::new();
    let engine = ExpressionEngine::new();

    if definition.name.trim().is_empty() {
        issues.push("name: must not be empty".to_string());
    }
    if definition.steps.is_empty() {
        issues.push("steps: workflow must declare at least one step".to_string());
    }

    for (name, schema) in &definition.parameters {
        if schema.default.is_some() && schema.computed.is_some() {
            issues.push(format!(
                "parameters.{}: 'default' and 'computed' are mutually exclusive",
                name
            ));
        }
        if let Some((min, max)) = schema.range {
            if min > max {
                issues.push(format!("parameters.{}.range: min {} > max {}", name, min, max));
            }
            if let Some(default) = schema.default.as_ref().and_then(Value::as_f64) {
                if default < min || default > max {
                    issues.push(format!(
                        "parameters.{}.default: {} outside range [{}, {}]",
                        name, default, min, max
                    ));
                }
            }
        }
        match schema.kind {
            ParamKind::Enum => match &schema.enum_values {
                Some(values) if !values.is_empty() => {
                    if let Some(Value::String(default)) = &schema.default {
                        let normalized = default.trim().to_lowercase();
                        if !values.iter().any(|v| v.trim().to_lowercase() == normalized) {
                            issues.push(format!(
                                "parameters.{}.default: '{}' is not one of the enum values",
                                name, default
                            ));
                        }
                    }
                }
                _ => issues.push(format!(
                    "parameters.{}: enum parameters require non-empty enum_values",
                    name
                )),
            },
            _ => {
                if schema.enum_values.is_some() {
                    issues.push(format!(
                        "parameters.{}: enum_values is only valid for type enum",
                        name
                    ));
                }
            }
        }
        if let Some(expr) = &schema.computed {
            if let Err(err) = engine.compile(expr) {
                issues.push(format!("parameters.{}.computed: {}", name, err.message));
            }
        }
        for dep in &schema.depends_on {
            if !definition.parameters.contains_key(dep) {
                issues.push(format!(
                    "parameters.{}.depends_on: unknown parameter '{}'",
                    name, dep
                ));
            }
        }
    }

    for (phrase, modifier) in &definition.modifiers {
        if phrase.trim().is_empty() {
            issues.push("modifiers: empty phrase".to_string());
        }
        for param in modifier.overrides.keys() {
            if !definition.parameters.contains_key(param) {
                issues.push(format!(
                    "modifiers.{}: override targets unknown parameter '{}'",
                    phrase, param
                ));
            }
        }
    }

    for (position, step) in definition.steps.iter().enumerate() {
        if let Some(condition) = &step.condition {
            if let Err(err) = engine.compile(condition) {
                issues.push(format!("steps[{}].condition: {}", position, err.message));
            }
        }
        collect_calculate_issues(&step.params, &engine, position, &mut issues);
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(validation_error(source, &issues))
    }
}

fn collect_calculate_issues(
    value: &Map<String, Value>,
    engine: &ExpressionEngine,
    position: usize,
    issues: &mut Vec<String>,
) {
    fn walk(value: &Value, engine: &ExpressionEngine, position: usize, issues: &mut Vec<String>) {
        match value {
            Value::String(text) => {
                if let Some(expr) = calculate_expression(text) {
                    if let Err(err) = engine.compile(expr) {
                        issues.push(format!("steps[{}].params: {}", position, err.message));
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    walk(item, engine, position, issues);
                }
            }
            Value::Object(map) => {
                for child in map.values() {
                    walk(child, engine, position, issues);
                }
            }
            _ => {}
        }
    }
    for child in value.values() {
        walk(child, engine, position, issues);
    }
}

fn validation_error(source: &str, issues: &[String]) -> AppError {
    AppError::new(
        ErrorCategory::ValidationError,
        format!("{}: {}", source, issues.join("; ")),
    )
    .with_code("RTR-CAT-004")
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
