//! Shared plain types for the signalbox router: tool calls, correction
//! reasons, editor modes, confidence levels, and error categories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Editor mode reported by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Object,
    Edit,
    Sculpt,
    /// Executor unreachable or reported an unrecognised mode.
    #[default]
    Unknown,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Object => "object",
            Mode::Edit => "edit",
            Mode::Sculpt => "sculpt",
            Mode::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mode precondition declared by tool metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModeRequirement {
    Object,
    Edit,
    Sculpt,
    #[default]
    Any,
}

impl ModeRequirement {
    /// Whether the given scene mode satisfies this requirement.
    pub fn accepts(&self, mode: Mode) -> bool {
        match self {
            ModeRequirement::Any => true,
            ModeRequirement::Object => mode == Mode::Object,
            ModeRequirement::Edit => mode == Mode::Edit,
            ModeRequirement::Sculpt => mode == Mode::Sculpt,
        }
    }

    /// The concrete mode an auto-fix should switch into, if any.
    pub fn target_mode(&self) -> Option<Mode> {
        match self {
            ModeRequirement::Object => Some(Mode::Object),
            ModeRequirement::Edit => Some(Mode::Edit),
            ModeRequirement::Sculpt => Some(Mode::Sculpt),
            ModeRequirement::Any => None,
        }
    }
}

/// Quantized ensemble confidence controlling workflow adaptation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ConfidenceLevel::High => "HIGH",
            ConfidenceLevel::Medium => "MEDIUM",
            ConfidenceLevel::Low => "LOW",
            ConfidenceLevel::None => "NONE",
        };
        f.write_str(text)
    }
}

/// Why a corrected call was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorrectionReason {
    ModeFix,
    SelectionFix,
    Clamp,
    PatternReplace,
    WorkflowStep,
}

impl std::fmt::Display for CorrectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            CorrectionReason::ModeFix => "mode-fix",
            CorrectionReason::SelectionFix => "selection-fix",
            CorrectionReason::Clamp => "clamp",
            CorrectionReason::PatternReplace => "pattern-replace",
            CorrectionReason::WorkflowStep => "workflow-step",
        };
        f.write_str(text)
    }
}

/// A tool call as received from a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
}

impl ToolCall {
    pub fn new<T: Into<String>>(tool: T, params: Map<String, Value>, session_id: Uuid) -> Self {
        ToolCall {
            tool: tool.into(),
            params,
            timestamp: Utc::now(),
            session_id,
        }
    }
}

/// A tool call emitted by the router, annotated with its provenance.
/// `reason: None` marks an intercepted call that passed through
/// uncorrected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectedToolCall {
    pub tool: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
    /// Tool this call replaced, when the firewall rewrote a call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<CorrectionReason>,
}

impl CorrectedToolCall {
    pub fn new<T: Into<String>>(
        tool: T,
        params: Map<String, Value>,
        session_id: Uuid,
        reason: CorrectionReason,
    ) -> Self {
        CorrectedToolCall {
            tool: tool.into(),
            params,
            timestamp: Utc::now(),
            session_id,
            origin_tool: None,
            reason: Some(reason),
        }
    }

    /// An intercepted client call, not (yet) corrected.
    pub fn intercepted<T: Into<String>>(tool: T, params: Map<String, Value>, session_id: Uuid) -> Self {
        CorrectedToolCall {
            tool: tool.into(),
            params,
            timestamp: Utc::now(),
            session_id,
            origin_tool: None,
            reason: None,
        }
    }

    pub fn replacing<T: Into<String>>(mut self, origin: T) -> Self {
        self.origin_tool = Some(origin.into());
        self
    }
}

/// Where a resolved parameter value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Modifier,
    LearnedMapping,
    Default,
    Explicit,
}

impl std::fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ResolutionSource::Modifier => "modifier",
            ResolutionSource::LearnedMapping => "learned_mapping",
            ResolutionSource::Default => "default",
            ResolutionSource::Explicit => "explicit",
        };
        f.write_str(text)
    }
}

/// Outcome of a goal submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Ready,
    NeedsInput,
}

/// Vector store namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Tools,
    Workflows,
    Parameters,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Tools => "tools",
            Namespace::Workflows => "workflows",
            Namespace::Parameters => "parameters",
        }
    }

    pub const ALL: [Namespace; 3] = [Namespace::Tools, Namespace::Workflows, Namespace::Parameters];
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse failure for [`Namespace`].
#[derive(Debug, thiserror::Error)]
#[error("unknown namespace: {0}")]
pub struct NamespaceParseError(pub String);

impl std::str::FromStr for Namespace {
    type Err = NamespaceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tools" => Ok(Namespace::Tools),
            "workflows" => Ok(Namespace::Workflows),
            "parameters" => Ok(Namespace::Parameters),
            other => Err(NamespaceParseError(other.to_string())),
        }
    }
}

/// Error category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    ValidationError,
    ResolutionError,
    ExpressionError,
    ExecutorError,
    VectorStoreError,
    FirewallBlock,
    CircularDependency,
    SerializationError,
    IoError,
    TimeoutError,
    InternalError,
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
