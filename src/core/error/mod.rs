use signalbox_types::ErrorCategory;
use std::fmt;

/// Structured router error carrying a category, a stable code, and optional
/// source/context information.
#[derive(Debug)]
pub struct AppError {
    pub category: ErrorCategory,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub context: Option<String>,
    pub code: String,
}

impl AppError {
    pub fn new<T: Into<String>>(category: ErrorCategory, message: T) -> Self {
        AppError {
            category,
            message: message.into(),
            source: None,
            context: None,
            code: format!("ERR-{}", uuid::Uuid::new_v4()),
        }
    }

    pub fn with_source<T: Into<String>>(
        category: ErrorCategory,
        message: T,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        let mut error = AppError::new(category, message);
        error.source = Some(source);
        error
    }

    pub fn with_context<T: Into<String>>(mut self, context: T) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_code<T: Into<String>>(mut self, code: T) -> Self {
        self.code = code.into();
        self
    }

    /// Whether the pipeline treats this error as recoverable with a logged
    /// downgrade rather than a structured failure response.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category,
            ErrorCategory::ExecutorError
                | ErrorCategory::VectorStoreError
                | ErrorCategory::TimeoutError
                | ErrorCategory::ExpressionError
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.category, self.message)?;
        if let Some(ref context) = self.context {
            write!(f, " (Context: {})", context)?;
        }
        if let Some(ref source) = self.source {
            write!(f, "\nCaused by: {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::with_source(ErrorCategory::IoError, e.to_string(), Box::new(e))
            .with_code("RTR-IO-001")
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::with_source(ErrorCategory::SerializationError, e.to_string(), Box::new(e))
            .with_code("RTR-SER-001")
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(e: serde_yaml::Error) -> Self {
        AppError::with_source(ErrorCategory::SerializationError, e.to_string(), Box::new(e))
            .with_code("RTR-SER-002")
    }
}
