//! Error types for project mutation, validation, and compilation.

use thiserror::Error;

use crate::time::TimeSyntaxError;

/// The error taxonomy shared by every stage of the engine.
///
/// Each kind has a stable code so that reports and scripts can match on it
/// without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// E100: Malformed command or time text
    Syntax,
    /// E200: Dangling pattern, clip, or track reference
    Reference,
    /// E300: Value outside a documented bound
    Range,
    /// E400: Arrangement or mix compilation failure
    Compile,
    /// E500: Missing or unreadable include file
    Include,
    /// E600: External renderer exceeded its timeout
    RenderTimeout,
    /// E601: External renderer failed
    RenderFailure,
}

impl ErrorKind {
    /// Returns the error code string (e.g., "E100").
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Syntax => "E100",
            ErrorKind::Reference => "E200",
            ErrorKind::Range => "E300",
            ErrorKind::Compile => "E400",
            ErrorKind::Include => "E500",
            ErrorKind::RenderTimeout => "E600",
            ErrorKind::RenderFailure => "E601",
        }
    }

    /// Returns the lowercase kind name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Syntax => "syntax",
            ErrorKind::Reference => "reference",
            ErrorKind::Range => "range",
            ErrorKind::Compile => "compile",
            ErrorKind::Include => "include",
            ErrorKind::RenderTimeout => "render_timeout",
            ErrorKind::RenderFailure => "render_failure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Typed error returned by project mutation primitives and the interpreter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("reference error: {0}")]
    Reference(String),
    #[error("range error: {0}")]
    Range(String),
    #[error("compile error: {0}")]
    Compile(String),
    #[error("include error: {0}")]
    Include(String),
    #[error("render timed out after {timeout_secs}s")]
    RenderTimeout { timeout_secs: u64 },
    #[error("render failed: {0}")]
    RenderFailure(String),
}

impl CoreError {
    pub fn syntax(msg: impl Into<String>) -> Self {
        Self::Syntax(msg.into())
    }

    pub fn reference(msg: impl Into<String>) -> Self {
        Self::Reference(msg.into())
    }

    pub fn range(msg: impl Into<String>) -> Self {
        Self::Range(msg.into())
    }

    pub fn compile(msg: impl Into<String>) -> Self {
        Self::Compile(msg.into())
    }

    pub fn include(msg: impl Into<String>) -> Self {
        Self::Include(msg.into())
    }

    /// Returns the taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Syntax(_) => ErrorKind::Syntax,
            CoreError::Reference(_) => ErrorKind::Reference,
            CoreError::Range(_) => ErrorKind::Range,
            CoreError::Compile(_) => ErrorKind::Compile,
            CoreError::Include(_) => ErrorKind::Include,
            CoreError::RenderTimeout { .. } => ErrorKind::RenderTimeout,
            CoreError::RenderFailure(_) => ErrorKind::RenderFailure,
        }
    }
}

impl From<TimeSyntaxError> for CoreError {
    fn from(err: TimeSyntaxError) -> Self {
        CoreError::Syntax(err.to_string())
    }
}

/// Error codes for project validation findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// V001: Clip references a pattern missing from its track
    DanglingPattern,
    /// V002: Sections are not sorted by start bar
    SectionsUnsorted,
    /// V003: Two sections overlap
    SectionOverlap,
    /// V004: Sidechain routes a track to itself
    SidechainSelf,
    /// V005: Sidechain endpoint does not exist
    SidechainMissingTrack,
    /// V006: Scalar field outside its documented bound
    ValueOutOfRange,
    /// V007: Note lies outside its pattern
    NoteOutOfPattern,
    /// V008: Mix spec references a track that does not exist
    MixMissingTrack,
    /// V009: Unsupported schema version
    UnsupportedSchemaVersion,
}

impl ErrorCode {
    /// Returns the error code string (e.g., "V001").
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::DanglingPattern => "V001",
            ErrorCode::SectionsUnsorted => "V002",
            ErrorCode::SectionOverlap => "V003",
            ErrorCode::SidechainSelf => "V004",
            ErrorCode::SidechainMissingTrack => "V005",
            ErrorCode::ValueOutOfRange => "V006",
            ErrorCode::NoteOutOfPattern => "V007",
            ErrorCode::MixMissingTrack => "V008",
            ErrorCode::UnsupportedSchemaVersion => "V009",
        }
    }

    /// Returns the taxonomy kind this finding belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ErrorCode::DanglingPattern
            | ErrorCode::SidechainSelf
            | ErrorCode::SidechainMissingTrack
            | ErrorCode::MixMissingTrack => ErrorKind::Reference,
            ErrorCode::SectionsUnsorted
            | ErrorCode::SectionOverlap
            | ErrorCode::ValueOutOfRange
            | ErrorCode::NoteOutOfPattern
            | ErrorCode::UnsupportedSchemaVersion => ErrorKind::Range,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Warning codes for project validation findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningCode {
    /// W001: Pattern is never placed
    UnusedPattern,
    /// W002: Track has no clips
    EmptyTrack,
    /// W003: Loop or render region is empty or inverted
    EmptyRegion,
}

impl WarningCode {
    /// Returns the warning code string (e.g., "W001").
    pub fn code(&self) -> &'static str {
        match self {
            WarningCode::UnusedPattern => "W001",
            WarningCode::EmptyTrack => "W002",
            WarningCode::EmptyRegion => "W003",
        }
    }
}

impl std::fmt::Display for WarningCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A validation error with code, message, and optional JSON path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The error code.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
    /// JSON path to the problematic field (e.g., "tracks\[0\].clips\[2\]").
    pub path: Option<String>,
}

impl ValidationError {
    /// Creates a new validation error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
        }
    }

    /// Creates a new validation error with a JSON path.
    pub fn with_path(code: ErrorCode, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: Some(path.into()),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref path) = self.path {
            write!(f, "{}: {} (at {})", self.code, self.message, path)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

/// A validation warning with code, message, and optional JSON path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// The warning code.
    pub code: WarningCode,
    /// Human-readable warning message.
    pub message: String,
    /// JSON path to the problematic field.
    pub path: Option<String>,
}

impl ValidationWarning {
    /// Creates a new validation warning with a JSON path.
    pub fn with_path(
        code: WarningCode,
        message: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            path: Some(path.into()),
        }
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref path) = self.path {
            write!(f, "{}: {} (at {})", self.code, self.message, path)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

/// Top-level error type for document operations.
#[derive(Debug, Error)]
pub enum SpecError {
    /// Project validation failed with one or more errors.
    #[error("project validation failed with {0} error(s)")]
    ValidationFailed(usize),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Document shape is not a project.
    #[error("malformed project document: {0}")]
    Malformed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of project validation.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether validation passed (no errors).
    pub ok: bool,
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of validation warnings.
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    /// Creates a successful validation result.
    pub fn success() -> Self {
        Self {
            ok: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
        self.ok = false;
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Returns true if there are no errors.
    pub fn is_ok(&self) -> bool {
        self.ok
    }

    /// Converts to a Result, returning Err if there are errors.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, Vec<ValidationError>> {
        if self.ok {
            Ok(self.warnings)
        } else {
            Err(self.errors)
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::success()
    }
}

/// Common trait for backend errors.
///
/// Each compiler backend implements this trait so that callers can report
/// stable codes and categories without depending on backend error types.
pub trait BackendError: std::error::Error {
    /// Get the error code for reporting, e.g. "MIX_001".
    fn code(&self) -> &'static str;

    /// Get a human-readable message describing the error.
    fn message(&self) -> String {
        self.to_string()
    }

    /// Get the error category, e.g. "mix" or "arrange".
    fn category(&self) -> &'static str;

    /// Get the taxonomy kind of this error.
    fn kind(&self) -> ErrorKind {
        ErrorKind::Compile
    }

    /// Seconds waited before giving up, for timeout errors.
    fn timeout_secs(&self) -> Option<u64> {
        None
    }
}

/// A unified error type that can wrap any backend error.
#[derive(Debug)]
pub struct GenerationError {
    /// The error code (e.g., "MIX_001").
    pub code: &'static str,
    /// The human-readable error message.
    pub message: String,
    /// The error category (e.g., "mix", "arrange").
    pub category: &'static str,
    /// The taxonomy kind.
    pub kind: ErrorKind,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl GenerationError {
    /// Create a `GenerationError` from any `BackendError` implementor.
    pub fn from_backend<E: BackendError + Send + Sync + 'static>(err: E) -> Self {
        Self {
            code: err.code(),
            message: err.message(),
            category: err.category(),
            kind: err.kind(),
            source: Some(Box::new(err)),
        }
    }

    /// Create a `GenerationError` with explicit values.
    pub fn new(code: &'static str, message: impl Into<String>, category: &'static str) -> Self {
        Self {
            code,
            message: message.into(),
            category,
            kind: ErrorKind::Compile,
            source: None,
        }
    }
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for GenerationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}
