//! Error types for the Gosling CLI.
//!
//! Every stage of the pipeline has its own error enum: parsing, conversion,
//! the `MotherGoose` API, the deploy workflow, and repository scaffolding.
//! Validation failures are carried by [`ValidationReport`] itself. All of
//! them fold into [`GoslingError`].

use std::fmt::Write as _;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::{CloudProvider, RunnerKind};
use crate::fly::{Position, ValidationReport, ValueType};
use crate::mothergoose::CancelCause;

/// The main error type for Gosling.
#[derive(Debug, Error)]
pub enum GoslingError {
    /// Fly source could not be read or parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Fly source parsed but failed semantic validation.
    #[error(transparent)]
    Validation(#[from] ValidationReport),

    /// A validated block could not be projected into a domain record.
    #[error("Conversion error: {0}")]
    Convert(#[from] ConvertError),

    /// `MotherGoose` API errors.
    #[error("MotherGoose API error: {0}")]
    Api(#[from] ApiError),

    /// Deploy or rollback workflow errors.
    #[error(transparent)]
    Deploy(#[from] DeployError),

    /// Repository layout errors.
    #[error(transparent)]
    Nest(#[from] NestError),

    /// A file held a block of a type other than the one requested.
    #[error("expected block type \"{expected}\", got \"{found}\"")]
    BlockType {
        /// Requested block type.
        expected: String,
        /// Block type found in the file.
        found: String,
    },

    /// One or more files failed a repository-wide validation.
    #[error("validation failed with {failed} error(s)")]
    FilesFailed {
        /// Number of files that failed.
        failed: usize,
    },

    /// JSON serialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A value had a different kind than the one required.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("expected {expected}, got {actual} at {position}")]
pub struct TypeMismatch {
    /// Kind the caller asked for.
    pub expected: ValueType,
    /// Kind the value actually has.
    pub actual: ValueType,
    /// Where the value was written.
    pub position: Position,
}

/// A single positioned parse diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Where the problem starts.
    pub position: Position,
    /// Short summary.
    pub summary: String,
    /// Longer explanation.
    pub detail: String,
}

impl Diagnostic {
    /// Creates a diagnostic.
    #[must_use]
    pub fn new(position: Position, summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            position,
            summary: summary.into(),
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}: {}", self.position, self.summary)
        } else {
            write!(f, "{}: {}; {}", self.position, self.summary, self.detail)
        }
    }
}

/// Errors produced while reading or parsing Fly source.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The source file could not be read.
    #[error("failed to read {}: {message}", path.display())]
    Read {
        /// Path that failed.
        path: PathBuf,
        /// Underlying IO message.
        message: String,
    },

    /// The source text is not valid Fly.
    #[error("parse errors:\n{}", render_diagnostics(.0))]
    Syntax(Vec<Diagnostic>),
}

impl ParseError {
    /// Returns the syntax diagnostics, if any.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::Syntax(diagnostics) => diagnostics,
            Self::Read { .. } => &[],
        }
    }
}

fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    let mut out = String::new();
    for (i, diagnostic) in diagnostics.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = write!(out, "  - {diagnostic}");
    }
    out
}

/// Errors raised while projecting AST blocks into domain records.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// A required attribute is absent.
    #[error("{block} block at {position} must have a '{field}' attribute")]
    MissingAttribute {
        /// Enclosing block type.
        block: String,
        /// Attribute name.
        field: String,
        /// Position of the enclosing block.
        position: Position,
    },

    /// A required nested block is absent.
    #[error("{block} block at {position} must have a '{field}' nested block")]
    MissingBlock {
        /// Enclosing block type.
        block: String,
        /// Missing block type.
        field: String,
        /// Position of the enclosing block.
        position: Position,
    },

    /// An attribute has the wrong kind.
    #[error("{field}: {source}")]
    Type {
        /// Attribute name.
        field: String,
        /// The mismatch.
        #[source]
        source: TypeMismatch,
    },

    /// An attribute has the right kind but an unusable value.
    #[error("invalid {field} at {position}: {message}")]
    InvalidValue {
        /// Attribute name.
        field: String,
        /// Position of the value.
        position: Position,
        /// What is wrong with it.
        message: String,
    },

    /// A block of an unexpected type was handed to the converter.
    #[error("expected {expected} block, got '{found}' at {position}")]
    WrongBlock {
        /// Block type the conversion handles.
        expected: String,
        /// Block type received.
        found: String,
        /// Position of the block.
        position: Position,
    },

    /// The egg declares a different runner kind than the projection needs.
    #[error("egg type must be '{expected}', got '{found}'")]
    RunnerKindMismatch {
        /// Kind the projection produces.
        expected: RunnerKind,
        /// Kind declared by the egg.
        found: RunnerKind,
    },

    /// A cloud provider rule rejected the configuration.
    #[error("{field}: {message}")]
    CloudRule {
        /// Provider whose rule failed.
        provider: CloudProvider,
        /// Offending field.
        field: String,
        /// Rule message.
        message: String,
    },

    /// Two repositories in one bucket share a name.
    #[error("duplicate repository \"{name}\" in eggsbucket \"{bucket}\"")]
    DuplicateRepository {
        /// Bucket name.
        bucket: String,
        /// Repeated repository name.
        name: String,
    },
}

impl ConvertError {
    /// Returns the name of the field the error refers to.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::MissingAttribute { field, .. }
            | Self::MissingBlock { field, .. }
            | Self::Type { field, .. }
            | Self::InvalidValue { field, .. }
            | Self::CloudRule { field, .. } => field,
            Self::WrongBlock { .. } | Self::RunnerKindMismatch { .. } => "type",
            Self::DuplicateRepository { .. } => "repositories",
        }
    }
}

/// `MotherGoose` API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with a non-2xx status.
    #[error("HTTP {status_code} {status_text}: {body}")]
    Http {
        /// Numeric status code.
        status_code: u16,
        /// Canonical reason phrase.
        status_text: String,
        /// Response body, as text.
        body: String,
    },

    /// The request never produced a response.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    /// A request or response body could not be encoded or decoded.
    #[error("encoding error: {message}")]
    Encoding {
        /// Description of the failure.
        message: String,
    },

    /// The operation context was cancelled or its deadline passed.
    #[error("operation cancelled: {cause}")]
    Cancelled {
        /// Why the context ended.
        cause: CancelCause,
    },

    /// Every retry failed; carries the last error.
    #[error("request failed after {retries} retries: {last}")]
    RetriesExhausted {
        /// Number of retries performed.
        retries: u32,
        /// Error from the final attempt.
        last: Box<ApiError>,
    },

    /// The client could not be built.
    #[error("invalid client configuration: {message}")]
    InvalidConfiguration {
        /// Description of the problem.
        message: String,
    },
}

impl ApiError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an encoding error.
    #[must_use]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Returns the error that ended the operation, looking through
    /// [`ApiError::RetriesExhausted`].
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }

    /// Returns `true` if another attempt may succeed.
    ///
    /// Transport failures, server errors and `429 Too Many Requests` are
    /// retryable; other client errors, encoding errors and cancellation are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Http { status_code, .. } => *status_code >= 500 || *status_code == 429,
            _ => false,
        }
    }

    /// Returns the HTTP status code, if the server answered.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self.root() {
            Self::Http { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Returns `true` for `404 Not Found`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// Returns `true` if the operation was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled { .. })
    }
}

/// Deploy and rollback workflow errors.
#[derive(Debug, Error)]
pub enum DeployError {
    /// An egg failed and the workflow stopped.
    #[error("failed to deploy egg {egg}: {source}")]
    EggFailed {
        /// Egg name.
        egg: String,
        /// What went wrong.
        #[source]
        source: Box<GoslingError>,
    },

    /// Batch mode finished with failures.
    #[error("{failed} of {total} egg(s) failed to deploy")]
    BatchFailed {
        /// Failed egg count.
        failed: usize,
        /// Total egg count.
        total: usize,
    },

    /// No earlier applied plan exists to roll back to.
    #[error("no previous applied plan found for egg {egg}")]
    NoRollbackTarget {
        /// Egg name.
        egg: String,
    },

    /// The egg has never been deployed.
    #[error("no deployment found for egg {egg}")]
    NotDeployed {
        /// Egg name.
        egg: String,
    },

    /// The repository holds no egg configurations.
    #[error("no egg configurations found under {}", root.join("Eggs").display())]
    NoEggs {
        /// Repository root.
        root: PathBuf,
    },
}

impl DeployError {
    /// Wraps an error as the failure of one egg.
    #[must_use]
    pub fn egg_failed(egg: impl Into<String>, source: impl Into<GoslingError>) -> Self {
        Self::EggFailed {
            egg: egg.into(),
            source: Box::new(source.into()),
        }
    }
}

/// Repository layout errors.
#[derive(Debug, Error)]
pub enum NestError {
    /// No directory holding `Eggs/`, `Jobs/` and `UF/` was found.
    #[error("repository not found (searched upward from {} for Eggs/, Jobs/ and UF/)", start.display())]
    NotFound {
        /// Directory the search began in.
        start: PathBuf,
    },

    /// A file the command would create already exists.
    #[error("{} already exists", path.display())]
    AlreadyExists {
        /// Existing path.
        path: PathBuf,
    },

    /// A name is not a valid identifier.
    #[error(
        "invalid {kind} name \"{name}\": must start with a letter and contain only letters, digits, hyphens and underscores"
    )]
    InvalidName {
        /// What was being named.
        kind: &'static str,
        /// Rejected name.
        name: String,
    },

    /// A file holds blocks that do not belong at its location.
    #[error("{}: {message}", path.display())]
    Misplaced {
        /// Offending file.
        path: PathBuf,
        /// What is wrong.
        message: String,
    },
}

/// Result type alias for Gosling operations.
pub type Result<T> = std::result::Result<T, GoslingError>;
