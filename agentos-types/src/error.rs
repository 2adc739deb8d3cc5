//! The AgentOS error taxonomy.
//!
//! Every fallible operation in `agentos-core` returns a [`AgentOsError`] or a
//! module-local error that converts into one at the API boundary: leaf
//! errors stay small and `thiserror`-derived, and compose upward via
//! `#[from]`.

use thiserror::Error;

/// Kind of failure, independent of which subsystem raised it.
///
/// `kind()` on [`AgentOsError`] returns this so CLI `--json` output can
/// emit a stable `"kind"` string without matching on the full error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    ValidationFailure,
    StalePrecondition,
    StoreError,
    UpstreamFailure,
    Conflict,
    Cancelled,
    Fatal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::ValidationFailure => "validation_failure",
            ErrorKind::StalePrecondition => "stale_precondition",
            ErrorKind::StoreError => "store_error",
            ErrorKind::UpstreamFailure => "upstream_failure",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Fatal => "fatal",
        }
    }
}

/// The single error type crossing subsystem boundaries in AgentOS.
///
/// Background workers catch at the work-item boundary and record this in
/// the item's audit row rather than propagating further.
#[derive(Debug, Error)]
pub enum AgentOsError {
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("validation failed on field `{field}`: {message}")]
    ValidationFailure { field: String, message: String },

    #[error("stale precondition: {message}")]
    StalePrecondition { message: String },

    #[error("store error: {0}")]
    StoreError(String),

    #[error("upstream failure ({source_system}): {message}")]
    UpstreamFailure {
        source_system: &'static str,
        message: String,
    },

    #[error("conflicting mutation: {message}")]
    Conflict { message: String },

    #[error("cancelled")]
    Cancelled,

    #[error("fatal: {0}")]
    Fatal(String),
}

impl AgentOsError {
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        AgentOsError::NotFound {
            what,
            id: id.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AgentOsError::ValidationFailure {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn stale(message: impl Into<String>) -> Self {
        AgentOsError::StalePrecondition {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AgentOsError::Conflict {
            message: message.into(),
        }
    }

    pub fn upstream(source_system: &'static str, message: impl Into<String>) -> Self {
        AgentOsError::UpstreamFailure {
            source_system,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentOsError::NotFound { .. } => ErrorKind::NotFound,
            AgentOsError::ValidationFailure { .. } => ErrorKind::ValidationFailure,
            AgentOsError::StalePrecondition { .. } => ErrorKind::StalePrecondition,
            AgentOsError::StoreError(_) => ErrorKind::StoreError,
            AgentOsError::UpstreamFailure { .. } => ErrorKind::UpstreamFailure,
            AgentOsError::Conflict { .. } => ErrorKind::Conflict,
            AgentOsError::Cancelled => ErrorKind::Cancelled,
            AgentOsError::Fatal(_) => ErrorKind::Fatal,
        }
    }

    /// Maps to the CLI's process exit codes.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::NotFound => 3,
            ErrorKind::ValidationFailure => 2,
            ErrorKind::StalePrecondition => 4,
            ErrorKind::Cancelled => 5,
            ErrorKind::StoreError
            | ErrorKind::UpstreamFailure
            | ErrorKind::Conflict
            | ErrorKind::Fatal => 1,
        }
    }
}

impl From<serde_json::Error> for AgentOsError {
    fn from(e: serde_json::Error) -> Self {
        AgentOsError::ValidationFailure {
            field: "json".to_string(),
            message: e.to_string(),
        }
    }
}

/// Machine-readable error envelope for `--json` CLI output.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorEnvelope {
    pub kind: String,
    pub message: String,
    pub context: serde_json::Value,
}

impl From<&AgentOsError> for ErrorEnvelope {
    fn from(e: &AgentOsError) -> Self {
        ErrorEnvelope {
            kind: e.kind().as_str().to_string(),
            message: e.to_string(),
            context: serde_json::Value::Null,
        }
    }
}
