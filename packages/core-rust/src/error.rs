//! Error taxonomy shared by every dispatch path, and its wire form.

use serde::{Deserialize, Serialize};

use crate::codec::CodecError;

/// Errors surfaced to the caller of an operation.
///
/// The variants are grouped by what the caller can do about them: the first
/// three are domain outcomes that cross the wire verbatim, the rest are
/// infrastructure or contract faults.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("not authorized: {reason}")]
    NotAuthorized { reason: String },
    #[error("validation failed: {message}")]
    Validation { message: String },
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("remote execution failed: {message} (correlation id {correlation_id})")]
    RemoteExecution {
        message: String,
        correlation_id: String,
    },
    #[error("{type_name} has no {route} operation")]
    NotImplemented { type_name: String, route: String },
    #[error("configuration error: {message}")]
    Configuration { message: String },
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("server overloaded, try again later")]
    Overloaded,
    #[error("transport error: {message}")]
    Transport { message: String },
    #[error("unknown operation: {key}")]
    UnknownOperation { key: String },
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OperationError {
    pub fn not_authorized(reason: impl Into<String>) -> Self {
        Self::NotAuthorized {
            reason: reason.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Cancellation is a terminal state, not a fault.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Short label used for the `outcome` field of spans and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotAuthorized { .. } => "not_authorized",
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Codec(_) => "codec",
            Self::RemoteExecution { .. } => "remote_execution",
            Self::NotImplemented { .. } => "not_implemented",
            Self::Configuration { .. } => "configuration",
            Self::Cancelled => "cancelled",
            Self::Timeout { .. } => "timeout",
            Self::Overloaded => "overloaded",
            Self::Transport { .. } => "transport",
            Self::UnknownOperation { .. } => "unknown_operation",
            Self::Internal(_) => "internal",
        }
    }

    /// Converts the error into the form sent back to a remote caller.
    ///
    /// Domain outcomes keep their message. Every other fault is replaced by a
    /// generic message carrying only the correlation id, so implementation
    /// details never leave the process.
    #[must_use]
    pub fn to_wire(&self, correlation_id: &str) -> WireError {
        let (kind, message) = match self {
            Self::NotAuthorized { reason } => (WireErrorKind::NotAuthorized, reason.clone()),
            Self::Validation { message } => (WireErrorKind::Validation, message.clone()),
            Self::NotFound { message } => (WireErrorKind::NotFound, message.clone()),
            Self::Overloaded => (WireErrorKind::Overloaded, self.to_string()),
            Self::Cancelled => (WireErrorKind::Cancelled, self.to_string()),
            _ => (
                WireErrorKind::RemoteExecution,
                format!("remote operation failed (correlation id {correlation_id})"),
            ),
        };
        WireError { kind, message }
    }
}

/// Category of an error that crossed the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireErrorKind {
    NotAuthorized,
    Validation,
    NotFound,
    Overloaded,
    Cancelled,
    RemoteExecution,
}

/// Error body of a remote response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: WireErrorKind,
    pub message: String,
}

impl WireError {
    /// Rebuilds the caller-side error for a response tied to `correlation_id`.
    #[must_use]
    pub fn into_operation_error(self, correlation_id: &str) -> OperationError {
        match self.kind {
            WireErrorKind::NotAuthorized => OperationError::NotAuthorized {
                reason: self.message,
            },
            WireErrorKind::Validation => OperationError::Validation {
                message: self.message,
            },
            WireErrorKind::NotFound => OperationError::NotFound {
                message: self.message,
            },
            WireErrorKind::Overloaded => OperationError::Overloaded,
            WireErrorKind::Cancelled => OperationError::Cancelled,
            WireErrorKind::RemoteExecution => OperationError::RemoteExecution {
                message: self.message,
                correlation_id: correlation_id.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MappingError;

    #[test]
    fn domain_errors_cross_the_wire_verbatim() {
        let wire = OperationError::validation("name must not be empty").to_wire("c-1");
        assert_eq!(wire.kind, WireErrorKind::Validation);
        assert_eq!(wire.message, "name must not be empty");

        let back = wire.into_operation_error("c-1");
        assert!(matches!(back, OperationError::Validation { message } if message == "name must not be empty"));
    }

    #[test]
    fn unknown_faults_do_not_leak_details() {
        let err = OperationError::Internal(anyhow::anyhow!("connection string postgres://secret"));
        let wire = err.to_wire("abc-123");
        assert_eq!(wire.kind, WireErrorKind::RemoteExecution);
        assert!(!wire.message.contains("secret"));
        assert!(wire.message.contains("abc-123"));
    }

    #[test]
    fn codec_faults_become_remote_execution() {
        let err = OperationError::from(CodecError::from(MappingError::new("Person", "name")));
        let back = err.to_wire("x").into_operation_error("x");
        assert!(matches!(
            back,
            OperationError::RemoteExecution { correlation_id, .. } if correlation_id == "x"
        ));
    }

    #[test]
    fn cancellation_is_distinguishable() {
        assert!(OperationError::Cancelled.is_cancelled());
        assert!(!OperationError::Overloaded.is_cancelled());
        assert_eq!(OperationError::Cancelled.label(), "cancelled");
    }
}
