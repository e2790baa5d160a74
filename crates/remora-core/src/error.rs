//! Error types for Remora.
//!
//! Startup errors (`Bind`, `DuplicateService`, `InvalidDescriptor`) abort
//! initialization. Per-call errors are turned into [`Failure`] payloads at the
//! dispatcher boundary and travel back to the caller instead of dropping the
//! connection.
//!
//! [`Failure`]: crate::protocol::Failure

use crate::protocol::{Failure, FailureKind};
use std::net::SocketAddr;
use thiserror::Error;

/// Main error type for the Remora library.
#[derive(Debug, Error)]
pub enum RemotingError {
    // Startup errors
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Service already registered: {name}")]
    DuplicateService { name: String },

    #[error("Invalid descriptor for {service}: {message}")]
    InvalidDescriptor { service: String, message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // Per-call errors
    #[error("Unknown service: {name}")]
    UnknownService { name: String },

    #[error("Unknown method {method} on service {service}")]
    UnknownMethod { service: String, method: String },

    #[error("Argument mismatch for {method}: {message}")]
    ArgumentMismatch { method: String, message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Application error: {message}")]
    Application {
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("Call timed out after {0:?}")]
    Timeout(std::time::Duration),

    // Transport errors
    #[error("Connection to {addr} lost")]
    ConnectionLost { addr: SocketAddr },

    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Remora operations.
pub type Result<T> = std::result::Result<T, RemotingError>;

impl From<std::io::Error> for RemotingError {
    fn from(err: std::io::Error) -> Self {
        RemotingError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for RemotingError {
    fn from(err: serde_json::Error) -> Self {
        RemotingError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RemotingError {
    /// Convert to a JSON-RPC style error code.
    ///
    /// - -32700: Protocol (undecodable request)
    /// - -32601: Unknown method
    /// - -32602: Argument mismatch
    /// - -32603: Internal error
    ///
    /// Application-defined codes:
    /// - -32000: Error raised by the service implementation
    /// - -32001: Unknown service
    /// - -32003: Call timed out
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            RemotingError::Protocol { .. } | RemotingError::Json { .. } => -32700,
            RemotingError::UnknownMethod { .. } => -32601,
            RemotingError::ArgumentMismatch { .. } => -32602,
            RemotingError::Application { .. } => -32000,
            RemotingError::UnknownService { .. } => -32001,
            RemotingError::Timeout(_) => -32003,
            _ => -32603,
        }
    }

    /// Classify this error for the wire.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            RemotingError::UnknownService { .. } => FailureKind::UnknownService,
            RemotingError::UnknownMethod { .. } => FailureKind::UnknownMethod,
            RemotingError::ArgumentMismatch { .. } => FailureKind::ArgumentMismatch,
            RemotingError::Protocol { .. } | RemotingError::Json { .. } => FailureKind::Protocol,
            RemotingError::Application { .. } => FailureKind::Application,
            RemotingError::Timeout(_) => FailureKind::Timeout,
            _ => FailureKind::Internal,
        }
    }

    /// Build the structured failure sent back to a caller.
    pub fn to_failure(&self) -> Failure {
        let data = match self {
            RemotingError::Application { data, .. } => data.clone(),
            RemotingError::Timeout(limit) => {
                let millis = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                Some(serde_json::json!({ "timeout_ms": millis }))
            }
            _ => None,
        };
        Failure {
            kind: self.failure_kind(),
            code: self.to_rpc_error_code(),
            message: self.wire_message(),
            data,
        }
    }

    /// Message carried on the wire.
    ///
    /// Variants that [`from_failure`](Self::from_failure) rebuilds from the
    /// message alone send it without the display prefix.
    fn wire_message(&self) -> String {
        match self {
            RemotingError::ArgumentMismatch { message, .. }
            | RemotingError::Protocol { message }
            | RemotingError::Application { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Rebuild a caller-side error from a failure received over the wire.
    ///
    /// Context the failure does not carry (service and method names) is
    /// filled from the call that produced it.
    pub fn from_failure(failure: Failure, service: &str, method: &str) -> Self {
        match failure.kind {
            FailureKind::UnknownService => RemotingError::UnknownService {
                name: service.to_string(),
            },
            FailureKind::UnknownMethod => RemotingError::UnknownMethod {
                service: service.to_string(),
                method: method.to_string(),
            },
            FailureKind::ArgumentMismatch => RemotingError::ArgumentMismatch {
                method: method.to_string(),
                message: failure.message,
            },
            FailureKind::Protocol => RemotingError::Protocol {
                message: failure.message,
            },
            FailureKind::Application => RemotingError::Application {
                message: failure.message,
                data: failure.data,
            },
            FailureKind::Timeout => {
                let millis = failure
                    .data
                    .as_ref()
                    .and_then(|d| d.get("timeout_ms"))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                RemotingError::Timeout(std::time::Duration::from_millis(millis))
            }
            FailureKind::Internal => RemotingError::Other(failure.message),
        }
    }

    /// Whether this error happens at startup and must stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RemotingError::Bind { .. }
                | RemotingError::DuplicateService { .. }
                | RemotingError::InvalidDescriptor { .. }
                | RemotingError::InvalidConfig { .. }
        )
    }
}
