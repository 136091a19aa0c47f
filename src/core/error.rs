//! Unified error handling for the router control plane
//!
//! Store-level failures are described by [`StoreError`]; the router layer
//! wraps them in [`RouterError`] together with the operation that failed so
//! callers can tell an unreachable store during `add` from one during `get`.

use std::fmt;

use thiserror::Error;

/// Failures reported by a backing store client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Server unreachable, connection dropped or timed out
    #[error("store unreachable: {0}")]
    Unreachable(String),

    /// Credential rejected by the server
    #[error("store authentication failed: {0}")]
    Authentication(String),

    /// The server answered with an error reply
    #[error("store command failed: {0}")]
    Command(String),

    /// The caller's cancellation token fired before the round-trip finished
    #[error("store operation cancelled")]
    Cancelled,
}

/// Operation tag attached to wrapped failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Remove,
    Get,
    Routes,
    SetCName,
    UnsetCName,
    Swap,
    Healthcheck,
    Certificate,
    Ping,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Add => "add",
            Op::Remove => "remove",
            Op::Get => "get",
            Op::Routes => "routes",
            Op::SetCName => "setCName",
            Op::UnsetCName => "unsetCName",
            Op::Swap => "swap",
            Op::Healthcheck => "healthcheck",
            Op::Certificate => "certificate",
            Op::Ping => "ping",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by router operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// Store unreachable, authentication rejected or ping failed
    #[error("router operation \"{op}\" failed: {source}")]
    Connectivity {
        op: Op,
        #[source]
        source: StoreError,
    },

    /// Required configuration missing when the operation needed it
    #[error("router operation \"{op}\" failed: config key '{key}' not found")]
    Configuration { op: Op, key: &'static str },

    #[error("Backend not found")]
    BackendNotFound,

    #[error("CName already exists")]
    CNameExists,

    #[error("Invalid CName: {0}")]
    CNameNotAllowed(String),

    #[error("Certificate not found")]
    CertificateNotFound,

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Router \"{0}\" is not configured")]
    UnknownRouter(String),

    #[error("Unknown router type: \"{0}\"")]
    UnknownRouterType(String),

    #[error("Router type \"{0}\" does not support TLS certificates")]
    TlsNotSupported(String),
}

impl RouterError {
    pub fn connectivity(op: Op) -> impl FnOnce(StoreError) -> RouterError {
        move |source| RouterError::Connectivity { op, source }
    }

    /// Operation tag of a wrapped failure.
    pub fn op(&self) -> Option<Op> {
        match self {
            RouterError::Connectivity { op, .. } | RouterError::Configuration { op, .. } => {
                Some(*op)
            }
            _ => None,
        }
    }
}

/// Result type alias for router operations
pub type RouterResult<T> = std::result::Result<T, RouterError>;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Helper trait for tagging store failures with the failing operation
pub trait ErrorContext<T> {
    fn with_op(self, op: Op) -> RouterResult<T>;
}

impl<T> ErrorContext<T> for StoreResult<T> {
    fn with_op(self, op: Op) -> RouterResult<T> {
        self.map_err(RouterError::connectivity(op))
    }
}
