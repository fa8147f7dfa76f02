use std::fmt;
use std::io;
use thiserror::Error;

/// Which bounded relationship a capacity check guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityKind {
    Advisee,
    Jury,
}

impl fmt::Display for CapacityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityKind::Advisee => write!(f, "advisee"),
            CapacityKind::Jury => write!(f, "jury"),
        }
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Document serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    ConfigError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error(
        "Capacity exceeded: teacher {teacher_id} has no {kind} capacity left (used {used} + requested {requested} > cap {capacity})"
    )]
    CapacityExceeded {
        kind: CapacityKind,
        teacher_id: u64,
        used: u64,
        requested: u64,
        capacity: u64,
    },
    #[error("Temporal cutoff: {0}")]
    TemporalError(String),
    #[error("Authentication failed: {0}")]
    AuthError(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

impl LedgerError {
    /// Stable machine-readable class name, used in CLI envelopes and audit events.
    pub fn class(&self) -> &'static str {
        match self {
            LedgerError::IoError(_) => "io",
            LedgerError::SerializationError(_) => "serialization",
            LedgerError::ConfigError(_) => "config",
            LedgerError::ValidationError(_) => "validation",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::Conflict(_) => "conflict",
            LedgerError::CapacityExceeded { .. } => "capacity_exceeded",
            LedgerError::TemporalError(_) => "temporal",
            LedgerError::AuthError(_) => "auth",
            LedgerError::PermissionDenied(_) => "permission_denied",
        }
    }
}
