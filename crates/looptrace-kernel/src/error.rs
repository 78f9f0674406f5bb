//! Host-side failures of a trace request.

use std::time::Duration;

use looptrace_core::{ErrorCode, FailureKind};
use thiserror::Error;

use crate::domain::ReduceError;

#[derive(Debug, Error)]
pub enum TraceError {
    /// The sandbox replied with an error, or could not run at all.
    #[error("{kind}: {message}")]
    Sandbox { kind: FailureKind, message: String },

    #[error("Run timed out after {0:?}")]
    Timeout(Duration),

    /// A newer request replaced this one before it finished.
    #[error("Run superseded by a newer request")]
    Superseded,

    #[error(transparent)]
    Reduce(#[from] ReduceError),
}

impl TraceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TraceError::Sandbox { kind: FailureKind::Syntax, .. } => ErrorCode::Syntax,
            TraceError::Sandbox { kind: FailureKind::Environment, .. } => {
                ErrorCode::SandboxUnavailable
            }
            TraceError::Sandbox { message, .. } if message.starts_with("Execution limit") => {
                ErrorCode::LimitExceeded
            }
            TraceError::Sandbox { .. } => ErrorCode::UncaughtException,
            TraceError::Timeout(_) => ErrorCode::Timeout,
            TraceError::Superseded => ErrorCode::Superseded,
            TraceError::Reduce(e) => e.code(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            TraceError::Sandbox { kind, .. } => *kind,
            other => other.code().kind(),
        }
    }
}
