//! # Failure Taxonomy & Error Codes
//!
//! Every way a trace can fail falls into one of three kinds. The kinds are
//! kept for logging and diagnostics only: at the consumer boundary they all
//! collapse to the canonical error step.
//!
//! Error codes are stable `u32` values grouped by range:
//!
//! | Range | Kind                 |
//! |-------|----------------------|
//! | 1000  | Syntax               |
//! | 2000  | Runtime              |
//! | 3000  | Environment          |
//! | 4000  | Host / protocol      |

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse classification of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The source could not even begin executing.
    Syntax,
    /// An exception during the synchronous phase or inside a handler.
    Runtime,
    /// The isolation mechanism itself is unavailable.
    Environment,
}

impl FailureKind {
    /// Classify a failure message.
    ///
    /// V8 prefixes parse failures with `SyntaxError`. Sandbox setup
    /// failures carry the [`ErrorCode::SandboxUnavailable`] summary.
    /// Everything else is a runtime failure.
    pub fn classify(message: &str) -> Self {
        if message.starts_with(ErrorCode::SandboxUnavailable.message()) {
            FailureKind::Environment
        } else if message.contains("SyntaxError") {
            FailureKind::Syntax
        } else {
            FailureKind::Runtime
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Syntax => f.write_str("syntax failure"),
            FailureKind::Runtime => f.write_str("runtime failure"),
            FailureKind::Environment => f.write_str("environment failure"),
        }
    }
}

/// Stable numeric codes for logs and machine consumers.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // === Syntax (1000) ===
    /// Script failed to parse
    Syntax = 1000,

    // === Runtime (2000) ===
    /// Uncaught exception in the synchronous phase
    UncaughtException = 2000,
    /// Exception inside a deferred handler
    HandlerException = 2001,
    /// Run exceeded its wall-clock budget
    Timeout = 2002,
    /// Run exceeded an event or task limit
    LimitExceeded = 2003,

    // === Environment (3000) ===
    /// Sandbox thread or isolate could not be created
    SandboxUnavailable = 3000,
    /// Sandbox vanished without replying
    SandboxLost = 3001,

    // === Host / protocol (4000) ===
    /// Run was replaced by a newer one
    Superseded = 4000,
    /// Event buffer violated the trace protocol
    Protocol = 4001,
}

impl ErrorCode {
    /// Failure kind this code belongs to.
    pub fn kind(self) -> FailureKind {
        match self as u32 {
            1000..=1999 => FailureKind::Syntax,
            3000..=3999 => FailureKind::Environment,
            _ => FailureKind::Runtime,
        }
    }

    /// Human-readable summary.
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::Syntax => "Script failed to parse",
            ErrorCode::UncaughtException => "Uncaught exception",
            ErrorCode::HandlerException => "Exception in deferred handler",
            ErrorCode::Timeout => "Run timed out",
            ErrorCode::LimitExceeded => "Execution limit exceeded",
            ErrorCode::SandboxUnavailable => "Sandbox unavailable",
            ErrorCode::SandboxLost => "Sandbox exited without replying",
            ErrorCode::Superseded => "Run superseded",
            ErrorCode::Protocol => "Trace protocol violation",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({}): {}", self, *self as u32, self.message())
    }
}
