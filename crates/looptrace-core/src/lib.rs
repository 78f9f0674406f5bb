//! # Looptrace Core
//!
//! Shared vocabulary between the sandbox kernel and its consumers.
//!
//! ## Module Organization
//!
//! - `event`: trace events recorded inside the sandbox
//! - `step`: immutable step snapshots handed to playback layers
//! - `error`: failure taxonomy and stable error codes

pub mod error;
pub mod event;
pub mod step;

// Re-export commonly used types
pub use error::{ErrorCode, FailureKind};
pub use event::{TaskClass, TraceEvent};
pub use step::{ExecutionState, Step, StepSequence, ERROR_OUTPUT};
