//! # looptrace-kernel
//!
//! Runs a script in an isolated V8 sandbox, records how its work moves
//! through the call stack and the two task queues, and replays that record
//! into step-by-step snapshots.
//!
//! ## Layers
//!
//! - **domain**: completion detection and trace replay (pure)
//! - **adapters**: deno_core extension, sandbox thread, host tracer
//! - **infrastructure**: host ⇄ sandbox message shapes
//! - **kernel**: request-scoped commands

// 1. Trinity layers
pub mod domain;         // Functional Core (Pure)
pub mod adapters;       // Hexagonal Adapters (V8, threads)
pub mod infrastructure;
pub mod kernel;

pub mod config;
pub mod error;

// 2. Top-level re-exports
pub use adapters::Tracer;
pub use config::{SandboxLimits, TracerConfig};
pub use domain::{reduce, try_reduce, ReduceError};
pub use error::TraceError;
pub use looptrace_core::{ExecutionState, Step, StepSequence, TaskClass, TraceEvent};

/// Trace `code` with default settings.
///
/// Always yields a sequence; any failure is the single error step.
pub async fn analyze(code: &str) -> StepSequence {
    let tracer = Tracer::default();
    tracer.analyze(code).await.unwrap_or_else(StepSequence::error)
}
