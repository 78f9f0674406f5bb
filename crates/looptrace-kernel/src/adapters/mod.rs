//! Hexagonal Adapters
//!
//! - **runtime_ops**: deno_core extension and the JS prelude it drives
//! - **sandbox**: one isolated thread + isolate per run
//! - **tracer**: host-side entry point (timeouts, supersede, cache)

pub mod runtime_ops;
pub mod sandbox;
pub mod tracer;

pub use sandbox::{CancelHandle, SandboxGuard};
pub use tracer::Tracer;
