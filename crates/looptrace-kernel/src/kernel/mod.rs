//! Kernel Commands
//!
//! Request-scoped entry points that wrap the [`Tracer`](crate::Tracer) with
//! a request id and lifecycle logging.

pub mod commands;

pub use commands::{CaptureEvents, TraceScript};
