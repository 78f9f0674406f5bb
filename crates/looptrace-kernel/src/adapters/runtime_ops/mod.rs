//! Bridge between the instrumented JS surface and the Rust recorder.

pub mod bridge;
pub mod state;

pub use state::TraceRecorder;

/// Script installed before user code; it rewires `console`, timers and
/// microtask entry points onto the ops below.
pub const PRELUDE: &str = include_str!("prelude.js");

deno_core::extension!(
    looptrace_sandbox,
    ops = [
        bridge::op_trace_register,
        bridge::op_trace_start,
        bridge::op_trace_end,
        bridge::op_trace_cancel,
        bridge::op_trace_error,
        bridge::op_trace_log,
    ],
);
