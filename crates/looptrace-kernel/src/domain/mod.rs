//! Domain Layer
//!
//! Pure logic with no engine, thread or I/O dependencies:
//!
//! - **completion**: decides when a run can produce no further events
//! - **reducer**: replays an event buffer into step snapshots

pub mod completion;
pub mod reducer;

pub use completion::{CompletionDetector, Settle};
pub use reducer::{reduce, try_reduce, ReduceError, StepReducer};
