//! Domain Logic: Trace-to-Step Reducer
//!
//! Replays a finished, ordered event buffer into immutable step snapshots.
//!
//! # Replay Rules
//!
//! | Event               | State change                                   | Steps |
//! |---------------------|------------------------------------------------|-------|
//! | `start`, `sync-complete` | none                                      | 0     |
//! | `deferred-queued`   | push label onto its queue                      | 1     |
//! | `deferred-start`    | remove label from its queue, stack = `[label]` | 1-3   |
//! | `deferred-end`      | stack = `[]`                                   | 1     |
//! | `deferred-cancelled`| remove label from its queue                    | 1     |
//! | `log`               | stack gets the log frame, output appended      | 1     |
//! | `error`             | whole run collapses to the error step          | -     |
//!
//! The first `deferred-start` of a run is preceded by one synthetic
//! "event loop starts" step. Entering the macrotask phase (a macrotask
//! starting right after microtasks, with the microtask queue empty) is
//! marked by one more synthetic step.
//!
//! The reducer never reorders anything. The engine already guarantees that
//! microtasks drain before macrotasks; replay only preserves observed order.
//!
//! A `Promise.then` label is queued when `.then` is called, not when the
//! promise settles. A reaction on a promise that a timer resolves therefore
//! sits in the microtask queue across every step before that timer runs.

mod narration;

use looptrace_core::{ErrorCode, ExecutionState, Step, StepSequence, TaskClass, TraceEvent};
use tracing::{debug, warn};

use self::narration::Narration;

pub use self::narration::log_fragment;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Why a buffer could not be replayed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReduceError {
    /// The script reported a failure.
    #[error("script failed: {0}")]
    Script(String),

    /// A label started or was cancelled without being queued first.
    #[error("{class} label {label:?} is not queued")]
    UnknownLabel { class: TaskClass, label: String },
}

impl ReduceError {
    /// Stable code for logs.
    pub fn code(&self) -> ErrorCode {
        match self {
            ReduceError::Script(_) => ErrorCode::HandlerException,
            ReduceError::UnknownLabel { .. } => ErrorCode::Protocol,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reducer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Single-pass replay state machine.
#[derive(Debug)]
pub struct StepReducer {
    state: ExecutionState,
    steps: Vec<Step>,
    loop_started: bool,
    last_started: Option<TaskClass>,
}

impl Default for StepReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl StepReducer {
    /// Start from the canonical ready step and an empty state.
    pub fn new() -> Self {
        Self {
            state: ExecutionState::default(),
            steps: vec![Step::ready()],
            loop_started: false,
            last_started: None,
        }
    }

    /// Apply one event.
    pub fn apply(&mut self, event: &TraceEvent) -> Result<(), ReduceError> {
        match event {
            TraceEvent::Start | TraceEvent::SyncComplete => {}

            TraceEvent::DeferredQueued { class, label } => {
                self.queue_mut(*class).push(label.clone());
                self.push(narration::queued(*class, label));
            }

            TraceEvent::DeferredStart { class, label } => {
                if !self.loop_started {
                    self.loop_started = true;
                    self.state.call_stack.clear();
                    self.push(narration::event_loop_starts());
                }

                self.remove_queued(*class, label)?;

                if *class == TaskClass::Macrotask
                    && self.last_started != Some(TaskClass::Macrotask)
                    && self.state.microtask_queue.is_empty()
                {
                    self.push(narration::macrotask_phase());
                }

                self.state.call_stack = vec![label.clone()];
                self.last_started = Some(*class);
                self.push(narration::started(*class, label));
            }

            TraceEvent::DeferredEnd { class, label } => {
                self.state.call_stack.clear();
                self.push(narration::ended(*class, label));
            }

            TraceEvent::DeferredCancelled { class, label } => {
                self.remove_queued(*class, label)?;
                self.push(narration::cancelled(*class, label));
            }

            TraceEvent::Log { message, active_label } => {
                let fragment = log_fragment(message);
                self.state.call_stack = match active_label {
                    Some(label) => vec![label.clone(), fragment],
                    None => vec![fragment],
                };
                self.state.output.push(message.clone());
                self.push(narration::logged(message, active_label.as_deref()));
                self.state.call_stack = active_label.iter().cloned().collect();
            }

            TraceEvent::Error { message } => return Err(ReduceError::Script(message.clone())),
        }
        Ok(())
    }

    /// Append the terminal step and hand the steps out.
    pub fn finish(mut self) -> Vec<Step> {
        if !self.state.is_idle() {
            debug!(
                "⏸️  Run ended with work left ({} microtask(s), {} callback(s))",
                self.state.microtask_queue.len(),
                self.state.callback_queue.len()
            );
        }
        self.state.call_stack.clear();
        self.state.microtask_queue.clear();
        self.state.callback_queue.clear();
        self.push(narration::complete());
        self.steps
    }

    fn push(&mut self, narration: Narration) {
        let Narration { description, explanation, highlight } = narration;
        let ordinal = self.steps.len();
        self.steps
            .push(Step::snapshot(ordinal, &self.state, description, explanation, highlight));
    }

    fn queue_mut(&mut self, class: TaskClass) -> &mut Vec<String> {
        match class {
            TaskClass::Microtask => &mut self.state.microtask_queue,
            TaskClass::Macrotask => &mut self.state.callback_queue,
        }
    }

    fn remove_queued(&mut self, class: TaskClass, label: &str) -> Result<(), ReduceError> {
        let queue = self.queue_mut(class);
        match queue.iter().position(|queued| queued == label) {
            Some(index) => {
                queue.remove(index);
                Ok(())
            }
            None => Err(ReduceError::UnknownLabel { class, label: label.to_string() }),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entry Points
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Replay `events`, reporting why replay stopped if it did.
pub fn try_reduce(events: &[TraceEvent]) -> Result<Vec<Step>, ReduceError> {
    let mut reducer = StepReducer::new();
    for event in events {
        reducer.apply(event)?;
    }
    Ok(reducer.finish())
}

/// Replay `events`; any failure collapses to the canonical error sequence.
pub fn reduce(events: &[TraceEvent]) -> StepSequence {
    match try_reduce(events) {
        Ok(steps) => StepSequence::new(steps),
        Err(e) => {
            warn!("⚠️  Trace collapsed to error step [{}]: {}", e.code(), e);
            StepSequence::error()
        }
    }
}
