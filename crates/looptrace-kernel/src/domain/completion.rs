//! Domain Model: Completion Detection
//!
//! Decides when a sandboxed run can produce no further events.
//!
//! The executor reports registrations, settlements and idle observations;
//! the detector answers with a [`Settle`] verdict. Idleness is confirmed in
//! two phases: the first idle observation with both counters at zero only
//! schedules one more zero-delay pass, so a handler that queues new work at
//! the last instant is still observed.

use looptrace_core::TaskClass;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Verdicts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Answer to "the executor found nothing runnable, what now?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    /// The synchronous phase has not completed yet.
    NotStarted,
    /// Run one more zero-delay pass before deciding.
    Confirm,
    /// Nothing is pending and the confirming pass saw nothing new.
    Done,
    /// Work is still pending but nothing can ever make it runnable.
    Stalled {
        /// Microtasks still registered.
        micro: usize,
        /// Macrotasks still registered.
        macro_: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Confirming,
    Finished,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Detector
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Pending-work bookkeeping for one run.
#[derive(Debug, Clone)]
pub struct CompletionDetector {
    pending_micro: usize,
    pending_macro: usize,
    sync_complete: bool,
    phase: Phase,
}

impl Default for CompletionDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionDetector {
    /// Fresh detector for a run that has not started.
    pub fn new() -> Self {
        Self {
            pending_micro: 0,
            pending_macro: 0,
            sync_complete: false,
            phase: Phase::Running,
        }
    }

    /// Deferred work of `class` was registered.
    pub fn on_queued(&mut self, class: TaskClass) {
        *self.counter(class) += 1;
        if self.phase == Phase::Confirming {
            self.phase = Phase::Running;
        }
    }

    /// Deferred work of `class` ended or was cancelled.
    ///
    /// Saturates at zero; a stray settlement never underflows.
    pub fn on_settled(&mut self, class: TaskClass) {
        let counter = self.counter(class);
        *counter = counter.saturating_sub(1);
    }

    /// The top-level script body returned.
    pub fn on_sync_complete(&mut self) {
        self.sync_complete = true;
    }

    /// Both counters are zero.
    pub fn is_quiescent(&self) -> bool {
        self.pending_micro == 0 && self.pending_macro == 0
    }

    /// The executor drained microtasks and found no runnable macrotask.
    pub fn observe_idle(&mut self) -> Settle {
        if !self.sync_complete {
            return Settle::NotStarted;
        }

        match self.phase {
            Phase::Running => {
                self.phase = Phase::Confirming;
                Settle::Confirm
            }
            Phase::Confirming | Phase::Finished => {
                self.phase = Phase::Finished;
                if self.is_quiescent() {
                    Settle::Done
                } else {
                    Settle::Stalled {
                        micro: self.pending_micro,
                        macro_: self.pending_macro,
                    }
                }
            }
        }
    }

    fn counter(&mut self, class: TaskClass) -> &mut usize {
        match class {
            TaskClass::Microtask => &mut self.pending_micro,
            TaskClass::Macrotask => &mut self.pending_macro,
        }
    }
}
