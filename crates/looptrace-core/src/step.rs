//! # Step Model
//!
//! A [`Step`] is a frozen snapshot of the simulated engine: call stack, the
//! two pending-work queues and the output accumulated so far, plus the text
//! a playback layer shows next to it.
//!
//! Steps are appended once by the reducer and never touched again. The
//! finished run is handed out as a [`StepSequence`], a cheap-to-clone,
//! read-only, randomly indexable view.

use std::ops::Index;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Output line shown by the canonical error step.
pub const ERROR_OUTPUT: &str = "Error: Please check your code syntax";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execution State
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Mutable engine state, owned by the reducer while it replays a trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionState {
    /// Active frames; at most an active label plus a log fragment.
    pub call_stack: Vec<String>,
    /// Pending microtask labels, oldest first.
    pub microtask_queue: Vec<String>,
    /// Pending macrotask labels, oldest first.
    pub callback_queue: Vec<String>,
    /// Every line printed so far.
    pub output: Vec<String>,
}

impl ExecutionState {
    /// True when nothing is queued or running.
    pub fn is_idle(&self) -> bool {
        self.call_stack.is_empty()
            && self.microtask_queue.is_empty()
            && self.callback_queue.is_empty()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Step
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One immutable point in the replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Position in the sequence, starting at 0.
    #[serde(rename = "step")]
    pub ordinal: usize,
    /// Short headline.
    pub description: String,
    /// Longer teaching note.
    pub explanation: String,
    /// Source fragment or label that triggered this step.
    pub highlight: String,
    /// Call stack at this instant.
    pub call_stack: Vec<String>,
    /// Microtask queue at this instant.
    pub microtask_queue: Vec<String>,
    /// Callback (macrotask) queue at this instant.
    pub callback_queue: Vec<String>,
    /// Output at this instant.
    pub output: Vec<String>,
}

impl Step {
    /// Freeze `state` into a new step. Every vector is copied.
    pub fn snapshot(
        ordinal: usize,
        state: &ExecutionState,
        description: impl Into<String>,
        explanation: impl Into<String>,
        highlight: impl Into<String>,
    ) -> Self {
        Self {
            ordinal,
            description: description.into(),
            explanation: explanation.into(),
            highlight: highlight.into(),
            call_stack: state.call_stack.clone(),
            microtask_queue: state.microtask_queue.clone(),
            callback_queue: state.callback_queue.clone(),
            output: state.output.clone(),
        }
    }

    /// The canonical first step of every successful run.
    pub fn ready() -> Self {
        Self::snapshot(
            0,
            &ExecutionState::default(),
            "Initial state - Code starts executing",
            "The JavaScript engine is ready to execute your code synchronously first",
            "Ready to execute",
        )
    }

    /// The single step every failed run collapses to.
    pub fn error() -> Self {
        let state = ExecutionState {
            output: vec![ERROR_OUTPUT.to_string()],
            ..Default::default()
        };
        Self::snapshot(
            0,
            &state,
            "Error: Unable to parse code",
            "There was an error analyzing your code. Please ensure it's valid JavaScript.",
            "ERROR",
        )
    }

    /// Whether this is the canonical error step.
    pub fn is_error(&self) -> bool {
        *self == Self::error()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Step Sequence
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Read-only, shareable result of one run.
///
/// Cloning shares the underlying steps; nothing can mutate them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSequence {
    steps: Arc<[Step]>,
}

impl StepSequence {
    /// Seal a finished list of steps.
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps: steps.into() }
    }

    /// The one-element sequence reported for any failure.
    pub fn error() -> Self {
        Self::new(vec![Step::error()])
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Never true for sequences produced by the reducer.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Last step, the terminal "complete" or error step.
    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }

    /// Iterate in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Step> {
        self.steps.iter()
    }

    /// Borrow the steps as a slice.
    pub fn as_slice(&self) -> &[Step] {
        &self.steps
    }

    /// True when the run failed and collapsed to the error step.
    pub fn is_error(&self) -> bool {
        self.steps.len() == 1 && self.steps[0].is_error()
    }

    /// Output of the final step.
    pub fn final_output(&self) -> &[String] {
        self.steps.last().map_or(&[], |step| step.output.as_slice())
    }
}

impl Index<usize> for StepSequence {
    type Output = Step;

    fn index(&self, index: usize) -> &Step {
        &self.steps[index]
    }
}

impl<'a> IntoIterator for &'a StepSequence {
    type Item = &'a Step;
    type IntoIter = std::slice::Iter<'a, Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

impl Serialize for StepSequence {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.steps.as_ref().serialize(serializer)
    }
}
