//! Ops called by the sandbox prelude.
//!
//! Every op borrows the run's [`TraceRecorder`] for the duration of one
//! call and releases it before returning to JS.

use std::cell::RefCell;
use std::rc::Rc;

use deno_core::{op2, OpState};
use looptrace_core::TaskClass;

use super::state::TraceRecorder;

fn recorder(state: &mut OpState) -> Rc<RefCell<TraceRecorder>> {
    state.borrow::<Rc<RefCell<TraceRecorder>>>().clone()
}

/// [Op] Register deferred work and hand back its label.
#[op2]
#[string]
pub fn op_trace_register(
    state: &mut OpState,
    #[string] class: &str,
    #[string] source: &str,
) -> String {
    let recorder = recorder(state);
    let mut recorder = recorder.borrow_mut();
    match TaskClass::parse(class) {
        Some(class) => recorder.register(class, source),
        None => {
            recorder.fail(&format!("Unknown task class {class:?} from {source}"));
            String::new()
        }
    }
}

/// [Op] A callback is about to run.
#[op2(fast)]
pub fn op_trace_start(state: &mut OpState, #[string] label: &str) {
    recorder(state).borrow_mut().begin(label);
}

/// [Op] A callback returned or threw.
#[op2(fast)]
pub fn op_trace_end(state: &mut OpState, #[string] label: &str) {
    recorder(state).borrow_mut().end(label);
}

/// [Op] `clearTimeout` on a timer that has not run.
#[op2(fast)]
pub fn op_trace_cancel(state: &mut OpState, #[string] label: &str) -> bool {
    recorder(state).borrow_mut().cancel(label)
}

/// [Op] A callback threw; the run continues.
#[op2(fast)]
pub fn op_trace_error(state: &mut OpState, #[string] message: &str) {
    recorder(state).borrow_mut().fail(message);
}

/// [Op] `console.*` output, already stringified by the prelude.
#[op2(fast)]
pub fn op_trace_log(state: &mut OpState, #[string] message: &str) {
    tracing::debug!("[JS] {}", message);
    recorder(state).borrow_mut().log(message);
}
