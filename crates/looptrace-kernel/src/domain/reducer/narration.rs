//! Step annotations.
//!
//! Every headline, teaching note and highlight the reducer attaches to a
//! step is produced here, so the replay logic stays free of prose.

use looptrace_core::TaskClass;

/// Description, explanation and highlight of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Narration {
    pub description: String,
    pub explanation: String,
    pub highlight: String,
}

impl Narration {
    fn new(
        description: impl Into<String>,
        explanation: impl Into<String>,
        highlight: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            explanation: explanation.into(),
            highlight: highlight.into(),
        }
    }
}

/// Call-stack frame shown while an output call runs.
pub fn log_fragment(message: &str) -> String {
    let quoted = message.replace('\\', "\\\\").replace('\'', "\\'");
    format!("console.log('{quoted}')")
}

pub fn queued(class: TaskClass, label: &str) -> Narration {
    match class {
        TaskClass::Microtask => Narration::new(
            format!("{label} added to Microtask Queue"),
            "The continuation is registered in the Microtask Queue and runs as soon as the call stack is empty",
            label,
        ),
        TaskClass::Macrotask => Narration::new(
            format!("{label} callback registered in Callback Queue"),
            "The timer callback waits in the Callback Queue (Macrotask Queue) until every microtask has run",
            label,
        ),
    }
}

pub fn event_loop_starts() -> Narration {
    Narration::new(
        "Call Stack EMPTY! Event Loop starts",
        "Call stack is empty. Event loop will process ALL microtasks first, then macrotasks",
        "EVENT LOOP STARTS",
    )
}

pub fn macrotask_phase() -> Narration {
    Narration::new(
        "All Microtasks complete! Moving to Macrotasks",
        "Microtask queue is empty. Event loop now processes one macrotask",
        "MACROTASK PHASE",
    )
}

pub fn started(class: TaskClass, label: &str) -> Narration {
    match class {
        TaskClass::Microtask => Narration::new(
            format!("Process Microtask: {label}"),
            "Microtask executes - promises have priority over macrotasks",
            label,
        ),
        TaskClass::Macrotask => Narration::new(
            format!("Process Macrotask: {label}"),
            "Macrotask executes from the Callback Queue",
            label,
        ),
    }
}

pub fn ended(class: TaskClass, label: &str) -> Narration {
    let next = match class {
        TaskClass::Microtask => "the next microtask, if any, runs before any macrotask",
        TaskClass::Macrotask => "pending microtasks drain before the next macrotask",
    };
    Narration::new(
        format!("{label} finished"),
        format!("The callback returned and the call stack is empty again; {next}"),
        label,
    )
}

pub fn cancelled(class: TaskClass, label: &str) -> Narration {
    Narration::new(
        format!("{label} cancelled"),
        format!("The callback was withdrawn from the {} before it could run", class.queue_name()),
        label,
    )
}

pub fn logged(message: &str, active_label: Option<&str>) -> Narration {
    let explanation = match active_label {
        Some(label) if label.starts_with("await ") => {
            "This runs after await completes, as part of a microtask".to_string()
        }
        Some(label) => format!("This runs inside {label}, after the synchronous code finished"),
        None => "Synchronous console.log executes immediately".to_string(),
    };
    let fragment = log_fragment(message);
    Narration::new(format!("Execute: {fragment}"), explanation, fragment)
}

pub fn complete() -> Narration {
    Narration::new(
        "COMPLETE! All queues empty",
        "Execution complete. All tasks have been processed by the event loop.",
        "DONE ✓",
    )
}
