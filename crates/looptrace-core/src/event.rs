//! # Trace Event Vocabulary
//!
//! The closed set of records the sandbox emits while a script runs.
//! Events are produced once per run, in the exact order the engine executed
//! the corresponding work, and consumed once by the step reducer.
//!
//! ## Wire Shape
//!
//! Events cross the host/sandbox boundary as tagged JSON objects:
//!
//! ```json
//! { "type": "deferred-queued", "class": "microtask", "label": "Promise.then #1" }
//! { "type": "log", "message": "hi", "activeLabel": "setTimeout #1" }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task Class
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The two classes of deferred work an event loop distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskClass {
    /// Promise reactions and `queueMicrotask` callbacks.
    Microtask,
    /// Timer callbacks (`setTimeout`).
    Macrotask,
}

impl TaskClass {
    /// Wire name used by the sandbox prelude when registering work.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskClass::Microtask => "microtask",
            TaskClass::Macrotask => "macrotask",
        }
    }

    /// Parse the wire name back into a class.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "microtask" => Some(TaskClass::Microtask),
            "macrotask" => Some(TaskClass::Macrotask),
            _ => None,
        }
    }

    /// Name of the queue this class waits in, as shown to the user.
    pub fn queue_name(self) -> &'static str {
        match self {
            TaskClass::Microtask => "Microtask Queue",
            TaskClass::Macrotask => "Callback Queue",
        }
    }
}

impl fmt::Display for TaskClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trace Event
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single observation recorded by the sandbox.
///
/// Labels are unique within a run: each registration draws the next value
/// of its class counter, so a label identifies exactly one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TraceEvent {
    /// Top-level script body is about to run.
    Start,

    /// Top-level script body returned without throwing.
    SyncComplete,

    /// An output call (`console.log` and friends).
    Log {
        /// Space-joined, stringified arguments.
        message: String,
        /// Label of the deferred callback executing at the time, if any.
        #[serde(
            rename = "activeLabel",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        active_label: Option<String>,
    },

    /// Deferred work was registered.
    DeferredQueued {
        /// Queue the work waits in.
        class: TaskClass,
        /// Run-unique label.
        label: String,
    },

    /// Deferred work left its queue and began executing.
    DeferredStart {
        /// Queue the work waited in.
        class: TaskClass,
        /// Run-unique label.
        label: String,
    },

    /// Deferred work finished executing (normally or by throwing).
    DeferredEnd {
        /// Queue the work waited in.
        class: TaskClass,
        /// Run-unique label.
        label: String,
    },

    /// Deferred work was withdrawn before it ran (`clearTimeout`).
    DeferredCancelled {
        /// Queue the work waited in.
        class: TaskClass,
        /// Run-unique label.
        label: String,
    },

    /// A failure observed while the script ran.
    Error {
        /// Engine-provided description of the failure.
        message: String,
    },
}

impl TraceEvent {
    /// Whether this event reports a failure.
    pub fn is_error(&self) -> bool {
        matches!(self, TraceEvent::Error { .. })
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::Start => f.write_str("start"),
            TraceEvent::SyncComplete => f.write_str("sync-complete"),
            TraceEvent::Log { message, active_label: Some(label) } => {
                write!(f, "log[{label}] {message:?}")
            }
            TraceEvent::Log { message, active_label: None } => write!(f, "log {message:?}"),
            TraceEvent::DeferredQueued { class, label } => write!(f, "queued({class}) {label}"),
            TraceEvent::DeferredStart { class, label } => write!(f, "start({class}) {label}"),
            TraceEvent::DeferredEnd { class, label } => write!(f, "end({class}) {label}"),
            TraceEvent::DeferredCancelled { class, label } => {
                write!(f, "cancelled({class}) {label}")
            }
            TraceEvent::Error { message } => write!(f, "error {message:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tags_are_kebab_case() {
        let event = TraceEvent::DeferredQueued {
            class: TaskClass::Microtask,
            label: "Promise.then #1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "deferred-queued");
        assert_eq!(json["class"], "microtask");
        assert_eq!(json["label"], "Promise.then #1");

        let json = serde_json::to_value(TraceEvent::SyncComplete).unwrap();
        assert_eq!(json["type"], "sync-complete");
    }

    #[test]
    fn test_log_active_label_is_optional() {
        let bare = TraceEvent::Log { message: "a".into(), active_label: None };
        let json = serde_json::to_string(&bare).unwrap();
        assert!(!json.contains("activeLabel"));

        let parsed: TraceEvent =
            serde_json::from_str(r#"{"type":"log","message":"b","activeLabel":"setTimeout #1"}"#)
                .unwrap();
        assert_eq!(
            parsed,
            TraceEvent::Log { message: "b".into(), active_label: Some("setTimeout #1".into()) }
        );
    }

    #[test]
    fn test_error_and_display() {
        let end = TraceEvent::DeferredEnd { class: TaskClass::Macrotask, label: "setTimeout #2".into() };
        assert!(!end.is_error());
        assert_eq!(end.to_string(), "end(macrotask) setTimeout #2");
        assert!(TraceEvent::Error { message: "boom".into() }.is_error());
        assert_eq!(
            TraceEvent::Log { message: "hi".into(), active_label: None }.to_string(),
            "log \"hi\""
        );
    }

    #[test]
    fn test_class_parse() {
        assert_eq!(TaskClass::parse("microtask"), Some(TaskClass::Microtask));
        assert_eq!(TaskClass::parse("macrotask"), Some(TaskClass::Macrotask));
        assert_eq!(TaskClass::parse("idle"), None);
        assert_eq!(TaskClass::Macrotask.queue_name(), "Callback Queue");
    }
}
