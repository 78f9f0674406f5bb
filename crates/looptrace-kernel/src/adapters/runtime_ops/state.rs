//! Per-run recorder shared by the trace ops and the sandbox loop.
//!
//! Lives in the isolate's `OpState` as `Rc<RefCell<TraceRecorder>>`; it
//! never leaves the sandbox thread. The sandbox hands the finished event
//! buffer to the host by value.

use std::collections::{HashMap, VecDeque};

use deno_core::v8;
use looptrace_core::{ErrorCode, TaskClass, TraceEvent};
use tracing::{debug, trace, warn};

use crate::config::SandboxLimits;
use crate::domain::{CompletionDetector, Settle};

/// Ordered event buffer plus the bookkeeping needed to produce it.
pub struct TraceRecorder {
    events: Vec<TraceEvent>,
    limits: SandboxLimits,
    detector: CompletionDetector,
    /// Class of every label handed out, for start/end lookups.
    labels: HashMap<String, TaskClass>,
    micro_seq: u64,
    macro_seq: u64,
    /// Labels currently executing; the innermost is last.
    active: Vec<String>,
    /// Timer labels waiting to be dispatched, in registration order.
    macrotasks: VecDeque<String>,
    dispatched: usize,
    fatal: Option<(ErrorCode, String)>,
    isolate: Option<v8::IsolateHandle>,
}

impl std::fmt::Debug for TraceRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceRecorder")
            .field("events", &self.events.len())
            .field("detector", &self.detector)
            .field("active", &self.active)
            .field("macrotasks", &self.macrotasks)
            .field("fatal", &self.fatal)
            .finish_non_exhaustive()
    }
}

impl TraceRecorder {
    pub fn new(limits: SandboxLimits) -> Self {
        Self {
            events: Vec::new(),
            limits,
            detector: CompletionDetector::new(),
            labels: HashMap::new(),
            micro_seq: 0,
            macro_seq: 0,
            active: Vec::new(),
            macrotasks: VecDeque::new(),
            dispatched: 0,
            fatal: None,
            isolate: None,
        }
    }

    /// Give the recorder a way to stop the isolate when a limit trips.
    pub fn attach_isolate(&mut self, handle: v8::IsolateHandle) {
        self.isolate = Some(handle);
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Lifecycle
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn start(&mut self) {
        self.record(TraceEvent::Start);
    }

    pub fn sync_complete(&mut self) {
        self.record(TraceEvent::SyncComplete);
        self.detector.on_sync_complete();
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Deferred work
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Assign the next label of `class` and record its registration.
    pub fn register(&mut self, class: TaskClass, source: &str) -> String {
        let seq = match class {
            TaskClass::Microtask => {
                self.micro_seq += 1;
                self.micro_seq
            }
            TaskClass::Macrotask => {
                self.macro_seq += 1;
                self.macro_seq
            }
        };
        let label = format!("{source} #{seq}");

        self.labels.insert(label.clone(), class);
        if class == TaskClass::Macrotask {
            self.macrotasks.push_back(label.clone());
        }
        self.detector.on_queued(class);
        self.record(TraceEvent::DeferredQueued { class, label: label.clone() });
        label
    }

    pub fn begin(&mut self, label: &str) {
        let Some(class) = self.class_of(label) else { return };
        self.active.push(label.to_string());
        self.record(TraceEvent::DeferredStart { class, label: label.to_string() });
    }

    pub fn end(&mut self, label: &str) {
        let Some(class) = self.class_of(label) else { return };
        if let Some(pos) = self.active.iter().rposition(|active| active == label) {
            self.active.remove(pos);
        }
        self.detector.on_settled(class);
        self.record(TraceEvent::DeferredEnd { class, label: label.to_string() });
    }

    /// Withdraw a timer that has not run yet.
    pub fn cancel(&mut self, label: &str) -> bool {
        let Some(pos) = self.macrotasks.iter().position(|queued| queued == label) else {
            return false;
        };
        self.macrotasks.remove(pos);
        self.detector.on_settled(TaskClass::Macrotask);
        self.record(TraceEvent::DeferredCancelled {
            class: TaskClass::Macrotask,
            label: label.to_string(),
        });
        true
    }

    /// Pop the oldest timer label, enforcing the macrotask ceiling.
    pub fn next_macrotask(&mut self) -> Option<String> {
        let label = self.macrotasks.pop_front()?;
        self.dispatched += 1;
        if self.dispatched > self.limits.max_macrotasks {
            self.trip(format!(
                "Execution limit exceeded: more than {} macrotasks",
                self.limits.max_macrotasks
            ));
            return None;
        }
        Some(label)
    }

    pub fn observe_idle(&mut self) -> Settle {
        self.detector.observe_idle()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Output & failures
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn log(&mut self, message: &str) {
        let active_label = self.active.last().cloned();
        self.record(TraceEvent::Log { message: message.to_string(), active_label });
    }

    /// A handler threw; siblings keep running.
    pub fn fail(&mut self, message: &str) {
        debug!("💥 [Sandbox] Handler failed: {}", message);
        self.record(TraceEvent::Error { message: message.to_string() });
    }

    /// Failure that must stop the run, if one occurred.
    pub fn fatal(&self) -> Option<&(ErrorCode, String)> {
        self.fatal.as_ref()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn take_events(&mut self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.events)
    }

    fn class_of(&mut self, label: &str) -> Option<TaskClass> {
        let class = self.labels.get(label).copied();
        if class.is_none() {
            self.fail(&format!("{}: unknown label {label:?}", ErrorCode::Protocol.message()));
        }
        class
    }

    fn record(&mut self, event: TraceEvent) {
        if self.fatal.is_some() {
            return;
        }
        if self.events.len() >= self.limits.max_events {
            self.trip(format!(
                "Execution limit exceeded: more than {} events",
                self.limits.max_events
            ));
            return;
        }
        trace!("📝 [Sandbox] {}", event);
        self.events.push(event);
    }

    fn trip(&mut self, reason: String) {
        warn!("🛑 [Sandbox] {}", reason);
        self.fatal = Some((ErrorCode::LimitExceeded, reason));
        if let Some(isolate) = &self.isolate {
            isolate.terminate_execution();
        }
    }
}
