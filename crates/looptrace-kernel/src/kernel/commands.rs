use tracing::{error, info};
use uuid::Uuid;

use looptrace_core::{StepSequence, TraceEvent};

use crate::adapters::tracer::Tracer;
use crate::error::TraceError;

/// [CQS: Command] Trace a script into steps.
///
/// Manages one request's lifecycle: id assignment, run, and the
/// start/success/fail log lines that tie them together.
pub struct TraceScript<'a> {
    tracer: &'a Tracer,
}

impl<'a> TraceScript<'a> {
    pub fn new(tracer: &'a Tracer) -> Self {
        Self { tracer }
    }

    /// Entry point for the command.
    ///
    /// # Returns
    /// `Ok(None)` when a newer request superseded this one.
    pub async fn run(&self, script: &str) -> Result<Option<StepSequence>, TraceError> {
        let request_id = Uuid::new_v4();

        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        // 1. [Lifecycle] start
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        info!("🚀 [Command] Trace {} started ({} bytes)", request_id, script.len());

        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        // 2. [Execution] sandbox run + replay
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        match self.tracer.trace(script).await {
            Ok(steps) => {
                info!("✅ [Command] Trace {} produced {} steps", request_id, steps.len());
                Ok(Some(steps))
            }
            Err(TraceError::Superseded) => {
                info!("⏭️  [Command] Trace {} superseded", request_id);
                Ok(None)
            }
            Err(e) => {
                error!("💥 [Command] Trace {} failed [{}]: {}", request_id, e.code(), e);
                Err(e)
            }
        }
    }
}

/// [CQS: Command] Capture the raw event buffer for a script.
pub struct CaptureEvents<'a> {
    tracer: &'a Tracer,
}

impl<'a> CaptureEvents<'a> {
    pub fn new(tracer: &'a Tracer) -> Self {
        Self { tracer }
    }

    pub async fn run(&self, script: &str) -> Vec<TraceEvent> {
        let request_id = Uuid::new_v4();
        info!("🚀 [Command] Capture {} started", request_id);

        let events = self.tracer.record(script).await;
        if events.iter().any(TraceEvent::is_error) {
            error!("💥 [Command] Capture {} recorded a failure", request_id);
        } else {
            info!("✅ [Command] Capture {} recorded {} events", request_id, events.len());
        }
        events
    }
}
