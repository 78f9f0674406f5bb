//! [Hexagonal Adapter] Host-side tracer
//!
//! Owns the policies that sit around a single sandbox run: the wall-clock
//! budget, latest-request-wins cancellation, and a small LRU of finished
//! traces keyed by source text.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use looptrace_core::{ErrorCode, FailureKind, StepSequence, TraceEvent};
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::adapters::sandbox::{self, CancelHandle};
use crate::config::TracerConfig;
use crate::domain::try_reduce;
use crate::error::TraceError;
use crate::infrastructure::{decode_reply, RunRequest, SandboxReply};

pub struct Tracer {
    config: TracerConfig,
    generation: AtomicU64,
    active: Mutex<Option<(u64, CancelHandle)>>,
    cache: Option<Mutex<LruCache<String, StepSequence>>>,
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new(TracerConfig::default())
    }
}

impl Tracer {
    pub fn new(config: TracerConfig) -> Self {
        let cache = NonZeroUsize::new(config.cache_capacity)
            .map(|capacity| Mutex::new(LruCache::new(capacity)));

        info!(
            "🔭 Tracer initialized (timeout {:?}, cache {})",
            config.run_timeout, config.cache_capacity
        );

        Self {
            config,
            generation: AtomicU64::new(0),
            active: Mutex::new(None),
            cache,
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Commands
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Run `code` in a fresh sandbox and return its ordered events.
    ///
    /// Starting a capture supersedes any request still in flight on this
    /// tracer; the older call returns [`TraceError::Superseded`].
    pub async fn capture(&self, code: &str) -> Result<Vec<TraceEvent>, TraceError> {
        let run_id = self.supersede();
        self.capture_run(run_id, code).await
    }

    async fn capture_run(&self, run_id: u64, code: &str) -> Result<Vec<TraceEvent>, TraceError> {
        let (guard, reply) = sandbox::spawn(run_id, RunRequest::new(code), self.config.limits)
            .map_err(|e| TraceError::Sandbox {
                kind: FailureKind::Environment,
                message: format!("{}: {e:#}", ErrorCode::SandboxUnavailable.message()),
            })?;

        {
            let mut active = self.active.lock();
            if self.generation.load(Ordering::SeqCst) != run_id {
                // A newer request started while this one was spawning.
                return Err(TraceError::Superseded);
            }
            *active = Some((run_id, guard.handle()));
        }

        let outcome = tokio::time::timeout(self.config.run_timeout, reply).await;

        {
            let mut active = self.active.lock();
            if matches!(active.as_ref(), Some((id, _)) if *id == run_id) {
                *active = None;
            }
        }
        drop(guard);

        if self.generation.load(Ordering::SeqCst) != run_id {
            debug!("🗑️  Discarding result of superseded run {}", run_id);
            return Err(TraceError::Superseded);
        }

        let raw = match outcome {
            Err(_) => {
                warn!("⏰ Run {} exceeded {:?}", run_id, self.config.run_timeout);
                return Err(TraceError::Timeout(self.config.run_timeout));
            }
            Ok(Err(_)) => {
                return Err(TraceError::Sandbox {
                    kind: FailureKind::Environment,
                    message: ErrorCode::SandboxLost.message().to_string(),
                })
            }
            Ok(Ok(raw)) => raw,
        };

        let reply = decode_reply(&raw).map_err(|e| TraceError::Sandbox {
            kind: FailureKind::Runtime,
            message: format!("{}: {e:#}", ErrorCode::Protocol.message()),
        })?;
        let kind = reply.failure_kind().unwrap_or(FailureKind::Runtime);
        match reply {
            SandboxReply::Done { events } => Ok(events),
            SandboxReply::Error { message } => Err(TraceError::Sandbox { kind, message }),
        }
    }

    /// Claim the next run id and stop whatever request is in flight.
    ///
    /// Every request goes through here, cache hits included, so an older
    /// request can never deliver after a newer one.
    fn supersede(&self) -> u64 {
        let mut active = self.active.lock();
        let run_id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((previous, handle)) = active.take() {
            info!("⏭️  Run {} supersedes run {}", run_id, previous);
            handle.cancel();
        }
        run_id
    }

    /// Event buffer for `code`; any failure becomes a single `error` event.
    pub async fn record(&self, code: &str) -> Vec<TraceEvent> {
        match self.capture(code).await {
            Ok(events) => events,
            Err(e) => vec![TraceEvent::Error { message: e.to_string() }],
        }
    }

    /// Trace `code` into steps, reporting why it failed if it did.
    pub async fn trace(&self, code: &str) -> Result<StepSequence, TraceError> {
        let run_id = self.supersede();
        if let Some(cached) = self.cached(code) {
            debug!("♻️  Serving cached trace ({} steps)", cached.len());
            return Ok(cached);
        }

        let events = self.capture_run(run_id, code).await?;
        let steps = StepSequence::new(try_reduce(&events)?);

        if let Some(cache) = &self.cache {
            cache.lock().put(code.to_string(), steps.clone());
        }
        Ok(steps)
    }

    /// Consumer entry point.
    ///
    /// `None` means a newer call replaced this one and its result must be
    /// ignored. Every failure is the single-step error sequence.
    pub async fn analyze(&self, code: &str) -> Option<StepSequence> {
        match self.trace(code).await {
            Ok(steps) => Some(steps),
            Err(TraceError::Superseded) => None,
            Err(e) => {
                warn!("⚠️  Trace failed [{}]: {}", e.code(), e);
                Some(StepSequence::error())
            }
        }
    }

    /// Stop whatever run is in flight, if any.
    pub fn cancel_active(&self) -> bool {
        let mut active = self.active.lock();
        match active.take() {
            Some((run_id, handle)) => {
                info!("🛑 Cancelling run {}", run_id);
                // Bump so the cancelled caller reports Superseded.
                self.generation.fetch_add(1, Ordering::SeqCst);
                handle.cancel();
                true
            }
            None => false,
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Queries
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn cached_traces(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.lock().len())
    }

    fn cached(&self, code: &str) -> Option<StepSequence> {
        self.cache.as_ref()?.lock().get(code).cloned()
    }
}
