//! [Hexagonal Adapter] Sandbox Executor
//!
//! One run, one OS thread, one V8 isolate. The host sends a [`RunRequest`]
//! and gets exactly one [`SandboxReply`] back over a oneshot channel; no
//! other state crosses the thread boundary.
//!
//! Microtasks are drained by the deno_core event loop. Timers never reach
//! V8's own scheduler: the prelude registers them with the recorder, which
//! keeps them in a FIFO, and this loop dispatches them one at a time.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context as AnyhowContext, Result};
use deno_core::{v8, JsRuntime, PollEventLoopOptions, RuntimeOptions};
use looptrace_core::{ErrorCode, FailureKind};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::adapters::runtime_ops::{self, TraceRecorder, PRELUDE};
use crate::config::SandboxLimits;
use crate::domain::Settle;
use crate::infrastructure::{encode_reply, RunRequest, SandboxReply};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cancellation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cross-thread handle that stops a run, even one stuck in a hot loop.
#[derive(Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    isolate: Mutex<Option<v8::IsolateHandle>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the isolate once it exists. A cancel that arrived earlier
    /// terminates it immediately.
    fn arm(&self, isolate: v8::IsolateHandle) {
        let mut slot = self.inner.isolate.lock();
        if self.is_cancelled() {
            isolate.terminate_execution();
        }
        *slot = Some(isolate);
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        if let Some(isolate) = self.inner.isolate.lock().as_ref() {
            isolate.terminate_execution();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// [RAII Guard] Owns a run's lifetime on the host side.
///
/// Dropping the guard terminates the isolate if it is still running, so
/// no sandbox outlives the caller that started it.
#[derive(Debug)]
pub struct SandboxGuard {
    run_id: u64,
    cancel: CancelHandle,
}

impl SandboxGuard {
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

impl Drop for SandboxGuard {
    fn drop(&mut self) {
        debug!("🧹 [Sandbox] Releasing run {}", self.run_id);
        self.cancel.cancel();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Spawn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Start a run on its own thread.
///
/// The receiver resolves with the terminal reply as wire JSON (see
/// [`decode_reply`](crate::infrastructure::decode_reply)). If the thread
/// dies without replying, the receiver reports a closed channel.
pub fn spawn(
    run_id: u64,
    request: RunRequest,
    limits: SandboxLimits,
) -> Result<(SandboxGuard, oneshot::Receiver<String>)> {
    let (tx, rx) = oneshot::channel();
    let cancel = CancelHandle::new();
    let thread_cancel = cancel.clone();

    std::thread::Builder::new()
        .name(format!("looptrace-sandbox-{run_id}"))
        .spawn(move || {
            let reply = run_isolated(run_id, request, limits, thread_cancel);
            debug!("📨 [Sandbox] Run {} replying (done: {})", run_id, reply.is_done());
            // Dropping the sender without a reply surfaces as a lost sandbox.
            let raw = match encode_reply(&reply) {
                Ok(raw) => raw,
                Err(e) => {
                    error!("💥 [Sandbox] Run {}: {:#}", run_id, e);
                    return;
                }
            };
            if tx.send(raw).is_err() {
                debug!("📭 [Sandbox] Run {} finished after the host stopped waiting", run_id);
            }
        })
        .context("Failed to spawn sandbox thread")?;

    Ok((SandboxGuard { run_id, cancel }, rx))
}

fn run_isolated(
    run_id: u64,
    request: RunRequest,
    limits: SandboxLimits,
    cancel: CancelHandle,
) -> SandboxReply {
    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("💥 [Sandbox] Run {}: no runtime: {}", run_id, e);
            return SandboxReply::error(format!(
                "{}: {e}",
                ErrorCode::SandboxUnavailable.message()
            ));
        }
    };

    let local = tokio::task::LocalSet::new();
    local.block_on(&rt, execute(run_id, request, limits, cancel))
}

/// [Internal] V8 runtime with the trace ops and a fresh recorder.
fn create_runtime(recorder: Rc<RefCell<TraceRecorder>>) -> JsRuntime {
    let mut ext = runtime_ops::looptrace_sandbox::init_ops();
    ext.op_state_fn = Some(Box::new(move |state| {
        state.put(recorder);
    }));

    JsRuntime::new(RuntimeOptions {
        extensions: vec![ext],
        ..Default::default()
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn execute(
    run_id: u64,
    request: RunRequest,
    limits: SandboxLimits,
    cancel: CancelHandle,
) -> SandboxReply {
    let recorder = Rc::new(RefCell::new(TraceRecorder::new(limits)));
    let mut runtime = create_runtime(recorder.clone());

    let isolate = runtime.v8_isolate().thread_safe_handle();
    recorder.borrow_mut().attach_isolate(isolate.clone());
    cancel.arm(isolate);

    info!("🚀 [Sandbox] Run {} started ({} bytes)", run_id, request.code.len());

    // 1. Instrumented surface
    if let Err(e) = runtime.execute_script("[looptrace:prelude]", PRELUDE.to_string()) {
        error!("💥 [Sandbox] Run {}: prelude failed: {}", run_id, e);
        return SandboxReply::error(format!("{}: {e}", ErrorCode::SandboxUnavailable.message()));
    }

    // 2. Synchronous phase
    recorder.borrow_mut().start();
    if let Err(e) = runtime.execute_script("[looptrace:script]", request.code) {
        return abort(run_id, &recorder, &cancel, format!("{e:#}"));
    }
    recorder.borrow_mut().sync_complete();

    // 3. Deferred phase: drain microtasks, then one macrotask, repeat
    loop {
        if let Err(e) = pump(&mut runtime).await {
            return abort(run_id, &recorder, &cancel, format!("{e:#}"));
        }
        if let Some(reply) = interrupted(run_id, &recorder, &cancel) {
            return reply;
        }

        let next = recorder.borrow_mut().next_macrotask();
        if let Some(label) = next {
            if let Err(e) = dispatch(&mut runtime, &label) {
                return abort(run_id, &recorder, &cancel, format!("{e:#}"));
            }
            continue;
        }
        if let Some(reply) = interrupted(run_id, &recorder, &cancel) {
            return reply;
        }

        let verdict = recorder.borrow_mut().observe_idle();
        match verdict {
            Settle::Confirm => continue,
            Settle::Done | Settle::NotStarted => break,
            Settle::Stalled { micro, macro_ } => {
                warn!(
                    "⏸️  [Sandbox] Run {} stalled with {} microtask(s) and {} macrotask(s) pending",
                    run_id, micro, macro_
                );
                break;
            }
        }
    }

    let events = recorder.borrow_mut().take_events();
    info!("✅ [Sandbox] Run {} done: {} events", run_id, events.len());
    SandboxReply::Done { events }
}

async fn pump(runtime: &mut JsRuntime) -> Result<()> {
    runtime
        .run_event_loop(PollEventLoopOptions {
            wait_for_inspector: false,
            pump_v8_message_loop: true,
        })
        .await
        .context("Event loop failed")
}

/// Run one queued timer through the prelude's dispatch hook.
fn dispatch(runtime: &mut JsRuntime, label: &str) -> Result<()> {
    debug!("⏱️  [Sandbox] Dispatching {}", label);
    let literal = serde_json::to_string(label).context("Failed to encode macrotask label")?;
    runtime.execute_script(
        "[looptrace:dispatch]",
        format!("globalThis.__looptrace_run_macrotask({literal})"),
    )?;
    Ok(())
}

/// Reply early if the run was cancelled or tripped a limit.
fn interrupted(
    run_id: u64,
    recorder: &Rc<RefCell<TraceRecorder>>,
    cancel: &CancelHandle,
) -> Option<SandboxReply> {
    if cancel.is_cancelled() {
        info!("🛑 [Sandbox] Run {} cancelled", run_id);
        return Some(SandboxReply::error(ErrorCode::Superseded.message()));
    }
    let recorder = recorder.borrow();
    let (code, reason) = recorder.fatal()?;
    warn!("🛑 [Sandbox] Run {} aborted: {}", run_id, code);
    Some(SandboxReply::error(reason.clone()))
}

/// Terminal reply for an engine error. Cancellation and limit trips also
/// surface here as "execution terminated", so they are checked first.
fn abort(
    run_id: u64,
    recorder: &Rc<RefCell<TraceRecorder>>,
    cancel: &CancelHandle,
    message: String,
) -> SandboxReply {
    if let Some(reply) = interrupted(run_id, recorder, cancel) {
        return reply;
    }
    let kind = FailureKind::classify(&message);
    error!("💥 [Sandbox] Run {} failed ({}): {}", run_id, kind, message);
    SandboxReply::error(message)
}
