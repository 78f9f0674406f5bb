use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use looptrace_core::{ErrorCode, FailureKind, ERROR_OUTPUT};
use looptrace_kernel::{TaskClass, TraceError, TraceEvent, Tracer, TracerConfig};

fn tracer() -> Tracer {
    Tracer::new(TracerConfig::default().with_cache_capacity(0))
}

fn logs(events: &[TraceEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|event| match event {
            TraceEvent::Log { message, .. } => Some(message.as_str()),
            _ => None,
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ordering
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn test_sync_only_script() -> Result<()> {
    let steps = tracer().trace("console.log('a'); console.log('b');").await?;

    assert!(!steps.is_error());
    assert_eq!(steps.final_output(), ["a", "b"]);
    assert_eq!(steps[0].highlight, "Ready to execute");
    assert_eq!(steps.last().map(|s| s.highlight.as_str()), Some("DONE ✓"));
    Ok(())
}

#[tokio::test]
async fn test_microtasks_before_macrotasks() -> Result<()> {
    let code = r#"
        setTimeout(() => console.log('timeout'), 0);
        Promise.resolve().then(() => console.log('micro'));
        queueMicrotask(() => console.log('queued'));
        console.log('sync');
    "#;
    let steps = tracer().trace(code).await?;

    assert_eq!(steps.final_output(), ["sync", "micro", "queued", "timeout"]);
    Ok(())
}

#[tokio::test]
async fn test_classic_async_ordering() -> Result<()> {
    let code = r#"
        console.log('script start');
        setTimeout(() => { console.log('setTimeout'); }, 0);
        async function async1() {
          console.log('async1 start');
          await async2();
          console.log('async1 end');
        }
        async function async2() { console.log('async2'); }
        async1();
        new Promise((resolve) => {
          console.log('promise1');
          resolve();
        }).then(() => { console.log('promise2'); });
        console.log('script end');
    "#;
    let steps = tracer().trace(code).await?;

    assert_eq!(
        steps.final_output(),
        [
            "script start",
            "async1 start",
            "async2",
            "promise1",
            "script end",
            "async1 end",
            "promise2",
            "setTimeout",
        ]
    );

    let resumed = steps
        .iter()
        .find(|s| s.description == "Execute: console.log('async1 end')")
        .expect("async1 end step");
    assert!(resumed.call_stack[0].starts_with("await #"));
    assert_eq!(resumed.explanation, "This runs after await completes, as part of a microtask");
    Ok(())
}

#[tokio::test]
async fn test_timer_delay_is_ignored() -> Result<()> {
    let code = r#"
        setTimeout(() => console.log('slow'), 100);
        setTimeout(() => console.log('fast'), 0);
    "#;
    let steps = tracer().trace(code).await?;

    assert_eq!(steps.final_output(), ["slow", "fast"]);
    Ok(())
}

#[tokio::test]
async fn test_microtasks_drain_between_macrotasks() -> Result<()> {
    let code = r#"
        setTimeout(() => {
          console.log('t1');
          Promise.resolve().then(() => console.log('m'));
        });
        setTimeout(() => console.log('t2'));
    "#;
    let steps = tracer().trace(code).await?;

    assert_eq!(steps.final_output(), ["t1", "m", "t2"]);
    Ok(())
}

#[tokio::test]
async fn test_await_resumption_is_a_labelled_microtask() -> Result<()> {
    let code = r#"
        async function inner() { console.log('inner'); }
        async function outer() {
          await inner();
          console.log('resumed');
        }
        outer();
        console.log('sync');
    "#;
    let tracer = tracer();
    let events = tracer.capture(code).await?;

    let resumed = events
        .iter()
        .find_map(|event| match event {
            TraceEvent::Log { message, active_label } if message == "resumed" => {
                active_label.clone()
            }
            _ => None,
        })
        .expect("resumed log");
    assert!(resumed.starts_with("await #"), "got {resumed}");
    assert!(events.contains(&TraceEvent::DeferredQueued {
        class: TaskClass::Microtask,
        label: resumed.clone(),
    }));

    let steps = tracer.trace(code).await?;
    let step = steps.iter().find(|s| s.output.last().map(String::as_str) == Some("resumed"));
    let step = step.expect("resumed step");
    assert_eq!(step.explanation, "This runs after await completes, as part of a microtask");
    assert_eq!(step.call_stack[0], resumed);
    Ok(())
}

#[tokio::test]
async fn test_timer_resolved_reaction_waits_in_microtask_queue() -> Result<()> {
    let code = r#"
        new Promise((resolve) => setTimeout(resolve)).then(() => console.log('after timer'));
    "#;
    let steps = tracer().trace(code).await?;

    let timer = steps
        .iter()
        .find(|s| s.description == "Process Macrotask: setTimeout #1")
        .expect("timer step");
    assert_eq!(timer.microtask_queue, ["Promise.then #1"]);
    assert!(timer.output.is_empty());
    assert_eq!(steps.final_output(), ["after timer"]);
    Ok(())
}

#[tokio::test]
async fn test_unhandled_rejection_is_not_fatal() -> Result<()> {
    let code = r#"
        Promise.reject(new Error('x'));
        console.log('ok');
        setTimeout(() => console.log('later'));
    "#;
    let tracer = tracer();
    let events = tracer.capture(code).await?;
    assert!(!events.iter().any(TraceEvent::is_error));

    let steps = tracer.trace(code).await?;
    assert!(!steps.is_error());
    assert_eq!(steps.final_output(), ["ok", "later"]);
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Step invariants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const MIXED: &str = r#"
    console.log('s1');
    setTimeout(() => {
      console.log('t1');
      Promise.resolve().then(() => console.log('t1-micro'));
      setTimeout(() => console.log('t3'));
    });
    Promise.resolve()
      .then(() => console.log('m1'))
      .then(() => console.log('m2'));
    queueMicrotask(() => console.log('q1'));
    setTimeout(() => console.log('t2'));
    (async () => {
      await null;
      console.log('a1');
    })();
    console.log('s2');
"#;

fn labels_of(events: &[TraceEvent], class: TaskClass, queued: bool) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            TraceEvent::DeferredQueued { class: c, label } if queued && *c == class => {
                Some(label.clone())
            }
            TraceEvent::DeferredStart { class: c, label } if !queued && *c == class => {
                Some(label.clone())
            }
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_mixed_script_step_invariants() -> Result<()> {
    let tracer = tracer();
    let steps = tracer.trace(MIXED).await?;
    assert!(!steps.is_error());

    for (i, step) in steps.iter().enumerate() {
        assert_eq!(step.ordinal, i);
    }
    for pair in steps.as_slice().windows(2) {
        assert!(pair[1].output.starts_with(&pair[0].output), "output shrank at {}", pair[1].ordinal);
    }
    for step in steps.iter().filter(|s| s.description.starts_with("Process Macrotask: ")) {
        assert!(step.microtask_queue.is_empty(), "microtasks pending at {}", step.description);
    }
    assert_eq!(
        steps.final_output(),
        ["s1", "s2", "m1", "q1", "a1", "m2", "t1", "t1-micro", "t2", "t3"]
    );

    let events = tracer.capture(MIXED).await?;
    let macro_queued = labels_of(&events, TaskClass::Macrotask, true);
    assert_eq!(labels_of(&events, TaskClass::Macrotask, false), macro_queued);

    // Chained reactions are queued at the call site but run once their
    // parent settles, so microtasks only promise queued-before-started.
    let micro_started = labels_of(&events, TaskClass::Microtask, false);
    let mut micro_queued = labels_of(&events, TaskClass::Microtask, true);
    micro_queued.sort();
    let mut sorted = micro_started.clone();
    sorted.sort();
    assert_eq!(sorted, micro_queued);
    for label in &micro_started {
        let queued_at = events.iter().position(|e| {
            matches!(e, TraceEvent::DeferredQueued { label: l, .. } if l == label)
        });
        let started_at = events.iter().position(|e| {
            matches!(e, TraceEvent::DeferredStart { label: l, .. } if l == label)
        });
        assert!(queued_at < started_at, "{label} started before it was queued");
    }
    Ok(())
}

#[tokio::test]
async fn test_synchronous_script_step_count() -> Result<()> {
    let steps = tracer()
        .trace("console.log('a'); console.log('b'); console.log('c');")
        .await?;

    // ready, three logs, complete
    assert_eq!(steps.len(), 5);
    assert_eq!(
        steps.iter().map(|s| s.ordinal).collect::<Vec<_>>(),
        (0..5).collect::<Vec<_>>()
    );
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event buffer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn test_registration_recorded_at_call_site() -> Result<()> {
    let code = r#"
        setTimeout(() => {}, 0);
        console.log('after');
    "#;
    let events = tracer().capture(code).await?;

    assert_eq!(events[0], TraceEvent::Start);
    assert_eq!(
        events[1],
        TraceEvent::DeferredQueued { class: TaskClass::Macrotask, label: "setTimeout #1".into() }
    );
    assert_eq!(events[2], TraceEvent::Log { message: "after".into(), active_label: None });
    assert_eq!(events[3], TraceEvent::SyncComplete);
    Ok(())
}

#[tokio::test]
async fn test_labels_are_unique() -> Result<()> {
    let code = r#"
        for (let i = 0; i < 3; i++) {
          setTimeout(() => {});
          Promise.resolve().then(() => {});
        }
    "#;
    let events = tracer().capture(code).await?;

    let labels: Vec<&str> = events
        .iter()
        .filter_map(|event| match event {
            TraceEvent::DeferredQueued { label, .. } => Some(label.as_str()),
            _ => None,
        })
        .collect();
    let unique: HashSet<&str> = labels.iter().copied().collect();
    assert_eq!(labels.len(), 6);
    assert_eq!(unique.len(), 6);
    assert!(unique.contains("setTimeout #3"));
    assert!(unique.contains("Promise.then #3"));
    Ok(())
}

#[tokio::test]
async fn test_log_inside_handler_names_it() -> Result<()> {
    let events = tracer().capture("setTimeout(() => console.log('inside'));").await?;

    assert!(events.contains(&TraceEvent::Log {
        message: "inside".into(),
        active_label: Some("setTimeout #1".into()),
    }));
    Ok(())
}

#[tokio::test]
async fn test_console_formats_values() -> Result<()> {
    let events = tracer()
        .capture("console.log('n', 1, { a: [1, 2] }, null, undefined, typeof Deno);")
        .await?;

    assert_eq!(logs(&events), ["n 1 {\"a\":[1,2]} null undefined undefined"]);
    Ok(())
}

#[tokio::test]
async fn test_clear_timeout_cancels() -> Result<()> {
    let code = r#"
        const id = setTimeout(() => console.log('never'));
        clearTimeout(id);
        console.log('kept');
    "#;
    let tracer = tracer();
    let events = tracer.capture(code).await?;
    assert!(events.contains(&TraceEvent::DeferredCancelled {
        class: TaskClass::Macrotask,
        label: "setTimeout #1".into(),
    }));

    let steps = tracer.trace(code).await?;
    assert_eq!(steps.final_output(), ["kept"]);
    Ok(())
}

#[tokio::test]
async fn test_never_settling_promise_still_finishes() -> Result<()> {
    let code = r#"
        new Promise(() => {}).then(() => console.log('never'));
        console.log('done');
    "#;
    let steps = tracer().trace(code).await?;

    assert_eq!(steps.final_output(), ["done"]);
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Failures
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn test_syntax_error_is_single_error_step() {
    let tracer = tracer();
    let err = tracer.trace("console.log(").await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Syntax);

    let steps = tracer.analyze("console.log(").await.unwrap();
    assert_eq!(steps.len(), 1);
    assert!(steps.is_error());
    assert_eq!(steps[0].output, [ERROR_OUTPUT]);
}

#[tokio::test]
async fn test_top_level_throw_is_single_error_step() {
    let tracer = tracer();
    let err = tracer.capture("console.log('x'); missingFunction();").await.unwrap_err();
    assert!(matches!(err, TraceError::Sandbox { kind: FailureKind::Runtime, .. }));

    let steps = tracer.analyze("missingFunction();").await.unwrap();
    assert!(steps.is_error());
}

#[tokio::test]
async fn test_handler_error_does_not_starve_siblings() -> Result<()> {
    let code = r#"
        setTimeout(() => { throw new Error('boom'); });
        setTimeout(() => console.log('after'));
    "#;
    let tracer = tracer();
    let events = tracer.capture(code).await?;

    assert!(events
        .iter()
        .any(|e| matches!(e, TraceEvent::Error { message } if message.contains("boom"))));
    assert_eq!(logs(&events), ["after"]);

    let steps = tracer.analyze(code).await.unwrap();
    assert!(steps.is_error());
    Ok(())
}

#[tokio::test]
async fn test_record_collapses_failure_to_error_event() {
    let events = tracer().record("console.log(").await;
    assert_eq!(events.len(), 1);
    assert!(events[0].is_error());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Limits & lifetime
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn test_runaway_script_times_out() {
    let tracer = Tracer::new(
        TracerConfig::default()
            .with_run_timeout(Duration::from_millis(200))
            .with_cache_capacity(0),
    );
    let err = tracer.trace("while (true) {}").await.unwrap_err();

    assert!(matches!(err, TraceError::Timeout(_)));
    assert_eq!(err.code(), ErrorCode::Timeout);
}

#[tokio::test]
async fn test_microtask_flood_hits_event_limit() {
    let tracer = Tracer::new(TracerConfig::default().with_max_events(50).with_cache_capacity(0));
    let err = tracer
        .capture("function spin() { queueMicrotask(spin); } spin();")
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::LimitExceeded);
}

#[tokio::test]
async fn test_timer_chain_hits_macrotask_limit() {
    let tracer =
        Tracer::new(TracerConfig::default().with_max_macrotasks(5).with_cache_capacity(0));
    let err = tracer
        .capture("function tick() { setTimeout(tick); } tick();")
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::LimitExceeded);
}

#[tokio::test]
async fn test_newer_request_supersedes_older() {
    let tracer = Arc::new(Tracer::new(
        TracerConfig::default()
            .with_run_timeout(Duration::from_secs(10))
            .with_cache_capacity(0),
    ));

    let slow = {
        let tracer = tracer.clone();
        tokio::spawn(async move { tracer.analyze("while (true) {}").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let fresh = tracer.analyze("console.log('fresh')").await.unwrap();
    assert_eq!(fresh.final_output(), ["fresh"]);
    assert!(slow.await.unwrap().is_none());
}

#[tokio::test]
async fn test_cache_hit_supersedes_running_request() -> Result<()> {
    let tracer = Arc::new(Tracer::new(
        TracerConfig::default()
            .with_run_timeout(Duration::from_secs(10))
            .with_cache_capacity(4),
    ));
    tracer.trace("console.log('B')").await?;

    let slow = {
        let tracer = tracer.clone();
        tokio::spawn(async move { tracer.analyze("while (true) {}").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let cached = tracer.analyze("console.log('B')").await.unwrap();
    assert_eq!(cached.final_output(), ["B"]);
    assert!(slow.await.unwrap().is_none());
    Ok(())
}

#[tokio::test]
async fn test_cancel_active_stops_run() {
    let tracer = Arc::new(Tracer::new(
        TracerConfig::default()
            .with_run_timeout(Duration::from_secs(10))
            .with_cache_capacity(0),
    ));

    let slow = {
        let tracer = tracer.clone();
        tokio::spawn(async move { tracer.trace("while (true) {}").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(tracer.cancel_active());
    assert!(matches!(slow.await.unwrap(), Err(TraceError::Superseded)));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Determinism & cache
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn test_same_code_same_steps() -> Result<()> {
    let code = r#"
        setTimeout(() => console.log('t'));
        Promise.resolve().then(() => console.log('p'));
        console.log('s');
    "#;
    let tracer = tracer();
    let first = serde_json::to_vec(&tracer.trace(code).await?)?;
    let second = serde_json::to_vec(&tracer.trace(code).await?)?;

    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn test_cache_serves_repeat_traces() -> Result<()> {
    let tracer = Tracer::new(TracerConfig::default().with_cache_capacity(4));
    let first = tracer.trace("console.log('cached')").await?;
    let second = tracer.trace("console.log('cached')").await?;

    assert_eq!(first, second);
    assert_eq!(tracer.cached_traces(), 1);
    Ok(())
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let tracer = Tracer::new(TracerConfig::default().with_cache_capacity(4));
    assert!(tracer.trace("console.log(").await.is_err());
    assert_eq!(tracer.cached_traces(), 0);
}
