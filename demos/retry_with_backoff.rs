//! # Example: retry_with_backoff
//!
//! A flaky exposure fails twice before succeeding. [`async_retry`] re-runs it with an
//! exponential, jittered backoff while an [`AsyncWorker`] bounds the whole thing with a deadline.
//!
//! ## Flow
//! ```text
//! AsyncWorker::start_async
//!   └─► async_retry(policy: 4 retries, 100ms × 2, equal jitter)
//!         ├─► attempt 1 → SimpleTask "expose#1" → Failed("shutter stuck #1")
//!         ├─► sleep(≈100ms)
//!         ├─► attempt 2 → SimpleTask "expose#2" → Failed("shutter stuck #2")
//!         ├─► sleep(≈200ms)
//!         └─► attempt 3 → SimpleTask "expose#3" → Completed({"frames": 1})
//! wait_for_completion → Completed, callback prints the result
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example retry_with_backoff
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use taskcore::{
    AsyncWorker, BackoffPolicy, JitterPolicy, MessageBus, RetryPolicy, SimpleTask, Task,
    TaskError, TaskStatus, async_retry, subscribers::attach,
};

static SHUTTER_FAILURES: AtomicU32 = AtomicU32::new(0);

/// One exposure attempt as its own single-run task.
async fn expose_once(attempt: u32, bus: &MessageBus) -> Result<Value, TaskError> {
    let task = SimpleTask::builder(format!("expose#{attempt}"))
        .with_params(json!({"seconds": 0.05}))
        .with_bus(bus)
        .build(|params, ctx| async move {
            let secs = params["seconds"].as_f64().unwrap_or(0.0);
            tokio::select! {
                _ = ctx.cancelled() => return Err(TaskError::Canceled),
                _ = tokio::time::sleep(Duration::from_secs_f64(secs)) => {}
            }
            let n = SHUTTER_FAILURES.fetch_add(1, Ordering::Relaxed) + 1;
            if n <= 2 {
                return Err(TaskError::fail(format!("shutter stuck #{n}")));
            }
            Ok(json!({"frames": 1}))
        });

    match task.run().await? {
        TaskStatus::Completed => Ok(task.result().unwrap_or(Value::Null)),
        _ => Err(task
            .error()
            .unwrap_or_else(|| TaskError::fail("exposure did not complete"))),
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 1. Event bus with the built-in log subscriber
    let bus = MessageBus::new(1);
    attach(&bus, Arc::new(taskcore::LogWriter::new()));

    // 2. Retry policy: 4 retries, 100ms doubling, equal jitter, capped at 2s
    let policy = RetryPolicy {
        max_retries: 4,
        backoff: BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(2),
            factor: 2.0,
            jitter: JitterPolicy::Equal,
        },
    };

    // 3. Worker with a deadline around the whole retry loop
    let worker: AsyncWorker<Value> = AsyncWorker::new();
    worker.set_timeout(Duration::from_secs(5));
    worker.set_callback(|v: &Value| println!("[callback] result = {v}"));

    let retry_bus = bus.clone();
    worker.start_async(move |_ctx| async move {
        async_retry(|attempt| {
            let bus = retry_bus.clone();
            async move {
                println!("[main] attempt {attempt}");
                expose_once(attempt, &bus).await
            }
        }, policy)
        .await
    })?;

    let state = worker.wait_for_completion().await;
    println!("[main] worker finished: {}", state.as_label());
    println!("[main] result: {:?}", worker.get_result()?);

    bus.stop_all_processing_threads();
    Ok(())
}
