//! End-to-end: resolved start order → container → bus events → workers with retry.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use taskcore::resolver::resolve_directory;
use taskcore::subscribers::{Subscribe, attach};
use taskcore::{
    AsyncWorkerManager, Config, MessageBus, RetryPolicy, TaskBuilder, TaskContainer, TaskError,
    Task, TaskEvent, TaskEventKind, TaskStatus, WorkerState, async_retry,
};

#[derive(Default)]
struct Recorder(Mutex<Vec<(String, TaskEventKind)>>);

impl Subscribe for Recorder {
    fn on_event(&self, ev: &TaskEvent) -> anyhow::Result<()> {
        self.0.lock().push((ev.task.to_string(), ev.kind));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

fn write_plugins(root: &std::path::Path) {
    for (dir, body) in [
        ("focuser", r#"{"name": "focuser", "dependencies": {"serial": "1"}}"#),
        ("serial", r#"{"name": "serial"}"#),
        ("autofocus", r#"{"name": "autofocus", "dependencies": {"focuser": "1", "camera": "1"}}"#),
        ("camera", r#"{"name": "camera"}"#),
    ] {
        let unit = root.join(dir);
        fs::create_dir_all(&unit).unwrap();
        fs::write(unit.join("package.json"), body).unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_plugins_start_in_dependency_order() {
    let tmp = tempfile::tempdir().unwrap();
    write_plugins(tmp.path());
    let order = resolve_directory(tmp.path()).unwrap();
    let pos = |n: &str| order.iter().position(|o| o == n).unwrap();
    assert_eq!(order.len(), 4);
    assert!(pos("serial") < pos("focuser"));
    assert!(pos("focuser") < pos("autofocus"));
    assert!(pos("camera") < pos("autofocus"));

    let cfg = Config {
        bus_dispatch_threads: 2,
        ..Config::default()
    };
    let bus = MessageBus::with_config(&cfg);
    let recorder = Arc::new(Recorder::default());
    attach(&bus, Arc::clone(&recorder));

    let started = Arc::new(Mutex::new(Vec::new()));
    let container = TaskContainer::new();
    for plugin in &order {
        let started = Arc::clone(&started);
        let task = TaskBuilder::new(plugin.clone())
            .with_defaults(&cfg)
            .with_bus(&bus)
            .build_plugin(plugin.as_str(), move |_, _| {
                let started = Arc::clone(&started);
                async move {
                    started.lock().push(());
                    Ok(Value::Bool(true))
                }
            });
        assert!(container.add_task(task.into_ref()));
    }

    for task in container.get_all_tasks() {
        assert_eq!(task.run().await, Ok(TaskStatus::Completed));
    }
    assert_eq!(started.lock().len(), 4);
    assert_eq!(container.find_tasks(10, TaskStatus::Completed).len(), 4);

    bus.stop_all_processing_threads();
    let events = recorder.0.lock().clone();
    for plugin in &order {
        let kinds: Vec<TaskEventKind> = events
            .iter()
            .filter(|(t, _)| t == plugin)
            .map(|(_, k)| *k)
            .collect();
        assert_eq!(kinds, vec![TaskEventKind::Started, TaskEventKind::Completed]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_workers_retry_flaky_tasks() {
    let manager: AsyncWorkerManager<Value> = AsyncWorkerManager::with_config(&Config {
        worker_timeout: Duration::from_secs(5),
        ..Config::default()
    });

    for id in 0..3u32 {
        manager
            .create_worker(move |_ctx| async move {
                let policy = RetryPolicy::new(3, Duration::from_millis(5), 2.0);
                async_retry(
                    |attempt| async move {
                        let task = TaskBuilder::new(format!("download-{id}-{attempt}")).build(
                            move |_, _| async move {
                                if attempt <= id {
                                    Err(TaskError::fail("link busy"))
                                } else {
                                    Ok(json!({"id": id, "attempts": attempt}))
                                }
                            },
                        );
                        match task.run().await? {
                            TaskStatus::Completed => Ok(task.result().unwrap_or_default()),
                            _ => Err(task.error().unwrap_or(TaskError::Canceled)),
                        }
                    },
                    policy,
                )
                .await
            })
            .unwrap();
    }

    let states = manager.wait_for_all().await;
    assert_eq!(states, vec![WorkerState::Completed; 3]);
    assert!(manager.all_done());
    assert_eq!(manager.remove_completed(), 3);
    assert!(manager.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_required_params_fail_before_executor() {
    let bus = MessageBus::new(1);
    let recorder = Arc::new(Recorder::default());
    attach(&bus, Arc::clone(&recorder));

    let hook_hits = Arc::new(Mutex::new(Vec::new()));
    let hits = Arc::clone(&hook_hits);
    let task = TaskBuilder::new("slew")
        .with_params(json!({"ra": 10.5}))
        .with_required_params(["ra", "dec"])
        .with_bus(&bus)
        .on_terminate(move |e| hits.lock().push(e.as_label()))
        .build(|_, _| async { Err::<Value, _>(TaskError::fatal("executor ran")) });

    let container = TaskContainer::new();
    container.add_task(task.into_ref());
    let slew = container.get_task("slew").unwrap();
    assert_eq!(slew.run().await, Ok(TaskStatus::Failed));
    assert_eq!(*hook_hits.lock(), vec!["task_argument_mismatch"]);

    bus.stop_all_processing_threads();
    let kinds: Vec<TaskEventKind> = recorder.0.lock().iter().map(|(_, k)| *k).collect();
    assert_eq!(kinds, vec![TaskEventKind::Started, TaskEventKind::Failed]);
}
