//! # Example: plugin_startup
//!
//! Resolves a plugin directory into a start order, registers one start-up task per plugin,
//! runs them in that order and keeps a guider heartbeat alive as a daemon.
//!
//! ## Flow
//! ```text
//! tempdir/<plugin>/package.json ─► resolve_directory ─► [serial, camera, mount, guider]
//!         │
//!         ▼
//! TaskContainer: PluginTask "start:<plugin>" per unit (events on the bus → LogWriter)
//!         │ run in resolved order
//!         ▼
//! TaskStack: "calibrate" / "image" are mutually exclusive → execute_all refused
//!         │ remove "calibrate"
//!         ▼
//! DaemonTask "guider-heartbeat" ─► stop() after a few beats
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example plugin_startup
//! ```

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use taskcore::resolver::resolve_directory;
use taskcore::subscribers::attach;
use taskcore::{
    DaemonTask, LogWriter, MessageBus, SimpleTask, Task, TaskBuilder, TaskContainer,
    TaskStack, TaskStatus,
};

const PLUGINS: &[(&str, &str)] = &[
    ("guider", r#"{"name": "guider", "dependencies": {"camera": "^2", "mount": "^1"}}"#),
    ("camera", r#"{"name": "camera", "dependencies": {"serial": "*"}}"#),
    ("mount", r#"{"name": "mount", "dependencies": {"serial": "*"}}"#),
    ("serial", r#"{"name": "serial"}"#),
];

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 1. Lay out plugin manifests and resolve the start order
    let dir = tempfile::tempdir()?;
    for (name, manifest) in PLUGINS {
        let unit = dir.path().join(name);
        fs::create_dir_all(&unit)?;
        fs::write(unit.join("package.json"), manifest)?;
    }
    let order = resolve_directory(dir.path())?;
    println!("[main] start order: {order:?}");

    // 2. One start-up task per plugin, all reporting to the bus
    let bus = MessageBus::new(2);
    attach(&bus, Arc::new(LogWriter::new()));

    let container = TaskContainer::new();
    for plugin in &order {
        let task = TaskBuilder::new(format!("start:{plugin}"))
            .with_params(json!({"plugin": plugin}))
            .with_timeout(Duration::from_secs(1))
            .with_bus(&bus)
            .build_plugin(plugin.as_str(), |params, _ctx| async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(json!({"loaded": params["plugin"]}))
            });
        container.add_task(task.into_ref());
    }
    for task in container.get_all_tasks() {
        let status = task.run().await?;
        println!("[main] {} -> {}", task.name(), status.as_label());
    }
    println!(
        "[main] completed: {}",
        container.find_tasks(usize::MAX, TaskStatus::Completed).len()
    );

    // 3. Imaging sequence with an exclusion rule
    let stack = TaskStack::new();
    stack.register_mutually_exclusive_tasks("calibrate", ["image"]);
    for step in ["calibrate", "image"] {
        stack.add_task(
            SimpleTask::new(step, json!({}), |_, _| async { Ok(json!("done")) }).into_ref(),
        );
    }
    match stack.execute_all_tasks().await {
        Err(e) => println!("[main] refused: {e}"),
        Ok(s) => println!("[main] ran {} steps", s.len()),
    }
    stack.remove_task("calibrate");
    println!("[main] after removal: {:?}", stack.execute_all_tasks().await?);

    // 4. Heartbeat daemon
    let heartbeat = DaemonTask::new("guider-heartbeat", |stop| async move {
        tokio::select! {
            _ = stop.cancelled() => {}
            _ = tokio::time::sleep(Duration::from_millis(50)) => println!("[heartbeat] beat"),
        }
        Ok(())
    });
    heartbeat.run().await?;
    tokio::time::sleep(Duration::from_millis(220)).await;
    let status = heartbeat.stop().await?;
    println!(
        "[main] heartbeat {} after {} beats",
        status.as_label(),
        heartbeat.iterations()
    );

    let cameras: Vec<String> = container
        .tasks_by_plugin("camera")
        .iter()
        .map(|t| t.name().to_owned())
        .collect();
    println!("[main] camera tasks: {cameras:?}");

    bus.stop_all_processing_threads();
    Ok(())
}
