//! Cold start: ranks join the online group until the quorum is reached,
//! then the resource event log is printed.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use rankvisor::{Appender, GroupHub, MemoryStore, Monitor, MonitorConfig, BROKER_ONLINE};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let groups = Arc::new(GroupHub::new());

    let mut cfg = MonitorConfig::default();
    cfg.size = 4;
    cfg.hostlist = Some("node[0-3]".to_string());
    let log_path = cfg.eventlog_path.clone();

    let appender = Appender::new(store.clone(), Duration::from_millis(20), None);
    let monitor = Monitor::new(cfg, appender, groups.clone());
    let handle = monitor.handle();

    let token = CancellationToken::new();
    let running = tokio::spawn(monitor.run(token.clone()));

    // The overlay reports ranks joining in two waves.
    groups.publish(BROKER_ONLINE, "0-1").await;
    groups.publish(BROKER_ONLINE, "0-3").await;

    handle.waitup(4).await?;
    println!("quorum of 4 reached");

    for entry in store.entries(&log_path) {
        println!(
            "{:>10.3}  {:<8} {}",
            entry.timestamp,
            entry.name,
            serde_json::Value::Object(entry.context.clone())
        );
    }

    token.cancel();
    running.await??;
    Ok(())
}
