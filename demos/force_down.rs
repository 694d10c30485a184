//! Forced-up instance: all ranks start online, then a few are manually
//! downed and the membership snapshot reflects the loss.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use rankvisor::{Appender, GroupHub, MemoryStore, Monitor, MonitorConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let groups = Arc::new(GroupHub::new());

    let mut cfg = MonitorConfig::default();
    cfg.size = 8;
    cfg.force_up = true;
    cfg.hostlist = Some("node[0-7]".to_string());
    let log_path = cfg.eventlog_path.clone();

    let appender = Appender::new(store.clone(), Duration::from_millis(20), None);
    let monitor = Monitor::new(cfg, appender, groups);
    let handle = monitor.handle();

    let token = CancellationToken::new();
    let running = tokio::spawn(monitor.run(token.clone()));

    handle.waitup(8).await?;
    handle.force_down("1,3-4").await?;

    let m = handle.membership().await?;
    println!("size   : {}", m.size);
    println!("up     : {}", m.up);
    println!("down   : {}", m.down);
    println!("lost   : {}", m.lost);

    println!("eventlog:");
    for entry in store.entries(&log_path) {
        println!("  {:<8} {}", entry.name, serde_json::Value::Object(entry.context.clone()));
    }

    token.cancel();
    running.await??;
    Ok(())
}
