//! End-to-end membership monitor behavior over an in-memory event store
//! and an in-process group source.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use rankvisor::{
    Appender, GroupHub, MemoryStore, Monitor, MonitorConfig, MonitorError, MonitorHandle,
    BROKER_ONLINE, BROKER_TORPID, SDMON_ONLINE,
};

const LOG: &str = "resource.eventlog";

struct Fixture {
    store: Arc<MemoryStore>,
    hub: Arc<GroupHub>,
    handle: MonitorHandle,
    token: CancellationToken,
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Spawns a monitor and, on the leader, waits for startup to finish
/// (watches opened, `restart` posted) before handing control to the test.
async fn start(cfg: MonitorConfig) -> Fixture {
    let leader = cfg.rank == 0;
    let store = Arc::new(MemoryStore::new());
    let hub = Arc::new(GroupHub::new());

    let appender = Appender::new(store.clone(), Duration::from_millis(5), None);
    let monitor = Monitor::new(cfg, appender, hub.clone());
    let handle = monitor.handle();

    let token = CancellationToken::new();
    tokio::spawn(monitor.run(token.clone()));

    if leader {
        let store = store.clone();
        eventually(move || store.names(LOG).first().map(String::as_str) == Some("restart")).await;
    }

    Fixture {
        store,
        hub,
        handle,
        token,
    }
}

async fn eventually(f: impl Fn() -> bool) {
    for _ in 0..500 {
        if f() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}

fn leader_cfg(size: u32) -> MonitorConfig {
    let mut cfg = MonitorConfig::default();
    cfg.size = size;
    cfg.hostlist = Some(format!("node[0-{}]", size - 1));
    cfg
}

#[tokio::test]
async fn cold_start_posts_restart_then_online() {
    let fx = start(leader_cfg(4)).await;

    fx.hub.publish(BROKER_ONLINE, "0-3").await;
    fx.handle.waitup(4).await.unwrap();

    let entries = fx.store.entries(LOG);
    assert_eq!(fx.store.names(LOG), ["restart", "online"]);

    let restart = &entries[0];
    assert_eq!(restart.context_str("ranks"), Some("0-3"));
    assert_eq!(restart.context_str("online"), Some(""));
    assert_eq!(restart.context_str("nodelist"), Some("node[0-3]"));

    assert_eq!(entries[1].context_str("idset"), Some("0-3"));
}

#[tokio::test]
async fn node_loss_and_rejoin_track_lost() {
    let fx = start(leader_cfg(4)).await;

    fx.hub.publish(BROKER_ONLINE, "0-3").await;
    fx.handle.waitup(4).await.unwrap();

    // Rank 3 drops out of the online group.
    fx.hub.publish(BROKER_ONLINE, "0-2").await;
    fx.handle.waitup(3).await.unwrap();

    let entries = fx.store.entries(LOG);
    let last = entries.last().unwrap();
    assert_eq!(last.name, "offline");
    assert_eq!(last.context_str("idset"), Some("3"));

    let m = fx.handle.membership().await.unwrap();
    assert_eq!(m.lost.encode(), "3");
    assert_eq!(m.up.encode(), "0-2");
    assert_eq!(m.down.encode(), "3");

    // Rank 3 rejoins; it is no longer lost.
    fx.hub.publish(BROKER_ONLINE, "0-3").await;
    fx.handle.waitup(4).await.unwrap();

    let entries = fx.store.entries(LOG);
    let last = entries.last().unwrap();
    assert_eq!(last.name, "online");
    assert_eq!(last.context_str("idset"), Some("3"));

    let m = fx.handle.membership().await.unwrap();
    assert!(m.lost.is_empty());
}

#[tokio::test]
async fn force_down_posts_offline_and_marks_lost() {
    let fx = start(leader_cfg(4)).await;

    fx.hub.publish(BROKER_ONLINE, "0-3").await;
    fx.handle.waitup(4).await.unwrap();

    fx.handle.force_down("1").await.unwrap();

    let entries = fx.store.entries(LOG);
    let last = entries.last().unwrap();
    assert_eq!(last.name, "offline");
    assert_eq!(last.context_str("idset"), Some("1"));

    let m = fx.handle.membership().await.unwrap();
    assert_eq!(m.up.encode(), "0,2-3");
    assert_eq!(m.down.encode(), "1");
    assert_eq!(m.lost.encode(), "1");
}

#[tokio::test]
async fn force_down_with_bad_ranks_changes_nothing() {
    let mut cfg = leader_cfg(4);
    cfg.force_up = true;
    let fx = start(cfg).await;

    let err = fx.handle.force_down("bogus").await.unwrap_err();
    assert!(err.to_string().contains("invalid idset 'bogus'"), "{err}");

    let m = fx.handle.membership().await.unwrap();
    assert_eq!(m.up.encode(), "0-3");
    assert_eq!(fx.store.names(LOG), ["restart"]);
}

#[tokio::test]
async fn waitup_reply_follows_the_online_event() {
    let fx = start(leader_cfg(4)).await;

    fx.hub.publish(BROKER_ONLINE, "0-1").await;
    fx.handle.waitup(2).await.unwrap();

    // Park a waitup for three ranks, then deliver the third.
    let handle = fx.handle.clone();
    let store = fx.store.clone();
    let parked = tokio::spawn(async move {
        handle.waitup(3).await.unwrap();
        // Whatever the log contains at reply time must already include
        // the online event that satisfied us.
        store.names(LOG)
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    fx.hub.publish(BROKER_ONLINE, "0-2").await;
    let names_at_reply = parked.await.unwrap();

    assert_eq!(names_at_reply.last().map(String::as_str), Some("online"));
    let entries = fx.store.entries(LOG);
    assert_eq!(entries.last().unwrap().context_str("idset"), Some("2"));
}

#[tokio::test]
async fn waitup_validates_range_and_answers_immediately_on_match() {
    let fx = start(leader_cfg(4)).await;

    // The online set starts empty, so zero is already satisfied.
    fx.handle.waitup(0).await.unwrap();

    let err = fx.handle.waitup(5).await.unwrap_err();
    assert!(matches!(
        err,
        MonitorError::WaitupOutOfRange { want: 5, size: 4 }
    ));
    assert_eq!(err.to_string(), "up value is out of range");
}

#[tokio::test]
async fn cancelled_waitup_requests_are_discarded() {
    let fx = start(leader_cfg(4)).await;

    let handle = fx.handle.clone();
    let parked = tokio::spawn(async move { handle.waitup(1).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    parked.abort();

    // A later snapshot skips the dead request and the monitor stays live.
    fx.hub.publish(BROKER_ONLINE, "0-1").await;
    fx.handle.waitup(2).await.unwrap();
}

#[tokio::test]
async fn follower_rejects_requests_without_state() {
    let mut cfg = MonitorConfig::default();
    cfg.rank = 1;
    cfg.size = 4;
    let fx = start(cfg).await;

    let err = fx.handle.waitup(0).await.unwrap_err();
    assert!(matches!(err, MonitorError::NotLeader));
    assert_eq!(err.to_string(), "this RPC only works on rank 0");

    assert!(matches!(
        fx.handle.force_down("0").await.unwrap_err(),
        MonitorError::NotLeader
    ));
    assert!(matches!(
        fx.handle.membership().await.unwrap_err(),
        MonitorError::NotLeader
    ));

    // Followers never post events or open watches.
    assert!(fx.store.names(LOG).is_empty());
    assert_eq!(fx.hub.watcher_count(BROKER_ONLINE), 0);
}

#[tokio::test]
async fn force_up_preloads_the_online_set_and_skips_watches() {
    let mut cfg = leader_cfg(4);
    cfg.force_up = true;
    let fx = start(cfg).await;

    let entries = fx.store.entries(LOG);
    assert_eq!(entries[0].context_str("online"), Some("0-3"));

    fx.handle.waitup(4).await.unwrap();
    assert_eq!(fx.hub.watcher_count(BROKER_ONLINE), 0);
    assert_eq!(fx.hub.watcher_count(BROKER_TORPID), 0);
}

#[tokio::test]
async fn recovery_mode_skips_watches() {
    let mut cfg = leader_cfg(4);
    cfg.recovery_mode = true;
    let fx = start(cfg).await;

    let entries = fx.store.entries(LOG);
    assert_eq!(entries[0].context_str("online"), Some(""));
    assert_eq!(fx.hub.watcher_count(BROKER_ONLINE), 0);
    assert_eq!(fx.hub.watcher_count(BROKER_TORPID), 0);
}

#[tokio::test]
async fn systemd_enable_watches_sdmon_online() {
    let mut cfg = leader_cfg(2);
    cfg.systemd_enable = true;
    let fx = start(cfg).await;

    assert_eq!(fx.hub.watcher_count(SDMON_ONLINE), 1);
    assert_eq!(fx.hub.watcher_count(BROKER_ONLINE), 0);

    fx.hub.publish(SDMON_ONLINE, "0-1").await;
    fx.handle.waitup(2).await.unwrap();
}

#[tokio::test]
async fn torpid_is_orthogonal_to_online() {
    let fx = start(leader_cfg(4)).await;

    fx.hub.publish(BROKER_ONLINE, "0-3").await;
    fx.handle.waitup(4).await.unwrap();

    fx.hub.publish(BROKER_TORPID, "1").await;
    {
        let store = fx.store.clone();
        eventually(move || store.names(LOG).contains(&"torpid".to_string())).await;
    }

    let entries = fx.store.entries(LOG);
    let last = entries.last().unwrap();
    assert_eq!(last.name, "torpid");
    assert_eq!(last.context_str("idset"), Some("1"));

    let m = fx.handle.membership().await.unwrap();
    assert_eq!(m.torpid.encode(), "1");
    assert_eq!(m.up.encode(), "0-3");

    fx.hub.publish(BROKER_TORPID, "").await;
    {
        let store = fx.store.clone();
        eventually(move || store.names(LOG).contains(&"lively".to_string())).await;
    }
    let m = fx.handle.membership().await.unwrap();
    assert!(m.torpid.is_empty());
}

#[tokio::test]
async fn join_precedes_leave_within_one_diff() {
    let fx = start(leader_cfg(4)).await;

    fx.hub.publish(BROKER_ONLINE, "0-2").await;
    fx.handle.waitup(3).await.unwrap();

    // One snapshot both adds rank 3 and drops rank 0. The online count
    // stays at three, so sync on the log instead of a waitup.
    fx.hub.publish(BROKER_ONLINE, "1-3").await;
    {
        let store = fx.store.clone();
        eventually(move || store.names(LOG).len() == 4).await;
    }

    let names = fx.store.names(LOG);
    assert_eq!(names, ["restart", "online", "online", "offline"]);

    let entries = fx.store.entries(LOG);
    assert_eq!(entries[2].context_str("idset"), Some("3"));
    assert_eq!(entries[3].context_str("idset"), Some("0"));

    let m = fx.handle.membership().await.unwrap();
    assert_eq!(m.lost.encode(), "0");
}

#[tokio::test]
async fn unparseable_snapshot_is_dropped() {
    let fx = start(leader_cfg(4)).await;

    fx.hub.publish(BROKER_ONLINE, "not-an-idset").await;
    fx.hub.publish(BROKER_ONLINE, "0-3").await;
    fx.handle.waitup(4).await.unwrap();

    // The bad snapshot left no trace; the good one diffed from empty.
    assert_eq!(fx.store.names(LOG), ["restart", "online"]);
}

#[tokio::test]
async fn failed_event_post_drops_the_snapshot_for_rediff() {
    let fx = start(leader_cfg(2)).await;

    fx.store.fail_next(1);
    fx.hub.publish(BROKER_ONLINE, "0-1").await;

    // The next delivery re-diffs from the same base and succeeds.
    fx.hub.publish(BROKER_ONLINE, "0-1").await;
    fx.handle.waitup(2).await.unwrap();

    assert_eq!(fx.store.names(LOG), ["restart", "online"]);
    let entries = fx.store.entries(LOG);
    assert_eq!(entries[1].context_str("idset"), Some("0-1"));
}

#[tokio::test]
async fn inventory_size_grows_the_rank_space() {
    let mut cfg = MonitorConfig::default();
    cfg.size = 1;
    cfg.inventory_size = 4;
    let fx = start(cfg).await;

    let entries = fx.store.entries(LOG);
    assert_eq!(entries[0].context_str("ranks"), Some("0-3"));
    assert_eq!(entries[0].context_str("nodelist"), Some(""));

    let m = fx.handle.membership().await.unwrap();
    assert_eq!(m.size, 4);
}
