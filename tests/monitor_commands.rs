// tests/monitor_commands.rs
//
// Command inbox handling: lifecycle, FIFO, at-most-once and failure paths.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use sns_risk_monitor::ai_adapter::RiskAnalyzer;
use sns_risk_monitor::ingest::types::{CanonicalRecord, PostSource};
use sns_risk_monitor::monitor::CommandOutcome;
use sns_risk_monitor::store::{CommandStatus, LogLevel, MemoryStore, Store};
use sns_risk_monitor::{Monitor, MonitorSettings};

#[derive(Default)]
struct CountingSource {
    calls: AtomicUsize,
    /// Inserted into the inbox during the first fetch.
    inject_into: Option<Arc<MemoryStore>>,
}

#[async_trait]
impl PostSource for CountingSource {
    async fn fetch_posts(&self, query: &str, _count: usize) -> anyhow::Result<Vec<CanonicalRecord>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            if let Some(store) = &self.inject_into {
                store.insert_command("RUN_NOW");
            }
        }
        Ok(vec![CanonicalRecord::new(format!("{query} news"), Utc::now()).with_id("1")])
    }
}

struct PanickingSource;

#[async_trait]
impl PostSource for PanickingSource {
    async fn fetch_posts(&self, _query: &str, _count: usize) -> anyhow::Result<Vec<CanonicalRecord>> {
        panic!("source crashed");
    }
}

fn monitor(store: &Arc<MemoryStore>, source: Arc<dyn PostSource>) -> Monitor {
    Monitor::new(
        vec!["BMSG".into()],
        source,
        Arc::new(RiskAnalyzer::disabled()),
        store.clone(),
        MonitorSettings::default(),
    )
}

#[tokio::test]
async fn run_now_goes_pending_processing_completed_and_runs_job_once() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(CountingSource::default());
    let m = monitor(&store, source.clone());
    let cmd = store.insert_command("RUN_NOW");

    let outcomes = m.poll_commands_once().await;
    assert_eq!(outcomes, vec![(cmd.id, CommandOutcome::Completed)]);
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        store.transitions(cmd.id),
        vec![
            CommandStatus::Pending,
            CommandStatus::Processing,
            CommandStatus::Completed
        ]
    );

    let msgs: Vec<String> = store.logs().into_iter().map(|l| l.message).collect();
    assert!(msgs.contains(&"Received command: RUN_NOW".to_string()));
    assert_eq!(msgs.last().unwrap(), "Manual run completed successfully.");

    // terminal commands are never picked again
    assert!(m.poll_commands_once().await.is_empty());
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn commands_run_oldest_first() {
    let store = Arc::new(MemoryStore::new());
    let m = monitor(&store, Arc::new(CountingSource::default()));
    let first = store.insert_command("RUN_NOW");
    let second = store.insert_command("RUN_NOW");

    let ids: Vec<i64> = m.poll_commands_once().await.into_iter().map(|(id, _)| id).collect();
    assert_eq!(ids, vec![first.id, second.id]);
}

#[tokio::test]
async fn command_created_mid_poll_waits_for_next_iteration() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(CountingSource {
        inject_into: Some(store.clone()),
        ..Default::default()
    });
    let m = monitor(&store, source.clone());
    store.insert_command("RUN_NOW");

    assert_eq!(m.poll_commands_once().await.len(), 1);
    assert_eq!(store.pending_commands().await.len(), 1);

    assert_eq!(m.poll_commands_once().await.len(), 1);
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn lost_claim_is_skipped_without_running() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(CountingSource::default());
    let m = monitor(&store, source.clone());
    let cmd = store.insert_command("RUN_NOW");

    // another worker got there first
    assert!(store.claim_command(cmd.id).await);

    assert_eq!(m.handle_command(&cmd).await, CommandOutcome::Skipped);
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.command(cmd.id).unwrap().status, CommandStatus::Processing);
}

#[tokio::test]
async fn crashed_job_marks_command_failed() {
    let store = Arc::new(MemoryStore::new());
    let m = monitor(&store, Arc::new(PanickingSource));
    let cmd = store.insert_command("RUN_NOW");

    let outcomes = m.poll_commands_once().await;
    assert_eq!(outcomes, vec![(cmd.id, CommandOutcome::Failed)]);
    assert_eq!(store.command(cmd.id).unwrap().status, CommandStatus::Failed);

    let last = store.logs().pop().unwrap();
    assert_eq!(last.level, LogLevel::Error);
    assert!(last.message.starts_with("Manual run failed: "));
}

#[tokio::test]
async fn unknown_command_is_failed_not_left_processing() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(CountingSource::default());
    let m = monitor(&store, source.clone());
    let cmd = store.insert_command("SELF_DESTRUCT");

    m.poll_commands_once().await;
    assert_eq!(store.command(cmd.id).unwrap().status, CommandStatus::Failed);
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    assert!(store
        .logs()
        .iter()
        .any(|l| l.message == "Unsupported command: SELF_DESTRUCT"));
}
