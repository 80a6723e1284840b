// tests/memory_store.rs
use chrono::{Duration, Utc};

use sns_risk_monitor::ai_adapter::RiskAssessment;
use sns_risk_monitor::ingest::types::CanonicalRecord;
use sns_risk_monitor::store::{
    CommandKind, CommandStatus, DisabledStore, LogLevel, MemoryStore, RecordQuery, Store,
};

fn scored(id: &str, minutes_ago: i64, score: Option<u8>) -> CanonicalRecord {
    let mut r = CanonicalRecord::new(format!("post {id}"), Utc::now() - Duration::minutes(minutes_ago))
        .with_id(id);
    if let Some(s) = score {
        r.attach_assessment(RiskAssessment {
            sentiment: 0.0,
            aggression: s,
            spread_risk: s,
            legal_risk: 0,
            risk_score: s,
            reason: "test".into(),
        });
    }
    r
}

#[tokio::test]
async fn upsert_is_idempotent_per_key() {
    let store = MemoryStore::new();
    let first = scored("1", 10, None);
    let again = scored("1", 0, Some(4));

    assert_eq!(store.save_record(&first).await.as_deref(), Some("1"));
    assert_eq!(store.save_record(&again).await.as_deref(), Some("1"));
    assert_eq!(store.record_count(), 1);
    assert_eq!(store.record("1").unwrap().risk_score(), Some(4));

    // no id: the content key still dedups
    let anon = CanonicalRecord::new("same text", Utc::now());
    let k1 = store.save_record(&anon).await.unwrap();
    let k2 = store.save_record(&anon.clone()).await.unwrap();
    assert_eq!(k1, k2);
    assert!(k1.starts_with("h-"));
    assert_eq!(store.record_count(), 2);
}

#[tokio::test]
async fn queries_order_and_filter() {
    let store = MemoryStore::new();
    for r in [
        scored("old-high", 30, Some(9)),
        scored("new-low", 1, Some(2)),
        scored("mid", 10, Some(6)),
        scored("unscored", 0, None),
    ] {
        store.save_record(&r).await;
    }

    let latest: Vec<_> = store
        .latest_records(3)
        .await
        .into_iter()
        .map(|r| r.id.unwrap())
        .collect();
    assert_eq!(latest, vec!["unscored", "new-low", "mid"]);

    let risky: Vec<_> = store
        .query_records(&RecordQuery::riskiest(10, 5))
        .await
        .into_iter()
        .map(|r| r.id.unwrap())
        .collect();
    assert_eq!(risky, vec!["old-high", "mid"]);
}

#[tokio::test]
async fn claim_moves_pending_once_and_history_is_kept() {
    let store = MemoryStore::new();
    let a = store.insert_command("RUN_NOW");
    let b = store.enqueue_command(CommandKind::RunNow).await.unwrap();

    let pending: Vec<i64> = store.pending_commands().await.iter().map(|c| c.id).collect();
    assert_eq!(pending, vec![a.id, b.id]);

    assert!(store.claim_command(a.id).await);
    assert!(!store.claim_command(a.id).await);
    store.set_command_status(a.id, CommandStatus::Completed).await;
    assert!(!store.claim_command(a.id).await);
    // finished commands never move again
    store.set_command_status(a.id, CommandStatus::Failed).await;
    store.set_command_status(a.id, CommandStatus::Pending).await;
    assert_eq!(store.command(a.id).unwrap().status, CommandStatus::Completed);

    assert_eq!(
        store.transitions(a.id),
        vec![
            CommandStatus::Pending,
            CommandStatus::Processing,
            CommandStatus::Completed
        ]
    );
    assert!(store.command(a.id).unwrap().processed_at.is_some());
    let pending: Vec<i64> = store.pending_commands().await.iter().map(|c| c.id).collect();
    assert_eq!(pending, vec![b.id]);
}

#[tokio::test]
async fn logs_append_and_read_newest_first() {
    let store = MemoryStore::new();
    store.append_log("one", LogLevel::Info).await;
    store.append_log("two", LogLevel::Error).await;

    let recent = store.recent_logs(1).await;
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].message, "two");
    assert_eq!(recent[0].level, LogLevel::Error);
    assert_eq!(store.logs().len(), 2);
}

#[tokio::test]
async fn disabled_store_is_a_dry_run() {
    let store = DisabledStore;
    assert!(store.save_record(&scored("1", 0, None)).await.is_none());
    assert!(store.latest_records(10).await.is_empty());
    assert!(store.pending_commands().await.is_empty());
    assert!(!store.claim_command(1).await);
    assert!(store.enqueue_command(CommandKind::RunNow).await.is_none());
    store.append_log("ignored", LogLevel::Info).await;
    assert!(store.recent_logs(10).await.is_empty());
}
