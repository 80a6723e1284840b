// src/store/memory.rs
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use tracing::warn;

use super::types::{
    Command, CommandKind, CommandStatus, LogEntry, LogLevel, RecordOrder, RecordQuery, RecordRow,
};
use super::Store;
use crate::ingest::types::CanonicalRecord;

#[derive(Default)]
struct Inner {
    records: HashMap<String, RecordRow>,
    logs: Vec<LogEntry>,
    commands: Vec<Command>,
    transitions: Vec<(i64, CommandStatus)>,
    next_log_id: i64,
    next_command_id: i64,
}

/// In-process store for local runs (`STORE_BACKEND=memory`) and tests.
///
/// Rows go through the same [`RecordRow`] mapping as the remote backend, and
/// every command status write is kept in a transition history.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a PENDING command the way the dashboard does.
    pub fn insert_command(&self, command: &str) -> Command {
        let mut g = self.lock();
        g.next_command_id += 1;
        let cmd = Command {
            id: g.next_command_id,
            command: command.to_string(),
            status: CommandStatus::Pending,
            created_at: Some(Utc::now()),
            processed_at: None,
        };
        g.commands.push(cmd.clone());
        g.transitions.push((cmd.id, CommandStatus::Pending));
        cmd
    }

    pub fn command(&self, id: i64) -> Option<Command> {
        self.lock().commands.iter().find(|c| c.id == id).cloned()
    }

    /// Every status the command has been written with, in order.
    pub fn transitions(&self, id: i64) -> Vec<CommandStatus> {
        self.lock()
            .transitions
            .iter()
            .filter(|(cid, _)| *cid == id)
            .map(|(_, s)| *s)
            .collect()
    }

    /// Oldest first.
    pub fn logs(&self) -> Vec<LogEntry> {
        self.lock().logs.clone()
    }

    pub fn record_count(&self) -> usize {
        self.lock().records.len()
    }

    pub fn record(&self, key: &str) -> Option<CanonicalRecord> {
        self.lock().records.get(key).cloned().map(RecordRow::into_record)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_record(&self, record: &CanonicalRecord) -> Option<String> {
        let row = RecordRow::from_record(record);
        let key = row.id.clone();
        self.lock().records.insert(key.clone(), row);
        counter!("monitor_records_saved_total").increment(1);
        Some(key)
    }

    async fn query_records(&self, query: &RecordQuery) -> Vec<CanonicalRecord> {
        let g = self.lock();
        let mut rows: Vec<&RecordRow> = g
            .records
            .values()
            .filter(|r| match query.min_risk {
                Some(min) => r.risk_score.is_some_and(|s| s >= min),
                None => true,
            })
            .collect();
        match query.order {
            RecordOrder::CollectedAt => rows.sort_by(|a, b| b.collected_at.cmp(&a.collected_at)),
            RecordOrder::RiskScore => rows.sort_by(|a, b| {
                b.risk_score
                    .cmp(&a.risk_score)
                    .then(b.collected_at.cmp(&a.collected_at))
            }),
        }
        rows.into_iter()
            .take(query.limit)
            .cloned()
            .map(RecordRow::into_record)
            .collect()
    }

    async fn append_log(&self, message: &str, level: LogLevel) {
        let mut g = self.lock();
        g.next_log_id += 1;
        let id = g.next_log_id;
        g.logs.push(LogEntry {
            id: Some(id),
            message: message.to_string(),
            level,
            created_at: Some(Utc::now()),
        });
    }

    async fn recent_logs(&self, limit: usize) -> Vec<LogEntry> {
        self.lock().logs.iter().rev().take(limit).cloned().collect()
    }

    async fn pending_commands(&self) -> Vec<Command> {
        let g = self.lock();
        let mut out: Vec<Command> = g
            .commands
            .iter()
            .filter(|c| c.status == CommandStatus::Pending)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        out
    }

    async fn set_command_status(&self, id: i64, status: CommandStatus) {
        let mut g = self.lock();
        if let Some(c) = g.commands.iter_mut().find(|c| c.id == id) {
            if !c.status.can_transition_to(status) {
                warn!(id, from = %c.status, to = %status, "ignoring backwards command transition");
                return;
            }
            c.status = status;
            c.processed_at = Some(Utc::now());
            g.transitions.push((id, status));
        }
    }

    async fn claim_command(&self, id: i64) -> bool {
        let mut g = self.lock();
        let Some(c) = g
            .commands
            .iter_mut()
            .find(|c| c.id == id && c.status == CommandStatus::Pending)
        else {
            return false;
        };
        c.status = CommandStatus::Processing;
        c.processed_at = Some(Utc::now());
        g.transitions.push((id, CommandStatus::Processing));
        true
    }

    async fn enqueue_command(&self, kind: CommandKind) -> Option<Command> {
        Some(self.insert_command(kind.as_str()))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// No credentials: nothing is stored, nothing is ever pending.
pub struct DisabledStore;

#[async_trait]
impl Store for DisabledStore {
    async fn save_record(&self, _record: &CanonicalRecord) -> Option<String> {
        None
    }

    async fn query_records(&self, _query: &RecordQuery) -> Vec<CanonicalRecord> {
        Vec::new()
    }

    async fn append_log(&self, _message: &str, _level: LogLevel) {}

    async fn recent_logs(&self, _limit: usize) -> Vec<LogEntry> {
        Vec::new()
    }

    async fn pending_commands(&self) -> Vec<Command> {
        Vec::new()
    }

    async fn set_command_status(&self, _id: i64, _status: CommandStatus) {}

    async fn claim_command(&self, _id: i64) -> bool {
        false
    }

    async fn enqueue_command(&self, _kind: CommandKind) -> Option<Command> {
        None
    }

    fn backend(&self) -> &'static str {
        "disabled"
    }
}
