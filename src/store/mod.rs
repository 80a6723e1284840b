// src/store/mod.rs
//! Persistence gateway: records, the operator log table and the command inbox.
//!
//! Every operation is best-effort. Backends log their own failures and hand
//! back an absent/empty value, so the monitor loop never stops on storage.

pub mod memory;
pub mod supabase;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{StoreBackend, StoreConfig};
use crate::ingest::types::CanonicalRecord;
pub use memory::{DisabledStore, MemoryStore};
pub use supabase::SupabaseStore;
pub use types::{
    Command, CommandKind, CommandStatus, LogEntry, LogLevel, RecordOrder, RecordQuery, RecordRow,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("network error: {0}")]
    Network(String),
    #[error("storage API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Parse(err.to_string())
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Idempotent upsert keyed by `CanonicalRecord::storage_key`. Returns the key written.
    async fn save_record(&self, record: &CanonicalRecord) -> Option<String>;

    /// Most recently collected first.
    async fn latest_records(&self, limit: usize) -> Vec<CanonicalRecord> {
        self.query_records(&RecordQuery::latest(limit)).await
    }

    async fn query_records(&self, query: &RecordQuery) -> Vec<CanonicalRecord>;

    /// Fire-and-forget. A failed write only reaches `tracing`.
    async fn append_log(&self, message: &str, level: LogLevel);

    /// Newest first.
    async fn recent_logs(&self, limit: usize) -> Vec<LogEntry>;

    /// PENDING commands, oldest first.
    async fn pending_commands(&self) -> Vec<Command>;

    /// Also stamps `processed_at`. The in-memory backend ignores backwards moves.
    async fn set_command_status(&self, id: i64, status: CommandStatus);

    /// PENDING → PROCESSING only if the row is still PENDING. `false` means
    /// somebody else took it (or the store is unavailable).
    async fn claim_command(&self, id: i64) -> bool;

    async fn enqueue_command(&self, kind: CommandKind) -> Option<Command>;

    fn backend(&self) -> &'static str;
}

/// Pick the backend from config. Supabase without credentials becomes a
/// [`DisabledStore`] (dry run).
pub fn store_from_config(cfg: &StoreConfig) -> Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match cfg.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Supabase => match (&cfg.supabase_url, &cfg.supabase_key) {
            (Some(url), Some(key)) => Arc::new(SupabaseStore::new(
                url.clone(),
                key.clone(),
                cfg.tables.clone(),
                cfg.request_timeout,
            )?),
            _ => {
                warn!("Supabase credentials not found. Data will not be saved.");
                Arc::new(DisabledStore)
            }
        },
    };
    info!(backend = store.backend(), "store initialized");
    Ok(store)
}
