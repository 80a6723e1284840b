// src/store/supabase.rs
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, error, warn};

use super::types::{
    Command, CommandKind, CommandStatus, LogEntry, LogLevel, RecordOrder, RecordQuery, RecordRow,
};
use super::{Store, StoreError};
use crate::config::StoreTables;
use crate::ingest::types::CanonicalRecord;

type Result<T> = std::result::Result<T, StoreError>;

/// Supabase over its PostgREST endpoint (`{url}/rest/v1/{table}`).
pub struct SupabaseStore {
    http: reqwest::Client,
    base_url: String,
    key: String,
    tables: StoreTables,
}

impl SupabaseStore {
    pub fn new(
        base_url: String,
        key: String,
        tables: StoreTables,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building supabase http client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            key,
            tables,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.table_url(table))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    async fn send(builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(builder: reqwest::RequestBuilder) -> Result<T> {
        let resp = Self::send(builder).await?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Decode a row list one row at a time. Rows that do not fit `T` (legacy
    /// writers, hand edits) are skipped so the rest of the table stays readable.
    async fn send_rows<T: DeserializeOwned>(
        builder: reqwest::RequestBuilder,
        table: &str,
    ) -> Result<Vec<T>> {
        let rows: Vec<serde_json::Value> = Self::send_json(builder).await?;
        Ok(decode_rows(rows, table))
    }

    async fn try_save(&self, row: &RecordRow) -> Result<()> {
        let req = self
            .request(reqwest::Method::POST, &self.tables.records)
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(row);
        Self::send(req).await.map(|_| ())
    }

    async fn try_query(&self, q: &RecordQuery) -> Result<Vec<RecordRow>> {
        let order = match q.order {
            RecordOrder::CollectedAt => "collected_at.desc",
            RecordOrder::RiskScore => "risk_score.desc.nullslast,collected_at.desc",
        };
        let mut params = vec![
            ("select", "*".to_string()),
            ("order", order.to_string()),
            ("limit", q.limit.to_string()),
        ];
        if let Some(min) = q.min_risk {
            params.push(("risk_score", format!("gte.{min}")));
        }
        let req = self
            .request(reqwest::Method::GET, &self.tables.records)
            .query(&params);
        Self::send_rows(req, &self.tables.records).await
    }

    async fn try_append_log(&self, message: &str, level: LogLevel) -> Result<()> {
        let req = self
            .request(reqwest::Method::POST, &self.tables.logs)
            .header("Prefer", "return=minimal")
            .json(&json!({
                "message": message,
                "level": level,
                "created_at": Utc::now(),
            }));
        Self::send(req).await.map(|_| ())
    }

    async fn try_recent_logs(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let req = self
            .request(reqwest::Method::GET, &self.tables.logs)
            .query(&[
                ("select", "*".to_string()),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
            ]);
        Self::send_rows(req, &self.tables.logs).await
    }

    async fn try_pending(&self) -> Result<Vec<Command>> {
        let req = self
            .request(reqwest::Method::GET, &self.tables.commands)
            .query(&[
                ("select", "*"),
                ("status", "eq.PENDING"),
                ("order", "created_at.asc"),
            ]);
        Self::send_rows(req, &self.tables.commands).await
    }

    async fn try_set_status(&self, id: i64, status: CommandStatus) -> Result<()> {
        let req = self
            .request(reqwest::Method::PATCH, &self.tables.commands)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal")
            .json(&json!({ "status": status, "processed_at": Utc::now() }));
        Self::send(req).await.map(|_| ())
    }

    /// Conditional update; PostgREST returns the rows it actually changed.
    async fn try_claim(&self, id: i64) -> Result<bool> {
        let req = self
            .request(reqwest::Method::PATCH, &self.tables.commands)
            .query(&[
                ("id", format!("eq.{id}")),
                ("status", "eq.PENDING".to_string()),
            ])
            .header("Prefer", "return=representation")
            .json(&json!({
                "status": CommandStatus::Processing,
                "processed_at": Utc::now(),
            }));
        // only the row count matters here
        let rows: Vec<serde_json::Value> = Self::send_json(req).await?;
        Ok(!rows.is_empty())
    }

    async fn try_enqueue(&self, kind: &CommandKind) -> Result<Option<Command>> {
        let req = self
            .request(reqwest::Method::POST, &self.tables.commands)
            .header("Prefer", "return=representation")
            .json(&json!({ "command": kind.as_str(), "status": CommandStatus::Pending }));
        let rows: Vec<Command> = Self::send_rows(req, &self.tables.commands).await?;
        Ok(rows.into_iter().next())
    }
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<serde_json::Value>, table: &str) -> Vec<T> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.get("id").cloned().unwrap_or_default();
        match serde_json::from_value::<T>(row) {
            Ok(v) => out.push(v),
            Err(e) => {
                counter!("monitor_store_rows_skipped_total", "table" => table.to_string())
                    .increment(1);
                warn!(table, %id, error = %e, "skipping undecodable row");
            }
        }
    }
    out
}

#[async_trait]
impl Store for SupabaseStore {
    async fn save_record(&self, record: &CanonicalRecord) -> Option<String> {
        let row = RecordRow::from_record(record);
        match self.try_save(&row).await {
            Ok(()) => {
                counter!("monitor_records_saved_total").increment(1);
                debug!(key = %row.id, "record upserted");
                Some(row.id)
            }
            Err(e) => {
                error!(key = %row.id, error = %e, "Error saving tweet");
                None
            }
        }
    }

    async fn query_records(&self, query: &RecordQuery) -> Vec<CanonicalRecord> {
        match self.try_query(query).await {
            Ok(rows) => rows.into_iter().map(RecordRow::into_record).collect(),
            Err(e) => {
                error!(error = %e, "Error fetching tweets");
                Vec::new()
            }
        }
    }

    async fn append_log(&self, message: &str, level: LogLevel) {
        if let Err(e) = self.try_append_log(message, level).await {
            error!(error = %e, level = level.as_str(), message, "Failed to write to system log");
        }
    }

    async fn recent_logs(&self, limit: usize) -> Vec<LogEntry> {
        self.try_recent_logs(limit).await.unwrap_or_else(|e| {
            error!(error = %e, "Error fetching logs");
            Vec::new()
        })
    }

    async fn pending_commands(&self) -> Vec<Command> {
        self.try_pending().await.unwrap_or_else(|e| {
            error!(error = %e, "Error fetching commands");
            Vec::new()
        })
    }

    async fn set_command_status(&self, id: i64, status: CommandStatus) {
        if let Err(e) = self.try_set_status(id, status).await {
            error!(id, %status, error = %e, "Error updating command status");
        }
    }

    async fn claim_command(&self, id: i64) -> bool {
        self.try_claim(id).await.unwrap_or_else(|e| {
            error!(id, error = %e, "Error claiming command");
            false
        })
    }

    async fn enqueue_command(&self, kind: CommandKind) -> Option<Command> {
        self.try_enqueue(&kind).await.unwrap_or_else(|e| {
            error!(command = kind.as_str(), error = %e, "Error enqueuing command");
            None
        })
    }

    fn backend(&self) -> &'static str {
        "supabase"
    }
}
