use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "monitor_fetch_attempts_total",
            "Source endpoint attempts (one per candidate tried)."
        );
        describe_counter!(
            "monitor_fetch_failures_total",
            "Endpoint attempts that failed or came back empty."
        );
        describe_counter!(
            "monitor_items_skipped_total",
            "Raw items dropped by normalization."
        );
        describe_counter!("monitor_records_saved_total", "Records upserted to the store.");
        describe_counter!(
            "monitor_store_rows_skipped_total",
            "Stored rows that could not be decoded, by table."
        );
        describe_counter!(
            "monitor_scoring_failures_total",
            "Scoring calls that produced no assessment."
        );
        describe_counter!(
            "monitor_keyword_errors_total",
            "Keywords whose processing failed inside a job."
        );
        describe_counter!("monitor_commands_total", "Inbox commands handled, by outcome.");
        describe_histogram!("monitor_feed_parse_ms", "RSS feed parse time in milliseconds.");
        describe_gauge!(
            "monitor_job_last_run_ts",
            "Unix ts when the keyword job last finished."
        );
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Call once per process.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_described();
        Ok(Self { handle })
    }
}
