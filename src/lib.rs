// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod api;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod monitor;
pub mod store;

pub use analyze::ai_adapter;
pub use crate::api::router;
pub use crate::monitor::{JobReport, Monitor, MonitorSettings};

use tracing::{info, warn};

use crate::config::SourceConfig;
use crate::ingest::Collector;

/// Query used by the collector smoke check.
pub const PROBE_QUERY: &str = "BMSG";

/// One-off smoke test of the source adapter: fetch a few posts and log them.
/// Returns how many posts came back; zero is logged, not an error.
pub async fn run_source_probe(cfg: &SourceConfig) -> anyhow::Result<usize> {
    let collector = Collector::from_config(cfg)?;
    info!(
        client = collector.client_name(),
        endpoints = collector.endpoints().len(),
        "source probe starting"
    );
    let posts = collector.fetch(PROBE_QUERY, 3).await;
    if posts.is_empty() {
        warn!(query = PROBE_QUERY, "probe returned no posts");
    }
    for p in &posts {
        info!(
            id = p.id.as_deref().unwrap_or("-"),
            user = p.author.username.as_deref().unwrap_or("-"),
            "{}",
            p.text
        );
    }
    info!(count = posts.len(), "source probe finished");
    Ok(posts.len())
}
