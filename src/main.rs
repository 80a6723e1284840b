//! SNS Risk Monitor binary entrypoint.
//! Collects keyword posts from Nitter mirrors, scores them, stores them, and
//! listens for dashboard commands.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sns_risk_monitor::api::{self, AppState};
use sns_risk_monitor::config::MonitorConfig;
use sns_risk_monitor::metrics::Metrics;
use sns_risk_monitor::store::store_from_config;
use sns_risk_monitor::{run_source_probe, Monitor};

#[derive(Parser)]
#[command(name = "sns-risk-monitor", about = "Keyword risk monitor for social posts")]
struct Cli {
    /// Run the keyword job once and exit
    #[arg(long)]
    once: bool,

    /// Fetch a few posts through the source adapter and exit
    #[arg(long, conflicts_with = "once")]
    probe: bool,

    /// Serve the status API on this address (continuous mode only)
    #[arg(long, env = "MONITOR_HTTP_ADDR")]
    http: Option<SocketAddr>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let cfg = MonitorConfig::from_env()?;

    if cli.probe {
        let n = run_source_probe(&cfg.source).await?;
        info!(posts = n, "probe done");
        return Ok(());
    }

    let store = store_from_config(&cfg.store)?;
    let monitor = Monitor::from_config(&cfg, store.clone())?;

    if cli.once {
        let report = monitor.run_once().await;
        info!(?report, "one-shot report");
        return Ok(());
    }

    if let Some(addr) = cli.http.or(cfg.http_addr) {
        let metrics = Metrics::init()?;
        let app = api::router(AppState {
            store,
            metrics: Some(metrics.handle),
        });
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding status API on {addr}"))?;
        info!(%addr, "status API listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "status API stopped");
            }
        });
    }

    monitor.run_forever().await;
    Ok(())
}
