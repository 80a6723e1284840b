// src/monitor.rs
//! Orchestrator: the keyword job, the command inbox and the two run modes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::analyze::ai_adapter::RiskAnalyzer;
use crate::config::MonitorConfig;
use crate::ingest::scheduler::JobSchedule;
use crate::ingest::types::PostSource;
use crate::ingest::Collector;
use crate::store::{Command, CommandKind, CommandStatus, LogLevel, Store};

#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub poll_interval: Duration,
    pub fetch_count: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30 * 60),
            poll_interval: Duration::from_secs(2),
            fetch_count: 20,
        }
    }
}

/// Counts from one pass over the keyword list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub keywords_ok: usize,
    pub keywords_failed: usize,
    pub found: usize,
    pub scored: usize,
    pub saved: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Completed,
    Failed,
    /// Another worker claimed it first.
    Skipped,
}

#[derive(Clone)]
pub struct Monitor {
    keywords: Arc<Vec<String>>,
    source: Arc<dyn PostSource>,
    analyzer: Arc<RiskAnalyzer>,
    store: Arc<dyn Store>,
    settings: MonitorSettings,
}

impl Monitor {
    pub fn new(
        keywords: Vec<String>,
        source: Arc<dyn PostSource>,
        analyzer: Arc<RiskAnalyzer>,
        store: Arc<dyn Store>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            keywords: Arc::new(keywords),
            source,
            analyzer,
            store,
            settings,
        }
    }

    /// Wire the production components. The store is passed in so the status
    /// API can share it.
    pub fn from_config(cfg: &MonitorConfig, store: Arc<dyn Store>) -> Result<Self> {
        let collector = Collector::from_config(&cfg.source)?;
        let analyzer = RiskAnalyzer::from_config(&cfg.scoring)?;
        Ok(Self::new(
            cfg.keywords.clone(),
            Arc::new(collector),
            Arc::new(analyzer),
            store,
            MonitorSettings {
                interval: cfg.interval,
                poll_interval: cfg.poll_interval,
                fetch_count: cfg.fetch_count,
            },
        ))
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn settings(&self) -> MonitorSettings {
        self.settings
    }

    pub fn store(&self) -> Arc<dyn Store> {
        Arc::clone(&self.store)
    }

    /// tracing + the store's log table.
    async fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info => info!("{message}"),
            LogLevel::Warning => warn!("{message}"),
            LogLevel::Error => error!("{message}"),
        }
        self.store.append_log(message, level).await;
    }

    /// Collect, score and save every keyword once. A failing keyword is logged
    /// and the job moves on.
    pub async fn run_keyword_job(&self) -> JobReport {
        crate::metrics::ensure_described();
        self.log(LogLevel::Info, "Starting keyword monitor job").await;

        let mut report = JobReport::default();
        for keyword in self.keywords.iter() {
            self.log(LogLevel::Info, &format!("Searching for: {keyword}"))
                .await;
            match self.process_keyword(keyword, &mut report).await {
                Ok(()) => report.keywords_ok += 1,
                Err(e) => {
                    report.keywords_failed += 1;
                    counter!("monitor_keyword_errors_total").increment(1);
                    self.log(
                        LogLevel::Error,
                        &format!("Error processing keyword '{keyword}': {e:#}"),
                    )
                    .await;
                }
            }
        }

        gauge!("monitor_job_last_run_ts").set(Utc::now().timestamp() as f64);
        self.log(LogLevel::Info, "Keyword monitor job completed").await;
        report
    }

    async fn process_keyword(&self, keyword: &str, report: &mut JobReport) -> Result<()> {
        let records = self
            .source
            .fetch_posts(keyword, self.settings.fetch_count)
            .await?;
        report.found += records.len();
        self.log(
            LogLevel::Info,
            &format!("Found {} tweets for '{keyword}'", records.len()),
        )
        .await;

        for mut record in records {
            if let Some(assessment) = self.analyzer.score(&record).await {
                record.attach_assessment(assessment);
                report.scored += 1;
            }
            match self.store.save_record(&record).await {
                Some(key) => {
                    report.saved += 1;
                    info!(keyword, risk_score = ?record.risk_score(), "Saved tweet: {key}");
                }
                None => info!(keyword, "Processed tweet (Dry Run): {}", record.storage_key()),
            }
        }
        Ok(())
    }

    /// Runs on its own task so a panicking job fails the command instead of the loop.
    async fn execute(&self, kind: &CommandKind) -> Result<JobReport> {
        match kind {
            CommandKind::RunNow => {
                let me = self.clone();
                tokio::spawn(async move { me.run_keyword_job().await })
                    .await
                    .map_err(|e| anyhow!("keyword job aborted: {e}"))
            }
            CommandKind::Unsupported(other) => bail!("Unsupported command: {other}"),
        }
    }

    pub async fn handle_command(&self, cmd: &Command) -> CommandOutcome {
        let kind = cmd.kind();
        if !self.store.claim_command(cmd.id).await {
            warn!(id = cmd.id, command = %cmd.command, "command already claimed, skipping");
            return CommandOutcome::Skipped;
        }
        info!(id = cmd.id, "Received command: {}", cmd.command);
        self.store
            .append_log(&format!("Received command: {}", cmd.command), LogLevel::Info)
            .await;

        match self.execute(&kind).await {
            Ok(_) => {
                self.store
                    .set_command_status(cmd.id, CommandStatus::Completed)
                    .await;
                counter!("monitor_commands_total", "outcome" => "completed").increment(1);
                self.log(LogLevel::Info, "Manual run completed successfully.")
                    .await;
                CommandOutcome::Completed
            }
            Err(e) => {
                self.store
                    .set_command_status(cmd.id, CommandStatus::Failed)
                    .await;
                counter!("monitor_commands_total", "outcome" => "failed").increment(1);
                let msg = match kind {
                    CommandKind::RunNow => format!("Manual run failed: {e:#}"),
                    CommandKind::Unsupported(_) => format!("{e:#}"),
                };
                self.log(LogLevel::Error, &msg).await;
                CommandOutcome::Failed
            }
        }
    }

    /// One pass over the inbox, oldest first.
    pub async fn poll_commands_once(&self) -> Vec<(i64, CommandOutcome)> {
        let mut out = Vec::new();
        for cmd in self.store.pending_commands().await {
            let outcome = self.handle_command(&cmd).await;
            out.push((cmd.id, outcome));
        }
        out
    }

    /// One loop iteration: commands first, then the schedule.
    pub async fn tick(&self, schedule: &mut JobSchedule) {
        self.poll_commands_once().await;
        if schedule.is_due(Instant::now()) {
            self.run_keyword_job().await;
            schedule.mark_ran(Instant::now());
        }
    }

    /// ONE-SHOT mode.
    pub async fn run_once(&self) -> JobReport {
        self.log(LogLevel::Info, "Running in ONE-SHOT mode").await;
        let report = self.run_keyword_job().await;
        self.log(LogLevel::Info, "ONE-SHOT execution completed")
            .await;
        report
    }

    /// Continuous mode; never returns.
    pub async fn run_forever(&self) {
        self.log(
            LogLevel::Info,
            "Backend Scheduler STARTED. Listening for commands...",
        )
        .await;
        info!(
            keywords = ?self.keywords,
            interval_secs = self.settings.interval.as_secs(),
            store = self.store.backend(),
            analyzer = self.analyzer.provider_name(),
            "monitor running"
        );

        self.run_keyword_job().await;
        let mut schedule = JobSchedule::every(self.settings.interval);

        loop {
            self.tick(&mut schedule).await;
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}
