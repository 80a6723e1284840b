// src/config/mod.rs
//! Process configuration, read once from the environment (after `.env` is loaded).

pub mod ai;

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::warn;

use crate::ingest::config::{load_keywords_files, parse_keyword_list, ENV_KEYWORDS_PATH};
pub use ai::{ScoringConfig, ScoringProvider};

pub const DEFAULT_KEYWORDS: &[&str] = &["BMSG", "SKY-HI"];

/// Mirrors tried in order after the random pool pick.
pub const DEFAULT_FALLBACK_INSTANCES: &[&str] = &[
    "https://nitter.privacydev.net",
    "https://nitter.poast.org",
    "https://nitter.lucabased.xyz",
    "https://nitter.net",
];

#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Backs the random first attempt.
    pub instance_pool: Vec<String>,
    pub fallback_instances: Vec<String>,
    pub politeness_min: Duration,
    pub politeness_max: Duration,
    pub request_timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        let defaults: Vec<String> = DEFAULT_FALLBACK_INSTANCES
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self {
            instance_pool: defaults.clone(),
            fallback_instances: defaults,
            politeness_min: Duration::from_millis(1000),
            politeness_max: Duration::from_millis(3000),
            request_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Supabase,
    Memory,
}

impl StoreBackend {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "supabase" => Ok(Self::Supabase),
            "memory" => Ok(Self::Memory),
            other => bail!("Unsupported STORE_BACKEND: {other}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreTables {
    pub records: String,
    pub logs: String,
    pub commands: String,
}

impl Default for StoreTables {
    fn default() -> Self {
        Self {
            records: "tweets".into(),
            logs: "system_logs".into(),
            commands: "system_commands".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub tables: StoreTables,
    pub request_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Supabase,
            supabase_url: None,
            supabase_key: None,
            tables: StoreTables::default(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub keywords: Vec<String>,
    pub interval: Duration,
    pub poll_interval: Duration,
    pub fetch_count: usize,
    pub source: SourceConfig,
    pub scoring: ScoringConfig,
    pub store: StoreConfig,
    pub http_addr: Option<SocketAddr>,
}

impl MonitorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let keywords = resolve_keywords(&get)?;

        let src_default = SourceConfig::default();
        let source = SourceConfig {
            instance_pool: env_list(&get, "NITTER_INSTANCE_POOL")
                .unwrap_or(src_default.instance_pool),
            fallback_instances: env_list(&get, "NITTER_FALLBACK_INSTANCES")
                .unwrap_or(src_default.fallback_instances),
            politeness_min: env_millis(&get, "POLITENESS_MIN_MS", src_default.politeness_min),
            politeness_max: env_millis(&get, "POLITENESS_MAX_MS", src_default.politeness_max),
            request_timeout: env_millis(&get, "NITTER_TIMEOUT_MS", src_default.request_timeout),
        };

        let store = StoreConfig {
            backend: StoreBackend::parse(&get("STORE_BACKEND").unwrap_or_default())?,
            supabase_url: non_empty(get("SUPABASE_URL")),
            supabase_key: non_empty(get("SUPABASE_KEY")),
            tables: StoreTables {
                records: non_empty(get("SUPABASE_RECORDS_TABLE"))
                    .unwrap_or_else(|| StoreTables::default().records),
                logs: non_empty(get("SUPABASE_LOGS_TABLE"))
                    .unwrap_or_else(|| StoreTables::default().logs),
                commands: non_empty(get("SUPABASE_COMMANDS_TABLE"))
                    .unwrap_or_else(|| StoreTables::default().commands),
            },
            request_timeout: env_millis(
                &get,
                "SUPABASE_TIMEOUT_MS",
                StoreConfig::default().request_timeout,
            ),
        };

        let http_addr = match non_empty(get("MONITOR_HTTP_ADDR")) {
            Some(a) => Some(
                a.parse::<SocketAddr>()
                    .with_context(|| format!("MONITOR_HTTP_ADDR is not a socket address: {a}"))?,
            ),
            None => None,
        };

        let interval_min = env_u64(&get, "MONITOR_INTERVAL_MINUTES", 30).max(1);
        let poll_secs = env_u64(&get, "MONITOR_POLL_SECS", 2).max(1);

        Ok(Self {
            keywords,
            interval: Duration::from_secs(interval_min * 60),
            poll_interval: Duration::from_secs(poll_secs),
            fetch_count: env_u64(&get, "MONITOR_FETCH_COUNT", 20) as usize,
            source,
            scoring: ScoringConfig::from_lookup(&get)?,
            store,
            http_addr,
        })
    }
}

/// `MONITOR_KEYWORDS` wins, then `MONITOR_KEYWORDS_PATH`, then the repo config files,
/// then the built-in list. A configured source that yields nothing is an error.
fn resolve_keywords(get: &impl Fn(&str) -> Option<String>) -> Result<Vec<String>> {
    if let Some(list) = get("MONITOR_KEYWORDS") {
        let v = parse_keyword_list(&list);
        if v.is_empty() {
            bail!("MONITOR_KEYWORDS is set but contains no keywords");
        }
        return Ok(v);
    }
    let path = non_empty(get(ENV_KEYWORDS_PATH));
    let v = load_keywords_files(path.as_deref().map(Path::new))?;
    if !v.is_empty() {
        return Ok(v);
    }
    Ok(DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect())
}

// ---- env helpers (shared with `ai`) ----

pub(crate) fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub(crate) fn env_u64(get: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    match non_empty(get(key)) {
        None => default,
        Some(raw) => raw.parse::<u64>().unwrap_or_else(|_| {
            warn!(key, value = %raw, default, "invalid number in env, using default");
            default
        }),
    }
}

pub(crate) fn env_millis(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    Duration::from_millis(env_u64(get, key, default.as_millis() as u64))
}

fn env_list(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Vec<String>> {
    let v: Vec<String> = non_empty(get(key))?
        .split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (!v.is_empty()).then_some(v)
}
