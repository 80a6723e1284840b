// src/config/ai.rs
use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::{env_millis, non_empty};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScoringProvider {
    #[default]
    Gemini,
    OpenAi,
}

impl ScoringProvider {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            other => bail!("Unsupported scoring provider: {other}"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
        }
    }

    /// Env var holding the credential for this provider.
    pub fn key_var(&self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }
}

/// Risk scoring settings. A missing key means scoring is skipped (dry run).
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub provider: ScoringProvider,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Pause before every provider call (rate limiting).
    pub delay: Duration,
    pub request_timeout: Duration,
    /// Language of the `reason` field.
    pub language: String,
    /// Who the risk is assessed for.
    pub subject: String,
    /// `AI_TEST_MODE=mock`
    pub test_mode_mock: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            provider: ScoringProvider::Gemini,
            api_key: None,
            model: None,
            base_url: None,
            delay: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(30),
            language: "Japanese".to_string(),
            subject: "BMSG and its artists".to_string(),
            test_mode_mock: false,
        }
    }
}

impl ScoringConfig {
    pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let d = Self::default();
        let provider = ScoringProvider::parse(&get("SCORING_PROVIDER").unwrap_or_default())?;
        let model = match provider {
            ScoringProvider::Gemini => non_empty(get("GEMINI_MODEL")),
            ScoringProvider::OpenAi => non_empty(get("OPENAI_MODEL")),
        };
        Ok(Self {
            provider,
            api_key: non_empty(get(provider.key_var())),
            model,
            base_url: non_empty(get("SCORING_BASE_URL")),
            delay: env_millis(&get, "SCORING_DELAY_MS", d.delay),
            request_timeout: env_millis(&get, "SCORING_TIMEOUT_MS", d.request_timeout),
            language: non_empty(get("SCORING_REASON_LANGUAGE")).unwrap_or(d.language),
            subject: non_empty(get("SCORING_SUBJECT")).unwrap_or(d.subject),
            test_mode_mock: get("AI_TEST_MODE")
                .map(|v| v.trim().eq_ignore_ascii_case("mock"))
                .unwrap_or(false),
        })
    }
}
