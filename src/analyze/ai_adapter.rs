//! AI adapter: completion-provider abstraction + risk scoring of collected posts.
//!
//! The provider is a black box (prompt in, text out). Everything about the
//! expected JSON shape lives here, and every failure collapses to `None`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::ai::{ScoringConfig, ScoringProvider};
use crate::ingest::types::CanonicalRecord;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// Structured result of the scoring service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskAssessment {
    /// -1.0 (negative) ..= 1.0 (positive)
    pub sentiment: f64,
    pub aggression: u8,
    pub spread_risk: u8,
    pub legal_risk: u8,
    pub risk_score: u8,
    pub reason: String,
}

impl RiskAssessment {
    pub fn validate(&self) -> Result<(), ScoreError> {
        if !self.sentiment.is_finite() || !(-1.0..=1.0).contains(&self.sentiment) {
            return Err(ScoreError::OutOfRange {
                field: "sentiment",
                value: self.sentiment,
            });
        }
        for (field, v) in [
            ("aggression", self.aggression),
            ("spread_risk", self.spread_risk),
            ("legal_risk", self.legal_risk),
            ("risk_score", self.risk_score),
        ] {
            if v > 10 {
                return Err(ScoreError::OutOfRange {
                    field,
                    value: f64::from(v),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("provider call failed: {0}")]
    Provider(String),
    #[error("empty response")]
    Empty,
    #[error("response is not a valid assessment: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("field `{field}` out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

/// Low-level provider: does a *real* remote call. Separated so the same
/// analyzer runs against production and test providers.
pub trait CompletionProvider: Send + Sync + 'static {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
    fn name(&self) -> &'static str;
}

// ------------------------------------------------------------
// Prompt + response parsing
// ------------------------------------------------------------

/// Build the scoring request for one post.
pub fn build_prompt(record: &CanonicalRecord, language: &str, subject: &str) -> String {
    let username = record.author.username.as_deref().unwrap_or("unknown");
    let followers = record.author.followers.unwrap_or(0);
    format!(
        r#"Assess the following social media post for reputational risk to {subject}.

Author: @{username} (followers: {followers})
Post: "{text}"

Score it on these scales:
- sentiment: -1.0 (very negative) to 1.0 (very positive)
- aggression: integer 0-10
- spread_risk: integer 0-10 (likelihood of going viral)
- legal_risk: integer 0-10 (defamation, threats, privacy)
- risk_score: integer 0-10 (overall)

Write the "reason" field in {language}.

Reply with a single JSON object only, no code fences and no other text:
{{"sentiment": 0.0, "aggression": 0, "spread_risk": 0, "legal_risk": 0, "risk_score": 0, "reason": "..."}}"#,
        text = record.text,
    )
}

/// Remove an optional Markdown code fence (```` ``` ```` or ```` ```json ````) around a reply.
pub fn strip_code_fence(raw: &str) -> &str {
    let t = raw.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    // Info string ("json") runs up to the first newline.
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest.trim_start_matches("json"),
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Strict parse: exact field set, all required, ranges checked.
pub fn parse_assessment(raw: &str) -> Result<RiskAssessment, ScoreError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(ScoreError::Empty);
    }
    let assessment: RiskAssessment = serde_json::from_str(body)?;
    assessment.validate()?;
    Ok(assessment)
}

// ------------------------------------------------------------
// Analyzer
// ------------------------------------------------------------

/// Scores records one at a time with a fixed rate-limit pause before each call.
pub struct RiskAnalyzer {
    provider: Option<Box<dyn CompletionProvider>>,
    delay: Duration,
    language: String,
    subject: String,
}

impl RiskAnalyzer {
    pub fn new<P: CompletionProvider>(provider: P, cfg: &ScoringConfig) -> Self {
        Self {
            provider: Some(Box::new(provider)),
            delay: cfg.delay,
            language: cfg.language.clone(),
            subject: cfg.subject.clone(),
        }
    }

    /// Every call returns `None` without touching the network.
    pub fn disabled() -> Self {
        let cfg = ScoringConfig::default();
        Self {
            provider: None,
            delay: Duration::ZERO,
            language: cfg.language,
            subject: cfg.subject,
        }
    }

    /// Factory: build an analyzer according to config.
    ///
    /// * `test_mode_mock` → deterministic mock provider.
    /// * no API key → disabled analyzer (dry run).
    /// * otherwise the configured remote provider.
    pub fn from_config(cfg: &ScoringConfig) -> Result<Self> {
        if cfg.test_mode_mock {
            info!("RiskAnalyzer initialized with mock provider");
            return Ok(Self::new(MockProvider::neutral(), cfg));
        }
        let Some(key) = cfg.api_key.clone() else {
            warn!(
                provider = cfg.provider.as_str(),
                "scoring API key not found, analysis will be skipped"
            );
            return Ok(Self::disabled());
        };
        let analyzer = match cfg.provider {
            ScoringProvider::Gemini => Self::new(GeminiProvider::new(key, cfg)?, cfg),
            ScoringProvider::OpenAi => Self::new(OpenAiProvider::new(key, cfg)?, cfg),
        };
        info!(provider = analyzer.provider_name(), "RiskAnalyzer initialized");
        Ok(analyzer)
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.as_ref().map(|p| p.name()).unwrap_or("disabled")
    }

    /// One provider call per record; any failure is logged and yields `None`.
    pub async fn score(&self, record: &CanonicalRecord) -> Option<RiskAssessment> {
        let provider = self.provider.as_ref()?;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let prompt = build_prompt(record, &self.language, &self.subject);
        let result = match provider.complete(&prompt).await {
            Ok(reply) => parse_assessment(&reply),
            Err(e) => Err(ScoreError::Provider(format!("{e:#}"))),
        };

        match result {
            Ok(assessment) => Some(assessment),
            Err(e) => {
                counter!("monitor_scoring_failures_total").increment(1);
                error!(
                    provider = provider.name(),
                    id = record.id.as_deref().unwrap_or("-"),
                    error = %e,
                    "Error analyzing text"
                );
                None
            }
        }
    }
}

// ------------------------------------------------------------
// Concrete providers
// ------------------------------------------------------------

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("sns-risk-monitor/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(4))
        .timeout(timeout)
        .build()
        .context("building scoring http client")
}

/// Google Gemini `generateContent`. Requires `GEMINI_API_KEY`.
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com/v1beta";
    pub const DEFAULT_MODEL: &'static str = "gemini-pro";

    pub fn new(api_key: String, cfg: &ScoringConfig) -> Result<Self> {
        Ok(Self {
            http: http_client(cfg.request_timeout)?,
            api_key,
            model: cfg
                .model
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
            base_url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
        })
    }

    async fn complete_impl(&self, prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }
        #[derive(Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            contents: Vec<Content<'a>>,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            candidates: Vec<Candidate>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: CandidateContent,
        }
        #[derive(Deserialize)]
        struct CandidateContent {
            #[serde(default)]
            parts: Vec<RespPart>,
        }
        #[derive(Deserialize)]
        struct RespPart {
            #[serde(default)]
            text: String,
        }

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let req = Req {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&req)
            .send()
            .await
            .context("gemini request")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("gemini returned HTTP {status}: {body}");
        }
        let body: Resp = resp.json().await.context("gemini response body")?;
        let text = body
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<String>()
            })
            .ok_or_else(|| anyhow!("gemini returned no candidates"))?;
        Ok(text)
    }
}

impl CompletionProvider for GeminiProvider {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.complete_impl(prompt))
    }
    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// OpenAI chat completions. Requires `OPENAI_API_KEY`.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";

    pub fn new(api_key: String, cfg: &ScoringConfig) -> Result<Self> {
        Ok(Self {
            http: http_client(cfg.request_timeout)?,
            api_key,
            model: cfg
                .model
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
            base_url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
        })
    }

    async fn complete_impl(&self, prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature: 0.2,
        };

        let resp = self
            .http
            .post(format!(
                "{}/chat/completions",
                self.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("openai request")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("openai returned HTTP {status}: {body}");
        }
        let body: Resp = resp.json().await.context("openai response body")?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("openai returned no choices"))
    }
}

impl CompletionProvider for OpenAiProvider {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.complete_impl(prompt))
    }
    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Fixed reply for tests/local runs.
#[derive(Clone)]
pub struct MockProvider {
    pub reply: String,
}

impl MockProvider {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }

    pub fn neutral() -> Self {
        Self::new(
            r#"{"sentiment": 0.0, "aggression": 0, "spread_risk": 0, "legal_risk": 0, "risk_score": 0, "reason": "Neutral (mock)"}"#,
        )
    }
}

impl CompletionProvider for MockProvider {
    fn complete<'a>(
        &'a self,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        let out = self.reply.clone();
        Box::pin(async move { Ok(out) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const PLAIN: &str = r#"{"sentiment": -0.4, "aggression": 6, "spread_risk": 3, "legal_risk": 1, "risk_score": 5, "reason": "攻撃的な表現"}"#;

    #[test]
    fn fence_variants_strip_to_body() {
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("```json{}```"), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
    }

    #[test]
    fn strict_parse_accepts_exact_shape() {
        let a = parse_assessment(PLAIN).unwrap();
        assert_eq!(a.risk_score, 5);
        assert_eq!(a.reason, "攻撃的な表現");
    }

    #[test]
    fn strict_parse_fails_closed() {
        // missing field
        assert!(parse_assessment(r#"{"sentiment": 0.1, "reason": "x"}"#).is_err());
        // extra field
        let extra = PLAIN.replace("\"reason\"", "\"extra\": 1, \"reason\"");
        assert!(parse_assessment(&extra).is_err());
        // wrong type
        let typed = PLAIN.replace("\"aggression\": 6", "\"aggression\": \"high\"");
        assert!(parse_assessment(&typed).is_err());
        // out of range
        let big = PLAIN.replace("\"risk_score\": 5", "\"risk_score\": 11");
        assert!(matches!(
            parse_assessment(&big),
            Err(ScoreError::OutOfRange { field: "risk_score", .. })
        ));
        let senti = PLAIN.replace("-0.4", "-1.5");
        assert!(parse_assessment(&senti).is_err());
        // empty
        assert!(matches!(parse_assessment("```\n```"), Err(ScoreError::Empty)));
    }

    #[test]
    fn prompt_carries_author_followers_and_language() {
        let mut rec = CanonicalRecord::new("neutral post", Utc::now());
        rec.author.username = Some("u1".into());
        rec.author.followers = Some(10);
        let p = build_prompt(&rec, "Japanese", "BMSG");
        assert!(p.contains("@u1 (followers: 10)"));
        assert!(p.contains("\"neutral post\""));
        assert!(p.contains("in Japanese"));
        for field in ["sentiment", "aggression", "spread_risk", "legal_risk", "risk_score", "reason"] {
            assert!(p.contains(field), "prompt misses {field}");
        }

        let anon = CanonicalRecord::new("x", Utc::now());
        assert!(build_prompt(&anon, "English", "BMSG").contains("@unknown (followers: 0)"));
    }
}
