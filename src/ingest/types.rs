// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::analyze::ai_adapter::RiskAssessment;

/// Prefix of storage keys derived from content when a post has no id.
pub const HASH_KEY_PREFIX: &str = "h-";

/// One raw post as handed over by a source client. Its shape is not trusted.
pub type RawItem = serde_json::Value;

/// Where a single fetch attempt goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Let the source client pick a mirror from its pool.
    Random,
    /// A specific mirror base URL, e.g. `https://nitter.net`.
    Instance(String),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Random => f.write_str("Random"),
            Endpoint::Instance(url) => f.write_str(url),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Term,
    Hashtag,
    User,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchMode::Term => "term",
            SearchMode::Hashtag => "hashtag",
            SearchMode::User => "user",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub mode: SearchMode,
    /// Desired number of posts; 0 means "whatever the endpoint returns".
    pub count: usize,
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
}

impl SearchRequest {
    pub fn term(query: impl Into<String>, count: usize) -> Self {
        Self {
            query: query.into(),
            mode: SearchMode::Term,
            count,
            since: None,
            until: None,
        }
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn between(mut self, since: Option<NaiveDate>, until: Option<NaiveDate>) -> Self {
        self.since = since;
        self.until = until;
        self
    }
}

/// Result of one endpoint attempt. The fallback loop branches on the tag.
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(Vec<RawItem>),
    Empty,
    Failure(anyhow::Error),
}

impl AttemptOutcome {
    /// An empty list counts as `Empty`, never as `Success`.
    pub fn from_result(res: Result<Vec<RawItem>>) -> Self {
        match res {
            Ok(items) if items.is_empty() => AttemptOutcome::Empty,
            Ok(items) => AttemptOutcome::Success(items),
            Err(e) => AttemptOutcome::Failure(e),
        }
    }
}

/// Low-level access to the source network: one request against one endpoint.
#[async_trait::async_trait]
pub trait SourceClient: Send + Sync {
    async fn fetch(&self, endpoint: &Endpoint, req: &SearchRequest) -> AttemptOutcome;
    fn name(&self) -> &'static str;
}

/// What the orchestrator consumes: posts for a keyword.
#[async_trait::async_trait]
pub trait PostSource: Send + Sync {
    async fn fetch_posts(&self, query: &str, count: usize) -> Result<Vec<CanonicalRecord>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub followers: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub replies: Option<u64>,
    pub retweets: Option<u64>,
    pub quotes: Option<u64>,
    pub likes: Option<u64>,
}

/// A normalized post flowing through collect → score → persist.
///
/// Only the risk assessment (and the score derived from it) can change after
/// construction, and only once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub id: Option<String>,
    pub url: Option<String>,
    pub text: String,
    pub published_at: Option<String>,
    pub author: Author,
    pub engagement: Engagement,
    pub collected_at: DateTime<Utc>,
    risk_assessment: Option<RiskAssessment>,
    risk_score: Option<u8>,
}

impl CanonicalRecord {
    pub fn new(text: impl Into<String>, collected_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            url: None,
            text: text.into(),
            published_at: None,
            author: Author::default(),
            engagement: Engagement::default(),
            collected_at,
            risk_assessment: None,
            risk_score: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_published_at(mut self, published_at: impl Into<String>) -> Self {
        self.published_at = Some(published_at.into());
        self
    }

    pub fn with_author(mut self, author: Author) -> Self {
        self.author = author;
        self
    }

    pub fn with_engagement(mut self, engagement: Engagement) -> Self {
        self.engagement = engagement;
        self
    }

    /// Attach the scoring result. Returns `false` (and keeps the first one)
    /// if an assessment is already present.
    pub fn attach_assessment(&mut self, assessment: RiskAssessment) -> bool {
        if self.risk_assessment.is_some() {
            return false;
        }
        self.risk_score = Some(assessment.risk_score);
        self.risk_assessment = Some(assessment);
        true
    }

    pub fn risk_assessment(&self) -> Option<&RiskAssessment> {
        self.risk_assessment.as_ref()
    }

    pub fn risk_score(&self) -> Option<u8> {
        self.risk_score
    }

    /// Key used for upserts: the post id, or a content hash when the id is unknown.
    pub fn storage_key(&self) -> String {
        if let Some(id) = self.id.as_deref().filter(|s| !s.is_empty()) {
            return id.to_string();
        }
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        for part in [
            self.url.as_deref().unwrap_or_default(),
            self.author.username.as_deref().unwrap_or_default(),
            self.published_at.as_deref().unwrap_or_default(),
            self.text.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0x1f]);
        }
        let digest = hasher.finalize();
        let mut out = String::with_capacity(HASH_KEY_PREFIX.len() + 16);
        out.push_str(HASH_KEY_PREFIX);
        for b in digest.iter().take(8) {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(score: u8) -> RiskAssessment {
        RiskAssessment {
            sentiment: -0.2,
            aggression: 1,
            spread_risk: 2,
            legal_risk: 0,
            risk_score: score,
            reason: "test".into(),
        }
    }

    #[test]
    fn assessment_attaches_once() {
        let mut r = CanonicalRecord::new("hello", Utc::now()).with_id("1");
        assert!(r.attach_assessment(assessment(3)));
        assert!(!r.attach_assessment(assessment(9)));
        assert_eq!(r.risk_score(), Some(3));
        assert_eq!(r.risk_assessment().map(|a| a.risk_score), Some(3));
    }

    #[test]
    fn storage_key_prefers_id_and_hashes_otherwise() {
        let now = Utc::now();
        let with_id = CanonicalRecord::new("x", now).with_id("42");
        assert_eq!(with_id.storage_key(), "42");

        let a = CanonicalRecord::new("same text", now).with_published_at("Mon");
        let b = CanonicalRecord::new("same text", Utc::now()).with_published_at("Mon");
        assert!(a.storage_key().starts_with(HASH_KEY_PREFIX));
        // collected_at does not take part in the key
        assert_eq!(a.storage_key(), b.storage_key());

        let c = CanonicalRecord::new("other text", now).with_published_at("Mon");
        assert_ne!(a.storage_key(), c.storage_key());
    }

    #[test]
    fn empty_outcome_is_not_success() {
        assert!(matches!(
            AttemptOutcome::from_result(Ok(vec![])),
            AttemptOutcome::Empty
        ));
        assert!(matches!(
            AttemptOutcome::from_result(Ok(vec![serde_json::json!({})])),
            AttemptOutcome::Success(_)
        ));
        assert!(matches!(
            AttemptOutcome::from_result(Err(anyhow::anyhow!("boom"))),
            AttemptOutcome::Failure(_)
        ));
    }
}
