// src/ingest/mod.rs
pub mod config;
pub mod providers;
pub mod scheduler;
pub mod types;

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::counter;
use rand::Rng;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::SourceConfig;
use crate::ingest::providers::nitter_rss::NitterRssClient;
use crate::ingest::types::{
    AttemptOutcome, Author, CanonicalRecord, Endpoint, Engagement, PostSource, RawItem,
    SearchRequest, SourceClient,
};

/// Turn feed HTML into plain text: decode entities, drop tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) <br> and paragraph ends become spaces before tags are stripped
    static RE_BREAKS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_breaks =
        RE_BREAKS.get_or_init(|| regex::Regex::new(r"(?i)<br\s*/?>|</p>").unwrap());
    let out = re_breaks.replace_all(s, " ");

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    let out = re_tags.replace_all(&out, "");

    // 3) HTML entity decode (after tag stripping so `&lt;b&gt;` survives as text)
    let out = html_escape::decode_html_entities(&out).to_string();

    // 4) Collapse whitespace (Unicode \s covers NBSP)
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Why a single raw item could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("raw item is not an object")]
    NotAnObject,
    #[error("missing field `{0}`")]
    Missing(&'static str),
    #[error("field `{0}` has an unexpected type")]
    WrongType(&'static str),
}

/// Trailing path segment of a post URL, ignoring fragment and query.
pub fn id_from_link(link: &str) -> Option<String> {
    let path = link.split(['#', '?']).next().unwrap_or_default();
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn opt_str(map: &Map<String, Value>, key: &'static str) -> Result<Option<String>, NormalizeError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(NormalizeError::WrongType(key)),
    }
}

fn opt_obj<'a>(
    map: &'a Map<String, Value>,
    key: &'static str,
) -> Result<Option<&'a Map<String, Value>>, NormalizeError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(o)) => Ok(Some(o)),
        Some(_) => Err(NormalizeError::WrongType(key)),
    }
}

/// Counters arrive as numbers or as display strings such as "1,234".
fn opt_count(map: &Map<String, Value>, key: &'static str) -> Result<Option<u64>, NormalizeError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or(NormalizeError::WrongType(key)),
        Some(Value::String(s)) => {
            let cleaned: String = s.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
            if cleaned.is_empty() {
                return Ok(None);
            }
            cleaned
                .parse::<u64>()
                .map(Some)
                .map_err(|_| NormalizeError::WrongType(key))
        }
        Some(_) => Err(NormalizeError::WrongType(key)),
    }
}

/// Map one raw item into a `CanonicalRecord`. Pure apart from `collected_at`.
pub fn normalize_item(
    raw: &RawItem,
    collected_at: DateTime<Utc>,
) -> Result<CanonicalRecord, NormalizeError> {
    let obj = raw.as_object().ok_or(NormalizeError::NotAnObject)?;

    let text = opt_str(obj, "text")?.ok_or(NormalizeError::Missing("text"))?;
    let link = opt_str(obj, "link")?;
    let published_at = opt_str(obj, "date")?;

    let author = match opt_obj(obj, "user")? {
        Some(user) => Author {
            username: opt_str(user, "username")?,
            display_name: opt_str(user, "name")?,
            avatar_url: opt_str(user, "avatar")?,
            followers: opt_count(user, "followers")?,
        },
        None => Author::default(),
    };

    let engagement = match opt_obj(obj, "stats")? {
        Some(stats) => Engagement {
            replies: opt_count(stats, "comments")?,
            retweets: opt_count(stats, "retweets")?,
            quotes: opt_count(stats, "quotes")?,
            likes: opt_count(stats, "likes")?,
        },
        None => Engagement::default(),
    };

    let mut record = CanonicalRecord::new(text, collected_at)
        .with_author(author)
        .with_engagement(engagement);
    record.id = link.as_deref().and_then(id_from_link);
    record.url = link;
    record.published_at = published_at;
    Ok(record)
}

/// Normalize a batch; malformed items are skipped one by one.
pub fn normalize_batch(items: &[RawItem], collected_at: DateTime<Utc>) -> Vec<CanonicalRecord> {
    let mut out = Vec::with_capacity(items.len());
    for (index, raw) in items.iter().enumerate() {
        match normalize_item(raw, collected_at) {
            Ok(record) => out.push(record),
            Err(e) => {
                counter!("monitor_items_skipped_total").increment(1);
                warn!(index, error = %e, "Error processing tweet, skipping item");
            }
        }
    }
    out
}

/// Randomized courtesy pause before each endpoint attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolitenessDelay {
    min: Duration,
    max: Duration,
}

impl Default for PolitenessDelay {
    fn default() -> Self {
        Self::new(Duration::from_millis(1_000), Duration::from_millis(3_000))
    }
}

impl PolitenessDelay {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min > max {
            Self { min: max, max: min }
        } else {
            Self { min, max }
        }
    }

    /// No pause at all (tests, replay).
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn is_disabled(&self) -> bool {
        self.max.is_zero()
    }

    /// Uniform sample in `[min, max]` at millisecond resolution.
    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let lo = self.min.as_millis() as u64;
        let hi = self.max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }

    pub async fn wait(&self) {
        let d = self.sample();
        if !d.is_zero() {
            tokio::time::sleep(d).await;
        }
    }
}

/// Source adapter: walks the endpoint list until one attempt yields posts.
pub struct Collector {
    client: Box<dyn SourceClient>,
    endpoints: Vec<Endpoint>,
    politeness: PolitenessDelay,
}

impl Collector {
    /// Candidate order is `Random` first, then `fallback_instances` as given.
    pub fn new<C: SourceClient + 'static>(client: C, fallback_instances: &[String]) -> Self {
        let mut endpoints = Vec::with_capacity(fallback_instances.len() + 1);
        endpoints.push(Endpoint::Random);
        endpoints.extend(
            fallback_instances
                .iter()
                .map(|url| Endpoint::Instance(url.clone())),
        );
        Self {
            client: Box::new(client),
            endpoints,
            politeness: PolitenessDelay::default(),
        }
    }

    /// Nitter RSS collector wired from configuration.
    pub fn from_config(cfg: &SourceConfig) -> Result<Self> {
        let client = NitterRssClient::new(cfg.instance_pool.clone(), cfg.request_timeout)?;
        info!(
            pool = cfg.instance_pool.len(),
            fallbacks = cfg.fallback_instances.len(),
            "collector initialized"
        );
        Ok(Self::new(client, &cfg.fallback_instances)
            .with_politeness(PolitenessDelay::new(cfg.politeness_min, cfg.politeness_max)))
    }

    pub fn with_endpoints(mut self, endpoints: Vec<Endpoint>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_politeness(mut self, politeness: PolitenessDelay) -> Self {
        self.politeness = politeness;
        self
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn client_name(&self) -> &'static str {
        self.client.name()
    }

    /// Term search for `query`. Never fails; total failure yields an empty list.
    pub async fn fetch(&self, query: &str, count: usize) -> Vec<CanonicalRecord> {
        self.search(&SearchRequest::term(query, count)).await
    }

    pub async fn search(&self, req: &SearchRequest) -> Vec<CanonicalRecord> {
        crate::metrics::ensure_described();

        for endpoint in &self.endpoints {
            self.politeness.wait().await;

            info!(
                query = %req.query,
                endpoint = %endpoint,
                mode = %req.mode,
                "searching"
            );
            counter!("monitor_fetch_attempts_total").increment(1);

            match self.client.fetch(endpoint, req).await {
                AttemptOutcome::Success(mut items) => {
                    if req.count > 0 {
                        items.truncate(req.count);
                    }
                    info!(count = items.len(), endpoint = %endpoint, "found posts");
                    return normalize_batch(&items, Utc::now());
                }
                AttemptOutcome::Empty => {
                    counter!("monitor_fetch_failures_total").increment(1);
                    warn!(
                        endpoint = %endpoint,
                        query = %req.query,
                        "no results or empty list, trying next endpoint"
                    );
                }
                AttemptOutcome::Failure(e) => {
                    counter!("monitor_fetch_failures_total").increment(1);
                    warn!(
                        endpoint = %endpoint,
                        query = %req.query,
                        error = %format!("{e:#}"),
                        "endpoint failed, trying next endpoint"
                    );
                }
            }
        }

        error!(query = %req.query, "all endpoints failed");
        Vec::new()
    }
}

#[async_trait::async_trait]
impl PostSource for Collector {
    async fn fetch_posts(&self, query: &str, count: usize) -> Result<Vec<CanonicalRecord>> {
        Ok(self.fetch(query, count).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_text_strips_markup() {
        let s = "<p>Hello&nbsp;<b>world</b><br>next &amp; last</p>  ";
        assert_eq!(normalize_text(s), "Hello world next & last");
    }

    #[test]
    fn id_is_trailing_segment_without_fragment() {
        assert_eq!(
            id_from_link("https://nitter.net/u1/status/1845#m").as_deref(),
            Some("1845")
        );
        assert_eq!(
            id_from_link("https://x.com/u1/status/77/?s=20").as_deref(),
            Some("77")
        );
        assert_eq!(id_from_link(""), None);
    }

    #[test]
    fn counts_accept_numbers_and_display_strings() {
        let raw = json!({
            "text": "t",
            "stats": {"comments": 3, "retweets": "1,204", "quotes": "", "likes": null}
        });
        let r = normalize_item(&raw, Utc::now()).unwrap();
        assert_eq!(r.engagement.replies, Some(3));
        assert_eq!(r.engagement.retweets, Some(1204));
        assert_eq!(r.engagement.quotes, None);
        assert_eq!(r.engagement.likes, None);
    }

    #[test]
    fn wrong_shapes_are_rejected() {
        let now = Utc::now();
        assert_eq!(
            normalize_item(&json!("just a string"), now),
            Err(NormalizeError::NotAnObject)
        );
        assert_eq!(
            normalize_item(&json!({"link": "https://n/x/status/1"}), now),
            Err(NormalizeError::Missing("text"))
        );
        assert_eq!(
            normalize_item(&json!({"text": "t", "user": "u1"}), now),
            Err(NormalizeError::WrongType("user"))
        );
        assert_eq!(
            normalize_item(&json!({"text": "t", "stats": {"likes": -1}}), now),
            Err(NormalizeError::WrongType("likes"))
        );
    }

    #[test]
    fn politeness_sample_stays_in_range() {
        let p = PolitenessDelay::new(Duration::from_millis(10), Duration::from_millis(30));
        for _ in 0..200 {
            let d = p.sample();
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(30));
        }
        assert!(PolitenessDelay::disabled().is_disabled());
        assert_eq!(PolitenessDelay::disabled().sample(), Duration::ZERO);
    }

    #[test]
    fn default_candidates_start_with_random() {
        struct Never;
        #[async_trait::async_trait]
        impl SourceClient for Never {
            async fn fetch(&self, _: &Endpoint, _: &SearchRequest) -> AttemptOutcome {
                AttemptOutcome::Empty
            }
            fn name(&self) -> &'static str {
                "never"
            }
        }
        let c = Collector::new(Never, &["https://a.example".into(), "https://b.example".into()]);
        assert_eq!(
            c.endpoints(),
            &[
                Endpoint::Random,
                Endpoint::Instance("https://a.example".into()),
                Endpoint::Instance("https://b.example".into()),
            ]
        );
    }
}
