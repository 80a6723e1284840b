// src/ingest/providers/nitter_rss.rs
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use metrics::histogram;
use quick_xml::de::from_str;
use rand::seq::IndexedRandom;
use serde::Deserialize;
use serde_json::json;

use crate::ingest::normalize_text;
use crate::ingest::types::{
    AttemptOutcome, Endpoint, RawItem, SearchMode, SearchRequest, SourceClient,
};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    // `dc:creator`; the deserializer may or may not keep the prefix
    #[serde(rename = "creator", alias = "dc:creator")]
    creator: Option<String>,
    description: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    link: Option<String>,
}

/// Parse a Nitter RSS document into raw items (`link`, `text`, `date`, `user`).
///
/// The HTML body becomes plain text; the title is used when the body is blank.
/// Items with neither keep `text: null` and are dropped later by normalization.
pub fn parse_feed(xml: &str) -> Result<Vec<RawItem>> {
    let t0 = std::time::Instant::now();
    let rss: Rss = from_str(xml).context("parsing nitter rss xml")?;

    let out = rss
        .channel
        .item
        .into_iter()
        .map(|it| {
            let text = it
                .description
                .as_deref()
                .map(normalize_text)
                .filter(|t| !t.is_empty())
                .or_else(|| {
                    it.title
                        .as_deref()
                        .map(normalize_text)
                        .filter(|t| !t.is_empty())
                });
            let username = it
                .creator
                .as_deref()
                .map(|c| c.trim().trim_start_matches('@').to_string())
                .filter(|c| !c.is_empty());
            json!({
                "link": it.link.map(|l| l.trim().to_string()),
                "text": text,
                "date": it.pub_date,
                "user": { "username": username },
            })
        })
        .collect::<Vec<_>>();

    histogram!("monitor_feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(out)
}

/// Feed URL and query parameters for a request against one mirror.
pub fn feed_url(base: &str, req: &SearchRequest) -> (String, Vec<(&'static str, String)>) {
    let base = base.trim_end_matches('/');
    if req.mode == SearchMode::User {
        let user = req.query.trim().trim_start_matches('@');
        return (format!("{base}/{user}/rss"), Vec::new());
    }

    let q = match req.mode {
        SearchMode::Hashtag => format!("#{}", req.query.trim().trim_start_matches('#')),
        _ => req.query.clone(),
    };
    let mut params = vec![("f", "tweets".to_string()), ("q", q)];
    if let Some(since) = req.since {
        params.push(("since", since.format("%Y-%m-%d").to_string()));
    }
    if let Some(until) = req.until {
        params.push(("until", until.format("%Y-%m-%d").to_string()));
    }
    (format!("{base}/search/rss"), params)
}

/// Source client for Nitter mirrors using their RSS search feeds.
pub struct NitterRssClient {
    http: reqwest::Client,
    pool: Vec<String>,
}

impl NitterRssClient {
    /// `pool` backs `Endpoint::Random`.
    pub fn new(pool: Vec<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("sns-risk-monitor/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .timeout(timeout)
            .build()
            .context("building nitter http client")?;
        Ok(Self { http, pool })
    }

    fn resolve(&self, endpoint: &Endpoint) -> Result<String> {
        match endpoint {
            Endpoint::Instance(url) => Ok(url.clone()),
            Endpoint::Random => self
                .pool
                .choose(&mut rand::rng())
                .cloned()
                .ok_or_else(|| anyhow!("instance pool is empty")),
        }
    }

    async fn fetch_items(&self, endpoint: &Endpoint, req: &SearchRequest) -> Result<Vec<RawItem>> {
        let base = self.resolve(endpoint)?;
        let (url, params) = feed_url(&base, req);

        let resp = self
            .http
            .get(&url)
            .query(&params)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("{url} returned HTTP {status}");
        }
        let body = resp.text().await.context("reading feed body")?;

        let mut items = parse_feed(&body)?;
        if req.count > 0 {
            items.truncate(req.count);
        }
        tracing::debug!(%url, count = items.len(), "feed parsed");
        Ok(items)
    }
}

#[async_trait]
impl SourceClient for NitterRssClient {
    async fn fetch(&self, endpoint: &Endpoint, req: &SearchRequest) -> AttemptOutcome {
        AttemptOutcome::from_result(self.fetch_items(endpoint, req).await)
    }

    fn name(&self) -> &'static str {
        "nitter-rss"
    }
}
