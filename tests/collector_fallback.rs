// tests/collector_fallback.rs
//
// Fallback order and stop conditions of the source adapter, driven by a
// scripted client (no network).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::json;

use sns_risk_monitor::ingest::types::{
    AttemptOutcome, Endpoint, PostSource, RawItem, SearchRequest, SourceClient,
};
use sns_risk_monitor::ingest::{Collector, PolitenessDelay};

#[derive(Clone, Copy)]
enum Script {
    Ok(usize),
    Empty,
    Fail,
}

struct ScriptedClient {
    script: HashMap<Endpoint, Script>,
    calls: Mutex<Vec<Endpoint>>,
}

impl ScriptedClient {
    fn new(script: &[(Endpoint, Script)]) -> Self {
        Self {
            script: script.iter().cloned().collect(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

fn item(n: usize) -> RawItem {
    json!({
        "link": format!("https://mirror.example/user{n}/status/{n}#m"),
        "text": format!("post number {n}"),
        "date": "Oct 1, 2024 · 12:00 PM UTC",
        "user": {"username": format!("user{n}"), "name": "User", "avatar": null, "followers": 10},
        "stats": {"comments": 1, "retweets": 2, "quotes": 0, "likes": "1,024"}
    })
}

#[async_trait]
impl SourceClient for ScriptedClient {
    async fn fetch(&self, endpoint: &Endpoint, _req: &SearchRequest) -> AttemptOutcome {
        self.calls.lock().unwrap().push(endpoint.clone());
        match self.script.get(endpoint).copied().unwrap_or(Script::Fail) {
            Script::Ok(n) => AttemptOutcome::Success((1..=n).map(item).collect()),
            Script::Empty => AttemptOutcome::Empty,
            Script::Fail => AttemptOutcome::Failure(anyhow!("connection reset")),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn inst(s: &str) -> Endpoint {
    Endpoint::Instance(s.to_string())
}

fn collector(script: &[(Endpoint, Script)], fallbacks: &[&str]) -> Collector {
    let fallbacks: Vec<String> = fallbacks.iter().map(|s| s.to_string()).collect();
    Collector::new(ScriptedClient::new(script), &fallbacks)
        .with_politeness(PolitenessDelay::disabled())
}

#[tokio::test]
async fn first_success_stops_the_walk() {
    let script = [
        (Endpoint::Random, Script::Fail),
        (inst("a"), Script::Empty),
        (inst("b"), Script::Ok(3)),
        (inst("c"), Script::Ok(5)),
    ];
    let client = ScriptedClient::new(&script);
    let c = Collector::new(client, &["a".into(), "b".into(), "c".into()])
        .with_politeness(PolitenessDelay::disabled());

    let posts = c.fetch("BMSG", 20).await;
    assert_eq!(posts.len(), 3);
    assert_eq!(posts[0].id.as_deref(), Some("1"));
    assert_eq!(posts[0].engagement.likes, Some(1024));
    assert_eq!(posts[2].author.username.as_deref(), Some("user3"));
}

#[tokio::test]
async fn attempts_follow_candidate_order_without_repeats() {
    use std::sync::Arc;

    struct Shared(Arc<ScriptedClient>);
    #[async_trait]
    impl SourceClient for Shared {
        async fn fetch(&self, e: &Endpoint, r: &SearchRequest) -> AttemptOutcome {
            self.0.fetch(e, r).await
        }
        fn name(&self) -> &'static str {
            "shared"
        }
    }

    let inner = Arc::new(ScriptedClient::new(&[
        (Endpoint::Random, Script::Empty),
        (inst("a"), Script::Fail),
        (inst("b"), Script::Ok(2)),
    ]));
    let c = Collector::new(Shared(inner.clone()), &["a".into(), "b".into(), "c".into()])
        .with_politeness(PolitenessDelay::disabled());

    let posts = c.fetch("SKY-HI", 20).await;
    assert_eq!(posts.len(), 2);
    assert_eq!(
        *inner.calls.lock().unwrap(),
        vec![Endpoint::Random, inst("a"), inst("b")]
    );
}

#[tokio::test]
async fn exhaustion_yields_empty_list_not_error() {
    let c = collector(
        &[(Endpoint::Random, Script::Empty), (inst("a"), Script::Fail)],
        &["a"],
    );
    assert!(c.fetch("BMSG", 20).await.is_empty());

    // The trait surface used by the monitor still reports Ok.
    let via_trait = c.fetch_posts("BMSG", 20).await.unwrap();
    assert!(via_trait.is_empty());
}

#[tokio::test]
async fn result_is_truncated_to_desired_count() {
    let c = collector(&[(Endpoint::Random, Script::Ok(10))], &[]);
    assert_eq!(c.fetch("BMSG", 4).await.len(), 4);
}

#[tokio::test]
async fn malformed_items_are_skipped_individually() {
    struct Mixed;
    #[async_trait]
    impl SourceClient for Mixed {
        async fn fetch(&self, _: &Endpoint, _: &SearchRequest) -> AttemptOutcome {
            AttemptOutcome::Success(vec![
                item(1),
                json!({"link": "https://m/x/status/2"}),
                json!(42),
                json!({"text": "bad stats", "stats": {"likes": [1]}}),
                item(5),
            ])
        }
        fn name(&self) -> &'static str {
            "mixed"
        }
    }

    let c = Collector::new(Mixed, &[]).with_politeness(PolitenessDelay::disabled());
    let posts = c.fetch("BMSG", 20).await;
    let ids: Vec<_> = posts.iter().map(|p| p.id.clone().unwrap()).collect();
    assert_eq!(ids, vec!["1".to_string(), "5".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn politeness_delay_precedes_each_attempt() {
    let c = Collector::new(
        ScriptedClient::new(&[(inst("a"), Script::Ok(1))]),
        &["a".into()],
    )
    .with_politeness(PolitenessDelay::new(
        Duration::from_secs(1),
        Duration::from_secs(1),
    ));

    let start = tokio::time::Instant::now();
    let posts = c.fetch("BMSG", 20).await;
    assert_eq!(posts.len(), 1);
    // Random (fails) + "a": two pauses of exactly one second.
    assert_eq!(start.elapsed(), Duration::from_secs(2));
}
