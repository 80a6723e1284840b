// tests/common/mod.rs
// Shared helpers: in-process HTTP servers standing in for remote services.
#![allow(dead_code)]

use axum::Router;

/// Serve `app` on an ephemeral localhost port; returns `http://127.0.0.1:<port>`.
pub async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    format!("http://{addr}")
}

pub const NITTER_SEARCH: &str = include_str!("../fixtures/nitter_search.xml");
pub const NITTER_EMPTY: &str = include_str!("../fixtures/nitter_empty.xml");

pub const ASSESSMENT_JSON: &str = r#"{"sentiment": -0.6, "aggression": 7, "spread_risk": 4, "legal_risk": 2, "risk_score": 6, "reason": "攻撃的な表現を含む"}"#;
