// src/store/types.rs
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analyze::ai_adapter::RiskAssessment;
use crate::ingest::types::{Author, CanonicalRecord, Engagement, HASH_KEY_PREFIX};

pub const RUN_NOW: &str = "RUN_NOW";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Forward-only lifecycle: PENDING → PROCESSING → COMPLETED | FAILED.
    pub fn can_transition_to(&self, next: CommandStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    RunNow,
    Unsupported(String),
}

impl CommandKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            RUN_NOW => Self::RunNow,
            other => Self::Unsupported(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::RunNow => RUN_NOW,
            Self::Unsupported(s) => s,
        }
    }
}

/// A row of the command inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: i64,
    pub command: String,
    pub status: CommandStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        CommandKind::parse(&self.command)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub message: String,
    pub level: LogLevel,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub profile_img: Option<String>,
    pub followers: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub comments: Option<u64>,
    pub retweets: Option<u64>,
    pub quotes: Option<u64>,
    pub likes: Option<u64>,
}

/// Storage shape of a record (columns of the `tweets` table the dashboard reads).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRow {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    pub text: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub user_info: UserInfo,
    #[serde(default)]
    pub stats: Stats,
    pub collected_at: DateTime<Utc>,
    #[serde(default)]
    pub risk_analysis: Option<serde_json::Value>,
    #[serde(default)]
    pub risk_score: Option<u8>,
}

impl RecordRow {
    pub fn from_record(rec: &CanonicalRecord) -> Self {
        Self {
            id: rec.storage_key(),
            url: rec.url.clone(),
            text: rec.text.clone(),
            date: rec.published_at.clone(),
            user_info: UserInfo {
                username: rec.author.username.clone(),
                display_name: rec.author.display_name.clone(),
                profile_img: rec.author.avatar_url.clone(),
                followers: rec.author.followers,
            },
            stats: Stats {
                comments: rec.engagement.replies,
                retweets: rec.engagement.retweets,
                quotes: rec.engagement.quotes,
                likes: rec.engagement.likes,
            },
            collected_at: rec.collected_at,
            risk_analysis: rec
                .risk_assessment()
                .and_then(|a| serde_json::to_value(a).ok()),
            risk_score: rec.risk_score(),
        }
    }

    /// Back to a record. Hash keys map to `id: None`; an assessment that no
    /// longer matches the strict schema is dropped.
    pub fn into_record(self) -> CanonicalRecord {
        let mut rec = CanonicalRecord::new(self.text, self.collected_at)
            .with_author(Author {
                username: self.user_info.username,
                display_name: self.user_info.display_name,
                avatar_url: self.user_info.profile_img,
                followers: self.user_info.followers,
            })
            .with_engagement(Engagement {
                replies: self.stats.comments,
                retweets: self.stats.retweets,
                quotes: self.stats.quotes,
                likes: self.stats.likes,
            });
        if !self.id.starts_with(HASH_KEY_PREFIX) {
            rec = rec.with_id(self.id);
        }
        if let Some(url) = self.url {
            rec = rec.with_url(url);
        }
        if let Some(date) = self.date {
            rec = rec.with_published_at(date);
        }
        if let Some(a) = self
            .risk_analysis
            .and_then(|v| serde_json::from_value::<RiskAssessment>(v).ok())
        {
            rec.attach_assessment(a);
        }
        rec
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrder {
    #[default]
    CollectedAt,
    RiskScore,
}

/// Dashboard-style record query. Always descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordQuery {
    pub limit: usize,
    #[serde(default)]
    pub min_risk: Option<u8>,
    #[serde(default)]
    pub order: RecordOrder,
}

impl RecordQuery {
    pub fn latest(limit: usize) -> Self {
        Self {
            limit,
            min_risk: None,
            order: RecordOrder::CollectedAt,
        }
    }

    pub fn riskiest(limit: usize, min_risk: u8) -> Self {
        Self {
            limit,
            min_risk: Some(min_risk),
            order: RecordOrder::RiskScore,
        }
    }
}
