use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// --- Platform Data ---

/// A social account as delivered by a platform collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Account {
    pub id: String,
    pub platform: String,
    /// Handle on the platform. Mentions may reference it instead of `id`.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub follower_count: u64,
    #[serde(default)]
    pub following_count: u64,
    #[serde(default)]
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub bio: String,
}

impl Account {
    /// Age of the account in fractional days at `now`. Never negative.
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        ((now - self.created_at).num_seconds() as f64 / 86_400.0).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub platform: String,
    #[serde(default)]
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub shares: u64,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub reposts: u64,
    /// Post this one replies to or shares.
    #[serde(default)]
    pub parent_post_id: Option<String>,
    /// True when the parent relation is a share/quote rather than a reply.
    #[serde(default)]
    pub is_share: bool,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub mentions: Vec<String>,
    #[serde(default)]
    pub urls: Vec<String>,
}

impl Post {
    /// likes + shares + comments.
    pub fn engagement(&self) -> u64 {
        self.likes
            .saturating_add(self.shares)
            .saturating_add(self.comments)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Likes,
    Shares,
    Comments,
    Retweets,
    Replies,
    Mentions,
    Follows,
}

impl InteractionKind {
    /// Base edge weight for an interaction of this kind.
    pub fn base_weight(self) -> f64 {
        match self {
            InteractionKind::Shares => 2.5,
            InteractionKind::Comments => 1.5,
            InteractionKind::Retweets => 2.5,
            InteractionKind::Replies => 1.8,
            InteractionKind::Mentions => 1.2,
            InteractionKind::Likes => 0.5,
            InteractionKind::Follows => 1.0,
        }
    }

    /// Share-like kinds that push content to a new audience.
    pub fn is_amplifying(self) -> bool {
        matches!(self, InteractionKind::Shares | InteractionKind::Retweets)
    }
}

impl std::fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InteractionKind::Likes => write!(f, "likes"),
            InteractionKind::Shares => write!(f, "shares"),
            InteractionKind::Comments => write!(f, "comments"),
            InteractionKind::Retweets => write!(f, "retweets"),
            InteractionKind::Replies => write!(f, "replies"),
            InteractionKind::Mentions => write!(f, "mentions"),
            InteractionKind::Follows => write!(f, "follows"),
        }
    }
}

/// An account acting on a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Interaction {
    pub id: String,
    pub kind: InteractionKind,
    pub account_id: String,
    pub post_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self { start: instant, end: instant }
    }

    /// Grow the range to cover `instant`.
    pub fn include(&mut self, instant: DateTime<Utc>) {
        if instant < self.start {
            self.start = instant;
        }
        if instant > self.end {
            self.end = instant;
        }
    }
}

/// Everything one collector pulled from one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DataCollection {
    pub platform: String,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub posts: Vec<Post>,
    #[serde(default)]
    pub interactions: Vec<Interaction>,
    pub collected_at: DateTime<Utc>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
}

impl DataCollection {
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.posts.is_empty() && self.interactions.is_empty()
    }
}

// --- Severity ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}
