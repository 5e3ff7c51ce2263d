//! Rule-based bot likelihood per account.
//!
//! Scores are additive rule weights, not calibrated probabilities.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use spreadtrace_common::text::mean_pairwise_jaccard;
use spreadtrace_common::AnalysisConfig;
use spreadtrace_graph::PropagationGraph;

use crate::activity::{AccountActivity, ActivityIndex};

pub const BURSTY_ACTIVITY: &str = "Bursty activity pattern";
pub const HIGH_FREQUENCY: &str = "Unusually high posting frequency";
pub const ABNORMAL_FOLLOWER_RATIO: &str = "Abnormal follower ratio";
pub const REPETITIVE_CONTENT: &str = "Repetitive content";
pub const LOW_RECIPROCITY: &str = "Low network reciprocity";
pub const NEW_ACCOUNT: &str = "Very new account";
pub const UNVERIFIED: &str = "Unverified account";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BotMetrics {
    pub node_id: String,
    pub bot_score: f64,
    pub activity_burst: f64,
    /// Posts per hour over the account's active span.
    pub posting_frequency: f64,
    pub follower_ratio: f64,
    pub content_similarity: f64,
    pub network_reciprocity: f64,
    pub account_age_days: f64,
    pub suspicious_patterns: Vec<String>,
    /// Why some inputs were unavailable, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<String>,
}

pub struct BotDetector<'a> {
    config: &'a AnalysisConfig,
    now: DateTime<Utc>,
}

impl<'a> BotDetector<'a> {
    pub fn new(config: &'a AnalysisConfig, now: DateTime<Utc>) -> Self {
        Self { config, now }
    }

    /// Metrics for every account in the graph, highest bot score first.
    pub fn detect(&self, graph: &PropagationGraph) -> Vec<BotMetrics> {
        let index = ActivityIndex::new(graph);
        let mut results: Vec<BotMetrics> = index
            .accounts()
            .iter()
            .map(|activity| self.score(&index, activity))
            .collect();

        results.sort_by(|a, b| {
            b.bot_score
                .partial_cmp(&a.bot_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.node_id.cmp(&b.node_id))
        });

        let likely = results
            .iter()
            .filter(|m| m.bot_score > self.config.bot_detection_threshold)
            .count();
        info!(accounts = results.len(), likely_bots = likely, "Bot detection complete");
        results
    }

    fn score(&self, index: &ActivityIndex<'_>, activity: &AccountActivity<'_>) -> BotMetrics {
        let account = activity.account;
        let mut degraded = Vec::new();

        let (activity_burst, posting_frequency, content_similarity) = if activity.posts.is_empty() {
            warn!(account = activity.node_id, "No posts for account, post metrics default to zero");
            degraded.push("no posts in graph".to_string());
            (0.0, 0.0, 0.0)
        } else {
            (
                burst_intensity(&activity.post_times),
                posting_frequency(&activity.post_times),
                mean_pairwise_jaccard(&activity.word_sets),
            )
        };

        let follower_ratio = follower_ratio(account.follower_count, account.following_count);
        let network_reciprocity = index.reciprocity(activity);
        let account_age_days = account.age_days(self.now);

        let mut score: f64 = 0.0;
        let mut patterns = Vec::new();
        let mut flag = |hit: bool, weight: f64, label: &str| {
            if hit {
                score += weight;
                patterns.push(label.to_string());
            }
        };
        flag(activity_burst > 0.5, 0.2, BURSTY_ACTIVITY);
        flag(posting_frequency > 10.0, 0.2, HIGH_FREQUENCY);
        flag(
            follower_ratio > 10.0 || follower_ratio < 0.1,
            0.15,
            ABNORMAL_FOLLOWER_RATIO,
        );
        flag(
            content_similarity > self.config.content_similarity_threshold,
            0.2,
            REPETITIVE_CONTENT,
        );
        flag(
            network_reciprocity < self.config.network_reciprocity_threshold,
            0.15,
            LOW_RECIPROCITY,
        );
        flag(account_age_days < 30.0, 0.1, NEW_ACCOUNT);
        flag(!account.verified, 0.05, UNVERIFIED);

        BotMetrics {
            node_id: activity.node_id.to_string(),
            bot_score: score.min(1.0),
            activity_burst,
            posting_frequency,
            follower_ratio,
            content_similarity,
            network_reciprocity,
            account_age_days,
            suspicious_patterns: patterns,
            degraded,
        }
    }
}

/// Coefficient of variation of hourly post counts across every hour from the
/// first post to the last, capped at 1. Activity inside a single hour is 0.
pub fn burst_intensity(times: &[DateTime<Utc>]) -> f64 {
    let mut buckets: BTreeMap<i64, f64> = BTreeMap::new();
    for t in times {
        *buckets.entry(t.timestamp().div_euclid(3600)).or_insert(0.0) += 1.0;
    }
    let (Some(&first), Some(&last)) = (buckets.keys().next(), buckets.keys().next_back()) else {
        return 0.0;
    };
    let span = (last - first + 1) as usize;
    if span < 2 {
        return 0.0;
    }
    let counts: Vec<f64> = (first..=last)
        .map(|h| buckets.get(&h).copied().unwrap_or(0.0))
        .collect();
    let mean = counts.iter().sum::<f64>() / span as f64;
    let variance = counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / span as f64;
    (variance.sqrt() / mean).min(1.0)
}

/// Posts per hour between the first and last post, with a one-hour floor.
pub fn posting_frequency(times: &[DateTime<Utc>]) -> f64 {
    let (Some(first), Some(last)) = (times.iter().min(), times.iter().max()) else {
        return 0.0;
    };
    let hours = ((*last - *first).num_seconds() as f64 / 3600.0).max(1.0);
    times.len() as f64 / hours
}

/// Followers per followed account. No followings means the follower count
/// itself, or a neutral 1.0 when both are zero.
pub fn follower_ratio(followers: u64, following: u64) -> f64 {
    match (followers, following) {
        (0, 0) => 1.0,
        (f, 0) => f as f64,
        (f, g) => f as f64 / g as f64,
    }
}
