//! Per-post virality from direct reach, engagement counters, interaction
//! velocity and the reply/share cascade below the post.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Timelike, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use spreadtrace_common::{AnalysisConfig, Post};
use spreadtrace_graph::{NodeIndex, NodeKind, PropagationEdge, PropagationGraph};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ViralityMetrics {
    pub node_id: String,
    /// Distinct accounts with an edge into the post.
    pub reach: usize,
    pub engagement: u64,
    /// Incoming interactions per hour, repeats included.
    pub velocity: f64,
    pub amplification: f64,
    pub cascade_depth: usize,
    pub unique_users: usize,
    pub time_to_viral_minutes: Option<i64>,
    pub peak_activity_hour: Option<u32>,
    pub virality_score: f64,
}

pub struct ViralityScorer<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> ViralityScorer<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    /// Metrics for every post in the graph, most viral first.
    pub fn score(&self, graph: &PropagationGraph) -> Vec<ViralityMetrics> {
        let mut results: Vec<ViralityMetrics> = graph
            .node_indices()
            .filter_map(|i| graph.node_at(i).as_post().map(|post| score_post(graph, i, post)))
            .collect();

        results.sort_by(|a, b| {
            b.virality_score
                .partial_cmp(&a.virality_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.node_id.cmp(&b.node_id))
        });

        let viral = results
            .iter()
            .filter(|m| m.virality_score > self.config.virality_threshold)
            .count();
        info!(posts = results.len(), viral, "Virality scoring complete");
        results
    }
}

fn score_post(graph: &PropagationGraph, index: NodeIndex, post: &Post) -> ViralityMetrics {
    let reached_by = direct_reach(graph, index);
    let from_users: Vec<&PropagationEdge> = graph
        .incoming(index)
        .filter(|&(s, _)| graph.node_at(s).kind() == NodeKind::User)
        .map(|(_, edge)| edge)
        .collect();
    let times: Vec<DateTime<Utc>> = from_users.iter().map(|e| e.timestamp).collect();
    let interactions: u64 = from_users.iter().map(|e| e.interaction_count()).sum();
    let first = times.iter().min().copied();
    let last = from_users.iter().map(|e| e.last_interaction_at()).max();

    let steps = graph.cascade(index);
    let cascade_depth = steps.iter().map(|s| s.depth).max().unwrap_or(0);
    let mut unique: HashSet<NodeIndex> = reached_by.clone();
    for step in steps.iter().skip(1) {
        unique.extend(direct_reach(graph, step.node));
        if let Some(author) = graph.node_at(step.node).as_post().and_then(|p| graph.author_of(p)) {
            unique.insert(author);
        }
    }

    let engagement = post.engagement();
    let amplification = if post.likes == 0 {
        0.0
    } else {
        post.shares.saturating_add(post.reposts) as f64 / post.likes as f64
    };
    let velocity = match (first, last) {
        (Some(first), Some(last)) => velocity(interactions, first, last),
        _ => 0.0,
    };
    let reach = reached_by.len();
    let unique_users = unique.len();

    let virality_score = 0.2 * (reach as f64 / 1000.0).min(1.0)
        + 0.2 * (engagement as f64 / 100.0).min(1.0)
        + 0.2 * (velocity / 10.0).min(1.0)
        + 0.15 * (amplification / 2.0).min(1.0)
        + 0.15 * (cascade_depth as f64 / 5.0).min(1.0)
        + 0.1 * (unique_users as f64 / 500.0).min(1.0);

    ViralityMetrics {
        node_id: graph.node_at(index).id.clone(),
        reach,
        engagement,
        velocity,
        amplification,
        cascade_depth,
        unique_users,
        time_to_viral_minutes: first.map(|first| (first - post.created_at).num_minutes()),
        peak_activity_hour: peak_hour(&times),
        virality_score,
    }
}

/// Account nodes with an edge into `index`.
pub(crate) fn direct_reach(graph: &PropagationGraph, index: NodeIndex) -> HashSet<NodeIndex> {
    graph
        .incoming(index)
        .map(|(s, _)| s)
        .filter(|&s| s != index && graph.node_at(s).kind() == NodeKind::User)
        .collect()
}

/// Interactions per hour between `first` and `last`, floored at one hour.
pub fn velocity(interactions: u64, first: DateTime<Utc>, last: DateTime<Utc>) -> f64 {
    let hours = ((last - first).num_seconds() as f64 / 3600.0).max(1.0);
    interactions as f64 / hours
}

/// Hour of day with the most interactions; earlier hour wins ties.
fn peak_hour(times: &[DateTime<Utc>]) -> Option<u32> {
    let mut counts = [0usize; 24];
    for t in times {
        counts[t.hour() as usize] += 1;
    }
    let (hour, &count) = counts
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(&a.0)))?;
    (count > 0).then_some(hour as u32)
}
