//! Graph construction from per-platform data collections.
//!
//! Upstream collection is best-effort, so nothing here fails: references to
//! accounts or posts that were never collected are counted and skipped.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use spreadtrace_common::{AnalysisConfig, DataCollection, EdgeWeighting, InteractionKind, Post};

use crate::graph::{
    post_node_id, user_node_id, EdgeKey, EdgeKind, NodeKind, PropagationEdge, PropagationGraph,
    PropagationNode, INTERACTION_COUNT, LAST_INTERACTION_AT,
};

/// Size, type and platform breakdown of a built graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub user_nodes: usize,
    pub post_nodes: usize,
    pub edges_by_kind: BTreeMap<EdgeKind, usize>,
    pub platforms: BTreeSet<String>,
    /// Nodes removed to respect the maximum graph size.
    pub pruned_nodes: usize,
    /// Edges removed because an endpoint was pruned.
    pub pruned_edges: usize,
    /// Edges below the minimum weight.
    pub dropped_edges: usize,
    /// Interactions, mentions, or parents naming an absent node.
    pub dangling_references: usize,
}

#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub graph: PropagationGraph,
    pub stats: GraphStats,
}

pub struct GraphBuilder<'a> {
    config: &'a AnalysisConfig,
    now: DateTime<Utc>,
}

impl<'a> GraphBuilder<'a> {
    /// `now` anchors temporal decay so repeated builds are reproducible.
    pub fn new(config: &'a AnalysisConfig, now: DateTime<Utc>) -> Self {
        Self { config, now }
    }

    pub fn build(&self, collections: &[DataCollection]) -> BuildOutput {
        let mut nodes: Vec<PropagationNode> = Vec::new();
        let mut node_ids: HashSet<String> = HashSet::new();
        let mut handles: HashMap<String, String> = HashMap::new();

        for collection in collections {
            if self.config.include_user_nodes {
                for account in &collection.accounts {
                    let node = PropagationNode::user(account.clone());
                    if node_ids.insert(node.id.clone()) {
                        if let Some(username) = &account.username {
                            handles
                                .entry(normalize_handle(username))
                                .or_insert_with(|| node.id.clone());
                        }
                        nodes.push(node);
                    }
                }
            }
            if self.config.include_post_nodes {
                for post in &collection.posts {
                    let node = PropagationNode::post(post.clone());
                    if node_ids.insert(node.id.clone()) {
                        nodes.push(node);
                    }
                }
            }
        }

        let mut edges = EdgeAccumulator::default();
        let mut dangling = 0usize;

        for collection in collections {
            for interaction in &collection.interactions {
                let source = user_node_id(&interaction.account_id);
                let target = post_node_id(&interaction.post_id);
                if !node_ids.contains(&source) || !node_ids.contains(&target) {
                    debug!(
                        interaction = interaction.id.as_str(),
                        "Skipping interaction with missing endpoint"
                    );
                    dangling += 1;
                    continue;
                }
                let weight = self.weight(interaction.kind, 1.0, interaction.timestamp);
                let mut metadata = interaction.metadata.clone();
                metadata.insert("interaction_id".into(), interaction.id.clone().into());
                metadata.insert("platform".into(), collection.platform.clone().into());
                edges.add(PropagationEdge {
                    source,
                    target,
                    kind: interaction.kind,
                    weight,
                    timestamp: interaction.timestamp,
                    metadata,
                });
            }

            for post in &collection.posts {
                dangling += self.add_post_edges(post, &node_ids, &handles, &mut edges);
            }
        }

        let weighted: Vec<PropagationEdge> = edges.into_edges();
        let before_filter = weighted.len();
        let kept_edges: Vec<PropagationEdge> = weighted
            .into_iter()
            .filter(|e| e.weight >= self.config.min_edge_weight)
            .collect();
        let dropped_edges = before_filter - kept_edges.len();

        let (nodes, pruned_nodes) = prune_to_size(nodes, self.config.max_graph_size);
        let candidate_edges = kept_edges.len();
        let graph = PropagationGraph::new(nodes, kept_edges);
        let pruned_edges = candidate_edges - graph.edge_count();

        let stats = graph_stats(&graph, pruned_nodes, pruned_edges, dropped_edges, dangling);
        info!(
            nodes = stats.total_nodes,
            edges = stats.total_edges,
            users = stats.user_nodes,
            posts = stats.post_nodes,
            pruned = stats.pruned_nodes,
            dropped = stats.dropped_edges,
            dangling = stats.dangling_references,
            "Propagation graph built"
        );

        BuildOutput { graph, stats }
    }

    /// Mention and parent edges contributed by one post. Returns the number
    /// of references that did not resolve.
    fn add_post_edges(
        &self,
        post: &Post,
        node_ids: &HashSet<String>,
        handles: &HashMap<String, String>,
        edges: &mut EdgeAccumulator,
    ) -> usize {
        let mut dangling = 0;
        let engagement = post.engagement();
        let author = user_node_id(&post.author_id);

        if node_ids.contains(&author) {
            for mention in &post.mentions {
                let Some(target) = resolve_mention(mention, node_ids, handles) else {
                    dangling += 1;
                    continue;
                };
                if target == author {
                    continue;
                }
                let boost = match engagement {
                    e if e > 100 => 1.5,
                    e if e > 10 => 1.2,
                    _ => 1.0,
                };
                let mut metadata = BTreeMap::new();
                metadata.insert("post_id".into(), post.id.clone().into());
                metadata.insert("platform".into(), post.platform.clone().into());
                edges.add(PropagationEdge {
                    source: author.clone(),
                    target,
                    kind: InteractionKind::Mentions,
                    weight: self.weight(InteractionKind::Mentions, boost, post.created_at),
                    timestamp: post.created_at,
                    metadata,
                });
            }
        } else if !post.mentions.is_empty() {
            dangling += post.mentions.len();
        }

        if let Some(parent_id) = &post.parent_post_id {
            let parent = post_node_id(parent_id);
            let child = post_node_id(&post.id);
            if node_ids.contains(&parent) && node_ids.contains(&child) {
                let kind = if post.is_share {
                    InteractionKind::Shares
                } else {
                    InteractionKind::Replies
                };
                let boost = match engagement {
                    e if e > 100 => 2.0,
                    e if e > 10 => 1.5,
                    _ => 1.0,
                };
                let mut metadata = BTreeMap::new();
                metadata.insert("platform".into(), post.platform.clone().into());
                edges.add(PropagationEdge {
                    source: parent,
                    target: child,
                    kind,
                    weight: self.weight(kind, boost, post.created_at),
                    timestamp: post.created_at,
                    metadata,
                });
            } else {
                dangling += 1;
            }
        }

        dangling
    }

    fn weight(&self, kind: InteractionKind, boost: f64, at: DateTime<Utc>) -> f64 {
        match self.config.edge_weight_calculation {
            EdgeWeighting::Uniform => 1.0,
            EdgeWeighting::Weighted => kind.base_weight() * boost,
            EdgeWeighting::Temporal => {
                let hours = ((self.now - at).num_seconds() as f64 / 3600.0).max(0.0);
                kind.base_weight() * boost * (-self.config.time_decay_factor * hours).exp()
            }
        }
    }
}

/// Collapses repeat interactions onto the first edge created for a key. The
/// first weight and timestamp stay; the count and latest time accumulate.
#[derive(Default)]
struct EdgeAccumulator {
    edges: Vec<PropagationEdge>,
    last_seen: Vec<DateTime<Utc>>,
    keys: HashMap<EdgeKey, usize>,
}

impl EdgeAccumulator {
    fn add(&mut self, mut edge: PropagationEdge) {
        let key = edge.key();
        if let Some(&existing) = self.keys.get(&key) {
            let folded = &mut self.edges[existing];
            let count = folded.interaction_count();
            folded.metadata.insert(INTERACTION_COUNT.into(), (count + 1).into());
            let last = &mut self.last_seen[existing];
            *last = (*last).max(edge.timestamp);
            return;
        }
        edge.metadata.insert(INTERACTION_COUNT.into(), 1u64.into());
        self.keys.insert(key, self.edges.len());
        self.last_seen.push(edge.timestamp);
        self.edges.push(edge);
    }

    fn into_edges(self) -> Vec<PropagationEdge> {
        self.edges
            .into_iter()
            .zip(self.last_seen)
            .map(|(mut edge, last)| {
                edge.metadata.insert(
                    LAST_INTERACTION_AT.into(),
                    last.to_rfc3339_opts(SecondsFormat::Secs, true).into(),
                );
                edge
            })
            .collect()
    }
}

fn normalize_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_lowercase()
}

fn resolve_mention(
    mention: &str,
    node_ids: &HashSet<String>,
    handles: &HashMap<String, String>,
) -> Option<String> {
    let raw = mention.trim().trim_start_matches('@');
    let by_id = user_node_id(raw);
    if node_ids.contains(&by_id) {
        return Some(by_id);
    }
    handles.get(&normalize_handle(raw)).cloned()
}

/// Keep the `max` most important nodes. Ties keep first-insertion order and
/// survivors stay in insertion order.
fn prune_to_size(nodes: Vec<PropagationNode>, max: usize) -> (Vec<PropagationNode>, usize) {
    if nodes.len() <= max {
        return (nodes, 0);
    }
    let mut ranked: Vec<(usize, u64)> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (i, n.importance()))
        .collect();
    // sort_by is stable
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    let keep: HashSet<usize> = ranked.iter().take(max).map(|(i, _)| *i).collect();
    let pruned = nodes.len() - keep.len();
    let survivors = nodes
        .into_iter()
        .enumerate()
        .filter(|(i, _)| keep.contains(i))
        .map(|(_, n)| n)
        .collect();
    (survivors, pruned)
}

fn graph_stats(
    graph: &PropagationGraph,
    pruned_nodes: usize,
    pruned_edges: usize,
    dropped_edges: usize,
    dangling_references: usize,
) -> GraphStats {
    let mut edges_by_kind = BTreeMap::new();
    for edge in graph.edges() {
        *edges_by_kind.entry(edge.kind).or_insert(0) += 1;
    }
    let user_nodes = graph
        .nodes()
        .filter(|n| n.kind() == NodeKind::User)
        .count();
    GraphStats {
        total_nodes: graph.node_count(),
        total_edges: graph.edge_count(),
        user_nodes,
        post_nodes: graph.node_count() - user_nodes,
        edges_by_kind,
        platforms: graph.metadata().platforms.clone(),
        pruned_nodes,
        pruned_edges,
        dropped_edges,
        dangling_references,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use spreadtrace_common::fixtures::{account, base_time, child_post, collection, interaction, post};

    fn build(config: &AnalysisConfig, collections: &[DataCollection]) -> BuildOutput {
        GraphBuilder::new(config, base_time()).build(collections)
    }

    fn edge<'g>(graph: &'g PropagationGraph, source: &str, target: &str) -> &'g PropagationEdge {
        graph
            .edges()
            .find(|e| e.source == source && e.target == target)
            .expect("edge should exist")
    }

    #[test]
    fn interaction_weights_follow_kind() {
        let data = collection(
            "x",
            vec![account("a", 10, 10, 100)],
            vec![post("p", "a", "hello", 0)],
            vec![
                interaction("i1", InteractionKind::Shares, "a", "p", 5),
                interaction("i2", InteractionKind::Likes, "a", "p", 6),
            ],
        );
        let out = build(&AnalysisConfig::default(), &[data]);
        let shares = out
            .graph
            .edges()
            .find(|e| e.kind == InteractionKind::Shares)
            .unwrap();
        assert_eq!(shares.weight, 2.5);
        let likes = out
            .graph
            .edges()
            .find(|e| e.kind == InteractionKind::Likes)
            .unwrap();
        assert_eq!(likes.weight, 0.5);
        assert_eq!(out.stats.edges_by_kind[&InteractionKind::Shares], 1);
    }

    #[test]
    fn uniform_weighting_ignores_kind() {
        let config = AnalysisConfig {
            edge_weight_calculation: EdgeWeighting::Uniform,
            ..Default::default()
        };
        let data = collection(
            "x",
            vec![account("a", 1, 1, 100)],
            vec![post("p", "a", "hello", 0)],
            vec![interaction("i1", InteractionKind::Shares, "a", "p", 5)],
        );
        let out = build(&config, &[data]);
        assert_eq!(out.graph.edges().next().unwrap().weight, 1.0);
    }

    #[test]
    fn temporal_weighting_decays_with_age() {
        let config = AnalysisConfig {
            edge_weight_calculation: EdgeWeighting::Temporal,
            time_decay_factor: 0.1,
            min_edge_weight: 0.0,
            ..Default::default()
        };
        let data = collection(
            "x",
            vec![account("a", 1, 1, 100)],
            vec![post("p", "a", "hello", -600)],
            vec![interaction("i1", InteractionKind::Comments, "a", "p", -120)],
        );
        let out = build(&config, &[data]);
        let expected = 1.5 * (-0.1_f64 * 2.0).exp();
        assert!((edge(&out.graph, "user_a", "post_p").weight - expected).abs() < 1e-9);
    }

    #[test]
    fn repeat_interactions_keep_first_weight() {
        let config = AnalysisConfig {
            edge_weight_calculation: EdgeWeighting::Temporal,
            min_edge_weight: 0.0,
            ..Default::default()
        };
        let data = collection(
            "x",
            vec![account("a", 1, 1, 100)],
            vec![post("p", "a", "hello", -600)],
            vec![
                interaction("i1", InteractionKind::Likes, "a", "p", -300),
                interaction("i2", InteractionKind::Likes, "a", "p", -1),
            ],
        );
        let out = build(&config, &[data]);
        assert_eq!(out.graph.edge_count(), 1);
        let e = out.graph.edges().next().unwrap();
        assert!((e.weight - 0.5 * (-0.5_f64).exp()).abs() < 1e-9);
        assert_eq!(e.metadata["interaction_count"], 2);
        assert_eq!(e.metadata["interaction_id"], "i1");
        assert_eq!(e.timestamp, base_time() - Duration::minutes(300));
        assert_eq!(e.last_interaction_at(), base_time() - Duration::minutes(1));
    }

    #[test]
    fn out_of_order_repeats_keep_latest_time() {
        let data = collection(
            "x",
            vec![account("a", 1, 1, 100)],
            vec![post("p", "a", "hello", 0)],
            vec![
                interaction("i1", InteractionKind::Likes, "a", "p", 10),
                interaction("i2", InteractionKind::Likes, "a", "p", 50),
                interaction("i3", InteractionKind::Likes, "a", "p", 30),
            ],
        );
        let out = build(&AnalysisConfig::default(), &[data]);
        let e = out.graph.edges().next().unwrap();
        assert_eq!(e.interaction_count(), 3);
        assert_eq!(e.metadata["last_interaction_at"], "2026-03-01T12:50:00Z");
        assert_eq!(e.last_interaction_at(), base_time() + Duration::minutes(50));
    }

    #[test]
    fn mention_edges_resolve_by_id_and_handle() {
        let mut p = post("p", "a", "hey @b_handle and c", 0);
        p.mentions = vec!["@b_handle".into(), "c".into(), "ghost".into(), "a".into()];
        p.likes = 50;
        let data = collection(
            "x",
            vec![account("a", 1, 1, 100), account("b", 1, 1, 100), account("c", 1, 1, 100)],
            vec![p],
            vec![],
        );
        let out = build(&AnalysisConfig::default(), &[data]);
        let to_b = edge(&out.graph, "user_a", "user_b");
        assert_eq!(to_b.kind, InteractionKind::Mentions);
        assert!((to_b.weight - 1.2 * 1.2).abs() < 1e-9);
        edge(&out.graph, "user_a", "user_c");
        assert!(!out.graph.edges().any(|e| e.target == "user_a"));
        assert_eq!(out.stats.dangling_references, 1);
    }

    #[test]
    fn parent_edges_point_from_parent_to_child() {
        let mut share = child_post("s", "b", "p", true, 10);
        share.likes = 200;
        let reply = child_post("r", "b", "p", false, 20);
        let data = collection(
            "x",
            vec![account("a", 1, 1, 100), account("b", 1, 1, 100)],
            vec![post("p", "a", "root", 0), share, reply],
            vec![],
        );
        let out = build(&AnalysisConfig::default(), &[data]);
        let shared = edge(&out.graph, "post_p", "post_s");
        assert_eq!(shared.kind, InteractionKind::Shares);
        assert!((shared.weight - 5.0).abs() < 1e-9);
        let replied = edge(&out.graph, "post_p", "post_r");
        assert_eq!(replied.kind, InteractionKind::Replies);
        assert!((replied.weight - 1.8).abs() < 1e-9);
    }

    #[test]
    fn light_edges_are_dropped() {
        let config = AnalysisConfig {
            min_edge_weight: 1.0,
            ..Default::default()
        };
        let data = collection(
            "x",
            vec![account("a", 1, 1, 100)],
            vec![post("p", "a", "hello", 0)],
            vec![
                interaction("i1", InteractionKind::Likes, "a", "p", 1),
                interaction("i2", InteractionKind::Comments, "a", "p", 2),
            ],
        );
        let out = build(&config, &[data]);
        assert_eq!(out.graph.edge_count(), 1);
        assert_eq!(out.stats.dropped_edges, 1);
    }

    #[test]
    fn dangling_interactions_are_skipped() {
        let data = collection(
            "x",
            vec![account("a", 1, 1, 100)],
            vec![post("p", "a", "hello", 0)],
            vec![
                interaction("i1", InteractionKind::Likes, "ghost", "p", 1),
                interaction("i2", InteractionKind::Likes, "a", "missing", 1),
            ],
        );
        let out = build(&AnalysisConfig::default(), &[data]);
        assert_eq!(out.graph.edge_count(), 0);
        assert_eq!(out.stats.dangling_references, 2);
    }

    #[test]
    fn oversized_graph_keeps_most_important_nodes() {
        let config = AnalysisConfig {
            max_graph_size: 2,
            ..Default::default()
        };
        let data = collection(
            "x",
            vec![
                account("small", 1, 1, 100),
                account("big", 500, 10, 100),
                account("tie_first", 5, 5, 100),
                account("tie_second", 5, 5, 100),
            ],
            vec![],
            vec![],
        );
        let out = build(&config, &[data]);
        let ids: Vec<&str> = out.graph.nodes().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["user_big", "user_tie_first"]);
        assert_eq!(out.stats.pruned_nodes, 2);
    }

    #[test]
    fn pruning_removes_edges_touching_dropped_nodes() {
        let config = AnalysisConfig {
            max_graph_size: 2,
            ..Default::default()
        };
        let mut popular = post("p", "a", "popular", 0);
        popular.likes = 1_000;
        let data = collection(
            "x",
            vec![account("a", 100, 100, 100), account("b", 0, 0, 100)],
            vec![popular],
            vec![
                interaction("i1", InteractionKind::Likes, "a", "p", 1),
                interaction("i2", InteractionKind::Likes, "b", "p", 1),
            ],
        );
        let out = build(&config, &[data]);
        assert_eq!(out.graph.node_count(), 2);
        assert_eq!(out.graph.edge_count(), 1);
        assert_eq!(out.stats.pruned_edges, 1);
    }

    #[test]
    fn include_flags_filter_node_types() {
        let config = AnalysisConfig {
            include_user_nodes: false,
            ..Default::default()
        };
        let data = collection(
            "x",
            vec![account("a", 1, 1, 100)],
            vec![post("p", "a", "root", 0), child_post("c", "a", "p", false, 1)],
            vec![interaction("i1", InteractionKind::Likes, "a", "p", 1)],
        );
        let out = build(&config, &[data]);
        assert_eq!(out.stats.user_nodes, 0);
        assert_eq!(out.stats.post_nodes, 2);
        assert_eq!(out.graph.edge_count(), 1);
    }

    #[test]
    fn multiple_platforms_merge() {
        let a = collection("x", vec![account("a", 1, 1, 10)], vec![], vec![]);
        let mut b = collection("mastodon", vec![], vec![post("p", "a", "hi", 0)], vec![]);
        b.posts[0].platform = "mastodon".into();
        let out = build(&AnalysisConfig::default(), &[a, b]);
        assert_eq!(out.stats.platforms.len(), 2);
        let range = out.graph.metadata().time_range.unwrap();
        assert_eq!(range.start, base_time() - Duration::days(10));
        assert_eq!(range.end, base_time());
    }
}
