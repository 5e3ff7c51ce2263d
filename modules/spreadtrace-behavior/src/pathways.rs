//! Misinformation pathways: low-credibility viral posts traced down their
//! reply/share cascade, with prioritized intervention points.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use spreadtrace_common::{Account, AnalysisConfig, Post};
use spreadtrace_graph::{NetworkAnalysis, NodeIndex, PropagationGraph};

use crate::virality::{direct_reach, ViralityMetrics};

const KEY_CONNECTOR_BETWEENNESS: f64 = 0.2;
const INFLUENTIAL_PAGE_RANK: f64 = 0.1;
const HIGH_REACH_FOLLOWERS: u64 = 10_000;
const LONG_CONTENT_CHARS: usize = 100;
const NEW_AUTHOR_DAYS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InterventionPriority {
    Critical,
    High,
    Medium,
}

impl InterventionPriority {
    pub fn recommended_action(self) -> &'static str {
        match self {
            Self::Critical => "Escalate for immediate review and restrict onward distribution",
            Self::High => "Attach context labels to slow resharing through this connector",
            Self::Medium => "Monitor for further amplification",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InterventionPoint {
    pub node_id: String,
    pub priority: InterventionPriority,
    pub reason: String,
    pub recommended_action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MisinformationPathway {
    pub id: String,
    pub source_post: String,
    /// Post node ids in BFS order from the source.
    pub path: Vec<String>,
    pub key_nodes: Vec<String>,
    pub amplification_points: Vec<String>,
    /// Distinct accounts reaching any post on the path.
    pub total_reach: usize,
    pub credibility: f64,
    pub virality_score: f64,
    pub intervention_points: Vec<InterventionPoint>,
}

pub struct PathwayTracer<'a> {
    config: &'a AnalysisConfig,
    now: DateTime<Utc>,
}

impl<'a> PathwayTracer<'a> {
    pub fn new(config: &'a AnalysisConfig, now: DateTime<Utc>) -> Self {
        Self { config, now }
    }

    /// Pathways from every post above the virality threshold and below the
    /// credibility threshold, in the order `virality` lists the posts.
    pub fn trace(
        &self,
        graph: &PropagationGraph,
        network: &NetworkAnalysis,
        virality: &[ViralityMetrics],
    ) -> Vec<MisinformationPathway> {
        let authors_by_text = if self.config.credibility_penalties {
            authors_by_text(graph)
        } else {
            HashMap::new()
        };
        let mut pathways = Vec::new();
        let mut candidates = 0usize;

        for metrics in virality {
            if metrics.virality_score <= self.config.virality_threshold {
                continue;
            }
            let Some(index) = graph.index_of(&metrics.node_id) else { continue };
            let Some(post) = graph.node_at(index).as_post() else { continue };
            let author = graph
                .author_of(post)
                .and_then(|a| graph.node_at(a).as_account());
            let mut credibility = credibility(post, author);
            if self.config.credibility_penalties {
                credibility -= credibility_penalty(post, author, &authors_by_text, self.now);
                credibility = credibility.clamp(0.0, 1.0);
            }
            if credibility >= self.config.credibility_threshold {
                continue;
            }
            candidates += 1;

            let (path, amplification) = walk(graph, index);
            if path.len() < 2 {
                continue;
            }

            pathways.push(MisinformationPathway {
                id: format!("pathway_{}", pathways.len()),
                source_post: metrics.node_id.clone(),
                path: path.iter().map(|&i| graph.node_at(i).id.clone()).collect(),
                key_nodes: path
                    .iter()
                    .map(|&i| graph.node_at(i).id.clone())
                    .filter(|id| network.betweenness(id) > self.config.centrality_threshold)
                    .collect(),
                amplification_points: amplification
                    .iter()
                    .map(|&i| graph.node_at(i).id.clone())
                    .collect(),
                total_reach: path
                    .iter()
                    .flat_map(|&i| direct_reach(graph, i))
                    .collect::<HashSet<_>>()
                    .len(),
                credibility,
                virality_score: metrics.virality_score,
                intervention_points: intervention_points(graph, network, &path),
            });
        }

        info!(
            candidates,
            pathways = pathways.len(),
            "Misinformation pathway tracing complete"
        );
        pathways
    }
}

/// Heuristic source credibility in [0, 1]: 0.5 base, raised by a verified
/// author, links, hashtags and long text.
pub fn credibility(post: &Post, author: Option<&Account>) -> f64 {
    let mut score: f64 = 0.5;
    if author.is_some_and(|a| a.verified) {
        score += 0.2;
    }
    if !post.urls.is_empty() {
        score += 0.1;
    }
    if !post.hashtags.is_empty() {
        score += 0.1;
    }
    if post.content.chars().count() > LONG_CONTENT_CHARS {
        score += 0.1;
    }
    score.min(1.0)
}

/// Deduction for a brand new author and for text another author posted
/// verbatim, 0.2 each.
pub fn credibility_penalty(
    post: &Post,
    author: Option<&Account>,
    authors_by_text: &HashMap<String, BTreeSet<String>>,
    now: DateTime<Utc>,
) -> f64 {
    let mut penalty = 0.0;
    if author.is_some_and(|a| a.age_days(now) < NEW_AUTHOR_DAYS) {
        penalty += 0.2;
    }
    let copied = authors_by_text
        .get(post.content.trim())
        .is_some_and(|authors| authors.iter().any(|a| *a != post.author_id));
    if copied {
        penalty += 0.2;
    }
    penalty
}

/// Author ids for each distinct trimmed post text.
pub fn authors_by_text(graph: &PropagationGraph) -> HashMap<String, BTreeSet<String>> {
    let mut map: HashMap<String, BTreeSet<String>> = HashMap::new();
    for (_, post) in graph.posts() {
        let text = post.content.trim();
        if !text.is_empty() {
            map.entry(text.to_string())
                .or_default()
                .insert(post.author_id.clone());
        }
    }
    map
}

/// Cascade posts in BFS order, and the posts reached through an amplifying
/// edge.
fn walk(graph: &PropagationGraph, source: NodeIndex) -> (Vec<NodeIndex>, Vec<NodeIndex>) {
    let steps = graph.cascade(source);
    let amplification = steps
        .iter()
        .filter(|s| s.via.is_some_and(|kind| kind.is_amplifying()))
        .map(|s| s.node)
        .collect();
    (steps.into_iter().map(|s| s.node).collect(), amplification)
}

/// Path posts and their authors that warrant action, most urgent first.
fn intervention_points(
    graph: &PropagationGraph,
    network: &NetworkAnalysis,
    path: &[NodeIndex],
) -> Vec<InterventionPoint> {
    let mut candidates = Vec::new();
    let mut seen = HashSet::new();
    for &index in path {
        let author = graph.node_at(index).as_post().and_then(|p| graph.author_of(p));
        for candidate in std::iter::once(index).chain(author) {
            if seen.insert(candidate) {
                candidates.push(candidate);
            }
        }
    }

    let mut points: Vec<InterventionPoint> = candidates
        .into_iter()
        .filter_map(|index| {
            let node = graph.node_at(index);
            let key_connector = network.betweenness(&node.id) > KEY_CONNECTOR_BETWEENNESS;
            let mut medium = Vec::new();
            if network.page_rank(&node.id) > INFLUENTIAL_PAGE_RANK {
                medium.push("influential node");
            }
            if node
                .as_account()
                .is_some_and(|a| !a.verified && a.follower_count > HIGH_REACH_FOLLOWERS)
            {
                medium.push("unverified high-reach account");
            }

            let priority = match (key_connector, medium.is_empty()) {
                (true, false) => InterventionPriority::Critical,
                (true, true) => InterventionPriority::High,
                (false, false) => InterventionPriority::Medium,
                (false, true) => return None,
            };
            let mut reasons = Vec::new();
            if key_connector {
                reasons.push("key connector");
            }
            reasons.extend(medium);

            Some(InterventionPoint {
                node_id: node.id.clone(),
                priority,
                reason: reasons.join("; "),
                recommended_action: priority.recommended_action().to_string(),
            })
        })
        .collect();

    points.sort_by_key(|p| p.priority);
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use spreadtrace_common::fixtures::{account, base_time, child_post, collection, post, verified_account};
    use spreadtrace_graph::{GraphBuilder, NetworkAnalyzer};

    fn viral(node_id: &str, score: f64) -> ViralityMetrics {
        ViralityMetrics {
            node_id: node_id.to_string(),
            reach: 0,
            engagement: 0,
            velocity: 0.0,
            amplification: 0.0,
            cascade_depth: 0,
            unique_users: 0,
            time_to_viral_minutes: None,
            peak_activity_hour: None,
            virality_score: score,
        }
    }

    // --- credibility ---

    #[test]
    fn credibility_rewards_sourcing() {
        let author = verified_account("a", 1, 1, 400);
        let mut p = post("p", "a", "claim", 0);
        p.urls = vec!["https://example.org/report".into()];
        p.hashtags = vec!["news".into()];
        assert!((credibility(&p, Some(&author)) - 0.9).abs() < 1e-10);
        // a brand new unverified author changes nothing without penalties
        let fresh = account("a", 1, 1, 2);
        assert!((credibility(&post("q", "a", "claim", 0), Some(&fresh)) - 0.5).abs() < 1e-10);
    }

    #[test]
    fn penalties_hit_new_authors_and_copies() {
        let fresh = account("a", 1, 1, 2);
        let copies = HashMap::from([(
            "claim".to_string(),
            BTreeSet::from(["a".to_string(), "b".to_string()]),
        )]);
        let bare = post("p", "a", "claim", 0);
        let penalty = credibility_penalty(&bare, Some(&fresh), &copies, base_time());
        assert!((penalty - 0.4).abs() < 1e-10);
    }

    #[test]
    fn own_repeated_text_is_not_a_copy() {
        let copies = HashMap::from([("claim".to_string(), BTreeSet::from(["a".to_string()]))]);
        let p = post("p", "a", "claim", 0);
        assert_eq!(credibility_penalty(&p, None, &copies, base_time()), 0.0);
    }

    // --- tracing ---

    fn spreading_graph() -> PropagationGraph {
        let data = collection(
            "x",
            vec![
                account("fresh", 20_000, 10, 3),
                account("echo", 5, 5, 3),
                account("b", 5, 5, 300),
                account("c", 5, 5, 300),
            ],
            vec![
                post("s", "fresh", "Miracle cure hidden by doctors", 0),
                post("dup", "echo", "Miracle cure hidden by doctors", 1),
                child_post("c1", "b", "s", true, 5),
                child_post("c2", "c", "c1", false, 9),
            ],
            vec![],
        );
        GraphBuilder::new(&AnalysisConfig::default(), base_time())
            .build(&[data])
            .graph
    }

    fn penalizing() -> AnalysisConfig {
        AnalysisConfig {
            credibility_penalties: true,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn low_credibility_viral_post_yields_pathway() {
        let graph = spreading_graph();
        let config = penalizing();
        let network = NetworkAnalyzer::new(&config).analyze(&graph);
        let pathways = PathwayTracer::new(&config, base_time())
            .trace(&graph, &network, &[viral("post_s", 0.9)]);

        assert_eq!(pathways.len(), 1);
        let pathway = &pathways[0];
        assert_eq!(pathway.path, vec!["post_s", "post_c1", "post_c2"]);
        assert_eq!(pathway.amplification_points, vec!["post_c1"]);
        assert!((pathway.credibility - 0.1).abs() < 1e-10);

        let fresh = pathway
            .intervention_points
            .iter()
            .find(|p| p.node_id == "user_fresh")
            .unwrap();
        assert!(fresh.reason.contains("unverified high-reach account"));
        assert!(pathway
            .intervention_points
            .windows(2)
            .all(|w| w[0].priority <= w[1].priority));
    }

    #[test]
    fn base_formula_never_drops_below_half() {
        let graph = spreading_graph();
        let config = AnalysisConfig::default();
        let network = NetworkAnalyzer::new(&config).analyze(&graph);
        let tracer = PathwayTracer::new(&config, base_time());
        assert!(tracer.trace(&graph, &network, &[viral("post_s", 0.9)]).is_empty());

        let lenient = AnalysisConfig {
            credibility_threshold: 0.6,
            ..AnalysisConfig::default()
        };
        let pathways = PathwayTracer::new(&lenient, base_time())
            .trace(&graph, &network, &[viral("post_s", 0.9)]);
        assert_eq!(pathways.len(), 1);
        assert!((pathways[0].credibility - 0.5).abs() < 1e-10);
    }

    #[test]
    fn credible_or_quiet_posts_are_skipped() {
        let graph = spreading_graph();
        let config = penalizing();
        let network = NetworkAnalyzer::new(&config).analyze(&graph);
        let tracer = PathwayTracer::new(&config, base_time());
        // at the threshold is not above it
        assert!(tracer.trace(&graph, &network, &[viral("post_s", 0.7)]).is_empty());
        // a leaf post has no onward path
        assert!(tracer.trace(&graph, &network, &[viral("post_dup", 0.95)]).is_empty());
    }

    #[test]
    fn no_post_edges_means_no_pathways() {
        let data = collection(
            "x",
            vec![account("a", 1, 1, 1), account("b", 1, 1, 1)],
            vec![post("p1", "a", "same words", 0), post("p2", "b", "same words", 0)],
            vec![],
        );
        let graph = GraphBuilder::new(&AnalysisConfig::default(), base_time())
            .build(&[data])
            .graph;
        let config = AnalysisConfig::default();
        let network = NetworkAnalyzer::new(&config).analyze(&graph);
        let pathways = PathwayTracer::new(&config, base_time())
            .trace(&graph, &network, &[viral("post_p1", 1.0), viral("post_p2", 1.0)]);
        assert!(pathways.is_empty());
    }
}
