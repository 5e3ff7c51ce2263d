//! Community detection by greedy modularity optimization.
//!
//! A single-level, Louvain-style pass: every node starts alone and repeatedly
//! moves into the neighboring community with the best modularity gain. There
//! is no aggregation phase. The configured resolution is not applied.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use petgraph::graph::NodeIndex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use spreadtrace_common::text::{mean_pairwise_jaccard, word_set};
use spreadtrace_common::AnalysisConfig;

use crate::graph::{user_node_id, PropagationGraph};
use crate::network::NetworkAnalysis;

const MAX_PASSES: usize = 10;

/// Posts sampled per community when scoring content similarity.
const MAX_SIMILARITY_POSTS: usize = 100;

const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Community {
    pub id: String,
    pub members: Vec<String>,
    pub size: usize,
    /// This community's term of the global modularity.
    pub modularity: f64,
    pub density: f64,
    pub average_clustering: f64,
    pub content_similarity: f64,
    /// Mean age of member accounts; `None` when no accounts are members.
    pub average_account_age_days: Option<f64>,
    pub suspicious_score: f64,
}

impl Community {
    /// Member node ids that are accounts.
    pub fn account_members(&self) -> impl Iterator<Item = &String> {
        self.members.iter().filter(|m| m.starts_with("user_"))
    }
}

pub struct CommunityDetector<'a> {
    config: &'a AnalysisConfig,
    now: DateTime<Utc>,
}

impl<'a> CommunityDetector<'a> {
    pub fn new(config: &'a AnalysisConfig, now: DateTime<Utc>) -> Self {
        Self { config, now }
    }

    /// Communities of two or more nodes, most suspicious first.
    pub fn detect(&self, graph: &PropagationGraph, network: &NetworkAnalysis) -> Vec<Community> {
        let neighbors = graph.undirected_neighbors();
        let labels = greedy_modularity(&neighbors);
        let degree_total: usize = neighbors.iter().map(|n| n.len()).sum();
        if degree_total == 0 {
            return Vec::new();
        }
        let m = degree_total as f64 / 2.0;

        let mut groups: BTreeMap<usize, Vec<NodeIndex>> = BTreeMap::new();
        for (node, &label) in labels.iter().enumerate() {
            groups.entry(label).or_default().push(NodeIndex::new(node));
        }

        let posts_by_author = graph.posts_by_author();
        let mut communities: Vec<Community> = groups
            .into_values()
            .filter(|members| members.len() >= 2)
            .enumerate()
            .map(|(k, members)| {
                self.describe(k, &members, graph, network, &neighbors, m, &posts_by_author)
            })
            .collect();

        communities.sort_by(|a, b| {
            b.suspicious_score
                .partial_cmp(&a.suspicious_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.size.cmp(&a.size))
                .then_with(|| a.id.cmp(&b.id))
        });

        info!(
            communities = communities.len(),
            suspicious = communities.iter().filter(|c| c.suspicious_score > 0.7).count(),
            resolution = self.config.community_resolution,
            "Community detection complete"
        );
        communities
    }

    #[allow(clippy::too_many_arguments)]
    fn describe(
        &self,
        k: usize,
        members: &[NodeIndex],
        graph: &PropagationGraph,
        network: &NetworkAnalysis,
        neighbors: &[BTreeSet<usize>],
        m: f64,
        posts_by_author: &HashMap<String, Vec<NodeIndex>>,
    ) -> Community {
        let size = members.len();
        let member_set: HashSet<usize> = members.iter().map(|v| v.index()).collect();
        let internal: usize = members
            .iter()
            .map(|v| neighbors[v.index()].iter().filter(|u| member_set.contains(u)).count())
            .sum();
        let degree: usize = members.iter().map(|v| neighbors[v.index()].len()).sum();
        let modularity = (internal as f64 / 2.0) / m - (degree as f64 / (2.0 * m)).powi(2);
        let density = internal as f64 / (size * (size - 1)) as f64;

        let ids: Vec<String> = members.iter().map(|&v| graph.node_at(v).id.clone()).collect();
        let average_clustering =
            ids.iter().map(|id| network.clustering(id)).sum::<f64>() / size as f64;

        // Member posts plus posts written by member accounts.
        let mut post_indices: BTreeSet<NodeIndex> = BTreeSet::new();
        let mut ages: Vec<f64> = Vec::new();
        for &v in members {
            let node = graph.node_at(v);
            if node.as_post().is_some() {
                post_indices.insert(v);
            }
            if let Some(account) = node.as_account() {
                ages.push(account.age_days(self.now));
                if let Some(authored) = posts_by_author.get(&user_node_id(&account.id)) {
                    post_indices.extend(authored.iter().copied());
                }
            }
        }
        let word_sets: Vec<_> = post_indices
            .iter()
            .take(MAX_SIMILARITY_POSTS)
            .filter_map(|&i| graph.node_at(i).as_post())
            .map(|p| word_set(&p.content))
            .collect();
        let content_similarity = mean_pairwise_jaccard(&word_sets);
        let average_account_age_days =
            (!ages.is_empty()).then(|| ages.iter().sum::<f64>() / ages.len() as f64);

        let mut suspicious_score: f64 = 0.0;
        if density > 0.8 {
            suspicious_score += 0.3;
        }
        if content_similarity > 0.7 {
            suspicious_score += 0.4;
        }
        if average_account_age_days.is_some_and(|age| age < 30.0) {
            suspicious_score += 0.3;
        }

        Community {
            id: format!("community_{k}"),
            members: ids,
            size,
            modularity,
            density,
            average_clustering,
            content_similarity,
            average_account_age_days,
            suspicious_score: suspicious_score.min(1.0),
        }
    }
}

/// Community label per node after greedy local moves over undirected
/// adjacency. Labels are node indices of a founding member.
pub fn greedy_modularity(neighbors: &[BTreeSet<usize>]) -> Vec<usize> {
    let n = neighbors.len();
    let mut labels: Vec<usize> = (0..n).collect();
    let degree: Vec<f64> = neighbors.iter().map(|ns| ns.len() as f64).collect();
    let m = degree.iter().sum::<f64>() / 2.0;
    if m == 0.0 {
        return labels;
    }
    let mut community_degree = degree.clone();

    for _ in 0..MAX_PASSES {
        let mut improved = false;
        for v in 0..n {
            if neighbors[v].is_empty() {
                continue;
            }
            let current = labels[v];
            let mut links: BTreeMap<usize, f64> = BTreeMap::new();
            for &u in &neighbors[v] {
                *links.entry(labels[u]).or_insert(0.0) += 1.0;
            }
            let k = degree[v];
            let k_current = links.get(&current).copied().unwrap_or(0.0);
            let d_current = community_degree[current];

            let mut best: Option<(usize, f64)> = None;
            for (&candidate, &k_candidate) in &links {
                if candidate == current {
                    continue;
                }
                let d_candidate = community_degree[candidate];
                let gain = (k_candidate - k_current) / m
                    - ((d_current - k).powi(2) + (d_candidate + k).powi(2)
                        - d_current.powi(2)
                        - d_candidate.powi(2))
                        / (4.0 * m * m);
                if gain > MIN_GAIN && best.map_or(true, |(_, g)| gain > g) {
                    best = Some((candidate, gain));
                }
            }

            if let Some((target, _)) = best {
                community_degree[current] -= k;
                community_degree[target] += k;
                labels[v] = target;
                improved = true;
            }
        }
        if !improved {
            break;
        }
    }
    labels
}

/// Global modularity of a labeling over undirected adjacency.
pub fn modularity(neighbors: &[BTreeSet<usize>], labels: &[usize]) -> f64 {
    let m = neighbors.iter().map(|n| n.len()).sum::<usize>() as f64 / 2.0;
    if m == 0.0 {
        return 0.0;
    }
    let mut internal: BTreeMap<usize, f64> = BTreeMap::new();
    let mut degree: BTreeMap<usize, f64> = BTreeMap::new();
    for (v, ns) in neighbors.iter().enumerate() {
        *degree.entry(labels[v]).or_insert(0.0) += ns.len() as f64;
        let inside = ns.iter().filter(|&&u| labels[u] == labels[v]).count() as f64;
        *internal.entry(labels[v]).or_insert(0.0) += inside;
    }
    degree
        .iter()
        .map(|(c, d)| {
            let i = internal.get(c).copied().unwrap_or(0.0);
            (i / 2.0 - d * d / (4.0 * m)) / m
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeKind, PropagationEdge, PropagationNode};
    use crate::network::NetworkAnalyzer;
    use spreadtrace_common::fixtures::{account, base_time, post};

    fn mention(source: &str, target: &str) -> PropagationEdge {
        PropagationEdge {
            source: format!("user_{source}"),
            target: format!("user_{target}"),
            kind: EdgeKind::Mentions,
            weight: 1.2,
            timestamp: base_time(),
            metadata: Default::default(),
        }
    }

    /// Two triangles joined by c–d. The first is new accounts posting the same text.
    fn two_triangles() -> PropagationGraph {
        let mut nodes = vec![
            PropagationNode::user(account("a", 1, 1, 3)),
            PropagationNode::user(account("b", 1, 1, 3)),
            PropagationNode::user(account("c", 1, 1, 3)),
            PropagationNode::user(account("d", 1, 1, 400)),
            PropagationNode::user(account("e", 1, 1, 400)),
            PropagationNode::user(account("f", 1, 1, 400)),
        ];
        for (i, author) in ["a", "b", "c"].iter().enumerate() {
            nodes.push(PropagationNode::post(post(
                &format!("dup{i}"),
                author,
                "the election was stolen share now",
                i as i64,
            )));
        }
        for (i, (author, text)) in [("d", "lovely weather"), ("e", "match tonight"), ("f", "new recipe")]
            .iter()
            .enumerate()
        {
            nodes.push(PropagationNode::post(post(&format!("own{i}"), author, text, i as i64)));
        }
        PropagationGraph::new(
            nodes,
            vec![
                mention("a", "b"),
                mention("b", "c"),
                mention("c", "a"),
                mention("c", "d"),
                mention("d", "e"),
                mention("e", "f"),
                mention("f", "d"),
            ],
        )
    }

    fn detect(graph: &PropagationGraph) -> Vec<Community> {
        let config = AnalysisConfig::default();
        let network = NetworkAnalyzer::new(&config).analyze(graph);
        CommunityDetector::new(&config, base_time()).detect(graph, &network)
    }

    #[test]
    fn splits_two_triangles() {
        let communities = detect(&two_triangles());
        assert_eq!(communities.len(), 2);
        let mut first = communities[0].members.clone();
        first.sort();
        assert_eq!(first, vec!["user_a", "user_b", "user_c"]);
        assert!((communities[0].density - 1.0).abs() < 1e-10);
    }

    #[test]
    fn coordinated_new_cluster_ranks_first() {
        let communities = detect(&two_triangles());
        assert!((communities[0].suspicious_score - 1.0).abs() < 1e-10);
        assert!((communities[0].content_similarity - 1.0).abs() < 1e-10);
        assert!((communities[1].suspicious_score - 0.3).abs() < 1e-10);
        assert!(communities
            .windows(2)
            .all(|w| w[0].suspicious_score >= w[1].suspicious_score));
    }

    #[test]
    fn singletons_are_discarded() {
        let graph = PropagationGraph::new(
            vec![
                PropagationNode::user(account("a", 1, 1, 100)),
                PropagationNode::user(account("b", 1, 1, 100)),
                PropagationNode::user(account("loner", 1, 1, 100)),
            ],
            vec![mention("a", "b")],
        );
        let communities = detect(&graph);
        assert_eq!(communities.len(), 1);
        assert!(communities.iter().all(|c| c.size >= 2));
    }

    #[test]
    fn greedy_moves_never_lower_modularity() {
        let graph = two_triangles();
        let neighbors = graph.undirected_neighbors();
        let singletons: Vec<usize> = (0..neighbors.len()).collect();
        let labels = greedy_modularity(&neighbors);
        assert!(modularity(&neighbors, &labels) > modularity(&neighbors, &singletons));
    }

    #[test]
    fn edgeless_graph_has_no_communities() {
        let graph = PropagationGraph::new(
            vec![PropagationNode::user(account("a", 1, 1, 100))],
            vec![],
        );
        assert!(detect(&graph).is_empty());
    }
}
