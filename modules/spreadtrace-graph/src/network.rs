//! Structural metrics over the propagation graph.
//!
//! Degree, PageRank, betweenness and closeness follow edge direction.
//! Clustering and eigenvector centrality use undirected neighbor sets.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashSet, VecDeque};

use petgraph::graph::NodeIndex;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use spreadtrace_common::AnalysisConfig;

use crate::graph::PropagationGraph;

/// Eigenvector power iteration stops once the L1 change drops below this.
const EIGENVECTOR_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NodeMetrics {
    pub node_id: String,
    pub in_degree: usize,
    pub out_degree: usize,
    pub degree: usize,
    pub betweenness_centrality: f64,
    pub closeness_centrality: f64,
    pub eigenvector_centrality: f64,
    pub page_rank: f64,
    pub clustering_coefficient: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NetworkAnalysis {
    pub metrics: BTreeMap<String, NodeMetrics>,
    /// Nodes whose betweenness exceeds the centrality threshold, most central first.
    pub central_nodes: Vec<String>,
    pub density: f64,
    pub average_clustering: f64,
}

impl NetworkAnalysis {
    pub fn get(&self, node_id: &str) -> Option<&NodeMetrics> {
        self.metrics.get(node_id)
    }

    /// Betweenness of a node, 0 when unknown.
    pub fn betweenness(&self, node_id: &str) -> f64 {
        self.get(node_id).map_or(0.0, |m| m.betweenness_centrality)
    }

    /// PageRank of a node, 0 when unknown.
    pub fn page_rank(&self, node_id: &str) -> f64 {
        self.get(node_id).map_or(0.0, |m| m.page_rank)
    }

    pub fn clustering(&self, node_id: &str) -> f64 {
        self.get(node_id).map_or(0.0, |m| m.clustering_coefficient)
    }
}

pub struct NetworkAnalyzer<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> NetworkAnalyzer<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, graph: &PropagationGraph) -> NetworkAnalysis {
        let n = graph.node_count();
        if n == 0 {
            return NetworkAnalysis::default();
        }

        let degrees = degrees(graph);
        let betweenness = betweenness_centrality(graph);
        let closeness = closeness_centrality(graph);
        let eigenvector = eigenvector_centrality(graph, self.config.page_rank_iterations);
        let ranks = page_rank(
            graph,
            self.config.page_rank_damping,
            self.config.page_rank_iterations,
        );
        let clustering = clustering_coefficients(graph);

        let mut metrics = BTreeMap::new();
        for (i, node) in graph.nodes().enumerate() {
            let (in_degree, out_degree) = degrees[i];
            metrics.insert(
                node.id.clone(),
                NodeMetrics {
                    node_id: node.id.clone(),
                    in_degree,
                    out_degree,
                    degree: in_degree + out_degree,
                    betweenness_centrality: betweenness[i],
                    closeness_centrality: closeness[i],
                    eigenvector_centrality: eigenvector[i],
                    page_rank: ranks[i],
                    clustering_coefficient: clustering[i],
                },
            );
        }

        let mut central: Vec<(usize, f64)> = betweenness
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, b)| *b > self.config.centrality_threshold)
            .collect();
        central.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        let central_nodes: Vec<String> = central
            .into_iter()
            .map(|(i, _)| graph.node_at(NodeIndex::new(i)).id.clone())
            .collect();

        let density = density(graph);
        let average_clustering = clustering.iter().sum::<f64>() / n as f64;

        info!(
            nodes = n,
            edges = graph.edge_count(),
            central = central_nodes.len(),
            density,
            average_clustering,
            "Network metrics computed"
        );

        NetworkAnalysis {
            metrics,
            central_nodes,
            density,
            average_clustering,
        }
    }
}

/// `(in_degree, out_degree)` per node position. Parallel edges of different
/// kinds each count.
pub fn degrees(graph: &PropagationGraph) -> Vec<(usize, usize)> {
    graph
        .node_indices()
        .map(|v| (graph.in_degree(v), graph.out_degree(v)))
        .collect()
}

/// Distinct ordered node pairs joined by at least one edge, over n(n-1).
/// Several edge kinds between the same pair count once.
pub fn density(graph: &PropagationGraph) -> f64 {
    let n = graph.node_count();
    if n < 2 {
        return 0.0;
    }
    let pairs: HashSet<(NodeIndex, NodeIndex)> = graph
        .links()
        .filter(|(s, t, _)| s != t)
        .map(|(s, t, _)| (s, t))
        .collect();
    pairs.len() as f64 / (n * (n - 1)) as f64
}

/// Single-path betweenness: for each ordered pair one weighted shortest path
/// is taken, and each node strictly inside it gains 1. Normalized by n(n-1).
pub fn betweenness_centrality(graph: &PropagationGraph) -> Vec<f64> {
    let n = graph.node_count();
    let mut counts = vec![0.0; n];
    if n < 2 {
        return counts;
    }

    for source in 0..n {
        let (dist, pred) = dijkstra(graph, source);
        for target in 0..n {
            if target == source || dist[target].is_infinite() {
                continue;
            }
            let mut v = pred[target];
            while let Some(node) = v {
                if node == source {
                    break;
                }
                counts[node] += 1.0;
                v = pred[node];
            }
        }
    }

    let norm = (n * (n - 1)) as f64;
    counts.iter_mut().for_each(|c| *c /= norm);
    counts
}

/// Reachable count over the sum of hop distances along outgoing edges.
pub fn closeness_centrality(graph: &PropagationGraph) -> Vec<f64> {
    let n = graph.node_count();
    let mut out = vec![0.0; n];
    for (source, score) in out.iter_mut().enumerate() {
        let hops = bfs_hops(graph, source);
        let (reachable, total) = hops
            .iter()
            .enumerate()
            .filter(|(i, h)| *i != source && h.is_some())
            .fold((0usize, 0usize), |(r, t), (_, h)| (r + 1, t + h.unwrap_or(0)));
        if reachable > 0 && total > 0 {
            *score = reachable as f64 / total as f64;
        }
    }
    out
}

/// Power iteration over undirected adjacency from a uniform `1/√n` start,
/// L2-normalized each round. Stops at `max_iterations` or on convergence.
pub fn eigenvector_centrality(graph: &PropagationGraph, max_iterations: usize) -> Vec<f64> {
    power_iteration(graph, max_iterations).0
}

/// Eigenvector values and the number of rounds actually run.
fn power_iteration(graph: &PropagationGraph, max_iterations: usize) -> (Vec<f64>, usize) {
    let n = graph.node_count();
    if n == 0 {
        return (Vec::new(), 0);
    }
    let neighbors = graph.undirected_neighbors();
    let mut values = vec![1.0 / (n as f64).sqrt(); n];

    for round in 1..=max_iterations {
        let mut next: Vec<f64> = neighbors
            .iter()
            .map(|ns| ns.iter().map(|&u| values[u]).sum())
            .collect();
        let norm = next.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm == 0.0 {
            return (vec![0.0; n], round);
        }
        next.iter_mut().for_each(|x| *x /= norm);
        let change: f64 = next
            .iter()
            .zip(values.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        values = next;
        if change < EIGENVECTOR_TOLERANCE {
            return (values, round);
        }
    }
    (values, max_iterations)
}

/// PageRank for exactly `iterations` rounds. Rank held by nodes without
/// outgoing edges is spread evenly so the total stays at 1.
pub fn page_rank(graph: &PropagationGraph, damping: f64, iterations: usize) -> Vec<f64> {
    let n = graph.node_count();
    if n == 0 {
        return Vec::new();
    }
    let nf = n as f64;
    let out_degree: Vec<usize> = graph.node_indices().map(|v| graph.out_degree(v)).collect();
    let mut ranks = vec![1.0 / nf; n];

    for _ in 0..iterations {
        let dangling: f64 = (0..n)
            .filter(|&i| out_degree[i] == 0)
            .map(|i| ranks[i])
            .sum();
        let base = (1.0 - damping) / nf + damping * dangling / nf;
        let next: Vec<f64> = graph
            .node_indices()
            .map(|v| {
                let inbound: f64 = graph
                    .incoming(v)
                    .map(|(s, _)| ranks[s.index()] / out_degree[s.index()] as f64)
                    .sum();
                base + damping * inbound
            })
            .collect();
        ranks = next;
    }
    ranks
}

/// `2T / (k(k-1))` over undirected neighbors; 0 for fewer than two neighbors.
pub fn clustering_coefficients(graph: &PropagationGraph) -> Vec<f64> {
    let neighbors = graph.undirected_neighbors();
    neighbors
        .iter()
        .map(|ns| {
            let k = ns.len();
            if k < 2 {
                return 0.0;
            }
            let members: Vec<usize> = ns.iter().copied().collect();
            let mut triangles = 0usize;
            for (i, &a) in members.iter().enumerate() {
                for &b in &members[i + 1..] {
                    if neighbors[a].contains(&b) {
                        triangles += 1;
                    }
                }
            }
            2.0 * triangles as f64 / (k * (k - 1)) as f64
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Frontier {
    dist: f64,
    node: usize,
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on distance, lower index first on ties.
        other
            .dist
            .partial_cmp(&self.dist)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Weighted shortest paths from `source` with one predecessor per node.
fn dijkstra(graph: &PropagationGraph, source: usize) -> (Vec<f64>, Vec<Option<usize>>) {
    let n = graph.node_count();
    let mut dist = vec![f64::INFINITY; n];
    let mut pred: Vec<Option<usize>> = vec![None; n];
    let mut heap = BinaryHeap::new();
    dist[source] = 0.0;
    heap.push(Frontier { dist: 0.0, node: source });

    while let Some(Frontier { dist: d, node }) = heap.pop() {
        if d > dist[node] {
            continue;
        }
        for (next, edge) in graph.outgoing(NodeIndex::new(node)) {
            let next = next.index();
            if next == node {
                continue;
            }
            let candidate = d + edge.weight.max(0.0);
            if candidate < dist[next] {
                dist[next] = candidate;
                pred[next] = Some(node);
                heap.push(Frontier { dist: candidate, node: next });
            }
        }
    }
    (dist, pred)
}

fn bfs_hops(graph: &PropagationGraph, source: usize) -> Vec<Option<usize>> {
    let mut hops = vec![None; graph.node_count()];
    hops[source] = Some(0);
    let mut queue = VecDeque::from([source]);
    while let Some(node) = queue.pop_front() {
        let depth = hops[node].unwrap_or(0);
        for (next, _) in graph.outgoing(NodeIndex::new(node)) {
            let next = next.index();
            if hops[next].is_none() {
                hops[next] = Some(depth + 1);
                queue.push_back(next);
            }
        }
    }
    hops
}
