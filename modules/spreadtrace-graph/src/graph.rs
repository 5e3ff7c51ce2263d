//! Propagation graph: account and post nodes joined by directed interaction
//! edges, stored in a petgraph `DiGraph` with an id lookup on the side.
//!
//! Nodes are addressed by stable string ids (`user_<id>`, `post_<id>`). All
//! cross references (post author, reply parent) are id lookups, never pointers.
//! Once constructed the graph is read-only.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use petgraph::graph::{DiGraph, EdgeReference, NodeIndex};
use petgraph::visit::{Bfs, EdgeFiltered, EdgeRef};
use petgraph::Direction;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use spreadtrace_common::{Account, InteractionKind, Post, TimeRange};

pub type EdgeKind = InteractionKind;

/// Node id for an account.
pub fn user_node_id(account_id: &str) -> String {
    format!("user_{account_id}")
}

/// Node id for a post.
pub fn post_node_id(post_id: &str) -> String {
    format!("post_{post_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    User,
    Post,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::User => write!(f, "user"),
            NodeKind::Post => write!(f, "post"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NodePayload {
    User(Account),
    Post(Post),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PropagationNode {
    pub id: String,
    pub payload: NodePayload,
    pub timestamp: DateTime<Utc>,
}

impl PropagationNode {
    pub fn user(account: Account) -> Self {
        Self {
            id: user_node_id(&account.id),
            timestamp: account.created_at,
            payload: NodePayload::User(account),
        }
    }

    pub fn post(post: Post) -> Self {
        Self {
            id: post_node_id(&post.id),
            timestamp: post.created_at,
            payload: NodePayload::Post(post),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self.payload {
            NodePayload::User(_) => NodeKind::User,
            NodePayload::Post(_) => NodeKind::Post,
        }
    }

    pub fn platform(&self) -> &str {
        match &self.payload {
            NodePayload::User(a) => &a.platform,
            NodePayload::Post(p) => &p.platform,
        }
    }

    pub fn as_account(&self) -> Option<&Account> {
        match &self.payload {
            NodePayload::User(a) => Some(a),
            NodePayload::Post(_) => None,
        }
    }

    pub fn as_post(&self) -> Option<&Post> {
        match &self.payload {
            NodePayload::Post(p) => Some(p),
            NodePayload::User(_) => None,
        }
    }

    /// Ranking used when the graph must be pruned to its maximum size.
    pub fn importance(&self) -> u64 {
        match &self.payload {
            NodePayload::User(a) => a.follower_count.saturating_add(a.following_count),
            NodePayload::Post(p) => p.engagement(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PropagationEdge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    pub weight: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Edge metadata key counting the interactions folded into one edge.
pub const INTERACTION_COUNT: &str = "interaction_count";
/// Edge metadata key holding the latest folded interaction time (RFC 3339).
pub const LAST_INTERACTION_AT: &str = "last_interaction_at";

impl PropagationEdge {
    /// Interactions this edge stands for; 1 when never folded.
    pub fn interaction_count(&self) -> u64 {
        self.metadata
            .get(INTERACTION_COUNT)
            .and_then(|v| v.as_u64())
            .unwrap_or(1)
    }

    /// Latest interaction folded into this edge, never before `timestamp`.
    pub fn last_interaction_at(&self) -> DateTime<Utc> {
        self.metadata
            .get(LAST_INTERACTION_AT)
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .map_or(self.timestamp, |t| t.max(self.timestamp))
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            source: self.source.clone(),
            target: self.target.clone(),
            kind: self.kind,
        }
    }
}

/// Identity of an edge. Repeat interactions on the same key share one edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GraphMetadata {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub time_range: Option<TimeRange>,
    pub platforms: BTreeSet<String>,
}

/// One post reached while walking a cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeStep {
    pub node: NodeIndex,
    /// Hops from the cascade root.
    pub depth: usize,
    /// Kind of the edge the post was first reached through; `None` for the root.
    pub via: Option<EdgeKind>,
}

/// Directed multigraph of accounts and posts. Node indices are dense and
/// follow insertion order, so `NodeIndex::index()` addresses per-node vectors.
#[derive(Debug, Clone)]
pub struct PropagationGraph {
    graph: DiGraph<PropagationNode, PropagationEdge>,
    index: HashMap<String, NodeIndex>,
    metadata: GraphMetadata,
}

impl PropagationGraph {
    /// Assemble a graph. Duplicate node ids keep their first occurrence,
    /// edges with a missing endpoint are dropped, and edges repeating an
    /// existing `(source, target, kind)` key are dropped.
    pub fn new(nodes: Vec<PropagationNode>, edges: Vec<PropagationEdge>) -> Self {
        let mut graph = DiGraph::with_capacity(nodes.len(), edges.len());
        let mut index: HashMap<String, NodeIndex> = HashMap::with_capacity(nodes.len());
        let mut platforms = BTreeSet::new();
        let mut time_range: Option<TimeRange> = None;

        for node in nodes {
            if index.contains_key(&node.id) {
                continue;
            }
            platforms.insert(node.platform().to_string());
            match time_range.as_mut() {
                Some(range) => range.include(node.timestamp),
                None => time_range = Some(TimeRange::at(node.timestamp)),
            }
            let id = node.id.clone();
            index.insert(id, graph.add_node(node));
        }

        let mut seen: HashSet<EdgeKey> = HashSet::new();
        for edge in edges {
            let (Some(&s), Some(&t)) = (index.get(&edge.source), index.get(&edge.target)) else {
                continue;
            };
            if !seen.insert(edge.key()) {
                continue;
            }
            graph.add_edge(s, t, edge);
        }

        let metadata = GraphMetadata {
            total_nodes: graph.node_count(),
            total_edges: graph.edge_count(),
            time_range,
            platforms,
        };

        Self {
            graph,
            index,
            metadata,
        }
    }

    pub fn metadata(&self) -> &GraphMetadata {
        &self.metadata
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &PropagationNode> {
        self.graph.node_weights()
    }

    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> {
        self.graph.node_indices()
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &PropagationEdge> {
        self.graph.edge_weights()
    }

    /// Every edge with its `(source, target)` node indices.
    pub fn links(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex, &PropagationEdge)> {
        self.graph
            .edge_references()
            .map(|e| (e.source(), e.target(), e.weight()))
    }

    pub fn node(&self, id: &str) -> Option<&PropagationNode> {
        self.index.get(id).map(|&i| &self.graph[i])
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub fn node_at(&self, index: NodeIndex) -> &PropagationNode {
        &self.graph[index]
    }

    /// Edges leaving `index` with their target.
    pub fn outgoing(&self, index: NodeIndex) -> impl Iterator<Item = (NodeIndex, &PropagationEdge)> {
        self.graph
            .edges_directed(index, Direction::Outgoing)
            .map(|e| (e.target(), e.weight()))
    }

    /// Edges arriving at `index` with their source.
    pub fn incoming(&self, index: NodeIndex) -> impl Iterator<Item = (NodeIndex, &PropagationEdge)> {
        self.graph
            .edges_directed(index, Direction::Incoming)
            .map(|e| (e.source(), e.weight()))
    }

    pub fn out_degree(&self, index: NodeIndex) -> usize {
        self.graph.edges_directed(index, Direction::Outgoing).count()
    }

    pub fn in_degree(&self, index: NodeIndex) -> usize {
        self.graph.edges_directed(index, Direction::Incoming).count()
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&PropagationNode, &Account)> {
        self.nodes().filter_map(|n| n.as_account().map(|a| (n, a)))
    }

    pub fn posts(&self) -> impl Iterator<Item = (&PropagationNode, &Post)> {
        self.nodes().filter_map(|n| n.as_post().map(|p| (n, p)))
    }

    /// Undirected neighbor positions per node position, self loops excluded.
    pub fn undirected_neighbors(&self) -> Vec<BTreeSet<usize>> {
        self.graph
            .node_indices()
            .map(|v| {
                self.graph
                    .neighbors_undirected(v)
                    .filter(|&u| u != v)
                    .map(|u| u.index())
                    .collect()
            })
            .collect()
    }

    /// Post-to-post children of post node `index` with the connecting edge.
    pub fn post_children(&self, index: NodeIndex) -> impl Iterator<Item = (NodeIndex, &PropagationEdge)> {
        let from_post = self.graph[index].kind() == NodeKind::Post;
        self.outgoing(index)
            .filter(move |&(t, _)| from_post && self.graph[t].kind() == NodeKind::Post)
    }

    /// Breadth-first walk over post-to-post edges from `root`, root first.
    pub fn cascade(&self, root: NodeIndex) -> Vec<CascadeStep> {
        let graph = &self.graph;
        let posts_only = EdgeFiltered::from_fn(graph, |e: EdgeReference<'_, PropagationEdge>| {
            graph[e.source()].kind() == NodeKind::Post && graph[e.target()].kind() == NodeKind::Post
        });

        // Bfs discovers children in `post_children` order, so the first
        // parent to record a child is the one that reached it.
        let mut reached: HashMap<NodeIndex, (usize, Option<EdgeKind>)> =
            HashMap::from([(root, (0, None))]);
        let mut steps = Vec::new();
        let mut bfs = Bfs::new(&posts_only, root);
        while let Some(node) = bfs.next(&posts_only) {
            let (depth, via) = reached.get(&node).copied().unwrap_or((0, None));
            for (child, edge) in self.post_children(node) {
                reached.entry(child).or_insert((depth + 1, Some(edge.kind)));
            }
            steps.push(CascadeStep { node, depth, via });
        }
        steps
    }

    /// Post node indices authored by each account node id.
    pub fn posts_by_author(&self) -> HashMap<String, Vec<NodeIndex>> {
        let mut by_author: HashMap<String, Vec<NodeIndex>> = HashMap::new();
        for i in self.graph.node_indices() {
            if let Some(post) = self.graph[i].as_post() {
                by_author
                    .entry(user_node_id(&post.author_id))
                    .or_default()
                    .push(i);
            }
        }
        by_author
    }

    /// Node index of a post's author, when the author is in the graph.
    pub fn author_of(&self, post: &Post) -> Option<NodeIndex> {
        self.index_of(&user_node_id(&post.author_id))
    }
}
