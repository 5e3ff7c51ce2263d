pub mod builder;
pub mod community;
pub mod graph;
pub mod network;
pub mod wire;

pub use builder::{BuildOutput, GraphBuilder, GraphStats};
pub use community::{Community, CommunityDetector};
pub use graph::{
    post_node_id, user_node_id, CascadeStep, EdgeKind, GraphMetadata, NodeKind, NodePayload,
    PropagationEdge, PropagationGraph, PropagationNode,
};
pub use petgraph::graph::NodeIndex;
pub use network::{NetworkAnalysis, NetworkAnalyzer, NodeMetrics};
pub use wire::{GraphWire, WireEdge, WireNode};
