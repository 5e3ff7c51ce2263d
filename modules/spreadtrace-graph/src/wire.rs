//! Serializable graph form handed to reporting consumers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use spreadtrace_common::{Account, Post, SpreadTraceError};

use crate::graph::{
    EdgeKind, GraphMetadata, NodeKind, NodePayload, PropagationEdge, PropagationGraph,
    PropagationNode,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WireNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeKind,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WireEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeKind,
    pub weight: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GraphWire {
    pub nodes: Vec<WireNode>,
    pub edges: Vec<WireEdge>,
    pub metadata: GraphMetadata,
}

impl GraphWire {
    pub fn from_graph(graph: &PropagationGraph) -> Result<Self, SpreadTraceError> {
        let nodes = graph
            .nodes()
            .map(|n| {
                let data = match &n.payload {
                    NodePayload::User(a) => serde_json::to_value(a)?,
                    NodePayload::Post(p) => serde_json::to_value(p)?,
                };
                Ok(WireNode {
                    id: n.id.clone(),
                    node_type: n.kind(),
                    data,
                    timestamp: n.timestamp,
                })
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()?;

        let edges = graph
            .edges()
            .map(|e| WireEdge {
                source: e.source.clone(),
                target: e.target.clone(),
                edge_type: e.kind,
                weight: e.weight,
                timestamp: e.timestamp,
                metadata: e.metadata.clone(),
            })
            .collect();

        Ok(Self {
            nodes,
            edges,
            metadata: graph.metadata().clone(),
        })
    }

    /// Rebuild the in-memory graph. Node payloads must match their type tag.
    pub fn into_graph(self) -> Result<PropagationGraph, SpreadTraceError> {
        let nodes = self
            .nodes
            .into_iter()
            .map(|n| {
                let payload = match n.node_type {
                    NodeKind::User => NodePayload::User(serde_json::from_value::<Account>(n.data)?),
                    NodeKind::Post => NodePayload::Post(serde_json::from_value::<Post>(n.data)?),
                };
                Ok(PropagationNode {
                    id: n.id,
                    payload,
                    timestamp: n.timestamp,
                })
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()?;

        let edges = self
            .edges
            .into_iter()
            .map(|e| PropagationEdge {
                source: e.source,
                target: e.target,
                kind: e.edge_type,
                weight: e.weight,
                timestamp: e.timestamp,
                metadata: e.metadata,
            })
            .collect();

        Ok(PropagationGraph::new(nodes, edges))
    }

    pub fn to_json(&self) -> Result<String, SpreadTraceError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SpreadTraceError> {
        Ok(serde_json::from_str(json)?)
    }
}
