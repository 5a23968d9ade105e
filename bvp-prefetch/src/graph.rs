//! Node Graph Accessor
//!
//! Read-only view over a loaded branching-video graph: nodes, each backed by a
//! media entry, and the hotspots (choices) shown while a node plays.
//!
//! The accessor answers one question for the scheduler: given a node, which
//! nodes might the viewer go to next, in the order their choices appear.

use bvp_common::{EntryId, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};

/// One branch point in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable node id
    pub id: NodeId,

    /// Media entry played while this node is active
    pub entry_id: EntryId,

    /// Nodes worth prefetching while this one plays, in declaration order
    #[serde(default)]
    pub prefetch_candidates: Vec<NodeId>,

    /// Node taken when playback ends without a viewer choice
    #[serde(default)]
    pub default_target: Option<NodeId>,
}

/// What a hotspot does when clicked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HotspotAction {
    /// Branch to another node
    JumpToNode {
        target: NodeId,
        /// Where playback of the target should start, in seconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_offset_secs: Option<f64>,
    },
    /// Open an external link (no branching)
    OpenUrl { url: String },
    /// Any other non-branching action
    #[serde(other)]
    Other,
}

/// Viewer-clickable choice shown during one node's playback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    /// Node during whose playback the hotspot appears
    pub node_id: NodeId,

    /// Appearance time within the node, in seconds (ordering only)
    pub appear_at_secs: f64,

    pub action: HotspotAction,
}

/// How a candidate was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    /// Listed in the node's prefetch candidates
    Choice,
    /// The node's default/fallback transition
    Default,
}

/// A resolved next-node candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<'a> {
    pub node: &'a Node,

    /// Start offset carried over from the choice leading here
    pub start_offset_secs: Option<f64>,

    /// Earliest appearance of a jump choice leading here, if any
    pub appear_at_secs: Option<f64>,

    pub source: CandidateSource,
}

/// Structural problem found by [`NodeGraph::validate`]
#[derive(Debug, Clone, PartialEq)]
pub enum GraphIssue {
    DanglingCandidate { node: NodeId, target: NodeId },
    DanglingDefault { node: NodeId, target: NodeId },
    DanglingHotspotTarget { node: NodeId, target: NodeId },
    OrphanHotspot { node: NodeId },
}

impl fmt::Display for GraphIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphIssue::DanglingCandidate { node, target } => {
                write!(f, "node {} lists unknown prefetch candidate {}", node, target)
            }
            GraphIssue::DanglingDefault { node, target } => {
                write!(f, "node {} has unknown default target {}", node, target)
            }
            GraphIssue::DanglingHotspotTarget { node, target } => {
                write!(f, "hotspot on node {} jumps to unknown node {}", node, target)
            }
            GraphIssue::OrphanHotspot { node } => {
                write!(f, "hotspot attached to unknown node {}", node)
            }
        }
    }
}

#[derive(Deserialize)]
struct GraphData {
    nodes: Vec<Node>,
    #[serde(default)]
    hotspots: Vec<Hotspot>,
}

/// Loaded graph with lookup indexes
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "GraphData")]
pub struct NodeGraph {
    nodes: Vec<Node>,
    index: HashMap<NodeId, usize>,
    hotspots: Vec<Hotspot>,
    hotspots_by_node: HashMap<NodeId, Vec<usize>>,
}

impl TryFrom<GraphData> for NodeGraph {
    type Error = Error;

    fn try_from(data: GraphData) -> Result<Self> {
        NodeGraph::new(data.nodes, data.hotspots)
    }
}

impl NodeGraph {
    /// Build a graph, rejecting duplicate node ids
    pub fn new(nodes: Vec<Node>, hotspots: Vec<Hotspot>) -> Result<Self> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.id.clone(), i).is_some() {
                return Err(Error::Graph(format!("duplicate node id {}", node.id)));
            }
        }

        let mut hotspots_by_node: HashMap<NodeId, Vec<usize>> = HashMap::new();
        for (i, hotspot) in hotspots.iter().enumerate() {
            hotspots_by_node.entry(hotspot.node_id.clone()).or_default().push(i);
        }

        Ok(Self {
            nodes,
            index,
            hotspots,
            hotspots_by_node,
        })
    }

    /// Parse a graph from its JSON description
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Common(e.into()))
    }

    /// Read and parse a JSON graph file
    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(bvp_common::Error::from)?;
        Self::from_json(&json)
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Hotspots attached to a node, in declaration order
    pub fn hotspots_for(&self, id: &NodeId) -> impl Iterator<Item = &Hotspot> {
        self.hotspots_by_node
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.hotspots[i])
    }

    /// Ordered next-node candidates for `node`
    ///
    /// Prefetch candidates are resolved (unknown ids dropped) and sorted by the
    /// earliest appearance of a jump choice leading to them; candidates with no
    /// such choice sort after all timed ones. The sort is stable, so ties keep
    /// declaration order. The default target, when it resolves, is always
    /// appended last even if it duplicates an earlier candidate.
    pub fn next_candidates<'a>(&'a self, node: &Node) -> Vec<Candidate<'a>> {
        // Earliest jump per target; first declared wins ties
        let mut earliest: HashMap<&NodeId, (f64, Option<f64>)> = HashMap::new();
        for hotspot in self.hotspots_for(&node.id) {
            let HotspotAction::JumpToNode {
                target,
                start_offset_secs,
            } = &hotspot.action
            else {
                continue;
            };
            let at = if hotspot.appear_at_secs.is_finite() {
                hotspot.appear_at_secs
            } else {
                f64::INFINITY
            };
            match earliest.get(target) {
                Some((seen, _)) if *seen <= at => {}
                _ => {
                    earliest.insert(target, (at, *start_offset_secs));
                }
            }
        }

        let mut candidates: Vec<Candidate<'a>> = node
            .prefetch_candidates
            .iter()
            .filter_map(|id| match self.node(id) {
                Some(target) => {
                    let choice = earliest.get(id);
                    Some(Candidate {
                        node: target,
                        start_offset_secs: choice.and_then(|(_, offset)| *offset),
                        appear_at_secs: choice.map(|(at, _)| *at).filter(|at| at.is_finite()),
                        source: CandidateSource::Choice,
                    })
                }
                None => {
                    debug!("Dropping unresolved candidate {} of node {}", id, node.id);
                    None
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            let a_at = a.appear_at_secs.unwrap_or(f64::INFINITY);
            let b_at = b.appear_at_secs.unwrap_or(f64::INFINITY);
            a_at.total_cmp(&b_at)
        });

        if let Some(default_id) = &node.default_target {
            match self.node(default_id) {
                Some(target) => candidates.push(Candidate {
                    node: target,
                    start_offset_secs: None,
                    appear_at_secs: None,
                    source: CandidateSource::Default,
                }),
                None => debug!(
                    "Dropping unresolved default target {} of node {}",
                    default_id, node.id
                ),
            }
        }

        candidates
    }

    /// Report dangling references
    ///
    /// None of these stop playback: unresolved candidates are simply never
    /// scheduled. Callers usually log them after loading.
    pub fn validate(&self) -> Vec<GraphIssue> {
        let mut issues = Vec::new();

        for node in &self.nodes {
            for target in &node.prefetch_candidates {
                if self.node(target).is_none() {
                    issues.push(GraphIssue::DanglingCandidate {
                        node: node.id.clone(),
                        target: target.clone(),
                    });
                }
            }
            if let Some(target) = &node.default_target {
                if self.node(target).is_none() {
                    issues.push(GraphIssue::DanglingDefault {
                        node: node.id.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        for hotspot in &self.hotspots {
            if self.node(&hotspot.node_id).is_none() {
                issues.push(GraphIssue::OrphanHotspot {
                    node: hotspot.node_id.clone(),
                });
            }
            if let HotspotAction::JumpToNode { target, .. } = &hotspot.action {
                if self.node(target).is_none() {
                    issues.push(GraphIssue::DanglingHotspotTarget {
                        node: hotspot.node_id.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        issues
    }
}
