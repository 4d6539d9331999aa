//! Core graph data structures.

use ft_core::{ConnId, Line, NodeId, Vec3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a node in the flow tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeKind {
    /// The single sink of the tree. Never originates connections.
    Outlet { flow: f64, network_reference: String },
    /// A terminal demand. Never receives connections.
    Inlet { flow: f64, terminal: Option<Uuid> },
    /// Created and destroyed freely by edits.
    Internal,
}

/// A vertex of the flow tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub position: Vec3,
    pub kind: NodeKind,
    #[serde(default)]
    pub name: String,
}

impl Node {
    pub fn is_inlet(&self) -> bool {
        matches!(self.kind, NodeKind::Inlet { .. })
    }

    pub fn is_outlet(&self) -> bool {
        matches!(self.kind, NodeKind::Outlet { .. })
    }

    pub fn is_internal(&self) -> bool {
        matches!(self.kind, NodeKind::Internal)
    }

    /// Flow of an inlet or the outlet; internal nodes carry none.
    pub fn flow(&self) -> Option<f64> {
        match self.kind {
            NodeKind::Outlet { flow, .. } | NodeKind::Inlet { flow, .. } => Some(flow),
            NodeKind::Internal => None,
        }
    }
}

/// Where a connection sits in the derived section layout.
///
/// Stamped by section derivation; never edited by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionLocator {
    pub network_reference: String,
    pub purpose: String,
    pub section_key: String,
    pub line: Line,
}

/// A directed edge from `start` to `end`, flowing toward the outlet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnId,
    pub start: NodeId,
    pub end: NodeId,
    pub diameter: f64,
    /// Written by section derivation.
    #[serde(default)]
    pub flow: f64,
    /// `Some(true)` marks a loop edge; `Some(false)` and `None` are tree edges.
    #[serde(default)]
    pub loop_flag: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<ConnectionLocator>,
}

impl Connection {
    pub fn is_loop(&self) -> bool {
        self.loop_flag == Some(true)
    }
}

/// Result of splitting a connection through a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    /// The new internal node.
    pub node: NodeId,
    /// The new connection ending at `node`.
    pub upstream: ConnId,
    /// The new connection starting at `node`.
    pub downstream: ConnId,
}
