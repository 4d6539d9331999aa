//! Tree-specific error types.

use ft_core::geom::fmt_point;
use ft_core::{ConnId, FtError, NodeId, Vec3};
use thiserror::Error;

pub type TreeResult<T> = Result<T, TreeError>;

/// Structural and geometric failures of tree operations.
///
/// The single-step primitives (connect, disconnect, shift, split, merge)
/// check their preconditions before touching the tree, so an `Err` from one
/// of them leaves the tree as it was.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    #[error("Node {node} is not in this tree")]
    NodeNotInTree { node: NodeId },

    #[error("Connection {conn} is not in this tree")]
    ConnectionNotInTree { conn: ConnId },

    #[error("Node {node} is an inlet and inlets cannot have incoming connections")]
    EndIsInlet { node: NodeId },

    #[error("Node {node} is the outlet and the outlet cannot have outgoing connections")]
    StartIsOutlet { node: NodeId },

    #[error("Connection start and end are both at {}", fmt_point(.at))]
    ZeroLength { at: Vec3 },

    #[error("Node {node} already has a main outgoing connection; disconnect it first or allow disconnect")]
    AlreadyConnected { node: NodeId },

    #[error("Connection {conn} already ends at node {node}")]
    AlreadyPointedTo { conn: ConnId, node: NodeId },

    #[error("Node {node} is not a valid connection end in this tree")]
    InvalidEndNode { node: NodeId },

    #[error("Split point {} coincides with an end of connection {conn}", fmt_point(.at))]
    SplitAtEndpoint { conn: ConnId, at: Vec3 },

    #[error("Connections to merge must share one end node")]
    MergeEndMismatch,

    #[error("No connections given to merge")]
    EmptyMerge,

    #[error("Connection {conn} is listed more than once in a merge")]
    DuplicateMerge { conn: ConnId },

    #[error("Node {node} must have {expected}, found {incoming} incoming and {outgoing} outgoing")]
    WrongDegree {
        node: NodeId,
        incoming: usize,
        outgoing: usize,
        expected: &'static str,
    },

    #[error("Cannot chamfer node {node}: {reason}")]
    DegenerateChamfer { node: NodeId, reason: &'static str },

    #[error("Angle must be between 0 and 90 degrees, got {angle}")]
    AngleOutOfRange { angle: f64 },

    #[error("A path needs at least 2 points, got {count}")]
    PathTooShort { count: usize },

    #[error("Connections with directions {} and {} cannot be ordered", fmt_point(.first), fmt_point(.second))]
    AmbiguousGeometry { first: Vec3, second: Vec3 },

    #[error("No section with key '{key}'")]
    SectionNotFound { key: String },

    #[error("Section key '{key}' has too many ':' characters, only 1 is allowed")]
    MalformedKey { key: String },

    #[error("Adjacency index disagrees with the connection list at connection {conn}")]
    InconsistentIndex { conn: ConnId },

    #[error("Node {node} has more than one main outgoing connection")]
    TooManyMainOutgoing { node: NodeId },

    #[error("Tree is not initialized: {what}; build trees with Tree::new")]
    Uninitialized { what: &'static str },

    #[error(transparent)]
    Core(#[from] FtError),
}
