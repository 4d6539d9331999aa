//! Network file schema definitions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const LATEST_VERSION: u32 = 1;

/// A point as written in network files: `[x, y, z]`.
pub type PointDef = [f64; 3];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkDef {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub regions: Vec<String>,
    /// Distance tolerance; the library default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    pub outlet: OutletDef,
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub connections: Vec<ConnectionDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutletDef {
    #[serde(default = "default_outlet_id")]
    pub id: String,
    pub position: PointDef,
    #[serde(default)]
    pub flow: f64,
}

pub fn default_outlet_id() -> String {
    "outlet".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeDef {
    pub id: String,
    pub position: PointDef,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum NodeKind {
    Inlet {
        flow: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        terminal: Option<Uuid>,
    },
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionDef {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub diameter: f64,
    #[serde(default, rename = "loop", skip_serializing_if = "std::ops::Not::not")]
    pub is_loop: bool,
}

/// A routing grid and the trunk pointers found on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GridDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    pub vertices: Vec<GridVertexDef>,
    #[serde(default)]
    pub route: Vec<RouteStepDef>,
    /// Vertex sequences to splice in as loop connections.
    #[serde(default)]
    pub loops: Vec<Vec<u64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GridVertexDef {
    pub id: u64,
    pub position: PointDef,
}

/// `vertex` drains toward `trunk`; no trunk marks a dead end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteStepDef {
    pub vertex: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trunk: Option<u64>,
}
