//! Conversion between network files and live trees.

use std::collections::HashMap;

use ft_core::{GeomTolerance, NodeId, Vec3};
use ft_tree::{GridGraph, NodeKind as TreeNodeKind, RouteOutcome, Tree};
use tracing::debug;

use crate::ProjectResult;
use crate::schema::{
    ConnectionDef, GridDef, LATEST_VERSION, NetworkDef, NodeDef, NodeKind, OutletDef, PointDef,
};
use crate::validate::validate_network;

fn point(p: &PointDef) -> Vec3 {
    Vec3::new(p[0], p[1], p[2])
}

fn point_def(v: &Vec3) -> PointDef {
    [v.x, v.y, v.z]
}

/// Build a tree from a validated network file.
///
/// File ids become node names so [`export_tree`] can write them back.
pub fn build_tree(network: &NetworkDef) -> ProjectResult<Tree> {
    validate_network(network)?;
    let tolerance = network
        .tolerance
        .map(GeomTolerance::with_distance)
        .unwrap_or_default();
    let mut tree = Tree::with_details(
        network.name.clone(),
        network.purpose.clone(),
        network.regions.iter().cloned(),
        network.outlet.flow,
    )
    .with_tolerance(tolerance);

    let outlet = tree.set_outlet_position(point(&network.outlet.position))?;
    tree.set_node_name(outlet, network.outlet.id.clone())?;

    let mut ids: HashMap<&str, NodeId> = HashMap::new();
    ids.insert(&network.outlet.id, outlet);
    for node in &network.nodes {
        let position = point(&node.position);
        let id = match node.kind {
            NodeKind::Inlet { flow, terminal } => {
                tree.add_unconnected_inlet(position, flow, terminal)
            }
            NodeKind::Internal => tree.add_internal_node(position),
        };
        tree.set_node_name(id, node.id.clone())?;
        ids.insert(&node.id, id);
    }

    for conn in &network.connections {
        // Both ends exist; validate_network checked every reference.
        let (Some(from), Some(to)) = (ids.get(conn.from.as_str()), ids.get(conn.to.as_str()))
        else {
            continue;
        };
        tree.connect_with_diameter(*from, *to, false, conn.is_loop.then_some(true), conn.diameter)?;
    }

    tree.update_sections()?;
    debug!(
        name = %network.name,
        nodes = tree.node_count(),
        connections = tree.connection_count(),
        "built tree from network file"
    );
    Ok(tree)
}

/// Write a tree back out as a network file. The grid is not kept.
pub fn export_tree(tree: &Tree) -> NetworkDef {
    let name_of = |node: NodeId| -> String {
        match tree.node(node) {
            Some(n) if !n.name.is_empty() => n.name.clone(),
            _ => format!("n{node}"),
        }
    };

    let (outlet_position, outlet_flow) = tree
        .node(tree.outlet())
        .map(|n| (n.position, n.flow().unwrap_or(0.0)))
        .unwrap_or((Vec3::zeros(), 0.0));

    let nodes = tree
        .nodes()
        .filter(|n| !n.is_outlet())
        .map(|n| NodeDef {
            id: name_of(n.id),
            position: point_def(&n.position),
            kind: match &n.kind {
                TreeNodeKind::Inlet { flow, terminal } => NodeKind::Inlet {
                    flow: *flow,
                    terminal: *terminal,
                },
                _ => NodeKind::Internal,
            },
        })
        .collect();

    let connections = tree
        .connections()
        .map(|c| ConnectionDef {
            from: name_of(c.start),
            to: name_of(c.end),
            diameter: c.diameter,
            is_loop: c.is_loop(),
        })
        .collect();

    NetworkDef {
        version: LATEST_VERSION,
        name: tree.name().to_string(),
        purpose: tree.purpose().to_string(),
        regions: tree.region_references().to_vec(),
        tolerance: Some(tree.tolerance().distance),
        outlet: OutletDef {
            id: name_of(tree.outlet()),
            position: point_def(&outlet_position),
            flow: outlet_flow,
        },
        nodes,
        connections,
        grid: None,
    }
}

/// The vertex table of `grid`.
pub fn grid_graph(grid: &GridDef, default_tolerance: f64) -> GridGraph {
    let mut graph = GridGraph::new(grid.tolerance.unwrap_or(default_tolerance));
    for vertex in &grid.vertices {
        graph.add_vertex(vertex.id, point(&vertex.position));
    }
    graph
}

/// Trunk pointers of `grid`, keyed by vertex.
pub fn route_map(grid: &GridDef) -> HashMap<u64, Option<u64>> {
    grid.route.iter().map(|s| (s.vertex, s.trunk)).collect()
}

/// Apply the network's grid route to `tree`. `None` when the file has no
/// grid.
pub fn apply_grid_route(tree: &mut Tree, network: &NetworkDef) -> ProjectResult<Option<RouteOutcome>> {
    let Some(grid) = &network.grid else {
        return Ok(None);
    };
    let graph = grid_graph(grid, tree.tolerance().distance);
    let outcome = tree.connect_by_grid_route(&graph, &route_map(grid), &grid.loops)?;
    Ok(Some(outcome))
}
