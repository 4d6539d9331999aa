//! Cycle enumeration and overlap validation over the live adjacency.

use std::collections::{HashMap, HashSet};

use ft_core::geom::fmt_point;
use ft_core::{ConnId, NodeId, Vec3};
use tracing::warn;

use crate::compare::ConnectionComparer;
use crate::error::TreeResult;
use crate::tree::Tree;

/// A problem found by [`Tree::validate_overlaps`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub node: NodeId,
    pub position: Vec3,
    pub message: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    Gray,
    Black,
}

impl Tree {
    fn undirected_neighbors(&self, node: NodeId) -> Vec<NodeId> {
        let mut neighbors = Vec::new();
        for c in self.outgoing(node) {
            if let Some(conn) = self.connection(c) {
                neighbors.push(conn.end);
            }
        }
        for c in self.incoming(node) {
            if let Some(conn) = self.connection(c) {
                neighbors.push(conn.start);
            }
        }
        neighbors
    }

    /// Cycles reachable from the outlet, as node sequences.
    ///
    /// Edges are followed in both directions. Each back edge found by a
    /// depth-first search yields one cycle, so the result covers every edge
    /// that lies on a cycle but is not a minimal cycle basis.
    pub fn find_all_node_cycles(&self) -> Vec<Vec<NodeId>> {
        let mut cycles = Vec::new();
        let mut color: HashMap<NodeId, Color> = HashMap::new();
        let mut parent: HashMap<NodeId, NodeId> = HashMap::new();

        let root = self.outlet;
        if self.node(root).is_none() {
            return cycles;
        }
        color.insert(root, Color::Gray);
        let mut stack = vec![(root, self.undirected_neighbors(root), 0usize)];

        while let Some((current, neighbors, cursor)) = stack.last_mut() {
            let current = *current;
            if *cursor >= neighbors.len() {
                color.insert(current, Color::Black);
                stack.pop();
                continue;
            }
            let next = neighbors[*cursor];
            *cursor += 1;
            if parent.get(&current) == Some(&next) {
                continue;
            }
            match color.get(&next) {
                None => {
                    parent.insert(next, current);
                    color.insert(next, Color::Gray);
                    let following = self.undirected_neighbors(next);
                    stack.push((next, following, 0));
                }
                Some(Color::Gray) => {
                    let mut cycle = Vec::new();
                    let mut walker = current;
                    loop {
                        cycle.push(walker);
                        if walker == next {
                            break;
                        }
                        match parent.get(&walker) {
                            Some(p) => walker = *p,
                            None => break,
                        }
                    }
                    cycles.push(cycle);
                }
                Some(Color::Black) => {}
            }
        }
        cycles
    }

    /// Cycles reachable from the outlet, as connection sequences.
    pub fn find_all_connection_cycles(&self) -> Vec<Vec<ConnId>> {
        self.find_all_node_cycles()
            .into_iter()
            .map(|cycle| {
                let mut conns = Vec::with_capacity(cycle.len());
                for (i, a) in cycle.iter().enumerate() {
                    let b = cycle[(i + 1) % cycle.len()];
                    if let Some(c) = self.connection_between(*a, b) {
                        conns.push(c);
                    }
                }
                conns
            })
            .collect()
    }

    /// Every connection on some cycle, without duplicates.
    pub fn find_all_connections_of_cycles(&self) -> Vec<ConnId> {
        let mut seen = HashSet::new();
        self.find_all_connection_cycles()
            .into_iter()
            .flatten()
            .filter(|c| seen.insert(*c))
            .collect()
    }

    /// A connection joining `a` and `b` in either direction.
    fn connection_between(&self, a: NodeId, b: NodeId) -> Option<ConnId> {
        self.outgoing(a)
            .into_iter()
            .find(|c| self.connection(*c).is_some_and(|c| c.end == b))
            .or_else(|| {
                self.outgoing(b)
                    .into_iter()
                    .find(|c| self.connection(*c).is_some_and(|c| c.end == a))
            })
    }

    /// Report branch nodes whose incoming connections cannot be ordered.
    ///
    /// Walks upstream from the outlet, visiting each connection once.
    pub fn validate_overlaps(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let mut visited: HashSet<ConnId> = HashSet::new();
        let mut checked: HashSet<NodeId> = HashSet::new();
        let mut stack = vec![self.outlet];

        while let Some(node) = stack.pop() {
            let incoming = self.incoming(node);
            if incoming.len() > 1 && checked.insert(node) {
                if let Err(err) = self.order_incoming(node, &incoming) {
                    let position = self.position(node).unwrap_or_else(|_| Vec3::zeros());
                    warn!(%node, %err, "overlapping connections");
                    issues.push(ValidationIssue {
                        node,
                        position,
                        message: format!(
                            "Connections at {} overlap: {err}",
                            fmt_point(&position)
                        ),
                    });
                }
            }
            for c in incoming {
                if !visited.insert(c) {
                    continue;
                }
                if let Some(conn) = self.connection(c) {
                    stack.push(conn.start);
                }
            }
        }
        issues
    }

    fn order_incoming(&self, node: NodeId, incoming: &[ConnId]) -> TreeResult<()> {
        let trunk = self.trunk_reference(node)?;
        let mut sorted = incoming.to_vec();
        ConnectionComparer::new(Some(trunk), true).sort_connections(self, &mut sorted)
    }
}
