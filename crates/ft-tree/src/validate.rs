//! Structural validation of a tree.

use std::collections::{HashMap, HashSet};

use ft_core::{ConnId, NodeId};

use crate::error::{TreeError, TreeResult};
use crate::tree::Tree;

impl Tree {
    /// Check that the adjacency indices agree with the connection list and
    /// that every node has at most one main outgoing connection.
    pub fn check_invariants(&self) -> TreeResult<()> {
        let mut main_outgoing = HashSet::new();
        for conn in self.connections() {
            let start = self.require_node(conn.start)?;
            let end = self.require_node(conn.end)?;
            if end.is_inlet() {
                return Err(TreeError::EndIsInlet { node: end.id });
            }
            if start.is_outlet() {
                return Err(TreeError::StartIsOutlet { node: start.id });
            }
            if !conn.is_loop() && !main_outgoing.insert(conn.start) {
                return Err(TreeError::TooManyMainOutgoing { node: conn.start });
            }
            if self.index.ready
                && (!listed(&self.index.outgoing, conn.start, conn.id)
                    || !listed(&self.index.incoming, conn.end, conn.id))
            {
                return Err(TreeError::InconsistentIndex { conn: conn.id });
            }
        }

        if self.index.ready {
            // Every indexed id must name a live connection with matching ends
            for (node, list) in &self.index.outgoing {
                for id in list {
                    match self.connection(*id) {
                        Some(c) if c.start == *node => {}
                        _ => return Err(TreeError::InconsistentIndex { conn: *id }),
                    }
                }
            }
            for (node, list) in &self.index.incoming {
                for id in list {
                    match self.connection(*id) {
                        Some(c) if c.end == *node => {}
                        _ => return Err(TreeError::InconsistentIndex { conn: *id }),
                    }
                }
            }
        }

        for inlet in &self.inlets {
            if !self.node(*inlet).is_some_and(|n| n.is_inlet()) {
                return Err(TreeError::NodeNotInTree { node: *inlet });
            }
        }
        Ok(())
    }
}

fn listed(map: &HashMap<NodeId, Vec<ConnId>>, node: NodeId, conn: ConnId) -> bool {
    map.get(&node).is_some_and(|list| list.contains(&conn))
}
