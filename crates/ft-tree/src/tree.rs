//! The flow tree: node/connection arena plus incremental adjacency indices.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use ft_core::geom::almost_equal;
use ft_core::{ConnId, GeomTolerance, Id, Line, NodeId, Vec3};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{TreeError, TreeResult};
use crate::graph::{Connection, Node, NodeKind, Split};
use crate::sections::{HintPath, SectionCache};

/// Incoming/outgoing connection lists per node.
///
/// Never persisted. `ready` is false on a freshly deserialized tree and the
/// first mutation rebuilds everything from the connection list.
#[derive(Debug, Clone, Default)]
pub(crate) struct Adjacency {
    pub(crate) incoming: HashMap<NodeId, Vec<ConnId>>,
    pub(crate) outgoing: HashMap<NodeId, Vec<ConnId>>,
    pub(crate) ready: bool,
}

impl Adjacency {
    fn insert(&mut self, conn: &Connection) {
        self.outgoing.entry(conn.start).or_default().push(conn.id);
        self.incoming.entry(conn.end).or_default().push(conn.id);
    }

    fn remove(&mut self, conn: &Connection) {
        remove_from(&mut self.outgoing, conn.start, conn.id);
        remove_from(&mut self.incoming, conn.end, conn.id);
    }
}

fn remove_from(map: &mut HashMap<NodeId, Vec<ConnId>>, key: NodeId, id: ConnId) {
    if let Some(list) = map.get_mut(&key) {
        list.retain(|c| *c != id);
        if list.is_empty() {
            map.remove(&key);
        }
    }
}

/// A flow tree rooted at a single outlet.
///
/// Nodes and connections live in arenas addressed by [`Id`]; removed entries
/// leave an empty slot so ids stay stable for the lifetime of the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub(crate) id: Uuid,
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) purpose: String,
    #[serde(default)]
    pub(crate) region_references: Vec<String>,
    #[serde(default)]
    pub(crate) tolerance: GeomTolerance,
    pub(crate) nodes: Vec<Option<Node>>,
    pub(crate) connections: Vec<Option<Connection>>,
    pub(crate) outlet: NodeId,
    pub(crate) inlets: Vec<NodeId>,
    /// Last user supplied path per section key. Dropped once the key names
    /// a different run.
    #[serde(default)]
    pub(crate) hint_paths: BTreeMap<String, HintPath>,
    #[serde(skip)]
    pub(crate) index: Adjacency,
    #[serde(skip)]
    pub(crate) sections: Option<SectionCache>,
}

impl Tree {
    /// Create a tree serving the given regions, with its outlet at the origin.
    pub fn new<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_details("", "", regions, 0.0)
    }

    /// Create a tree with name, purpose tag and total outlet flow.
    ///
    /// Region references are stored in natural (lexi-numeric) order.
    pub fn with_details<I, S>(
        name: impl Into<String>,
        purpose: impl Into<String>,
        regions: I,
        outlet_flow: f64,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut region_references: Vec<String> = regions.into_iter().map(Into::into).collect();
        region_references.sort_by(|a, b| lexi_numeric_cmp(a, b));
        let network_reference = region_references.join(",");
        let outlet = Id::from_index(0);
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            purpose: purpose.into(),
            region_references,
            tolerance: GeomTolerance::default(),
            nodes: vec![Some(Node {
                id: outlet,
                position: Vec3::zeros(),
                kind: NodeKind::Outlet {
                    flow: outlet_flow,
                    network_reference,
                },
                name: String::new(),
            })],
            connections: Vec::new(),
            outlet,
            inlets: Vec::new(),
            hint_paths: BTreeMap::new(),
            index: Adjacency {
                ready: true,
                ..Adjacency::default()
            },
            sections: None,
        }
    }

    /// Replace the geometric tolerance used by every predicate.
    pub fn with_tolerance(mut self, tolerance: GeomTolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    pub fn region_references(&self) -> &[String] {
        &self.region_references
    }

    pub fn tolerance(&self) -> GeomTolerance {
        self.tolerance
    }

    /// Comma joined region references identifying this network.
    pub fn network_reference(&self) -> String {
        self.region_references.join(",")
    }

    pub fn outlet(&self) -> NodeId {
        self.outlet
    }

    pub fn inlets(&self) -> &[NodeId] {
        &self.inlets
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.slot()).and_then(Option::as_ref)
    }

    pub fn connection(&self, id: ConnId) -> Option<&Connection> {
        self.connections.get(id.slot()).and_then(Option::as_ref)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().flatten()
    }

    pub fn internal_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes().filter(|n| n.is_internal())
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter().flatten()
    }

    pub fn connection_ids(&self) -> Vec<ConnId> {
        self.connections().map(|c| c.id).collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    pub fn connection_count(&self) -> usize {
        self.connections().count()
    }

    /// Is `node` part of this tree (optionally ignoring inlets)?
    pub fn has_node(&self, node: NodeId, exclude_inlets: bool) -> bool {
        self.node(node)
            .is_some_and(|n| !(exclude_inlets && n.is_inlet()))
    }

    pub fn has_loops(&self) -> bool {
        self.connections().any(Connection::is_loop)
    }

    pub fn loop_connections(&self) -> Vec<ConnId> {
        self.connections()
            .filter(|c| c.is_loop())
            .map(|c| c.id)
            .collect()
    }

    pub(crate) fn require_node(&self, id: NodeId) -> TreeResult<&Node> {
        self.node(id).ok_or(TreeError::NodeNotInTree { node: id })
    }

    pub(crate) fn require_connection(&self, id: ConnId) -> TreeResult<&Connection> {
        self.connection(id)
            .ok_or(TreeError::ConnectionNotInTree { conn: id })
    }

    fn node_mut(&mut self, id: NodeId) -> TreeResult<&mut Node> {
        self.nodes
            .get_mut(id.slot())
            .and_then(Option::as_mut)
            .ok_or(TreeError::NodeNotInTree { node: id })
    }

    pub(crate) fn connection_mut(&mut self, id: ConnId) -> TreeResult<&mut Connection> {
        self.connections
            .get_mut(id.slot())
            .and_then(Option::as_mut)
            .ok_or(TreeError::ConnectionNotInTree { conn: id })
    }

    pub fn position(&self, node: NodeId) -> TreeResult<Vec3> {
        Ok(self.require_node(node)?.position)
    }

    /// Geometry of a connection, start to end.
    pub fn line(&self, conn: ConnId) -> TreeResult<Line> {
        let c = self.require_connection(conn)?;
        Ok(Line::new(self.position(c.start)?, self.position(c.end)?))
    }

    /// Unit direction of a connection, start to end.
    pub fn direction(&self, conn: ConnId) -> TreeResult<Vec3> {
        Ok(self.line(conn)?.direction())
    }

    /// Connections ending at `node`. Inlets never have any.
    pub fn incoming(&self, node: NodeId) -> Vec<ConnId> {
        if self.node(node).is_some_and(Node::is_inlet) {
            return Vec::new();
        }
        if self.index.ready {
            self.index.incoming.get(&node).cloned().unwrap_or_default()
        } else {
            self.connections()
                .filter(|c| c.end == node)
                .map(|c| c.id)
                .collect()
        }
    }

    /// Connections starting at `node`, loops included.
    pub fn outgoing(&self, node: NodeId) -> Vec<ConnId> {
        if self.index.ready {
            self.index.outgoing.get(&node).cloned().unwrap_or_default()
        } else {
            self.connections()
                .filter(|c| c.start == node)
                .map(|c| c.id)
                .collect()
        }
    }

    /// The trunk-ward connection leaving `node`: the only one, or else the
    /// first non-loop one.
    pub fn outgoing_main(&self, node: NodeId) -> Option<ConnId> {
        let out = self.outgoing(node);
        if out.len() == 1 {
            return Some(out[0]);
        }
        out.into_iter()
            .find(|id| self.connection(*id).is_some_and(|c| !c.is_loop()))
    }

    /// Rebuild the adjacency indices if this tree came from a deserializer.
    pub(crate) fn ensure_indexed(&mut self) -> TreeResult<()> {
        if self.index.ready {
            return Ok(());
        }
        if !self.node(self.outlet).is_some_and(Node::is_outlet) {
            return Err(TreeError::Uninitialized {
                what: "the outlet id does not name an outlet node",
            });
        }
        let mut index = Adjacency::default();
        let mut main_outgoing: HashMap<NodeId, usize> = HashMap::new();
        for conn in self.connections.iter().flatten() {
            self.require_node(conn.start)?;
            self.require_node(conn.end)?;
            index.insert(conn);
            if !conn.is_loop() {
                let count = main_outgoing.entry(conn.start).or_insert(0);
                *count += 1;
                if *count > 1 {
                    return Err(TreeError::TooManyMainOutgoing { node: conn.start });
                }
            }
        }
        index.ready = true;
        self.index = index;
        debug!(
            connections = self.connection_count(),
            "rebuilt adjacency indices"
        );
        Ok(())
    }

    /// Drop the derived section layer.
    pub(crate) fn invalidate(&mut self) {
        self.sections = None;
    }

    fn alloc_node(&mut self, position: Vec3, kind: NodeKind) -> NodeId {
        let id = Id::from_index(self.nodes.len() as u32);
        self.nodes.push(Some(Node {
            id,
            position,
            kind,
            name: String::new(),
        }));
        id
    }

    /// Add an unconnected internal node.
    pub fn add_internal_node(&mut self, position: Vec3) -> NodeId {
        let node = self.alloc_node(position, NodeKind::Internal);
        self.invalidate();
        node
    }

    /// Remove a node outright. Callers make sure nothing references it.
    pub(crate) fn remove_node(&mut self, node: NodeId) {
        if let Some(slot) = self.nodes.get_mut(node.slot()) {
            *slot = None;
        }
        self.inlets.retain(|n| *n != node);
        self.index.incoming.remove(&node);
        self.index.outgoing.remove(&node);
        self.invalidate();
    }

    /// Remove `node` if it is internal and has no connections left.
    pub(crate) fn remove_if_dangling(&mut self, node: NodeId) -> bool {
        let dangling = self.node(node).is_some_and(Node::is_internal)
            && self.incoming(node).is_empty()
            && self.outgoing(node).is_empty();
        if dangling {
            self.remove_node(node);
        }
        dangling
    }

    /// Connect `start` to `end`.
    ///
    /// A non-loop connection from a node that already has a main outgoing
    /// connection fails unless `allow_disconnect`, in which case the old one
    /// is removed.
    pub fn connect(
        &mut self,
        start: NodeId,
        end: NodeId,
        allow_disconnect: bool,
        loop_flag: Option<bool>,
    ) -> TreeResult<ConnId> {
        self.connect_with_diameter(start, end, allow_disconnect, loop_flag, 0.0)
    }

    /// Add a loop connection, which may close a cycle.
    pub fn add_loop_connection(&mut self, start: NodeId, end: NodeId) -> TreeResult<ConnId> {
        self.connect(start, end, false, Some(true))
    }

    /// [`Tree::connect`] with an explicit diameter.
    pub fn connect_with_diameter(
        &mut self,
        start: NodeId,
        end: NodeId,
        allow_disconnect: bool,
        loop_flag: Option<bool>,
        diameter: f64,
    ) -> TreeResult<ConnId> {
        self.ensure_indexed()?;
        let start_node = self.require_node(start)?;
        let end_node = self.require_node(end)?;
        if end_node.is_inlet() {
            return Err(TreeError::EndIsInlet { node: end });
        }
        if start_node.is_outlet() {
            return Err(TreeError::StartIsOutlet { node: start });
        }
        if almost_equal(&start_node.position, &end_node.position, self.tolerance.distance) {
            return Err(TreeError::ZeroLength {
                at: start_node.position,
            });
        }
        if loop_flag != Some(true) {
            let existing = self
                .outgoing(start)
                .into_iter()
                .find(|id| self.connection(*id).is_some_and(|c| !c.is_loop()));
            if let Some(existing) = existing {
                if !allow_disconnect {
                    return Err(TreeError::AlreadyConnected { node: start });
                }
                self.disconnect(existing)?;
            }
        }

        let id = Id::from_index(self.connections.len() as u32);
        let conn = Connection {
            id,
            start,
            end,
            diameter,
            flow: 0.0,
            loop_flag,
            locator: None,
        };
        self.index.insert(&conn);
        self.connections.push(Some(conn));
        self.invalidate();
        Ok(id)
    }

    /// Remove a connection. Its nodes stay in the tree.
    pub fn disconnect(&mut self, conn: ConnId) -> TreeResult<Connection> {
        self.ensure_indexed()?;
        self.require_connection(conn)?;
        let removed = self.connections[conn.slot()]
            .take()
            .ok_or(TreeError::ConnectionNotInTree { conn })?;
        self.index.remove(&removed);
        self.invalidate();
        Ok(removed)
    }

    /// Repoint the end of `conn` to `node`. A stranded internal old end is
    /// removed from the tree.
    pub fn shift_connection_to_node(&mut self, conn: ConnId, node: NodeId) -> TreeResult<()> {
        self.ensure_indexed()?;
        if !self.has_node(node, true) {
            return Err(TreeError::InvalidEndNode { node });
        }
        let c = self.require_connection(conn)?.clone();
        if c.end == node {
            return Err(TreeError::AlreadyPointedTo { conn, node });
        }
        let start = self.position(c.start)?;
        if almost_equal(&start, &self.position(node)?, self.tolerance.distance) {
            return Err(TreeError::ZeroLength { at: start });
        }

        self.index.remove(&c);
        let old_end = c.end;
        let updated = self.connection_mut(conn)?;
        updated.end = node;
        let updated = updated.clone();
        self.index.insert(&updated);
        self.remove_if_dangling(old_end);
        self.invalidate();
        Ok(())
    }

    /// Split `conn` with a new internal node at `position`.
    ///
    /// Both new connections inherit the loop flag and diameter.
    pub fn split_connection_through_point(
        &mut self,
        conn: ConnId,
        position: Vec3,
    ) -> TreeResult<Split> {
        self.ensure_indexed()?;
        let line = self.line(conn)?;
        let tol = self.tolerance.distance;
        if almost_equal(&line.start, &position, tol) || almost_equal(&line.end, &position, tol) {
            return Err(TreeError::SplitAtEndpoint { conn, at: position });
        }
        let old = self.disconnect(conn)?;
        let node = self.add_internal_node(position);
        let upstream =
            self.connect_with_diameter(old.start, node, false, old.loop_flag, old.diameter)?;
        let downstream =
            self.connect_with_diameter(node, old.end, false, old.loop_flag, old.diameter)?;
        Ok(Split {
            node,
            upstream,
            downstream,
        })
    }

    /// Merge connections sharing one end node at `point`.
    ///
    /// The first connection is split at `point`; every other one is rerouted
    /// to the new node. When another connection already starts at `point`,
    /// its incoming connections move to the new node and its start is removed.
    pub fn merge_connections_at_point(
        &mut self,
        conns: &[ConnId],
        point: Vec3,
    ) -> TreeResult<NodeId> {
        self.ensure_indexed()?;
        let (first, rest) = conns.split_first().ok_or(TreeError::EmptyMerge)?;
        let line = self.line(*first)?;
        let end = self.require_connection(*first)?.end;
        let tol = self.tolerance.distance;
        if almost_equal(&line.start, &point, tol) || almost_equal(&line.end, &point, tol) {
            return Err(TreeError::SplitAtEndpoint {
                conn: *first,
                at: point,
            });
        }
        let mut seen = HashSet::from([*first]);
        for id in rest {
            if !seen.insert(*id) {
                return Err(TreeError::DuplicateMerge { conn: *id });
            }
            let c = self.require_connection(*id)?;
            if c.end != end {
                return Err(TreeError::MergeEndMismatch);
            }
            let start = self.require_node(c.start)?;
            if !start.is_internal() && almost_equal(&start.position, &point, tol) {
                return Err(TreeError::ZeroLength { at: point });
            }
        }

        let merged = self.split_connection_through_point(*first, point)?.node;
        for id in rest {
            let old = self.require_connection(*id)?.clone();
            let old_start = self.position(old.start)?;
            if almost_equal(&old_start, &point, tol) {
                for incoming in self.incoming(old.start) {
                    self.shift_connection_to_node(incoming, merged)?;
                }
                self.disconnect(old.id)?;
                self.remove_if_dangling(old.start);
                continue;
            }
            self.disconnect(old.id)?;
            self.connect_with_diameter(old.start, merged, false, old.loop_flag, old.diameter)?;
        }
        debug!(count = conns.len(), "merged connections");
        Ok(merged)
    }

    /// Absorb `other` into this tree.
    ///
    /// Connections that fed the other outlet are attached to the end of
    /// `conn`, or to a new node splitting `conn` at `point`.
    pub fn merge_tree_at_connection(
        &mut self,
        other: Tree,
        conn: ConnId,
        point: Option<Vec3>,
    ) -> TreeResult<NodeId> {
        self.ensure_indexed()?;
        let target = match point {
            Some(point) => self.split_connection_through_point(conn, point)?.node,
            None => self.require_connection(conn)?.end,
        };

        let mut mapping: HashMap<NodeId, NodeId> = HashMap::new();
        for node in other.nodes() {
            if node.id == other.outlet {
                continue;
            }
            let id = self.alloc_node(node.position, node.kind.clone());
            if let Some(n) = self.nodes[id.slot()].as_mut() {
                n.name = node.name.clone();
            }
            if node.is_inlet() {
                self.inlets.push(id);
            }
            mapping.insert(node.id, id);
        }
        for c in other.connections() {
            let start = mapping
                .get(&c.start)
                .copied()
                .ok_or(TreeError::NodeNotInTree { node: c.start })?;
            let end = if c.end == other.outlet {
                target
            } else {
                mapping
                    .get(&c.end)
                    .copied()
                    .ok_or(TreeError::NodeNotInTree { node: c.end })?
            };
            self.connect_with_diameter(start, end, false, c.loop_flag, c.diameter)?;
        }
        debug!(nodes = mapping.len(), "merged other tree");
        Ok(target)
    }

    /// Add an inlet, connected to `connect_via` or else to the outlet.
    pub fn add_inlet(
        &mut self,
        position: Vec3,
        flow: f64,
        connect_via: Option<NodeId>,
        terminal: Option<Uuid>,
    ) -> TreeResult<NodeId> {
        self.ensure_indexed()?;
        let target = match connect_via {
            Some(node) => {
                self.require_node(node)?;
                node
            }
            None => self.outlet,
        };
        let inlet = self.alloc_node(position, NodeKind::Inlet { flow, terminal });
        self.inlets.push(inlet);
        if let Err(err) = self.connect(inlet, target, false, None) {
            self.remove_node(inlet);
            return Err(err);
        }
        Ok(inlet)
    }

    /// Add an inlet without connecting it.
    pub fn add_unconnected_inlet(
        &mut self,
        position: Vec3,
        flow: f64,
        terminal: Option<Uuid>,
    ) -> NodeId {
        let inlet = self.alloc_node(position, NodeKind::Inlet { flow, terminal });
        self.inlets.push(inlet);
        self.invalidate();
        inlet
    }

    /// Move the outlet and refresh its network reference.
    pub fn set_outlet_position(&mut self, position: Vec3) -> TreeResult<NodeId> {
        let network_reference = self.network_reference();
        let outlet = self.outlet;
        let node = self.node_mut(outlet)?;
        node.position = position;
        if let NodeKind::Outlet {
            network_reference: reference,
            ..
        } = &mut node.kind
        {
            *reference = network_reference;
        }
        self.invalidate();
        Ok(outlet)
    }

    pub fn set_node_name(&mut self, node: NodeId, name: impl Into<String>) -> TreeResult<()> {
        self.node_mut(node)?.name = name.into();
        Ok(())
    }

    pub fn set_node_position(&mut self, node: NodeId, position: Vec3) -> TreeResult<()> {
        self.node_mut(node)?.position = position;
        self.invalidate();
        Ok(())
    }

    /// Every connection from `conn` down to the outlet, `conn` included.
    pub fn all_connections_here_to_trunk(&self, conn: ConnId) -> Vec<ConnId> {
        let mut all = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(conn);
        while let Some(id) = current {
            let Some(c) = self.connection(id) else { break };
            if !seen.insert(id) {
                break;
            }
            all.push(id);
            current = self.outgoing_main(c.end);
        }
        all
    }

    /// Visit `conn` and everything reachable following outgoing connections.
    pub fn recurse_trunkside(&self, conn: ConnId, mut action: impl FnMut(ConnId)) {
        self.walk(conn, &mut action, |tree, c| tree.outgoing(c.end));
    }

    /// Visit `conn` and everything reachable following incoming connections.
    pub fn recurse_branchside(&self, conn: ConnId, mut action: impl FnMut(ConnId)) {
        self.walk(conn, &mut action, |tree, c| tree.incoming(c.start));
    }

    fn walk(
        &self,
        conn: ConnId,
        action: &mut impl FnMut(ConnId),
        next: impl Fn(&Tree, &Connection) -> Vec<ConnId>,
    ) {
        let mut seen = HashSet::new();
        let mut stack = vec![conn];
        while let Some(id) = stack.pop() {
            let Some(c) = self.connection(id) else { continue };
            if !seen.insert(id) {
                continue;
            }
            action(id);
            let mut following = next(self, c);
            following.reverse();
            stack.extend(following);
        }
    }

    /// Deep copy with fresh identities.
    ///
    /// Returns the copy together with a map from every connection of this
    /// tree to its counterpart. Sections are rebuilt on the copy.
    pub fn clone_with_lookup(&self) -> TreeResult<(Tree, HashMap<ConnId, ConnId>)> {
        let mut node_lookup: HashMap<NodeId, NodeId> = HashMap::new();
        let mut nodes = Vec::new();
        for node in self.nodes() {
            let id = Id::from_index(nodes.len() as u32);
            node_lookup.insert(node.id, id);
            nodes.push(Some(Node {
                id,
                ..node.clone()
            }));
        }
        let remap = |id: NodeId| {
            node_lookup
                .get(&id)
                .copied()
                .ok_or(TreeError::NodeNotInTree { node: id })
        };

        let mut conn_lookup = HashMap::new();
        let mut connections = Vec::new();
        for conn in self.connections() {
            let id = Id::from_index(connections.len() as u32);
            conn_lookup.insert(conn.id, id);
            connections.push(Some(Connection {
                id,
                start: remap(conn.start)?,
                end: remap(conn.end)?,
                ..conn.clone()
            }));
        }
        let inlets = self
            .inlets
            .iter()
            .map(|id| remap(*id))
            .collect::<TreeResult<Vec<_>>>()?;

        let mut tree = Tree {
            id: Uuid::new_v4(),
            name: self.name.clone(),
            purpose: self.purpose.clone(),
            region_references: self.region_references.clone(),
            tolerance: self.tolerance,
            nodes,
            connections,
            outlet: remap(self.outlet)?,
            inlets,
            hint_paths: self
                .hint_paths
                .iter()
                .map(|(key, hint)| {
                    Ok((
                        key.clone(),
                        HintPath {
                            start: remap(hint.start)?,
                            end: remap(hint.end)?,
                            path: hint.path.clone(),
                        },
                    ))
                })
                .collect::<TreeResult<BTreeMap<_, _>>>()?,
            index: Adjacency::default(),
            sections: None,
        };
        tree.ensure_indexed()?;
        tree.update_sections()?;
        Ok((tree, conn_lookup))
    }
}

/// Natural ordering: digit runs compare by value, everything else by text.
fn lexi_numeric_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();
    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let mut xs = String::new();
                while let Some(c) = a.next_if(char::is_ascii_digit) {
                    xs.push(c);
                }
                let mut ys = String::new();
                while let Some(c) = b.next_if(char::is_ascii_digit) {
                    ys.push(c);
                }
                let xs = xs.trim_start_matches('0');
                let ys = ys.trim_start_matches('0');
                let ord = xs.len().cmp(&ys.len()).then_with(|| xs.cmp(ys));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                let ord = x.cmp(&y);
                if ord != Ordering::Equal {
                    return ord;
                }
                a.next();
                b.next();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ft_core::geom::vec3;

    fn simple_tree() -> (Tree, NodeId) {
        let mut tree = Tree::new(["sample"]);
        let inlet = tree
            .add_inlet(vec3(10.0, 0.0, 0.0), 1.0, None, None)
            .unwrap();
        (tree, inlet)
    }

    #[test]
    fn regions_sorted_naturally() {
        let tree = Tree::new(["Zone 10", "Zone 2", "Zone 1"]);
        assert_eq!(tree.region_references(), ["Zone 1", "Zone 2", "Zone 10"]);
        assert_eq!(tree.network_reference(), "Zone 1,Zone 2,Zone 10");
    }

    #[test]
    fn connect_rejects_bad_endpoints() {
        let (mut tree, inlet) = simple_tree();
        let outlet = tree.outlet();
        let other = tree.add_internal_node(vec3(5.0, 5.0, 0.0));

        assert!(matches!(
            tree.connect(other, inlet, false, None),
            Err(TreeError::EndIsInlet { .. })
        ));
        assert!(matches!(
            tree.connect(outlet, other, false, None),
            Err(TreeError::StartIsOutlet { .. })
        ));
        assert!(matches!(
            tree.connect(inlet, other, false, None),
            Err(TreeError::AlreadyConnected { .. })
        ));
        let same_place = tree.add_internal_node(vec3(5.0, 5.0, 0.0));
        assert!(matches!(
            tree.connect(other, same_place, false, None),
            Err(TreeError::ZeroLength { .. })
        ));
        assert!(matches!(
            tree.connect(other, Id::from_index(99), false, None),
            Err(TreeError::NodeNotInTree { .. })
        ));
    }

    #[test]
    fn connect_with_allow_disconnect_replaces_main() {
        let (mut tree, inlet) = simple_tree();
        let old = tree.outgoing_main(inlet).unwrap();
        let other = tree.add_internal_node(vec3(5.0, 5.0, 0.0));
        tree.connect(other, tree.outlet(), false, None).unwrap();
        let new = tree.connect(inlet, other, true, None).unwrap();
        assert!(tree.connection(old).is_none());
        assert_eq!(tree.outgoing(inlet), vec![new]);
    }

    #[test]
    fn loop_connections_may_share_a_start() {
        let (mut tree, inlet) = simple_tree();
        let other = tree.add_internal_node(vec3(5.0, 5.0, 0.0));
        tree.connect(other, tree.outlet(), false, None).unwrap();
        tree.add_loop_connection(inlet, other).unwrap();
        assert_eq!(tree.outgoing(inlet).len(), 2);
        assert!(tree.has_loops());
        assert_eq!(tree.loop_connections().len(), 1);
        let main = tree.outgoing_main(inlet).unwrap();
        assert!(!tree.connection(main).unwrap().is_loop());
    }

    #[test]
    fn split_keeps_diameter_and_order() {
        let (mut tree, inlet) = simple_tree();
        let conn = tree.outgoing_main(inlet).unwrap();
        tree.connection_mut(conn).unwrap().diameter = 0.25;
        let split = tree
            .split_connection_through_point(conn, vec3(4.0, 0.0, 0.0))
            .unwrap();
        let up = tree.connection(split.upstream).unwrap();
        let down = tree.connection(split.downstream).unwrap();
        assert_eq!(up.start, inlet);
        assert_eq!(up.end, split.node);
        assert_eq!(down.end, tree.outlet());
        assert_eq!(up.diameter, 0.25);
        assert_eq!(down.diameter, 0.25);
        assert!(tree.connection(conn).is_none());

        assert!(matches!(
            tree.split_connection_through_point(split.upstream, vec3(10.0, 0.0, 0.0)),
            Err(TreeError::SplitAtEndpoint { .. })
        ));
    }

    #[test]
    fn shift_removes_stranded_internal_node() {
        let (mut tree, inlet) = simple_tree();
        let conn = tree.outgoing_main(inlet).unwrap();
        let split = tree
            .split_connection_through_point(conn, vec3(4.0, 0.0, 0.0))
            .unwrap();
        tree.disconnect(split.downstream).unwrap();
        tree.shift_connection_to_node(split.upstream, tree.outlet())
            .unwrap();
        assert!(tree.node(split.node).is_none());
        assert!(matches!(
            tree.shift_connection_to_node(split.upstream, tree.outlet()),
            Err(TreeError::AlreadyPointedTo { .. })
        ));
        assert!(matches!(
            tree.shift_connection_to_node(split.upstream, inlet),
            Err(TreeError::InvalidEndNode { .. })
        ));
    }

    #[test]
    fn merge_connections_at_point() {
        let mut tree = Tree::new(["sample"]);
        let a = tree.add_inlet(vec3(-5.0, 5.0, 0.0), 1.0, None, None).unwrap();
        let b = tree.add_inlet(vec3(5.0, 5.0, 0.0), 1.0, None, None).unwrap();
        let conns = [tree.outgoing_main(a).unwrap(), tree.outgoing_main(b).unwrap()];
        let merged = tree
            .merge_connections_at_point(&conns, vec3(0.0, 2.0, 0.0))
            .unwrap();
        assert_eq!(tree.incoming(merged).len(), 2);
        assert_eq!(tree.incoming(tree.outlet()).len(), 1);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn merge_rejects_different_ends() {
        let mut tree = Tree::new(["sample"]);
        let a = tree.add_inlet(vec3(-5.0, 5.0, 0.0), 1.0, None, None).unwrap();
        let conn = tree.outgoing_main(a).unwrap();
        let split = tree
            .split_connection_through_point(conn, vec3(0.0, 5.0, 0.0))
            .unwrap();
        assert_eq!(
            tree.merge_connections_at_point(&[split.upstream, split.downstream], vec3(1.0, 1.0, 0.0)),
            Err(TreeError::MergeEndMismatch)
        );
        assert_eq!(
            tree.merge_connections_at_point(&[], vec3(1.0, 1.0, 0.0)),
            Err(TreeError::EmptyMerge)
        );
    }

    #[test]
    fn rejected_merge_leaves_tree_unchanged() {
        let mut tree = Tree::new(["sample"]);
        let a = tree.add_inlet(vec3(-5.0, 5.0, 0.0), 1.0, None, None).unwrap();
        let b = tree.add_inlet(vec3(5.0, 5.0, 0.0), 1.0, None, None).unwrap();
        let ca = tree.outgoing_main(a).unwrap();
        let cb = tree.outgoing_main(b).unwrap();
        let before = tree.connection_ids();
        let nodes = tree.node_count();

        assert_eq!(
            tree.merge_connections_at_point(&[ca, cb, ca], vec3(0.0, 2.0, 0.0)),
            Err(TreeError::DuplicateMerge { conn: ca })
        );
        assert_eq!(
            tree.merge_connections_at_point(&[ca, cb, cb], vec3(0.0, 2.0, 0.0)),
            Err(TreeError::DuplicateMerge { conn: cb })
        );
        assert!(matches!(
            tree.merge_connections_at_point(&[ca, cb], vec3(-5.0, 5.0, 0.0)),
            Err(TreeError::SplitAtEndpoint { .. })
        ));
        assert_eq!(tree.connection_ids(), before);
        assert_eq!(tree.node_count(), nodes);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn traversals_follow_edges() {
        let (mut tree, inlet) = simple_tree();
        let conn = tree.outgoing_main(inlet).unwrap();
        let split = tree
            .split_connection_through_point(conn, vec3(4.0, 0.0, 0.0))
            .unwrap();
        assert_eq!(
            tree.all_connections_here_to_trunk(split.upstream),
            vec![split.upstream, split.downstream]
        );
        let mut seen = Vec::new();
        tree.recurse_branchside(split.downstream, |c| seen.push(c));
        assert_eq!(seen, vec![split.downstream, split.upstream]);
        seen.clear();
        tree.recurse_trunkside(split.upstream, |c| seen.push(c));
        assert_eq!(seen, vec![split.upstream, split.downstream]);
    }

    #[test]
    fn clone_maps_every_connection() {
        let (mut tree, inlet) = simple_tree();
        let conn = tree.outgoing_main(inlet).unwrap();
        tree.split_connection_through_point(conn, vec3(4.0, 0.0, 0.0))
            .unwrap();
        let (copy, lookup) = tree.clone_with_lookup().unwrap();
        assert_ne!(copy.id(), tree.id());
        assert_eq!(lookup.len(), tree.connection_count());
        for (old, new) in &lookup {
            assert_eq!(tree.line(*old).unwrap(), copy.line(*new).unwrap());
        }
        assert!(copy.sections.is_some());
    }

    #[test]
    fn deserialized_tree_reindexes_on_first_edit() {
        let (tree, inlet) = simple_tree();
        let json = serde_json::to_string(&tree).unwrap();
        let mut restored: Tree = serde_json::from_str(&json).unwrap();
        assert!(!restored.index.ready);
        let conn = restored.outgoing_main(inlet).unwrap();
        restored
            .split_connection_through_point(conn, vec3(3.0, 0.0, 0.0))
            .unwrap();
        assert!(restored.index.ready);
        restored.check_invariants().unwrap();
    }

    #[test]
    fn deserialized_tree_without_outlet_is_uninitialized() {
        let (mut tree, inlet) = simple_tree();
        tree.outlet = inlet;
        let json = serde_json::to_string(&tree).unwrap();
        let mut restored: Tree = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            restored.add_inlet(vec3(1.0, 1.0, 0.0), 1.0, None, None),
            Err(TreeError::Uninitialized { .. })
        ));
    }

    #[test]
    fn merge_other_tree() {
        let (mut tree, inlet) = simple_tree();
        let conn = tree.outgoing_main(inlet).unwrap();

        let mut other = Tree::new(["other"]);
        other.set_outlet_position(vec3(0.0, 10.0, 0.0)).unwrap();
        other
            .add_inlet(vec3(0.0, 20.0, 0.0), 2.0, None, None)
            .unwrap();

        let node = tree
            .merge_tree_at_connection(other, conn, Some(vec3(5.0, 0.0, 0.0)))
            .unwrap();
        assert_eq!(tree.inlets().len(), 2);
        assert_eq!(tree.incoming(node).len(), 2);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn natural_order() {
        assert_eq!(lexi_numeric_cmp("a2", "a10"), Ordering::Less);
        assert_eq!(lexi_numeric_cmp("a10", "a10"), Ordering::Equal);
        assert_eq!(lexi_numeric_cmp("b1", "a10"), Ordering::Greater);
    }
}
