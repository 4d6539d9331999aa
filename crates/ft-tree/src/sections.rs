//! Derived sections: maximal single-path runs between branch points.
//!
//! Sections are never edited directly. Every structural or positional edit
//! drops the cache and the next accessor rebuilds it from the live graph.

use std::collections::{HashMap, HashSet};

use ft_core::{ConnId, NodeId, Polyline};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compare::ConnectionComparer;
use crate::error::{TreeError, TreeResult};
use crate::graph::ConnectionLocator;
use crate::tree::Tree;

/// Key of the section ending at the outlet.
pub const ROOT_SECTION_KEY: &str = "0";

/// A run of connections from `start` (upstream) to `end` (trunk side).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Comma separated child indices from the outlet, e.g. `0,1,0`.
    pub key: String,
    pub start: NodeId,
    pub end: NodeId,
    pub path: Polyline,
    /// Path last requested for this section, or `path` when none was.
    pub hint_path: Polyline,
    pub flow: f64,
}

/// A user supplied path, valid while its key still names the run between
/// the same two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct HintPath {
    pub(crate) start: NodeId,
    pub(crate) end: NodeId,
    pub(crate) path: Polyline,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SectionCache {
    pub(crate) sections: Vec<Section>,
    /// Connections of each section, start to end.
    pub(crate) members: Vec<Vec<ConnId>>,
    pub(crate) by_connection: HashMap<ConnId, usize>,
    pub(crate) by_key: HashMap<String, usize>,
}

/// Key of the parent section, or `None` for the root.
pub fn trunk_side_key(key: &str) -> Option<&str> {
    key.rsplit_once(',').map(|(parent, _)| parent)
}

struct Deriver<'a> {
    tree: &'a Tree,
    sections: Vec<Section>,
    /// Connections in walk order, end to start.
    members: Vec<Vec<ConnId>>,
    assigned: HashMap<ConnId, usize>,
    /// Branch points already expanded; a loop arriving back at one stops there.
    branched: HashSet<NodeId>,
}

impl<'a> Deriver<'a> {
    fn open(&mut self, key: String, end: NodeId) -> usize {
        self.sections.push(Section {
            key,
            start: end,
            end,
            path: Polyline::default(),
            hint_path: Polyline::default(),
            flow: 0.0,
        });
        self.members.push(Vec::new());
        self.sections.len() - 1
    }

    fn assign(&mut self, conn: ConnId, section: usize) {
        self.assigned.insert(conn, section);
        self.members[section].push(conn);
    }

    /// Walk upstream from `node`, folding single-path chains into `section`.
    fn walk(&mut self, section: usize, mut node: NodeId) -> TreeResult<()> {
        loop {
            let incoming = self.tree.incoming(node);
            let outgoing = self.tree.outgoing(node).len();
            match incoming.len() {
                0 => {
                    let flow = self
                        .tree
                        .node(node)
                        .filter(|n| n.is_inlet())
                        .and_then(|n| n.flow())
                        .unwrap_or(0.0);
                    let s = &mut self.sections[section];
                    s.start = node;
                    s.flow = flow;
                    return Ok(());
                }
                1 if outgoing <= 1 => {
                    let conn = incoming[0];
                    if self.assigned.contains_key(&conn) {
                        self.sections[section].start = node;
                        return Ok(());
                    }
                    self.assign(conn, section);
                    node = self.tree.require_connection(conn)?.start;
                }
                _ => return self.branch(section, node, incoming),
            }
        }
    }

    fn branch(&mut self, section: usize, node: NodeId, incoming: Vec<ConnId>) -> TreeResult<()> {
        self.sections[section].start = node;
        if !self.branched.insert(node) {
            return Ok(());
        }

        let comparer = ConnectionComparer::new(Some(self.tree.trunk_reference(node)?), true);
        let (mut ordered, mut loops): (Vec<ConnId>, Vec<ConnId>) = incoming
            .into_iter()
            .partition(|c| self.tree.connection(*c).is_some_and(|c| !c.is_loop()));
        comparer.sort_connections(self.tree, &mut ordered)?;
        comparer.sort_connections(self.tree, &mut loops)?;
        ordered.extend(loops);

        let key = self.sections[section].key.clone();
        let mut flow = 0.0;
        for (index, conn) in ordered.into_iter().enumerate() {
            if self.assigned.contains_key(&conn) {
                continue;
            }
            let child = self.open(format!("{key},{index}"), node);
            self.assign(conn, child);
            let upstream = self.tree.require_connection(conn)?.start;
            self.walk(child, upstream)?;
            if self.sections[child].end == node {
                flow += self.sections[child].flow;
            }
        }
        self.sections[section].flow = flow;
        Ok(())
    }
}

impl Tree {
    /// Rebuild every section from the live graph and stamp flows and
    /// locators onto the connections.
    pub fn update_sections(&mut self) -> TreeResult<()> {
        self.ensure_indexed()?;
        let mut deriver = Deriver {
            tree: self,
            sections: Vec::new(),
            members: Vec::new(),
            assigned: HashMap::new(),
            branched: HashSet::new(),
        };
        let root = deriver.open(ROOT_SECTION_KEY.to_string(), self.outlet);
        deriver.walk(root, self.outlet)?;
        let Deriver {
            mut sections,
            mut members,
            ..
        } = deriver;

        for (section, conns) in sections.iter_mut().zip(members.iter_mut()) {
            conns.reverse();
            let mut vertices = vec![self.position(section.start)?];
            for c in conns.iter() {
                let end = self.require_connection(*c)?.end;
                vertices.push(self.position(end)?);
            }
            section.path = Polyline::new(vertices);
            section.hint_path = self
                .hint_paths
                .get(&section.key)
                .filter(|h| h.start == section.start && h.end == section.end)
                .map(|h| h.path.clone())
                .unwrap_or_else(|| section.path.clone());
        }
        self.hint_paths.retain(|key, hint| {
            sections
                .iter()
                .any(|s| s.key == *key && s.start == hint.start && s.end == hint.end)
        });

        let network_reference = self.network_reference();
        let purpose = self.purpose.clone();
        for (section, conns) in sections.iter().zip(members.iter()) {
            for c in conns.iter().rev() {
                let line = self.line(*c)?;
                let conn = self.connection_mut(*c)?;
                conn.flow = section.flow;
                conn.locator = Some(ConnectionLocator {
                    network_reference: network_reference.clone(),
                    purpose: purpose.clone(),
                    section_key: section.key.clone(),
                    line,
                });
            }
        }

        let mut cache = SectionCache::default();
        for (i, (section, conns)) in sections.iter().zip(members.iter()).enumerate() {
            for c in conns {
                cache.by_connection.insert(*c, i);
            }
            cache.by_key.insert(section.key.clone(), i);
        }
        cache.sections = sections;
        cache.members = members;
        debug!(sections = cache.sections.len(), "rebuilt sections");
        self.sections = Some(cache);
        Ok(())
    }

    fn refresh_sections(&mut self, force: bool) -> TreeResult<&SectionCache> {
        if force || self.sections.is_none() {
            self.update_sections()?;
        }
        self.cached_sections()
    }

    fn cached_sections(&self) -> TreeResult<&SectionCache> {
        self.sections.as_ref().ok_or(TreeError::Uninitialized {
            what: "sections could not be derived",
        })
    }

    /// All sections, rebuilt when stale or when `force` is set.
    ///
    /// With `sort_closest_to_furthest`, sections are ordered by the total
    /// path length from each one down to the outlet.
    pub fn sections(&mut self, force: bool, sort_closest_to_furthest: bool) -> TreeResult<Vec<Section>> {
        let cache = self.refresh_sections(force)?;
        let mut sections = cache.sections.clone();
        if sort_closest_to_furthest {
            let distance = |key: &str| {
                let mut total = 0.0;
                let mut current = Some(key);
                while let Some(k) = current {
                    if let Some(i) = cache.by_key.get(k) {
                        total += cache.sections[*i].path.length();
                    }
                    current = trunk_side_key(k);
                }
                total
            };
            let mut keyed: Vec<(f64, Section)> = sections
                .into_iter()
                .map(|s| (distance(&s.key), s))
                .collect();
            keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
            sections = keyed.into_iter().map(|(_, s)| s).collect();
        }
        Ok(sections)
    }

    /// Sections containing at least one loop connection.
    pub fn loop_sections(&mut self) -> TreeResult<Vec<Section>> {
        self.refresh_sections(false)?;
        let cache = self.cached_sections()?;
        let mut found = Vec::new();
        for (section, conns) in cache.sections.iter().zip(cache.members.iter()) {
            if conns
                .iter()
                .any(|c| self.connection(*c).is_some_and(|c| c.is_loop()))
            {
                found.push(section.clone());
            }
        }
        Ok(found)
    }

    /// Look a section up by key. A `prefix:key` form is accepted and only
    /// the part after the colon is used.
    pub fn section_from_key(&mut self, key: &str) -> TreeResult<Section> {
        if key.matches(':').count() > 1 {
            return Err(TreeError::MalformedKey { key: key.to_string() });
        }
        let local = key.rsplit(':').next().unwrap_or(key);
        let cache = self.refresh_sections(false)?;
        cache
            .by_key
            .get(local)
            .map(|i| cache.sections[*i].clone())
            .ok_or_else(|| TreeError::SectionNotFound { key: key.to_string() })
    }

    pub fn section_for_connection(&mut self, conn: ConnId) -> TreeResult<Option<Section>> {
        self.require_connection(conn)?;
        let cache = self.refresh_sections(false)?;
        Ok(cache
            .by_connection
            .get(&conn)
            .map(|i| cache.sections[*i].clone()))
    }

    pub fn flow_of_connection(&mut self, conn: ConnId) -> TreeResult<f64> {
        self.refresh_sections(false)?;
        Ok(self.require_connection(conn)?.flow)
    }

    pub fn flow_of_section_key(&mut self, key: &str) -> TreeResult<f64> {
        Ok(self.section_from_key(key)?.flow)
    }

    /// Connections of `section`, start to end.
    pub fn connections_for_section(&mut self, section: &Section) -> TreeResult<Vec<ConnId>> {
        self.connections_for_section_key(&section.key)
    }

    pub fn connections_for_section_key(&mut self, key: &str) -> TreeResult<Vec<ConnId>> {
        let local = self.section_from_key(key)?.key;
        let cache = self.refresh_sections(false)?;
        Ok(cache
            .by_key
            .get(&local)
            .map(|i| cache.members[*i].clone())
            .unwrap_or_default())
    }

    /// The section directly downstream of `section`, `None` for the root.
    pub fn trunk_side_section(&mut self, section: &Section) -> TreeResult<Option<Section>> {
        match trunk_side_key(&section.key) {
            Some(parent) => self.section_from_key(parent).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ft_core::geom::vec3;

    fn two_inlets() -> Tree {
        let mut tree = Tree::new(["sample"]);
        tree.add_inlet(vec3(-5.0, 0.0, 0.0), 1.0, None, None)
            .unwrap();
        tree.add_inlet(vec3(5.0, 0.0, 0.0), 2.0, None, None)
            .unwrap();
        tree
    }

    #[test]
    fn two_inlets_give_three_sections() {
        let mut tree = two_inlets();
        let sections = tree.sections(false, false).unwrap();
        assert_eq!(sections.len(), 3);

        let root = tree.section_from_key("0").unwrap();
        assert_eq!(root.flow, 3.0);
        assert_eq!(root.start, tree.outlet());
        assert_eq!(root.end, tree.outlet());

        let mut leaf_flows: Vec<f64> = sections
            .iter()
            .filter(|s| s.key != "0")
            .map(|s| s.flow)
            .collect();
        leaf_flows.sort_by(f64::total_cmp);
        assert_eq!(leaf_flows, vec![1.0, 2.0]);
    }

    #[test]
    fn chain_is_a_single_section() {
        let mut tree = Tree::new(["sample"]);
        let inlet = tree
            .add_inlet(vec3(0.0, 10.0, 0.0), 4.0, None, None)
            .unwrap();
        let conn = tree.outgoing_main(inlet).unwrap();
        let split = tree
            .split_connection_through_point(conn, vec3(0.0, 5.0, 0.0))
            .unwrap();

        let sections = tree.sections(false, false).unwrap();
        assert_eq!(sections.len(), 1);
        let root = &sections[0];
        assert_eq!(root.start, inlet);
        assert_eq!(root.path.vertices.len(), 3);
        assert_eq!(root.hint_path, root.path);
        assert_eq!(
            tree.connections_for_section_key("0").unwrap(),
            vec![split.upstream, split.downstream]
        );
        assert_eq!(tree.flow_of_connection(split.upstream).unwrap(), 4.0);
        let locator = tree
            .connection(split.downstream)
            .unwrap()
            .locator
            .clone()
            .unwrap();
        assert_eq!(locator.section_key, "0");
        assert_eq!(locator.network_reference, "sample");
    }

    #[test]
    fn edits_invalidate_the_cache() {
        let mut tree = two_inlets();
        tree.sections(false, false).unwrap();
        assert!(tree.sections.is_some());
        tree.set_node_position(tree.inlets()[0], vec3(-6.0, 0.0, 0.0))
            .unwrap();
        assert!(tree.sections.is_none());
        assert_eq!(tree.sections(false, false).unwrap().len(), 3);
    }

    #[test]
    fn key_lookup_rules() {
        let mut tree = two_inlets();
        assert!(tree.section_from_key("net:0,1").is_ok());
        assert!(matches!(
            tree.section_from_key("a:b:0"),
            Err(TreeError::MalformedKey { .. })
        ));
        assert!(matches!(
            tree.section_from_key("0,7"),
            Err(TreeError::SectionNotFound { .. })
        ));
    }

    #[test]
    fn trunk_side_lookup() {
        assert_eq!(trunk_side_key("0,1,2"), Some("0,1"));
        assert_eq!(trunk_side_key("0"), None);

        let mut tree = two_inlets();
        let child = tree.section_from_key("0,1").unwrap();
        let parent = tree.trunk_side_section(&child).unwrap().unwrap();
        assert_eq!(parent.key, "0");
        assert!(tree.trunk_side_section(&parent).unwrap().is_none());
    }

    #[test]
    fn sorted_sections_start_at_the_outlet() {
        let mut tree = Tree::new(["sample"]);
        let near = tree
            .add_inlet(vec3(0.0, 2.0, 0.0), 1.0, None, None)
            .unwrap();
        tree.add_inlet(vec3(9.0, 0.0, 0.0), 1.0, None, None)
            .unwrap();
        let sorted = tree.sections(false, true).unwrap();
        assert_eq!(sorted[0].key, "0");
        assert_eq!(sorted[1].start, near);
    }
}
