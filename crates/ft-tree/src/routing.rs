//! Building tree structure from a route found on an external grid.
//!
//! The route maps each grid vertex to the next vertex toward the outlet
//! (`None` marks a vertex with no way on). Inlets are walked one at a time
//! and their paths are spliced into the structure already built.

use std::collections::{BTreeMap, HashMap, HashSet};

use ft_core::geom::{almost_equal, collinear_by_angle, point_on_line};
use ft_core::{ConnId, NodeId, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::TreeResult;
use crate::tree::Tree;

/// Position lookup on a routing grid.
pub trait RoutingGrid {
    /// Vertex at `position`, within the grid's own tolerance.
    fn vertex_id(&self, position: &Vec3) -> Option<u64>;
    fn vertex_position(&self, id: u64) -> Option<Vec3>;
}

/// A plain vertex table implementing [`RoutingGrid`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridGraph {
    vertices: BTreeMap<u64, Vec3>,
    tolerance: f64,
}

impl GridGraph {
    pub fn new(tolerance: f64) -> Self {
        Self {
            vertices: BTreeMap::new(),
            tolerance,
        }
    }

    pub fn add_vertex(&mut self, id: u64, position: Vec3) {
        self.vertices.insert(id, position);
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

impl RoutingGrid for GridGraph {
    fn vertex_id(&self, position: &Vec3) -> Option<u64> {
        self.vertices
            .iter()
            .find(|(_, p)| almost_equal(p, position, self.tolerance))
            .map(|(id, _)| *id)
    }

    fn vertex_position(&self, id: u64) -> Option<Vec3> {
        self.vertices.get(&id).copied()
    }
}

/// Result of [`Tree::connect_by_grid_route`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteOutcome {
    /// Inlets that could not be routed to the outlet. Their connection to
    /// the outlet is removed.
    pub failed: Vec<NodeId>,
}

impl RouteOutcome {
    pub fn all_connected(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Grid vertex → the connection that starts at it or passes through it.
type VertexConnections = HashMap<u64, ConnId>;

enum Walk {
    Reached,
    Failed,
}

impl Tree {
    /// Rebuild the inlet-to-outlet connections along `route`, then splice in
    /// each of `loops` (grid vertex sequences) as loop connections.
    ///
    /// Inlet and outlet positions are snapped to their grid vertices.
    /// Inlets that cannot be routed are reported in the outcome rather than
    /// failing the whole call.
    pub fn connect_by_grid_route(
        &mut self,
        grid: &impl RoutingGrid,
        route: &HashMap<u64, Option<u64>>,
        loops: &[Vec<u64>],
    ) -> TreeResult<RouteOutcome> {
        self.ensure_indexed()?;
        let mut outcome = RouteOutcome::default();
        let mut mapped: VertexConnections = HashMap::new();
        let inlets = self.inlets.clone();

        let outlet_position = self.position(self.outlet)?;
        let Some((outlet_vertex, outlet_point)) = grid
            .vertex_id(&outlet_position)
            .and_then(|id| Some((id, grid.vertex_position(id)?)))
        else {
            warn!("outlet is not on the routing grid");
            for inlet in inlets {
                self.fail_inlet(inlet, &mut outcome)?;
            }
            self.update_sections()?;
            return Ok(outcome);
        };
        self.set_outlet_position(outlet_point)?;

        for inlet in inlets {
            match self.route_inlet(inlet, outlet_vertex, grid, route, &mut mapped)? {
                Walk::Reached => {}
                Walk::Failed => self.fail_inlet(inlet, &mut outcome)?,
            }
        }

        if !loops.is_empty() {
            let mut routed: HashMap<u64, Vec<u64>> = route
                .iter()
                .filter_map(|(v, trunk)| trunk.map(|t| (*v, vec![t])))
                .collect();
            for path in loops {
                self.add_grid_loop(path, &mut routed, &mut mapped, grid)?;
            }
        }

        self.update_sections()?;
        debug!(
            inlets = self.inlets.len(),
            failed = outcome.failed.len(),
            "connected tree along grid route"
        );
        Ok(outcome)
    }

    fn fail_inlet(&mut self, inlet: NodeId, outcome: &mut RouteOutcome) -> TreeResult<()> {
        warn!(%inlet, "inlet could not be routed to the outlet");
        if let Some(stub) = self.outgoing_main(inlet) {
            self.disconnect(stub)?;
        }
        outcome.failed.push(inlet);
        Ok(())
    }

    fn route_inlet(
        &mut self,
        inlet: NodeId,
        outlet_vertex: u64,
        grid: &impl RoutingGrid,
        route: &HashMap<u64, Option<u64>>,
        mapped: &mut VertexConnections,
    ) -> TreeResult<Walk> {
        let Some(mut tail) = self.outgoing_main(inlet) else {
            return Ok(Walk::Failed);
        };
        let position = self.position(inlet)?;
        let Some(mut id) = grid.vertex_id(&position) else {
            return Ok(Walk::Failed);
        };
        let Some(point) = grid.vertex_position(id) else {
            return Ok(Walk::Failed);
        };
        self.set_node_position(inlet, point)?;
        if !route.contains_key(&id) {
            return Ok(Walk::Failed);
        }

        let cos_tol = self.tolerance.cos_angle;
        let tol = self.tolerance.distance;
        let mut previous: Option<ConnId> = None;
        let mut seen = HashSet::new();

        while let Some(trunk) = route.get(&id).copied().flatten() {
            if !seen.insert(id) {
                return Ok(Walk::Failed);
            }
            let Some(position) = grid.vertex_position(trunk) else {
                return Ok(Walk::Failed);
            };
            let continues_previous = match previous {
                Some(prev) => {
                    let line = self.line(prev)?;
                    collinear_by_angle(&line.start, &line.end, &position, cos_tol)
                }
                None => false,
            };

            if trunk == outlet_vertex {
                let tail_end = self.require_connection(tail)?.end;
                match previous {
                    Some(prev) if continues_previous => {
                        let corner = self.require_connection(prev)?.end;
                        self.disconnect(tail)?;
                        self.shift_connection_to_node(prev, tail_end)?;
                        self.remove_if_dangling(corner);
                        mapped.insert(id, prev);
                    }
                    _ => {
                        mapped.insert(id, tail);
                    }
                }
                return Ok(Walk::Reached);
            }

            if let Some(other) = mapped.get(&trunk).copied() {
                let other_start = self.require_connection(other)?.start;
                let mut node = other_start;
                if !almost_equal(&position, &self.position(other_start)?, tol) {
                    node = self.split_mapped(other, trunk, position, grid, mapped)?;
                }
                match previous {
                    Some(prev) if continues_previous => {
                        self.disconnect(tail)?;
                        self.shift_connection_to_node(prev, node)?;
                        mapped.insert(id, prev);
                    }
                    _ => {
                        self.shift_connection_to_node(tail, node)?;
                        mapped.insert(id, tail);
                    }
                }
                return Ok(Walk::Reached);
            }

            match previous {
                Some(prev) if continues_previous => {
                    let corner = self.require_connection(prev)?.end;
                    self.set_node_position(corner, position)?;
                }
                _ => {
                    let split = self.split_connection_through_point(tail, position)?;
                    previous = Some(split.upstream);
                    tail = split.downstream;
                }
            }
            if let Some(prev) = previous {
                mapped.insert(id, prev);
            }
            id = trunk;
        }
        Ok(Walk::Failed)
    }

    /// Split `conn` at the grid vertex `vertex` and move every vertex mapped
    /// to `conn` onto whichever half it lies on.
    fn split_mapped(
        &mut self,
        conn: ConnId,
        vertex: u64,
        position: Vec3,
        grid: &impl RoutingGrid,
        mapped: &mut VertexConnections,
    ) -> TreeResult<NodeId> {
        let split = self.split_connection_through_point(conn, position)?;
        let left = self.line(split.upstream)?;
        let tol = self.tolerance.distance;
        mapped.insert(vertex, split.downstream);
        for (v, c) in mapped.iter_mut() {
            if *c != conn {
                continue;
            }
            let on_left = grid
                .vertex_position(*v)
                .is_some_and(|p| point_on_line(&p, &left.start, &left.end, true, tol));
            *c = if on_left { split.upstream } else { split.downstream };
        }
        Ok(split.node)
    }

    fn node_for_vertex(
        &mut self,
        vertex: u64,
        grid: &impl RoutingGrid,
        mapped: &mut VertexConnections,
    ) -> TreeResult<Option<NodeId>> {
        let (Some(conn), Some(position)) = (mapped.get(&vertex).copied(), grid.vertex_position(vertex))
        else {
            return Ok(None);
        };
        let start = self.require_connection(conn)?.start;
        if almost_equal(&self.position(start)?, &position, self.tolerance.distance) {
            return Ok(Some(start));
        }
        self.split_mapped(conn, vertex, position, grid, mapped).map(Some)
    }

    fn add_grid_loop(
        &mut self,
        path: &[u64],
        routed: &mut HashMap<u64, Vec<u64>>,
        mapped: &mut VertexConnections,
        grid: &impl RoutingGrid,
    ) -> TreeResult<()> {
        let mut start_vertex: Option<u64> = None;
        let mut between: Vec<u64> = Vec::new();
        for (i, vertex) in path.iter().copied().enumerate() {
            if !mapped.contains_key(&vertex) {
                between.push(vertex);
                continue;
            }
            if let Some(start) = start_vertex {
                let adjacent = i > 0 && path[i - 1] == start;
                let joined = |a: u64, b: u64| routed.get(&a).is_some_and(|t| t.contains(&b));
                if !adjacent || (!joined(start, vertex) && !joined(vertex, start)) {
                    self.create_loop(start, vertex, &between, mapped, grid)?;
                    add_routed_path(routed, start, &between, vertex);
                }
            }
            between.clear();
            start_vertex = Some(vertex);
        }
        Ok(())
    }

    fn create_loop(
        &mut self,
        start_vertex: u64,
        end_vertex: u64,
        between: &[u64],
        mapped: &mut VertexConnections,
        grid: &impl RoutingGrid,
    ) -> TreeResult<()> {
        let Some(start) = self.node_for_vertex(start_vertex, grid, mapped)? else {
            return Ok(());
        };
        let Some(end) = self.node_for_vertex(end_vertex, grid, mapped)? else {
            return Ok(());
        };
        let mut current = self.add_loop_connection(start, end)?;
        let cos_tol = self.tolerance.cos_angle;

        for (i, vertex) in between.iter().copied().enumerate() {
            let Some(point) = grid.vertex_position(vertex) else {
                continue;
            };
            let line = self.line(current)?;
            if collinear_by_angle(&line.start, &line.end, &point, cos_tol) {
                mapped.insert(vertex, current);
                continue;
            }
            let split = self.split_connection_through_point(current, point)?;
            for earlier in &between[..i] {
                if mapped.get(earlier) == Some(&current) {
                    mapped.insert(*earlier, split.upstream);
                }
            }
            mapped.insert(vertex, split.downstream);
            current = split.downstream;
        }
        debug!(start_vertex, end_vertex, "added loop from grid");
        Ok(())
    }
}

fn add_routed_path(routed: &mut HashMap<u64, Vec<u64>>, start: u64, between: &[u64], end: u64) {
    let mut previous = start;
    for v in between.iter().copied().chain(std::iter::once(end)) {
        routed.entry(previous).or_default().push(v);
        previous = v;
    }
}
