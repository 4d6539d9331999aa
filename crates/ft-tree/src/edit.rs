//! Geometry driven structural edits.

use std::collections::HashSet;

use ft_core::geom::{almost_equal, angle_deg, project_onto, unit, vec3};
use ft_core::{ConnId, NodeId, Vec3, approx_eq, ensure_finite};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TreeError, TreeResult};
use crate::tree::Tree;

/// Angular tolerance in degrees for normalization no-op checks.
const NORMALIZE_ANGLE_TOLERANCE: f64 = 0.1;

/// Where [`Tree::normalize_connection_path`] places the angled leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NormalizationMode {
    /// Aligned leg first, angled leg at the end.
    #[default]
    Start,
    /// Angled leg first, aligned leg at the end.
    End,
    /// Aligned legs at both ends, angled leg in the middle.
    Middle,
}

impl Tree {
    fn single_in_out(&self, node: NodeId) -> Option<(ConnId, ConnId)> {
        let incoming = self.incoming(node);
        let outgoing = self.outgoing(node);
        match (incoming.as_slice(), outgoing.as_slice()) {
            ([i], [o]) => Some((*i, *o)),
            _ => None,
        }
    }

    /// Replace the corner at `node` by a short chamfer connection.
    ///
    /// Returns the new nodes on the incoming and outgoing side. The chamfer
    /// connection between them is `thickness` long.
    pub fn chamfer_at_node(&mut self, node: NodeId, thickness: f64) -> TreeResult<(NodeId, NodeId)> {
        self.ensure_indexed()?;
        let thickness = ensure_finite(thickness, "chamfer thickness")?;
        let position = self.position(node)?;
        let (incoming, outgoing) =
            self.single_in_out(node)
                .ok_or_else(|| TreeError::WrongDegree {
                    node,
                    incoming: self.incoming(node).len(),
                    outgoing: self.outgoing(node).len(),
                    expected: "exactly 1 incoming and 1 outgoing connection",
                })?;
        let inc = self.require_connection(incoming)?.clone();
        let out = self.require_connection(outgoing)?.clone();

        let back = self.position(inc.start)? - position;
        let ahead = self.position(out.end)? - position;
        let half_angle = angle_deg(&back, &ahead).to_radians() / 2.0;
        if thickness <= self.tolerance.distance {
            return Err(TreeError::DegenerateChamfer {
                node,
                reason: "thickness must be positive",
            });
        }
        if half_angle.sin() <= f64::EPSILON {
            return Err(TreeError::DegenerateChamfer {
                node,
                reason: "the connections fold back onto each other",
            });
        }
        let offset = thickness / (2.0 * half_angle.sin());
        let tol = self.tolerance.distance;
        if offset >= back.norm() - tol || offset >= ahead.norm() - tol {
            return Err(TreeError::DegenerateChamfer {
                node,
                reason: "the chamfer does not fit on the adjacent connections",
            });
        }
        let (Some(back_dir), Some(ahead_dir)) = (unit(&back), unit(&ahead)) else {
            return Err(TreeError::ZeroLength { at: position });
        };

        let loop_flag = Some(inc.is_loop() && out.is_loop());
        self.disconnect(inc.id)?;
        self.disconnect(out.id)?;
        let incoming_side = self.add_internal_node(position + back_dir * offset);
        let outgoing_side = self.add_internal_node(position + ahead_dir * offset);
        self.connect_with_diameter(inc.start, incoming_side, false, loop_flag, inc.diameter)?;
        self.connect_with_diameter(incoming_side, outgoing_side, false, loop_flag, inc.diameter)?;
        self.connect_with_diameter(outgoing_side, out.end, false, loop_flag, out.diameter)?;
        self.remove_if_dangling(node);
        debug!(%node, offset, "chamfered corner");
        Ok((incoming_side, outgoing_side))
    }

    /// Erase internal nodes that sit on a straight run.
    ///
    /// A node qualifies when it has one incoming and one outgoing connection
    /// with the same loop flag (and the same diameter if `check_diameter`),
    /// both on one line, and it is not at one of `excluded` positions.
    /// Returns the number of nodes removed.
    pub fn simplify(&mut self, check_diameter: bool, excluded: &[Vec3]) -> TreeResult<usize> {
        self.ensure_indexed()?;
        let tol = self.tolerance.distance;
        let candidates: Vec<NodeId> = self
            .internal_nodes()
            .filter(|n| !excluded.iter().any(|p| almost_equal(p, &n.position, tol)))
            .map(|n| n.id)
            .collect();

        let mut removed = 0;
        for node in candidates {
            if self.node(node).is_none() {
                continue;
            }
            let Some((incoming, outgoing)) = self.single_in_out(node) else {
                continue;
            };
            let inc = self.require_connection(incoming)?;
            let out = self.require_connection(outgoing)?;
            if check_diameter && inc.diameter != out.diameter {
                continue;
            }
            if inc.is_loop() != out.is_loop() || out.end == inc.start {
                continue;
            }
            if !self.line(incoming)?.is_collinear(&self.line(outgoing)?, tol) {
                continue;
            }
            let end = out.end;
            self.disconnect(outgoing)?;
            self.shift_connection_to_node(incoming, end)?;
            removed += 1;
        }
        if removed > 0 {
            debug!(removed, "simplified straight runs");
        }
        Ok(removed)
    }

    /// Merge consecutive candidate connections that continue in exactly the
    /// same direction, then rebuild sections.
    pub fn heal_splits(&mut self, candidates: &[ConnId]) -> TreeResult<()> {
        self.ensure_indexed()?;
        let set: HashSet<ConnId> = candidates.iter().copied().collect();
        let cos_tol = self.tolerance.cos_angle;
        let mut healed = 0;
        for conn in candidates {
            let Some(c) = self.connection(*conn) else {
                continue;
            };
            let middle = c.end;
            if !self.node(middle).is_some_and(|n| n.is_internal()) {
                continue;
            }
            let Some((_, outgoing)) = self.single_in_out(middle) else {
                continue;
            };
            if !set.contains(&outgoing) {
                continue;
            }
            let (a, b) = (self.direction(*conn)?, self.direction(outgoing)?);
            if a.dot(&b) < cos_tol {
                continue;
            }
            let end = self.require_connection(outgoing)?.end;
            self.disconnect(outgoing)?;
            self.shift_connection_to_node(*conn, end)?;
            healed += 1;
        }
        debug!(healed, "healed splits");
        self.update_sections()
    }

    /// Isolate the elevation change of `conn` into a vertical connection.
    ///
    /// The drop sits `distance_from_start` along the horizontal projection,
    /// measured from the start, or from the end when `flip_offset`. Returns
    /// the new nodes, start to end. Vertical and level connections are left
    /// alone.
    pub fn connect_vertically(
        &mut self,
        conn: ConnId,
        distance_from_start: f64,
        flip_offset: bool,
    ) -> TreeResult<Vec<NodeId>> {
        self.ensure_indexed()?;
        let line = self.line(conn)?;
        let (s, e) = (line.start, line.end);
        let tol = self.tolerance.distance;
        if approx_eq(s.x, e.x, tol) && approx_eq(s.y, e.y, tol) {
            return Ok(Vec::new());
        }
        if approx_eq(s.z, e.z, tol) {
            return Ok(Vec::new());
        }

        let flat_end = vec3(e.x, e.y, s.z);
        let flat_dir = unit(&(flat_end - s)).unwrap_or_else(Vec3::zeros);
        let drop = if flip_offset {
            flat_end - flat_dir * distance_from_start
        } else {
            s + flat_dir * distance_from_start
        };
        let points = [vec3(drop.x, drop.y, s.z), vec3(drop.x, drop.y, e.z)];

        let mut created = Vec::new();
        let mut current = conn;
        for point in points {
            if almost_equal(&point, &s, tol) || almost_equal(&point, &e, tol) {
                continue;
            }
            let split = self.split_connection_through_point(current, point)?;
            created.push(split.node);
            current = split.downstream;
        }
        Ok(created)
    }

    /// Split `conn` so one leg runs along `primary_axis` and the other makes
    /// `angle` degrees with it, within the plane of `plane_normal`.
    ///
    /// Returns the new connections start to end, or nothing when the
    /// connection is already aligned, perpendicular or at `angle`, or when
    /// the angled leg cannot be fitted.
    pub fn normalize_connection_path(
        &mut self,
        conn: ConnId,
        plane_normal: Vec3,
        primary_axis: Vec3,
        angle: f64,
        mode: NormalizationMode,
    ) -> TreeResult<Vec<ConnId>> {
        if !(0.0..=90.0).contains(&angle) {
            return Err(TreeError::AngleOutOfRange { angle });
        }
        self.ensure_indexed()?;
        let line = self.line(conn)?;
        let direction = line.direction();
        let tol = self.tolerance.distance;
        if direction.dot(&primary_axis) == 0.0
            || project_onto(&direction, &primary_axis).norm() < tol
        {
            return Ok(Vec::new());
        }

        let to_axis = angle_deg(&direction, &primary_axis);
        let near = |a: f64, b: f64| approx_eq(a, b, NORMALIZE_ANGLE_TOLERANCE);
        if near(to_axis, 90.0 - angle)
            || near(to_axis - 90.0, angle)
            || near(to_axis, 180.0)
            || near(to_axis, 0.0)
            || near(angle, 0.0)
        {
            return Ok(Vec::new());
        }
        let Some(secondary) = unit(&primary_axis.cross(&plane_normal)) else {
            return Ok(Vec::new());
        };

        let vector = line.vector();
        let parallel = project_onto(&vector, &primary_axis);
        let perpendicular = project_onto(&vector, &secondary);
        let (long, short) = if parallel.norm() >= perpendicular.norm() {
            (parallel, perpendicular)
        } else {
            (perpendicular, parallel)
        };
        let long_diff = short.norm() / angle.to_radians().tan();
        let Some(long_unit) = unit(&long) else {
            return Ok(Vec::new());
        };
        let run = long.norm() - long_diff;
        if run <= tol {
            return Ok(Vec::new());
        }

        let created = match mode {
            NormalizationMode::Start => {
                let split = self.split_connection_through_point(conn, line.start + long_unit * run)?;
                vec![split.upstream, split.downstream]
            }
            NormalizationMode::End => {
                let split = self.split_connection_through_point(conn, line.end - long_unit * run)?;
                vec![split.upstream, split.downstream]
            }
            NormalizationMode::Middle => {
                let first =
                    self.split_connection_through_point(conn, line.start + long_unit * run / 2.0)?;
                let second = self.split_connection_through_point(
                    first.downstream,
                    line.end - long_unit * run / 2.0,
                )?;
                vec![first.upstream, second.upstream, second.downstream]
            }
        };
        Ok(created)
    }
}
