//! Geometric ordering of connections meeting at a branch node.

use std::cmp::Ordering;

use ft_core::geom::{angle_deg, is_parallel, plane_angle_deg, unit};
use ft_core::{ConnId, NodeId, Vec3};

use crate::error::{TreeError, TreeResult};
use crate::tree::Tree;

/// Cross products shorter than this are treated as zero.
const NORMAL_EPSILON: f64 = 1e-9;
/// In-plane angles closer than this (degrees) compare equal.
const ANGLE_EPSILON: f64 = 1e-6;

/// Orders incoming directions around a trunk direction.
///
/// Both directions are the connections' own start-to-end directions, so at
/// a branch node they point into the node. The comparison is made in the
/// plane spanned by the two directions (or by the trunk and the first one
/// when they are parallel), measured counter-clockwise about a canonical
/// normal.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionComparer {
    trunk: Option<Vec3>,
    straight_first: bool,
}

impl ConnectionComparer {
    pub fn new(trunk: Option<Vec3>, straight_first: bool) -> Self {
        Self {
            trunk: trunk.and_then(|t| unit(&t)),
            straight_first,
        }
    }

    pub fn compare(&self, a: &Vec3, b: &Vec3) -> TreeResult<Ordering> {
        let ambiguous = || TreeError::AmbiguousGeometry {
            first: *a,
            second: *b,
        };
        let ua = unit(a).ok_or_else(ambiguous)?;
        let ub = unit(b).ok_or_else(ambiguous)?;

        let mut normal = ua.cross(&ub);
        if normal.norm() < NORMAL_EPSILON {
            normal = self
                .trunk
                .map(|t| t.cross(&ua))
                .filter(|n| n.norm() >= NORMAL_EPSILON)
                .ok_or_else(ambiguous)?;
        }
        let normal = canonical_normal(normal);

        if self.straight_first {
            if let Some(trunk) = &self.trunk {
                let a_straight = angle_deg(&ua, trunk) < ANGLE_EPSILON;
                let b_straight = angle_deg(&ub, trunk) < ANGLE_EPSILON;
                match (a_straight, b_straight) {
                    (true, false) => return Ok(Ordering::Less),
                    (false, true) => return Ok(Ordering::Greater),
                    _ => {}
                }
            }
        }

        let reference = self
            .trunk
            .filter(|t| !is_parallel(t, &normal, 1e-12))
            .unwrap_or_else(|| in_plane_reference(&normal));
        let angle_a = plane_angle_deg(&reference, &-ua, &normal);
        let angle_b = plane_angle_deg(&reference, &-ub, &normal);
        if (angle_a - angle_b).abs() < ANGLE_EPSILON {
            return Ok(Ordering::Equal);
        }
        Ok(angle_a.total_cmp(&angle_b))
    }

    /// Stable insertion sort that stops at the first ambiguous pair.
    pub fn sort_by_direction<T: Copy>(
        &self,
        items: &mut [T],
        direction: impl Fn(T) -> Vec3,
    ) -> TreeResult<()> {
        for i in 1..items.len() {
            let mut j = i;
            while j > 0 {
                let order = self.compare(&direction(items[j - 1]), &direction(items[j]))?;
                if order != Ordering::Greater {
                    break;
                }
                items.swap(j - 1, j);
                j -= 1;
            }
        }
        Ok(())
    }

    /// Sort connections of `tree` by their directions.
    pub fn sort_connections(&self, tree: &Tree, conns: &mut [ConnId]) -> TreeResult<()> {
        let directions = conns
            .iter()
            .map(|c| Ok((*c, tree.direction(*c)?)))
            .collect::<TreeResult<Vec<_>>>()?;
        let lookup = |c: ConnId| {
            directions
                .iter()
                .find(|(id, _)| *id == c)
                .map(|(_, d)| *d)
                .unwrap_or_else(Vec3::zeros)
        };
        self.sort_by_direction(conns, lookup)
    }
}

/// Flip `n` so its first non-zero component among Z, Y, X is positive.
fn canonical_normal(n: Vec3) -> Vec3 {
    for component in [n.z, n.y, n.x] {
        if component.abs() > NORMAL_EPSILON {
            return if component < 0.0 { -n } else { n };
        }
    }
    n
}

/// First world axis (Z, Y, X) with a usable projection onto the plane.
fn in_plane_reference(normal: &Vec3) -> Vec3 {
    [Vec3::z(), Vec3::y(), Vec3::x()]
        .into_iter()
        .find(|axis| !is_parallel(axis, normal, 1e-9))
        .unwrap_or_else(Vec3::x)
}

impl Tree {
    /// Trunk direction used to order branches meeting at `node`.
    ///
    /// The direction of the node's main outgoing connection; at the outlet
    /// +Z, or +X when every incoming connection is vertical.
    pub fn trunk_reference(&self, node: NodeId) -> TreeResult<Vec3> {
        if let Some(out) = self.outgoing_main(node) {
            return self.direction(out);
        }
        let mut all_vertical = true;
        for c in self.incoming(node) {
            if !is_parallel(&self.direction(c)?, &Vec3::z(), 1e-9) {
                all_vertical = false;
                break;
            }
        }
        Ok(if all_vertical { Vec3::x() } else { Vec3::z() })
    }

    /// Comparer for the branches meeting at `node`.
    pub fn comparer_at(&self, node: NodeId, straight_first: bool) -> TreeResult<ConnectionComparer> {
        Ok(ConnectionComparer::new(
            Some(self.trunk_reference(node)?),
            straight_first,
        ))
    }
}
