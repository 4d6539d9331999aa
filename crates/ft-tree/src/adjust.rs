//! Replacing the path of a whole section.

use ft_core::geom::{almost_equal, angle_deg, closest_points, is_parallel, unit};
use ft_core::{GeomTolerance, Polyline, Vec3};
use tracing::debug;

use crate::error::{TreeError, TreeResult};
use crate::sections::{HintPath, Section};
use crate::tree::Tree;

/// Turn angles (degrees) a section path is snapped to.
pub const PREFERRED_TURN_ANGLES: [f64; 2] = [90.0, 45.0];

/// A joint within this many degrees of an allowed angle is left alone.
const COMPLIANCE_ANGLE_TOLERANCE: f64 = 0.1;

impl Tree {
    /// Route the section `section_key` along `path`.
    ///
    /// The section keeps its start and end nodes (moved to the path ends if
    /// needed); everything between them is replaced. Turns are snapped to
    /// [`PREFERRED_TURN_ANGLES`] first, measured against the connection that
    /// feeds the section start, or +Z for an inlet. Collinear leftovers are
    /// merged and `path` is remembered as the section's hint path.
    pub fn adjust_path(&mut self, section_key: &str, path: &[Vec3]) -> TreeResult<Section> {
        if path.len() < 2 {
            return Err(TreeError::PathTooShort { count: path.len() });
        }
        let section = self.section_from_key(section_key)?;
        let (start, end) = (section.start, section.end);
        let first = self
            .connections_for_section_key(&section.key)?
            .first()
            .copied()
            .ok_or_else(|| TreeError::SectionNotFound {
                key: section_key.to_string(),
            })?;

        let mut head = self.require_connection(first)?.end;
        if head != end {
            self.shift_connection_to_node(first, end)?;
        }
        let mut guard = self.connection_count();
        while head != end && guard > 0 {
            guard -= 1;
            let Some(next) = self.outgoing_main(head) else {
                break;
            };
            let removed = self.disconnect(next)?;
            self.remove_if_dangling(removed.start);
            head = removed.end;
        }

        let reference = match self.incoming(start).first() {
            Some(c) => self.direction(*c)?,
            None => Vec3::z(),
        };
        let points =
            force_angle_compliance(path, &PREFERRED_TURN_ANGLES, &reference, &self.tolerance);
        let tol = self.tolerance.distance;

        if let Some(p) = points.first() {
            if !almost_equal(p, &self.position(start)?, tol) {
                self.set_node_position(start, *p)?;
            }
        }
        if let Some(p) = points.last() {
            if !almost_equal(p, &self.position(end)?, tol) {
                self.set_node_position(end, *p)?;
            }
        }

        let mut created = Vec::new();
        let mut current = first;
        if points.len() > 2 {
            for p in &points[1..points.len() - 1] {
                let split = self.split_connection_through_point(current, *p)?;
                created.push(split.node);
                current = split.downstream;
            }
        }

        for node in created {
            let incoming = self.incoming(node);
            let Some(outgoing) = self.outgoing_main(node) else {
                continue;
            };
            if incoming.len() != 1 {
                continue;
            }
            if is_parallel(&self.direction(incoming[0])?, &self.direction(outgoing)?, 1e-9) {
                let new_end = self.require_connection(outgoing)?.end;
                self.disconnect(outgoing)?;
                self.shift_connection_to_node(incoming[0], new_end)?;
            }
        }

        self.hint_paths.insert(
            section.key.clone(),
            HintPath {
                start,
                end,
                path: Polyline::new(path.to_vec()),
            },
        );
        self.update_sections()?;
        debug!(key = %section.key, points = points.len(), "adjusted section path");
        self.section_from_key(&section.key)
    }
}

/// Nudge the interior of `points` so each turn matches one of `allowed`
/// (straight runs always qualify).
///
/// A bad turn between segments `i - 1` and `i` is fixed by rotating segment
/// `i` about its midpoint and sliding its ends along the neighbouring
/// segments. When segment `i` is the last one, segment `i - 1` pivots about
/// its start instead so the final point stays put. The first segment is
/// checked against `reference`, pivoting about the first point.
pub fn force_angle_compliance(
    points: &[Vec3],
    allowed: &[f64],
    reference: &Vec3,
    tolerance: &GeomTolerance,
) -> Vec<Vec3> {
    let mut p = dedup(points, tolerance.distance);
    if p.len() < 3 {
        return p;
    }
    let segments = p.len() - 1;

    // First segment against the incoming direction.
    if let Some(target) = snap_target(reference, &(p[1] - p[0]), allowed) {
        if let Some(dir) = rotated(reference, &(p[1] - p[0]), target) {
            let next_dir = p[2] - p[1];
            if let Some(q) = meet(&p[0], &dir, &p[1], &next_dir, tolerance.distance) {
                p[1] = q;
            }
        }
    }

    for i in 1..segments {
        let prev_dir = p[i] - p[i - 1];
        let dir = p[i + 1] - p[i];
        let Some(target) = snap_target(&prev_dir, &dir, allowed) else {
            continue;
        };
        if i + 1 < segments {
            let Some(new_dir) = rotated(&prev_dir, &dir, target) else {
                continue;
            };
            let mid = (p[i] + p[i + 1]) * 0.5;
            let next_dir = p[i + 2] - p[i + 1];
            let start = meet(&mid, &new_dir, &p[i - 1], &prev_dir, tolerance.distance);
            let end = meet(&mid, &new_dir, &p[i + 1], &next_dir, tolerance.distance);
            if let (Some(start), Some(end)) = (start, end) {
                p[i] = start;
                p[i + 1] = end;
            }
        } else {
            let Some(new_dir) = rotated(&dir, &prev_dir, target) else {
                continue;
            };
            if let Some(q) = meet(&p[i - 1], &new_dir, &p[i + 1], &dir, tolerance.distance) {
                p[i] = q;
            }
        }
    }
    dedup(&p, tolerance.distance)
}

/// The allowed angle to snap the turn `from -> to` to, or `None` when the
/// turn already complies or is nearest to straight.
fn snap_target(from: &Vec3, to: &Vec3, allowed: &[f64]) -> Option<f64> {
    let angle = angle_deg(from, to);
    let candidates = std::iter::once(0.0).chain(allowed.iter().copied());
    if candidates
        .clone()
        .any(|a| (angle - a).abs() <= COMPLIANCE_ANGLE_TOLERANCE)
    {
        return None;
    }
    let nearest = candidates.min_by(|a, b| (angle - a).abs().total_cmp(&(angle - b).abs()))?;
    (nearest > 0.0).then_some(nearest)
}

/// A direction making `target` degrees with `base`, in the plane of `base`
/// and `toward`, on the side of `toward`.
fn rotated(base: &Vec3, toward: &Vec3, target: f64) -> Option<Vec3> {
    let base = unit(base)?;
    let perp = unit(&(toward - base * base.dot(toward)))?;
    let t = target.to_radians();
    Some(base * t.cos() + perp * t.sin())
}

/// Where the line `a + s·da` crosses the line `b + t·db`, as a point on the
/// second line. `None` when they are parallel or do not meet.
fn meet(a: &Vec3, da: &Vec3, b: &Vec3, db: &Vec3, tol: f64) -> Option<Vec3> {
    let (on_a, on_b) = closest_points(a, da, b, db)?;
    almost_equal(&on_a, &on_b, tol).then_some(on_b)
}

fn dedup(points: &[Vec3], tol: f64) -> Vec<Vec3> {
    let mut out: Vec<Vec3> = Vec::with_capacity(points.len());
    for p in points {
        if out.last().is_some_and(|last| almost_equal(last, p, tol)) {
            continue;
        }
        out.push(*p);
    }
    out
}
