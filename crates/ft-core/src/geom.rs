//! 3-D geometry helpers.
//!
//! Positions are plain `nalgebra` vectors. Every predicate takes its tolerance
//! explicitly; the tree decides which [`GeomTolerance`](crate::GeomTolerance)
//! to pass.

use nalgebra::Vector3;

use crate::numeric::Real;

pub type Vec3 = Vector3<Real>;

#[inline]
pub fn vec3(x: Real, y: Real, z: Real) -> Vec3 {
    Vec3::new(x, y, z)
}

/// Points closer than `tol` are the same point.
pub fn almost_equal(a: &Vec3, b: &Vec3, tol: Real) -> bool {
    (a - b).norm_squared() < tol * tol
}

/// Unit vector, or `None` for a (near) zero vector.
pub fn unit(v: &Vec3) -> Option<Vec3> {
    v.try_normalize(Real::EPSILON)
}

/// Unsigned angle between two vectors in degrees, in `[0, 180]`.
///
/// Zero-length input gives 0.
pub fn angle_deg(a: &Vec3, b: &Vec3) -> Real {
    let d = a.norm() * b.norm();
    if d == 0.0 {
        return 0.0;
    }
    let r = a.dot(b) / d;
    if (r - 1.0).abs() <= 1e-10 {
        return 0.0;
    }
    if (r + 1.0).abs() <= 1e-10 {
        return 180.0;
    }
    r.clamp(-1.0, 1.0).acos().to_degrees()
}

/// Signed angle in degrees from `from` to `to` measured counter-clockwise
/// about `normal`, normalized to `[0, 360)`.
pub fn plane_angle_deg(from: &Vec3, to: &Vec3, normal: &Vec3) -> Real {
    let n = match unit(normal) {
        Some(n) => n,
        None => return angle_deg(from, to),
    };
    let f = from - n * n.dot(from);
    let t = to - n * n.dot(to);
    let angle = n.dot(&f.cross(&t)).atan2(f.dot(&t)).to_degrees();
    let angle = if angle < 0.0 { angle + 360.0 } else { angle };
    if angle >= 360.0 - 1e-9 { 0.0 } else { angle }
}

/// Directions are parallel (same or opposite sense).
pub fn is_parallel(a: &Vec3, b: &Vec3, tol: Real) -> bool {
    match (unit(a), unit(b)) {
        (Some(a), Some(b)) => (a.dot(&b).abs() - 1.0).abs() <= tol,
        _ => false,
    }
}

/// Projection of `v` onto `axis`.
pub fn project_onto(v: &Vec3, axis: &Vec3) -> Vec3 {
    let len2 = axis.norm_squared();
    if len2 == 0.0 {
        return Vec3::zeros();
    }
    axis * (axis.dot(v) / len2)
}

/// Three points on one line, checked by the unsigned angle at `b`.
///
/// Coincident neighbours count as collinear.
pub fn collinear_by_angle(a: &Vec3, b: &Vec3, c: &Vec3, cos_tol: Real) -> bool {
    let (ba, cb) = match (unit(&(b - a)), unit(&(c - b))) {
        (Some(ba), Some(cb)) => (ba, cb),
        _ => return true,
    };
    ba.dot(&cb).abs() > cos_tol
}

/// Every point lies within `tol` of the line through the two farthest points.
pub fn collinear_by_distance(points: &[Vec3], tol: Real) -> bool {
    if points.len() < 3 {
        return true;
    }
    let mut best = (0, 0, 0.0);
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let d = (points[j] - points[i]).norm_squared();
            if d > best.2 {
                best = (i, j, d);
            }
        }
    }
    if best.2 < tol * tol {
        return true;
    }
    let line = Line::new(points[best.0], points[best.1]);
    points.iter().all(|p| line.distance_to_infinite(p) <= tol)
}

/// `point` lies on the open segment `start..end` (or on either end when
/// `include_ends`).
pub fn point_on_line(point: &Vec3, start: &Vec3, end: &Vec3, include_ends: bool, tol: Real) -> bool {
    if include_ends && (almost_equal(point, start, tol) || almost_equal(point, end, tol)) {
        return true;
    }
    let delta = end - start;
    let len2 = delta.norm_squared();
    if len2 == 0.0 {
        return false;
    }
    let lambda = (point - start).dot(&delta) / len2;
    if lambda > 0.0 && lambda < 1.0 {
        let on_line = start + delta * lambda;
        return almost_equal(&on_line, point, tol);
    }
    false
}

/// Closest points of two infinite lines `p1 + s·d1` and `p2 + t·d2`.
///
/// `None` when the lines are parallel.
pub fn closest_points(p1: &Vec3, d1: &Vec3, p2: &Vec3, d2: &Vec3) -> Option<(Vec3, Vec3)> {
    let r = p1 - p2;
    let a = d1.dot(d1);
    let b = d1.dot(d2);
    let c = d2.dot(d2);
    let d = d1.dot(&r);
    let e = d2.dot(&r);
    let denom = a * c - b * b;
    if denom.abs() <= 1e-12 * a * c {
        return None;
    }
    let s = (b * e - c * d) / denom;
    let t = (a * e - b * d) / denom;
    Some((p1 + d1 * s, p2 + d2 * t))
}

/// Compact `(x, y, z)` rendering for messages.
pub fn fmt_point(p: &Vec3) -> String {
    format!("({:.4}, {:.4}, {:.4})", p.x, p.y, p.z)
}

/// A straight segment.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Line {
    pub start: Vec3,
    pub end: Vec3,
}

impl Line {
    pub fn new(start: Vec3, end: Vec3) -> Self {
        Self { start, end }
    }

    pub fn vector(&self) -> Vec3 {
        self.end - self.start
    }

    /// Unit direction; zero for a degenerate line.
    pub fn direction(&self) -> Vec3 {
        unit(&self.vector()).unwrap_or_else(Vec3::zeros)
    }

    pub fn length(&self) -> Real {
        self.vector().norm()
    }

    pub fn midpoint(&self) -> Vec3 {
        (self.start + self.end) * 0.5
    }

    /// Distance from `p` to the infinite line through this segment.
    pub fn distance_to_infinite(&self, p: &Vec3) -> Real {
        let v = self.vector();
        let len = v.norm();
        if len == 0.0 {
            return (p - self.start).norm();
        }
        (p - self.start).cross(&v).norm() / len
    }

    /// Both segments lie on one infinite line.
    pub fn is_collinear(&self, other: &Line, tol: Real) -> bool {
        collinear_by_distance(&[self.start, self.end, other.start, other.end], tol)
    }
}

/// An open chain of points.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Polyline {
    pub vertices: Vec<Vec3>,
}

impl Polyline {
    pub fn new(vertices: Vec<Vec3>) -> Self {
        Self { vertices }
    }

    pub fn start(&self) -> Option<&Vec3> {
        self.vertices.first()
    }

    pub fn end(&self) -> Option<&Vec3> {
        self.vertices.last()
    }

    pub fn segments(&self) -> impl Iterator<Item = Line> + '_ {
        self.vertices.windows(2).map(|w| Line::new(w[0], w[1]))
    }

    pub fn length(&self) -> Real {
        self.segments().map(|s| s.length()).sum()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn coord() -> impl Strategy<Value = Real> {
        -50.0_f64..50.0
    }

    fn circular_gap(a: Real, b: Real) -> Real {
        let d = (a - b).rem_euclid(360.0);
        d.min(360.0 - d)
    }

    proptest! {
        #[test]
        fn interior_points_lie_on_segment(
            start in (coord(), coord(), coord()),
            offset in (1.0_f64..20.0, coord(), coord()),
            t in 0.05_f64..0.95,
        ) {
            let start = vec3(start.0, start.1, start.2);
            let end = start + vec3(offset.0, offset.1, offset.2);
            let point = start + (end - start) * t;
            prop_assert!(point_on_line(&point, &start, &end, false, 1e-6));
            prop_assert!(!point_on_line(&(end + (end - start)), &start, &end, true, 1e-6));
        }

        #[test]
        fn plane_angle_matches_polar_angles(
            a in 0.0_f64..360.0,
            b in 0.0_f64..360.0,
            lift in -5.0_f64..5.0,
        ) {
            let from = vec3(a.to_radians().cos(), a.to_radians().sin(), lift);
            let to = vec3(b.to_radians().cos(), b.to_radians().sin(), -lift);
            let angle = plane_angle_deg(&from, &to, &Vec3::z());
            prop_assert!((0.0..360.0).contains(&angle));
            prop_assert!(circular_gap(angle, b - a) < 1e-6);
        }
    }
}
