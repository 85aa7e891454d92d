//! Small vector helpers shared by the store and the analysis stages.

use nalgebra::{Point3, Vector3};

/// Cross products shorter than this mean the three points are collinear.
pub const DEGENERATE_EPS: f64 = 1e-9;

/// Unsigned angle between two vectors in `[0, π]`.
///
/// Uses `atan2(|a×b|, a·b)`, which stays accurate near 0 and π where the
/// `acos` form loses precision.
#[inline]
pub fn angle_between(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    a.cross(b).norm().atan2(a.dot(b))
}

/// Unnormalised face normal `(p2 - p1) × (p3 - p1)`, or `None` for a
/// degenerate (collinear or coincident) corner set.
pub fn face_normal(p1: &Point3<f64>, p2: &Point3<f64>, p3: &Point3<f64>) -> Option<Vector3<f64>> {
    let n = (p2 - p1).cross(&(p3 - p1));
    if n.norm() <= DEGENERATE_EPS { None } else { Some(n) }
}

/// Incentre of a triangle: corners weighted by the opposite side lengths.
pub fn incenter(p1: &Point3<f64>, p2: &Point3<f64>, p3: &Point3<f64>) -> Point3<f64> {
    let a = nalgebra::distance(p2, p3);
    let b = nalgebra::distance(p1, p3);
    let c = nalgebra::distance(p1, p2);
    let perimeter = a + b + c;
    if perimeter <= DEGENERATE_EPS {
        return *p1;
    }
    Point3::from((p1.coords * a + p2.coords * b + p3.coords * c) / perimeter)
}

/// Distance from `point` to the segment `a`–`b`.
pub fn point_segment_distance(point: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 <= DEGENERATE_EPS {
        return nalgebra::distance(point, a);
    }
    let t = ((point - a).dot(&ab) / len2).clamp(0.0, 1.0);
    nalgebra::distance(point, &(a + ab * t))
}

/// Any unit vector perpendicular to `axis` (which must be non-zero).
pub fn any_perpendicular(axis: &Vector3<f64>) -> Vector3<f64> {
    let helper = if axis.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
    axis.cross(&helper).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_angle_between() {
        let x = Vector3::new(1.0, 0.0, 0.0);
        let y = Vector3::new(0.0, 2.0, 0.0);
        assert!((angle_between(&x, &y) - FRAC_PI_2).abs() < 1e-12);
        assert!((angle_between(&x, &-x) - PI).abs() < 1e-12);
        assert!(angle_between(&x, &x).abs() < 1e-12);
    }

    #[test]
    fn test_face_normal_degenerate() {
        let p = Point3::origin();
        assert!(face_normal(&p, &Point3::new(1.0, 0.0, 0.0), &Point3::new(2.0, 0.0, 0.0)).is_none());
        let n = face_normal(&p, &Point3::new(1.0, 0.0, 0.0), &Point3::new(0.0, 1.0, 0.0)).unwrap();
        assert!((n - Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-12);
    }

    #[test]
    fn test_point_segment_distance() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(10.0, 0.0, 0.0);
        assert!((point_segment_distance(&Point3::new(5.0, 3.0, 0.0), &a, &b) - 3.0).abs() < 1e-12);
        assert!((point_segment_distance(&Point3::new(-4.0, 3.0, 0.0), &a, &b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_incenter_equilateral_is_centroid() {
        let p1 = Point3::new(0.0, 0.0, 0.0);
        let p2 = Point3::new(2.0, 0.0, 0.0);
        let p3 = Point3::new(1.0, 3f64.sqrt(), 0.0);
        let c = incenter(&p1, &p2, &p3);
        let centroid = Point3::from((p1.coords + p2.coords + p3.coords) / 3.0);
        assert!((c - centroid).norm() < 1e-12);
    }
}
