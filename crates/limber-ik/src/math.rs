//! Rotation and direction helpers with explicit fallbacks for degenerate input.
//!
//! Every helper here returns a finite value for zero-length or collinear
//! vectors, so the solver never propagates NaN.

use std::f32::consts::PI;

use nalgebra::{Quaternion, Unit, UnitQuaternion, Vector3};

/// Squared length below which a vector is treated as zero.
pub const EPSILON: f32 = 1e-10;

/// Normalize, or return zero for a degenerate vector.
pub fn normalize_or_zero(v: &Vector3<f32>) -> Vector3<f32> {
    if v.norm_squared() > EPSILON {
        v.normalize()
    } else {
        Vector3::zeros()
    }
}

/// Any unit vector orthogonal to `v`.
pub fn orthogonal(v: &Vector3<f32>) -> Vector3<f32> {
    let candidate = if v.x.abs() < 0.9 * v.norm() {
        v.cross(&Vector3::x())
    } else {
        v.cross(&Vector3::y())
    };
    normalize_or_zero(&candidate)
}

/// Shortest rotation taking direction `from` onto direction `to`.
///
/// Zero input yields identity; antiparallel input yields a half turn about an
/// arbitrary orthogonal axis.
pub fn from_to_rotation(from: &Vector3<f32>, to: &Vector3<f32>) -> UnitQuaternion<f32> {
    if from.norm_squared() <= EPSILON || to.norm_squared() <= EPSILON {
        return UnitQuaternion::identity();
    }
    UnitQuaternion::rotation_between(from, to).unwrap_or_else(|| {
        UnitQuaternion::from_axis_angle(&Unit::new_normalize(orthogonal(from)), PI)
    })
}

/// Rotation whose local +Z faces `forward` and whose local +Y leans toward `up`.
///
/// If `up` is parallel to `forward`, the roll falls back to the shortest
/// rotation from +Z.
pub fn look_rotation(forward: &Vector3<f32>, up: &Vector3<f32>) -> UnitQuaternion<f32> {
    if forward.norm_squared() <= EPSILON {
        return UnitQuaternion::identity();
    }
    if up.cross(forward).norm_squared() <= EPSILON * forward.norm_squared() {
        return from_to_rotation(&Vector3::z(), forward);
    }
    UnitQuaternion::face_towards(forward, up)
}

/// Normalized linear interpolation along the shorter arc.
pub fn nlerp(a: &UnitQuaternion<f32>, b: &UnitQuaternion<f32>, t: f32) -> UnitQuaternion<f32> {
    if t <= 0.0 {
        return *a;
    }
    if t >= 1.0 {
        return *b;
    }
    let mut target = b.coords;
    if a.coords.dot(&target) < 0.0 {
        target = -target;
    }
    UnitQuaternion::new_normalize(Quaternion::from_vector(a.coords.lerp(&target, t)))
}

/// Make `normal` unit length and `tangent` a unit vector orthogonal to it.
///
/// Returns `None` when either is degenerate.
pub fn ortho_normalize(
    normal: &Vector3<f32>,
    tangent: &Vector3<f32>,
) -> Option<(Vector3<f32>, Vector3<f32>)> {
    if normal.norm_squared() <= EPSILON {
        return None;
    }
    let n = normal.normalize();
    let t = tangent - n * n.dot(tangent);
    if t.norm_squared() <= EPSILON {
        return None;
    }
    Some((n, t.normalize()))
}

/// Spherical interpolation of directions, with lengths interpolated linearly.
pub fn slerp_direction(from: &Vector3<f32>, to: &Vector3<f32>, t: f32) -> Vector3<f32> {
    let (from_len, to_len) = (from.norm(), to.norm());
    if from_len * from_len <= EPSILON || to_len * to_len <= EPSILON {
        return from.lerp(to, t);
    }
    let partial = from_to_rotation(from, to).powf(t);
    partial * (from / from_len) * (from_len + (to_len - from_len) * t)
}

/// Rotate `direction` back toward `normal` if it strays too far.
///
/// `clamp_weight` is a fraction of the half-circle: a direction whose
/// `1 - angle / 180°` drops below it is pulled toward `normal`. Returns the
/// possibly clamped direction and whether clamping happened.
pub fn clamp_direction(
    direction: &Vector3<f32>,
    normal: &Vector3<f32>,
    clamp_weight: f32,
) -> (Vector3<f32>, bool) {
    if clamp_weight <= 0.0 {
        return (*direction, false);
    }
    if clamp_weight >= 1.0 {
        return (*normal, true);
    }

    let dot = 1.0 - normal.angle(direction) / PI;
    if dot > clamp_weight {
        return (*direction, false);
    }

    let target_mlp = (1.0 - (clamp_weight - dot) / (1.0 - dot)).clamp(0.0, 1.0);
    let clamp_mlp = (dot / clamp_weight).clamp(0.0, 1.0);
    (slerp_direction(normal, direction, clamp_mlp * target_mlp), true)
}

/// Point at distance `length` from `anchor`, in the direction of `from`.
///
/// This is the single-joint step of forward/backward reaching.
pub fn reach_joint(from: &Vector3<f32>, anchor: &Vector3<f32>, length: f32) -> Vector3<f32> {
    anchor + normalize_or_zero(&(from - anchor)) * length
}

/// True when every component is finite.
pub fn is_finite(v: &Vector3<f32>) -> bool {
    v.iter().all(|c| c.is_finite())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn look_rotation_maps_axes() {
        let forward = Vector3::new(1.0, 0.0, 0.0);
        let up = Vector3::new(0.2, 1.0, 0.0);
        let q = look_rotation(&forward, &up);
        let z = q * Vector3::z();
        let y = q * Vector3::y();
        assert_relative_eq!(z.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(y.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn look_rotation_degenerate_up_still_faces_forward() {
        let forward = Vector3::new(0.0, 2.0, 0.0);
        let q = look_rotation(&forward, &Vector3::new(0.0, 1.0, 0.0));
        let z = q * Vector3::z();
        assert_relative_eq!(z.y, 1.0, epsilon = 1e-5);
        assert!(q.coords.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn look_rotation_zero_forward_is_identity() {
        let q = look_rotation(&Vector3::zeros(), &Vector3::y());
        assert_relative_eq!(q.angle(), 0.0);
    }

    #[test]
    fn from_to_handles_antiparallel() {
        let a = Vector3::new(1.0, 0.0, 0.0);
        let q = from_to_rotation(&a, &-a);
        let r = q * a;
        assert_relative_eq!(r.x, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn from_to_zero_is_identity() {
        let q = from_to_rotation(&Vector3::zeros(), &Vector3::x());
        assert_relative_eq!(q.angle(), 0.0);
    }

    #[test]
    fn nlerp_takes_short_arc() {
        let a = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.1);
        let b = UnitQuaternion::new_unchecked(-a.into_inner());
        let mid = nlerp(&a, &b, 0.5);
        assert_relative_eq!(mid.angle_to(&a), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn ortho_normalize_projects() {
        let (n, t) = ortho_normalize(&Vector3::new(2.0, 0.0, 0.0), &Vector3::new(1.0, 1.0, 0.0)).unwrap();
        assert_relative_eq!(n.x, 1.0);
        assert_relative_eq!(t.dot(&n), 0.0, epsilon = 1e-6);
        assert_relative_eq!(t.y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn ortho_normalize_parallel_is_none() {
        assert!(ortho_normalize(&Vector3::x(), &Vector3::new(3.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn slerp_direction_halfway() {
        let v = slerp_direction(&Vector3::x(), &Vector3::y(), 0.5);
        assert_relative_eq!(v.x, v.y, epsilon = 1e-5);
        assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn clamp_direction_passes_small_angles() {
        let (d, changed) = clamp_direction(&Vector3::new(1.0, 0.2, 0.0), &Vector3::x(), 0.5);
        assert!(!changed);
        assert_relative_eq!(d.y, 0.2);
    }

    #[test]
    fn clamp_direction_pulls_back_inverted() {
        let normal = Vector3::x();
        let (d, changed) = clamp_direction(&Vector3::new(-1.0, 0.1, 0.0), &normal, 0.505);
        assert!(changed);
        // Clamped result sits within the allowed cone.
        let dot = 1.0 - normal.angle(&d) / PI;
        assert!(dot >= 0.49, "dot = {dot}");
    }

    #[test]
    fn reach_joint_preserves_length() {
        let p = reach_joint(&Vector3::new(3.0, 4.0, 0.0), &Vector3::zeros(), 2.0);
        assert_relative_eq!(p.norm(), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn reach_joint_coincident_returns_anchor() {
        let anchor = Vector3::new(1.0, 1.0, 1.0);
        let p = reach_joint(&anchor, &anchor, 0.5);
        assert_relative_eq!(p, anchor);
    }
}
