use glam::{Quat, Vec3};

use crate::EPSILON;

pub fn safe_normalize(v: Vec3, fallback: Vec3) -> Vec3 {
    let len_sq = v.length_squared();
    if len_sq <= EPSILON || !len_sq.is_finite() {
        return fallback;
    }
    v / len_sq.sqrt()
}

/// Rescales `v` into `[min, max]` magnitude without touching its direction.
/// A zero vector has no direction to keep and stays zero.
pub fn clamp_magnitude(v: Vec3, min: f32, max: f32) -> Vec3 {
    let len_sq = v.length_squared();
    if len_sq <= EPSILON {
        return Vec3::ZERO;
    }

    let len = len_sq.sqrt();
    if len < min {
        v * (min / len)
    } else if len > max {
        v * (max / len)
    } else {
        v
    }
}

pub fn average(vectors: &[Vec3]) -> Vec3 {
    if vectors.is_empty() {
        return Vec3::ZERO;
    }
    vectors.iter().copied().sum::<Vec3>() / vectors.len() as f32
}

pub fn rotate_around_axis(vector: Vec3, axis: Vec3, angle_radians: f32) -> Vec3 {
    let axis = safe_normalize(axis, Vec3::Y);
    let (sin_theta, cos_theta) = angle_radians.sin_cos();
    let dot = axis.dot(vector);

    vector * cos_theta + axis.cross(vector) * sin_theta + axis * dot * (1.0 - cos_theta)
}

/// Turns direction `from` a fraction `alpha` of the way towards `to` along the
/// great circle between them and returns a unit vector.
///
/// Inputs need not be normalized. `alpha` outside `[0, 1]` over- or
/// under-rotates around the same axis. When the directions are opposite the
/// rotation axis is `from.any_orthonormal_vector()`, which is stable for a
/// given `from` but otherwise arbitrary.
pub fn slerp_direction(from: Vec3, to: Vec3, alpha: f32) -> Vec3 {
    let a = safe_normalize(from, Vec3::ZERO);
    let b = safe_normalize(to, Vec3::ZERO);
    if a == Vec3::ZERO {
        return b;
    }
    if b == Vec3::ZERO || !alpha.is_finite() {
        return a;
    }

    let cos_angle = a.dot(b).clamp(-1.0, 1.0);
    let angle = cos_angle.acos();
    if angle <= ANGLE_EPSILON {
        return a;
    }

    let cross = a.cross(b);
    let axis = if cross.length_squared() <= AXIS_EPSILON {
        a.any_orthonormal_vector()
    } else {
        cross.normalize()
    };

    safe_normalize(Quat::from_axis_angle(axis, angle * alpha) * a, a)
}

/// Rotation that points the local +X axis along `direction`.
pub fn orientation_from_direction(direction: Vec3, fallback: Quat) -> Quat {
    let dir = safe_normalize(direction, Vec3::ZERO);
    if dir == Vec3::ZERO {
        return fallback;
    }
    Quat::from_rotation_arc(Vec3::X, dir)
}

/// Deterministic value in `[-1, 1]` for `(step, index, salt)`. Lets parallel
/// workers draw per-agent randomness without sharing an RNG.
pub fn hash_unit(step: u32, index: u32, salt: u32) -> f32 {
    let mut h = step.wrapping_mul(0x9E37_79B1)
        ^ index.wrapping_mul(0x85EB_CA77)
        ^ salt.wrapping_mul(0xC2B2_AE3D);
    h ^= h >> 16;
    h = h.wrapping_mul(0x7FEB_352D);
    h ^= h >> 15;
    h = h.wrapping_mul(0x846C_A68B);
    h ^= h >> 16;

    (h as f32 / u32::MAX as f32) * 2.0 - 1.0
}

const ANGLE_EPSILON: f32 = 1.0e-6;
const AXIS_EPSILON: f32 = 1.0e-10;
