//! Mathematical utilities and nalgebra extensions

use core::f64::consts::{PI, TAU};

use nalgebra::{Matrix3, Vector3};

pub const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;

/// Extension trait for single-precision sensor vectors
pub trait Vector3Ext {
    /// Normalize the vector, returning zero vector if magnitude is zero
    fn safe_normalize(&self) -> Vector3<f32>;
}

impl Vector3Ext for Vector3<f32> {
    fn safe_normalize(&self) -> Vector3<f32> {
        let magnitude = self.norm();
        if magnitude > 0.0 {
            *self / magnitude
        } else {
            Vector3::zeros()
        }
    }
}

/// Wrap an angle into `(-π, π]`
pub fn wrap_pi(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped == -PI { PI } else { wrapped }
}

/// Wrap an angle into `[0, 2π)`
pub fn wrap_tau(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid rounds tiny negative angles up to exactly 2π
    if wrapped >= TAU { 0.0 } else { wrapped }
}

/// Rotation about the vertical (y) axis
pub fn yaw_matrix(yaw: f64) -> Matrix3<f64> {
    let (s, c) = yaw.sin_cos();
    Matrix3::new(
        c, 0.0, s, //
        0.0, 1.0, 0.0, //
        -s, 0.0, c,
    )
}

/// Rotation about the horizontal (x) axis
pub fn pitch_matrix(pitch: f64) -> Matrix3<f64> {
    let (s, c) = pitch.sin_cos();
    Matrix3::new(
        1.0, 0.0, 0.0, //
        0.0, c, -s, //
        0.0, s, c,
    )
}

/// Rotation about the viewing (z) axis
pub fn roll_matrix(roll: f64) -> Matrix3<f64> {
    let (s, c) = roll.sin_cos();
    Matrix3::new(
        c, -s, 0.0, //
        s, c, 0.0, //
        0.0, 0.0, 1.0,
    )
}
