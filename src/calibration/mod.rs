//! Magnetometer hard/soft-iron calibration
//!
//! [`ellipsoid::fit`] turns a cloud of raw magnetometer readings into a
//! [`MagneticCalibration`]; [`session`] drives the interactive collection.

pub mod ellipsoid;
pub mod session;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;
use ellipsoid::EllipsoidFit;

/// Hard-iron offset and soft-iron matrix for one magnetometer
///
/// Applied to every raw reading as `soft_iron · (raw − hard_iron)`.
///
/// # Example
/// ```
/// use nalgebra::{Matrix3, Vector3};
/// use sky_hud::MagneticCalibration;
///
/// let calibration = MagneticCalibration::new(Vector3::new(10.0, 20.0, 30.0), Matrix3::identity());
/// let corrected = calibration.apply(Vector3::new(110.0, 220.0, 330.0));
/// assert_eq!(corrected, Vector3::new(100.0, 200.0, 300.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MagneticCalibration {
    /// Constant bias in microtesla
    pub hard_iron: Vector3<f32>,
    pub soft_iron: Matrix3<f32>,
}

impl MagneticCalibration {
    pub fn new(hard_iron: Vector3<f32>, soft_iron: Matrix3<f32>) -> Self {
        Self {
            hard_iron,
            soft_iron,
        }
    }

    /// Fit a calibration directly from samples
    pub fn from_samples(samples: &[Vector3<f32>]) -> Result<Self, CalibrationError> {
        ellipsoid::fit(samples).map(Self::from)
    }

    /// Corrected reading
    pub fn apply(&self, raw: Vector3<f32>) -> Vector3<f32> {
        self.soft_iron * (raw - self.hard_iron)
    }
}

impl Default for MagneticCalibration {
    fn default() -> Self {
        Self::new(Vector3::zeros(), Matrix3::identity())
    }
}

impl From<EllipsoidFit> for MagneticCalibration {
    fn from(fit: EllipsoidFit) -> Self {
        Self {
            hard_iron: fit.center.map(|v| v as f32),
            soft_iron: fit.soft_iron().map(|v| v as f32),
        }
    }
}
