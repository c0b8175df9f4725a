//! Core types shared across the display pipeline and the fusion engine

use core::f64::consts::FRAC_PI_2;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::math::wrap_tau;

/// A direction in the observer's local horizontal frame.
///
/// Altitude is the angle above the horizon, azimuth the compass bearing
/// measured from north towards east. Both are stored in radians; azimuth is
/// wrapped into `[0, 2π)` on construction, altitude is taken as given
/// (callers validate it against `[-π/2, π/2]`).
///
/// # Example
/// ```
/// use sky_hud::SkyDirection;
///
/// let vega = SkyDirection::from_degrees(38.8, 279.2);
/// assert!((vega.altitude_degrees() - 38.8).abs() < 1e-9);
///
/// // Azimuth wraps modulo 360°
/// let wrapped = SkyDirection::from_degrees(0.0, 370.0);
/// assert!((wrapped.azimuth_degrees() - 10.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SkyDirection {
    altitude: f64,
    azimuth: f64,
}

impl SkyDirection {
    /// Create a direction from radians
    pub fn new(altitude: f64, azimuth: f64) -> Self {
        Self {
            altitude,
            azimuth: wrap_tau(azimuth),
        }
    }

    /// Create a direction from degrees
    pub fn from_degrees(altitude: f64, azimuth: f64) -> Self {
        Self::new(altitude.to_radians(), azimuth.to_radians())
    }

    /// Point on the horizon at the given azimuth (degrees)
    pub fn on_horizon(azimuth: f64) -> Self {
        Self::from_degrees(0.0, azimuth)
    }

    /// Straight up
    pub fn zenith() -> Self {
        Self::new(FRAC_PI_2, 0.0)
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn azimuth(&self) -> f64 {
        self.azimuth
    }

    pub fn altitude_degrees(&self) -> f64 {
        self.altitude.to_degrees()
    }

    pub fn azimuth_degrees(&self) -> f64 {
        self.azimuth.to_degrees()
    }

    /// Unit vector in the camera world frame
    ///
    /// `x = sin(az)·cos(-alt)`, `y = sin(-alt)`, `z = cos(az)·cos(-alt)`: +z
    /// points north along the horizon, +y points down.
    pub fn to_unit_vector(&self) -> Vector3<f64> {
        let (sin_az, cos_az) = self.azimuth.sin_cos();
        let (sin_alt, cos_alt) = (-self.altitude).sin_cos();
        Vector3::new(sin_az * cos_alt, sin_alt, cos_az * cos_alt)
    }

    /// Recover a direction from a (not necessarily unit) world-frame vector
    ///
    /// Returns `None` for a zero vector.
    pub fn from_vector(vector: Vector3<f64>) -> Option<Self> {
        let unit = vector.try_normalize(f64::EPSILON)?;
        let altitude = (-unit.y).clamp(-1.0, 1.0).asin();
        let azimuth = unit.x.atan2(unit.z);
        Some(Self::new(altitude, azimuth))
    }

    /// Great-circle separation between two directions in radians
    pub fn separation(&self, other: &SkyDirection) -> f64 {
        let dot = self.to_unit_vector().dot(&other.to_unit_vector());
        dot.clamp(-1.0, 1.0).acos()
    }
}

/// A position on the screen in pixels
///
/// Kept as floating point so the inverse projection can round-trip exactly;
/// use [`ScreenPoint::to_pixel`] when handing coordinates to a raster surface.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Nearest integer pixel
    pub fn to_pixel(&self) -> (i32, i32) {
        (self.x.round() as i32, self.y.round() as i32)
    }

    /// Translate by a pixel offset
    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Geographic location in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// Latitude in degrees, positive north
    pub latitude: f64,
    /// Longitude in degrees, positive east
    pub longitude: f64,
}

impl GeoLocation {
    /// Dayton, Ohio. Used whenever no fix is obtained in time.
    pub const FALLBACK: GeoLocation = GeoLocation {
        latitude: 39.7589,
        longitude: -84.1916,
    };

    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl Default for GeoLocation {
    fn default() -> Self {
        Self::FALLBACK
    }
}

/// Camera attitude in radians
///
/// Right-handed, composed in yaw-pitch-roll order when a [`Camera`](crate::Camera)
/// is built from it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

impl Orientation {
    pub fn new(pitch: f64, yaw: f64, roll: f64) -> Self {
        Self { pitch, yaw, roll }
    }
}

/// Earth axes convention
///
/// Defines the coordinate system used for Earth-relative calculations.
///
/// # Conventions
/// - **NWU**: North-West-Up (X=North, Y=West, Z=Up)
/// - **ENU**: East-North-Up (X=East, Y=North, Z=Up)
/// - **NED**: North-East-Down (X=North, Y=East, Z=Down)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Convention {
    #[default]
    Nwu,
    Enu,
    Ned,
}

/// Fusion engine settings
///
/// Controls the complementary filter: coordinate convention, gain, gyroscope
/// range and the rejection thresholds for the accelerometer and magnetometer.
///
/// # Example
/// ```
/// use sky_hud::{AhrsSettings, Convention};
///
/// let settings = AhrsSettings {
///     convention: Convention::Nwu,
///     gain: 0.5,
///     gyroscope_range: 2000.0,
///     acceleration_rejection: 10.0,
///     magnetic_rejection: 10.0,
///     recovery_trigger_period: 150, // 5 s at 30 Hz
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AhrsSettings {
    /// Earth axes convention (NWU, ENU, or NED)
    pub convention: Convention,
    /// Algorithm gain controlling how quickly accelerometer and magnetometer
    /// corrections pull the gyroscope estimate (typically 0.5)
    pub gain: f32,
    /// Gyroscope range in degrees per second. Readings above 98% of it
    /// restart initialisation. Zero disables the check.
    pub gyroscope_range: f32,
    /// Accelerometer rejection threshold in degrees. Zero disables rejection.
    pub acceleration_rejection: f32,
    /// Magnetometer rejection threshold in degrees. Zero disables rejection.
    pub magnetic_rejection: f32,
    /// Number of consecutive rejected samples before a sensor is ignored
    pub recovery_trigger_period: u32,
}

impl Default for AhrsSettings {
    fn default() -> Self {
        Self {
            convention: Convention::default(),
            gain: 0.5,
            gyroscope_range: 0.0,
            acceleration_rejection: 90.0,
            magnetic_rejection: 90.0,
            recovery_trigger_period: 0,
        }
    }
}

impl AhrsSettings {
    /// Settings used by the display's orientation driver at `sample_rate` Hz
    pub fn for_sample_rate(sample_rate: f32) -> Self {
        Self {
            convention: Convention::Nwu,
            gain: 0.5,
            gyroscope_range: 2000.0,
            acceleration_rejection: 10.0,
            magnetic_rejection: 10.0,
            recovery_trigger_period: (5.0 * sample_rate).round() as u32,
        }
    }
}

/// Diagnostic view of the fusion engine internals
#[derive(Debug, Clone, Copy, Default)]
pub struct AhrsInternalStates {
    /// Angle between measured and expected acceleration, degrees
    pub acceleration_error: f32,
    pub accelerometer_ignored: bool,
    /// Recovery trigger as a fraction of the recovery period
    pub acceleration_recovery_trigger: f32,
    /// Angle between measured and expected magnetic field, degrees
    pub magnetic_error: f32,
    pub magnetometer_ignored: bool,
    pub magnetic_recovery_trigger: f32,
}

/// Fusion engine status flags
#[derive(Debug, Clone, Copy, Default)]
pub struct AhrsFlags {
    /// True while the gain is still ramping down after start or overflow
    pub initialising: bool,
    /// True while recovering from gyroscope range overflow
    pub angular_rate_recovery: bool,
    pub acceleration_recovery: bool,
    pub magnetic_recovery: bool,
}

/// Gyroscope offset correction settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffsetSettings {
    /// Low-pass cutoff of the offset estimate in Hz
    pub cutoff_frequency: f32,
    /// Seconds the gyroscope must stay below `threshold` before estimation starts
    pub timeout: f32,
    /// Per-axis stationary threshold in degrees per second
    pub threshold: f32,
}

impl Default for OffsetSettings {
    fn default() -> Self {
        Self {
            cutoff_frequency: 0.02,
            timeout: 5.0,
            threshold: 3.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f64::consts::TAU;

    #[test]
    fn test_unit_vector_cardinal_directions() {
        let north = SkyDirection::on_horizon(0.0).to_unit_vector();
        assert!((north - Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-12);

        let east = SkyDirection::on_horizon(90.0).to_unit_vector();
        assert!((east - Vector3::new(1.0, 0.0, 0.0)).norm() < 1e-12);

        // +y points down, so the zenith is -y
        let up = SkyDirection::zenith().to_unit_vector();
        assert!((up - Vector3::new(0.0, -1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_vector_round_trip() {
        let direction = SkyDirection::from_degrees(-23.5, 211.0);
        let recovered = SkyDirection::from_vector(direction.to_unit_vector() * 7.0).unwrap();

        assert!((recovered.altitude() - direction.altitude()).abs() < 1e-12);
        assert!((recovered.azimuth() - direction.azimuth()).abs() < 1e-12);
    }

    #[test]
    fn test_zero_vector_has_no_direction() {
        assert!(SkyDirection::from_vector(Vector3::zeros()).is_none());
    }

    #[test]
    fn test_azimuth_wraps() {
        let negative = SkyDirection::from_degrees(10.0, -90.0);
        assert!((negative.azimuth_degrees() - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_tiny_negative_azimuth_wraps_to_zero() {
        let direction = SkyDirection::new(0.0, -1e-17);
        assert!(direction.azimuth() < TAU);
        assert_eq!(direction.azimuth(), 0.0);
    }

    #[test]
    fn test_separation() {
        let a = SkyDirection::on_horizon(0.0);
        let b = SkyDirection::on_horizon(90.0);
        assert!((a.separation(&b) - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_driver_ahrs_settings() {
        let settings = AhrsSettings::for_sample_rate(30.0);
        assert_eq!(settings.recovery_trigger_period, 150);
        assert_eq!(settings.gyroscope_range, 2000.0);
        assert_eq!(settings.convention, Convention::Nwu);
    }
}
