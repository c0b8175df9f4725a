//! Display configuration
//!
//! Every section has defaults matching the reference device, so an empty JSON
//! object is a valid configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::calibration::session::SessionSettings;
use crate::camera::ScreenGeometry;
use crate::error::ConfigError;
use crate::fusion::FusionSettings;
use crate::grid::GridSettings;
use crate::location::LocationSettings;
use crate::sky::CatalogSettings;
use crate::zoom::ZoomSettings;

/// Screen and render loop settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub screen: ScreenGeometry,
    pub target_fps: u32,
    /// Camera yaw before any input arrives, degrees
    pub initial_yaw_degrees: f64,
    /// Camera rotation per dragged pixel, degrees
    pub drag_degrees_per_pixel: f64,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            screen: ScreenGeometry::default(),
            target_fps: 60,
            initial_yaw_degrees: 180.0,
            drag_degrees_per_pixel: 0.5,
        }
    }
}

/// Where finished frames go besides the surface itself
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Raw framebuffer device, e.g. `/dev/fb0`
    pub framebuffer: Option<PathBuf>,
}

/// Complete display configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HudConfig {
    pub display: DisplaySettings,
    pub fusion: FusionSettings,
    pub location: LocationSettings,
    pub zoom: ZoomSettings,
    pub grid: GridSettings,
    pub calibration: SessionSettings,
    pub output: OutputSettings,
    pub sky: CatalogSettings,
}

impl HudConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::MagneticCalibration;
    use crate::types::GeoLocation;
    use nalgebra::{Matrix3, Vector3};

    #[test]
    fn test_empty_object_gives_device_defaults() {
        let config = HudConfig::from_json_str("{}").unwrap();

        assert_eq!(config.display.screen, ScreenGeometry::new(640, 480));
        assert_eq!(config.display.target_fps, 60);
        assert_eq!(config.fusion.imu.sample_rate, 30.0);
        assert_eq!(config.fusion.ahrs.gain, 0.5);
        assert_eq!(config.fusion.ahrs.recovery_trigger_period, 150);
        assert_eq!(config.location.port, "/dev/ttyS0");
        assert_eq!(config.location.baud_rate, 9600);
        assert_eq!(config.location.fallback, GeoLocation::FALLBACK);
        assert_eq!(config.zoom.long_press_ms, 200);
        assert_eq!(config.grid.altitude_step, 15);
        assert_eq!(config.sky.brightest_stars, 100);
        assert!(config.output.framebuffer.is_none());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = HudConfig::from_json_str(
            r#"{
                "location": { "port": "/dev/ttyUSB0" },
                "zoom": { "step_factor": 1.5 },
                "output": { "framebuffer": "/dev/fb0" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.location.port, "/dev/ttyUSB0");
        assert_eq!(config.location.baud_rate, 9600);
        assert_eq!(config.zoom.step_factor, 1.5);
        assert_eq!(config.zoom.double_press_ms, 1000);
        assert_eq!(config.output.framebuffer, Some(PathBuf::from("/dev/fb0")));
    }

    #[test]
    fn test_calibration_survives_round_trip() {
        let mut config = HudConfig::default();
        config.fusion.calibration = Some(MagneticCalibration::new(
            Vector3::new(12.0, -3.5, 40.0),
            Matrix3::from_diagonal(&Vector3::new(1.1, 0.9, 1.0)),
        ));

        let json = config.to_json_string().unwrap();
        let restored = HudConfig::from_json_str(&json).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        let result = HudConfig::from_json_str("{ \"display\": 3 }");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let result = HudConfig::from_json_file("/nonexistent/sky-hud.json");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
