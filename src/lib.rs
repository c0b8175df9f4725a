//! Sky HUD - core of a head-up sky display
//!
//! Renders a celestial grid, bright stars and solar-system bodies projected
//! onto a small screen according to the device's physical orientation and
//! geographic location.
//!
//! The pieces:
//!
//! - [`Camera`]: sky direction to screen pixel projection and back
//! - [`OrientationDriver`]: background IMU fusion publishing the camera attitude
//! - [`LocationDriver`]: background NMEA reader with a bounded-wait fallback
//! - [`calibration`]: ellipsoid fit of magnetometer hard- and soft-iron distortion
//! - [`ZoomButton`] and [`FieldOfView`]: press, double-press and long-press zoom
//! - [`SkyHud`]: the render/input loop tying them together
//!
//! Ephemeris lookup, raster drawing and sensor hardware stay outside the crate
//! behind the [`Ephemeris`], [`RasterSurface`] and [`SensorBus`] traits.
//!
//! # Quick Start
//!
//! ```rust
//! use sky_hud::{Camera, ScreenGeometry, SkyDirection};
//!
//! let screen = ScreenGeometry::new(640, 480);
//! let camera = Camera::new(0.0, 0.0, 0.0, 60f64.to_radians(), screen);
//!
//! // Level camera with zero yaw faces the northern horizon
//! let north = camera.project(&SkyDirection::on_horizon(0.0)).unwrap();
//! assert!((north.x - 320.0).abs() < 1e-9);
//!
//! // Directions behind the camera have no screen position
//! assert!(camera.project(&SkyDirection::on_horizon(180.0)).is_none());
//! ```

mod ahrs;
pub mod calibration;
mod camera;
pub mod config;
pub mod error;
pub mod fusion;
mod grid;
pub mod hud;
pub mod location;
mod math;
pub mod offset;
pub mod render;
pub mod sensor;
pub mod sky;
mod snapshot;
mod types;
pub mod zoom;

// Re-export the commonly used types
pub use ahrs::{Ahrs, FusionEngine};
pub use calibration::MagneticCalibration;
pub use camera::{Camera, PHYSICAL_FOV_DEGREES, ProjectedPoint, ScreenGeometry, visible_runs};
pub use config::HudConfig;
pub use error::{CalibrationError, ConfigError, DriverError, LocationError, RenderError, SensorError};
pub use fusion::{EulerMapping, FusionLoop, FusionSettings, OrientationDriver};
pub use grid::{GridFrame, GridSettings, SkyGrid};
pub use hud::{FramePacer, InputEvent, SkyHud};
pub use location::{LocationDriver, LocationSettings, parse_sentence};
pub use math::{Vector3Ext, wrap_pi, wrap_tau};
pub use offset::Offset;
pub use render::{RasterSurface, SceneRenderer};
pub use sensor::{ImuConfig, InertialSample, SensorBus};
pub use sky::{Ephemeris, Observer, SkyCatalog, StarRecord};
pub use snapshot::{DriverState, Snapshot};
pub use types::*;
pub use zoom::{FieldOfView, Press, ZoomButton, ZoomDirection, ZoomSettings};
