//! Orientation fusion driver
//!
//! A background thread owns the sensor bus, runs the fusion engine at a fixed
//! tick and publishes the resulting camera [`Orientation`] into a single-slot
//! snapshot. Initialisation failure leaves the driver permanently `Failed`;
//! consumers then fall back to manual camera control.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, warn};

use crate::ahrs::{Ahrs, FusionEngine};
use crate::calibration::MagneticCalibration;
use crate::error::{DriverError, SensorError};
use crate::offset::Offset;
use crate::sensor::{ImuConfig, SensorBus};
use crate::snapshot::{DriverState, DriverStatus, Snapshot};
use crate::types::{AhrsSettings, OffsetSettings, Orientation};

/// Engine Euler angle an output axis is taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EulerAxis {
    Roll,
    Pitch,
    Yaw,
}

/// `output = sign · source + offset`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisMapping {
    pub source: EulerAxis,
    /// +1 or -1
    pub sign: f64,
    pub offset_degrees: f64,
}

impl AxisMapping {
    pub fn new(source: EulerAxis, sign: f64, offset_degrees: f64) -> Self {
        Self {
            source,
            sign,
            offset_degrees,
        }
    }

    fn apply(&self, roll: f64, pitch: f64, yaw: f64) -> f64 {
        let value = match self.source {
            EulerAxis::Roll => roll,
            EulerAxis::Pitch => pitch,
            EulerAxis::Yaw => yaw,
        };
        self.sign * value + self.offset_degrees.to_radians()
    }
}

/// How engine Euler angles become the camera attitude
///
/// Depends on how the sensor is mounted relative to the display. The default
/// matches a sensor whose z axis points out of the back of the screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EulerMapping {
    pub pitch: AxisMapping,
    pub yaw: AxisMapping,
    pub roll: AxisMapping,
    /// Magnetic declination in degrees, added to yaw
    pub declination_degrees: f64,
}

impl Default for EulerMapping {
    fn default() -> Self {
        Self {
            pitch: AxisMapping::new(EulerAxis::Roll, -1.0, 90.0),
            yaw: AxisMapping::new(EulerAxis::Yaw, 1.0, 90.0),
            roll: AxisMapping::new(EulerAxis::Pitch, -1.0, 0.0),
            declination_degrees: 0.0,
        }
    }
}

impl EulerMapping {
    /// Map engine (roll, pitch, yaw) radians to a camera orientation
    pub fn apply(&self, (roll, pitch, yaw): (f32, f32, f32)) -> Orientation {
        let (roll, pitch, yaw) = (roll as f64, pitch as f64, yaw as f64);
        Orientation::new(
            self.pitch.apply(roll, pitch, yaw),
            self.yaw.apply(roll, pitch, yaw) + self.declination_degrees.to_radians(),
            self.roll.apply(roll, pitch, yaw),
        )
    }
}

/// Fusion driver configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionSettings {
    pub imu: ImuConfig,
    pub ahrs: AhrsSettings,
    pub offset: OffsetSettings,
    pub mapping: EulerMapping,
    /// Applied to every magnetometer reading before fusion
    pub calibration: Option<MagneticCalibration>,
    /// Fuse without heading reference when false
    pub use_magnetometer: bool,
}

impl Default for FusionSettings {
    fn default() -> Self {
        let imu = ImuConfig::default();
        Self {
            imu,
            ahrs: AhrsSettings::for_sample_rate(imu.sample_rate),
            offset: OffsetSettings::default(),
            mapping: EulerMapping::default(),
            calibration: None,
            use_magnetometer: true,
        }
    }
}

/// One fusion tick: read, correct, fuse, map
#[derive(Debug, Clone)]
pub struct FusionLoop<E = Ahrs> {
    engine: E,
    offset: Offset,
    mapping: EulerMapping,
    calibration: Option<MagneticCalibration>,
    use_magnetometer: bool,
}

impl FusionLoop<Ahrs> {
    pub fn new(settings: &FusionSettings) -> Self {
        Self::with_engine(Ahrs::with_settings(settings.ahrs), settings)
    }
}

impl<E: FusionEngine> FusionLoop<E> {
    pub fn with_engine(engine: E, settings: &FusionSettings) -> Self {
        Self {
            engine,
            offset: Offset::new(settings.offset, settings.imu.sample_rate),
            mapping: settings.mapping,
            calibration: settings.calibration,
            use_magnetometer: settings.use_magnetometer,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn offset(&self) -> &Offset {
        &self.offset
    }

    /// Run one tick against `bus`, `delta_time` seconds after the previous one
    ///
    /// A read failure leaves the engine untouched.
    pub fn step<B: SensorBus + ?Sized>(
        &mut self,
        bus: &mut B,
        delta_time: f32,
    ) -> Result<Orientation, SensorError> {
        let magnetometer = if self.use_magnetometer {
            Some(bus.read_magnetometer()?)
        } else {
            None
        };
        let inertial = bus.read_accel_gyro()?;

        let gyroscope = self.offset.update(inertial.gyroscope);

        match magnetometer {
            Some(raw) => {
                let magnetometer = self.correct_magnetometer(raw);
                self.engine
                    .update(gyroscope, inertial.accelerometer, magnetometer, delta_time);
            }
            None => {
                self.engine
                    .update_no_magnetometer(gyroscope, inertial.accelerometer, delta_time);
            }
        }

        Ok(self.mapping.apply(self.engine.euler_angles()))
    }

    fn correct_magnetometer(&self, raw: Vector3<f32>) -> Vector3<f32> {
        match &self.calibration {
            Some(calibration) => calibration.apply(raw),
            None => raw,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    status: DriverStatus,
    orientation: Snapshot<Orientation>,
}

/// Handle to the background fusion thread
///
/// The thread runs until the process exits.
#[derive(Debug, Clone)]
pub struct OrientationDriver {
    shared: Arc<Shared>,
}

impl OrientationDriver {
    /// Spawn the driver thread
    ///
    /// `open` runs on the new thread and yields the sensor bus; it and the
    /// following `configure` are the only fallible steps that end the driver.
    pub fn start<B, F>(settings: FusionSettings, open: F) -> Self
    where
        B: SensorBus + 'static,
        F: FnOnce() -> Result<B, SensorError> + Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        let worker = Arc::clone(&shared);

        let spawned = thread::Builder::new()
            .name("orientation".into())
            .spawn(move || run(&worker, settings, open));

        if let Err(cause) = spawned {
            error!(%cause, "failed to spawn orientation thread");
            shared.status.mark_failed(DriverError::Spawn("orientation"));
        }

        Self { shared }
    }

    pub fn state(&self) -> DriverState {
        self.shared.status.state()
    }

    pub fn is_running(&self) -> bool {
        self.shared.status.is_running()
    }

    /// Latest published orientation; `None` until the first tick completes
    pub fn orientation(&self) -> Option<Orientation> {
        self.shared.orientation.latest()
    }

    /// Why the driver failed, if it did
    pub fn failure(&self) -> Option<&DriverError> {
        self.shared.status.failure()
    }
}

fn run<B, F>(shared: &Shared, settings: FusionSettings, open: F)
where
    B: SensorBus,
    F: FnOnce() -> Result<B, SensorError>,
{
    let _span = info_span!("orientation").entered();

    let mut bus = match open().and_then(|mut bus| bus.configure(&settings.imu).map(|()| bus)) {
        Ok(bus) => bus,
        Err(cause) => {
            error!(%cause, "IMU initialisation failed, orientation unavailable");
            shared.status.mark_failed(cause.into());
            return;
        }
    };

    let mut fusion = FusionLoop::new(&settings);
    let period = Duration::try_from_secs_f32(1.0 / settings.imu.sample_rate).unwrap_or(Duration::ZERO);

    shared.status.mark_running();
    info!(rate = settings.imu.sample_rate, "orientation driver running");

    let mut last_tick = Instant::now();
    loop {
        let tick = Instant::now();
        let delta_time = tick.duration_since(last_tick).as_secs_f32();
        last_tick = tick;

        match fusion.step(&mut bus, delta_time) {
            Ok(orientation) => shared.orientation.publish(orientation),
            Err(cause) => warn!(%cause, "skipping fusion tick"),
        }

        if let Some(remaining) = period.checked_sub(tick.elapsed()) {
            thread::sleep(remaining);
        }
    }
}
