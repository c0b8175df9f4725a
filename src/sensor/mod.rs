//! IMU sensor bus seam
//!
//! The fusion driver and the calibration session talk to the inertial sensor
//! only through [`SensorBus`]. Hardware drivers live outside this crate;
//! [`mock::MockSensorBus`] stands in for them in tests and demos.

pub mod mock;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::SensorError;

/// Sample-rate and range configuration pushed to the sensor on start-up
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuConfig {
    /// Accelerometer and gyroscope output data rate in Hz
    pub sample_rate: f32,
    /// Accelerometer full-scale range in g
    pub accelerometer_full_scale: u16,
    /// Gyroscope full-scale range in degrees per second
    pub gyroscope_full_scale: u16,
    /// Hardware digital low-pass filter; off because fusion does the filtering
    pub low_pass: bool,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            sample_rate: 30.0,
            accelerometer_full_scale: 16,
            gyroscope_full_scale: 2000,
            low_pass: false,
        }
    }
}

/// One accelerometer + gyroscope read
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InertialSample {
    /// Acceleration in g
    pub accelerometer: Vector3<f32>,
    /// Angular rate in degrees per second
    pub gyroscope: Vector3<f32>,
}

/// A 9-axis IMU reachable over some bus
pub trait SensorBus: Send {
    /// Apply rates, ranges and filter settings
    fn configure(&mut self, config: &ImuConfig) -> Result<(), SensorError>;

    fn read_accel_gyro(&mut self) -> Result<InertialSample, SensorError>;

    /// Magnetic field in microtesla
    fn read_magnetometer(&mut self) -> Result<Vector3<f32>, SensorError>;
}

impl<B: SensorBus + ?Sized> SensorBus for Box<B> {
    fn configure(&mut self, config: &ImuConfig) -> Result<(), SensorError> {
        (**self).configure(config)
    }

    fn read_accel_gyro(&mut self) -> Result<InertialSample, SensorError> {
        (**self).read_accel_gyro()
    }

    fn read_magnetometer(&mut self) -> Result<Vector3<f32>, SensorError> {
        (**self).read_magnetometer()
    }
}
