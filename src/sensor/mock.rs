//! Simulated IMU for tests and demos

use core::f32::consts::PI;

use nalgebra::{Matrix3, Vector3};

use crate::error::SensorError;
use crate::sensor::{ImuConfig, InertialSample, SensorBus};

/// Where magnetometer readings come from
#[derive(Debug, Clone, Copy)]
enum MagneticField {
    /// Same reading every time
    Fixed(Vector3<f32>),
    /// True field swept over a sphere of directions, then distorted
    Sweep {
        strength: f32,
        hard_iron: Vector3<f32>,
        soft_iron: Matrix3<f32>,
        points: u32,
    },
}

/// Programmable stand-in for a 9-axis IMU
///
/// Returns fixed inertial readings, either a fixed or a swept magnetic field,
/// and can be told to fail configuration or a number of reads.
#[derive(Debug, Clone)]
pub struct MockSensorBus {
    accelerometer: Vector3<f32>,
    gyroscope: Vector3<f32>,
    magnetic: MagneticField,
    configure_error: Option<SensorError>,
    failing_reads: u32,
    config: Option<ImuConfig>,
    reads: u32,
}

impl MockSensorBus {
    /// Device lying flat and still, x axis towards magnetic north
    pub fn level() -> Self {
        Self {
            accelerometer: Vector3::new(0.0, 0.0, 1.0),
            gyroscope: Vector3::zeros(),
            magnetic: MagneticField::Fixed(Vector3::new(20.0, 0.0, -40.0)),
            configure_error: None,
            failing_reads: 0,
            config: None,
            reads: 0,
        }
    }

    pub fn with_accelerometer(mut self, accelerometer: Vector3<f32>) -> Self {
        self.accelerometer = accelerometer;
        self
    }

    pub fn with_gyroscope(mut self, gyroscope: Vector3<f32>) -> Self {
        self.gyroscope = gyroscope;
        self
    }

    pub fn with_magnetometer(mut self, magnetometer: Vector3<f32>) -> Self {
        self.magnetic = MagneticField::Fixed(magnetometer);
        self
    }

    /// Sweep a field of `strength` µT over `points` directions per revolution,
    /// reporting `soft_iron · field + hard_iron`
    pub fn with_distorted_sweep(
        mut self,
        strength: f32,
        hard_iron: Vector3<f32>,
        soft_iron: Matrix3<f32>,
        points: u32,
    ) -> Self {
        self.magnetic = MagneticField::Sweep {
            strength,
            hard_iron,
            soft_iron,
            points: points.max(1),
        };
        self
    }

    /// Make `configure` fail with `error`
    pub fn failing_configure(mut self, error: SensorError) -> Self {
        self.configure_error = Some(error);
        self
    }

    /// Fail the next `count` inertial reads
    pub fn failing_reads(mut self, count: u32) -> Self {
        self.failing_reads = count;
        self
    }

    /// Configuration last applied, if any
    pub fn config(&self) -> Option<ImuConfig> {
        self.config
    }

    /// Successful magnetometer reads so far
    pub fn reads(&self) -> u32 {
        self.reads
    }
}

impl SensorBus for MockSensorBus {
    fn configure(&mut self, config: &ImuConfig) -> Result<(), SensorError> {
        if let Some(error) = &self.configure_error {
            return Err(error.clone());
        }
        self.config = Some(*config);
        Ok(())
    }

    fn read_accel_gyro(&mut self) -> Result<InertialSample, SensorError> {
        if self.failing_reads > 0 {
            self.failing_reads -= 1;
            return Err(SensorError::Read("simulated bus timeout".into()));
        }

        Ok(InertialSample {
            accelerometer: self.accelerometer,
            gyroscope: self.gyroscope,
        })
    }

    fn read_magnetometer(&mut self) -> Result<Vector3<f32>, SensorError> {
        let reading = match self.magnetic {
            MagneticField::Fixed(field) => field,
            MagneticField::Sweep {
                strength,
                hard_iron,
                soft_iron,
                points,
            } => {
                let direction = fibonacci_direction(self.reads % points, points);
                soft_iron * (direction * strength) + hard_iron
            }
        };
        self.reads = self.reads.wrapping_add(1);
        Ok(reading)
    }
}

/// The `index`-th of `count` roughly evenly spread unit directions
pub fn fibonacci_direction(index: u32, count: u32) -> Vector3<f32> {
    let golden_angle = PI * (3.0 - 5f32.sqrt());
    let y = 1.0 - 2.0 * (index as f32 + 0.5) / count as f32;
    let radius = (1.0 - y * y).max(0.0).sqrt();
    let theta = golden_angle * index as f32;
    Vector3::new(radius * theta.cos(), y, radius * theta.sin())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_is_recorded() {
        let mut bus = MockSensorBus::level();
        assert!(bus.config().is_none());

        bus.configure(&ImuConfig::default()).unwrap();
        assert_eq!(bus.config(), Some(ImuConfig::default()));
    }

    #[test]
    fn test_configure_failure() {
        let mut bus =
            MockSensorBus::level().failing_configure(SensorError::Configure("no ack".into()));
        assert_eq!(
            bus.configure(&ImuConfig::default()),
            Err(SensorError::Configure("no ack".into()))
        );
    }

    #[test]
    fn test_failing_reads_recover() {
        let mut bus = MockSensorBus::level().failing_reads(2);
        assert!(bus.read_accel_gyro().is_err());
        assert!(bus.read_accel_gyro().is_err());
        assert!(bus.read_accel_gyro().is_ok());
    }

    #[test]
    fn test_sweep_spans_the_sphere() {
        let mut bus = MockSensorBus::level().with_distorted_sweep(
            50.0,
            Vector3::zeros(),
            Matrix3::identity(),
            200,
        );

        let readings: Vec<_> = (0..200).map(|_| bus.read_magnetometer().unwrap()).collect();
        assert!(readings.iter().all(|r| (r.norm() - 50.0).abs() < 1e-3));
        assert!(readings.iter().any(|r| r.y > 45.0));
        assert!(readings.iter().any(|r| r.y < -45.0));
    }
}
