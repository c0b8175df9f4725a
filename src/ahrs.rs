//! Complementary-filter AHRS engine
//!
//! Fuses gyroscope, accelerometer and magnetometer samples into an orientation
//! quaternion. The accelerometer and magnetometer each pull the integrated
//! gyroscope estimate towards their reference direction unless their error
//! exceeds a rejection threshold. The orientation driver only talks to it
//! through [`FusionEngine`].

use nalgebra::{Quaternion, UnitQuaternion, Vector3};

use crate::math::{DEG_TO_RAD, Vector3Ext};
use crate::types::{AhrsFlags, AhrsInternalStates, AhrsSettings, Convention};

const INITIAL_GAIN: f32 = 10.0;
const INITIALISATION_PERIOD: f32 = 3.0; // seconds
const GYROSCOPE_RANGE_FACTOR: f32 = 0.98;
const RECOVERY_DECREMENT: i32 = 9;

/// Orientation estimator driven once per sensor tick
pub trait FusionEngine {
    /// Fuse one sample set
    ///
    /// Gyroscope in degrees per second, accelerometer in g, magnetometer in µT
    /// (any consistent unit; only its direction is used), `delta_time` in
    /// seconds.
    fn update(
        &mut self,
        gyroscope: Vector3<f32>,
        accelerometer: Vector3<f32>,
        magnetometer: Vector3<f32>,
        delta_time: f32,
    );

    /// Fuse a sample set without heading reference
    fn update_no_magnetometer(
        &mut self,
        gyroscope: Vector3<f32>,
        accelerometer: Vector3<f32>,
        delta_time: f32,
    );

    fn quaternion(&self) -> UnitQuaternion<f32>;

    /// Current attitude as (roll, pitch, yaw) in radians
    fn euler_angles(&self) -> (f32, f32, f32) {
        self.quaternion().euler_angles()
    }
}

/// Accept/reject bookkeeping for one reference sensor
///
/// A reading whose error exceeds the threshold is ignored, unless readings
/// have been rejected for longer than the recovery period, in which case they
/// are accepted again until the error settles.
#[derive(Debug, Clone, Copy)]
struct RejectionGate {
    threshold_squared: f32,
    period: i32,
    timeout: i32,
    trigger: i32,
    ignored: bool,
    half_feedback: Vector3<f32>,
}

impl RejectionGate {
    fn new(rejection_degrees: f32, period: u32) -> Self {
        let threshold_squared = if rejection_degrees > 0.0 && period > 0 {
            (0.5 * (rejection_degrees * DEG_TO_RAD).sin()).powi(2)
        } else {
            f32::MAX
        };
        let period = i32::try_from(period).unwrap_or(i32::MAX);

        Self {
            threshold_squared,
            period,
            timeout: period,
            trigger: 0,
            ignored: false,
            half_feedback: Vector3::zeros(),
        }
    }

    fn reset(&mut self) {
        self.timeout = self.period;
        self.trigger = 0;
        self.ignored = false;
        self.half_feedback = Vector3::zeros();
    }

    /// Feedback contributed by `measured` against `half_reference` this tick
    fn evaluate(
        &mut self,
        measured: Vector3<f32>,
        half_reference: Vector3<f32>,
        initialising: bool,
    ) -> Vector3<f32> {
        self.ignored = true;
        self.half_feedback = Vector3::zeros();

        let direction = measured.safe_normalize();
        if direction == Vector3::zeros() {
            return self.half_feedback;
        }

        self.half_feedback = feedback(direction, half_reference);

        if initialising || self.half_feedback.norm_squared() <= self.threshold_squared {
            self.ignored = false;
            self.trigger -= RECOVERY_DECREMENT;
        } else {
            self.trigger += 1;
        }

        if self.trigger > self.timeout {
            self.timeout = 0;
            self.ignored = false;
        } else {
            self.timeout = self.period;
        }
        self.trigger = self.trigger.clamp(0, self.period);

        if self.ignored {
            Vector3::zeros()
        } else {
            self.half_feedback
        }
    }

    fn recovering(&self) -> bool {
        self.trigger > self.timeout
    }

    fn error_degrees(&self) -> f32 {
        (self.half_feedback.norm() * 2.0).min(1.0).asin().to_degrees()
    }

    fn normalized_trigger(&self) -> f32 {
        if self.period == 0 {
            0.0
        } else {
            self.trigger as f32 / self.period as f32
        }
    }
}

/// Complementary filter state
#[derive(Debug, Clone)]
pub struct Ahrs {
    settings: AhrsSettings,
    quaternion: UnitQuaternion<f32>,
    initialising: bool,
    ramped_gain: f32,
    ramped_gain_step: f32,
    angular_rate_recovery: bool,
    gyroscope_range_threshold: f32,
    accelerometer: RejectionGate,
    magnetometer: RejectionGate,
}

impl Ahrs {
    pub fn new() -> Self {
        Self::with_settings(AhrsSettings::default())
    }

    pub fn with_settings(settings: AhrsSettings) -> Self {
        let mut ahrs = Ahrs {
            settings,
            quaternion: UnitQuaternion::identity(),
            initialising: true,
            ramped_gain: INITIAL_GAIN,
            ramped_gain_step: 0.0,
            angular_rate_recovery: false,
            gyroscope_range_threshold: 0.0,
            accelerometer: RejectionGate::new(0.0, 0),
            magnetometer: RejectionGate::new(0.0, 0),
        };
        ahrs.set_settings(settings);
        ahrs.reset();
        ahrs
    }

    /// Back to identity attitude with the gain ramp restarted
    pub fn reset(&mut self) {
        self.quaternion = UnitQuaternion::identity();
        self.initialising = true;
        self.ramped_gain = INITIAL_GAIN;
        self.ramped_gain_step = 0.0;
        self.angular_rate_recovery = false;
        self.accelerometer.reset();
        self.magnetometer.reset();
    }

    pub fn set_settings(&mut self, settings: AhrsSettings) {
        self.settings = settings;
        self.gyroscope_range_threshold = if settings.gyroscope_range > 0.0 {
            settings.gyroscope_range * GYROSCOPE_RANGE_FACTOR
        } else {
            0.0
        };
        self.accelerometer = RejectionGate::new(
            settings.acceleration_rejection,
            settings.recovery_trigger_period,
        );
        self.magnetometer = RejectionGate::new(
            settings.magnetic_rejection,
            settings.recovery_trigger_period,
        );
    }

    pub fn settings(&self) -> AhrsSettings {
        self.settings
    }

    pub fn quaternion(&self) -> UnitQuaternion<f32> {
        self.quaternion
    }

    /// Gravity direction in the sensor frame (unit length)
    pub fn gravity(&self) -> Vector3<f32> {
        self.half_gravity() * 2.0
    }

    pub fn internal_states(&self) -> AhrsInternalStates {
        AhrsInternalStates {
            acceleration_error: self.accelerometer.error_degrees(),
            accelerometer_ignored: self.accelerometer.ignored,
            acceleration_recovery_trigger: self.accelerometer.normalized_trigger(),
            magnetic_error: self.magnetometer.error_degrees(),
            magnetometer_ignored: self.magnetometer.ignored,
            magnetic_recovery_trigger: self.magnetometer.normalized_trigger(),
        }
    }

    pub fn flags(&self) -> AhrsFlags {
        AhrsFlags {
            initialising: self.initialising,
            angular_rate_recovery: self.angular_rate_recovery,
            acceleration_recovery: self.accelerometer.recovering(),
            magnetic_recovery: self.magnetometer.recovering(),
        }
    }

    /// Ramp the gain down from `INITIAL_GAIN`, restarting on gyroscope overflow
    fn advance_gain(&mut self, gyroscope: &Vector3<f32>, delta_time: f32) {
        if self.ramped_gain_step == 0.0 && delta_time > 0.0 {
            self.ramped_gain_step =
                (INITIAL_GAIN - self.settings.gain) / INITIALISATION_PERIOD * delta_time;
        }

        if self.gyroscope_range_threshold > 0.0
            && gyroscope.norm() > self.gyroscope_range_threshold
        {
            self.angular_rate_recovery = true;
            self.initialising = true;
            self.ramped_gain = INITIAL_GAIN;
        }

        if self.initialising {
            if self.ramped_gain > self.settings.gain {
                self.ramped_gain = (self.ramped_gain - self.ramped_gain_step).max(self.settings.gain);
            } else {
                self.initialising = false;
                self.angular_rate_recovery = false;
            }
        }
    }

    /// Half gravity vector in the sensor frame for the current attitude
    fn half_gravity(&self) -> Vector3<f32> {
        let q = self.quaternion.as_ref();
        let (w, x, y, z) = (q.w, q.i, q.j, q.k);

        match self.settings.convention {
            Convention::Nwu | Convention::Enu => {
                Vector3::new(x * z - w * y, y * z + w * x, w * w - 0.5 + z * z)
            }
            Convention::Ned => {
                Vector3::new(w * y - x * z, -(y * z + w * x), 0.5 - w * w - z * z)
            }
        }
    }

    /// Half magnetic reference (horizontal, perpendicular to north) in the sensor frame
    fn half_magnetic(&self) -> Vector3<f32> {
        let q = self.quaternion.as_ref();
        let (w, x, y, z) = (q.w, q.i, q.j, q.k);

        match self.settings.convention {
            Convention::Nwu => Vector3::new(x * y + w * z, 0.5 - x * x - z * z, y * z - w * x),
            Convention::Enu => Vector3::new(
                -(0.5 - y * y - z * z),
                -(x * y - w * z),
                -(x * z + w * y),
            ),
            Convention::Ned => Vector3::new(
                -(x * y + w * z),
                -(0.5 - x * x - z * z),
                -(y * z - w * x),
            ),
        }
    }

    fn integrate(&mut self, half_gyroscope: Vector3<f32>, delta_time: f32) {
        let rate = Quaternion::from_parts(0.0, half_gyroscope);
        let derivative = self.quaternion.as_ref() * rate;
        let next = self.quaternion.as_ref() + derivative * delta_time;
        self.quaternion = UnitQuaternion::from_quaternion(next);
    }

    fn zero_heading(&mut self) {
        let (roll, pitch, _) = self.quaternion.euler_angles();
        self.quaternion = UnitQuaternion::from_euler_angles(roll, pitch, 0.0);
    }
}

impl FusionEngine for Ahrs {
    fn update(
        &mut self,
        gyroscope: Vector3<f32>,
        accelerometer: Vector3<f32>,
        magnetometer: Vector3<f32>,
        delta_time: f32,
    ) {
        self.advance_gain(&gyroscope, delta_time);

        let half_gravity = self.half_gravity();
        let half_accelerometer_feedback =
            self.accelerometer
                .evaluate(accelerometer, half_gravity, self.initialising);

        // Cross the magnetometer with gravity so only its horizontal component
        // steers heading.
        let half_magnetic = self.half_magnetic();
        let horizontal_magnetic = half_gravity.cross(&magnetometer);
        let half_magnetometer_feedback =
            self.magnetometer
                .evaluate(horizontal_magnetic, half_magnetic, self.initialising);

        let half_gyroscope = gyroscope * (DEG_TO_RAD * 0.5)
            + (half_accelerometer_feedback + half_magnetometer_feedback) * self.ramped_gain;

        self.integrate(half_gyroscope, delta_time);
    }

    fn update_no_magnetometer(
        &mut self,
        gyroscope: Vector3<f32>,
        accelerometer: Vector3<f32>,
        delta_time: f32,
    ) {
        self.update(gyroscope, accelerometer, Vector3::zeros(), delta_time);

        // Heading is unobservable without a magnetometer; hold it at zero until
        // the gain ramp settles so it does not wander during start-up.
        if self.initialising {
            self.zero_heading();
        }
    }

    fn quaternion(&self) -> UnitQuaternion<f32> {
        self.quaternion
    }
}

impl Default for Ahrs {
    fn default() -> Self {
        Self::new()
    }
}

/// Correction direction rotating `sensor` towards `reference`
fn feedback(sensor: Vector3<f32>, reference: Vector3<f32>) -> Vector3<f32> {
    let cross = sensor.cross(&reference);
    // More than 90° apart: full-strength correction
    if sensor.dot(&reference) < 0.0 {
        cross.safe_normalize()
    } else {
        cross
    }
}
