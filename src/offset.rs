//! Gyroscope bias tracking
//!
//! Slowly estimates a gyroscope's zero-rate offset while the device is held
//! still and subtracts it from every sample.

use core::f32::consts::TAU;

use nalgebra::Vector3;

use crate::types::OffsetSettings;

/// Running gyroscope offset estimate
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use sky_hud::{Offset, OffsetSettings};
///
/// let mut offset = Offset::new(OffsetSettings::default(), 30.0);
/// let corrected = offset.update(Vector3::new(0.1, 0.2, 0.3));
/// assert_eq!(corrected, Vector3::new(0.1, 0.2, 0.3));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Offset {
    filter_coefficient: f32,
    threshold: f32,
    /// Stationary samples required before estimation starts
    timeout: u32,
    timer: u32,
    gyroscope_offset: Vector3<f32>,
}

impl Offset {
    pub fn new(settings: OffsetSettings, sample_rate: f32) -> Self {
        Self {
            filter_coefficient: TAU * settings.cutoff_frequency / sample_rate,
            threshold: settings.threshold,
            timeout: (settings.timeout * sample_rate) as u32,
            timer: 0,
            gyroscope_offset: Vector3::zeros(),
        }
    }

    /// Correct `gyroscope` by the current estimate and refine the estimate
    pub fn update(&mut self, gyroscope: Vector3<f32>) -> Vector3<f32> {
        let corrected = gyroscope - self.gyroscope_offset;

        if corrected.iter().any(|rate| rate.abs() > self.threshold) {
            self.timer = 0;
            return corrected;
        }

        if self.timer < self.timeout {
            self.timer += 1;
            return corrected;
        }

        self.gyroscope_offset += corrected * self.filter_coefficient;
        corrected
    }

    pub fn offset(&self) -> Vector3<f32> {
        self.gyroscope_offset
    }

    pub fn reset(&mut self) {
        self.timer = 0;
        self.gyroscope_offset = Vector3::zeros();
    }

    /// True once the device has been still long enough to track the offset
    pub fn is_active(&self) -> bool {
        self.timer >= self.timeout
    }

    pub fn timer(&self) -> u32 {
        self.timer
    }

    pub fn timeout(&self) -> u32 {
        self.timeout
    }

    pub fn filter_coefficient(&self) -> f32 {
        self.filter_coefficient
    }
}
