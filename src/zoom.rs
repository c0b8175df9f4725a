//! Zoom button gestures and field-of-view control
//!
//! Each [`ZoomButton`] turns raw down/up transitions into single presses,
//! double presses and a held "zooming" state. Presses are returned to the
//! caller rather than dispatched through callbacks. [`FieldOfView`] applies
//! them to the camera's horizontal field of view.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::camera::PHYSICAL_FOV_DEGREES;

/// Gesture timing and zoom behaviour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomSettings {
    /// Presses held longer than this become continuous zoom
    pub long_press_ms: u64,
    /// Two short presses released within this window form a double press
    pub double_press_ms: u64,
    /// Continuous zoom speed, e-folds of field of view per second
    pub continuous_rate: f64,
    /// Field-of-view factor applied by a single press
    pub step_factor: f64,
    pub min_fov_degrees: f64,
    pub max_fov_degrees: f64,
}

impl Default for ZoomSettings {
    fn default() -> Self {
        Self {
            long_press_ms: 200,
            double_press_ms: 1000,
            continuous_rate: 1.0,
            step_factor: 2.0,
            min_fov_degrees: 1.0,
            max_fov_degrees: 120.0,
        }
    }
}

/// Completed short press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Press {
    Single,
    Double,
}

/// Press/double-press/long-press recogniser for one button
///
/// Fed from two sources: discrete key events through [`ZoomButton::down`] and
/// [`ZoomButton::up`], and a polled physical switch through
/// [`ZoomButton::poll`], which only reacts to edges of the switch itself.
#[derive(Debug, Clone)]
pub struct ZoomButton {
    long_press: Duration,
    double_press: Duration,
    pressed_at: Option<Instant>,
    long_pressed: bool,
    last_short_release: Option<Instant>,
    pending_double: bool,
    physical_pressed: bool,
}

impl ZoomButton {
    pub fn new(settings: &ZoomSettings) -> Self {
        Self {
            long_press: Duration::from_millis(settings.long_press_ms),
            double_press: Duration::from_millis(settings.double_press_ms),
            pressed_at: None,
            long_pressed: false,
            last_short_release: None,
            pending_double: false,
            physical_pressed: false,
        }
    }

    pub fn down(&mut self) {
        self.down_at(Instant::now());
    }

    pub fn up(&mut self) -> Option<Press> {
        self.up_at(Instant::now())
    }

    pub fn update(&mut self) {
        self.update_at(Instant::now());
    }

    pub fn poll(&mut self, pressed: bool) -> Option<Press> {
        self.poll_at(pressed, Instant::now())
    }

    pub fn down_at(&mut self, now: Instant) {
        self.pressed_at = Some(now);
        self.long_pressed = false;

        let within_window = self
            .last_short_release
            .is_some_and(|released| now.saturating_duration_since(released) < self.double_press);

        if within_window {
            self.pending_double = true;
            self.last_short_release = None;
        } else {
            self.pending_double = false;
        }
    }

    /// Release; returns the press it completed, if it was short
    pub fn up_at(&mut self, now: Instant) -> Option<Press> {
        let pressed_at = self.pressed_at.take()?;
        self.long_pressed = false;

        if now.saturating_duration_since(pressed_at) >= self.long_press {
            return None;
        }

        if self.pending_double {
            self.pending_double = false;
            Some(Press::Double)
        } else {
            self.last_short_release = Some(now);
            Some(Press::Single)
        }
    }

    /// Refresh the held state; call once per frame
    pub fn update_at(&mut self, now: Instant) {
        self.long_pressed = self
            .pressed_at
            .is_some_and(|pressed_at| now.saturating_duration_since(pressed_at) > self.long_press);
    }

    /// Feed the physical switch level; synthesises down/up on its edges only
    pub fn poll_at(&mut self, pressed: bool, now: Instant) -> Option<Press> {
        let was_pressed = core::mem::replace(&mut self.physical_pressed, pressed);
        match (was_pressed, pressed) {
            (false, true) => {
                self.down_at(now);
                None
            }
            (true, false) => self.up_at(now),
            _ => None,
        }
    }

    /// True while the button is held past the long-press threshold
    pub fn is_zooming(&self) -> bool {
        self.long_pressed
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed_at.is_some()
    }
}

/// Which way a button zooms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    /// Narrower field of view
    In,
    /// Wider field of view
    Out,
}

impl ZoomDirection {
    fn sign(self) -> f64 {
        match self {
            ZoomDirection::In => -1.0,
            ZoomDirection::Out => 1.0,
        }
    }
}

/// Horizontal field of view, clamped to the configured range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldOfView {
    radians: f64,
    min: f64,
    max: f64,
    physical: f64,
    continuous_rate: f64,
    step_factor: f64,
}

impl FieldOfView {
    /// Start at the physical field of view of the optics
    pub fn new(settings: &ZoomSettings) -> Self {
        let min = settings.min_fov_degrees.to_radians();
        let max = settings.max_fov_degrees.to_radians().max(min);
        let physical = PHYSICAL_FOV_DEGREES.to_radians().clamp(min, max);

        Self {
            radians: physical,
            min,
            max,
            physical,
            continuous_rate: settings.continuous_rate,
            step_factor: settings.step_factor.max(1.0),
        }
    }

    pub fn radians(&self) -> f64 {
        self.radians
    }

    pub fn degrees(&self) -> f64 {
        self.radians.to_degrees()
    }

    /// Back to the physical field of view
    pub fn reset(&mut self) {
        self.radians = self.physical;
    }

    /// One discrete zoom step
    pub fn step(&mut self, direction: ZoomDirection) {
        let factor = self.step_factor.powf(direction.sign());
        self.set(self.radians * factor);
    }

    /// Continuous zoom for `elapsed` seconds of holding
    pub fn hold(&mut self, direction: ZoomDirection, elapsed: f64) {
        let factor = (direction.sign() * self.continuous_rate * elapsed).exp();
        self.set(self.radians * factor);
    }

    /// Apply a completed press
    pub fn apply(&mut self, press: Press, direction: ZoomDirection) {
        match press {
            Press::Single => self.step(direction),
            Press::Double => self.reset(),
        }
    }

    fn set(&mut self, radians: f64) {
        self.radians = radians.clamp(self.min, self.max);
    }
}
