//! Interactive magnetometer calibration
//!
//! The operator signals once to start collecting, waves the device through
//! every orientation, then signals again to finish. While collecting, the
//! hard-iron estimate is refitted on every sample past a threshold so the
//! operator can see it settle.

use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

use crate::calibration::{MagneticCalibration, ellipsoid};
use crate::error::CalibrationError;
use crate::sensor::SensorBus;

/// Operator "ready"/"done" input
pub trait OperatorSignal {
    /// True if the operator signalled since the previous call
    fn signalled(&mut self) -> bool;
}

impl OperatorSignal for Receiver<()> {
    fn signalled(&mut self) -> bool {
        // A vanished sender can never signal again; treat it as the signal so
        // the session cannot hang.
        !matches!(self.try_recv(), Err(TryRecvError::Empty))
    }
}

/// Signals once per line entered on stdin
///
/// The reader thread blocks on stdin for the life of the process.
#[derive(Debug)]
pub struct KeyListener {
    receiver: Receiver<()>,
}

impl KeyListener {
    pub fn spawn() -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel();

        thread::Builder::new()
            .name("key-listener".into())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    if line.is_err() || sender.send(()).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self { receiver })
    }
}

impl OperatorSignal for KeyListener {
    fn signalled(&mut self) -> bool {
        self.receiver.signalled()
    }
}

/// Session pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Delay between magnetometer reads
    pub poll_interval_ms: u64,
    /// Samples required before the live estimate is shown
    pub preview_threshold: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            preview_threshold: 500,
        }
    }
}

/// Live estimate reported while collecting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub samples: usize,
    pub hard_iron: Vector3<f64>,
}

/// One calibration run holding the sensor bus exclusively
pub struct CalibrationSession<B: SensorBus> {
    bus: B,
    settings: SessionSettings,
    samples: Vec<Vector3<f32>>,
}

impl<B: SensorBus> CalibrationSession<B> {
    pub fn new(bus: B, settings: SessionSettings) -> Self {
        Self {
            bus,
            settings,
            samples: Vec::new(),
        }
    }

    /// Samples collected so far
    pub fn samples(&self) -> &[Vector3<f32>] {
        &self.samples
    }

    /// Give the bus back
    pub fn into_bus(self) -> B {
        self.bus
    }

    /// Wait for "ready", collect until "done", then fit
    ///
    /// `progress` is called with the refitted hard-iron offset after every
    /// sample once `preview_threshold` samples are in. A sensor read failure
    /// ends the session.
    pub fn run<S, F>(
        &mut self,
        signal: &mut S,
        mut progress: F,
    ) -> Result<MagneticCalibration, CalibrationError>
    where
        S: OperatorSignal,
        F: FnMut(Progress),
    {
        let _span = info_span!("calibration").entered();
        let interval = Duration::from_millis(self.settings.poll_interval_ms);

        info!("waiting for operator to start collection");
        while !signal.signalled() {
            thread::sleep(interval);
        }

        info!("collecting magnetometer samples");
        self.samples.clear();
        while !signal.signalled() {
            let reading = self.bus.read_magnetometer()?;
            self.samples.push(reading);

            if self.samples.len() >= self.settings.preview_threshold {
                match ellipsoid::fit(&self.samples) {
                    Ok(fit) => {
                        info!(
                            samples = self.samples.len(),
                            x = fit.center.x,
                            y = fit.center.y,
                            z = fit.center.z,
                            "hard iron estimate"
                        );
                        progress(Progress {
                            samples: self.samples.len(),
                            hard_iron: fit.center,
                        });
                    }
                    Err(error) => debug!(%error, "no estimate yet"),
                }
            }

            thread::sleep(interval);
        }

        info!(samples = self.samples.len(), "collection finished");
        MagneticCalibration::from_samples(&self.samples)
    }
}
