//! Error types

use std::io;

/// Failures talking to the IMU sensor bus
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SensorError {
    #[error("failed to open sensor bus: {0}")]
    Open(String),

    #[error("failed to configure sensor: {0}")]
    Configure(String),

    #[error("sensor read failed: {0}")]
    Read(String),
}

/// Why a background driver is not running
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriverError {
    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error("serial port unavailable: {0}")]
    Serial(String),

    #[error("failed to spawn {0} thread")]
    Spawn(&'static str),
}

/// Failures opening or reading the position stream
#[derive(Debug, thiserror::Error)]
pub enum LocationError {
    #[error("failed to open serial port {path}: {message}")]
    Open { path: String, message: String },

    #[error("serial read failed: {0}")]
    Io(#[from] io::Error),

    #[error("malformed NMEA sentence: {0}")]
    Parse(String),
}

/// Magnetometer calibration failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalibrationError {
    #[error("need at least {required} samples for an ellipsoid fit, got {actual}")]
    InsufficientSamples { required: usize, actual: usize },

    #[error("degenerate calibration: {reason}")]
    Degenerate { reason: &'static str },

    #[error(transparent)]
    Sensor(#[from] SensorError),
}

/// Configuration loading failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Output sink failures
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to write frame: {0}")]
    Io(#[from] io::Error),

    #[error("surface cannot expose a raw frame buffer")]
    NoFrameBuffer,
}
