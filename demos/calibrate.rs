//! Magnetometer calibration against a simulated distorted sensor
//!
//! Press Enter to start collecting and Enter again to finish, or pass
//! `--auto <samples>` to run unattended. The fitted calibration is stored in
//! the `fusion.calibration` section of the configuration.
//!
//! Run with: `cargo run --example calibrate -- --auto 800 --output hud.json`

use std::fs;
use std::path::PathBuf;
use std::sync::mpsc;

use clap::Parser;
use nalgebra::{Matrix3, Vector3};
use sky_hud::HudConfig;
use sky_hud::calibration::session::{CalibrationSession, KeyListener, Progress};
use sky_hud::sensor::mock::MockSensorBus;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "calibrate")]
#[command(about = "Fit hard- and soft-iron magnetometer calibration")]
struct Cli {
    /// Existing configuration to update
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where to write the updated configuration; printed when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Collect this many samples without waiting for Enter
    #[arg(long)]
    auto: Option<usize>,

    /// Simulated field strength in microtesla
    #[arg(long, default_value_t = 48.0)]
    strength: f32,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => HudConfig::from_json_file(path)?,
        None => HudConfig::default(),
    };

    let hard_iron = Vector3::new(-21.0, 14.5, 37.0);
    let soft_iron = Matrix3::new(
        1.08, 0.04, -0.02, //
        0.04, 0.93, 0.03, //
        -0.02, 0.03, 1.01,
    );
    let bus = MockSensorBus::level().with_distorted_sweep(cli.strength, hard_iron, soft_iron, 720);

    let mut settings = config.calibration;
    if let Some(target) = cli.auto {
        // Progress must be reported by the time the target is reached
        settings.preview_threshold = settings.preview_threshold.min(target);
    }
    let mut session = CalibrationSession::new(bus, settings);

    let calibration = match cli.auto {
        Some(target) => {
            let (sender, mut signal) = mpsc::channel();
            sender.send(())?;
            let mut sender = Some(sender);
            session.run(&mut signal, |progress| {
                report(progress);
                if progress.samples >= target {
                    // A dropped sender reads as "done"
                    sender.take();
                }
            })?
        }
        None => {
            let mut signal = KeyListener::spawn()?;
            println!("Press Enter to start collecting, then rotate the device through every orientation.");
            println!("Press Enter again when done.");
            session.run(&mut signal, report)?
        }
    };

    info!(
        x = calibration.hard_iron.x,
        y = calibration.hard_iron.y,
        z = calibration.hard_iron.z,
        "hard iron"
    );
    config.fusion.calibration = Some(calibration);

    let json = config.to_json_string()?;
    match &cli.output {
        Some(path) => {
            fs::write(path, &json)?;
            println!("Calibration written to {}", path.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}

fn report(progress: Progress) {
    if progress.samples % 50 == 0 {
        println!(
            "{:>6} samples  hard iron ({:8.3}, {:8.3}, {:8.3})",
            progress.samples, progress.hard_iron.x, progress.hard_iron.y, progress.hard_iron.z
        );
    }
}
