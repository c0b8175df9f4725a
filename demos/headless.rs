//! Headless display run
//!
//! Drives the full render loop into a recording surface with a simulated,
//! slowly turning IMU and either a real GPS on a serial port or the fallback
//! location, then lists what ended up on screen.
//!
//! Run with: `cargo run --example headless -- --frames 300 --serial /dev/ttyUSB0`

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use nalgebra::Vector3;
use sky_hud::render::RecordingSurface;
use sky_hud::sensor::mock::MockSensorBus;
use sky_hud::sky::{StellarEphemeris, parse_hipparcos};
use sky_hud::{
    FramePacer, HudConfig, InputEvent, LocationDriver, OrientationDriver, SkyHud, StarRecord,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "headless")]
#[command(about = "Run the sky display without a screen")]
struct Cli {
    /// Display configuration (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// GPS serial port; the configured fallback location is used without one
    #[arg(short, long)]
    serial: Option<String>,

    /// Hipparcos `hip2.dat`; a handful of bright stars is used without one
    #[arg(long)]
    hipparcos: Option<PathBuf>,

    /// Frames to render
    #[arg(short, long, default_value_t = 120)]
    frames: usize,

    /// Pan by dragging instead of simulating an IMU
    #[arg(long)]
    no_imu: bool,
}

/// (HIP, RA degrees, Dec degrees, magnitude)
const BRIGHT_STARS: [(u32, f64, f64, f64); 6] = [
    (32349, 101.287, -16.716, -1.46),
    (69673, 213.915, 19.182, -0.05),
    (91262, 279.235, 38.784, 0.03),
    (27989, 88.793, 7.407, 0.42),
    (11767, 37.955, 89.264, 1.97),
    (78322, 239.876, 26.878, 4.08),
];

fn load_stars(path: Option<&PathBuf>) -> anyhow::Result<Vec<StarRecord>> {
    if let Some(path) = path {
        let stars = parse_hipparcos(&fs::read_to_string(path)?);
        info!(count = stars.len(), path = %path.display(), "loaded star catalog");
        return Ok(stars);
    }

    Ok(BRIGHT_STARS
        .iter()
        .map(|&(hip, ra, dec, magnitude)| StarRecord {
            hip,
            ra: Some(ra.to_radians()),
            dec: Some(dec.to_radians()),
            magnitude,
        })
        .collect())
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

    let stars = load_stars(cli.hipparcos.as_ref())?;
    let mut hud = SkyHud::new(&config, StellarEphemeris, &stars);

    if !cli.no_imu {
        // Device held level, turning at 6 degrees per second
        let bus = MockSensorBus::level().with_gyroscope(Vector3::new(0.0, 0.0, 6.0));
        hud = hud.with_orientation(OrientationDriver::start(config.fusion, move || Ok(bus)));
    }

    if let Some(port) = cli.serial {
        config.location.port = port;
        hud = hud.with_location(LocationDriver::from_serial(config.location.clone()));
    } else {
        warn!("no GPS port given, sky computed for the fallback location");
    }

    let mut surface = RecordingSurface::new(config.display.screen);
    let mut pacer = FramePacer::new(config.display.target_fps);
    let drag = [InputEvent::Drag { dx: 4.0, dy: 0.0 }];

    for _ in 0..cli.frames {
        let events: &[InputEvent] = if hud.imu_running() { &[] } else { &drag };
        if !hud.frame(&mut surface, events)? {
            break;
        }
        pacer.pace();
    }

    let camera = hud.camera().orientation();
    println!(
        "{} frames, camera pitch {:.1}° yaw {:.1}° roll {:.1}°, field of view {:.1}°",
        surface.frames(),
        camera.pitch.to_degrees(),
        camera.yaw.to_degrees(),
        camera.roll.to_degrees(),
        hud.field_of_view().degrees(),
    );

    if let Some(catalog) = hud.catalog() {
        let location = catalog.observer().location;
        println!(
            "observer at {:.4}, {:.4}",
            location.latitude, location.longitude
        );
        for (entry, point) in catalog.visible(hud.camera()) {
            println!(
                "  {:<10} alt {:6.1}° az {:6.1}°  at ({:.0}, {:.0})",
                entry.label.unwrap_or("star"),
                entry.direction.altitude_degrees(),
                entry.direction.azimuth_degrees(),
                point.x,
                point.y
            );
        }
    }

    for text in surface.texts() {
        println!("  text: {text}");
    }

    Ok(())
}
