use chrono::{TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use nalgebra::{Matrix3, Vector3};
use rand::prelude::*;
use rand_pcg::Pcg64;
use sky_hud::calibration::ellipsoid;
use sky_hud::render::RecordingSurface;
use sky_hud::sensor::mock::fibonacci_direction;
use sky_hud::sky::StellarEphemeris;
use sky_hud::{
    Ahrs, Camera, FusionEngine, GeoLocation, Observer, SceneRenderer, ScreenGeometry, SkyCatalog,
    SkyDirection, SkyGrid, StarRecord,
};

// Pre-generated inputs keep RNG cost out of the measured loops
fn random_directions(count: usize, seed: u64) -> Vec<SkyDirection> {
    let mut rng = Pcg64::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            SkyDirection::from_degrees(rng.random_range(-90.0..90.0), rng.random_range(0.0..360.0))
        })
        .collect()
}

fn random_stars(count: usize, seed: u64) -> Vec<StarRecord> {
    let mut rng = Pcg64::seed_from_u64(seed);
    (0..count)
        .map(|index| StarRecord {
            hip: index as u32 + 1,
            ra: Some(rng.random_range(0.0..std::f64::consts::TAU)),
            dec: Some(rng.random_range(-1.5..1.5)),
            magnitude: rng.random_range(-1.0..6.0),
        })
        .collect()
}

fn camera() -> Camera {
    Camera::looking_at(
        SkyDirection::from_degrees(35.0, 120.0),
        60f64.to_radians(),
        ScreenGeometry::new(640, 480),
    )
}

/// Single direction projection, mixing visible and hidden targets
fn bench_project(c: &mut Criterion) {
    let camera = camera();
    let directions = random_directions(1024, 42);
    let mut index = 0;

    c.bench_function("camera_project", |b| {
        b.iter(|| {
            let direction = &directions[index];
            index = (index + 1) % directions.len();
            camera.project(black_box(direction))
        })
    });
}

/// Whole grid per frame
fn bench_grid(c: &mut Criterion) {
    let camera = camera();
    let grid = SkyGrid::default();

    c.bench_function("grid_project", |b| b.iter(|| grid.project(black_box(&camera))));
}

/// Full frame into a recording surface with a typical catalog
fn bench_scene(c: &mut Criterion) {
    let camera = camera();
    let renderer = SceneRenderer::default();
    let observer = Observer::new(
        GeoLocation::new(47.6, -122.3),
        Utc.with_ymd_and_hms(2024, 3, 20, 6, 0, 0).unwrap(),
    );
    let catalog = SkyCatalog::build(&StellarEphemeris, observer, &random_stars(100, 7));
    let mut surface = RecordingSurface::new(camera.screen());

    c.bench_function("scene_draw", |b| {
        b.iter(|| renderer.draw(&mut surface, black_box(&camera), &catalog, 60.0))
    });
}

/// One fusion update at 100 Hz
fn bench_ahrs_update(c: &mut Criterion) {
    let mut ahrs = Ahrs::new();
    let gyroscope = Vector3::new(0.1, -0.2, 0.05);
    let accelerometer = Vector3::new(0.01, -0.02, 1.0);
    let magnetometer = Vector3::new(25.0, 2.0, -15.0);

    c.bench_function("ahrs_update", |b| {
        b.iter(|| {
            ahrs.update(
                black_box(gyroscope),
                black_box(accelerometer),
                black_box(magnetometer),
                black_box(0.01),
            )
        })
    });
}

/// Ellipsoid fit cost grows with the number of collected samples
fn bench_ellipsoid_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("ellipsoid_fit");
    let hard_iron = Vector3::new(12.0, -7.0, 30.0);
    let soft_iron = Matrix3::new(1.1, 0.05, 0.0, 0.05, 0.95, 0.02, 0.0, 0.02, 1.0);

    for count in [100u32, 500, 2000] {
        let samples: Vec<Vector3<f32>> = (0..count)
            .map(|index| soft_iron * (fibonacci_direction(index, count) * 45.0) + hard_iron)
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(count), &samples, |b, samples| {
            b.iter(|| ellipsoid::fit(black_box(samples)))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_project,
    bench_grid,
    bench_scene,
    bench_ahrs_update,
    bench_ellipsoid_fit
);
criterion_main!(benches);
