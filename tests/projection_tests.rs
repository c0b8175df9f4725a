use rand::prelude::*;
use rand_pcg::Pcg64;
use sky_hud::{Camera, PHYSICAL_FOV_DEGREES, ScreenGeometry, SkyDirection, SkyGrid, wrap_pi};

fn screen() -> ScreenGeometry {
    ScreenGeometry::new(640, 480)
}

/// Directions a few degrees off the boresight survive project/inverse_project
#[test]
fn test_round_trip_near_boresight() {
    let mut rng = Pcg64::seed_from_u64(17);

    for _ in 0..200 {
        let boresight = SkyDirection::from_degrees(
            rng.random_range(-60.0..60.0),
            rng.random_range(0.0..360.0),
        );
        let camera = Camera::looking_at(boresight, PHYSICAL_FOV_DEGREES.to_radians(), screen());

        let target = SkyDirection::from_degrees(
            boresight.altitude_degrees() + rng.random_range(-0.5..0.5),
            boresight.azimuth_degrees() + rng.random_range(-0.5..0.5),
        );

        let point = camera.project(&target).expect("target is in front of the camera");
        let recovered = camera.inverse_project(point);

        assert!(
            recovered.separation(&target) < 1e-3,
            "boresight {boresight:?} target {target:?} recovered {recovered:?}"
        );
    }
}

/// Anything more than 90° from the boresight has no screen position
#[test]
fn test_directions_behind_camera_are_absent() {
    let mut rng = Pcg64::seed_from_u64(3);

    for _ in 0..200 {
        let boresight = SkyDirection::from_degrees(
            rng.random_range(-80.0..80.0),
            rng.random_range(0.0..360.0),
        );
        let camera = Camera::looking_at(boresight, 1.0, screen());
        let target = SkyDirection::from_degrees(
            rng.random_range(-90.0..90.0),
            rng.random_range(0.0..360.0),
        );

        let separation = boresight.separation(&target).to_degrees();
        if separation > 90.5 {
            assert!(camera.project(&target).is_none(), "{separation}° off axis");
        } else if separation < 89.5 {
            assert!(camera.project(&target).is_some(), "{separation}° off axis");
        }
    }
}

/// Angular sizes scale linearly and inversely with the field of view
#[test]
fn test_project_angle_is_linear() {
    let camera = Camera::new(0.0, 0.0, 0.0, 0.4, screen());
    let one = camera.project_angle(0.01);

    assert!((camera.project_angle(0.03) - 3.0 * one).abs() < 1e-9);
    assert!(camera.project_angle(0.0).abs() < 1e-12);

    let narrower = camera.with_fov(0.2);
    assert!((narrower.project_angle(0.01) - 2.0 * one).abs() < 1e-9);
}

/// Roll spins the picture about the screen centre
#[test]
fn test_roll_rotates_about_center() {
    let level = Camera::new(0.0, 0.0, 0.0, 0.5, screen());
    let rolled = Camera::new(0.0, 0.0, core::f64::consts::FRAC_PI_2, 0.5, screen());
    let target = SkyDirection::from_degrees(0.0, 5.0);

    let a = level.project(&target).unwrap();
    assert!(a.x - 320.0 > 1.0);
    assert!((a.y - 240.0).abs() < 1e-9);

    // A quarter turn moves the point from beside the centre to below it
    let b = rolled.project(&target).unwrap();
    assert!((b.x - 320.0).abs() < 1e-9);
    assert!(b.y - 240.0 > 1.0);
}

/// Rebuilding with new yaw is equivalent to rotating the sky the other way
#[test]
fn test_yaw_shifts_azimuth() {
    let camera = Camera::new(0.0, -30f64.to_radians(), 0.0, 1.0, screen());
    let point = camera.project(&SkyDirection::on_horizon(30.0)).unwrap();

    assert!((point.x - 320.0).abs() < 1e-9);
    assert!((point.y - 240.0).abs() < 1e-9);
    assert!(wrap_pi(camera.yaw() + 30f64.to_radians()).abs() < 1e-12);
}

/// Every grid polyline segment joins two visible vertices
#[test]
fn test_grid_lines_never_cross_hidden_vertices() {
    let grid = SkyGrid::default();
    let camera = Camera::looking_at(SkyDirection::from_degrees(20.0, 45.0), 2.0, screen());
    let frame = grid.project(&camera);

    let visible: Vec<_> = camera
        .project_many(grid.vertices())
        .into_iter()
        .filter(|p| p.visible)
        .map(|p| p.point)
        .collect();

    for line in &frame.lines {
        for point in line {
            assert!(visible.contains(point));
        }
    }
}
