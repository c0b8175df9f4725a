//! Camera projection model
//!
//! Maps sky directions to screen pixels and back under a pinhole-like angular
//! model. The horizontal field of view controls the angle-to-pixel scale; the
//! vertical extent follows from the screen aspect ratio.

use core::f64::consts::PI;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::math::{pitch_matrix, roll_matrix, yaw_matrix};
use crate::types::{Orientation, ScreenPoint, SkyDirection};

/// Horizontal field of view of the display optics, degrees
pub const PHYSICAL_FOV_DEGREES: f64 = 17.58;

/// Pixel dimensions of the output surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenGeometry {
    pub width: u32,
    pub height: u32,
}

impl ScreenGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn half_width(&self) -> f64 {
        self.width as f64 / 2.0
    }

    pub fn half_height(&self) -> f64 {
        self.height as f64 / 2.0
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn center(&self) -> ScreenPoint {
        ScreenPoint::new(self.half_width(), self.half_height())
    }
}

impl Default for ScreenGeometry {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

/// Result of projecting one vertex in a batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedPoint {
    /// Screen position; meaningless when `visible` is false
    pub point: ScreenPoint,
    /// False when the vertex is behind the camera
    pub visible: bool,
}

/// Immutable camera: attitude, field of view and the derived rotations
///
/// Built once per frame in the worst case. The rotation is composed as
/// roll·pitch·yaw; the inverse is its transpose and both are derived together
/// on construction.
///
/// # Example
/// ```
/// use sky_hud::{Camera, ScreenGeometry, SkyDirection};
///
/// let screen = ScreenGeometry::default();
/// let target = SkyDirection::from_degrees(30.0, 120.0);
/// let camera = Camera::looking_at(target, 60f64.to_radians(), screen);
///
/// let point = camera.project(&target).unwrap();
/// assert!((point.x - 320.0).abs() < 1e-6);
/// assert!((point.y - 240.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pitch: f64,
    yaw: f64,
    roll: f64,
    fov: f64,
    screen: ScreenGeometry,
    rotation: Matrix3<f64>,
    inverse_rotation: Matrix3<f64>,
}

impl Camera {
    /// Build a camera from attitude angles and a horizontal field of view (radians)
    pub fn new(pitch: f64, yaw: f64, roll: f64, fov: f64, screen: ScreenGeometry) -> Self {
        debug_assert!(fov > 0.0, "field of view must be positive");

        let rotation = roll_matrix(roll) * pitch_matrix(pitch) * yaw_matrix(yaw);

        Self {
            pitch,
            yaw,
            roll,
            fov,
            screen,
            rotation,
            inverse_rotation: rotation.transpose(),
        }
    }

    pub fn from_orientation(orientation: Orientation, fov: f64, screen: ScreenGeometry) -> Self {
        Self::new(orientation.pitch, orientation.yaw, orientation.roll, fov, screen)
    }

    /// Level camera centred on `direction`
    pub fn looking_at(direction: SkyDirection, fov: f64, screen: ScreenGeometry) -> Self {
        Self::new(-direction.altitude(), -direction.azimuth(), 0.0, fov, screen)
    }

    /// Same attitude, different field of view
    pub fn with_fov(&self, fov: f64) -> Self {
        Self::new(self.pitch, self.yaw, self.roll, fov, self.screen)
    }

    /// Attitude offset by the given deltas, field of view unchanged
    pub fn rotated(&self, pitch_delta: f64, yaw_delta: f64) -> Self {
        Self::new(
            self.pitch + pitch_delta,
            self.yaw + yaw_delta,
            self.roll,
            self.fov,
            self.screen,
        )
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn yaw(&self) -> f64 {
        self.yaw
    }

    pub fn roll(&self) -> f64 {
        self.roll
    }

    pub fn fov(&self) -> f64 {
        self.fov
    }

    pub fn screen(&self) -> ScreenGeometry {
        self.screen
    }

    pub fn orientation(&self) -> Orientation {
        Orientation::new(self.pitch, self.yaw, self.roll)
    }

    /// World-to-camera rotation
    pub fn rotation(&self) -> &Matrix3<f64> {
        &self.rotation
    }

    /// Camera-to-world rotation
    pub fn inverse_rotation(&self) -> &Matrix3<f64> {
        &self.inverse_rotation
    }

    /// Project a sky direction to a screen point
    ///
    /// Returns `None` when the direction is behind the camera.
    pub fn project(&self, direction: &SkyDirection) -> Option<ScreenPoint> {
        self.project_vector(&direction.to_unit_vector())
    }

    /// Project a world-frame unit vector
    pub fn project_vector(&self, unit: &Vector3<f64>) -> Option<ScreenPoint> {
        let camera_space = self.rotation * unit;
        if camera_space.z < 0.0 {
            return None;
        }
        Some(self.to_screen(&camera_space))
    }

    /// Project many world-frame unit vectors at once
    ///
    /// Each vertex carries its own visibility flag so a polyline can be split
    /// around vertices behind the camera; see [`visible_runs`].
    pub fn project_many(&self, units: &[Vector3<f64>]) -> Vec<ProjectedPoint> {
        units
            .iter()
            .map(|unit| {
                let camera_space = self.rotation * unit;
                ProjectedPoint {
                    point: self.to_screen(&camera_space),
                    visible: camera_space.z >= 0.0,
                }
            })
            .collect()
    }

    /// Convert an angular size (radians) to a screen length in pixels
    ///
    /// `(degrees / 180) · (π / fov) · width`, linear in `angle`
    pub fn project_angle(&self, angle: f64) -> f64 {
        (angle.to_degrees() / 180.0) * (PI / self.fov) * self.screen.width as f64
    }

    /// Map a screen point back to the sky direction under it
    ///
    /// Intended for pointer queries; it inverts [`Camera::project`] to within
    /// a small error that grows towards the edges of a wide field of view.
    pub fn inverse_project(&self, point: ScreenPoint) -> SkyDirection {
        let half_width = self.screen.half_width();
        let half_height = self.screen.half_height();

        let scale = self.fov / PI;
        let x = (point.x - half_width) / half_width * scale;
        let y = (point.y - half_height) / (half_height * self.screen.aspect_ratio()) * scale;
        let z = (x.cos() * y.cos()).max(0.0);

        let world = (self.inverse_rotation * Vector3::new(x, y, z)).normalize();

        let altitude = (-world.y).clamp(-1.0, 1.0).asin();
        let azimuth = world.x.atan2(world.z);
        SkyDirection::new(altitude, azimuth)
    }

    fn to_screen(&self, camera_space: &Vector3<f64>) -> ScreenPoint {
        let scaled = camera_space * (PI / self.fov);
        let half_width = self.screen.half_width();
        let half_height = self.screen.half_height();

        ScreenPoint::new(
            scaled.x * half_width + half_width,
            scaled.y * half_height * self.screen.aspect_ratio() + half_height,
        )
    }
}

/// Split a projected polyline into runs of consecutive visible vertices
///
/// With `closed` set the last vertex connects back to the first, so a run
/// crossing the seam is joined into one. Runs shorter than two vertices are
/// dropped since there is nothing to draw.
pub fn visible_runs(points: &[ProjectedPoint], closed: bool) -> Vec<Vec<ScreenPoint>> {
    let mut runs: Vec<Vec<ScreenPoint>> = Vec::new();
    let mut current = Vec::new();

    for projected in points {
        if projected.visible {
            current.push(projected.point);
        } else if !current.is_empty() {
            runs.push(core::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }

    let seam_visible = points.first().is_some_and(|p| p.visible)
        && points.last().is_some_and(|p| p.visible);

    if closed && points.len() > 2 && seam_visible {
        if runs.len() == 1 {
            let first = runs[0][0];
            runs[0].push(first);
        } else {
            let head = runs.remove(0);
            if let Some(tail) = runs.last_mut() {
                tail.extend(head);
            }
        }
    }

    runs.retain(|run| run.len() >= 2);
    runs
}
