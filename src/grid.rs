//! Altitude/azimuth grid
//!
//! Grid vertices are computed once; each frame the whole set is projected in a
//! single batch and sliced into altitude circles and azimuth meridians.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::camera::{Camera, visible_runs};
use crate::types::{ScreenPoint, SkyDirection};

/// Grid spacing in whole degrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    pub altitude_step: u32,
    pub azimuth_step: u32,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            altitude_step: 15,
            azimuth_step: 15,
        }
    }
}

/// Compass labels placed on the horizon, keyed by azimuth in degrees
pub const COMPASS_LABELS: [(f64, &str); 8] = [
    (0.0, "North"),
    (45.0, "NE"),
    (90.0, "East"),
    (135.0, "SE"),
    (180.0, "South"),
    (225.0, "SW"),
    (270.0, "West"),
    (315.0, "NW"),
];

/// Precomputed grid vertices
///
/// Vertices are stored row-major: one row per altitude circle, one column per
/// meridian.
#[derive(Debug, Clone)]
pub struct SkyGrid {
    vertices: Vec<Vector3<f64>>,
    altitude_lines: usize,
    azimuth_lines: usize,
    labels: Vec<(SkyDirection, &'static str)>,
}

/// Visible parts of the grid for one camera
#[derive(Debug, Clone, Default)]
pub struct GridFrame {
    /// Polylines to draw, already split around hidden vertices
    pub lines: Vec<Vec<ScreenPoint>>,
    /// Compass labels in front of the camera
    pub labels: Vec<(ScreenPoint, &'static str)>,
}

impl SkyGrid {
    pub fn new(settings: GridSettings) -> Self {
        let altitude_step = settings.altitude_step.clamp(1, 90) as i32;
        let azimuth_step = settings.azimuth_step.clamp(1, 180) as i32;

        let altitudes: Vec<i32> = (-90 + altitude_step..90).step_by(altitude_step as usize).collect();
        let azimuths: Vec<i32> = (0..360).step_by(azimuth_step as usize).collect();

        let vertices = altitudes
            .iter()
            .flat_map(|&altitude| {
                azimuths.iter().map(move |&azimuth| {
                    SkyDirection::from_degrees(altitude as f64, azimuth as f64).to_unit_vector()
                })
            })
            .collect();

        let labels = COMPASS_LABELS
            .iter()
            .map(|&(azimuth, label)| (SkyDirection::on_horizon(azimuth), label))
            .collect();

        Self {
            vertices,
            altitude_lines: altitudes.len(),
            azimuth_lines: azimuths.len(),
            labels,
        }
    }

    /// Number of altitude circles
    pub fn altitude_lines(&self) -> usize {
        self.altitude_lines
    }

    /// Number of meridians
    pub fn azimuth_lines(&self) -> usize {
        self.azimuth_lines
    }

    pub fn vertices(&self) -> &[Vector3<f64>] {
        &self.vertices
    }

    /// Project the grid for `camera`
    pub fn project(&self, camera: &Camera) -> GridFrame {
        let projected = camera.project_many(&self.vertices);
        let mut lines = Vec::new();

        if self.azimuth_lines > 0 {
            for row in projected.chunks(self.azimuth_lines) {
                lines.extend(visible_runs(row, true));
            }
        }

        for column in 0..self.azimuth_lines {
            let meridian: Vec<_> = projected
                .iter()
                .skip(column)
                .step_by(self.azimuth_lines)
                .copied()
                .collect();
            lines.extend(visible_runs(&meridian, false));
        }

        let labels = self
            .labels
            .iter()
            .filter_map(|(direction, label)| camera.project(direction).map(|point| (point, *label)))
            .collect();

        GridFrame { lines, labels }
    }
}

impl Default for SkyGrid {
    fn default() -> Self {
        Self::new(GridSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::ScreenGeometry;

    #[test]
    fn test_default_grid_dimensions() {
        let grid = SkyGrid::default();
        // -75..=75 in 15° steps, 0..345 in 15° steps
        assert_eq!(grid.altitude_lines(), 11);
        assert_eq!(grid.azimuth_lines(), 24);
        assert_eq!(grid.vertices().len(), 11 * 24);
    }

    #[test]
    fn test_vertices_are_unit_length() {
        let grid = SkyGrid::new(GridSettings {
            altitude_step: 30,
            azimuth_step: 45,
        });
        assert!(grid.vertices().iter().all(|v| (v.norm() - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_wide_camera_sees_lines_and_labels() {
        let grid = SkyGrid::default();
        let camera = Camera::looking_at(
            SkyDirection::from_degrees(10.0, 0.0),
            120f64.to_radians(),
            ScreenGeometry::default(),
        );

        let frame = grid.project(&camera);
        assert!(!frame.lines.is_empty());
        assert!(frame.lines.iter().all(|line| line.len() >= 2));
        assert!(frame.labels.iter().any(|(_, label)| *label == "North"));
        assert!(!frame.labels.iter().any(|(_, label)| *label == "South"));
    }

    #[test]
    fn test_zenith_camera_sees_no_horizon_labels() {
        let grid = SkyGrid::default();
        let camera = Camera::looking_at(
            SkyDirection::zenith(),
            30f64.to_radians(),
            ScreenGeometry::default(),
        );

        // Horizon labels are exactly 90° off-axis: in front (z = 0) but far off screen
        let frame = grid.project(&camera);
        assert!(frame.labels.iter().all(|(point, _)| {
            point.x < 0.0 || point.x > 640.0 || point.y < 0.0 || point.y > 480.0
        }));
    }
}
