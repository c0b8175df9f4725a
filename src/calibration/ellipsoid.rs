//! Least-squares ellipsoid fit
//!
//! Fits `Ax²+By²+Cz²+2Dxy+2Exz+2Fyz+2Gx+2Hy+2Iz+J = 0` to a point cloud. The
//! diagonal terms are tied together by `A+B+C = -3`, which leaves a 9-unknown
//! linear least-squares problem. The cost is O(n) in the number of samples;
//! every call refits from scratch.

use nalgebra::{DMatrix, DVector, Matrix3, Matrix4, SymmetricEigen, Vector3};

use crate::error::CalibrationError;

/// Fewest samples that determine all nine unknowns
pub const MIN_SAMPLES: usize = 9;

/// Smallest-to-largest singular value ratio accepted for the design matrix
const CONDITION_LIMIT: f64 = 1e-6;

/// Longest-to-shortest semi-axis ratio of a plausible soft-iron ellipsoid
const MAX_AXIS_RATIO: f64 = 10.0;

/// Fraction of each semi-axis the samples must reach along that axis
const MIN_AXIS_COVERAGE: f64 = 0.5;

/// Center, principal axes and semi-axis lengths of a fitted ellipsoid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EllipsoidFit {
    pub center: Vector3<f64>,
    /// Principal axes as columns
    pub eigenvectors: Matrix3<f64>,
    /// Semi-axis length along each column of `eigenvectors`
    pub radii: Vector3<f64>,
}

impl EllipsoidFit {
    /// `E · diag(r) · Eᵀ`
    pub fn soft_iron(&self) -> Matrix3<f64> {
        self.eigenvectors * Matrix3::from_diagonal(&self.radii) * self.eigenvectors.transpose()
    }
}

/// Fit an ellipsoid to magnetometer samples
///
/// Fails with [`CalibrationError::InsufficientSamples`] below [`MIN_SAMPLES`]
/// and with [`CalibrationError::Degenerate`] when the samples do not pin down
/// a unique ellipsoid: collinear, coplanar or nearly so, or covering too little
/// of the fitted shape to trust it.
pub fn fit(samples: &[Vector3<f32>]) -> Result<EllipsoidFit, CalibrationError> {
    if samples.len() < MIN_SAMPLES {
        return Err(CalibrationError::InsufficientSamples {
            required: MIN_SAMPLES,
            actual: samples.len(),
        });
    }

    // Center on the sample mean and work in units of the largest offset to
    // keep the design matrix well scaled; undone at the end.
    let mean = samples
        .iter()
        .map(|s| s.map(|v| v as f64))
        .sum::<Vector3<f64>>()
        / samples.len() as f64;
    let scale = samples
        .iter()
        .map(|s| (s.map(|v| v as f64) - mean).amax())
        .fold(0.0, f64::max);
    if !scale.is_finite() || scale == 0.0 {
        return Err(CalibrationError::Degenerate {
            reason: "samples are all equal or not finite",
        });
    }
    let points: Vec<Vector3<f64>> = samples
        .iter()
        .map(|s| (s.map(|v| v as f64) - mean) / scale)
        .collect();

    let mut design = DMatrix::<f64>::zeros(points.len(), 9);
    let mut rhs = DVector::<f64>::zeros(points.len());

    for (row, p) in points.iter().enumerate() {
        let (x, y, z) = (p.x, p.y, p.z);
        let terms = [
            x * x + y * y - 2.0 * z * z,
            x * x + z * z - 2.0 * y * y,
            2.0 * x * y,
            2.0 * x * z,
            2.0 * y * z,
            2.0 * x,
            2.0 * y,
            2.0 * z,
            1.0,
        ];
        for (col, term) in terms.into_iter().enumerate() {
            design[(row, col)] = term;
        }
        rhs[row] = x * x + y * y + z * z;
    }

    let svd = design.svd(true, true);
    let largest = svd.singular_values.max();
    let smallest = svd.singular_values.min();
    if largest <= 0.0 || smallest / largest < CONDITION_LIMIT {
        return Err(CalibrationError::Degenerate {
            reason: "quadric system is singular or nearly so",
        });
    }
    let u = svd
        .solve(&rhs, 0.0)
        .map_err(|reason| CalibrationError::Degenerate { reason })?;

    let form = Matrix4::new(
        u[0] + u[1] - 1.0, u[2], u[3], u[5],
        u[2], u[0] - 2.0 * u[1] - 1.0, u[4], u[6],
        u[3], u[4], u[1] - 2.0 * u[0] - 1.0, u[7],
        u[5], u[6], u[7], u[8],
    );

    let quadratic: Matrix3<f64> = form.fixed_view::<3, 3>(0, 0).into_owned();
    let linear = Vector3::new(u[5], u[6], u[7]);
    let center = (-quadratic)
        .lu()
        .solve(&linear)
        .ok_or(CalibrationError::Degenerate {
            reason: "ellipsoid center is undetermined",
        })?;

    let mut translation = Matrix4::identity();
    translation
        .fixed_view_mut::<1, 3>(3, 0)
        .copy_from(&center.transpose());
    let centered = translation * form * translation.transpose();

    let constant = -centered[(3, 3)];
    if constant.abs() < f64::EPSILON {
        return Err(CalibrationError::Degenerate {
            reason: "quadric passes through its own center",
        });
    }

    let shape = centered.fixed_view::<3, 3>(0, 0).into_owned() / constant;
    let eigen = SymmetricEigen::new(shape);

    if eigen.eigenvalues.iter().any(|&value| value <= f64::EPSILON) {
        return Err(CalibrationError::Degenerate {
            reason: "quadric is not an ellipsoid",
        });
    }
    let radii = eigen.eigenvalues.map(|value| value.recip().sqrt());

    if radii.max() / radii.min() > MAX_AXIS_RATIO {
        return Err(CalibrationError::Degenerate {
            reason: "ellipsoid axes are implausibly unequal",
        });
    }

    for (axis, radius) in eigen.eigenvectors.column_iter().zip(radii.iter()) {
        let reach = points
            .iter()
            .map(|p| (p - center).dot(&axis).abs())
            .fold(0.0, f64::max);
        if reach < MIN_AXIS_COVERAGE * radius {
            return Err(CalibrationError::Degenerate {
                reason: "samples do not span every ellipsoid axis",
            });
        }
    }

    let fit = EllipsoidFit {
        center: center * scale + mean,
        eigenvectors: eigen.eigenvectors,
        radii: radii * scale,
    };

    if fit.center.iter().chain(fit.radii.iter()).all(|v| v.is_finite()) {
        Ok(fit)
    } else {
        Err(CalibrationError::Degenerate {
            reason: "fit produced non-finite values",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::mock::fibonacci_direction;
    use nalgebra::Rotation3;

    fn ellipsoid_points(
        center: Vector3<f64>,
        radii: Vector3<f64>,
        axes: Matrix3<f64>,
        count: u32,
    ) -> Vec<Vector3<f32>> {
        (0..count)
            .map(|i| {
                let unit = fibonacci_direction(i, count).map(|v| v as f64);
                let point = center + axes * unit.component_mul(&radii);
                point.map(|v| v as f32)
            })
            .collect()
    }

    #[test]
    fn test_sphere_at_origin() {
        let samples = ellipsoid_points(
            Vector3::zeros(),
            Vector3::new(50.0, 50.0, 50.0),
            Matrix3::identity(),
            300,
        );

        let fit = fit(&samples).unwrap();
        assert!(fit.center.norm() < 1e-3);
        assert!(fit.radii.iter().all(|r| (r - 50.0).abs() < 1e-2));
    }

    #[test]
    fn test_rotated_offset_ellipsoid() {
        let center = Vector3::new(12.0, -30.0, 7.5);
        let radii = Vector3::new(40.0, 55.0, 48.0);
        let axes = *Rotation3::from_euler_angles(0.3, -0.5, 1.1).matrix();

        let samples = ellipsoid_points(center, radii, axes, 800);
        let fit = fit(&samples).unwrap();

        assert!((fit.center - center).norm() < 1e-2);

        let expected = axes * Matrix3::from_diagonal(&radii) * axes.transpose();
        assert!((fit.soft_iron() - expected).norm() < 1e-2);

        let mut recovered: Vec<f64> = fit.radii.iter().copied().collect();
        recovered.sort_by(|a, b| a.total_cmp(b));
        for (got, want) in recovered.iter().zip([40.0, 48.0, 55.0]) {
            assert!((got - want).abs() < 1e-2, "radius {got} != {want}");
        }
    }

    #[test]
    fn test_too_few_samples() {
        let samples = vec![Vector3::new(1.0, 0.0, 0.0); 8];
        assert_eq!(
            fit(&samples),
            Err(CalibrationError::InsufficientSamples {
                required: 9,
                actual: 8
            })
        );
    }

    #[test]
    fn test_coplanar_samples_are_degenerate() {
        let samples: Vec<_> = (0..200)
            .map(|i| {
                let angle = i as f32 * 0.1;
                let radius = 30.0 + (i % 7) as f32;
                Vector3::new(radius * angle.cos(), radius * angle.sin(), 0.0)
            })
            .collect();

        assert!(matches!(
            fit(&samples),
            Err(CalibrationError::Degenerate { .. })
        ));
    }

    #[test]
    fn test_nearly_coplanar_samples_are_degenerate() {
        // A 30 µT circle with a few hundredths of jitter off its plane
        let samples: Vec<_> = (0..600)
            .map(|i| {
                let angle = i as f32 * core::f32::consts::TAU / 600.0;
                let jitter = 0.06 * (i as f32 * 7.3).sin();
                Vector3::new(30.0 * angle.cos(), 30.0 * angle.sin(), jitter)
            })
            .collect();

        assert!(matches!(
            fit(&samples),
            Err(CalibrationError::Degenerate { .. })
        ));
    }

    #[test]
    fn test_flattened_ellipsoid_is_degenerate() {
        let samples = ellipsoid_points(
            Vector3::new(4.0, -2.0, 9.0),
            Vector3::new(50.0, 48.0, 2.0),
            Matrix3::identity(),
            600,
        );

        assert!(matches!(
            fit(&samples),
            Err(CalibrationError::Degenerate { .. })
        ));
    }

    #[test]
    fn test_large_offset_is_well_conditioned() {
        let center = Vector3::new(400.0, -350.0, 280.0);
        let samples = ellipsoid_points(center, Vector3::new(45.0, 50.0, 42.0), Matrix3::identity(), 500);

        let fit = fit(&samples).unwrap();
        assert!((fit.center - center).norm() < 1e-2);
    }

    #[test]
    fn test_collinear_samples_are_degenerate() {
        let samples: Vec<_> = (0..50)
            .map(|i| Vector3::new(i as f32, 2.0 * i as f32, -(i as f32)))
            .collect();

        assert!(matches!(
            fit(&samples),
            Err(CalibrationError::Degenerate { .. })
        ));
    }
}
