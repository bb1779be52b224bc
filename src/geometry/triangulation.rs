//! Linear multi-view triangulation.
//!
//! Solves for a world point from `n` normalized image measurements and the
//! corresponding body poses by stacking one linear block row per view:
//!
//! ```text
//! W_p  -  R_W_B[i] * R_B_C[cam_i] * [u_i, v_i, 1]^T * lambda_i
//!      =  p_W_B[i]  +  R_W_B[i] * p_B_C[cam_i]
//! ```
//!
//! The unknowns are the point (3) and one depth per view (n). A
//! rank-revealing decomposition of the `3n x (3+n)` system exposes
//! unobservable geometry (e.g. all rays collinear) before the solve.

use nalgebra::{DMatrix, DVector, Vector2, Vector3};
use tracing::debug;

use crate::geometry::SE3;

/// Rank threshold of the decomposition; singular values below it are treated
/// as rank loss.
pub const RANK_LOSS_TOLERANCE: f64 = 1e-3;

/// Outcome of a triangulation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriangulationStatus {
    /// The triangulation was successful.
    Successful,
    /// There were too few (< 2) measurements.
    TooFewMeasurements,
    /// The landmark is not fully observable (rank deficiency).
    Unobservable,
    /// Default value before any triangulation ran.
    Uninitialized,
}

/// Triangulated point plus the status of the operation.
///
/// On any non-successful status the point field keeps its prior value (zero
/// for a freshly constructed result).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangulationResult {
    pub status: TriangulationStatus,
    pub point_world: Vector3<f64>,
}

impl Default for TriangulationResult {
    fn default() -> Self {
        Self {
            status: TriangulationStatus::Uninitialized,
            point_world: Vector3::zeros(),
        }
    }
}

impl TriangulationResult {
    pub fn is_successful(&self) -> bool {
        self.status == TriangulationStatus::Successful
    }

    fn failed(status: TriangulationStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }
}

/// Triangulate a point observed by a single camera rigidly mounted on a
/// moving body.
///
/// `measurements_normalized` are points on the `z = 1` camera plane, `t_w_b`
/// the body-to-world pose per measurement, `t_b_c` the constant
/// camera-to-body pose.
pub fn triangulate(
    measurements_normalized: &[Vector2<f64>],
    t_w_b: &[SE3],
    t_b_c: &SE3,
) -> TriangulationResult {
    assert_eq!(
        measurements_normalized.len(),
        t_w_b.len(),
        "one body pose is required per measurement"
    );
    let num_measurements = measurements_normalized.len();
    if num_measurements < 2 {
        return TriangulationResult::failed(TriangulationStatus::TooFewMeasurements);
    }

    let r_b_c = t_b_c.rotation_matrix();

    let mut a = DMatrix::<f64>::zeros(3 * num_measurements, 3 + num_measurements);
    let mut b = DVector::<f64>::zeros(3 * num_measurements);
    for (i, measurement) in measurements_normalized.iter().enumerate() {
        let v = Vector3::new(measurement.x, measurement.y, 1.0);
        let r_w_b = t_w_b[i].rotation_matrix();
        a.fixed_view_mut::<3, 3>(3 * i, 0)
            .fill_with_identity();
        a.fixed_view_mut::<3, 1>(3 * i, 3 + i)
            .copy_from(&(-(r_w_b * r_b_c * v)));
        b.fixed_rows_mut::<3>(3 * i)
            .copy_from(&t_w_b[i].transform_point(&t_b_c.translation));
    }

    solve_system(a, b, num_measurements)
}

/// Triangulate a point observed by several cameras on the same body.
///
/// `camera_indices[i]` selects which of the `t_b_c` extrinsics produced
/// measurement `i`.
pub fn triangulate_multi_cam(
    measurements_normalized: &[Vector2<f64>],
    camera_indices: &[usize],
    t_w_b: &[SE3],
    t_b_c: &[SE3],
) -> TriangulationResult {
    assert_eq!(
        measurements_normalized.len(),
        t_w_b.len(),
        "one body pose is required per measurement"
    );
    assert_eq!(
        measurements_normalized.len(),
        camera_indices.len(),
        "one camera index is required per measurement"
    );
    let num_measurements = measurements_normalized.len();
    if num_measurements < 2 {
        return TriangulationResult::failed(TriangulationStatus::TooFewMeasurements);
    }

    let mut a = DMatrix::<f64>::zeros(3 * num_measurements, 3 + num_measurements);
    let mut b = DVector::<f64>::zeros(3 * num_measurements);
    for (i, measurement) in measurements_normalized.iter().enumerate() {
        let cam_index = camera_indices[i];
        assert!(
            cam_index < t_b_c.len(),
            "camera index {} out of range ({} cameras)",
            cam_index,
            t_b_c.len()
        );
        let v = Vector3::new(measurement.x, measurement.y, 1.0);
        let r_w_b = t_w_b[i].rotation_matrix();
        let r_b_c = t_b_c[cam_index].rotation_matrix();
        a.fixed_view_mut::<3, 3>(3 * i, 0)
            .fill_with_identity();
        a.fixed_view_mut::<3, 1>(3 * i, 3 + i)
            .copy_from(&(-(r_w_b * r_b_c * v)));
        b.fixed_rows_mut::<3>(3 * i)
            .copy_from(&t_w_b[i].transform_point(&t_b_c[cam_index].translation));
    }

    solve_system(a, b, num_measurements)
}

fn solve_system(a: DMatrix<f64>, b: DVector<f64>, num_measurements: usize) -> TriangulationResult {
    let svd = a.svd(true, true);
    let rank = svd.rank(RANK_LOSS_TOLERANCE);
    if rank < num_measurements + 3 {
        debug!(
            rank,
            num_measurements, "triangulation system is rank deficient"
        );
        return TriangulationResult::failed(TriangulationStatus::Unobservable);
    }

    let solution = match svd.solve(&b, RANK_LOSS_TOLERANCE) {
        Ok(solution) => solution,
        Err(_) => return TriangulationResult::failed(TriangulationStatus::Unobservable),
    };

    TriangulationResult {
        status: TriangulationStatus::Successful,
        point_world: Vector3::new(solution[0], solution[1], solution[2]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Unit, UnitQuaternion};

    /// Normalized measurement of a world point seen from `t_w_b * t_b_c`.
    fn observe(point_world: &Vector3<f64>, t_w_b: &SE3, t_b_c: &SE3) -> Vector2<f64> {
        let t_w_c = t_w_b.compose(t_b_c);
        let p_cam = t_w_c.inverse().transform_point(point_world);
        assert!(p_cam.z > 0.0, "test geometry must keep the point in front");
        Vector2::new(p_cam.x / p_cam.z, p_cam.y / p_cam.z)
    }

    fn body_pose(x: f64, yaw: f64) -> SE3 {
        SE3::new(
            UnitQuaternion::from_axis_angle(
                &Unit::new_normalize(Vector3::new(0.0, 1.0, 0.0)),
                yaw,
            ),
            Vector3::new(x, 0.0, 0.0),
        )
    }

    #[test]
    fn recovers_point_from_noise_free_views() {
        let point_world = Vector3::new(0.5, -0.3, 4.0);
        let t_b_c = SE3::from_translation(Vector3::new(0.05, 0.0, 0.1));
        let t_w_b = vec![body_pose(0.0, 0.0), body_pose(0.8, -0.1), body_pose(-0.6, 0.1)];
        let measurements: Vec<Vector2<f64>> = t_w_b
            .iter()
            .map(|pose| observe(&point_world, pose, &t_b_c))
            .collect();

        let result = triangulate(&measurements, &t_w_b, &t_b_c);
        assert!(result.is_successful());
        assert_relative_eq!(result.point_world, point_world, epsilon = 1e-9);
    }

    #[test]
    fn two_views_suffice() {
        let point_world = Vector3::new(-0.2, 0.4, 3.0);
        let t_b_c = SE3::identity();
        let t_w_b = vec![body_pose(0.0, 0.0), body_pose(0.5, 0.0)];
        let measurements: Vec<Vector2<f64>> = t_w_b
            .iter()
            .map(|pose| observe(&point_world, pose, &t_b_c))
            .collect();

        let result = triangulate(&measurements, &t_w_b, &t_b_c);
        assert!(result.is_successful());
        assert_relative_eq!(result.point_world, point_world, epsilon = 1e-9);
    }

    #[test]
    fn single_view_is_rejected() {
        let result = triangulate(
            &[Vector2::new(0.1, 0.2)],
            &[SE3::identity()],
            &SE3::identity(),
        );
        assert_eq!(result.status, TriangulationStatus::TooFewMeasurements);
        assert_relative_eq!(result.point_world, Vector3::zeros(), epsilon = 0.0);
    }

    #[test]
    fn collinear_views_are_unobservable() {
        // Two bodies on the ray to the point, seeing the same bearing: depth
        // and point cannot be separated.
        let measurement = Vector2::new(0.0, 0.0);
        let t_b_c = SE3::identity();
        let t_w_b = vec![
            SE3::identity(),
            SE3::from_translation(Vector3::new(0.0, 0.0, 1.0)),
        ];

        let result = triangulate(&[measurement, measurement], &t_w_b, &t_b_c);
        assert_eq!(result.status, TriangulationStatus::Unobservable);
    }

    #[test]
    fn repeated_identical_views_are_unobservable() {
        let measurement = Vector2::new(0.3, -0.1);
        let t_w_b = vec![SE3::identity(), SE3::identity()];
        let result = triangulate(&[measurement, measurement], &t_w_b, &SE3::identity());
        assert_eq!(result.status, TriangulationStatus::Unobservable);
    }

    #[test]
    fn default_result_is_uninitialized() {
        let result = TriangulationResult::default();
        assert_eq!(result.status, TriangulationStatus::Uninitialized);
        assert!(!result.is_successful());
    }

    #[test]
    fn multi_cam_recovers_point_across_cameras() {
        let point_world = Vector3::new(0.3, 0.2, 5.0);
        let rigs = vec![
            SE3::from_translation(Vector3::new(-0.1, 0.0, 0.0)),
            SE3::from_translation(Vector3::new(0.1, 0.0, 0.0)),
        ];
        let t_w_b = vec![body_pose(0.0, 0.0), body_pose(0.0, 0.0), body_pose(0.7, -0.05)];
        let camera_indices = vec![0usize, 1, 0];
        let measurements: Vec<Vector2<f64>> = t_w_b
            .iter()
            .zip(&camera_indices)
            .map(|(pose, &cam)| observe(&point_world, pose, &rigs[cam]))
            .collect();

        let result = triangulate_multi_cam(&measurements, &camera_indices, &t_w_b, &rigs);
        assert!(result.is_successful());
        assert_relative_eq!(result.point_world, point_world, epsilon = 1e-9);
    }

    #[test]
    fn multi_cam_single_view_is_rejected() {
        let result = triangulate_multi_cam(
            &[Vector2::new(0.0, 0.0)],
            &[0],
            &[SE3::identity()],
            &[SE3::identity()],
        );
        assert_eq!(result.status, TriangulationStatus::TooFewMeasurements);
    }
}
