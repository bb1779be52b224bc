//! Rotation-only keypoint prediction from an external rotation prior.
//!
//! Each previous keypoint is lifted to a bearing, rotated by the inter-frame
//! camera rotation and re-projected. Translation and depth are deliberately
//! ignored; with the tight spatial gates downstream, an unmodeled translation
//! degrades into a miss rather than a wrong match.

use nalgebra::{Matrix3, Vector2};

use crate::camera::CameraModel;

/// Predict where a previous-frame keypoint lands in the current frame.
///
/// `c_current_prev` rotates bearing vectors from the previous camera frame
/// into the current one. Returns `None` when either projection direction
/// fails; the caller simply skips the keypoint for this frame.
pub fn predict_keypoint<C: CameraModel>(
    camera: &C,
    keypoint: &Vector2<f64>,
    c_current_prev: &Matrix3<f64>,
) -> Option<Vector2<f64>> {
    let bearing = camera.back_project(keypoint)?;
    let predicted_bearing = c_current_prev * bearing;
    camera.project(&predicted_bearing)
}

/// Predict all previous keypoints at once, keeping per-keypoint failures.
pub fn predict_keypoints<C: CameraModel>(
    camera: &C,
    keypoints: &[Vector2<f64>],
    c_current_prev: &Matrix3<f64>,
) -> Vec<Option<Vector2<f64>>> {
    keypoints
        .iter()
        .map(|keypoint| predict_keypoint(camera, keypoint, c_current_prev))
        .collect()
}
