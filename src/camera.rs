//! Camera model contract consumed by the tracker.
//!
//! The tracker never touches pixels or distortion models directly; it only
//! needs to move between 2D image measurements and 3D viewing rays. Any
//! calibrated camera can participate by implementing [`CameraModel`].

use nalgebra::{Vector2, Vector3};

/// Back-projection / re-projection interface of a calibrated camera.
///
/// Both directions are fallible: a pixel outside the calibrated field maps to
/// no bearing, and a bearing behind the camera (or landing outside the image)
/// maps to no pixel. Callers treat `None` as "skip this measurement".
pub trait CameraModel {
    fn image_width(&self) -> u32;

    fn image_height(&self) -> u32;

    /// Lift a pixel measurement to a unit-norm bearing vector in the camera
    /// frame.
    fn back_project(&self, pixel: &Vector2<f64>) -> Option<Vector3<f64>>;

    /// Project a bearing vector onto the image plane.
    fn project(&self, bearing: &Vector3<f64>) -> Option<Vector2<f64>>;
}

/// Distortion-free pinhole camera.
///
/// The minimal model the tracker needs: intrinsics only. Projections behind
/// the camera or outside the image bounds are rejected.
#[derive(Debug, Clone, Copy)]
pub struct PinholeCamera {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: u32,
    pub height: u32,
}

impl PinholeCamera {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64, width: u32, height: u32) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
        }
    }
}

impl CameraModel for PinholeCamera {
    fn image_width(&self) -> u32 {
        self.width
    }

    fn image_height(&self) -> u32 {
        self.height
    }

    fn back_project(&self, pixel: &Vector2<f64>) -> Option<Vector3<f64>> {
        let ray = Vector3::new(
            (pixel.x - self.cx) / self.fx,
            (pixel.y - self.cy) / self.fy,
            1.0,
        );
        Some(ray.normalize())
    }

    fn project(&self, bearing: &Vector3<f64>) -> Option<Vector2<f64>> {
        if bearing.z <= 0.0 {
            return None;
        }
        let u = self.fx * bearing.x / bearing.z + self.cx;
        let v = self.fy * bearing.y / bearing.z + self.cy;
        if u < 0.0 || v < 0.0 || u >= self.width as f64 || v >= self.height as f64 {
            return None;
        }
        Some(Vector2::new(u, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn test_camera() -> PinholeCamera {
        PinholeCamera::new(400.0, 400.0, 320.0, 240.0, 640, 480)
    }

    #[test]
    fn back_project_project_roundtrip() {
        let camera = test_camera();
        let pixel = Vector2::new(250.0, 300.0);

        let bearing = camera.back_project(&pixel).unwrap();
        assert_relative_eq!(bearing.norm(), 1.0, epsilon = 1e-12);

        let reprojected = camera.project(&bearing).unwrap();
        assert_relative_eq!(reprojected, pixel, epsilon = 1e-9);
    }

    #[test]
    fn principal_point_maps_to_optical_axis() {
        let camera = test_camera();
        let bearing = camera.back_project(&Vector2::new(320.0, 240.0)).unwrap();
        assert_relative_eq!(bearing, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn rejects_bearing_behind_camera() {
        let camera = test_camera();
        assert!(camera.project(&Vector3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn rejects_projection_outside_image() {
        let camera = test_camera();
        // A ray pointing far off the optical axis lands outside 640x480.
        assert!(camera.project(&Vector3::new(5.0, 0.0, 1.0)).is_none());
    }
}
