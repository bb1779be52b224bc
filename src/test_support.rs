//! Shared helpers for unit tests.

use nalgebra::Vector2;

use crate::camera::PinholeCamera;
use crate::frame::Frame;

pub const DESCRIPTOR_SIZE: usize = 32;

pub fn test_camera() -> PinholeCamera {
    PinholeCamera::new(400.0, 400.0, 320.0, 240.0, 640, 480)
}

/// Descriptor with exactly `bits` leading bits set, zero elsewhere.
///
/// Hamming distance between `descriptor_with_bits(a)` and
/// `descriptor_with_bits(b)` is `|a - b|`, which makes match-gate tests easy
/// to write.
pub fn descriptor_with_bits(bits: usize) -> Vec<u8> {
    assert!(bits <= DESCRIPTOR_SIZE * 8);
    let mut descriptor = vec![0u8; DESCRIPTOR_SIZE];
    for bit in 0..bits {
        descriptor[bit / 8] |= 1 << (bit % 8);
    }
    descriptor
}

/// Frame from parallel per-keypoint channels.
pub fn make_frame(
    timestamp_ns: i64,
    keypoints: &[(f64, f64)],
    descriptors: &[Vec<u8>],
    scores: &[f64],
) -> Frame {
    assert_eq!(keypoints.len(), descriptors.len());
    assert_eq!(keypoints.len(), scores.len());
    let keypoints: Vec<Vector2<f64>> = keypoints
        .iter()
        .map(|&(x, y)| Vector2::new(x, y))
        .collect();
    let mut buffer = Vec::with_capacity(keypoints.len() * DESCRIPTOR_SIZE);
    for descriptor in descriptors {
        assert_eq!(descriptor.len(), DESCRIPTOR_SIZE);
        buffer.extend_from_slice(descriptor);
    }
    Frame::new(timestamp_ns, keypoints, buffer, DESCRIPTOR_SIZE, scores.to_vec()).unwrap()
}

/// Frame where every keypoint carries the same descriptor and score 1.0.
pub fn make_uniform_frame(timestamp_ns: i64, keypoints: &[(f64, f64)]) -> Frame {
    let descriptors: Vec<Vec<u8>> = keypoints.iter().map(|_| descriptor_with_bits(0)).collect();
    let scores = vec![1.0; keypoints.len()];
    make_frame(timestamp_ns, keypoints, &descriptors, &scores)
}
