//! Frame data container: keypoint measurements, binary descriptors, response
//! scores and the per-keypoint track-id channel.
//!
//! Detection and descriptor extraction happen upstream; a [`Frame`] arrives
//! with those channels already filled and the track-id channel untracked. The
//! tracker is the only writer of track ids.

use anyhow::{ensure, Result};
use nalgebra::Vector2;

/// Track id marking a keypoint that is not on any track.
pub const UNTRACKED: i32 = -1;

/// A single camera frame with per-keypoint channels.
///
/// All channels are co-indexed: entry `i` of every channel describes the same
/// detected keypoint. Descriptors are stored as one flat byte buffer with a
/// fixed stride so a descriptor view is a cheap slice.
#[derive(Debug, Clone)]
pub struct Frame {
    timestamp_ns: i64,
    keypoints: Vec<Vector2<f64>>,
    descriptors: Vec<u8>,
    descriptor_size: usize,
    scores: Vec<f64>,
    track_ids: Vec<i32>,
}

impl Frame {
    /// Build a frame from upstream detection output.
    ///
    /// `descriptors` is the concatenation of one `descriptor_size`-byte
    /// descriptor per keypoint. All keypoints start untracked.
    pub fn new(
        timestamp_ns: i64,
        keypoints: Vec<Vector2<f64>>,
        descriptors: Vec<u8>,
        descriptor_size: usize,
        scores: Vec<f64>,
    ) -> Result<Self> {
        ensure!(descriptor_size > 0, "descriptor size must be positive");
        ensure!(
            descriptor_size * 8 < 512,
            "descriptor size {} bytes exceeds the 512 bit limit",
            descriptor_size
        );
        ensure!(
            descriptors.len() == keypoints.len() * descriptor_size,
            "descriptor buffer holds {} bytes but {} keypoints x {} bytes are required",
            descriptors.len(),
            keypoints.len(),
            descriptor_size
        );
        ensure!(
            scores.len() == keypoints.len(),
            "score channel length {} does not match {} keypoints",
            scores.len(),
            keypoints.len()
        );

        let track_ids = vec![UNTRACKED; keypoints.len()];
        Ok(Self {
            timestamp_ns,
            keypoints,
            descriptors,
            descriptor_size,
            scores,
            track_ids,
        })
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn timestamp_ns(&self) -> i64 {
        self.timestamp_ns
    }

    pub fn keypoint(&self, index: usize) -> &Vector2<f64> {
        &self.keypoints[index]
    }

    pub fn keypoints(&self) -> &[Vector2<f64>] {
        &self.keypoints
    }

    pub fn descriptor_size(&self) -> usize {
        self.descriptor_size
    }

    /// Descriptor of keypoint `index` as a `descriptor_size`-byte slice.
    pub fn descriptor(&self, index: usize) -> &[u8] {
        let start = index * self.descriptor_size;
        &self.descriptors[start..start + self.descriptor_size]
    }

    pub fn score(&self, index: usize) -> f64 {
        self.scores[index]
    }

    pub fn track_id(&self, index: usize) -> i32 {
        self.track_ids[index]
    }

    pub fn track_ids(&self) -> &[i32] {
        &self.track_ids
    }

    pub(crate) fn set_track_id(&mut self, index: usize, id: i32) {
        self.track_ids[index] = id;
    }

    pub(crate) fn set_track_ids(&mut self, ids: Vec<i32>) {
        debug_assert_eq!(ids.len(), self.keypoints.len());
        self.track_ids = ids;
    }
}
