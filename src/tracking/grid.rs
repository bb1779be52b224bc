//! Spatial indexing for the tracker.
//!
//! Two structures, both rebuilt per frame:
//! - [`RowIndexedKeypoints`]: current keypoints sorted by y with a cumulative
//!   row lookup table, so "all keypoints in a row band" is a slice.
//! - [`BucketGrid`]: coarse occupancy counts over a uniform image partition,
//!   used to cap the spatial concentration of accepted tracks.

use std::cmp::Ordering;

use nalgebra::Vector2;

/// A keypoint copy paired with its index in the originating frame.
#[derive(Debug, Clone, Copy)]
pub struct IndexedKeypoint {
    pub measurement: Vector2<f64>,
    pub index: usize,
}

/// Current-frame keypoints sorted ascending by y plus a row lookup table.
///
/// `lut[y]` is the number of sorted keypoints with `y_kp < y`, built by one
/// linear scan over the image rows. Keypoints in the row band `[y_lo, y_hi]`
/// are then the half-open sorted range `[lut[y_lo], lut[min(y_hi + 1, H-1)])`.
#[derive(Debug)]
pub struct RowIndexedKeypoints {
    sorted: Vec<IndexedKeypoint>,
    lut: Vec<usize>,
}

impl RowIndexedKeypoints {
    pub fn build(keypoints: &[Vector2<f64>], image_height: u32) -> Self {
        let mut sorted: Vec<IndexedKeypoint> = keypoints
            .iter()
            .enumerate()
            .map(|(index, measurement)| IndexedKeypoint {
                measurement: *measurement,
                index,
            })
            .collect();
        sorted.sort_by(|lhs, rhs| {
            lhs.measurement
                .y
                .partial_cmp(&rhs.measurement.y)
                .unwrap_or(Ordering::Equal)
        });

        let mut lut = Vec::with_capacity(image_height as usize);
        let mut v = 0;
        for y in 0..image_height as usize {
            while v < sorted.len() && y as f64 > sorted[v].measurement.y {
                v += 1;
            }
            lut.push(v);
        }

        Self { sorted, lut }
    }

    /// Keypoints whose row lies in the inclusive band `[row_lo, row_hi]`.
    ///
    /// Rows must already be clamped to `[0, H-1]` by the caller.
    pub fn rows(&self, row_lo: usize, row_hi: usize) -> &[IndexedKeypoint] {
        let last = self.lut.len() - 1;
        let top = row_lo.min(last);
        let bottom = (row_hi + 1).min(last);
        &self.sorted[self.lut[top]..self.lut[bottom]]
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }
}

/// Occupancy counts over a `side x side` uniform partition of the image.
#[derive(Debug)]
pub struct BucketGrid {
    side: usize,
    bucket_width_x: f64,
    bucket_width_y: f64,
    counts: Vec<usize>,
}

impl BucketGrid {
    pub fn new(side: usize, image_width: u32, image_height: u32) -> Self {
        Self {
            side,
            bucket_width_x: image_width as f64 / side as f64,
            bucket_width_y: image_height as f64 / side as f64,
            counts: vec![0; side * side],
        }
    }

    /// Bucket index of a pixel. The pixel must lie inside the image.
    pub fn bucket_of(&self, pixel: &Vector2<f64>) -> usize {
        let bin_x = (pixel.x / self.bucket_width_x).floor() as isize;
        let bin_y = (pixel.y / self.bucket_width_y).floor() as isize;
        let bin = bin_y * self.side as isize + bin_x;
        assert!(
            bin >= 0 && (bin as usize) < self.counts.len(),
            "keypoint ({}, {}) maps to bucket {} outside the {}x{} grid",
            pixel.x,
            pixel.y,
            bin,
            self.side,
            self.side
        );
        bin as usize
    }

    pub fn count(&self, bucket: usize) -> usize {
        self.counts[bucket]
    }

    pub fn increment(&mut self, bucket: usize) {
        self.counts[bucket] += 1;
    }

    pub fn num_buckets(&self) -> usize {
        self.counts.len()
    }
}
