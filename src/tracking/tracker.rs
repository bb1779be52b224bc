//! Frame-to-frame track bookkeeping around the match search.
//!
//! `GyroTracker::add_frame` is the single entry point: it predicts and
//! matches the previous frame's keypoints into the current frame, admits
//! matches through the bucketed quality gates, allocates track ids and rolls
//! the frame state forward.

use anyhow::{ensure, Result};
use nalgebra::Matrix3;
use tracing::debug;

use crate::camera::CameraModel;
use crate::frame::{Frame, UNTRACKED};
use crate::tracking::grid::BucketGrid;
use crate::tracking::matcher::{match_features, Match};

/// Tracker tuning knobs, fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    /// Side length of the bucket grid; the image is split into
    /// `num_tracking_buckets^2` cells.
    pub num_tracking_buckets: usize,
    /// New-track admissions that bypass the bucket occupancy check.
    pub num_keypoints_unconditional: usize,
    /// Total cap on new-track candidates considered, including bucket-gated
    /// ones. Also sets the per-bucket cap via integer division.
    pub num_keypoints_strong: usize,
    /// Minimum keypoint score for an unconditional admission.
    pub score_threshold_unconditional: f64,
    /// Minimum keypoint score for a bucket-gated admission.
    pub score_threshold_strong: f64,
    /// First-pass search radius in pixels.
    pub min_search_radius: u32,
    /// Fallback search radius in pixels.
    pub search_radius: u32,
    /// Maximum Hamming distance for a descriptor match.
    pub matching_threshold_bits: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            num_tracking_buckets: 4,
            num_keypoints_unconditional: 100,
            num_keypoints_strong: 700,
            score_threshold_unconditional: 800.0,
            score_threshold_strong: 50.0,
            min_search_radius: 5,
            search_radius: 10,
            matching_threshold_bits: 120,
        }
    }
}

/// Per-frame counters describing what the tracker did.
///
/// Purely an observer channel; nothing downstream of it feeds back into the
/// tracking state.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackSummary {
    pub num_matches: usize,
    pub num_continued: usize,
    pub num_unconditional: usize,
    pub num_strong: usize,
    pub num_new_tracks: usize,
    pub num_rejected_unconditional_score: usize,
    pub num_rejected_strong_score: usize,
    pub num_bucket_full: usize,
}

/// What `add_frame` hands back to the caller.
#[derive(Debug)]
pub struct TrackerOutput {
    pub summary: TrackSummary,
    /// The frame that just left the previous-frame slot. Its track-id channel
    /// is final: ids of tracks born while it was the previous frame have been
    /// back-filled.
    pub retired_frame: Option<Frame>,
}

/// Gyro-aided frame-to-frame feature tracker.
///
/// The tracker owns the most recent frame it has seen; callers surrender each
/// frame to `add_frame` and receive the retired one back once its id channel
/// has settled.
pub struct GyroTracker<C: CameraModel> {
    camera: C,
    config: TrackerConfig,
    previous_frame: Option<Frame>,
    previous_track_lengths: Vec<u32>,
    next_track_id: i32,
}

impl<C: CameraModel> GyroTracker<C> {
    pub fn new(camera: C) -> Self {
        Self::with_config(camera, TrackerConfig::default())
    }

    pub fn with_config(camera: C, config: TrackerConfig) -> Self {
        Self {
            camera,
            config,
            previous_frame: None,
            previous_track_lengths: Vec::new(),
            next_track_id: 0,
        }
    }

    /// The frame most recently handed to `add_frame`. Its track-id channel
    /// may still change on the next call (new-track back-fill).
    pub fn previous_frame(&self) -> Option<&Frame> {
        self.previous_frame.as_ref()
    }

    /// Track lengths co-indexed with `previous_frame`'s keypoints.
    pub fn track_lengths(&self) -> &[u32] {
        &self.previous_track_lengths
    }

    /// Process the next frame of the stream.
    ///
    /// `c_current_prev` rotates bearings from the previous camera frame into
    /// the current one. On the first call, or when `current` carries no
    /// keypoints, the tracker (re-)initializes: every keypoint is left
    /// untracked and the frame is stored as the new previous frame.
    pub fn add_frame(
        &mut self,
        mut current: Frame,
        c_current_prev: &Matrix3<f64>,
    ) -> Result<TrackerOutput> {
        if self.previous_frame.is_none() || current.is_empty() {
            let num_keypoints = current.len();
            current.set_track_ids(vec![UNTRACKED; num_keypoints]);
            self.previous_track_lengths = vec![0; num_keypoints];
            let retired_frame = self.previous_frame.replace(current);
            return Ok(TrackerOutput {
                summary: TrackSummary::default(),
                retired_frame,
            });
        }

        // Input contracts, checked before any state is touched.
        {
            let previous = self.previous_frame.as_ref().unwrap();
            ensure!(
                current.timestamp_ns() > previous.timestamp_ns(),
                "frames must arrive in strictly increasing timestamp order \
                 (current {} ns, previous {} ns)",
                current.timestamp_ns(),
                previous.timestamp_ns()
            );
            ensure!(
                current.descriptor_size() == previous.descriptor_size(),
                "descriptor width changed mid-run ({} bytes vs {} bytes)",
                current.descriptor_size(),
                previous.descriptor_size()
            );
        }

        let previous = self.previous_frame.as_mut().unwrap();
        let matches =
            match_features(&self.camera, &current, previous, c_current_prev, &self.config);

        let mut summary = TrackSummary {
            num_matches: matches.len(),
            ..TrackSummary::default()
        };

        let mut buckets = BucketGrid::new(
            self.config.num_tracking_buckets,
            self.camera.image_width(),
            self.camera.image_height(),
        );

        let num_current = current.len();
        let mut current_track_ids = vec![UNTRACKED; num_current];
        let mut current_track_lengths = vec![0u32; num_current];

        // Stage 1: carry over ids. Continued tracks are accepted outright and
        // occupy their bucket; a later match onto the same current keypoint
        // overwrites the earlier mapping.
        let mut accepted: Vec<Match> = Vec::with_capacity(matches.len());
        for m in &matches {
            let mapped_id = previous.track_id(m.index_previous);
            current_track_ids[m.index_current] = mapped_id;
            if mapped_id >= 0 {
                current_track_lengths[m.index_current] =
                    self.previous_track_lengths[m.index_previous] + 1;
                let bucket = buckets.bucket_of(current.keypoint(m.index_current));
                buckets.increment(bucket);
                accepted.push(*m);
                summary.num_continued += 1;
            } else {
                current_track_lengths[m.index_current] = 0;
            }
        }

        // Stage 2: matches that did not continue a track compete for new-track
        // slots, examined weakest score first.
        let mut candidates: Vec<(usize, f64)> = matches
            .iter()
            .enumerate()
            .filter(|(_, m)| current_track_ids[m.index_current] < 0)
            .map(|(match_index, m)| (match_index, current.score(m.index_current)))
            .collect();
        candidates.sort_by(|lhs, rhs| {
            lhs.1
                .partial_cmp(&rhs.1)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // Stage 3: unconditional admissions, gated only by the score floor.
        let mut candidate_idx = 0;
        while candidate_idx < self.config.num_keypoints_unconditional.min(candidates.len()) {
            let (match_index, score) = candidates[candidate_idx];
            candidate_idx += 1;
            if score < self.config.score_threshold_unconditional {
                summary.num_rejected_unconditional_score += 1;
                continue;
            }
            let m = matches[match_index];
            let bucket = buckets.bucket_of(current.keypoint(m.index_current));
            buckets.increment(bucket);
            accepted.push(m);
            summary.num_unconditional += 1;
        }

        // Stage 4: bucket-gated admissions up to the strong cap.
        let per_bucket_cap = self.config.num_keypoints_strong / buckets.num_buckets();
        while candidate_idx < self.config.num_keypoints_strong.min(candidates.len()) {
            let (match_index, score) = candidates[candidate_idx];
            candidate_idx += 1;
            if score < self.config.score_threshold_strong {
                summary.num_rejected_strong_score += 1;
                continue;
            }
            let m = matches[match_index];
            let bucket = buckets.bucket_of(current.keypoint(m.index_current));
            if buckets.count(bucket) < per_bucket_cap {
                buckets.increment(bucket);
                accepted.push(m);
                summary.num_strong += 1;
            } else {
                summary.num_bucket_full += 1;
            }
        }

        // Allocate ids for accepted matches that start a track, back-filling
        // the previous frame so both endpoints carry the new id.
        for m in &accepted {
            if current_track_ids[m.index_current] == UNTRACKED {
                let previous_id = previous.track_id(m.index_previous);
                assert_eq!(
                    previous_id, UNTRACKED,
                    "match admitted as a new track, but previous keypoint {} already \
                     carries track id {} and should have continued instead",
                    m.index_previous, previous_id
                );
                self.next_track_id += 1;
                current_track_ids[m.index_current] = self.next_track_id;
                previous.set_track_id(m.index_previous, self.next_track_id);
                current_track_lengths[m.index_current] = 2;
                summary.num_new_tracks += 1;
            }
        }

        debug!(
            num_matches = summary.num_matches,
            num_continued = summary.num_continued,
            num_unconditional = summary.num_unconditional,
            num_strong = summary.num_strong,
            num_new_tracks = summary.num_new_tracks,
            num_bucket_full = summary.num_bucket_full,
            "frame tracked"
        );

        current.set_track_ids(current_track_ids);
        self.previous_track_lengths = current_track_lengths;
        let retired_frame = self.previous_frame.replace(current);

        Ok(TrackerOutput {
            summary,
            retired_frame,
        })
    }
}
