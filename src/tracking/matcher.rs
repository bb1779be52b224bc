//! Descriptor matching under the rotation-predicted spatial prior.
//!
//! For every previous keypoint with a valid prediction the search runs in two
//! tiers: a small window first, then a larger fallback window that skips the
//! descriptors already compared. Candidates are scored by descriptor
//! similarity and the best one wins if it clears the similarity floor.

use nalgebra::Matrix3;
use tracing::debug;

use crate::camera::CameraModel;
use crate::frame::Frame;
use crate::tracking::grid::RowIndexedKeypoints;
use crate::tracking::hamming::hamming_distance;
use crate::tracking::predictor::predict_keypoints;
use crate::tracking::tracker::TrackerConfig;

/// A previous-to-current keypoint correspondence with its similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub index_previous: usize,
    pub index_current: usize,
    /// `512 - hamming_distance`; higher is more similar.
    pub score: i32,
}

/// Match previous keypoints into the current frame.
///
/// Matching is many-to-one by design: several previous keypoints may select
/// the same current keypoint. The admission stage downstream is responsible
/// for interpreting such collisions.
pub fn match_features<C: CameraModel>(
    camera: &C,
    current: &Frame,
    previous: &Frame,
    c_current_prev: &Matrix3<f64>,
    config: &TrackerConfig,
) -> Vec<Match> {
    let image_height = camera.image_height() as i64;
    let rows = RowIndexedKeypoints::build(current.keypoints(), camera.image_height());
    let predictions = predict_keypoints(camera, previous.keypoints(), c_current_prev);

    let r_small = config.min_search_radius as i64;
    let r_large = config.search_radius as i64;
    let floor_score = 512 - config.matching_threshold_bits as i32;

    let mut matches = Vec::with_capacity(previous.len());
    let mut processed = vec![false; current.len()];
    let mut skipped_predictions = 0usize;

    for (index_previous, prediction) in predictions.iter().enumerate() {
        let predicted = match prediction {
            Some(predicted) => predicted,
            None => {
                skipped_predictions += 1;
                continue;
            }
        };
        let previous_descriptor = previous.descriptor(index_previous);

        let bound_left_small = (predicted.x - r_small as f64) as i64;
        let bound_right_small = (predicted.x + r_small as f64) as i64;
        let bound_left_large = (predicted.x - r_large as f64) as i64;
        let bound_right_large = (predicted.x + r_large as f64) as i64;

        let clamp_row = |row: f64| -> usize {
            (row as i64).clamp(0, image_height - 1) as usize
        };
        let row_small_lo = clamp_row(predicted.y + 0.5 - r_small as f64);
        let row_small_hi = clamp_row(predicted.y + 0.5 + r_small as f64);
        let row_large_lo = clamp_row(predicted.y + 0.5 - r_large as f64);
        let row_large_hi = clamp_row(predicted.y + 0.5 + r_large as f64);

        let mut found = false;
        let mut best_index = 0usize;
        let mut best_score = floor_score;
        processed.iter_mut().for_each(|flag| *flag = false);

        for candidate in rows.rows(row_small_lo, row_small_hi) {
            if candidate.measurement.x < bound_left_small as f64
                || candidate.measurement.x > bound_right_small as f64
            {
                continue;
            }
            let score =
                512 - hamming_distance(previous_descriptor, current.descriptor(candidate.index))
                    as i32;
            if score > best_score {
                best_score = score;
                best_index = candidate.index;
                found = true;
            }
            processed[candidate.index] = true;
        }

        // Nothing in the small window: widen, skipping compared descriptors.
        if !found {
            for candidate in rows.rows(row_large_lo, row_large_hi) {
                if processed[candidate.index] {
                    continue;
                }
                if candidate.measurement.x < bound_left_large as f64
                    || candidate.measurement.x > bound_right_large as f64
                {
                    continue;
                }
                let score = 512
                    - hamming_distance(previous_descriptor, current.descriptor(candidate.index))
                        as i32;
                if score > best_score {
                    best_score = score;
                    best_index = candidate.index;
                    found = true;
                }
                processed[candidate.index] = true;
            }
        }

        if found {
            matches.push(Match {
                index_previous,
                index_current: best_index,
                score: best_score,
            });
        }
    }

    debug!(
        num_previous = previous.len(),
        num_matches = matches.len(),
        skipped_predictions,
        "feature matching finished"
    );

    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{descriptor_with_bits, make_frame, make_uniform_frame, test_camera};

    fn default_config() -> TrackerConfig {
        TrackerConfig::default()
    }

    #[test]
    fn identical_frames_match_one_to_one() {
        let camera = test_camera();
        let keypoints = [(100.0, 100.0), (500.0, 400.0)];
        let descriptors = vec![descriptor_with_bits(0), descriptor_with_bits(200)];
        let scores = [1.0, 1.0];
        let previous = make_frame(0, &keypoints, &descriptors, &scores);
        let current = make_frame(1, &keypoints, &descriptors, &scores);

        let matches = match_features(
            &camera,
            &current,
            &previous,
            &Matrix3::identity(),
            &default_config(),
        );

        assert_eq!(matches.len(), 2);
        for m in &matches {
            assert_eq!(m.index_previous, m.index_current);
            assert_eq!(m.score, 512);
        }
    }

    #[test]
    fn descriptor_gate_rejects_distant_descriptors() {
        let camera = test_camera();
        let previous = make_frame(
            0,
            &[(100.0, 100.0)],
            &[descriptor_with_bits(0)],
            &[1.0],
        );
        // Exactly at the 120 bit threshold: score == floor, strict > fails.
        let current = make_frame(
            1,
            &[(100.0, 100.0)],
            &[descriptor_with_bits(120)],
            &[1.0],
        );

        let matches = match_features(
            &camera,
            &current,
            &previous,
            &Matrix3::identity(),
            &default_config(),
        );
        assert!(matches.is_empty());
    }

    #[test]
    fn descriptor_just_under_gate_matches() {
        let camera = test_camera();
        let previous = make_frame(0, &[(100.0, 100.0)], &[descriptor_with_bits(0)], &[1.0]);
        let current = make_frame(1, &[(100.0, 100.0)], &[descriptor_with_bits(119)], &[1.0]);

        let matches = match_features(
            &camera,
            &current,
            &previous,
            &Matrix3::identity(),
            &default_config(),
        );
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].score, 512 - 119);
    }

    #[test]
    fn displaced_keypoint_is_found_by_large_window() {
        let camera = test_camera();
        let previous = make_uniform_frame(0, &[(200.0, 200.0)]);
        // 7 px away: outside the 5 px window, inside the 10 px window.
        let current = make_uniform_frame(1, &[(207.0, 200.0)]);

        let matches = match_features(
            &camera,
            &current,
            &previous,
            &Matrix3::identity(),
            &default_config(),
        );
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].index_current, 0);
    }

    #[test]
    fn keypoint_outside_both_windows_is_not_matched() {
        let camera = test_camera();
        let previous = make_uniform_frame(0, &[(200.0, 200.0)]);
        let current = make_uniform_frame(1, &[(212.0, 200.0)]);

        let matches = match_features(
            &camera,
            &current,
            &previous,
            &Matrix3::identity(),
            &default_config(),
        );
        assert!(matches.is_empty());
    }

    #[test]
    fn small_window_match_suppresses_large_window_search() {
        let camera = test_camera();
        let previous = make_frame(0, &[(200.0, 200.0)], &[descriptor_with_bits(0)], &[1.0]);
        // A mediocre candidate inside the small window and a perfect one only
        // reachable through the large window: the mediocre one must win
        // because the second pass never runs.
        let current = make_frame(
            1,
            &[(203.0, 200.0), (209.0, 200.0)],
            &[descriptor_with_bits(100), descriptor_with_bits(0)],
            &[1.0, 1.0],
        );

        let matches = match_features(
            &camera,
            &current,
            &previous,
            &Matrix3::identity(),
            &default_config(),
        );
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].index_current, 0);
        assert_eq!(matches[0].score, 512 - 100);
    }

    #[test]
    fn equal_scores_keep_first_candidate_in_scan_order() {
        let camera = test_camera();
        let previous = make_uniform_frame(0, &[(200.0, 200.0)]);
        // Same descriptor, same window; the y-sorted scan sees index 1 first.
        let current = make_uniform_frame(1, &[(201.0, 202.0), (199.0, 198.0)]);

        let matches = match_features(
            &camera,
            &current,
            &previous,
            &Matrix3::identity(),
            &default_config(),
        );
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].index_current, 1);
    }

    #[test]
    fn many_previous_keypoints_may_share_one_current() {
        let camera = test_camera();
        let previous = make_uniform_frame(0, &[(200.0, 200.0), (204.0, 200.0)]);
        let current = make_uniform_frame(1, &[(202.0, 200.0)]);

        let matches = match_features(
            &camera,
            &current,
            &previous,
            &Matrix3::identity(),
            &default_config(),
        );
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|m| m.index_current == 0));
    }
}
