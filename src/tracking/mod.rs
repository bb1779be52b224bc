//! Gyro-aided frame-to-frame feature tracking.
//!
//! The pipeline per frame:
//! - predict previous keypoints into the current image from the rotation
//!   prior (`predictor`)
//! - index current keypoints by row and search the predicted neighborhoods
//!   for descriptor matches (`grid`, `hamming`, `matcher`)
//! - admit matches through the bucketed quality gates and maintain track ids
//!   across frames (`tracker`)

pub mod grid;
pub mod hamming;
pub mod matcher;
pub mod predictor;
pub mod tracker;

pub use matcher::Match;
pub use tracker::{GyroTracker, TrackSummary, TrackerConfig, TrackerOutput};
