//! rtslam - shared state and entity graph for real-time EKF-SLAM
//!
//! A [`Map`] owns one fixed-capacity mean vector and covariance matrix
//! ([`StateArena`]) partitioned into slots, and the robots, sensors,
//! landmarks and observations that own those slots. Motion models, filter
//! backends and image segment detectors plug in through the traits in
//! [`common`].

// Core modules
pub mod common;

// Map and estimation modules
pub mod features;
pub mod filter;
pub mod map;
pub mod motion;

// Re-export common types for convenience
pub use common::{EntityKind, LandmarkId, ObservationId, RobotId, SensorId};
pub use common::{MapConfig, SensorFanOut};
pub use common::{MotionModel, PredictCoupling, SegmentDetector};
pub use common::{SlamError, SlamResult};
pub use map::{Map, Slot, StateArena};
