//! Common traits defining the seams to external models and filter backends

use nalgebra::{DMatrix, DVector};

use crate::common::error::SlamResult;
use crate::features::segment::{Roi, Segment};
use crate::map::state_arena::{Slot, StateArena};

/// Output of one motion model evaluation on a robot's local state
#[derive(Debug, Clone, PartialEq)]
pub struct MotionOutput {
    /// Propagated local state, same length as the input state
    pub state: DVector<f64>,
    /// Jacobian of the new state with respect to the previous one
    pub jacobian: DMatrix<f64>,
    /// Process noise covariance expressed in the robot's state space
    pub noise: DMatrix<f64>,
}

/// Trait for robot motion models
pub trait MotionModel {
    /// Control type
    type Control;

    /// Dimension of the robot state this model operates on
    fn size(&self) -> usize;

    /// Propagate the local state and linearize around it. Fails if the
    /// control does not fit the model.
    fn propagate(&self, state: &DVector<f64>, control: &Self::Control) -> SlamResult<MotionOutput>;
}

/// Trait for the opaque image segment detector consumed by the extractor
pub trait SegmentDetector {
    /// Image type
    type Image;

    /// Detect candidate segments in `image` constrained by `roi`.
    /// The returned order must be deterministic for a given input.
    fn detect_segments(&self, image: &Self::Image, roi: &Roi) -> Vec<Segment>;
}

/// Trait for filter backends advancing the shared covariance of a map
pub trait PredictCoupling {
    /// Scatter a robot-local Jacobian and process noise into the shared
    /// covariance over `used_indices`.
    fn predict(
        &self,
        arena: &mut StateArena,
        used_indices: &[usize],
        jacobian: &DMatrix<f64>,
        robot_slot: Slot,
        process_noise: &DMatrix<f64>,
    ) -> SlamResult<()>;
}
