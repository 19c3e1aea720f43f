//! Constant velocity motion model
//!
//! State [p; v] with `dim` position and `dim` velocity components.
//! The control is a velocity increment applied over one step:
//!   p' = p + v * dt
//!   v' = v + u

use nalgebra::{DMatrix, DVector};

use crate::common::{MotionModel, MotionOutput, SlamError, SlamResult};

/// Configuration for the constant velocity model
#[derive(Debug, Clone)]
pub struct ConstantVelocity {
    /// Number of spatial dimensions
    pub dim: usize,
    /// Time step [s]
    pub dt: f64,
    /// Standard deviation of the velocity perturbation per step
    pub velocity_noise: f64,
}

impl ConstantVelocity {
    pub fn new(dim: usize, dt: f64, velocity_noise: f64) -> Self {
        ConstantVelocity { dim, dt, velocity_noise }
    }

    /// J = [[I, dt I], [0, I]]
    pub fn jacobian(&self) -> DMatrix<f64> {
        let d = self.dim;
        let mut j = DMatrix::identity(2 * d, 2 * d);
        for i in 0..d {
            j[(i, d + i)] = self.dt;
        }
        j
    }

    /// Q = diag(0, sigma^2 I)
    pub fn process_noise(&self) -> DMatrix<f64> {
        let d = self.dim;
        let mut q = DMatrix::zeros(2 * d, 2 * d);
        for i in d..2 * d {
            q[(i, i)] = self.velocity_noise.powi(2);
        }
        q
    }
}

impl Default for ConstantVelocity {
    fn default() -> Self {
        Self::new(3, 0.1, 0.1)
    }
}

impl MotionModel for ConstantVelocity {
    type Control = DVector<f64>;

    fn size(&self) -> usize {
        2 * self.dim
    }

    fn propagate(&self, state: &DVector<f64>, control: &DVector<f64>) -> SlamResult<MotionOutput> {
        let d = self.dim;
        if control.len() != d {
            return Err(SlamError::DimensionMismatch {
                what: "control",
                expected: (d, 1),
                found: (control.len(), 1),
            });
        }
        if state.len() != 2 * d {
            return Err(SlamError::DimensionMismatch {
                what: "state",
                expected: (2 * d, 1),
                found: (state.len(), 1),
            });
        }
        let mut next = state.clone();
        for i in 0..d {
            next[i] = state[i] + state[d + i] * self.dt;
            next[d + i] = state[d + i] + control[i];
        }
        Ok(MotionOutput {
            state: next,
            jacobian: self.jacobian(),
            noise: self.process_noise(),
        })
    }
}
