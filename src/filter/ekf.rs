//! Extended Kalman Filter prediction over a shared, partially used state
//!
//! Only the moving robot's rows and columns change:
//! - P_rr = J * P_rr * J^T + Q
//! - P_ro = J * P_ro, with P_or = P_ro^T
//! - P_oo is left as is
//!
//! where r is the robot slot and o every other used index. Entries outside
//! the used indices are never read or written.

use nalgebra::DMatrix;
use tracing::debug;

use crate::common::{PredictCoupling, SlamError, SlamResult};
use crate::map::state_arena::{Slot, StateArena};

/// EKF predict step acting on a shared map covariance
#[derive(Debug, Clone, Copy, Default)]
pub struct EkfPredictor;

impl EkfPredictor {
    pub fn new() -> Self {
        EkfPredictor
    }
}

fn check_square(what: &'static str, m: &DMatrix<f64>, n: usize) -> SlamResult<()> {
    if m.shape() != (n, n) {
        return Err(SlamError::DimensionMismatch {
            what,
            expected: (n, n),
            found: m.shape(),
        });
    }
    Ok(())
}

impl PredictCoupling for EkfPredictor {
    fn predict(
        &self,
        arena: &mut StateArena,
        used_indices: &[usize],
        jacobian: &DMatrix<f64>,
        robot_slot: Slot,
        process_noise: &DMatrix<f64>,
    ) -> SlamResult<()> {
        let n = robot_slot.len();
        check_square("jacobian", jacobian, n)?;
        check_square("process noise", process_noise, n)?;
        if !robot_slot.range().all(|i| used_indices.contains(&i)) {
            return Err(SlamError::UnknownSlot {
                start: robot_slot.start(),
                end: robot_slot.end(),
            });
        }
        if n == 0 {
            return Ok(());
        }

        let others: Vec<usize> = used_indices
            .iter()
            .copied()
            .filter(|&i| !robot_slot.contains(i))
            .collect();
        let start = robot_slot.start();

        // Cross terms first, they only read robot rows x other columns
        if !others.is_empty() {
            let p = arena.covariance_mut();
            let p_ro = p.rows(start, n).select_columns(others.iter());
            let p_ro_new = jacobian * p_ro;
            for (c, &k) in others.iter().enumerate() {
                for r in 0..n {
                    p[(start + r, k)] = p_ro_new[(r, c)];
                    p[(k, start + r)] = p_ro_new[(r, c)];
                }
            }
        }

        let p_rr = arena.slot_covariance(robot_slot).clone_owned();
        let p_rr_new = jacobian * p_rr * jacobian.transpose() + process_noise;
        arena.slot_covariance_mut(robot_slot).copy_from(&p_rr_new);

        debug!(
            start,
            size = n,
            coupled = others.len(),
            "predicted robot covariance"
        );
        Ok(())
    }
}
