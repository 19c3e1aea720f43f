//! Deterministic and random initial contents for a state arena

use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::map::state_arena::StateArena;

impl StateArena {
    /// x(i) = i, P(i, j) = i + 100 j over the whole buffer
    pub fn fill_sequential(&mut self) {
        let n = self.max_size();
        for i in 0..n {
            self.mean_mut()[i] = i as f64;
        }
        let p = self.covariance_mut();
        for i in 0..n {
            for j in 0..n {
                p[(i, j)] = (i + 100 * j) as f64;
            }
        }
    }

    /// x(i) = i, P(i, i) = i. Off-diagonal entries keep their value.
    pub fn fill_diagonal(&mut self) {
        for i in 0..self.max_size() {
            self.mean_mut()[i] = i as f64;
            self.covariance_mut()[(i, i)] = i as f64;
        }
    }

    /// Every mean and covariance entry drawn uniformly from [-1, 1)
    pub fn fill_random<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let uniform = Uniform::new(-1.0, 1.0);
        for x in self.mean_mut().iter_mut() {
            *x = uniform.sample(rng);
        }
        for p in self.covariance_mut().iter_mut() {
            *p = uniform.sample(rng);
        }
    }
}
