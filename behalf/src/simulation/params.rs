//! Numerical and physical parameters for a run
//!
//! `Parameters` holds the runtime settings the core needs:
//! - step size and step count,
//! - gravitational constant, opening angle and softening length,
//! - snapshot interval

use crate::error::SimError;
use crate::simulation::forces::Gravity;

#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub dt: f64,           // step size
    pub n_steps: usize,    // number of steps
    pub g: f64,            // gravitational constant
    pub theta: f64,        // opening angle
    pub softening: f64,    // softening length
    pub save_every: usize, // snapshot interval in steps
}

impl Parameters {
    /// Reject values the integrator or tree walk cannot work with.
    pub fn validate(&self) -> Result<(), SimError> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(SimError::Configuration(format!("dt must be positive, got {}", self.dt)));
        }
        if self.n_steps == 0 {
            return Err(SimError::Configuration("step count must be at least 1".into()));
        }
        if !(self.g.is_finite() && self.g > 0.0) {
            return Err(SimError::Configuration(format!("G must be positive, got {}", self.g)));
        }
        if !(self.theta.is_finite() && self.theta >= 0.0) {
            return Err(SimError::Configuration(format!("theta must be non-negative, got {}", self.theta)));
        }
        if !(self.softening.is_finite() && self.softening >= 0.0) {
            return Err(SimError::Configuration(format!(
                "softening must be non-negative, got {}",
                self.softening
            )));
        }
        if self.save_every == 0 {
            return Err(SimError::Configuration("save_every must be at least 1".into()));
        }
        Ok(())
    }

    pub fn gravity(&self) -> Gravity {
        Gravity::new(self.g, self.theta, self.softening)
    }

    /// Whether step `i` (0-based) is handed to the snapshot sink.
    pub fn is_snapshot_step(&self, i: usize) -> bool {
        i % self.save_every == 0 || i + 1 == self.n_steps
    }
}
