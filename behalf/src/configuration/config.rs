//! Run configuration loaded from YAML and command-line overrides.
//!
//! [`RunConfig`] is the `serde`-facing description of a run. Every field has
//! a default, so a file only needs the values it changes. Units follow the
//! simulation's system: length in kpc, time in Myr, mass in 10^9 M_sun.
//!
//! # YAML format
//!
//! ```yaml
//! run_name: plummer_10k     # output directory
//! n_parts: 10000            # number of particles
//! total_mass: 1.0e5         # total mass (10^9 M_sun)
//! radius: 10.0              # Plummer scale radius (kpc)
//! n_steps: 1000             # number of time steps
//! dt: 0.01                  # step size (Myr)
//! softening: 0.01           # softening length (kpc)
//! theta: 0.5                # opening angle
//! G: 4.483e-3               # kpc^3 (10^9 M_sun)^-1 Myr^-2
//! save_every: 10            # snapshot interval (steps)
//! seed: 1234                # initial-condition seed
//! workers: 4                # number of cooperating workers
//! sync_timeout_secs: 60.0   # optional; omit to wait forever
//! ```
//!
//! [`RunConfig::parameters`] maps this onto the runtime
//! [`Parameters`] used by the core.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::simulation::params::Parameters;

/// Newton's constant in kpc^3 (10^9 M_sun)^-1 Myr^-2
pub const GRAV_CONST: f64 = 4.483e-3;

/// Opening angle used when none is configured
pub const DEFAULT_THETA: f64 = 0.5;

/// Top-level run configuration.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub run_name: String,   // results directory
    pub n_parts: usize,     // number of particles
    pub total_mass: f64,    // total mass of the system
    pub radius: f64,        // Plummer scale radius
    pub n_steps: usize,     // number of time steps
    pub dt: f64,            // time step size
    pub softening: f64,     // softening length
    pub theta: f64,         // opening angle
    #[serde(rename = "G")]
    pub g: f64,             // gravitational constant
    pub save_every: usize,  // snapshot interval
    pub seed: u64,          // deterministic seed for initial conditions
    pub workers: usize,     // number of cooperating workers
    pub sync_timeout_secs: Option<f64>, // give up on a silent peer after this long
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_name: String::new(),
            n_parts: 0,
            total_mass: 1e5,
            radius: 10.0,
            n_steps: 1000,
            dt: 0.01,
            softening: 0.01,
            theta: DEFAULT_THETA,
            g: GRAV_CONST,
            save_every: 10,
            seed: 1234,
            workers: num_cpus::get().max(1),
            sync_timeout_secs: None,
        }
    }
}

impl RunConfig {
    /// Read a configuration file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, SimError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_yaml::from_reader(reader)?)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, SimError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Check every field before any simulation state is allocated.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.run_name.trim().is_empty() {
            return Err(SimError::Configuration("a run name is required".into()));
        }
        if self.n_parts == 0 {
            return Err(SimError::Configuration("at least one particle is required".into()));
        }
        if !(self.total_mass.is_finite() && self.total_mass > 0.0) {
            return Err(SimError::Configuration(format!(
                "total mass must be positive, got {}",
                self.total_mass
            )));
        }
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(SimError::Configuration(format!("scale radius must be positive, got {}", self.radius)));
        }
        if self.workers == 0 {
            return Err(SimError::Configuration("at least one worker is required".into()));
        }
        if let Some(t) = self.sync_timeout_secs {
            if !(t.is_finite() && t > 0.0) {
                return Err(SimError::Configuration(format!("sync timeout must be positive, got {t}")));
            }
        }
        self.parameters().validate()
    }

    /// Mass of each (equal-mass) particle.
    pub fn particle_mass(&self) -> f64 {
        self.total_mass / self.n_parts as f64
    }

    pub fn sync_timeout(&self) -> Option<Duration> {
        self.sync_timeout_secs.map(Duration::from_secs_f64)
    }

    pub fn parameters(&self) -> Parameters {
        Parameters {
            dt: self.dt,
            n_steps: self.n_steps,
            g: self.g,
            theta: self.theta,
            softening: self.softening,
            save_every: self.save_every,
        }
    }
}
