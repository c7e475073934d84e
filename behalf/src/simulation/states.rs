//! Core state types for the N-body simulation.
//!
//! The particle set is stored as parallel arrays (`positions`, `velocities`,
//! `masses`) so that contiguous index ranges can be scattered to workers and
//! gathered back without repacking. A particle's identity is its index.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::SimError;

pub type NVec3 = Vector3<f64>;

/// Full state of a run: one position, velocity and mass per particle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleSet {
    pub positions: Vec<NVec3>,  // 3d positions
    pub velocities: Vec<NVec3>, // 3d velocities
    pub masses: Vec<f64>,       // immutable for the whole run
}

impl ParticleSet {
    /// Bundle the three arrays, checking that they describe a valid set.
    pub fn new(positions: Vec<NVec3>, velocities: Vec<NVec3>, masses: Vec<f64>) -> Result<Self, SimError> {
        let set = Self { positions, velocities, masses };
        set.validate()?;
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.masses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masses.is_empty()
    }

    /// Check N >= 1, matching lengths, finite vectors and positive masses.
    pub fn validate(&self) -> Result<(), SimError> {
        let n = self.masses.len();
        if n == 0 {
            return Err(SimError::InvalidParticles("particle set is empty".into()));
        }
        if self.positions.len() != n || self.velocities.len() != n {
            return Err(SimError::InvalidParticles(format!(
                "length mismatch: {} positions, {} velocities, {} masses",
                self.positions.len(),
                self.velocities.len(),
                n
            )));
        }
        validate_points(&self.positions, &self.masses)?;
        if let Some(i) = self.velocities.iter().position(|v| !is_finite(v)) {
            return Err(SimError::InvalidParticles(format!("velocity of particle {i} is not finite")));
        }
        Ok(())
    }

    pub fn total_mass(&self) -> f64 {
        self.masses.iter().sum()
    }

    /// Mass-weighted mean position.
    pub fn center_of_mass(&self) -> NVec3 {
        weighted_mean(&self.positions, &self.masses)
    }

    /// Mass-weighted mean velocity (total momentum over total mass).
    pub fn mean_velocity(&self) -> NVec3 {
        weighted_mean(&self.velocities, &self.masses)
    }

    pub fn total_momentum(&self) -> NVec3 {
        self.velocities
            .iter()
            .zip(&self.masses)
            .fold(NVec3::zeros(), |p, (v, &m)| p + v * m)
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.velocities
            .iter()
            .zip(&self.masses)
            .map(|(v, &m)| 0.5 * m * v.norm_squared())
            .sum()
    }

    /// Move into the zero-momentum, zero-drift frame: subtract the center of
    /// mass from every position and the mean velocity from every velocity.
    pub fn recenter(&mut self) {
        let com = self.center_of_mass();
        let vcom = self.mean_velocity();
        for x in self.positions.iter_mut() {
            *x -= com;
        }
        for v in self.velocities.iter_mut() {
            *v -= vcom;
        }
    }
}

/// Shared checks for anything built from positions + masses (the tree too).
pub(crate) fn validate_points(positions: &[NVec3], masses: &[f64]) -> Result<(), SimError> {
    if masses.is_empty() {
        return Err(SimError::InvalidParticles("no particles given".into()));
    }
    if positions.len() != masses.len() {
        return Err(SimError::InvalidParticles(format!(
            "{} positions but {} masses",
            positions.len(),
            masses.len()
        )));
    }
    if let Some(i) = positions.iter().position(|x| !is_finite(x)) {
        return Err(SimError::InvalidParticles(format!("position of particle {i} is not finite")));
    }
    if let Some(i) = masses.iter().position(|&m| !(m.is_finite() && m > 0.0)) {
        return Err(SimError::InvalidParticles(format!(
            "mass of particle {i} must be positive, got {}",
            masses[i]
        )));
    }
    Ok(())
}

fn is_finite(v: &NVec3) -> bool {
    v.iter().all(|c| c.is_finite())
}

fn weighted_mean(values: &[NVec3], masses: &[f64]) -> NVec3 {
    let total: f64 = masses.iter().sum();
    if total <= 0.0 {
        return NVec3::zeros();
    }
    let sum = values
        .iter()
        .zip(masses)
        .fold(NVec3::zeros(), |acc, (x, &m)| acc + x * m);
    sum / total
}
