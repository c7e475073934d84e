//! Plummer-sphere initial conditions
//!
//! Positions come from inverting the Plummer cumulative mass profile;
//! speeds use the Aarseth, Hénon & Wielen (1974) rejection sampler for the
//! isotropic distribution function. Runs are reproducible from the seed.

use std::f64::consts::PI;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::SimError;
use crate::simulation::states::{NVec3, ParticleSet};

/// Radii are drawn from the inner 99.9% of the mass; the last sliver sits
/// at unbounded radius.
const MAX_MASS_FRACTION: f64 = 0.999;

/// Sample `n` equal-mass particles (mass `m` each) from a Plummer sphere of
/// scale radius `a`, in virial equilibrium under gravitational constant `g`.
///
/// The result is not recentered; the coordinator does that before the first
/// step.
pub fn plummer(n: usize, a: f64, m: f64, g: f64, seed: u64) -> Result<ParticleSet, SimError> {
    if n == 0 {
        return Err(SimError::Configuration("Plummer sphere needs at least one particle".into()));
    }
    if !(a.is_finite() && a > 0.0) {
        return Err(SimError::Configuration(format!("scale radius must be positive, got {a}")));
    }
    if !(m.is_finite() && m > 0.0) {
        return Err(SimError::Configuration(format!("particle mass must be positive, got {m}")));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let total_mass = m * n as f64;
    let v_scale = (g * total_mass / a).sqrt();

    let mut positions = Vec::with_capacity(n);
    let mut velocities = Vec::with_capacity(n);

    for _ in 0..n {
        let u: f64 = rng.gen_range(0.0..MAX_MASS_FRACTION);
        let r = a / (u.powf(-2.0 / 3.0) - 1.0).sqrt();
        positions.push(r * random_direction(&mut rng));

        let q = sample_speed_fraction(&mut rng);
        let v_esc = (2.0_f64).sqrt() * v_scale * (1.0 + r * r / (a * a)).powf(-0.25);
        velocities.push(q * v_esc * random_direction(&mut rng));
    }

    ParticleSet::new(positions, velocities, vec![m; n])
}

/// Uniform point on the unit sphere.
fn random_direction<R: Rng>(rng: &mut R) -> NVec3 {
    let cos_theta: f64 = rng.gen_range(-1.0..=1.0);
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let phi: f64 = rng.gen_range(0.0..2.0 * PI);
    NVec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

/// Fraction `q = v / v_esc`, distributed as `q^2 (1 - q^2)^(7/2)` on [0, 1].
fn sample_speed_fraction<R: Rng>(rng: &mut R) -> f64 {
    // max of the density is ~0.092 (at q^2 = 2/9)
    loop {
        let q: f64 = rng.gen();
        let y: f64 = rng.gen_range(0.0..0.1);
        if y < q * q * (1.0 - q * q).powf(3.5) {
            return q;
        }
    }
}
