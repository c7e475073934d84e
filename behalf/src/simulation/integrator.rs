//! Fixed-step leapfrog integrator
//!
//! One step is a full kick followed by a full drift:
//! `v_{n+1/2} = v_{n-1/2} + dt a_n`, then `x_{n+1} = x_n + dt v_{n+1/2}`.
//! Velocities therefore live half a step behind positions, which is what
//! [`self_start`] sets up once at the beginning of a run.

use crate::simulation::states::NVec3;

/// Kick: `v + dt a`
pub fn kick(velocity: NVec3, acceleration: NVec3, dt: f64) -> NVec3 {
    velocity + dt * acceleration
}

/// Drift: `x + dt v`
pub fn drift(position: NVec3, velocity: NVec3, dt: f64) -> NVec3 {
    position + dt * velocity
}

/// Advance one particle: kick the velocity, then drift with the new velocity.
pub fn step(position: NVec3, velocity: NVec3, acceleration: NVec3, dt: f64) -> (NVec3, NVec3) {
    let v = kick(velocity, acceleration, dt);
    (drift(position, v, dt), v)
}

/// Apply [`step`] in place across an owned slice.
pub fn step_slice(positions: &mut [NVec3], velocities: &mut [NVec3], accels: &[NVec3], dt: f64) {
    debug_assert_eq!(positions.len(), velocities.len());
    debug_assert_eq!(positions.len(), accels.len());

    for ((x, v), a) in positions.iter_mut().zip(velocities.iter_mut()).zip(accels) {
        (*x, *v) = step(*x, *v, *a, dt);
    }
}

/// Self-start the leapfrog from a synchronized `(x_0, v_0)` pair.
///
/// `accels` must be computed from `x_0`. Half kick to `v_{1/2}`, then a full
/// drift with that velocity to `x_1`. Every later step is a plain [`step`].
pub fn self_start(positions: &mut [NVec3], velocities: &mut [NVec3], accels: &[NVec3], dt: f64) {
    let half_dt = 0.5 * dt;

    for (v, a) in velocities.iter_mut().zip(accels) {
        *v = kick(*v, *a, half_dt);
    }

    for (x, v) in positions.iter_mut().zip(velocities.iter()) {
        *x = drift(*x, *v, dt);
    }
}
