//! Timing runs for the force evaluation and the distributed step loop.
//!
//! Output is plain CSV on stdout so it can be pasted into a spreadsheet.

use std::hint::black_box;
use std::time::Instant;

use crate::error::SimError;
use crate::simulation::barnes_hut::Octree;
use crate::simulation::coordinator::run_local;
use crate::simulation::forces::{direct_accelerations, Gravity};
use crate::simulation::initial_conditions::plummer;
use crate::simulation::params::Parameters;
use crate::simulation::states::ParticleSet;

const G: f64 = 1.0;
const SOFTENING: f64 = 1e-2;

fn make_particles(n: usize) -> Result<ParticleSet, SimError> {
    plummer(n, 1.0, 1.0 / n as f64, G, 42)
}

fn make_params(n_steps: usize) -> Parameters {
    Parameters {
        dt: 1e-3,
        n_steps,
        g: G,
        theta: 0.5,
        softening: SOFTENING,
        save_every: n_steps,
    }
}

/// Direct summation against tree build + walk for growing N.
pub fn bench_gravity() -> Result<(), SimError> {
    println!("N,direct_ms,build_ms,walk_ms");

    for n in [200, 400, 800, 1600, 3200, 6400] {
        let particles = make_particles(n)?;
        let gravity = Gravity::new(G, 0.5, SOFTENING);

        let t0 = Instant::now();
        black_box(direct_accelerations(&particles.positions, &particles.masses, G, SOFTENING));
        let ms_direct = t0.elapsed().as_secs_f64() * 1000.0;

        let t1 = Instant::now();
        let tree = Octree::build(&particles.positions, &particles.masses)?;
        let ms_build = t1.elapsed().as_secs_f64() * 1000.0;

        let t2 = Instant::now();
        black_box(gravity.accelerations(&tree, 0..n));
        let ms_walk = t2.elapsed().as_secs_f64() * 1000.0;

        println!("{n},{ms_direct:.3},{ms_build:.3},{ms_walk:.3}");
    }
    Ok(())
}

/// Fixed-size run over a growing number of in-process workers.
pub fn bench_workers() -> Result<(), SimError> {
    let n = 4000;
    let steps = 10;
    let max_workers = num_cpus::get().max(1);
    let params = make_params(steps);

    println!("workers,ms_per_step");

    let mut w = 1;
    while w <= max_workers {
        let particles = make_particles(n)?;
        let t0 = Instant::now();
        run_local(&params, particles, w, None)?;
        let ms = t0.elapsed().as_secs_f64() * 1000.0 / steps as f64;
        println!("{w},{ms:.3}");
        w *= 2;
    }
    Ok(())
}
