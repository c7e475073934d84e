use behalf::logging::{self, info};
use behalf::{bench_gravity, bench_workers, plummer, total_energy, LocalCluster, RunConfig, SnapshotDir, SnapshotSink};

use anyhow::{Context, Result};
use clap::Parser;

use std::path::PathBuf;

/// Energy is an O(N^2) sum; skip it for runs larger than this
const ENERGY_LOG_LIMIT: usize = 20_000;

/// Distributed Barnes-Hut simulation of a Plummer sphere.
///
/// Units: length in kpc, time in Myr, mass in 10^9 M_sun.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// YAML run configuration; flags below override its values
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Name of the run (results directory)
    #[arg(long)]
    run_name: Option<String>,

    /// Number of particles
    #[arg(long)]
    n_parts: Option<usize>,

    /// Total mass of the system (in 10^9 M_sun)
    #[arg(long)]
    total_mass: Option<f64>,

    /// Scale radius (in kpc)
    #[arg(long)]
    radius: Option<f64>,

    /// Number of time steps
    #[arg(long)]
    n_steps: Option<usize>,

    /// Size of time step (in Myr)
    #[arg(long)]
    dt: Option<f64>,

    /// Softening length (in kpc)
    #[arg(long)]
    softening: Option<f64>,

    /// Opening angle
    #[arg(long)]
    theta: Option<f64>,

    /// How often to save output results (in steps)
    #[arg(long)]
    save_every: Option<usize>,

    /// Random seed for the initial conditions
    #[arg(long)]
    rand_seed: Option<u64>,

    /// Number of cooperating workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Overwrite results of a previous run with the same name
    #[arg(long)]
    clobber: bool,

    /// Print per-step diagnostics
    #[arg(short, long)]
    verbose: bool,

    /// Run the timing benchmarks instead of a simulation
    #[arg(long)]
    bench: bool,
}

// defaults, then the file, then flags
fn resolve_config(args: &Args) -> Result<RunConfig> {
    let mut cfg = match &args.config {
        Some(path) => RunConfig::load(path).with_context(|| format!("failed to load {}", path.display()))?,
        None => RunConfig::default(),
    };

    if let Some(v) = &args.run_name { cfg.run_name = v.clone(); }
    if let Some(v) = args.n_parts { cfg.n_parts = v; }
    if let Some(v) = args.total_mass { cfg.total_mass = v; }
    if let Some(v) = args.radius { cfg.radius = v; }
    if let Some(v) = args.n_steps { cfg.n_steps = v; }
    if let Some(v) = args.dt { cfg.dt = v; }
    if let Some(v) = args.softening { cfg.softening = v; }
    if let Some(v) = args.theta { cfg.theta = v; }
    if let Some(v) = args.save_every { cfg.save_every = v; }
    if let Some(v) = args.rand_seed { cfg.seed = v; }
    if let Some(v) = args.workers { cfg.workers = v; }

    Ok(cfg)
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    if args.bench {
        bench_gravity()?;
        bench_workers()?;
        return Ok(());
    }

    let cfg = resolve_config(&args)?;
    cfg.validate()?;

    // refuse to touch an existing run before allocating anything
    let mut sink = SnapshotDir::prepare(&cfg.run_name, args.clobber)?;

    let particles = plummer(cfg.n_parts, cfg.radius, cfg.particle_mass(), cfg.g, cfg.seed)?;
    let params = cfg.parameters();
    let log_energy = args.verbose && cfg.n_parts <= ENERGY_LOG_LIMIT;

    if log_energy {
        let mut centered = particles.clone();
        centered.recenter();
        info!("Initial energy: {:.6e}", total_energy(&centered, params.g, params.softening));
    }

    let cluster = LocalCluster::new(cfg.workers).with_timeout(cfg.sync_timeout());
    let result = cluster.run(&params, particles, Some(&mut sink as &mut dyn SnapshotSink))?;

    if log_energy {
        info!("Final energy: {:.6e}", total_energy(&result, params.g, params.softening));
    }
    info!("Results written to {}", sink.dir().display());

    Ok(())
}
