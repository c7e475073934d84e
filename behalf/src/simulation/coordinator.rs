//! Lock-step distributed time integration.
//!
//! Every rank runs the same [`Coordinator::step`] phase sequence:
//!
//! 1. build: the aggregator rebuilds the octree from the full arrays
//! 2. broadcast: every rank receives a read-only copy of that tree
//! 3. scatter: positions, then velocities, each rank gets its own slice
//! 4. compute: accelerations and one leapfrog step for the owned slice
//! 5. gather: positions, then velocities, reassembled on the aggregator
//!
//! The aggregator then optionally hands a snapshot to the sink. Between
//! steps the full arrays exist only on the aggregator. A step is committed
//! once both gathers have completed; any failure before that aborts the run.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::info;

use crate::error::SimError;
use crate::simulation::barnes_hut::Octree;
use crate::simulation::forces::Gravity;
use crate::simulation::integrator;
use crate::simulation::params::Parameters;
use crate::simulation::partition::Partition;
use crate::simulation::states::ParticleSet;
use crate::simulation::transport::{ChannelTransport, Transport};
use crate::storage::{Snapshot, SnapshotSink};

/// What a rank does in the protocol, fixed for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Owns the full state, builds the tree, roots every collective.
    Aggregator,
    /// Holds only its owned slice and the broadcast tree.
    Worker,
}

/// One rank's view of a distributed run.
pub struct Coordinator<T: Transport> {
    role: Role,
    aggregator: usize,
    transport: T,
    partition: Partition,
    params: Parameters,
    gravity: Gravity,
    tree: Arc<Octree>, // aggregator's arena, refilled in place when no one else holds it
}

impl<T: Transport> Coordinator<T> {
    pub fn new(
        role: Role,
        aggregator: usize,
        transport: T,
        partition: Partition,
        params: Parameters,
    ) -> Result<Self, SimError> {
        params.validate()?;

        let size = transport.size();
        let rank = transport.rank();
        if partition.workers() != size {
            return Err(SimError::Configuration(format!(
                "partition over {} workers but the transport has {size} ranks",
                partition.workers()
            )));
        }
        if aggregator >= size {
            return Err(SimError::Configuration(format!("aggregator rank {aggregator} outside group of {size}")));
        }
        match (role, rank == aggregator) {
            (Role::Aggregator, false) => {
                return Err(SimError::Configuration(format!(
                    "rank {rank} cannot aggregate: rank {aggregator} is the designated aggregator"
                )))
            }
            (Role::Worker, true) => {
                return Err(SimError::Configuration(format!("rank {rank} is the aggregator, not a worker")))
            }
            _ => {}
        }

        let gravity = params.gravity();
        Ok(Self {
            role,
            aggregator,
            transport,
            partition,
            params,
            gravity,
            tree: Arc::new(Octree::default()),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Run the whole integration.
    ///
    /// The aggregator takes the initial state, recenters and self-starts it,
    /// then runs `n_steps` steps and returns the final state. Workers take
    /// `None` and return `None`.
    pub fn run(
        &mut self,
        initial: Option<ParticleSet>,
        mut sink: Option<&mut dyn SnapshotSink>,
    ) -> Result<Option<ParticleSet>, SimError> {
        let n_steps = self.params.n_steps;

        if self.role == Role::Worker {
            for _ in 0..n_steps {
                self.step(None)?;
            }
            return Ok(None);
        }

        let mut particles = initial
            .ok_or_else(|| SimError::Configuration("the aggregator needs the initial particle state".into()))?;
        self.prepare(&mut particles)?;

        let run_start = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        let t_start = Instant::now();
        info!(
            "Starting integration loop: {} particles, {} steps, {} workers",
            particles.len(),
            n_steps,
            self.partition.workers()
        );

        for i in 0..n_steps {
            self.step(Some(&mut particles))?;
            info!("Iteration {i} complete. {:.1} seconds elapsed.", t_start.elapsed().as_secs_f64());

            if self.params.is_snapshot_step(i) {
                if let Some(sink) = sink.as_deref_mut() {
                    sink.record(&Snapshot {
                        step: i,
                        total_steps: n_steps,
                        workers: self.partition.workers(),
                        run_start,
                        positions: particles.positions.clone(),
                        velocities: particles.velocities.clone(),
                    })?;
                }
            }
        }

        Ok(Some(particles))
    }

    /// Aggregator-only preamble: validate, move to the zero-momentum frame,
    /// and self-start the leapfrog from accelerations at the initial positions.
    pub fn prepare(&mut self, particles: &mut ParticleSet) -> Result<(), SimError> {
        if self.role != Role::Aggregator {
            return Err(SimError::Configuration("only the aggregator prepares the initial state".into()));
        }
        particles.validate()?;
        if particles.len() != self.partition.particles() {
            return Err(SimError::Configuration(format!(
                "{} particles given but the partition covers {}",
                particles.len(),
                self.partition.particles()
            )));
        }

        particles.recenter();

        let tree = self.rebuild_tree(particles)?;
        let accels = self.gravity.accelerations(&tree, 0..particles.len());
        integrator::self_start(&mut particles.positions, &mut particles.velocities, &accels, self.params.dt);
        Ok(())
    }

    /// One lock-step time step. The aggregator passes the full state, which
    /// is replaced by the gathered result; workers pass `None`.
    pub fn step(&mut self, mut state: Option<&mut ParticleSet>) -> Result<(), SimError> {
        let root = self.aggregator;

        let outgoing = match (self.role, state.as_deref()) {
            (Role::Aggregator, Some(particles)) => Some(self.rebuild_tree(particles)?),
            (Role::Aggregator, None) => {
                return Err(SimError::Configuration("the aggregator must step with the full state".into()))
            }
            (Role::Worker, _) => None,
        };
        let tree = self.transport.broadcast_tree(root, outgoing)?;

        let full = state.as_deref();
        let mut positions = self
            .transport
            .scatter(root, full.map(|s| s.positions.as_slice()), &self.partition)?;
        let mut velocities = self
            .transport
            .scatter(root, full.map(|s| s.velocities.as_slice()), &self.partition)?;

        let owned = self.partition.range(self.transport.rank());
        let accels = self.gravity.accelerations(&tree, owned);
        drop(tree);
        integrator::step_slice(&mut positions, &mut velocities, &accels, self.params.dt);

        let positions = self.transport.gather(root, positions, &self.partition)?;
        let velocities = self.transport.gather(root, velocities, &self.partition)?;

        if let (Some(particles), Some(x), Some(v)) = (state.as_deref_mut(), positions, velocities) {
            particles.positions = x;
            particles.velocities = v;
        }
        Ok(())
    }

    fn rebuild_tree(&mut self, particles: &ParticleSet) -> Result<Arc<Octree>, SimError> {
        match Arc::get_mut(&mut self.tree) {
            Some(tree) => tree.rebuild(&particles.positions, &particles.masses)?,
            None => self.tree = Arc::new(Octree::build(&particles.positions, &particles.masses)?),
        }
        Ok(Arc::clone(&self.tree))
    }
}

/// A group of in-process workers connected by [`ChannelTransport`].
///
/// The aggregator runs on the calling thread; every other rank runs on a
/// scoped thread of its own.
#[derive(Debug, Clone)]
pub struct LocalCluster {
    pub workers: usize,
    pub aggregator: usize,
    pub sync_timeout: Option<Duration>,
}

impl LocalCluster {
    pub fn new(workers: usize) -> Self {
        Self { workers, aggregator: 0, sync_timeout: None }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Run a full simulation and return the final state.
    pub fn run(
        &self,
        params: &Parameters,
        particles: ParticleSet,
        sink: Option<&mut dyn SnapshotSink>,
    ) -> Result<ParticleSet, SimError> {
        params.validate()?;
        let partition = Partition::new(particles.len(), self.workers)?;
        let aggregator = self.aggregator;

        let mut hub = None;
        let mut others = Vec::with_capacity(self.workers.saturating_sub(1));
        for transport in ChannelTransport::star(self.workers, aggregator)? {
            let transport = transport.with_timeout(self.sync_timeout);
            if transport.rank() == aggregator {
                hub = Some(transport);
            } else {
                others.push(transport);
            }
        }
        let hub = hub.ok_or_else(|| SimError::Configuration("no endpoint for the aggregator".into()))?;

        thread::scope(|scope| {
            let handles: Vec<_> = others
                .into_iter()
                .map(|transport| {
                    let partition = partition.clone();
                    let params = params.clone();
                    scope.spawn(move || -> Result<(), SimError> {
                        let mut worker = Coordinator::new(Role::Worker, aggregator, transport, partition, params)?;
                        worker.run(None, None).map(|_| ())
                    })
                })
                .collect();

            // the aggregator's endpoint is dropped when this returns, so
            // workers still waiting on it fail instead of hanging
            let result = Coordinator::new(Role::Aggregator, aggregator, hub, partition.clone(), params.clone())
                .and_then(|mut agg| agg.run(Some(particles), sink));

            let mut worker_err = None;
            for handle in handles {
                let outcome = handle
                    .join()
                    .unwrap_or_else(|_| Err(SimError::Synchronization("a worker thread panicked".into())));
                if let Err(e) = outcome {
                    worker_err.get_or_insert(e);
                }
            }

            match (result?, worker_err) {
                (_, Some(e)) => Err(e),
                (Some(particles), None) => Ok(particles),
                (None, None) => Err(SimError::Configuration("the aggregator returned no state".into())),
            }
        })
    }
}

/// Run a simulation over `workers` in-process workers with rank 0 aggregating.
pub fn run_local(
    params: &Parameters,
    particles: ParticleSet,
    workers: usize,
    sink: Option<&mut dyn SnapshotSink>,
) -> Result<ParticleSet, SimError> {
    LocalCluster::new(workers).run(params, particles, sink)
}
