pub mod simulation;
pub mod configuration;
pub mod storage;
pub mod logging;
pub mod benchmark;
pub mod error;

pub use error::SimError;

pub use simulation::states::{NVec3, ParticleSet};
pub use simulation::params::Parameters;
pub use simulation::barnes_hut::{Bounds, Octree, OctreeNode, MAX_DEPTH};
pub use simulation::forces::{direct_accelerations, potential_energy, softened_accel, total_energy, Gravity};
pub use simulation::integrator::{self_start, step, step_slice};
pub use simulation::partition::Partition;
pub use simulation::transport::{ChannelTransport, Transport};
pub use simulation::coordinator::{run_local, Coordinator, LocalCluster, Role};
pub use simulation::initial_conditions::plummer;

pub use configuration::config::{RunConfig, GRAV_CONST};

pub use storage::{load_snapshot, MemorySink, Snapshot, SnapshotDir, SnapshotSink};

pub use benchmark::benchmark::{bench_gravity, bench_workers};
