//! Snapshot persistence.
//!
//! The coordinator hands every recorded step to a [`SnapshotSink`]. The
//! on-disk sink writes one bincode file per step into a run directory.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::simulation::states::NVec3;

/// Full state of one gathered step plus run metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub step: usize,
    pub total_steps: usize,
    pub workers: usize,
    pub run_start: f64, // seconds since the Unix epoch
    pub positions: Vec<NVec3>,
    pub velocities: Vec<NVec3>,
}

/// Receiver for snapshots produced on the aggregator.
pub trait SnapshotSink {
    fn record(&mut self, snapshot: &Snapshot) -> Result<(), SimError>;
}

/// Keeps every snapshot in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub snapshots: Vec<Snapshot>,
}

impl SnapshotSink for MemorySink {
    fn record(&mut self, snapshot: &Snapshot) -> Result<(), SimError> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }
}

/// Writes `step_{i}.dat` files into a run directory.
#[derive(Debug, Clone)]
pub struct SnapshotDir {
    dir: PathBuf,
}

impl SnapshotDir {
    /// Claim `dir` for a new run.
    ///
    /// Fails with [`SimError::Precondition`] if the directory already holds
    /// anything and `clobber` is false; otherwise creates it.
    pub fn prepare(dir: impl Into<PathBuf>, clobber: bool) -> Result<Self, SimError> {
        let dir = dir.into();
        if dir.exists() && !clobber && fs::read_dir(&dir)?.next().is_some() {
            return Err(SimError::Precondition(format!(
                "{} already contains results; pass --clobber to overwrite",
                dir.display()
            )));
        }
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, step: usize) -> PathBuf {
        self.dir.join(format!("step_{step}.dat"))
    }
}

impl SnapshotSink for SnapshotDir {
    fn record(&mut self, snapshot: &Snapshot) -> Result<(), SimError> {
        let path = self.path_for(snapshot.step);
        let data = bincode::serialize(snapshot)?;
        fs::write(&path, data)?;
        debug!("wrote {}", path.display());
        Ok(())
    }
}

/// Load a snapshot written by [`SnapshotDir`].
pub fn load_snapshot(path: &Path) -> Result<Snapshot, SimError> {
    let data = fs::read(path)?;
    Ok(bincode::deserialize(&data)?)
}
