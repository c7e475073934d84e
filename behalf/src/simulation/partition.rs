//! Static domain decomposition of particle indices across workers.

use std::ops::Range;

use crate::error::SimError;

/// Split of `[0, n)` into `w` contiguous chunks, fixed for a whole run.
///
/// The first `n % w` workers own one extra particle, so chunk sizes never
/// differ by more than one. With `n < w` the trailing workers own nothing
/// but still take part in every collective.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    counts: Vec<usize>,
    offsets: Vec<usize>,
    n: usize,
}

impl Partition {
    pub fn new(n: usize, workers: usize) -> Result<Self, SimError> {
        if workers == 0 {
            return Err(SimError::Configuration("worker count must be at least 1".into()));
        }

        let base = n / workers;
        let extra = n % workers;
        let counts: Vec<usize> = (0..workers).map(|w| base + usize::from(w < extra)).collect();

        let mut offsets = Vec::with_capacity(workers);
        let mut acc = 0;
        for c in &counts {
            offsets.push(acc);
            acc += c;
        }

        Ok(Self { counts, offsets, n })
    }

    pub fn workers(&self) -> usize {
        self.counts.len()
    }

    /// Total number of particles partitioned.
    pub fn particles(&self) -> usize {
        self.n
    }

    pub fn len(&self, worker: usize) -> usize {
        self.counts[worker]
    }

    pub fn range(&self, worker: usize) -> Range<usize> {
        let start = self.offsets[worker];
        start..start + self.counts[worker]
    }

    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.workers()).map(|w| self.range(w))
    }

    /// Worker owning particle `index`, if it is in range.
    pub fn owner_of(&self, index: usize) -> Option<usize> {
        if index >= self.n {
            return None;
        }
        // empty chunks only trail, and their offset is n > index
        Some(self.offsets.partition_point(|&o| o <= index) - 1)
    }
}
