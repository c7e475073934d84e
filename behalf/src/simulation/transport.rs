//! Collective communication between cooperating workers.
//!
//! The coordinator only needs three rooted collectives: broadcast the tree,
//! scatter an array's per-worker slices, and gather them back. [`Transport`]
//! captures exactly that, so the same step loop can run over in-process
//! channels or any out-of-process mechanism implementing the trait.
//!
//! Every collective is blocking and must be called by all ranks in the same
//! order; a peer that disappears turns into [`SimError::Synchronization`].

use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use crate::error::SimError;
use crate::simulation::barnes_hut::Octree;
use crate::simulation::partition::Partition;
use crate::simulation::states::NVec3;

/// Rooted collective operations over a fixed group of ranks.
pub trait Transport: Send {
    /// This endpoint's rank in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Root passes `Some(tree)`; every rank returns the root's tree.
    fn broadcast_tree(&mut self, root: usize, tree: Option<Arc<Octree>>) -> Result<Arc<Octree>, SimError>;

    /// Root passes the full array; every rank returns its own slice of it.
    fn scatter(&mut self, root: usize, full: Option<&[NVec3]>, partition: &Partition) -> Result<Vec<NVec3>, SimError>;

    /// Every rank passes its slice; the root returns the reassembled array.
    fn gather(&mut self, root: usize, local: Vec<NVec3>, partition: &Partition) -> Result<Option<Vec<NVec3>>, SimError>;
}

enum Message {
    Tree(Arc<Octree>),
    Slice(Vec<NVec3>),
}

impl Message {
    fn kind(&self) -> &'static str {
        match self {
            Message::Tree(_) => "tree",
            Message::Slice(_) => "slice",
        }
    }
}

/// One direction pair between the hub and a peer.
struct Link {
    tx: Sender<Message>,
    rx: Receiver<Message>,
}

/// In-process transport over `std::sync::mpsc` channels.
///
/// Ranks form a star around the hub: the hub has a dedicated channel pair
/// to every other rank, and the others only talk to the hub. Each pair is
/// FIFO and every rank issues collectives in the same order, so messages
/// never need to be matched by tag.
pub struct ChannelTransport {
    rank: usize,
    size: usize,
    hub: usize,
    links: Vec<Option<Link>>,
    timeout: Option<Duration>,
}

impl ChannelTransport {
    /// Create the `size` connected endpoints of a star centred on `hub`.
    /// Endpoint `k` of the returned vector has rank `k`.
    pub fn star(size: usize, hub: usize) -> Result<Vec<Self>, SimError> {
        if size == 0 {
            return Err(SimError::Configuration("transport group must have at least one rank".into()));
        }
        if hub >= size {
            return Err(SimError::Configuration(format!("hub rank {hub} outside group of {size}")));
        }

        let mut endpoints: Vec<Self> = (0..size)
            .map(|rank| Self {
                rank,
                size,
                hub,
                links: (0..size).map(|_| None).collect(),
                timeout: None,
            })
            .collect();

        for peer in (0..size).filter(|&p| p != hub) {
            let (to_peer, from_hub) = channel();
            let (to_hub, from_peer) = channel();
            endpoints[hub].links[peer] = Some(Link { tx: to_peer, rx: from_peer });
            endpoints[peer].links[hub] = Some(Link { tx: to_hub, rx: from_hub });
        }

        Ok(endpoints)
    }

    /// Fail a receive that waits longer than `timeout`. `None` blocks forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn hub(&self) -> usize {
        self.hub
    }

    fn link(&self, peer: usize) -> Result<&Link, SimError> {
        self.links
            .get(peer)
            .and_then(Option::as_ref)
            .ok_or_else(|| SimError::Synchronization(format!("rank {} has no link to rank {peer}", self.rank)))
    }

    fn send(&self, peer: usize, msg: Message) -> Result<(), SimError> {
        self.link(peer)?
            .tx
            .send(msg)
            .map_err(|_| SimError::Synchronization(format!("rank {peer} is no longer receiving")))
    }

    fn recv(&self, peer: usize) -> Result<Message, SimError> {
        let rx = &self.link(peer)?.rx;
        match self.timeout {
            None => rx
                .recv()
                .map_err(|_| SimError::Synchronization(format!("rank {peer} disconnected"))),
            Some(t) => rx.recv_timeout(t).map_err(|e| match e {
                RecvTimeoutError::Timeout => {
                    SimError::Synchronization(format!("rank {peer} did not respond within {t:?}"))
                }
                RecvTimeoutError::Disconnected => SimError::Synchronization(format!("rank {peer} disconnected")),
            }),
        }
    }

    fn recv_slice(&self, peer: usize, expected: usize) -> Result<Vec<NVec3>, SimError> {
        match self.recv(peer)? {
            Message::Slice(data) if data.len() == expected => Ok(data),
            Message::Slice(data) => Err(SimError::Synchronization(format!(
                "rank {peer} sent {} elements, expected {expected}",
                data.len()
            ))),
            other => Err(SimError::Synchronization(format!(
                "expected a slice from rank {peer}, got a {}",
                other.kind()
            ))),
        }
    }

    fn check(&self, root: usize, partition: &Partition) -> Result<(), SimError> {
        if root != self.hub {
            return Err(SimError::Configuration(format!(
                "collective rooted at {root}, but this transport routes through rank {}",
                self.hub
            )));
        }
        if partition.workers() != self.size {
            return Err(SimError::Configuration(format!(
                "partition over {} workers used with a group of {}",
                partition.workers(),
                self.size
            )));
        }
        Ok(())
    }

    fn peers(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.size).filter(move |&p| p != self.rank)
    }
}

impl Transport for ChannelTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn broadcast_tree(&mut self, root: usize, tree: Option<Arc<Octree>>) -> Result<Arc<Octree>, SimError> {
        if root != self.hub {
            return Err(SimError::Configuration(format!("broadcast rooted at {root}, hub is {}", self.hub)));
        }

        if self.rank == root {
            let tree = tree.ok_or_else(|| SimError::Configuration("root must supply the tree".into()))?;
            for peer in self.peers() {
                self.send(peer, Message::Tree(Arc::clone(&tree)))?;
            }
            return Ok(tree);
        }

        match self.recv(root)? {
            Message::Tree(tree) => Ok(tree),
            other => Err(SimError::Synchronization(format!(
                "expected the tree from rank {root}, got a {}",
                other.kind()
            ))),
        }
    }

    fn scatter(&mut self, root: usize, full: Option<&[NVec3]>, partition: &Partition) -> Result<Vec<NVec3>, SimError> {
        self.check(root, partition)?;

        if self.rank != root {
            return self.recv_slice(root, partition.len(self.rank));
        }

        let full = full.ok_or_else(|| SimError::Configuration("root must supply the array to scatter".into()))?;
        if full.len() != partition.particles() {
            return Err(SimError::Configuration(format!(
                "scatter of {} elements over a partition of {}",
                full.len(),
                partition.particles()
            )));
        }

        for peer in self.peers() {
            self.send(peer, Message::Slice(full[partition.range(peer)].to_vec()))?;
        }
        Ok(full[partition.range(root)].to_vec())
    }

    fn gather(&mut self, root: usize, local: Vec<NVec3>, partition: &Partition) -> Result<Option<Vec<NVec3>>, SimError> {
        self.check(root, partition)?;

        if local.len() != partition.len(self.rank) {
            return Err(SimError::Configuration(format!(
                "rank {} gathers {} elements but owns {}",
                self.rank,
                local.len(),
                partition.len(self.rank)
            )));
        }

        if self.rank != root {
            self.send(root, Message::Slice(local))?;
            return Ok(None);
        }

        let mut full = vec![NVec3::zeros(); partition.particles()];
        full[partition.range(root)].copy_from_slice(&local);
        for peer in self.peers() {
            let data = self.recv_slice(peer, partition.len(peer))?;
            full[partition.range(peer)].copy_from_slice(&data);
        }
        Ok(Some(full))
    }
}
