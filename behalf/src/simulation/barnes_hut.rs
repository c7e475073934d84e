//! # Barnes–Hut Octree (3D)
//!
//! Hierarchical summary of a mass distribution, used by
//! [`Gravity`](crate::simulation::forces::Gravity) to replace the `O(N²)`
//! all-pairs force sum with an approximate `O(N log N)` walk.
//!
//! ## Layout
//!
//! - The simulation region is a cube (the minimal cube enclosing all
//!   particles, or a fixed region given by the caller).
//! - Each node covers one cubic region and has up to 8 children, one per
//!   octant, created lazily as particles are inserted.
//! - Nodes live in a single arena (`Vec<OctreeNode>`) and refer to their
//!   children by index, so a whole tree can be cleared and refilled every
//!   step without freeing node by node.
//! - Each node stores:
//!   - total mass of its subtree
//!   - center of mass (COM), exact for the subtree
//!   - bounding box
//!   - the body it holds if it is a leaf
//!
//! The tree also keeps the positions and masses it was built from, so a
//! worker that only received the tree can still evaluate the acceleration of
//! any particle index against it.
//!
//! ## Coincident particles
//!
//! Two particles at (numerically) the same position would be split forever.
//! Subdivision stops at [`MAX_DEPTH`]; beyond it, further particles are
//! appended to the leaf's `colocated` list and the leaf acts as a single
//! combined point mass. This is an approximation, not an error.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::simulation::states::{validate_points, NVec3};

/// Depth below which no further subdivision happens.
pub const MAX_DEPTH: u32 = 48;

/// Axis-aligned region covered by a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: NVec3,
    pub max: NVec3,
}

impl Bounds {
    pub fn new(min: NVec3, max: NVec3) -> Self {
        Self { min, max }
    }

    /// Compute a cubic bounding box that encloses every position.
    ///
    /// Finds the axis-aligned min and max along each coordinate, then expands
    /// the box about its center to the largest half-extent over x/y/z. Using
    /// a cube keeps the node "size" in the opening criterion well-defined.
    pub fn enclosing(positions: &[NVec3]) -> Self {
        let mut min = NVec3::repeat(f64::INFINITY);
        let mut max = NVec3::repeat(f64::NEG_INFINITY);

        for x in positions {
            min = min.inf(x);
            max = max.sup(x);
        }

        let center = (min + max) * 0.5;
        let half = (max - min) * 0.5;
        let max_half = half.x.max(half.y).max(half.z);
        let half = NVec3::repeat(max_half);

        Self { min: center - half, max: center + half }
    }

    pub fn center(&self) -> NVec3 {
        (self.min + self.max) * 0.5
    }

    /// Characteristic size: the longest side of the box.
    pub fn size(&self) -> f64 {
        let side = self.max - self.min;
        side.x.max(side.y).max(side.z)
    }

    /// Closed-interval containment test on every axis.
    pub fn contains(&self, p: &NVec3) -> bool {
        (0..3).all(|k| p[k] >= self.min[k] && p[k] <= self.max[k])
    }

    /// Octant index of a point within this box.
    ///
    /// The index is encoded using 3 bits:
    ///
    /// - Bit 0 (value 1): X axis, 1 when x >= center.x
    /// - Bit 1 (value 2): Y axis, 1 when y >= center.y
    /// - Bit 2 (value 4): Z axis, 1 when z >= center.z
    ///
    /// This encoding matches the layout of `children[0..8]`.
    pub fn octant(&self, p: &NVec3) -> usize {
        let center = self.center();
        let mut idx = 0;

        if p.x >= center.x { idx |= 1; }
        if p.y >= center.y { idx |= 2; }
        if p.z >= center.z { idx |= 4; }

        idx
    }

    /// Box of child octant `idx`, split at this box's center on each axis.
    pub fn child(&self, idx: usize) -> Self {
        let center = self.center();
        let mut min = self.min;
        let mut max = self.max;

        for k in 0..3 {
            if idx & (1 << k) == 0 {
                max[k] = center[k];
            } else {
                min[k] = center[k];
            }
        }

        Self { min, max }
    }
}

/// A single octree node.
///
/// Each node represents a cubic region of space that may contain:
/// - zero bodies (empty)
/// - one body (leaf, `body_index = Some(i)`), plus any bodies co-located
///   with it once the depth cap is reached
/// - children (internal node, `body_index = None`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OctreeNode {
    pub mass: f64,
    pub com: NVec3,
    pub bounds: Bounds,
    pub depth: u32,
    pub children: [Option<usize>; 8], // indices into Octree::nodes
    pub body_index: Option<usize>,    // Some(i) if this leaf holds body i
    pub colocated: Vec<usize>,        // extra bodies merged at MAX_DEPTH
}

impl OctreeNode {
    fn new(bounds: Bounds, depth: u32) -> Self {
        Self {
            mass: 0.0,
            com: NVec3::zeros(),
            bounds,
            depth,
            children: [None; 8],
            body_index: None,
            colocated: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.iter().all(|c| c.is_none())
    }

    pub fn is_empty(&self) -> bool {
        self.is_leaf() && self.body_index.is_none()
    }

    /// Whether body `i` is held directly by this node.
    pub fn holds(&self, i: usize) -> bool {
        self.body_index == Some(i) || self.colocated.contains(&i)
    }

    /// Iterate the bodies held directly by this node.
    pub fn bodies(&self) -> impl Iterator<Item = usize> + '_ {
        self.body_index.into_iter().chain(self.colocated.iter().copied())
    }
}

/// A complete octree built over one step's positions and masses.
///
/// Immutable once built: queries take `&self`, and the next step either
/// builds a new tree or calls [`Octree::rebuild`] to refill this arena.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Octree {
    nodes: Vec<OctreeNode>,
    root: usize,
    positions: Vec<NVec3>,
    masses: Vec<f64>,
    colocated: usize,
}

impl Octree {
    /// Build an octree over the minimal cube enclosing `positions`.
    ///
    /// This:
    /// 1. Validates the input (N >= 1, finite positions, positive masses).
    /// 2. Creates a root node covering the enclosing cube.
    /// 3. Inserts each body, subdividing leaves as needed.
    /// 4. Computes total mass and center of mass for every node, bottom-up.
    pub fn build(positions: &[NVec3], masses: &[f64]) -> Result<Self, SimError> {
        let mut tree = Self::default();
        tree.rebuild(positions, masses)?;
        Ok(tree)
    }

    /// Build an octree over a fixed region. Every position must lie inside it.
    pub fn build_in(positions: &[NVec3], masses: &[f64], bounds: Bounds) -> Result<Self, SimError> {
        validate_points(positions, masses)?;
        if let Some(i) = positions.iter().position(|x| !bounds.contains(x)) {
            return Err(SimError::InvalidParticles(format!(
                "particle {i} at {:?} lies outside the tree region",
                positions[i]
            )));
        }
        let mut tree = Self::default();
        tree.fill(positions, masses, bounds);
        Ok(tree)
    }

    /// Refill this tree from scratch, reusing the arena's allocation.
    pub fn rebuild(&mut self, positions: &[NVec3], masses: &[f64]) -> Result<(), SimError> {
        validate_points(positions, masses)?;
        self.fill(positions, masses, Bounds::enclosing(positions));
        Ok(())
    }

    fn fill(&mut self, positions: &[NVec3], masses: &[f64], bounds: Bounds) {
        self.nodes.clear();
        self.positions.clear();
        self.positions.extend_from_slice(positions);
        self.masses.clear();
        self.masses.extend_from_slice(masses);
        self.colocated = 0;

        self.root = 0;
        self.nodes.push(OctreeNode::new(bounds, 0));

        for i in 0..positions.len() {
            self.insert_body(self.root, i);
        }

        self.compute_mass_and_com(self.root);

        if self.colocated > 0 {
            debug!("{} particle(s) co-located at the depth cap", self.colocated);
        }
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn node(&self, idx: usize) -> &OctreeNode {
        &self.nodes[idx]
    }

    pub fn nodes(&self) -> &[OctreeNode] {
        &self.nodes
    }

    /// Number of particles in the tree.
    pub fn len(&self) -> usize {
        self.masses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masses.is_empty()
    }

    pub fn position(&self, i: usize) -> NVec3 {
        self.positions[i]
    }

    pub fn mass(&self, i: usize) -> f64 {
        self.masses[i]
    }

    pub fn bounds(&self) -> Bounds {
        self.nodes[self.root].bounds
    }

    /// Total mass held by the tree (the root's aggregate).
    pub fn aggregate_mass(&self) -> f64 {
        self.nodes[self.root].mass
    }

    pub fn center_of_mass(&self) -> NVec3 {
        self.nodes[self.root].com
    }

    /// How many particles were merged into an existing leaf at the depth cap.
    pub fn colocated(&self) -> usize {
        self.colocated
    }

    // helpers ==============================================================================

    /// Insert body `body_idx` into the subtree rooted at `node_idx`.
    ///
    /// - If the node is an empty leaf, it stores the body.
    /// - If the node is a leaf at [`MAX_DEPTH`], the body joins its
    ///   co-located list.
    /// - If the node is a leaf holding another body, that body is pushed one
    ///   level down first, turning the node into an internal node.
    /// - An internal node forwards the body into the child octant that
    ///   contains its position.
    fn insert_body(&mut self, node_idx: usize, body_idx: usize) {
        let node = &self.nodes[node_idx];
        let is_leaf = node.is_leaf();
        let existing = node.body_index;
        let depth = node.depth;

        if is_leaf {
            match existing {
                None => {
                    self.nodes[node_idx].body_index = Some(body_idx);
                    return;
                }
                Some(_) if depth >= MAX_DEPTH => {
                    self.nodes[node_idx].colocated.push(body_idx);
                    self.colocated += 1;
                    return;
                }
                Some(existing_idx) => {
                    // leaf becomes internal: move its body one level down
                    self.nodes[node_idx].body_index = None;
                    self.descend(node_idx, existing_idx);
                }
            }
        }

        self.descend(node_idx, body_idx);
    }

    /// Insert into the child octant of `node_idx` containing the body,
    /// creating that child if it does not exist yet.
    fn descend(&mut self, node_idx: usize, body_idx: usize) {
        let pos = self.positions[body_idx];
        let bounds = self.nodes[node_idx].bounds;
        let octant = bounds.octant(&pos);

        let child_idx = match self.nodes[node_idx].children[octant] {
            Some(idx) => idx,
            None => {
                let depth = self.nodes[node_idx].depth + 1;
                let new_idx = self.nodes.len();
                self.nodes.push(OctreeNode::new(bounds.child(octant), depth));
                self.nodes[node_idx].children[octant] = Some(new_idx);
                new_idx
            }
        };

        self.insert_body(child_idx, body_idx);
    }

    /// Recursively compute total mass and center of mass for a subtree.
    ///
    /// A leaf aggregates the bodies it holds; an internal node combines its
    /// non-empty children, mass-weighted. Children are finished before their
    /// parent reads them (post-order).
    fn compute_mass_and_com(&mut self, node_idx: usize) {
        let mut mass = 0.0;
        let mut weighted = NVec3::zeros();

        let children = self.nodes[node_idx].children;

        for b in self.nodes[node_idx].bodies() {
            mass += self.masses[b];
            weighted += self.positions[b] * self.masses[b];
        }

        for child_idx in children.iter().flatten().copied() {
            self.compute_mass_and_com(child_idx);
            let cn = &self.nodes[child_idx];
            if cn.mass > 0.0 {
                mass += cn.mass;
                weighted += cn.com * cn.mass;
            }
        }

        let node = &mut self.nodes[node_idx];
        node.mass = mass;
        node.com = if mass > 0.0 { weighted / mass } else { NVec3::zeros() };
    }
}
