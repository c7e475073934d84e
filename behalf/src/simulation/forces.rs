//! Gravitational acceleration for the n-body engine
//!
//! [`Gravity`] walks a [`Octree`] under the Barnes–Hut opening-angle
//! criterion. The direct `O(N²)` sums below it are the exact reference used
//! for diagnostics (energy) and for checking the tree walk.

use std::ops::Range;

use rayon::prelude::*;

use crate::simulation::barnes_hut::Octree;
use crate::simulation::states::{NVec3, ParticleSet};

/// Softened Newtonian gravity evaluated via a Barnes–Hut octree.
///
/// `theta` trades accuracy for speed: a node of size `s` at distance `d` is
/// treated as a single point mass when `s / d < theta`. `theta = 0` always
/// opens nodes down to the leaves, which is exact direct summation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gravity {
    pub g: f64,         // gravitational constant
    pub theta: f64,     // opening angle
    pub softening: f64, // softening length (not squared)
}

impl Gravity {
    pub fn new(g: f64, theta: f64, softening: f64) -> Self {
        Self { g, theta, softening }
    }

    /// Acceleration of a unit mass at `r` away from a point of mass `m`.
    ///
    /// `G m r / (|r|^2 + eps^2)^(3/2)`; zero at exactly zero separation with
    /// no softening.
    pub fn pair(&self, r: NVec3, m: f64) -> NVec3 {
        softened_accel(r, m, self.g, self.softening)
    }

    /// Net acceleration on tree particle `index`.
    ///
    /// Purely a function of the tree snapshot: the position comes from the
    /// tree, and the particle's own leaf is skipped (no self-force).
    pub fn acceleration(&self, tree: &Octree, index: usize) -> NVec3 {
        let pos_i = tree.position(index);
        let mut acc = NVec3::zeros();
        self.traverse_node(tree, tree.root(), index, pos_i, &mut acc);
        acc
    }

    /// Accelerations for a contiguous range of particle indices, in order.
    pub fn accelerations(&self, tree: &Octree, ids: Range<usize>) -> Vec<NVec3> {
        ids.into_par_iter().map(|i| self.acceleration(tree, i)).collect()
    }

    /// Recursively accumulate the acceleration on `body_idx` from one subtree.
    ///
    /// - Empty nodes contribute nothing.
    /// - A leaf holding the target is skipped; any other leaf contributes its
    ///   aggregate mass at its center of mass.
    /// - An internal node that does not contain the target and satisfies
    ///   `s / d < theta` is approximated by its aggregate. Otherwise every
    ///   child is visited.
    fn traverse_node(&self, tree: &Octree, node_idx: usize, body_idx: usize, pos_i: NVec3, acc: &mut NVec3) {
        let node = tree.node(node_idx);

        if node.mass == 0.0 {
            return;
        }

        if node.is_leaf() {
            if node.holds(body_idx) {
                return;
            }
            *acc += self.pair(node.com - pos_i, node.mass);
            return;
        }

        let r = node.com - pos_i;
        let dist = r.norm();

        // a node around the target would fold its own mass into the estimate
        let far = dist > 0.0 && !node.bounds.contains(&pos_i) && node.bounds.size() < self.theta * dist;

        if far {
            *acc += self.pair(r, node.mass);
        } else {
            for child_idx in node.children.iter().flatten() {
                self.traverse_node(tree, *child_idx, body_idx, pos_i, acc);
            }
        }
    }
}

/// `G m r / (|r|^2 + eps^2)^(3/2)`, with `r` pointing from the field point
/// toward the mass.
pub fn softened_accel(r: NVec3, m: f64, g: f64, softening: f64) -> NVec3 {
    let d2 = r.norm_squared() + softening * softening;
    if d2 == 0.0 {
        return NVec3::zeros();
    }
    let inv_r = d2.sqrt().recip();
    let inv_r3 = inv_r * inv_r * inv_r;
    g * m * inv_r3 * r
}

/// Exact softened accelerations by direct summation over all pairs.
pub fn direct_accelerations(positions: &[NVec3], masses: &[f64], g: f64, softening: f64) -> Vec<NVec3> {
    let n = positions.len();
    let mut out = vec![NVec3::zeros(); n];

    // each unordered pair once, equal and opposite
    for i in 0..n {
        for j in (i + 1)..n {
            let r = positions[j] - positions[i];
            let d2 = r.norm_squared() + softening * softening;
            if d2 == 0.0 {
                continue;
            }
            let inv_r = d2.sqrt().recip();
            let coef = g * inv_r * inv_r * inv_r;

            out[i] += coef * masses[j] * r;
            out[j] -= coef * masses[i] * r;
        }
    }
    out
}

/// Softened pair potential energy, `-G m_i m_j / sqrt(r^2 + eps^2)` summed
/// over unordered pairs.
pub fn potential_energy(positions: &[NVec3], masses: &[f64], g: f64, softening: f64) -> f64 {
    let n = positions.len();
    let eps2 = softening * softening;
    let mut pe = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            let d2 = (positions[j] - positions[i]).norm_squared() + eps2;
            if d2 > 0.0 {
                pe -= g * masses[i] * masses[j] / d2.sqrt();
            }
        }
    }
    pe
}

/// Kinetic plus softened potential energy of the whole set.
pub fn total_energy(particles: &ParticleSet, g: f64, softening: f64) -> f64 {
    particles.kinetic_energy() + potential_energy(&particles.positions, &particles.masses, g, softening)
}
