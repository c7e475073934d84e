use approx::{assert_abs_diff_eq, assert_relative_eq};

use behalf::simulation::integrator::{drift, kick};
use behalf::{
    direct_accelerations, plummer, potential_energy, self_start, softened_accel, step, step_slice, Bounds,
    Gravity, NVec3, Octree, ParticleSet, SimError, MAX_DEPTH,
};

/// Two bodies on the x-axis, at rest, separated by `dist` and centred on 0
pub fn two_body_system(dist: f64, m1: f64, m2: f64) -> ParticleSet {
    ParticleSet::new(
        vec![NVec3::new(-dist / 2.0, 0.0, 0.0), NVec3::new(dist / 2.0, 0.0, 0.0)],
        vec![NVec3::zeros(); 2],
        vec![m1, m2],
    )
    .unwrap()
}

/// Plummer sphere in units with G = 1, scale radius 1 and total mass 1
pub fn plummer_system(n: usize, seed: u64) -> ParticleSet {
    plummer(n, 1.0, 1.0 / n as f64, 1.0, seed).unwrap()
}

/// Bodies held anywhere below `node_idx`
fn subtree_bodies(tree: &Octree, node_idx: usize, out: &mut Vec<usize>) {
    let node = tree.node(node_idx);
    out.extend(node.bodies());
    for child in node.children.iter().flatten() {
        subtree_bodies(tree, *child, out);
    }
}

// ==================================================================================
// Octree tests
// ==================================================================================

#[test]
fn tree_root_mass_is_total_mass() {
    let mut sys = plummer_system(257, 7);
    for (i, m) in sys.masses.iter_mut().enumerate() {
        *m = 0.5 + (i % 7) as f64;
    }

    let tree = Octree::build(&sys.positions, &sys.masses).unwrap();

    assert_relative_eq!(tree.aggregate_mass(), sys.total_mass(), max_relative = 1e-12);
    assert_eq!(tree.len(), 257);
}

#[test]
fn tree_every_node_aggregates_its_subtree_exactly() {
    let sys = plummer_system(200, 11);
    let tree = Octree::build(&sys.positions, &sys.masses).unwrap();

    for idx in 0..tree.nodes().len() {
        let mut bodies = Vec::new();
        subtree_bodies(&tree, idx, &mut bodies);

        let mass: f64 = bodies.iter().map(|&b| sys.masses[b]).sum();
        let node = tree.node(idx);
        assert_relative_eq!(node.mass, mass, max_relative = 1e-12);

        if mass > 0.0 {
            let com = bodies
                .iter()
                .fold(NVec3::zeros(), |acc, &b| acc + sys.positions[b] * sys.masses[b])
                / mass;
            assert_abs_diff_eq!(node.com, com, epsilon = 1e-12);
        }
    }
}

#[test]
fn tree_holds_every_body_once_and_inside_its_leaf() {
    let sys = plummer_system(150, 3);
    let tree = Octree::build(&sys.positions, &sys.masses).unwrap();

    let mut bodies = Vec::new();
    subtree_bodies(&tree, tree.root(), &mut bodies);
    bodies.sort_unstable();
    assert_eq!(bodies, (0..150).collect::<Vec<_>>());

    for node in tree.nodes() {
        for b in node.bodies() {
            assert!(node.is_leaf());
            assert!(node.bounds.contains(&sys.positions[b]));
        }
    }
}

#[test]
fn tree_root_is_minimal_enclosing_cube() {
    let positions = vec![NVec3::new(-1.0, 0.0, 0.0), NVec3::new(3.0, 1.0, 0.5)];
    let tree = Octree::build(&positions, &[1.0, 1.0]).unwrap();
    let b = tree.bounds();

    assert_abs_diff_eq!(b.size(), 4.0, epsilon = 1e-12);
    assert_abs_diff_eq!(b.center(), NVec3::new(1.0, 0.5, 0.25), epsilon = 1e-12);
    assert!(positions.iter().all(|p| b.contains(p)));
}

#[test]
fn tree_single_particle_is_a_leaf_root() {
    let tree = Octree::build(&[NVec3::new(1.0, 2.0, 3.0)], &[4.0]).unwrap();
    let root = tree.node(tree.root());

    assert!(root.is_leaf());
    assert_eq!(root.body_index, Some(0));
    assert_eq!(tree.aggregate_mass(), 4.0);
    assert_eq!(tree.center_of_mass(), NVec3::new(1.0, 2.0, 3.0));
}

#[test]
fn tree_colocates_identical_positions_at_depth_cap() {
    let p = NVec3::new(0.25, 0.25, 0.25);
    let q = NVec3::new(-1.0, -1.0, -1.0);
    let positions = vec![p, p, p, q];
    let masses = vec![1.0, 1.0, 1.0, 2.0];

    let tree = Octree::build(&positions, &masses).unwrap();

    assert_eq!(tree.colocated(), 2);
    assert_relative_eq!(tree.aggregate_mass(), 5.0);
    let leaf = tree.nodes().iter().find(|n| n.holds(0)).unwrap();
    assert_eq!(leaf.depth, MAX_DEPTH);
    assert!(leaf.holds(1) && leaf.holds(2));
    assert_relative_eq!(leaf.mass, 3.0);

    // q feels the combined point; the merged particles only feel q
    let gravity = Gravity::new(1.0, 0.0, 0.0);
    let r = p - q;
    assert_relative_eq!(gravity.acceleration(&tree, 3), softened_accel(r, 3.0, 1.0, 0.0), max_relative = 1e-12);
    assert_relative_eq!(gravity.acceleration(&tree, 0), softened_accel(-r, 2.0, 1.0, 0.0), max_relative = 1e-12);
}

#[test]
fn tree_rejects_invalid_input() {
    let ok = NVec3::zeros();

    assert!(matches!(Octree::build(&[], &[]), Err(SimError::InvalidParticles(_))));
    assert!(matches!(Octree::build(&[ok], &[0.0]), Err(SimError::InvalidParticles(_))));
    assert!(matches!(Octree::build(&[ok], &[-1.0]), Err(SimError::InvalidParticles(_))));
    assert!(matches!(Octree::build(&[ok, ok], &[1.0]), Err(SimError::InvalidParticles(_))));
    assert!(matches!(
        Octree::build(&[NVec3::new(f64::NAN, 0.0, 0.0)], &[1.0]),
        Err(SimError::InvalidParticles(_))
    ));
}

#[test]
fn tree_in_fixed_region() {
    let bounds = Bounds::new(NVec3::repeat(-10.0), NVec3::repeat(10.0));
    let sys = plummer_system(50, 5);
    let inside: Vec<NVec3> = sys.positions.iter().map(|x| x.map(|c| c.clamp(-9.0, 9.0))).collect();

    let tree = Octree::build_in(&inside, &sys.masses, bounds).unwrap();
    assert_eq!(tree.bounds(), bounds);
    assert_relative_eq!(tree.aggregate_mass(), sys.total_mass(), max_relative = 1e-12);

    let outside = vec![NVec3::new(11.0, 0.0, 0.0)];
    assert!(matches!(Octree::build_in(&outside, &[1.0], bounds), Err(SimError::InvalidParticles(_))));
}

#[test]
fn tree_rebuild_matches_fresh_build() {
    let first = plummer_system(120, 1);
    let second = plummer_system(80, 2);

    let mut tree = Octree::build(&first.positions, &first.masses).unwrap();
    tree.rebuild(&second.positions, &second.masses).unwrap();
    let fresh = Octree::build(&second.positions, &second.masses).unwrap();

    assert_eq!(tree.len(), 80);
    assert_eq!(tree.nodes().len(), fresh.nodes().len());
    assert_eq!(tree.aggregate_mass(), fresh.aggregate_mass());
    assert_eq!(tree.center_of_mass(), fresh.center_of_mass());
}

// ==================================================================================
// Gravity tests
// ==================================================================================

#[test]
fn gravity_two_body_matches_newton_exactly() {
    let g = 0.5;
    let gravity = Gravity::new(g, 0.0, 0.0);

    for dist in [0.1, 1.0, 3.7, 100.0] {
        let sys = two_body_system(dist, 2.0, 3.0);
        let tree = Octree::build(&sys.positions, &sys.masses).unwrap();

        let a0 = gravity.acceleration(&tree, 0);
        let a1 = gravity.acceleration(&tree, 1);

        assert_relative_eq!(a0, NVec3::new(g * 3.0 / (dist * dist), 0.0, 0.0), max_relative = 1e-12);
        assert_relative_eq!(a1, NVec3::new(-g * 2.0 / (dist * dist), 0.0, 0.0), max_relative = 1e-12);
    }
}

#[test]
fn gravity_softening_bounds_close_encounters() {
    let eps = 0.1;
    // max of r / (r^2 + eps^2)^(3/2), reached at r = eps / sqrt(2)
    let bound = 2.0 / (3.0 * 3.0_f64.sqrt() * eps * eps);

    for r in [1e-12, 1e-9, 1e-6, 1e-3, eps / 2.0_f64.sqrt(), 0.5] {
        let a = softened_accel(NVec3::new(r, 0.0, 0.0), 1.0, 1.0, eps);
        assert!(a.norm().is_finite());
        assert!(a.norm() <= bound * (1.0 + 1e-12), "|a| = {} above bound {} at r = {}", a.norm(), bound, r);
    }

    assert_eq!(softened_accel(NVec3::zeros(), 1.0, 1.0, eps), NVec3::zeros());
    assert_eq!(softened_accel(NVec3::zeros(), 1.0, 1.0, 0.0), NVec3::zeros());
}

#[test]
fn gravity_softening_converges_to_newton() {
    let r = NVec3::new(1.0, 0.0, 0.0);
    let exact = 1.0;

    let mut last = f64::INFINITY;
    for eps in [1e-1, 1e-2, 1e-3, 1e-4] {
        let err = (softened_accel(r, 1.0, 1.0, eps).norm() - exact).abs() / exact;
        assert!(err < last);
        last = err;
    }
    assert!(last < 1e-7, "relative error {last}");
}

#[test]
fn gravity_theta_zero_is_direct_summation() {
    let sys = plummer_system(100, 21);
    let eps = 0.01;
    let tree = Octree::build(&sys.positions, &sys.masses).unwrap();

    let exact = direct_accelerations(&sys.positions, &sys.masses, 1.0, eps);
    let walked = Gravity::new(1.0, 0.0, eps).accelerations(&tree, 0..100);

    for (a, b) in walked.iter().zip(&exact) {
        assert_relative_eq!(*a, *b, max_relative = 1e-9, epsilon = 1e-12);
    }
}

#[test]
fn gravity_opening_angle_error_is_small() {
    let sys = plummer_system(100, 4);
    let eps = 0.01;
    let tree = Octree::build(&sys.positions, &sys.masses).unwrap();

    let exact = Gravity::new(1.0, 0.0, eps).accelerations(&tree, 0..100);
    let approx = Gravity::new(1.0, 0.5, eps).accelerations(&tree, 0..100);

    let mut rel: Vec<f64> = approx
        .iter()
        .zip(&exact)
        .map(|(a, e)| (a - e).norm() / e.norm())
        .collect();
    rel.sort_by(|a, b| a.total_cmp(b));

    let err2: f64 = approx.iter().zip(&exact).map(|(a, e)| (a - e).norm_squared()).sum();
    let norm2: f64 = exact.iter().map(|e| e.norm_squared()).sum();

    assert!((err2 / norm2).sqrt() < 0.05, "rms relative error {}", (err2 / norm2).sqrt());
    assert!(rel[rel.len() / 2] < 0.02, "median relative error {}", rel[rel.len() / 2]);
}

#[test]
fn gravity_is_equal_and_opposite_when_exact() {
    let sys = plummer_system(64, 8);
    let tree = Octree::build(&sys.positions, &sys.masses).unwrap();
    let accels = Gravity::new(1.0, 0.0, 0.05).accelerations(&tree, 0..64);

    let net = accels.iter().zip(&sys.masses).fold(NVec3::zeros(), |p, (a, &m)| p + a * m);
    let scale: f64 = accels.iter().zip(&sys.masses).map(|(a, &m)| a.norm() * m).sum();

    assert!(net.norm() < 1e-12 * scale, "net force {net:?}");
}

#[test]
fn gravity_no_self_force() {
    let tree = Octree::build(&[NVec3::new(3.0, -1.0, 2.0)], &[5.0]).unwrap();
    assert_eq!(Gravity::new(1.0, 0.5, 0.0).acceleration(&tree, 0), NVec3::zeros());
}

#[test]
fn potential_energy_of_a_pair() {
    let sys = two_body_system(2.0, 1.0, 3.0);
    assert_relative_eq!(potential_energy(&sys.positions, &sys.masses, 1.0, 0.0), -1.5);
    assert_relative_eq!(
        potential_energy(&sys.positions, &sys.masses, 1.0, 1.0),
        -3.0 / 5.0_f64.sqrt(),
        max_relative = 1e-12
    );
}

// ==================================================================================
// Integrator tests
// ==================================================================================

#[test]
fn integrator_step_kicks_then_drifts() {
    let x = NVec3::new(1.0, 2.0, 3.0);
    let v = NVec3::new(0.5, 0.0, -1.0);
    let a = NVec3::new(2.0, 0.0, 0.0);

    let (x1, v1) = step(x, v, a, 0.25);

    assert_eq!(v1, NVec3::new(1.0, 0.0, -1.0));
    assert_eq!(x1, NVec3::new(1.25, 2.0, 2.75));
    assert_eq!((x1, v1), (drift(x, kick(v, a, 0.25), 0.25), kick(v, a, 0.25)));
}

#[test]
fn integrator_step_slice_matches_single_steps() {
    let sys = plummer_system(10, 9);
    let accels: Vec<NVec3> = (0..10).map(|i| NVec3::new(i as f64, 1.0, -0.5)).collect();

    let mut x = sys.positions.clone();
    let mut v = sys.velocities.clone();
    step_slice(&mut x, &mut v, &accels, 0.01);

    for i in 0..10 {
        let (xi, vi) = step(sys.positions[i], sys.velocities[i], accels[i], 0.01);
        assert_eq!(x[i], xi);
        assert_eq!(v[i], vi);
    }
}

#[test]
fn integrator_self_start_half_kicks_then_full_drifts() {
    let x0 = NVec3::new(1.0, 0.0, 0.0);
    let v0 = NVec3::new(0.0, 1.0, 0.0);
    let a0 = NVec3::new(-4.0, 0.0, 0.0);
    let dt = 0.5;

    let mut x = vec![x0];
    let mut v = vec![v0];
    self_start(&mut x, &mut v, &[a0], dt);

    let v_half = v0 + a0 * (dt / 2.0);
    assert_eq!(v[0], v_half);
    assert_eq!(x[0], x0 + v_half * dt);
}

#[test]
fn integrator_self_start_two_body_scenario() {
    // masses 1 and 1, separation 1 along x, at rest
    let mut sys = two_body_system(1.0, 1.0, 1.0);
    let gravity = Gravity::new(1.0, 0.0, 0.01);
    let dt = 0.01;

    let tree = Octree::build(&sys.positions, &sys.masses).unwrap();
    let accels = gravity.accelerations(&tree, 0..2);
    self_start(&mut sys.positions, &mut sys.velocities, &accels, dt);

    let (x0, x1) = (sys.positions[0], sys.positions[1]);
    let (v0, v1) = (sys.velocities[0], sys.velocities[1]);

    assert!(x0.x > -0.5 && x1.x < 0.5, "bodies did not approach: {x0:?} {x1:?}");
    assert_abs_diff_eq!(x0.x, -x1.x, epsilon = 1e-15);
    assert_eq!((x0.y, x0.z, x1.y, x1.z), (0.0, 0.0, 0.0, 0.0));

    assert!(v0.x > 0.0);
    assert_abs_diff_eq!(v0, -v1, epsilon = 1e-15);
}

// ==================================================================================
// State tests
// ==================================================================================

#[test]
fn recenter_removes_momentum_and_drift() {
    let mut sys = plummer_system(500, 13);
    for v in sys.velocities.iter_mut() {
        *v += NVec3::new(3.0, -2.0, 1.0);
    }
    sys.masses[0] *= 10.0;

    sys.recenter();

    assert!(sys.total_momentum().norm() < 1e-12, "momentum {:?}", sys.total_momentum());
    assert!(sys.center_of_mass().norm() < 1e-12);
}

#[test]
fn particle_set_validation() {
    let x = vec![NVec3::zeros()];
    let v = vec![NVec3::zeros()];

    assert!(ParticleSet::new(x.clone(), v.clone(), vec![1.0]).is_ok());
    assert!(ParticleSet::new(vec![], vec![], vec![]).is_err());
    assert!(ParticleSet::new(x.clone(), vec![], vec![1.0]).is_err());
    assert!(ParticleSet::new(x.clone(), v.clone(), vec![0.0]).is_err());
    assert!(ParticleSet::new(x, vec![NVec3::new(f64::INFINITY, 0.0, 0.0)], vec![1.0]).is_err());
}

#[test]
fn kinetic_energy_of_simple_set() {
    let sys = ParticleSet::new(
        vec![NVec3::zeros(); 2],
        vec![NVec3::new(1.0, 0.0, 0.0), NVec3::new(0.0, 2.0, 0.0)],
        vec![2.0, 0.5],
    )
    .unwrap();

    assert_relative_eq!(sys.kinetic_energy(), 2.0);
}

// ==================================================================================
// Initial condition tests
// ==================================================================================

#[test]
fn plummer_is_reproducible_from_seed() {
    let a = plummer_system(100, 1234);
    let b = plummer_system(100, 1234);
    let c = plummer_system(100, 1235);

    assert_eq!(a, b);
    assert_ne!(a.positions, c.positions);
    assert!(a.masses.iter().all(|&m| m == 0.01));
}

#[test]
fn plummer_is_near_virial_equilibrium() {
    let mut sys = plummer_system(2000, 99);
    sys.recenter();

    let mut radii: Vec<f64> = sys.positions.iter().map(|x| x.norm()).collect();
    radii.sort_by(|a, b| a.total_cmp(b));
    let half_mass_radius = 1.0 / (2.0_f64.powf(2.0 / 3.0) - 1.0).sqrt();
    assert_relative_eq!(radii[1000], half_mass_radius, max_relative = 0.1);

    let ke = sys.kinetic_energy();
    let pe = potential_energy(&sys.positions, &sys.masses, 1.0, 0.0);
    let virial = 2.0 * ke / pe.abs();
    assert!((0.8..1.2).contains(&virial), "2K/|W| = {virial}");
}

#[test]
fn plummer_rejects_bad_parameters() {
    assert!(matches!(plummer(0, 1.0, 1.0, 1.0, 0), Err(SimError::Configuration(_))));
    assert!(matches!(plummer(10, 0.0, 1.0, 1.0, 0), Err(SimError::Configuration(_))));
    assert!(matches!(plummer(10, 1.0, -1.0, 1.0, 0), Err(SimError::Configuration(_))));
}
