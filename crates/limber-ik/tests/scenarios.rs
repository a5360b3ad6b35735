//! End-to-end behavior of a single two-bone limb and of sibling chains.

use approx::assert_relative_eq;
use limber_core::{BoneId, ChainWeights, Diagnostics, SetupError, Skeleton, SolverConfig};
use limber_ik::{
    ChainHandle, ChildConstraint, Effector, EffectorHandle, FullBodySolver, LimbMapping, MAX_LIMB_LENGTH,
};
use limber_test_utils::{LIMB_LENGTHS, limb_skeleton, random_point, seeded_rng};
use nalgebra::Vector3;

struct LimbRig {
    skeleton: Skeleton,
    solver: FullBodySolver,
    bones: [BoneId; 3],
    shoulder: EffectorHandle,
    hand: EffectorHandle,
}

/// A limb solved as the root chain, its first node pinned by an effector.
fn limb_rig(config: SolverConfig) -> LimbRig {
    let (skeleton, bones) = limb_skeleton();
    let mut solver = FullBodySolver::new(config);
    solver.add_chain(&bones, ChainWeights::default());
    let shoulder = solver.add_effector(Effector::new(bones[0]));
    let hand = solver.add_effector(Effector::new(bones[2]));
    solver.add_limb_mapping(LimbMapping::new(None, bones));
    solver.bind(&skeleton).unwrap();
    solver.effector_mut(shoulder).unwrap().position_weight = 1.0;
    LimbRig {
        skeleton,
        solver,
        bones,
        shoulder,
        hand,
    }
}

impl LimbRig {
    fn set_hand(&mut self, position: Vector3<f32>, weight: f32) {
        let e = self.solver.effector_mut(self.hand).unwrap();
        e.position = position;
        e.position_weight = weight;
    }

    fn rest_direction(&self) -> Vector3<f32> {
        let [root, _, end] = self.bones;
        (self.skeleton.position(end) - self.skeleton.position(root)).normalize()
    }

    fn reach(&self) -> f32 {
        let [root, _, end] = self.bones;
        (self.skeleton.position(end) - self.skeleton.position(root)).norm()
    }
}

#[test]
fn close_target_reached_with_elbow_on_goal_side() {
    let mut rig = limb_rig(SolverConfig::default());
    let root = rig.skeleton.position(rig.bones[0]);
    let target = root + rig.rest_direction() * 0.1;
    rig.set_hand(target, 1.0);

    // The limb lies in the XZ plane; ask for the elbow to point up.
    let bend = rig.solver.chain_mut(ChainHandle(0)).unwrap().bend_constraint_mut().unwrap();
    bend.goal = Some(root + Vector3::y());
    bend.weight = 1.0;

    rig.solver.update(&mut rig.skeleton, &mut Diagnostics::new());

    assert_relative_eq!(rig.skeleton.position(rig.bones[2]), target, epsilon = 1e-4);
    assert!(rig.skeleton.position(rig.bones[1]).y > 0.1);
}

#[test]
fn unreachable_target_stretches_to_limb_length() {
    let mut rig = limb_rig(SolverConfig::default());
    let root = rig.skeleton.position(rig.bones[0]);
    rig.set_hand(root + rig.rest_direction() * 0.6, 1.0);

    rig.solver.update(&mut rig.skeleton, &mut Diagnostics::new());

    let total: f32 = LIMB_LENGTHS.iter().sum();
    let reach = rig.reach();
    assert_relative_eq!(reach, total, epsilon = 1e-3);
    assert!(reach <= total * MAX_LIMB_LENGTH + 1e-5);
}

#[test]
fn zero_weights_pass_the_pose_through() {
    let mut rig = limb_rig(SolverConfig::default());
    rig.solver.effector_mut(rig.shoulder).unwrap().position_weight = 0.0;
    let before: Vec<_> = rig.bones.iter().map(|&b| *rig.skeleton.world(b)).collect();

    rig.solver.update(&mut rig.skeleton, &mut Diagnostics::new());

    for (&bone, pose) in rig.bones.iter().zip(&before) {
        assert_relative_eq!(rig.skeleton.position(bone), pose.translation.vector, epsilon = 1e-5);
        assert_relative_eq!(rig.skeleton.rotation(bone).angle_to(&pose.rotation), 0.0, epsilon = 1e-4);
    }
}

#[test]
fn converged_state_is_a_fixed_point() {
    let mut rig = limb_rig(SolverConfig::default());
    let target = Vector3::new(0.25, 0.2, 0.15);
    rig.set_hand(target, 1.0);
    let mut diagnostics = Diagnostics::new();

    rig.solver.update(&mut rig.skeleton, &mut diagnostics);
    let second = rig.solver.update(&mut rig.skeleton, &mut diagnostics);

    assert!(second.max_node_delta < 1e-4, "delta {}", second.max_node_delta);
    assert_relative_eq!(rig.skeleton.position(rig.bones[2]), target, epsilon = 1e-4);
}

#[test]
fn raising_weight_never_moves_hand_away() {
    let (_, bones) = limb_skeleton();
    let mut rig = limb_rig(SolverConfig::default());
    let target = Vector3::new(0.2, 0.3, 0.1);
    let mut diagnostics = Diagnostics::new();
    let mut previous = f32::MAX;

    for step in 0..=10 {
        // Fresh animated pose every frame, as an animation driver would write it.
        let (mut skeleton, _) = limb_skeleton();
        rig.set_hand(target, step as f32 / 10.0);
        rig.solver.update(&mut skeleton, &mut diagnostics);

        let distance = (skeleton.position(bones[2]) - target).norm();
        assert!(distance <= previous + 1e-5, "step {step}: {distance} > {previous}");
        previous = distance;
    }
    assert!(previous < 1e-4);
}

#[test]
fn random_targets_keep_bone_lengths() {
    let mut rng = seeded_rng(17);
    let mut rig = limb_rig(SolverConfig::default());
    let mut diagnostics = Diagnostics::new();

    for _ in 0..50 {
        let mut target = random_point(&mut rng, Vector3::zeros(), 0.5);
        let distance = target.norm();
        if !(0.1..=0.5).contains(&distance) {
            target = target.normalize() * distance.clamp(0.1, 0.5);
        }
        rig.set_hand(target, 1.0);
        rig.solver.update(&mut rig.skeleton, &mut diagnostics);

        let [a, b, c] = rig.bones;
        let s = &rig.skeleton;
        assert_relative_eq!((s.position(b) - s.position(a)).norm(), LIMB_LENGTHS[0], epsilon = 1e-4);
        assert_relative_eq!((s.position(c) - s.position(b)).norm(), LIMB_LENGTHS[1], epsilon = 1e-4);
        assert_relative_eq!(s.position(c), target, epsilon = 1e-3);

        let nodes = rig.solver.tree().chains()[0].nodes();
        for pair in nodes.windows(2) {
            assert_relative_eq!((pair[1].position - pair[0].position).norm(), pair[0].length, epsilon = 1e-4);
        }
    }
    assert!(diagnostics.is_empty());
}

#[test]
fn rigid_siblings_keep_their_distance() {
    let mut s = Skeleton::new();
    let body = s.add_bone_at("body", None, Vector3::new(0.0, 1.0, 0.0)).unwrap();
    let left = s.add_bone_at("left", Some(body), Vector3::new(0.15, -0.05, 0.0)).unwrap();
    let right = s.add_bone_at("right", Some(body), Vector3::new(-0.15, -0.05, 0.0)).unwrap();
    let nominal = (s.position(left) - s.position(right)).norm();

    let mut solver = FullBodySolver::new(SolverConfig::default());
    let root = solver.add_chain(&[body], ChainWeights::body());
    let l = solver.add_chain(&[left], ChainWeights::default());
    let r = solver.add_chain(&[right], ChainWeights::default());
    solver.add_child(root, l);
    solver.add_child(root, r);
    solver.add_child_constraint(root, ChildConstraint::new(left, right));
    let effector = solver.add_effector(Effector::new(body).with_child_bones(&[left, right]));
    solver.bind(&s).unwrap();

    let target = Vector3::new(0.4, 1.2, -0.3);
    let e = solver.effector_mut(effector).unwrap();
    e.position = target;
    e.position_weight = 1.0;
    solver.update(&mut s, &mut Diagnostics::new());

    let tree = solver.tree();
    let body_node = tree.chains()[0].nodes()[0].position;
    let distance = (tree.chains()[1].nodes()[0].position - tree.chains()[2].nodes()[0].position).norm();
    assert_relative_eq!(body_node, target, epsilon = 1e-4);
    assert_relative_eq!(distance, nominal, epsilon = 1e-4);
}

#[test]
fn rigid_siblings_hold_distance_behind_a_body_only_effector() {
    let mut s = Skeleton::new();
    let body = s.add_bone_at("body", None, Vector3::new(0.0, 1.0, 0.0)).unwrap();
    let left = s.add_bone_at("left", Some(body), Vector3::new(0.15, -0.05, 0.0)).unwrap();
    let right = s.add_bone_at("right", Some(body), Vector3::new(-0.15, -0.05, 0.0)).unwrap();
    let nominal = (s.position(left) - s.position(right)).norm();
    let root_length = (s.position(left) - s.position(body)).norm();
    assert_relative_eq!(nominal, 0.3, epsilon = 1e-6);

    let mut solver = FullBodySolver::new(SolverConfig::default());
    let root = solver.add_chain(&[body], ChainWeights::body());
    let l = solver.add_chain(&[left], ChainWeights::default());
    let r = solver.add_chain(&[right], ChainWeights::default());
    solver.add_child(root, l);
    solver.add_child(root, r);
    solver.add_child_constraint(root, ChildConstraint::new(left, right));
    let effector = solver.add_effector(Effector::new(body));
    solver.bind(&s).unwrap();

    let e = solver.effector_mut(effector).unwrap();
    e.position = Vector3::new(2.0, 1.5, -1.0);
    e.position_weight = 1.0;
    solver.update(&mut s, &mut Diagnostics::new());

    let tree = solver.tree();
    let (l, r) = (tree.chains()[1].nodes()[0].position, tree.chains()[2].nodes()[0].position);
    assert_relative_eq!((l - r).norm(), nominal, epsilon = 1e-4);
    let body_node = tree.chains()[0].nodes()[0].position;
    assert_relative_eq!((l - body_node).norm(), root_length, epsilon = 1e-4);
    assert_relative_eq!((r - body_node).norm(), root_length, epsilon = 1e-4);
}

#[test]
fn straight_limb_is_rejected() {
    let mut s = Skeleton::new();
    let a = s.add_bone_at("a", None, Vector3::zeros()).unwrap();
    let b = s.add_bone_at("b", Some(a), Vector3::x() * 0.3).unwrap();
    let c = s.add_bone_at("c", Some(b), Vector3::x() * 0.25).unwrap();
    let mut solver = FullBodySolver::new(SolverConfig::default());
    solver.add_chain(&[a, b, c], ChainWeights::default());
    assert_eq!(solver.bind(&s), Err(SetupError::DegenerateBend(0)));
}

#[test]
fn zero_length_bone_is_rejected() {
    let mut s = Skeleton::new();
    let a = s.add_bone_at("a", None, Vector3::zeros()).unwrap();
    let b = s.add_bone_at("b", Some(a), Vector3::zeros()).unwrap();
    let mut solver = FullBodySolver::new(SolverConfig::default());
    solver.add_chain(&[a, b], ChainWeights::default());
    let err = solver.validate(&s).unwrap_err();
    assert_eq!(err, SetupError::ZeroLengthBone { from: a, to: b });
    assert!(err.to_string().contains("zero"));
}

#[test]
fn no_iterations_moves_only_the_end() {
    let config = SolverConfig {
        iterations: 0,
        ..SolverConfig::default()
    };
    let mut rig = limb_rig(config);
    let root = rig.skeleton.position(rig.bones[0]);
    let target = Vector3::new(0.3, -0.2, 0.1);
    rig.set_hand(target, 1.0);

    let report = rig.solver.update(&mut rig.skeleton, &mut Diagnostics::new());

    assert_eq!(report.iterations, 0);
    assert!(!report.converged);
    assert_relative_eq!(rig.skeleton.position(rig.bones[0]), root, epsilon = 1e-6);
    assert_relative_eq!(rig.skeleton.position(rig.bones[2]), target, epsilon = 1e-4);
}
