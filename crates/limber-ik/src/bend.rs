//! Elbow and knee bend plane for three-node chains.
//!
//! At bind time the constraint records the bend direction of the limb in the
//! local space of its first bone. While solving, [`BendConstraint::direction`]
//! tells the trigonometric step which side of the limb axis the middle node
//! goes to. [`BendConstraint::limit_bend`] runs on the animated pose before
//! reading and rotates the middle bone back when the far bone has folded past
//! the natural bend plane.

use limber_core::{BoneId, Diagnostics, SetupError, Skeleton, SolverWarning, unit_weight};
use nalgebra::{UnitQuaternion, Vector3};

use crate::math::{
    EPSILON, clamp_direction, from_to_rotation, nlerp, normalize_or_zero, ortho_normalize,
};
use crate::node::Node;

/// Fraction of the half-circle the far bone may deviate from the bend normal.
const CLAMP_WEIGHT: f32 = 0.505;

/// Bend direction source for a three-node chain.
#[derive(Debug, Clone)]
pub struct BendConstraint {
    /// How much the bend goal overrides the animated bend (0..=1).
    pub weight: f32,
    /// World-space point the middle joint should bend toward.
    pub goal: Option<Vector3<f32>>,
    /// Extra rotation of the derived direction about the limb axis.
    pub rotation_offset: UnitQuaternion<f32>,
    bones: [BoneId; 3],
    chain: usize,
    direction: Vector3<f32>,
    default_local_direction: Vector3<f32>,
    default_child_direction: Vector3<f32>,
    animated: [Vector3<f32>; 3],
}

impl BendConstraint {
    pub(crate) fn new(bones: [BoneId; 3]) -> Self {
        Self {
            weight: 0.0,
            goal: None,
            rotation_offset: UnitQuaternion::identity(),
            bones,
            chain: 0,
            direction: Vector3::x(),
            default_local_direction: Vector3::zeros(),
            default_child_direction: Vector3::zeros(),
            animated: [Vector3::zeros(); 3],
        }
    }

    pub fn bones(&self) -> [BoneId; 3] {
        self.bones
    }

    /// The most recent valid bend direction.
    pub fn last_direction(&self) -> Vector3<f32> {
        self.direction
    }

    /// Bend direction of the limb in its current skeleton pose, orthogonal to
    /// the first bone and lying in the limb plane.
    pub(crate) fn initial_direction(skeleton: &Skeleton, bones: [BoneId; 3]) -> Option<Vector3<f32>> {
        let [p1, p2, p3] = bones.map(|b| skeleton.position(b));
        let (_, to_limb) = ortho_normalize(&(p3 - p1), &(p2 - p1))?;
        let (_, to_bone1) = ortho_normalize(&(p2 - p1), &to_limb)?;
        Some(to_bone1)
    }

    pub(crate) fn bind(&mut self, chain: usize, skeleton: &Skeleton) -> Result<(), SetupError> {
        let direction =
            Self::initial_direction(skeleton, self.bones).ok_or(SetupError::DegenerateBend(chain))?;
        let [b1, _, b3] = self.bones;
        let limb = normalize_or_zero(&(skeleton.position(b3) - skeleton.position(b1)));

        self.chain = chain;
        self.direction = direction;
        self.default_local_direction = skeleton.rotation(b1).inverse() * direction;
        self.default_child_direction = skeleton.rotation(b3).inverse() * limb.cross(&direction);
        self.read_pose(skeleton);
        Ok(())
    }

    /// Cache the animated bone positions for this frame.
    pub(crate) fn read_pose(&mut self, skeleton: &Skeleton) {
        self.animated = self.bones.map(|b| skeleton.position(b));
    }

    /// Bend direction for the trigonometric step.
    ///
    /// At weight 0 the animated bend is carried along with the limb's rotation
    /// from its animated to its solved pose, optionally steered by the end
    /// effector's rotation. At weight 1 the goal direction is used as is.
    pub fn direction(
        &mut self,
        nodes: &[Node],
        master_weight: f32,
        diagnostics: &mut Diagnostics,
    ) -> Vector3<f32> {
        if nodes.len() < 3 {
            return self.direction;
        }
        let w = unit_weight(self.weight) * master_weight;
        let root = nodes[0].position;

        if let Some(goal) = self.goal {
            let to_goal = goal - root;
            if to_goal.norm_squared() > EPSILON {
                self.direction = to_goal;
            } else {
                diagnostics.report(SolverWarning::DegenerateBendGoal(self.chain));
            }
        }

        if w >= 1.0 {
            return normalize_or_zero(&self.direction);
        }

        let [a1, a2, a3] = self.animated;
        let solver_direction = nodes[2].position - root;
        let f = from_to_rotation(&(a3 - a1), &solver_direction);
        let mut dir = f * (a2 - a1);

        let end = &nodes[2];
        if end.effector_rotation_weight > 0.0 {
            let effector_direction =
                -solver_direction.cross(&(end.rotation * self.default_child_direction));
            dir = dir.lerp(&effector_direction, end.effector_rotation_weight);
        }

        if self.rotation_offset.angle() > 0.0 {
            let to_offset = from_to_rotation(&(self.rotation_offset * solver_direction), &solver_direction);
            dir = to_offset * (self.rotation_offset * dir);
        }

        if w <= 0.0 {
            return dir;
        }
        dir.lerp(&normalize_or_zero(&self.direction), w)
    }

    /// Keep the animated limb from folding the wrong way.
    ///
    /// `position_weight` is the end effector's position weight: the more the
    /// effector pulls, the more the bend is rotated back onto its natural plane.
    pub(crate) fn limit_bend(&self, skeleton: &mut Skeleton, solver_weight: f32, position_weight: f32) {
        let [b1, b2, b3] = self.bones;
        let normal = skeleton.rotation(b1) * -self.default_local_direction;
        let axis = skeleton.position(b3) - skeleton.position(b2);
        let b3_rotation = skeleton.rotation(b3);

        let (clamped, changed) = clamp_direction(&axis, &normal, CLAMP_WEIGHT * solver_weight);
        if changed {
            let f = from_to_rotation(&axis, &clamped);
            skeleton.set_rotation(b2, f * skeleton.rotation(b2));
        }

        if position_weight > 0.0 {
            let bone1 = skeleton.position(b2) - skeleton.position(b1);
            let bone2 = skeleton.position(b3) - skeleton.position(b2);
            if let Some((_, tangent)) = ortho_normalize(&bone1, &bone2) {
                let q = from_to_rotation(&tangent, &normal);
                let r = skeleton.rotation(b2);
                skeleton.set_rotation(b2, nlerp(&r, &(q * r), position_weight * solver_weight));
            }
        }

        if changed || position_weight > 0.0 {
            skeleton.set_rotation(b3, b3_rotation);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
