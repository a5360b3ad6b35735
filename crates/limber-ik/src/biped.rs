//! Standard biped setup: a one-node body chain with four three-node limbs.
//!
//! ```text
//!                    Body [pelvis]
//!      ┌──────────┬─────┴────┬───────────┐
//!  LeftArm     RightArm    LeftLeg    RightLeg
//! ```
//!
//! The limb roots are held apart by child constraints on the body chain:
//! rigid across the shoulders and across the hips, elastic (pull only)
//! along the diagonals from each shoulder to the opposite thigh.

use std::path::Path;

use limber_core::{BoneId, LimberError, Skeleton, SolverConfig};
use serde::{Deserialize, Serialize};

use crate::chain::{ChainHandle, ChildConstraint};
use crate::effector::{Effector, EffectorHandle};
use crate::mapping::{BoneMapping, LimbMapping, SpineAnchors, SpineMapping};
use crate::solver::FullBodySolver;

/// Skeleton bones a biped rig is built from.
///
/// Serializable so rig definitions can live next to the solver config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BipedReferences {
    pub pelvis: BoneId,
    /// Spine bones from the pelvis upward, pelvis excluded.
    pub spine: Vec<BoneId>,
    #[serde(default)]
    pub head: Option<BoneId>,
    #[serde(default)]
    pub left_clavicle: Option<BoneId>,
    #[serde(default)]
    pub right_clavicle: Option<BoneId>,
    /// Upper arm, forearm, hand.
    pub left_arm: [BoneId; 3],
    pub right_arm: [BoneId; 3],
    /// Thigh, calf, foot.
    pub left_leg: [BoneId; 3],
    pub right_leg: [BoneId; 3],
}

/// The nine effectors of a biped rig, in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BipedEffector {
    Body,
    LeftShoulder,
    RightShoulder,
    LeftThigh,
    RightThigh,
    LeftHand,
    RightHand,
    LeftFoot,
    RightFoot,
}

impl BipedEffector {
    pub const ALL: [Self; 9] = [
        Self::Body,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftThigh,
        Self::RightThigh,
        Self::LeftHand,
        Self::RightHand,
        Self::LeftFoot,
        Self::RightFoot,
    ];
}

impl From<BipedEffector> for EffectorHandle {
    fn from(effector: BipedEffector) -> Self {
        Self(effector as usize)
    }
}

/// The five chains of a biped rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BipedChain {
    Body,
    LeftArm,
    RightArm,
    LeftLeg,
    RightLeg,
}

impl From<BipedChain> for ChainHandle {
    fn from(chain: BipedChain) -> Self {
        Self(chain as usize)
    }
}

impl FullBodySolver {
    /// Build the standard biped rig. Call [`bind`](Self::bind) before use.
    pub fn biped(refs: &BipedReferences, config: SolverConfig) -> Self {
        let (body_weights, arm_weights, leg_weights) = (config.body, config.arms, config.legs);
        let mut solver = Self::new(config);

        let [l_upper_arm, _, l_hand] = refs.left_arm;
        let [r_upper_arm, _, r_hand] = refs.right_arm;
        let [l_thigh, _, l_foot] = refs.left_leg;
        let [r_thigh, _, r_foot] = refs.right_leg;
        let pelvis = refs.pelvis;

        let body = solver.add_chain(&[pelvis], body_weights);
        for (limb, weights) in [
            (refs.left_arm, arm_weights),
            (refs.right_arm, arm_weights),
            (refs.left_leg, leg_weights),
            (refs.right_leg, leg_weights),
        ] {
            let chain = solver.add_chain(&limb, weights);
            solver.add_child(body, chain);
        }

        for constraint in [
            ChildConstraint::elastic(l_upper_arm, r_thigh, 0.0, 1.0),
            ChildConstraint::elastic(r_upper_arm, l_thigh, 0.0, 1.0),
            ChildConstraint::new(l_upper_arm, r_upper_arm),
            ChildConstraint::new(l_thigh, r_thigh),
        ] {
            solver.add_child_constraint(body, constraint);
        }

        for effector in [
            Effector::new(pelvis).with_child_bones(&[l_thigh, r_thigh]),
            Effector::new(l_upper_arm).with_child_bones(&[r_upper_arm]),
            Effector::new(r_upper_arm).with_child_bones(&[l_upper_arm]),
            Effector::new(l_thigh).with_child_bones(&[r_thigh]),
            Effector::new(r_thigh).with_child_bones(&[l_thigh]),
            Effector::new(l_hand).with_plane(l_upper_arm, r_upper_arm, pelvis),
            Effector::new(r_hand).with_plane(l_upper_arm, r_upper_arm, pelvis),
            Effector::new(l_foot).with_plane(l_thigh, r_thigh, pelvis),
            Effector::new(r_foot).with_plane(l_thigh, r_thigh, pelvis),
        ] {
            solver.add_effector(effector);
        }

        let mut spine = vec![pelvis];
        spine.extend_from_slice(&refs.spine);
        solver.set_spine_mapping(SpineMapping::new(
            &spine,
            SpineAnchors {
                left_upper_arm: l_upper_arm,
                right_upper_arm: r_upper_arm,
                left_thigh: l_thigh,
                right_thigh: r_thigh,
            },
        ));

        solver.add_limb_mapping(LimbMapping::new(refs.left_clavicle, refs.left_arm));
        solver.add_limb_mapping(LimbMapping::new(refs.right_clavicle, refs.right_arm));
        solver.add_limb_mapping(LimbMapping::new(None, refs.left_leg));
        solver.add_limb_mapping(LimbMapping::new(None, refs.right_leg));

        if let Some(head) = refs.head {
            solver.add_bone_mapping(BoneMapping::new(head));
        }
        solver
    }

    /// Read a [`SolverConfig`] from a TOML file, build the biped rig and bind
    /// it to `skeleton`.
    pub fn load_biped(
        refs: &BipedReferences,
        config_path: impl AsRef<Path>,
        skeleton: &Skeleton,
    ) -> Result<Self, LimberError> {
        let config = SolverConfig::from_file(config_path)?;
        let mut solver = Self::biped(refs, config);
        solver.bind(skeleton)?;
        Ok(solver)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
