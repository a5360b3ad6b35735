//! Multi-chain full-body inverse kinematics.
//!
//! A low-resolution rig of node chains (a body chain with limbs hanging off
//! it) is solved with a hybrid of forward/backward reaching and an exact
//! two-bone trigonometric step, pulled by weighted effectors and shaped by
//! bend constraints. Mappings translate between that rig and a real skeleton
//! with any number of spine, clavicle and head bones.
//!
//! # Architecture
//!
//! ```text
//! Skeleton ──► mappings / effectors ──► ChainTree ──► mappings ──► Skeleton
//!   (animated)        read pose          iterate        write pose   (solved)
//! ```
//!
//! [`FullBodySolver`] owns the [`ChainTree`], its [`Effector`]s and the
//! mappings. [`FullBodySolver::biped`] builds the standard five-chain rig from
//! [`BipedReferences`]. With the `bevy` feature, [`plugin::FullBodyIkPlugin`]
//! runs the solver on ECS rigs.

pub mod bend;
pub mod biped;
pub mod chain;
pub mod effector;
pub mod hooks;
pub mod mapping;
pub mod math;
pub mod node;
pub mod solver;

#[cfg(feature = "bevy")]
pub mod plugin;

pub use bend::BendConstraint;
pub use biped::{BipedChain, BipedEffector, BipedReferences};
pub use chain::{Chain, ChainHandle, ChainTree, ChildConstraint, MAX_LIMB_LENGTH};
pub use effector::{Effector, EffectorHandle, PositionOffset};
pub use hooks::{SolverHook, SolverPhase};
pub use mapping::{BoneMapping, LimbMapping, SpineAnchors, SpineMapping};
pub use node::{Node, NodeRef};
pub use solver::{FullBodySolver, SolveReport};

#[cfg(feature = "bevy")]
pub use plugin::{FullBodyIk, FullBodyIkPlugin, FullBodyIkSet};
