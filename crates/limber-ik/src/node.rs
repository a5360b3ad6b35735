//! Solver-space points.

use limber_core::BoneId;
use nalgebra::{UnitQuaternion, Vector3};

/// Address of a node inside the chain tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub chain: usize,
    pub node: usize,
}

impl NodeRef {
    pub const fn new(chain: usize, node: usize) -> Self {
        Self { chain, node }
    }
}

/// The working representation of one mapped bone.
///
/// `position` and `rotation` are solver state and only reach the real
/// skeleton through the mapping layer at the end of a frame.
#[derive(Debug, Clone)]
pub struct Node {
    /// The skeleton bone this node stands in for.
    pub bone: BoneId,
    pub position: Vector3<f32>,
    /// Target rotation handed down by the node's effector.
    pub rotation: UnitQuaternion<f32>,
    /// Distance to the next node of the chain (0 for the last node).
    pub length: f32,
    /// Position weight of the node's effector, scaled by the master weight.
    pub effector_position_weight: f32,
    /// Rotation weight of the node's effector, scaled by the master weight.
    pub effector_rotation_weight: f32,
    /// Effector offset applied on top of the animated position this frame.
    pub offset: Vector3<f32>,
}

impl Node {
    pub fn new(bone: BoneId) -> Self {
        Self {
            bone,
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            length: 0.0,
            effector_position_weight: 0.0,
            effector_rotation_weight: 0.0,
            offset: Vector3::zeros(),
        }
    }
}
