//! Spine mapping.
//!
//! The solver only knows the pelvis, upper arms and thighs. The spine mapping
//! rebuilds any number of spine bones between the hip triangle
//! (pelvis, left thigh, right thigh) and the chest triangle
//! (pelvis, left upper arm, right upper arm): the first and last spine bones
//! are placed from their triangles, the bones between are relaxed with a few
//! forward/backward reaching passes, then swung and twisted in order.

use limber_core::{BoneId, SetupError, Skeleton, unit_weight};
use nalgebra::Vector3;

use crate::chain::ChainTree;
use crate::mapping::bone_map::BoneMap;
use crate::math::reach_joint;
use crate::node::NodeRef;

/// Bones the spine hangs between.
#[derive(Debug, Clone, Copy)]
pub struct SpineAnchors {
    pub left_upper_arm: BoneId,
    pub right_upper_arm: BoneId,
    pub left_thigh: BoneId,
    pub right_thigh: BoneId,
}

#[derive(Debug, Clone)]
pub struct SpineMapping {
    /// Relaxation passes of the in-between bones.
    pub iterations: u32,
    /// Twist toward the solved shoulder line (0..=1).
    pub twist_weight: f32,
    anchors: SpineAnchors,
    spine: Vec<BoneMap>,
    left_upper_arm: Option<NodeRef>,
    right_upper_arm: Option<NodeRef>,
    root_node_index: usize,
    use_fabrik: bool,
}

impl SpineMapping {
    /// `bones` runs from the pelvis (or first spine bone) up to the chest.
    pub fn new(bones: &[BoneId], anchors: SpineAnchors) -> Self {
        Self {
            iterations: 3,
            twist_weight: 1.0,
            anchors,
            spine: bones.iter().copied().map(BoneMap::new).collect(),
            left_upper_arm: None,
            right_upper_arm: None,
            root_node_index: 0,
            use_fabrik: false,
        }
    }

    pub fn bones(&self) -> Vec<BoneId> {
        self.spine.iter().map(|m| m.bone).collect()
    }

    pub(crate) fn validate(&self, tree: &ChainTree, skeleton: &Skeleton) -> Result<(), SetupError> {
        if self.spine.len() < 2 {
            return Err(SetupError::SpineTooShort(self.spine.len()));
        }
        for map in &self.spine {
            if !skeleton.contains(map.bone) {
                return Err(SetupError::MissingBone(map.bone));
            }
        }
        let Some(root) = self.spine.iter().find(|m| tree.find(m.bone).is_some()) else {
            return Err(SetupError::SpineHasNoNodes);
        };

        let a = self.anchors;
        for bone in [a.left_upper_arm, a.right_upper_arm, a.left_thigh, a.right_thigh] {
            if !skeleton.contains(bone) {
                return Err(SetupError::MissingBone(bone));
            }
            if tree.find(bone).is_none() {
                return Err(SetupError::BoneNotInChains(bone));
            }
        }
        BoneMap::check_plane(skeleton, [root.bone, a.left_thigh, a.right_thigh])?;
        BoneMap::check_plane(skeleton, [root.bone, a.left_upper_arm, a.right_upper_arm])
    }

    pub(crate) fn bind(&mut self, tree: &ChainTree, skeleton: &Skeleton) -> Result<(), SetupError> {
        if self.iterations == 0 {
            self.iterations = 3;
        }
        for map in &mut self.spine {
            map.bind(tree);
            map.set_ik_position(skeleton);
        }
        self.root_node_index = self
            .spine
            .iter()
            .position(BoneMap::is_node_bone)
            .ok_or(SetupError::SpineHasNoNodes)?;
        self.left_upper_arm = tree.find(self.anchors.left_upper_arm);
        self.right_upper_arm = tree.find(self.anchors.right_upper_arm);

        let root = self.spine[self.root_node_index].bone;
        let a = self.anchors;
        let last = self.spine.len() - 1;
        self.spine[0].set_plane(tree, skeleton, [root, a.left_thigh, a.right_thigh])?;
        self.spine[last].set_plane(tree, skeleton, [root, a.left_upper_arm, a.right_upper_arm])?;
        self.read_axes(skeleton);

        self.use_fabrik = self.spine.len() > 3 || self.root_node_index > 0;
        Ok(())
    }

    pub(crate) fn store_default_local_state(&mut self, skeleton: &Skeleton) {
        for map in &mut self.spine {
            map.store_default_local_state(skeleton);
        }
    }

    pub(crate) fn fix_transforms(&self, skeleton: &mut Skeleton) {
        for (i, map) in self.spine.iter().enumerate() {
            map.fix_transform(skeleton, i == 0 || i == self.spine.len() - 1);
        }
    }

    pub(crate) fn read_pose(&mut self, skeleton: &Skeleton) {
        let last = self.spine.len() - 1;
        self.spine[0].update_plane(skeleton, true, true);
        self.read_axes(skeleton);
        self.spine[last].update_plane(skeleton, true, true);
    }

    /// Refresh segment lengths, swing axes and twist axes from the animated pose.
    fn read_axes(&mut self, skeleton: &Skeleton) {
        let a = self.anchors;
        let shoulders = skeleton.position(a.left_upper_arm) - skeleton.position(a.right_upper_arm);
        let last = self.spine.len() - 1;
        for i in 0..last {
            let next = self.spine[i + 1].bone;
            let map = &mut self.spine[i];
            let bone = map.bone;
            map.set_length(skeleton, next);
            map.set_local_swing_axis(skeleton, next, bone);
            let up = skeleton.position(next) - skeleton.position(bone);
            map.set_local_twist_axis(skeleton, &shoulders, &up);
        }
    }

    pub(crate) fn write_pose(&mut self, tree: &ChainTree, skeleton: &mut Skeleton) {
        let root = self.root_node_index;
        let last = self.spine.len() - 1;
        let first_position = self.spine[0].plane_position(tree);
        let root_position = self.spine[root]
            .node
            .map_or(first_position, |n| tree.node(n).position);
        let last_position = self.spine[last].plane_position(tree);

        if self.use_fabrik {
            let offset = root_position - skeleton.position(self.spine[root].bone);
            for map in &mut self.spine {
                map.ik_position = skeleton.position(map.bone) + offset;
            }
            for _ in 0..self.iterations {
                self.forward_reach(last_position);
                self.backward_reach(first_position);
                self.spine[root].ik_position = root_position;
            }
        } else {
            self.spine[0].ik_position = first_position;
            self.spine[root].ik_position = root_position;
        }
        self.spine[last].ik_position = last_position;

        self.map_to_solver_positions(tree, skeleton);
    }

    fn forward_reach(&mut self, position: Vector3<f32>) {
        let last = self.spine.len() - 1;
        self.spine[last].ik_position = position;
        for i in (0..last).rev() {
            let next = self.spine[i + 1].ik_position;
            let map = &mut self.spine[i];
            map.ik_position = reach_joint(&map.ik_position, &next, map.length);
        }
    }

    fn backward_reach(&mut self, position: Vector3<f32>) {
        self.spine[0].ik_position = position;
        for i in 1..self.spine.len() {
            let previous = &self.spine[i - 1];
            let (anchor, length) = (previous.ik_position, previous.length);
            let map = &mut self.spine[i];
            map.ik_position = reach_joint(&map.ik_position, &anchor, length);
        }
    }

    fn map_to_solver_positions(&self, tree: &ChainTree, skeleton: &mut Skeleton) {
        let last = self.spine.len() - 1;
        self.spine[0].set_to_ik_position(skeleton);
        self.spine[0].rotate_to_plane(tree, skeleton, 1.0);

        let shoulders = match (self.left_upper_arm, self.right_upper_arm) {
            (Some(l), Some(r)) => Some(tree.node(l).position - tree.node(r).position),
            _ => None,
        };

        let twist_weight = unit_weight(self.twist_weight);
        for i in 1..last {
            let next = self.spine[i + 1].ik_position;
            self.spine[i].swing(skeleton, &next, 1.0);
            if let Some(shoulders) = shoulders.filter(|_| twist_weight > 0.0) {
                let w = i as f32 / (self.spine.len() - 2) as f32;
                let up = next - skeleton.position(self.spine[i].bone);
                self.spine[i].twist(skeleton, &shoulders, &up, w * twist_weight);
            }
        }

        self.spine[last].set_to_ik_position(skeleton);
        self.spine[last].rotate_to_plane(tree, skeleton, 1.0);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
