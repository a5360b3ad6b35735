//! Per-bone pose capture and reconstruction.
//!
//! A [`BoneMap`] remembers where a skeleton bone sits relative to a triangle
//! of solver nodes (its plane) and which local axes point at its neighbours.
//! During read it records those relations from the animated pose; during
//! write it rebuilds the bone's world pose from the solved nodes.

use limber_core::{BoneId, SetupError, Skeleton};
use nalgebra::{Isometry3, UnitQuaternion, Vector3};

use crate::chain::ChainTree;
use crate::effector::plane_rotation;
use crate::math::{EPSILON, from_to_rotation, look_rotation, nlerp, ortho_normalize};
use crate::node::NodeRef;

#[derive(Debug, Clone)]
pub(crate) struct BoneMap {
    pub bone: BoneId,
    pub node: Option<NodeRef>,
    pub length: f32,
    pub ik_position: Vector3<f32>,
    plane_bones: Option<[BoneId; 3]>,
    plane_nodes: Option<[NodeRef; 3]>,
    local_swing_axis: Vector3<f32>,
    local_twist_axis: Vector3<f32>,
    plane_position: Vector3<f32>,
    default_local_target_rotation: UnitQuaternion<f32>,
    maintained_rotation: UnitQuaternion<f32>,
    default_local_state: Isometry3<f32>,
}

impl BoneMap {
    pub fn new(bone: BoneId) -> Self {
        Self {
            bone,
            node: None,
            length: 0.0,
            ik_position: Vector3::zeros(),
            plane_bones: None,
            plane_nodes: None,
            local_swing_axis: Vector3::zeros(),
            local_twist_axis: Vector3::zeros(),
            plane_position: Vector3::zeros(),
            default_local_target_rotation: UnitQuaternion::identity(),
            maintained_rotation: UnitQuaternion::identity(),
            default_local_state: Isometry3::identity(),
        }
    }

    pub fn bind(&mut self, tree: &ChainTree) {
        self.node = tree.find(self.bone);
    }

    pub fn is_node_bone(&self) -> bool {
        self.node.is_some()
    }

    pub fn store_default_local_state(&mut self, skeleton: &Skeleton) {
        self.default_local_state = *skeleton.local(self.bone);
    }

    pub fn fix_transform(&self, skeleton: &mut Skeleton, position: bool) {
        let mut local = self.default_local_state;
        if !position {
            local.translation = skeleton.local(self.bone).translation;
        }
        skeleton.set_local(self.bone, local);
    }

    pub fn set_length(&mut self, skeleton: &Skeleton, next: BoneId) {
        self.length = (skeleton.position(next) - skeleton.position(self.bone)).norm();
    }

    /// Record the local axis pointing from `from` to `to`.
    pub fn set_local_swing_axis(&mut self, skeleton: &Skeleton, to: BoneId, from: BoneId) {
        let axis = skeleton.position(to) - skeleton.position(from);
        self.local_swing_axis = skeleton.rotation(self.bone).inverse() * axis;
    }

    pub fn set_local_twist_axis(
        &mut self,
        skeleton: &Skeleton,
        twist_direction: &Vector3<f32>,
        normal_direction: &Vector3<f32>,
    ) {
        if let Some((_, twist)) = ortho_normalize(normal_direction, twist_direction) {
            self.local_twist_axis = skeleton.rotation(self.bone).inverse() * twist;
        }
    }

    // -----------------------------------------------------------------------
    // Plane
    // -----------------------------------------------------------------------

    pub fn set_plane(
        &mut self,
        tree: &ChainTree,
        skeleton: &Skeleton,
        bones: [BoneId; 3],
    ) -> Result<(), SetupError> {
        let [a, b, c] = bones;
        let find = |bone: BoneId| tree.find(bone).ok_or(SetupError::BoneNotInChains(bone));
        self.plane_nodes = Some([find(a)?, find(b)?, find(c)?]);
        self.plane_bones = Some(bones);
        self.update_plane(skeleton, true, true);
        Ok(())
    }

    /// Whether the animated plane triangle is usable.
    pub fn check_plane(skeleton: &Skeleton, [a, b, c]: [BoneId; 3]) -> Result<(), SetupError> {
        plane_rotation(&skeleton.position(a), &skeleton.position(b), &skeleton.position(c))
            .map(|_| ())
            .ok_or(SetupError::DegeneratePlane(a, b, c))
    }

    /// Capture the bone's rotation and/or position relative to its plane.
    pub fn update_plane(&mut self, skeleton: &Skeleton, rotation: bool, position: bool) {
        let Some([a, b, c]) = self.plane_bones else {
            return;
        };
        let t = triangle_rotation(&skeleton.position(a), &skeleton.position(b), &skeleton.position(c));
        if rotation {
            self.default_local_target_rotation = t.inverse() * skeleton.rotation(self.bone);
        }
        if position {
            self.plane_position = t.inverse() * (skeleton.position(self.bone) - skeleton.position(a));
        }
    }

    /// Orientation of the solved plane triangle.
    pub fn target_rotation(&self, tree: &ChainTree) -> UnitQuaternion<f32> {
        let Some([a, b, c]) = self.plane_nodes else {
            return UnitQuaternion::identity();
        };
        triangle_rotation(&tree.node(a).position, &tree.node(b).position, &tree.node(c).position)
    }

    /// The bone's position rebuilt from the solved plane.
    pub fn plane_position(&self, tree: &ChainTree) -> Vector3<f32> {
        let Some([a, ..]) = self.plane_nodes else {
            return self.ik_position;
        };
        tree.node(a).position + self.target_rotation(tree) * self.plane_position
    }

    pub fn rotate_to_plane(&self, tree: &ChainTree, skeleton: &mut Skeleton, weight: f32) {
        let r = self.target_rotation(tree) * self.default_local_target_rotation;
        set_rotation_weighted(skeleton, self.bone, r, weight);
    }

    // -----------------------------------------------------------------------
    // Positions
    // -----------------------------------------------------------------------

    pub fn set_ik_position(&mut self, skeleton: &Skeleton) {
        self.ik_position = skeleton.position(self.bone);
    }

    pub fn set_to_ik_position(&self, skeleton: &mut Skeleton) {
        skeleton.set_position(self.bone, self.ik_position);
    }

    /// Move the bone onto its solver node.
    pub fn fix_to_node(&self, tree: &ChainTree, skeleton: &mut Skeleton, weight: f32) {
        let Some(node) = self.node else {
            return;
        };
        let target = tree.node(node).position;
        let position = if weight >= 1.0 {
            target
        } else {
            skeleton.position(self.bone).lerp(&target, weight)
        };
        skeleton.set_position(self.bone, position);
    }

    // -----------------------------------------------------------------------
    // Rotations
    // -----------------------------------------------------------------------

    pub fn maintain_rotation(&mut self, skeleton: &Skeleton) {
        self.maintained_rotation = skeleton.rotation(self.bone);
    }

    pub fn rotate_to_maintain(&self, skeleton: &mut Skeleton, weight: f32) {
        if weight <= 0.0 {
            return;
        }
        set_rotation_weighted(skeleton, self.bone, self.maintained_rotation, weight);
    }

    /// Rotate so the swing axis points from the bone at `target`.
    pub fn swing(&self, skeleton: &mut Skeleton, target: &Vector3<f32>, weight: f32) {
        let from = skeleton.position(self.bone);
        self.swing_between(skeleton, target, &from, weight);
    }

    /// Rotate so the swing axis points along `to - from`.
    pub fn swing_between(&self, skeleton: &mut Skeleton, to: &Vector3<f32>, from: &Vector3<f32>, weight: f32) {
        if weight <= 0.0 {
            return;
        }
        let rotation = skeleton.rotation(self.bone);
        let r = from_to_rotation(&(rotation * self.local_swing_axis), &(to - from)) * rotation;
        set_rotation_weighted(skeleton, self.bone, r, weight);
    }

    /// Rotate the twist axis onto `twist_direction` made orthogonal to `normal_direction`.
    pub fn twist(
        &self,
        skeleton: &mut Skeleton,
        twist_direction: &Vector3<f32>,
        normal_direction: &Vector3<f32>,
        weight: f32,
    ) {
        if weight <= 0.0 {
            return;
        }
        let Some((_, twist)) = ortho_normalize(normal_direction, twist_direction) else {
            return;
        };
        let rotation = skeleton.rotation(self.bone);
        let r = from_to_rotation(&(rotation * self.local_twist_axis), &twist) * rotation;
        set_rotation_weighted(skeleton, self.bone, r, weight);
    }

    /// Blend toward the node's effector rotation by its rotation weight.
    pub fn rotate_to_effector(&self, tree: &ChainTree, skeleton: &mut Skeleton, weight: f32) {
        let Some(node) = self.node else {
            return;
        };
        let node = tree.node(node);
        let w = weight * node.effector_rotation_weight;
        if w <= 0.0 {
            return;
        }
        set_rotation_weighted(skeleton, self.bone, node.rotation, w);
    }
}

/// Look rotation of a triangle, identity when its first and third points meet.
fn triangle_rotation(p1: &Vector3<f32>, p2: &Vector3<f32>, p3: &Vector3<f32>) -> UnitQuaternion<f32> {
    if (p3 - p1).norm_squared() <= EPSILON {
        return UnitQuaternion::identity();
    }
    look_rotation(&(p2 - p1), &(p3 - p1))
}

fn set_rotation_weighted(skeleton: &mut Skeleton, bone: BoneId, rotation: UnitQuaternion<f32>, weight: f32) {
    if weight >= 1.0 {
        skeleton.set_rotation(bone, rotation);
        return;
    }
    let current = skeleton.rotation(bone);
    skeleton.set_rotation(bone, nlerp(&current, &rotation, weight));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use approx::assert_relative_eq;
    use limber_core::ChainWeights;

    fn setup() -> (Skeleton, ChainTree, [BoneId; 3]) {
        let mut s = Skeleton::new();
        let a = s.add_bone_at("a", None, Vector3::zeros()).unwrap();
        let b = s.add_bone_at("b", Some(a), Vector3::new(0.3, 0.05, 0.0)).unwrap();
        let c = s.add_bone_at("c", Some(b), Vector3::new(0.25, -0.05, 0.0)).unwrap();
        let mut tree = ChainTree::new();
        tree.add(Chain::new(&[a, b, c], ChainWeights::default()));
        let mut diag = limber_core::Diagnostics::new();
        tree.read_pose(&s, false, &mut diag);
        (s, tree, [a, b, c])
    }

    #[test]
    fn rotate_to_plane_is_identity_on_animated_pose() {
        let (mut s, tree, [a, b, c]) = setup();
        let mut map = BoneMap::new(a);
        map.bind(&tree);
        map.set_plane(&tree, &s, [a, b, c]).unwrap();
        let before = s.rotation(a);
        map.rotate_to_plane(&tree, &mut s, 1.0);
        assert_relative_eq!(s.rotation(a).angle_to(&before), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn rotate_to_plane_follows_moved_nodes() {
        let (mut s, mut tree, [a, b, c]) = setup();
        let mut map = BoneMap::new(a);
        map.bind(&tree);
        map.set_plane(&tree, &s, [a, b, c]).unwrap();

        // Rotate the solved triangle a quarter turn about Z.
        let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f32::consts::FRAC_PI_2);
        for bone in [b, c] {
            let r = tree.find(bone).unwrap();
            let p = tree.node(r).position;
            tree.node_mut(r).position = q * p;
        }
        map.rotate_to_plane(&tree, &mut s, 1.0);
        assert_relative_eq!(s.position(b), q * Vector3::new(0.3, 0.05, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn plane_position_round_trips() {
        let (s, tree, [a, b, c]) = setup();
        let mut map = BoneMap::new(b);
        map.bind(&tree);
        map.set_plane(&tree, &s, [a, c, b]).unwrap();
        assert_relative_eq!(map.plane_position(&tree), s.position(b), epsilon = 1e-5);
    }

    #[test]
    fn swing_points_axis_at_target() {
        let (mut s, tree, [a, b, _]) = setup();
        let mut map = BoneMap::new(a);
        map.bind(&tree);
        map.set_local_swing_axis(&s, b, a);
        map.swing(&mut s, &Vector3::new(0.0, 1.0, 0.0), 1.0);
        let dir = (s.position(b) - s.position(a)).normalize();
        assert_relative_eq!(dir, Vector3::y(), epsilon = 1e-5);
    }

    #[test]
    fn maintain_restores_world_rotation() {
        let (mut s, tree, [a, b, _]) = setup();
        let mut map = BoneMap::new(b);
        map.bind(&tree);
        map.maintain_rotation(&s);
        s.set_rotation(a, UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 1.0));
        map.rotate_to_maintain(&mut s, 1.0);
        assert_relative_eq!(s.rotation(b).angle(), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn fix_transform_restores_local_state() {
        let (mut s, tree, [a, ..]) = setup();
        let mut map = BoneMap::new(a);
        map.bind(&tree);
        map.store_default_local_state(&s);
        s.set_rotation(a, UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.5));
        s.set_position(a, Vector3::new(1.0, 2.0, 3.0));
        map.fix_transform(&mut s, true);
        assert_relative_eq!(s.position(a), Vector3::zeros(), epsilon = 1e-6);
        assert_relative_eq!(s.rotation(a).angle(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn collinear_plane_rejected() {
        let mut s = Skeleton::new();
        let a = s.add_bone_at("a", None, Vector3::zeros()).unwrap();
        let b = s.add_bone_at("b", Some(a), Vector3::x()).unwrap();
        let c = s.add_bone_at("c", Some(b), Vector3::x()).unwrap();
        assert_eq!(
            BoneMap::check_plane(&s, [a, b, c]),
            Err(SetupError::DegeneratePlane(a, b, c))
        );
    }
}
