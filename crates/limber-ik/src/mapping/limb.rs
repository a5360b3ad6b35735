//! Limb mapping: writes a three-node chain back onto upper, lower and end
//! bones, with an optional clavicle-like parent swung toward the first node.

use limber_core::{BoneId, SetupError, Skeleton, unit_weight};

use crate::chain::ChainTree;
use crate::mapping::bone_map::BoneMap;

/// Maps a three-node limb chain (and an optional clavicle-like parent) onto
/// the skeleton.
#[derive(Debug, Clone)]
pub struct LimbMapping {
    /// Keep the last bone's animated world rotation (0..=1).
    pub maintain_rotation_weight: f32,
    /// Blend of the solved limb over the animated one (0..=1).
    pub weight: f32,
    parent: Option<BoneMap>,
    bone1: BoneMap,
    bone2: BoneMap,
    bone3: BoneMap,
}

impl LimbMapping {
    pub fn new(parent: Option<BoneId>, bones: [BoneId; 3]) -> Self {
        let [b1, b2, b3] = bones;
        Self {
            maintain_rotation_weight: 0.0,
            weight: 1.0,
            parent: parent.map(BoneMap::new),
            bone1: BoneMap::new(b1),
            bone2: BoneMap::new(b2),
            bone3: BoneMap::new(b3),
        }
    }

    pub fn bones(&self) -> [BoneId; 3] {
        [self.bone1.bone, self.bone2.bone, self.bone3.bone]
    }

    pub fn parent_bone(&self) -> Option<BoneId> {
        self.parent.as_ref().map(|p| p.bone)
    }

    pub(crate) fn validate(&self, tree: &ChainTree, skeleton: &Skeleton) -> Result<(), SetupError> {
        if let Some(parent) = self.parent_bone() {
            if !skeleton.contains(parent) {
                return Err(SetupError::MissingBone(parent));
            }
        }
        let bones = self.bones();
        for bone in bones {
            if !skeleton.contains(bone) {
                return Err(SetupError::MissingBone(bone));
            }
            if tree.find(bone).is_none() {
                return Err(SetupError::BoneNotInChains(bone));
            }
        }
        BoneMap::check_plane(skeleton, bones)
    }

    pub(crate) fn bind(&mut self, tree: &ChainTree, skeleton: &Skeleton) -> Result<(), SetupError> {
        let [b1, b2, b3] = self.bones();
        for map in [&mut self.bone1, &mut self.bone2, &mut self.bone3] {
            map.bind(tree);
        }
        self.bone1.set_plane(tree, skeleton, [b1, b2, b3])?;
        self.bone2.set_plane(tree, skeleton, [b2, b3, b1])?;
        if let Some(parent) = self.parent.as_mut() {
            let bone = parent.bone;
            parent.bind(tree);
            parent.set_local_swing_axis(skeleton, b1, bone);
        }
        Ok(())
    }

    pub(crate) fn store_default_local_state(&mut self, skeleton: &Skeleton) {
        for map in self.maps_mut() {
            map.store_default_local_state(skeleton);
        }
    }

    pub(crate) fn fix_transforms(&self, skeleton: &mut Skeleton) {
        if let Some(parent) = &self.parent {
            parent.fix_transform(skeleton, false);
        }
        self.bone1.fix_transform(skeleton, true);
        self.bone2.fix_transform(skeleton, false);
        self.bone3.fix_transform(skeleton, false);
    }

    pub(crate) fn read_pose(&mut self, skeleton: &Skeleton) {
        self.bone1.update_plane(skeleton, true, true);
        self.bone2.update_plane(skeleton, true, false);
        self.weight = unit_weight(self.weight);
        self.maintain_rotation_weight = unit_weight(self.maintain_rotation_weight);
        self.bone3.maintain_rotation(skeleton);
    }

    pub(crate) fn write_pose(
        &self,
        tree: &ChainTree,
        skeleton: &mut Skeleton,
        full_body: bool,
        master_weight: f32,
    ) {
        if self.weight <= 0.0 {
            return;
        }
        if full_body {
            if let (Some(parent), Some(node)) = (&self.parent, self.bone1.node) {
                parent.swing(skeleton, &tree.node(node).position, self.weight);
            }
            self.bone1.fix_to_node(tree, skeleton, self.weight);
        }

        self.bone1.rotate_to_plane(tree, skeleton, self.weight);
        self.bone2.rotate_to_plane(tree, skeleton, self.weight);
        self.bone3
            .rotate_to_maintain(skeleton, self.maintain_rotation_weight * self.weight * master_weight);
        self.bone3.rotate_to_effector(tree, skeleton, self.weight);
    }

    fn maps_mut(&mut self) -> impl Iterator<Item = &mut BoneMap> {
        self.parent
            .iter_mut()
            .chain([&mut self.bone1, &mut self.bone2, &mut self.bone3])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effector::{Effector, EffectorHandle};
    use crate::solver::FullBodySolver;
    use approx::assert_relative_eq;
    use limber_core::{ChainWeights, Diagnostics, SolverConfig};
    use limber_test_utils::limb_skeleton;
    use nalgebra::{UnitQuaternion, Vector3};

    fn limb_solver(mapping: LimbMapping) -> (Skeleton, FullBodySolver, [BoneId; 3]) {
        let (s, bones) = limb_skeleton();
        let mut solver = FullBodySolver::new(SolverConfig::default());
        solver.add_chain(&bones, ChainWeights::default());
        let hand = solver.add_effector(Effector::new(bones[2]));
        solver.add_limb_mapping(mapping);
        solver.bind(&s).unwrap();
        let e = solver.effector_mut(hand).unwrap();
        e.position = Vector3::new(0.1, 0.3, 0.2);
        e.position_weight = 1.0;
        (s, solver, bones)
    }

    #[test]
    fn accessors_report_bones() {
        let (_, bones) = limb_skeleton();
        let mapping = LimbMapping::new(Some(BoneId(7)), bones);
        assert_eq!(mapping.bones(), bones);
        assert_eq!(mapping.parent_bone(), Some(BoneId(7)));
    }

    #[test]
    fn missing_parent_is_rejected() {
        let (s, bones) = limb_skeleton();
        let mut solver = FullBodySolver::new(SolverConfig::default());
        solver.add_chain(&bones, ChainWeights::default());
        solver.add_limb_mapping(LimbMapping::new(Some(BoneId(42)), bones));
        assert_eq!(solver.validate(&s), Err(SetupError::MissingBone(BoneId(42))));
    }

    #[test]
    fn bone_outside_chains_is_rejected() {
        let (mut s, bones) = limb_skeleton();
        let extra = s.add_bone_at("extra", Some(bones[2]), Vector3::x() * 0.1).unwrap();
        let mut solver = FullBodySolver::new(SolverConfig::default());
        solver.add_chain(&bones, ChainWeights::default());
        solver.add_limb_mapping(LimbMapping::new(None, [bones[0], bones[1], extra]));
        assert_eq!(solver.validate(&s), Err(SetupError::BoneNotInChains(extra)));
    }

    #[test]
    fn zero_weight_writes_nothing() {
        let (_, bones) = limb_skeleton();
        let (mut s, mut solver, _) = limb_solver(LimbMapping::new(None, bones));
        solver.limb_mapping_mut(0).unwrap().weight = 0.0;
        let before: Vec<_> = bones.iter().map(|&b| *s.world(b)).collect();

        solver.update(&mut s, &mut Diagnostics::new());

        for (&bone, pose) in bones.iter().zip(&before) {
            assert_eq!(s.world(bone), pose);
        }
    }

    #[test]
    fn maintained_rotation_survives_the_solve() {
        let (_, bones) = limb_skeleton();
        let mut mapping = LimbMapping::new(None, bones);
        mapping.maintain_rotation_weight = 1.0;
        let (mut s, mut solver, _) = limb_solver(mapping);
        let animated = s.rotation(bones[2]);

        solver.update(&mut s, &mut Diagnostics::new());

        assert_relative_eq!(s.rotation(bones[2]).angle_to(&animated), 0.0, epsilon = 1e-4);
        assert_relative_eq!(s.position(bones[2]), Vector3::new(0.1, 0.3, 0.2), epsilon = 1e-3);
    }

    #[test]
    fn end_bone_takes_the_effector_rotation() {
        let (_, bones) = limb_skeleton();
        let target = UnitQuaternion::from_euler_angles(0.4, -0.9, 0.2);
        let mut angles = Vec::new();
        for rotation_weight in [1.0, 0.5] {
            let (mut s, mut solver, _) = limb_solver(LimbMapping::new(None, bones));
            let e = solver.effector_mut(EffectorHandle(0)).unwrap();
            e.rotation = target;
            e.rotation_weight = rotation_weight;

            solver.update(&mut s, &mut Diagnostics::new());

            assert_relative_eq!(s.position(bones[2]), Vector3::new(0.1, 0.3, 0.2), epsilon = 1e-3);
            angles.push(s.rotation(bones[2]).angle_to(&target));
        }
        assert_relative_eq!(angles[0], 0.0, epsilon = 1e-4);
        assert!(angles[1] > 1e-2, "half weight stops short of the target");
    }
}
