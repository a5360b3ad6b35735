//! The real, variable-resolution bone hierarchy the solver reads and writes.
//!
//! A [`Skeleton`] stores each bone's local pose relative to its parent and
//! keeps a cache of world poses. Bones are stored parents-before-children,
//! which [`Skeleton::add_bone`] enforces by only accepting already-known
//! parents. Writing a bone's pose re-propagates world poses to all of its
//! descendants, so rotating an upper arm carries the forearm and hand with it.

use std::collections::HashMap;

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::SkeletonError;

/// Index of a bone inside a [`Skeleton`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoneId(pub usize);

/// A single bone: name, parent and local pose.
#[derive(Debug, Clone)]
pub struct Bone {
    /// Unique within a skeleton.
    pub name: String,
    /// Always an earlier bone, so the arena stays parents first.
    pub parent: Option<BoneId>,
    /// Pose relative to the parent, or to the world for a root bone.
    pub local: Isometry3<f32>,
}

/// Bone hierarchy with cached world poses.
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    bones: Vec<Bone>,
    world: Vec<Isometry3<f32>>,
    names: HashMap<String, BoneId>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bone. The parent must already exist.
    pub fn add_bone(
        &mut self,
        name: impl Into<String>,
        parent: Option<BoneId>,
        local: Isometry3<f32>,
    ) -> Result<BoneId, SkeletonError> {
        let name = name.into();
        if let Some(p) = parent {
            if p.0 >= self.bones.len() {
                return Err(SkeletonError::UnknownParent(p));
            }
        }
        if self.names.contains_key(&name) {
            return Err(SkeletonError::DuplicateName(name));
        }

        let id = BoneId(self.bones.len());
        let world = parent.map_or(local, |p| self.world[p.0] * local);
        self.names.insert(name.clone(), id);
        self.bones.push(Bone {
            name,
            parent,
            local,
        });
        self.world.push(world);
        Ok(id)
    }

    /// Convenience for building rigs: add a bone by local offset with identity rotation.
    pub fn add_bone_at(
        &mut self,
        name: impl Into<String>,
        parent: Option<BoneId>,
        offset: Vector3<f32>,
    ) -> Result<BoneId, SkeletonError> {
        self.add_bone(
            name,
            parent,
            Isometry3::from_parts(Translation3::from(offset), UnitQuaternion::identity()),
        )
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn contains(&self, id: BoneId) -> bool {
        id.0 < self.bones.len()
    }

    /// Look up a bone by name.
    pub fn bone_id(&self, name: &str) -> Option<BoneId> {
        self.names.get(name).copied()
    }

    pub fn bone(&self, id: BoneId) -> Option<&Bone> {
        self.bones.get(id.0)
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn parent(&self, id: BoneId) -> Option<BoneId> {
        self.bones[id.0].parent
    }

    /// World pose of a bone.
    pub fn world(&self, id: BoneId) -> &Isometry3<f32> {
        &self.world[id.0]
    }

    /// World position of a bone.
    pub fn position(&self, id: BoneId) -> Vector3<f32> {
        self.world[id.0].translation.vector
    }

    /// World rotation of a bone.
    pub fn rotation(&self, id: BoneId) -> UnitQuaternion<f32> {
        self.world[id.0].rotation
    }

    /// Local pose of a bone relative to its parent.
    pub fn local(&self, id: BoneId) -> &Isometry3<f32> {
        &self.bones[id.0].local
    }

    /// Overwrite a bone's local pose (the animation driver's entry point).
    pub fn set_local(&mut self, id: BoneId, local: Isometry3<f32>) {
        self.bones[id.0].local = local;
        self.propagate(id);
    }

    /// Set a bone's world position, keeping its world rotation.
    pub fn set_position(&mut self, id: BoneId, position: Vector3<f32>) {
        let local = match self.bones[id.0].parent {
            Some(p) => self.world[p.0]
                .inverse_transform_point(&Point3::from(position))
                .coords,
            None => position,
        };
        self.bones[id.0].local.translation = Translation3::from(local);
        self.propagate(id);
    }

    /// Set a bone's world rotation, keeping its world position.
    pub fn set_rotation(&mut self, id: BoneId, rotation: UnitQuaternion<f32>) {
        let local = match self.bones[id.0].parent {
            Some(p) => self.world[p.0].rotation.inverse() * rotation,
            None => rotation,
        };
        self.bones[id.0].local.rotation = local;
        self.propagate(id);
    }

    /// Recompute the world pose of `id` and every descendant.
    fn propagate(&mut self, id: BoneId) {
        let mut dirty = vec![false; self.bones.len()];
        dirty[id.0] = true;
        for i in id.0..self.bones.len() {
            let parent = self.bones[i].parent;
            if i != id.0 {
                match parent {
                    Some(p) if dirty[p.0] => dirty[i] = true,
                    _ => continue,
                }
            }
            let local = self.bones[i].local;
            let world = parent.map_or(local, |p| self.world[p.0] * local);
            self.world[i] = world;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    fn arm() -> (Skeleton, BoneId, BoneId, BoneId) {
        let mut s = Skeleton::new();
        let upper = s.add_bone_at("upper", None, Vector3::zeros()).unwrap();
        let fore = s
            .add_bone_at("fore", Some(upper), Vector3::new(0.3, 0.0, 0.0))
            .unwrap();
        let hand = s
            .add_bone_at("hand", Some(fore), Vector3::new(0.25, 0.0, 0.0))
            .unwrap();
        (s, upper, fore, hand)
    }

    #[test]
    fn world_positions_accumulate() {
        let (s, _, fore, hand) = arm();
        assert_relative_eq!(s.position(fore).x, 0.3, epsilon = 1e-6);
        assert_relative_eq!(s.position(hand).x, 0.55, epsilon = 1e-6);
    }

    #[test]
    fn rotating_parent_moves_children() {
        let (mut s, upper, _, hand) = arm();
        s.set_rotation(upper, UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2));
        let p = s.position(hand);
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 0.55, epsilon = 1e-5);
    }

    #[test]
    fn set_rotation_is_world_space() {
        let (mut s, upper, fore, _) = arm();
        let q = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.4);
        s.set_rotation(upper, q);
        let target = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.7);
        s.set_rotation(fore, target);
        assert_relative_eq!(s.rotation(fore).angle_to(&target), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn set_position_keeps_children_relative() {
        let (mut s, _, fore, hand) = arm();
        s.set_position(fore, Vector3::new(0.0, 1.0, 0.0));
        assert_relative_eq!(s.position(fore).y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(s.position(hand).x, 0.25, epsilon = 1e-6);
        assert_relative_eq!(s.position(hand).y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn unrelated_bones_are_not_touched() {
        let mut s = Skeleton::new();
        let root = s.add_bone_at("root", None, Vector3::zeros()).unwrap();
        let a = s.add_bone_at("a", Some(root), Vector3::x()).unwrap();
        let b = s.add_bone_at("b", Some(root), Vector3::y()).unwrap();
        s.set_position(a, Vector3::new(5.0, 0.0, 0.0));
        assert_relative_eq!(s.position(b).y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn unknown_parent_rejected() {
        let mut s = Skeleton::new();
        let err = s.add_bone_at("x", Some(BoneId(4)), Vector3::zeros()).unwrap_err();
        assert_eq!(err, SkeletonError::UnknownParent(BoneId(4)));
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut s = Skeleton::new();
        s.add_bone_at("x", None, Vector3::zeros()).unwrap();
        assert!(matches!(
            s.add_bone_at("x", None, Vector3::zeros()),
            Err(SkeletonError::DuplicateName(_))
        ));
        assert_eq!(s.bone_id("x"), Some(BoneId(0)));
    }
}
