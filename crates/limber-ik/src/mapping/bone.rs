//! Single-bone mapping for bones outside the chains, such as the head.

use limber_core::{BoneId, SetupError, Skeleton, unit_weight};

use crate::mapping::bone_map::BoneMap;

/// Keeps a single non-node bone (usually the head) at its animated world
/// rotation after everything above it has been rewritten.
#[derive(Debug, Clone)]
pub struct BoneMapping {
    /// Keep the animated world rotation (0..=1).
    pub maintain_rotation_weight: f32,
    map: BoneMap,
}

impl BoneMapping {
    pub fn new(bone: BoneId) -> Self {
        Self {
            maintain_rotation_weight: 1.0,
            map: BoneMap::new(bone),
        }
    }

    pub fn bone(&self) -> BoneId {
        self.map.bone
    }

    pub(crate) fn validate(&self, skeleton: &Skeleton) -> Result<(), SetupError> {
        if skeleton.contains(self.map.bone) {
            Ok(())
        } else {
            Err(SetupError::MissingBone(self.map.bone))
        }
    }

    pub(crate) fn store_default_local_state(&mut self, skeleton: &Skeleton) {
        self.map.store_default_local_state(skeleton);
    }

    pub(crate) fn fix_transforms(&self, skeleton: &mut Skeleton) {
        self.map.fix_transform(skeleton, false);
    }

    pub(crate) fn read_pose(&mut self, skeleton: &Skeleton) {
        self.map.maintain_rotation(skeleton);
    }

    pub(crate) fn write_pose(&self, skeleton: &mut Skeleton, solver_weight: f32) {
        self.map
            .rotate_to_maintain(skeleton, unit_weight(self.maintain_rotation_weight) * solver_weight);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
