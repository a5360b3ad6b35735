//! Skeleton fixtures.
//!
//! All fixtures are Y up, facing +Z, with identity bone rotations and a
//! slight natural bend in every limb so bend constraints have a plane.

use limber_core::{BoneId, Skeleton};
use nalgebra::Vector3;

/// Bone lengths of [`limb_skeleton`].
pub const LIMB_LENGTHS: [f32; 2] = [0.3, 0.25];

/// A two-bone limb along +X with its middle joint bent toward -Z.
///
/// Returns the skeleton and the `[root, middle, end]` bones.
pub fn limb_skeleton() -> (Skeleton, [BoneId; 3]) {
    let mut s = Skeleton::new();
    // 0.96/0.28 keeps the segment lengths exact.
    let upper = s
        .add_bone_at("upper", None, Vector3::zeros())
        .expect("fixture bone");
    let lower = s
        .add_bone_at("lower", Some(upper), Vector3::new(0.288, 0.0, -0.084))
        .expect("fixture bone");
    let end = s
        .add_bone_at("end", Some(lower), Vector3::new(0.24, 0.0, 0.07))
        .expect("fixture bone");
    (s, [upper, lower, end])
}

/// Bones of [`biped_skeleton`].
#[derive(Debug, Clone, Copy)]
pub struct BipedBones {
    pub pelvis: BoneId,
    pub spine: BoneId,
    pub chest: BoneId,
    pub head: BoneId,
    pub left_clavicle: BoneId,
    pub right_clavicle: BoneId,
    /// Upper arm, forearm, hand.
    pub left_arm: [BoneId; 3],
    pub right_arm: [BoneId; 3],
    /// Thigh, calf, foot.
    pub left_leg: [BoneId; 3],
    pub right_leg: [BoneId; 3],
}

impl BipedBones {
    /// Every bone, parents first.
    pub fn all(&self) -> Vec<BoneId> {
        let mut bones = vec![self.pelvis, self.spine, self.chest, self.head];
        bones.extend([self.left_clavicle, self.right_clavicle]);
        for limb in [self.left_arm, self.right_arm, self.left_leg, self.right_leg] {
            bones.extend(limb);
        }
        bones.sort();
        bones
    }
}

/// A standing biped with the pelvis at 1 m, arms held out to the sides and
/// slightly bent, knees slightly forward.
pub fn biped_skeleton() -> (Skeleton, BipedBones) {
    let mut s = Skeleton::new();
    let mut add = |name: &str, parent: Option<BoneId>, x: f32, y: f32, z: f32| {
        s.add_bone_at(name, parent, Vector3::new(x, y, z))
            .expect("fixture bone")
    };

    let pelvis = add("pelvis", None, 0.0, 1.0, 0.0);
    let spine = add("spine", Some(pelvis), 0.0, 0.15, 0.0);
    let chest = add("chest", Some(spine), 0.0, 0.2, 0.0);
    let head = add("head", Some(chest), 0.0, 0.25, 0.0);

    let mut arm = |side: f32, prefix: &str| {
        let clavicle = add(&format!("{prefix}_clavicle"), Some(chest), 0.05 * side, 0.15, 0.0);
        let upper = add(&format!("{prefix}_upper_arm"), Some(clavicle), 0.12 * side, 0.0, 0.0);
        let fore = add(&format!("{prefix}_forearm"), Some(upper), 0.28 * side, 0.0, -0.03);
        let hand = add(&format!("{prefix}_hand"), Some(fore), 0.25 * side, 0.0, 0.03);
        (clavicle, [upper, fore, hand])
    };
    let (left_clavicle, left_arm) = arm(1.0, "left");
    let (right_clavicle, right_arm) = arm(-1.0, "right");

    let mut leg = |side: f32, prefix: &str| {
        let thigh = add(&format!("{prefix}_thigh"), Some(pelvis), 0.1 * side, -0.05, 0.0);
        let calf = add(&format!("{prefix}_calf"), Some(thigh), 0.0, -0.42, 0.03);
        let foot = add(&format!("{prefix}_foot"), Some(calf), 0.0, -0.42, -0.03);
        [thigh, calf, foot]
    };
    let left_leg = leg(1.0, "left");
    let right_leg = leg(-1.0, "right");

    let bones = BipedBones {
        pelvis,
        spine,
        chest,
        head,
        left_clavicle,
        right_clavicle,
        left_arm,
        right_arm,
        left_leg,
        right_leg,
    };
    (s, bones)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
