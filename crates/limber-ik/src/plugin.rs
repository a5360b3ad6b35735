//! Bevy ECS integration for the full-body solver.
//!
//! Provides [`FullBodyIkPlugin`], which solves every [`FullBodyIk`] rig once
//! per frame.
//!
//! # Usage
//!
//! 1. Add [`FullBodyIkPlugin`] to your app.
//! 2. Spawn one entity per bone with a local [`Transform`], in the same order
//!    as the rig's [`Skeleton`].
//! 3. Build and bind a [`FullBodySolver`], then insert a [`FullBodyIk`]
//!    component holding it, the skeleton and the bone entities.
//! 4. Drive effectors through `FullBodyIk::solver` from gameplay systems.
//!
//! The solve runs in `PostUpdate` in [`FullBodyIkSet::Solve`], before
//! transform propagation. It solves against whatever the bone transforms hold
//! when it runs, so systems that animate bones must be ordered
//! `.before(FullBodyIkSet::Solve)`. Bones nothing animates still hold last
//! frame's solved pose; rigs built with [`FullBodyIk::with_fixed_transforms`]
//! have their mapped bones reset to the pose stored at that point during
//! [`FullBodyIkSet::FixTransforms`] in `PreUpdate`.

use bevy::prelude::*;
use limber_core::{BoneId, Diagnostics, Skeleton};
use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion};

use crate::solver::{FullBodySolver, SolveReport};

/// Bevy plugin that runs full-body IK each frame.
pub struct FullBodyIkPlugin;

impl Plugin for FullBodyIkPlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(
            PostUpdate,
            FullBodyIkSet::Solve.before(TransformSystem::TransformPropagate),
        )
        .add_systems(
            PreUpdate,
            fix_transforms_system.in_set(FullBodyIkSet::FixTransforms),
        )
        .add_systems(PostUpdate, full_body_ik_system.in_set(FullBodyIkSet::Solve));
    }
}

/// Where the plugin's systems run.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FullBodyIkSet {
    /// `PreUpdate`: restore the stored pose of rigs that opted in.
    FixTransforms,
    /// `PostUpdate`: solve and write the bone transforms.
    Solve,
}

/// A solved rig: the solver, its skeleton and the entity of every bone.
#[derive(Component, Debug)]
pub struct FullBodyIk {
    pub solver: FullBodySolver,
    pub skeleton: Skeleton,
    /// Bone entities indexed by [`BoneId`].
    pub bones: Vec<Entity>,
    pub diagnostics: Diagnostics,
    /// Outcome of the most recent solve.
    pub last_report: SolveReport,
    fix_transforms: bool,
}

impl FullBodyIk {
    pub fn new(solver: FullBodySolver, skeleton: Skeleton, bones: Vec<Entity>) -> Self {
        Self {
            solver,
            skeleton,
            bones,
            diagnostics: Diagnostics::new(),
            last_report: SolveReport::default(),
            fix_transforms: false,
        }
    }

    /// Store the skeleton's current pose as the default state of every
    /// mapped bone and restore it at the start of each frame. The solver
    /// must already be bound.
    #[must_use]
    pub fn with_fixed_transforms(mut self) -> Self {
        self.solver.store_default_local_state(&self.skeleton);
        self.fix_transforms = true;
        self
    }

    pub fn fixes_transforms(&self) -> bool {
        self.fix_transforms
    }

    fn is_solvable(&self) -> bool {
        self.bones.len() == self.skeleton.len() && self.solver.is_bound()
    }

    /// Copy every bone transform into the skeleton. False if an entity is gone.
    fn read_transforms(&mut self, transforms: &Query<&mut Transform, Without<FullBodyIk>>) -> bool {
        for (i, &entity) in self.bones.iter().enumerate() {
            let Ok(transform) = transforms.get(entity) else {
                return false;
            };
            self.skeleton.set_local(BoneId(i), to_isometry(transform));
        }
        true
    }

    fn write_transforms(&self, transforms: &mut Query<&mut Transform, Without<FullBodyIk>>) {
        for (i, &entity) in self.bones.iter().enumerate() {
            if let Ok(mut transform) = transforms.get_mut(entity) {
                write_isometry(&mut transform, self.skeleton.local(BoneId(i)));
            }
        }
    }
}

/// Reset the mapped bones of rigs built with
/// [`FullBodyIk::with_fixed_transforms`] to their stored pose.
#[allow(clippy::needless_pass_by_value)]
pub fn fix_transforms_system(
    mut rigs: Query<&mut FullBodyIk>,
    mut transforms: Query<&mut Transform, Without<FullBodyIk>>,
) {
    for mut rig in &mut rigs {
        let rig = &mut *rig;
        if !rig.fix_transforms || !rig.is_solvable() || !rig.read_transforms(&transforms) {
            continue;
        }
        rig.solver.fix_transforms(&mut rig.skeleton);
        rig.write_transforms(&mut transforms);
    }
}

/// Copy bone transforms into each rig's skeleton, solve, and write the
/// solved local poses back.
///
/// Rigs whose bone list does not match their skeleton, or with a missing
/// bone entity, are skipped.
#[allow(clippy::needless_pass_by_value)]
pub fn full_body_ik_system(
    mut rigs: Query<&mut FullBodyIk>,
    mut transforms: Query<&mut Transform, Without<FullBodyIk>>,
) {
    for mut rig in &mut rigs {
        let rig = &mut *rig;
        if !rig.is_solvable() || !rig.read_transforms(&transforms) {
            continue;
        }
        rig.last_report = rig.solver.update(&mut rig.skeleton, &mut rig.diagnostics);
        rig.write_transforms(&mut transforms);
    }
}

fn to_isometry(transform: &Transform) -> Isometry3<f32> {
    let t = transform.translation;
    let r = transform.rotation;
    Isometry3::from_parts(
        Translation3::new(t.x, t.y, t.z),
        UnitQuaternion::new_normalize(Quaternion::new(r.w, r.x, r.y, r.z)),
    )
}

fn write_isometry(transform: &mut Transform, pose: &Isometry3<f32>) {
    let t = pose.translation.vector;
    let r = pose.rotation;
    transform.translation = Vec3::new(t.x, t.y, t.z);
    transform.rotation = Quat::from_xyzw(r.i, r.j, r.k, r.w);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
