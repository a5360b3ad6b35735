//! The full-body solver: chain tree, effectors and mappings driven once per
//! frame.
//!
//! Each [`update`](FullBodySolver::update) reads the animated pose from the
//! skeleton, relaxes the chain tree `iterations` times, finalizes every bend,
//! and writes the result back through the mappings.

use std::fmt;

use limber_core::{
    BoneId, ChainWeights, Diagnostics, MAX_ITERATIONS, SetupError, Skeleton, SolverConfig, SolverWarning,
    unit_weight,
};
use nalgebra::Vector3;

use crate::chain::{Chain, ChainHandle, ChainTree, ChildConstraint};
use crate::effector::{Effector, EffectorHandle, FrameParams};
use crate::hooks::{SolverHook, SolverPhase};
use crate::mapping::{BoneMapping, LimbMapping, SpineMapping};
use crate::node::NodeRef;

/// Largest node movement in an iteration that still counts as converged when
/// no tolerance is configured.
pub const CONVERGENCE_EPSILON: f32 = 1e-5;

/// Outcome of one [`FullBodySolver::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolveReport {
    /// Iterations actually run.
    pub iterations: u32,
    /// Whether the last iteration moved no node further than the tolerance.
    pub converged: bool,
    /// Largest node displacement during the last iteration.
    pub max_node_delta: f32,
}

/// Multi-chain full-body IK solver.
pub struct FullBodySolver {
    config: SolverConfig,
    tree: ChainTree,
    effectors: Vec<Effector>,
    spine: Option<SpineMapping>,
    limbs: Vec<LimbMapping>,
    bones: Vec<BoneMapping>,
    hooks: Vec<Box<dyn SolverHook>>,
    bound: bool,
    bound_bones: usize,
    animated_root: Vector3<f32>,
}

impl fmt::Debug for FullBodySolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FullBodySolver")
            .field("config", &self.config)
            .field("chains", &self.tree.len())
            .field("effectors", &self.effectors.len())
            .field("hooks", &self.hooks.len())
            .field("bound", &self.bound)
            .finish_non_exhaustive()
    }
}

impl FullBodySolver {
    /// Out-of-range config values are clamped, see [`SolverConfig::sanitized`].
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config: config.sanitized(),
            tree: ChainTree::new(),
            effectors: Vec::new(),
            spine: None,
            limbs: Vec::new(),
            bones: Vec::new(),
            hooks: Vec::new(),
            bound: false,
            bound_bones: 0,
            animated_root: Vector3::zeros(),
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn tree(&self) -> &ChainTree {
        &self.tree
    }

    // -----------------------------------------------------------------------
    // Building
    // -----------------------------------------------------------------------
    //
    // Topology changes unbind the solver; call `bind` again before updating.

    /// Add a chain over one to three bones. The first chain added is the root.
    pub fn add_chain(&mut self, bones: &[BoneId], weights: ChainWeights) -> ChainHandle {
        self.bound = false;
        self.tree.add(Chain::new(bones, weights))
    }

    pub fn add_child(&mut self, parent: ChainHandle, child: ChainHandle) {
        self.bound = false;
        self.tree.add_child(parent, child);
    }

    /// Link the first nodes of two children of `parent`.
    pub fn add_child_constraint(&mut self, parent: ChainHandle, constraint: ChildConstraint) {
        self.bound = false;
        if let Some(chain) = self.tree.chain_mut(parent) {
            chain.add_child_constraint(constraint);
        }
    }

    pub fn add_effector(&mut self, effector: Effector) -> EffectorHandle {
        self.bound = false;
        self.effectors.push(effector);
        EffectorHandle(self.effectors.len() - 1)
    }

    pub fn set_spine_mapping(&mut self, mut mapping: SpineMapping) {
        self.bound = false;
        mapping.iterations = self.config.spine_iterations;
        mapping.twist_weight = self.config.spine_twist_weight;
        self.spine = Some(mapping);
    }

    pub fn add_limb_mapping(&mut self, mapping: LimbMapping) -> usize {
        self.bound = false;
        self.limbs.push(mapping);
        self.limbs.len() - 1
    }

    pub fn add_bone_mapping(&mut self, mapping: BoneMapping) -> usize {
        self.bound = false;
        self.bones.push(mapping);
        self.bones.len() - 1
    }

    pub fn add_hook(&mut self, hook: impl SolverHook + 'static) {
        self.hooks.push(Box::new(hook));
    }

    // -----------------------------------------------------------------------
    // Runtime control
    // -----------------------------------------------------------------------

    pub fn chain(&self, handle: impl Into<ChainHandle>) -> Option<&Chain> {
        self.tree.chain(handle.into())
    }

    /// Runtime access to chain weights and the bend constraint.
    pub fn chain_mut(&mut self, handle: impl Into<ChainHandle>) -> Option<&mut Chain> {
        self.tree.chain_mut(handle.into())
    }

    pub fn effector(&self, handle: impl Into<EffectorHandle>) -> Option<&Effector> {
        self.effectors.get(handle.into().0)
    }

    pub fn effector_mut(&mut self, handle: impl Into<EffectorHandle>) -> Option<&mut Effector> {
        self.effectors.get_mut(handle.into().0)
    }

    pub fn effectors(&self) -> &[Effector] {
        &self.effectors
    }

    pub fn spine_mapping(&self) -> Option<&SpineMapping> {
        self.spine.as_ref()
    }

    pub fn spine_mapping_mut(&mut self) -> Option<&mut SpineMapping> {
        self.spine.as_mut()
    }

    pub fn limb_mapping_mut(&mut self, index: usize) -> Option<&mut LimbMapping> {
        self.limbs.get_mut(index)
    }

    pub fn bone_mapping_mut(&mut self, index: usize) -> Option<&mut BoneMapping> {
        self.bones.get_mut(index)
    }

    pub fn weight(&self) -> f32 {
        self.config.weight
    }

    /// Master weight, clamped to 0..=1. At 0 updates only clear pending offsets.
    pub fn set_weight(&mut self, weight: f32) {
        self.config.weight = unit_weight(weight);
    }

    pub fn iterations(&self) -> u32 {
        self.config.iterations
    }

    /// Iterations per frame, clamped to 0..=10.
    pub fn set_iterations(&mut self, iterations: u32) {
        self.config.iterations = iterations.min(MAX_ITERATIONS);
    }

    // -----------------------------------------------------------------------
    // Setup
    // -----------------------------------------------------------------------

    /// Check that the solver can bind to `skeleton`. The error's message
    /// names the first problem found.
    pub fn validate(&self, skeleton: &Skeleton) -> Result<(), SetupError> {
        self.tree.validate(skeleton)?;
        for effector in &self.effectors {
            effector.validate(&self.tree, skeleton)?;
        }
        if let Some(spine) = &self.spine {
            spine.validate(&self.tree, skeleton)?;
        }
        for limb in &self.limbs {
            limb.validate(&self.tree, skeleton)?;
        }
        for bone in &self.bones {
            bone.validate(skeleton)?;
        }
        Ok(())
    }

    pub fn is_valid(&self, skeleton: &Skeleton) -> bool {
        self.validate(skeleton).is_ok()
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Validate and bind to `skeleton` in its current pose.
    pub fn bind(&mut self, skeleton: &Skeleton) -> Result<(), SetupError> {
        self.bound = false;
        if let Err(e) = self.validate(skeleton).and_then(|()| self.initiate(skeleton)) {
            tracing::error!(error = %e, "full-body IK setup failed");
            return Err(e);
        }
        self.bound = true;
        self.bound_bones = skeleton.len();
        tracing::debug!(
            chains = self.tree.len(),
            effectors = self.effectors.len(),
            limbs = self.limbs.len(),
            spine = self.spine.is_some(),
            "full-body IK solver bound"
        );
        Ok(())
    }

    fn initiate(&mut self, skeleton: &Skeleton) -> Result<(), SetupError> {
        self.tree.bind(skeleton)?;
        for effector in &mut self.effectors {
            effector.bind(&self.tree, skeleton)?;
        }
        if let Some(spine) = &mut self.spine {
            spine.bind(&self.tree, skeleton)?;
        }
        for limb in &mut self.limbs {
            limb.bind(&self.tree, skeleton)?;
        }
        Ok(())
    }

    /// Remember the local pose of every mapped bone. Does nothing unless
    /// bound to a skeleton of this size.
    pub fn store_default_local_state(&mut self, skeleton: &Skeleton) {
        if !self.fits(skeleton) {
            return;
        }
        if let Some(spine) = &mut self.spine {
            spine.store_default_local_state(skeleton);
        }
        for limb in &mut self.limbs {
            limb.store_default_local_state(skeleton);
        }
        for bone in &mut self.bones {
            bone.store_default_local_state(skeleton);
        }
    }

    /// Restore the local poses captured by
    /// [`store_default_local_state`](Self::store_default_local_state).
    pub fn fix_transforms(&self, skeleton: &mut Skeleton) {
        if !self.fits(skeleton) {
            return;
        }
        if let Some(spine) = &self.spine {
            spine.fix_transforms(skeleton);
        }
        for limb in &self.limbs {
            limb.fix_transforms(skeleton);
        }
        for bone in &self.bones {
            bone.fix_transforms(skeleton);
        }
    }

    fn fits(&self, skeleton: &Skeleton) -> bool {
        self.bound && skeleton.len() == self.bound_bones
    }

    // -----------------------------------------------------------------------
    // Per-frame
    // -----------------------------------------------------------------------

    /// Solve one frame against the skeleton's current (animated) pose and
    /// write the result back onto it. Does nothing until bound, and skips
    /// the frame with [`SolverWarning::SkeletonMismatch`] when the skeleton
    /// is not the size it was bound to.
    pub fn update(&mut self, skeleton: &mut Skeleton, diagnostics: &mut Diagnostics) -> SolveReport {
        if !self.bound {
            return SolveReport::default();
        }
        if skeleton.len() != self.bound_bones {
            diagnostics.report(SolverWarning::SkeletonMismatch {
                bound: self.bound_bones,
                found: skeleton.len(),
            });
            return SolveReport::default();
        }
        if self.config.weight <= 0.0 {
            for effector in &mut self.effectors {
                effector.position_offset.drain();
            }
            return SolveReport::default();
        }

        self.run_hooks(SolverPhase::PreRead, skeleton);
        self.read_pose(skeleton, diagnostics);
        self.run_hooks(SolverPhase::PreSolve, skeleton);
        let report = self.solve(skeleton, diagnostics);
        self.run_hooks(SolverPhase::PostSolve, skeleton);
        self.write_pose(skeleton);
        report
    }

    fn read_pose(&mut self, skeleton: &mut Skeleton, diagnostics: &mut Diagnostics) {
        let master = self.config.weight;
        let effectors = &self.effectors;
        self.tree.limit_bends(skeleton, master, |c| {
            effectors
                .iter()
                .find(|e| e.node() == NodeRef::new(c, 2))
                .map_or(0.0, |e| unit_weight(e.position_weight))
        });

        let frame = FrameParams {
            master_weight: master,
            iterations: self.config.iterations,
            max_offset: self.config.max_offset,
        };
        for effector in &self.effectors {
            effector.reset_offset(&mut self.tree);
        }
        for effector in &mut self.effectors {
            effector.pre_solve(&mut self.tree, skeleton, frame, diagnostics);
        }

        let full_body = self.config.iterations > 0;
        self.tree.read_pose(skeleton, full_body, diagnostics);
        self.animated_root = skeleton.position(self.tree.chains()[0].nodes()[0].bone);

        if full_body {
            if let Some(spine) = &mut self.spine {
                spine.read_pose(skeleton);
            }
            for bone in &mut self.bones {
                bone.read_pose(skeleton);
            }
        }
        for limb in &mut self.limbs {
            limb.read_pose(skeleton);
        }
    }

    fn solve(&mut self, skeleton: &Skeleton, diagnostics: &mut Diagnostics) -> SolveReport {
        let iterations = self.config.iterations;
        let master = self.config.weight;
        let mut report = SolveReport::default();
        let mut previous: Vec<Vector3<f32>> = Vec::new();

        for i in 0..iterations {
            self.run_hooks(SolverPhase::PreIteration(i), skeleton);
            previous.clear();
            previous.extend(self.tree.all_nodes().map(|n| n.position));

            self.update_effectors(true, diagnostics);
            self.tree.push(0);
            self.tree.reach(0);
            self.update_effectors(false, diagnostics);
            self.tree.solve_trigonometric(0, false, master, diagnostics);
            self.tree.stage1(0);
            self.update_effectors(false, diagnostics);
            let root = self.tree.chains()[0].nodes()[0]
                .position
                .lerp(&self.animated_root, self.config.root_pin);
            self.tree.stage2(0, root, iterations);

            report.iterations = i + 1;
            report.max_node_delta = previous
                .iter()
                .zip(self.tree.all_nodes())
                .map(|(p, n)| (n.position - p).norm())
                .fold(0.0, f32::max);
            self.run_hooks(SolverPhase::PostIteration(i), skeleton);

            if self.config.tolerance > 0.0 && report.max_node_delta <= self.config.tolerance {
                break;
            }
        }

        self.run_hooks(SolverPhase::PreBend, skeleton);
        self.update_effectors(true, diagnostics);
        self.tree.solve_trigonometric(0, true, master, diagnostics);

        let threshold = if self.config.tolerance > 0.0 {
            self.config.tolerance
        } else {
            CONVERGENCE_EPSILON
        };
        report.converged = report.iterations > 0 && report.max_node_delta <= threshold;
        report
    }

    fn update_effectors(&mut self, end_effectors: bool, diagnostics: &mut Diagnostics) {
        for effector in &mut self.effectors {
            if effector.is_end_effector() == end_effectors {
                effector.update(&mut self.tree, diagnostics);
            }
        }
    }

    fn write_pose(&mut self, skeleton: &mut Skeleton) {
        let weight = self.config.weight;
        if weight <= 0.0 {
            return;
        }
        let full_body = self.config.iterations > 0;
        if full_body {
            if let Some(spine) = &mut self.spine {
                spine.write_pose(&self.tree, skeleton);
            }
            for bone in &self.bones {
                bone.write_pose(skeleton, weight);
            }
        }
        for limb in &self.limbs {
            limb.write_pose(&self.tree, skeleton, full_body, weight);
        }
    }

    /// Run every hook for `phase`. Hooks registered meanwhile are kept.
    fn run_hooks(&mut self, phase: SolverPhase, skeleton: &Skeleton) {
        if self.hooks.is_empty() {
            return;
        }
        let mut hooks = std::mem::take(&mut self.hooks);
        for hook in &mut hooks {
            hook.on_phase(phase, self, skeleton);
        }
        let added = std::mem::replace(&mut self.hooks, hooks);
        self.hooks.extend(added);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
