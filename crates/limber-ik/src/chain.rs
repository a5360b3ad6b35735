//! Chains of solver nodes arranged in a tree, and the per-iteration solve steps.
//!
//! The tree is an arena: chains live in one `Vec` and refer to their children
//! by index. Chain 0 is the root (the body). Solving walks the tree
//! children-before-parent for push, reach, the trigonometric step and stage 1,
//! and parent-before-children for stage 2.
//!
//! ```text
//!              body [pelvis]
//!        ┌───────┬──┴────┬────────┐
//!   left arm  right arm  left leg  right leg
//!   [3 nodes] [3 nodes] [3 nodes] [3 nodes]
//! ```

use std::collections::HashSet;

use limber_core::{BoneId, ChainWeights, Diagnostics, SetupError, Skeleton, SolverWarning, unit_weight};
use nalgebra::Vector3;

use crate::bend::BendConstraint;
use crate::math::{EPSILON, look_rotation, reach_joint};
use crate::node::{Node, NodeRef};

/// A fully stretched limb reaches this fraction of its summed bone lengths.
pub const MAX_LIMB_LENGTH: f32 = 0.99999;

/// Most nodes a chain may hold.
pub const MAX_CHAIN_NODES: usize = 3;

/// Stage 2 stops relaxing a chain's child constraints once a pass moves no
/// node further than this.
const CONSTRAINT_EPSILON: f32 = 1e-6;

/// Upper bound on stage 2 constraint passes per chain.
const MAX_CONSTRAINT_PASSES: u32 = 128;

/// Stable handle to a chain in a [`ChainTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainHandle(pub usize);

// ---------------------------------------------------------------------------
// ChildConstraint
// ---------------------------------------------------------------------------

/// Distance link between the first nodes of two sibling chains.
///
/// With both elasticities at 0 the link is rigid. An elasticity of 1 lets the
/// distance change freely in that direction (`pull` when the nodes drift
/// apart, `push` when they come closer).
#[derive(Debug, Clone)]
pub struct ChildConstraint {
    /// Root bone of the first child chain.
    pub bone1: BoneId,
    /// Root bone of the second child chain.
    pub bone2: BoneId,
    /// Give when the nodes come closer than the nominal distance (0..=1).
    pub push_elasticity: f32,
    /// Give when the nodes drift further apart (0..=1).
    pub pull_elasticity: f32,
    chain1: usize,
    chain2: usize,
    nominal_distance: f32,
    rigid: bool,
    crossfade: f32,
}

impl ChildConstraint {
    /// A rigid link.
    pub fn new(bone1: BoneId, bone2: BoneId) -> Self {
        Self::elastic(bone1, bone2, 0.0, 0.0)
    }

    pub fn elastic(bone1: BoneId, bone2: BoneId, push_elasticity: f32, pull_elasticity: f32) -> Self {
        Self {
            bone1,
            bone2,
            push_elasticity,
            pull_elasticity,
            chain1: 0,
            chain2: 0,
            nominal_distance: 0.0,
            rigid: true,
            crossfade: 0.5,
        }
    }

    /// Distance the link restores, taken from the animated pose each frame.
    pub fn nominal_distance(&self) -> f32 {
        self.nominal_distance
    }

    pub fn is_rigid(&self) -> bool {
        self.rigid
    }

    fn bind(&mut self, tree: &ChainTree) -> Result<(), SetupError> {
        self.chain1 = tree
            .chain_with_root(self.bone1)
            .ok_or(SetupError::ConstraintNotOnChainRoot(self.bone1))?;
        self.chain2 = tree
            .chain_with_root(self.bone2)
            .ok_or(SetupError::ConstraintNotOnChainRoot(self.bone2))?;
        Ok(())
    }

    fn pre_solve(&mut self, skeleton: &Skeleton, pull1: f32, pull2: f32) {
        self.nominal_distance = (skeleton.position(self.bone1) - skeleton.position(self.bone2)).norm();
        self.rigid = self.push_elasticity <= 0.0 && self.pull_elasticity <= 0.0;
        self.crossfade = if self.rigid {
            1.0 - (0.5 + (pull1 - pull2) * 0.5)
        } else {
            0.5
        };
    }

    /// Returns the length of the correction applied.
    fn solve(&self, chains: &mut [Chain]) -> f32 {
        if self.push_elasticity >= 1.0 && self.pull_elasticity >= 1.0 {
            return 0.0;
        }
        let p1 = chains[self.chain1].nodes[0].position;
        let p2 = chains[self.chain2].nodes[0].position;
        let direction = p2 - p1;
        let distance = direction.norm();
        if distance <= 0.0 || (distance - self.nominal_distance).abs() <= f32::EPSILON {
            return 0.0;
        }

        let mut force = 1.0;
        if !self.rigid {
            let elasticity = if distance > self.nominal_distance {
                self.pull_elasticity
            } else {
                self.push_elasticity
            };
            force = 1.0 - elasticity;
        }
        force *= 1.0 - self.nominal_distance / distance;

        let offset = direction * force;
        chains[self.chain1].nodes[0].position += offset * self.crossfade;
        chains[self.chain2].nodes[0].position -= offset * (1.0 - self.crossfade);
        offset.norm()
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// One to three nodes solved as a unit, plus links to child chains.
#[derive(Debug, Clone)]
pub struct Chain {
    pub weights: ChainWeights,
    nodes: Vec<Node>,
    children: Vec<usize>,
    child_constraints: Vec<ChildConstraint>,
    bend: Option<BendConstraint>,

    // Refreshed by `ChainTree::read_pose`.
    root_length: f32,
    length: f32,
    distance: f32,
    sqr_mag1: f32,
    sqr_mag_dif: f32,
    crossfades: Vec<f32>,
    pull_parent_sum: f32,
    reach_force: f32,
    solvable: bool,
}

impl Chain {
    /// Build a chain over `bones`. Three-node chains get a bend constraint.
    pub fn new(bones: &[BoneId], weights: ChainWeights) -> Self {
        let bend = match *bones {
            [a, b, c] => Some(BendConstraint::new([a, b, c])),
            _ => None,
        };
        Self {
            weights,
            nodes: bones.iter().copied().map(Node::new).collect(),
            children: Vec::new(),
            child_constraints: Vec::new(),
            bend,
            root_length: 0.0,
            length: 0.0,
            distance: 0.0,
            sqr_mag1: 0.0,
            sqr_mag_dif: 0.0,
            crossfades: Vec::new(),
            pull_parent_sum: 1.0,
            reach_force: 0.0,
            solvable: true,
        }
    }

    /// Nodes from the chain root to its end.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Indices of the child chains in the owning [`ChainTree`].
    pub fn children(&self) -> &[usize] {
        &self.children
    }

    /// Links between the first nodes of this chain's children.
    pub fn child_constraints(&self) -> &[ChildConstraint] {
        &self.child_constraints
    }

    pub(crate) fn add_child_constraint(&mut self, constraint: ChildConstraint) {
        self.child_constraints.push(constraint);
    }

    /// Present on three-node chains only.
    pub fn bend_constraint(&self) -> Option<&BendConstraint> {
        self.bend.as_ref()
    }

    pub fn bend_constraint_mut(&mut self) -> Option<&mut BendConstraint> {
        self.bend.as_mut()
    }

    /// Summed bone lengths of this frame.
    pub fn length(&self) -> f32 {
        self.length
    }

    /// Distance from the parent chain's last node to this chain's first node.
    pub fn root_length(&self) -> f32 {
        self.root_length
    }

    /// False when a bone of this chain had zero length this frame.
    pub fn is_solvable(&self) -> bool {
        self.solvable
    }

    fn last(&self) -> usize {
        self.nodes.len() - 1
    }

    fn last_position(&self) -> Vector3<f32> {
        self.nodes[self.last()].position
    }

    /// Refresh node positions and bone lengths from the animated pose.
    fn read_positions(&mut self, skeleton: &Skeleton, diagnostics: &mut Diagnostics) {
        for node in &mut self.nodes {
            node.position = skeleton.position(node.bone) + node.offset;
        }

        self.solvable = true;
        self.length = 0.0;
        for i in 0..self.last() {
            let from = self.nodes[i].bone;
            let to = self.nodes[i + 1].bone;
            let length = (skeleton.position(to) - skeleton.position(from)).norm();
            self.nodes[i].length = length;
            self.length += length;
            if length <= 0.0 {
                diagnostics.report(SolverWarning::ZeroBoneLength { from, to });
                self.solvable = false;
            }
        }

        if self.nodes.len() == 3 {
            self.sqr_mag1 = self.nodes[0].length * self.nodes[0].length;
            let sqr_mag2 = self.nodes[1].length * self.nodes[1].length;
            self.sqr_mag_dif = self.sqr_mag1 - sqr_mag2;
        }
    }

    /// Push the first node away from the last when the chain is compressed
    /// relative to its animated extent. Returns the applied displacement.
    fn push_root(&mut self) -> Vector3<f32> {
        let push = self.weights.push;
        if !self.solvable || self.nodes.len() < 2 || push <= 0.0 || self.distance <= 0.0 {
            return Vector3::zeros();
        }
        let direction = self.last_position() - self.nodes[0].position;
        let length = direction.norm();
        if length <= 0.0 {
            return Vector3::zeros();
        }
        let f = 1.0 - length / self.distance;
        if f <= 0.0 {
            return Vector3::zeros();
        }
        let f = self.weights.push_smoothing.apply(f);
        let p = -direction * f * push;
        self.nodes[0].position += p;
        p
    }

    /// Take up slack between the ends of a three-node chain.
    fn reach_ends(&mut self) {
        if !self.solvable || self.nodes.len() != 3 || self.reach_force <= 0.0 {
            return;
        }
        let direction = self.nodes[2].position - self.nodes[0].position;
        let solver_length = direction.norm();
        if solver_length <= 0.0 {
            return;
        }
        let rf = self.reach_force;
        let straight = direction / solver_length * self.length;
        let delta = (solver_length / self.length).clamp(1.0 - rf, 1.0 + rf) - 1.0;
        let delta = (delta + rf).clamp(-1.0, 1.0);
        let delta = self.weights.reach_smoothing.apply(delta);

        let offset = straight * delta.clamp(0.0, solver_length);
        let root_weight = self.nodes[0].effector_position_weight;
        self.nodes[0].position += offset * (1.0 - root_weight);
        self.nodes[2].position += offset;
    }

    /// Place the middle node exactly from the first and last nodes.
    fn solve_trigonometric(
        &mut self,
        use_bend: bool,
        master_weight: f32,
        diagnostics: &mut Diagnostics,
    ) {
        if !self.solvable || self.nodes.len() != 3 {
            return;
        }
        let root = self.nodes[0].position;
        let direction = self.nodes[2].position - root;
        let sqr_mag = direction.norm_squared();
        if sqr_mag <= EPSILON {
            return;
        }
        let magnitude = sqr_mag.sqrt().min(self.length * MAX_LIMB_LENGTH);

        let bend_direction = match (use_bend, self.bend.as_mut()) {
            (true, Some(bend)) => bend.direction(&self.nodes, master_weight, diagnostics),
            _ => self.nodes[1].position - root,
        };

        let x = (magnitude * magnitude + self.sqr_mag_dif) / 2.0 / magnitude;
        let y = (self.sqr_mag1 - x * x).max(0.0).sqrt();
        let q = look_rotation(&direction, &bend_direction);
        self.nodes[1].position = root + q * Vector3::new(0.0, y, x);
    }

    /// Move the last node to `position` and drag the others behind it.
    pub(crate) fn forward_reach(&mut self, position: Vector3<f32>) {
        let last = self.last();
        self.nodes[last].position = position;
        for i in (0..last).rev() {
            self.nodes[i].position =
                reach_joint(&self.nodes[i].position, &self.nodes[i + 1].position, self.nodes[i].length);
        }
    }

    /// Pin the first node at `position` (or `root_length` away from it) and
    /// drag the others behind it.
    pub(crate) fn backward_reach(&mut self, position: Vector3<f32>) {
        let position = if self.root_length > 0.0 {
            reach_joint(&self.nodes[0].position, &position, self.root_length)
        } else {
            position
        };
        self.nodes[0].position = position;
        for i in 1..self.nodes.len() {
            self.nodes[i].position = reach_joint(
                &self.nodes[i].position,
                &self.nodes[i - 1].position,
                self.nodes[i - 1].length,
            );
        }
    }
}

// ---------------------------------------------------------------------------
// ChainTree
// ---------------------------------------------------------------------------

/// Arena of chains rooted at chain 0.
#[derive(Debug, Clone, Default)]
pub struct ChainTree {
    chains: Vec<Chain>,
}

impl ChainTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, chain: Chain) -> ChainHandle {
        self.chains.push(chain);
        ChainHandle(self.chains.len() - 1)
    }

    /// Attach `child` below `parent`. Indices are checked by [`validate`](Self::validate).
    pub fn add_child(&mut self, parent: ChainHandle, child: ChainHandle) {
        if let Some(chain) = self.chains.get_mut(parent.0) {
            chain.children.push(child.0);
        }
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn chain(&self, handle: ChainHandle) -> Option<&Chain> {
        self.chains.get(handle.0)
    }

    pub fn chain_mut(&mut self, handle: ChainHandle) -> Option<&mut Chain> {
        self.chains.get_mut(handle.0)
    }

    pub fn node(&self, r: NodeRef) -> &Node {
        &self.chains[r.chain].nodes[r.node]
    }

    pub fn node_mut(&mut self, r: NodeRef) -> &mut Node {
        &mut self.chains[r.chain].nodes[r.node]
    }

    /// Locate the node that stands for `bone`.
    pub fn find(&self, bone: BoneId) -> Option<NodeRef> {
        self.chains.iter().enumerate().find_map(|(c, chain)| {
            chain
                .nodes
                .iter()
                .position(|n| n.bone == bone)
                .map(|n| NodeRef::new(c, n))
        })
    }

    fn chain_with_root(&self, bone: BoneId) -> Option<usize> {
        self.chains.iter().position(|c| c.nodes.first().is_some_and(|n| n.bone == bone))
    }

    pub(crate) fn all_nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.chains.iter_mut().flat_map(|c| c.nodes.iter_mut())
    }

    pub(crate) fn all_nodes(&self) -> impl Iterator<Item = &Node> {
        self.chains.iter().flat_map(|c| c.nodes.iter())
    }

    // -----------------------------------------------------------------------
    // Setup
    // -----------------------------------------------------------------------

    /// Check topology and bind-time geometry against `skeleton`.
    pub fn validate(&self, skeleton: &Skeleton) -> Result<(), SetupError> {
        if self.chains.is_empty() {
            return Err(SetupError::EmptyTree);
        }

        let mut seen = HashSet::new();
        for (c, chain) in self.chains.iter().enumerate() {
            if chain.nodes.is_empty() {
                return Err(SetupError::EmptyChain { chain: c });
            }
            if chain.nodes.len() > MAX_CHAIN_NODES {
                return Err(SetupError::TooManyNodes {
                    chain: c,
                    count: chain.nodes.len(),
                });
            }
            for node in &chain.nodes {
                if !skeleton.contains(node.bone) {
                    return Err(SetupError::MissingBone(node.bone));
                }
                if !seen.insert(node.bone) {
                    return Err(SetupError::DuplicateBone(node.bone));
                }
            }
            for pair in chain.nodes.windows(2) {
                let (from, to) = (pair[0].bone, pair[1].bone);
                if (skeleton.position(to) - skeleton.position(from)).norm_squared() <= 0.0 {
                    return Err(SetupError::ZeroLengthBone { from, to });
                }
            }
        }

        self.validate_topology()?;

        for (c, chain) in self.chains.iter().enumerate() {
            for constraint in &chain.child_constraints {
                for bone in [constraint.bone1, constraint.bone2] {
                    if self.chain_with_root(bone).is_none() {
                        return Err(SetupError::ConstraintNotOnChainRoot(bone));
                    }
                }
            }
            if let Some(bend) = &chain.bend {
                if BendConstraint::initial_direction(skeleton, bend.bones()).is_none() {
                    return Err(SetupError::DegenerateBend(c));
                }
            }
        }
        Ok(())
    }

    fn validate_topology(&self) -> Result<(), SetupError> {
        let n = self.chains.len();
        let mut parent: Vec<Option<usize>> = vec![None; n];
        for (c, chain) in self.chains.iter().enumerate() {
            for &child in &chain.children {
                if child >= n {
                    return Err(SetupError::ChildOutOfRange { chain: c, child });
                }
                if child == 0 || child == c || parent[child].is_some() {
                    return Err(SetupError::CircularParenting(child));
                }
                parent[child] = Some(c);
            }
        }

        for start in 1..n {
            let mut current = start;
            let mut steps = 0;
            while let Some(p) = parent[current] {
                current = p;
                steps += 1;
                if steps > n {
                    return Err(SetupError::CircularParenting(start));
                }
            }
            if current != 0 {
                return Err(SetupError::UnreachableChain(start));
            }
        }
        Ok(())
    }

    /// Bind child and bend constraints. Call after [`validate`](Self::validate).
    pub(crate) fn bind(&mut self, skeleton: &Skeleton) -> Result<(), SetupError> {
        let mut constraints: Vec<Vec<ChildConstraint>> =
            self.chains.iter_mut().map(|c| std::mem::take(&mut c.child_constraints)).collect();
        let bound = constraints
            .iter_mut()
            .flatten()
            .try_for_each(|constraint| constraint.bind(self));
        for (chain, list) in self.chains.iter_mut().zip(constraints) {
            chain.child_constraints = list;
        }
        bound?;

        for (c, chain) in self.chains.iter_mut().enumerate() {
            chain.crossfades = vec![0.0; chain.children.len()];
            if let Some(bend) = chain.bend.as_mut() {
                bend.bind(c, skeleton)?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Per-frame
    // -----------------------------------------------------------------------

    /// Limit the animated bend of every three-node chain. `end_weight` gives
    /// the position weight of the effector on a chain's last node.
    pub(crate) fn limit_bends(
        &self,
        skeleton: &mut Skeleton,
        master_weight: f32,
        end_weight: impl Fn(usize) -> f32,
    ) {
        for (c, chain) in self.chains.iter().enumerate() {
            if let Some(bend) = &chain.bend {
                bend.limit_bend(skeleton, master_weight, end_weight(c));
            }
        }
    }

    /// Copy the animated pose into the nodes and refresh per-frame caches.
    pub(crate) fn read_pose(&mut self, skeleton: &Skeleton, full_body: bool, diagnostics: &mut Diagnostics) {
        for chain in &mut self.chains {
            chain.weights = chain.weights.sanitized();
            chain.read_positions(skeleton, diagnostics);
            if let Some(bend) = chain.bend.as_mut() {
                bend.read_pose(skeleton);
            }
        }

        for c in 0..self.chains.len() {
            let last = self.chains[c].nodes[self.chains[c].last()].bone;
            for k in 0..self.chains[c].children.len() {
                let child = self.chains[c].children[k];
                let root = self.chains[child].nodes[0].bone;
                self.chains[child].root_length = (skeleton.position(root) - skeleton.position(last)).norm();
            }
        }

        if !full_body {
            return;
        }

        let pulls: Vec<f32> = self.chains.iter().map(|c| c.weights.pull).collect();
        for c in 0..self.chains.len() {
            let mut constraints = std::mem::take(&mut self.chains[c].child_constraints);
            for constraint in &mut constraints {
                constraint.pre_solve(skeleton, pulls[constraint.chain1], pulls[constraint.chain2]);
            }
            self.chains[c].child_constraints = constraints;

            let child_pulls: Vec<f32> = self.chains[c]
                .children
                .iter()
                .map(|&child| self.chains[child].nodes[0].effector_position_weight * pulls[child])
                .collect();

            let chain = &mut self.chains[c];
            let last_weight = chain.nodes[chain.last()].effector_position_weight;
            let pull_sum = (last_weight + child_pulls.iter().sum::<f32>()).max(1.0);
            chain.crossfades = child_pulls.iter().map(|p| p / pull_sum).collect();
            chain.pull_parent_sum = chain.children.iter().map(|&child| pulls[child]).sum::<f32>().max(1.0);

            chain.reach_force = if chain.nodes.len() == 3 {
                chain.weights.reach * unit_weight(chain.nodes[2].effector_position_weight)
            } else {
                0.0
            };

            chain.distance = if chain.weights.push > 0.0 && chain.nodes.len() > 1 {
                let first = chain.nodes[0].bone;
                let last = chain.nodes[chain.last()].bone;
                (skeleton.position(last) - skeleton.position(first)).norm()
            } else {
                0.0
            };
        }
    }

    /// Recursive push. Returns the push applied to chain `c`'s first node.
    pub(crate) fn push(&mut self, c: usize) -> Vector3<f32> {
        let mut sum = Vector3::zeros();
        for k in 0..self.chains[c].children.len() {
            let child = self.chains[c].children[k];
            let p = self.push(child);
            sum += p * self.chains[child].weights.push_parent;
        }
        let chain = &mut self.chains[c];
        let last = chain.last();
        chain.nodes[last].position += sum;
        chain.push_root()
    }

    pub(crate) fn reach(&mut self, c: usize) {
        for k in 0..self.chains[c].children.len() {
            let child = self.chains[c].children[k];
            self.reach(child);
        }
        self.chains[c].reach_ends();
    }

    pub(crate) fn solve_trigonometric(
        &mut self,
        c: usize,
        use_bend: bool,
        master_weight: f32,
        diagnostics: &mut Diagnostics,
    ) {
        for k in 0..self.chains[c].children.len() {
            let child = self.chains[c].children[k];
            self.solve_trigonometric(child, use_bend, master_weight, diagnostics);
        }
        self.chains[c].solve_trigonometric(use_bend, master_weight, diagnostics);
    }

    /// Forward reach, leaves first: each parent moves toward the pull-weighted
    /// centroid its children want it at.
    pub(crate) fn stage1(&mut self, c: usize) {
        for k in 0..self.chains[c].children.len() {
            let child = self.chains[c].children[k];
            self.stage1(child);
        }
        if !self.chains[c].solvable {
            return;
        }
        if self.chains[c].children.is_empty() {
            let last = self.chains[c].last_position();
            self.chains[c].forward_reach(last);
            return;
        }

        self.solve_child_constraints(c);

        let chain = &self.chains[c];
        let last = chain.last_position();
        let mut centroid = last;
        for &child in &chain.children {
            let child = &self.chains[child];
            let root = child.nodes[0].position;
            let wanted = if child.root_length > 0.0 {
                reach_joint(&last, &root, child.root_length)
            } else {
                root
            };
            if chain.pull_parent_sum > 0.0 {
                centroid += (wanted - last) * (child.weights.pull / chain.pull_parent_sum);
            }
        }
        let target = centroid.lerp(&last, chain.weights.pin);
        self.chains[c].forward_reach(target);
    }

    /// Backward reach, root first, alternating with the chain's constraints.
    ///
    /// The sibling links and the parent-to-child distances are relaxed
    /// together until they agree, so a child's own backward reach leaves its
    /// first node where the links put it.
    pub(crate) fn stage2(&mut self, c: usize, position: Vector3<f32>, iterations: u32) {
        if self.chains[c].solvable {
            self.chains[c].backward_reach(position);
        }
        if !self.chains[c].child_constraints.is_empty() {
            let min_passes = iterations.clamp(2, 4);
            for pass in 1..=MAX_CONSTRAINT_PASSES {
                let moved = self.solve_constraint_systems(c);
                if pass >= min_passes && moved <= CONSTRAINT_EPSILON {
                    break;
                }
            }
        }
        let last = self.chains[c].last_position();
        for k in 0..self.chains[c].children.len() {
            let child = self.chains[c].children[k];
            self.stage2(child, last, iterations);
        }
    }

    /// One pass over the sibling links. Returns the largest correction.
    fn solve_child_constraints(&mut self, c: usize) -> f32 {
        let constraints = std::mem::take(&mut self.chains[c].child_constraints);
        let moved = constraints
            .iter()
            .map(|constraint| constraint.solve(&mut self.chains))
            .fold(0.0, f32::max);
        self.chains[c].child_constraints = constraints;
        moved
    }

    /// Sibling links, then parent-to-child distances. Returns the largest
    /// correction of the pass.
    fn solve_constraint_systems(&mut self, c: usize) -> f32 {
        let mut moved = self.solve_child_constraints(c);
        for k in 0..self.chains[c].children.len() {
            let child = self.chains[c].children[k];
            let crossfade = self.chains[c].crossfades.get(k).copied().unwrap_or(0.0);
            let distance = self.chains[child].root_length;
            moved = moved.max(self.solve_linear_constraint(c, child, crossfade, distance));
        }
        moved
    }

    /// Restore `distance` between a parent's last node and a child's first
    /// node. Returns the length of the correction.
    fn solve_linear_constraint(&mut self, parent: usize, child: usize, crossfade: f32, distance: f32) -> f32 {
        let from = self.chains[parent].last_position();
        let to = self.chains[child].nodes[0].position;
        let direction = to - from;
        let current = direction.norm();
        if current <= 0.0 || (current - distance).abs() <= f32::EPSILON {
            return 0.0;
        }
        let offset = direction * (1.0 - distance / current);
        let last = self.chains[parent].last();
        self.chains[parent].nodes[last].position += offset * crossfade;
        self.chains[child].nodes[0].position -= offset * (1.0 - crossfade);
        offset.norm()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
