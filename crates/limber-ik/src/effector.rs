//! Effectors: weighted targets pulling solver nodes.

use limber_core::{BoneId, Diagnostics, SetupError, Skeleton, SolverWarning};
use nalgebra::{UnitQuaternion, Vector3};

use crate::chain::ChainTree;
use crate::math::{EPSILON, is_finite, look_rotation};
use crate::node::NodeRef;

/// Stable handle to an effector of a solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectorHandle(pub usize);

/// Additive offset that callers accumulate during a frame and the solver
/// drains exactly once per update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionOffset(Vector3<f32>);

impl Default for PositionOffset {
    fn default() -> Self {
        Self(Vector3::zeros())
    }
}

impl PositionOffset {
    pub fn accumulate(&mut self, offset: Vector3<f32>) {
        self.0 += offset;
    }

    /// The amount accumulated so far this frame.
    pub fn pending(&self) -> Vector3<f32> {
        self.0
    }

    /// Take the accumulated offset, leaving zero behind.
    pub fn drain(&mut self) -> Vector3<f32> {
        std::mem::replace(&mut self.0, Vector3::zeros())
    }
}

/// Per-frame values the effectors read from the solver.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameParams {
    pub master_weight: f32,
    pub iterations: u32,
    pub max_offset: f32,
}

/// A target pose bound to one solver node.
#[derive(Debug, Clone)]
pub struct Effector {
    /// The bone whose solver node this effector pulls.
    pub bone: BoneId,
    /// When set, `position` and `rotation` are copied from this bone each frame.
    pub target: Option<BoneId>,
    /// World-space target position.
    pub position: Vector3<f32>,
    /// World-space target rotation. Only limbs and mapped bones read it.
    pub rotation: UnitQuaternion<f32>,
    /// 0..=1. Non-finite values are treated as 0 and reported.
    pub position_weight: f32,
    /// 0..=1. Non-finite values are treated as 0 and reported.
    pub rotation_weight: f32,
    pub position_offset: PositionOffset,
    /// Keep the end node where it would be if it were rigidly attached to the
    /// support plane (0..=1). Only used by end effectors with a plane.
    pub maintain_relative_position_weight: f32,
    /// Move the child nodes along with this node.
    pub effect_child_nodes: bool,

    child_bones: Vec<BoneId>,
    plane_bones: Option<[BoneId; 3]>,

    node: NodeRef,
    child_nodes: Vec<NodeRef>,
    plane_nodes: Option<[NodeRef; 3]>,
    local_positions: Vec<Vector3<f32>>,
    end_effector: bool,
    position_w: f32,
    first_update: bool,
    animated_position: Vector3<f32>,
    animated_bone_position: Vector3<f32>,
    animated_plane_origin: Vector3<f32>,
    animated_plane_rotation: UnitQuaternion<f32>,
}

impl Effector {
    pub fn new(bone: BoneId) -> Self {
        Self {
            bone,
            target: None,
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            position_weight: 0.0,
            rotation_weight: 0.0,
            position_offset: PositionOffset::default(),
            maintain_relative_position_weight: 0.0,
            effect_child_nodes: true,
            child_bones: Vec::new(),
            plane_bones: None,
            node: NodeRef::new(0, 0),
            child_nodes: Vec::new(),
            plane_nodes: None,
            local_positions: Vec::new(),
            end_effector: false,
            position_w: 0.0,
            first_update: false,
            animated_position: Vector3::zeros(),
            animated_bone_position: Vector3::zeros(),
            animated_plane_origin: Vector3::zeros(),
            animated_plane_rotation: UnitQuaternion::identity(),
        }
    }

    /// Nodes dragged along with this effector's node.
    #[must_use]
    pub fn with_child_bones(mut self, bones: &[BoneId]) -> Self {
        self.child_bones = bones.to_vec();
        self
    }

    /// Support plane for `maintain_relative_position_weight`.
    #[must_use]
    pub fn with_plane(mut self, bone1: BoneId, bone2: BoneId, bone3: BoneId) -> Self {
        self.plane_bones = Some([bone1, bone2, bone3]);
        self
    }

    pub fn child_bones(&self) -> &[BoneId] {
        &self.child_bones
    }

    pub fn plane_bones(&self) -> Option<[BoneId; 3]> {
        self.plane_bones
    }

    /// True for an effector on the tip of a childless limb chain.
    pub fn is_end_effector(&self) -> bool {
        self.end_effector
    }

    pub fn node(&self) -> NodeRef {
        self.node
    }

    pub(crate) fn validate(&self, tree: &ChainTree, skeleton: &Skeleton) -> Result<(), SetupError> {
        let planes = self.plane_bones.iter().flatten();
        for &bone in std::iter::once(&self.bone).chain(&self.child_bones).chain(planes) {
            if !skeleton.contains(bone) {
                return Err(SetupError::MissingBone(bone));
            }
            if tree.find(bone).is_none() {
                return Err(SetupError::BoneNotInChains(bone));
            }
        }
        if let Some(target) = self.target {
            if !skeleton.contains(target) {
                return Err(SetupError::MissingBone(target));
            }
        }
        Ok(())
    }

    pub(crate) fn bind(&mut self, tree: &ChainTree, skeleton: &Skeleton) -> Result<(), SetupError> {
        let find = |bone: BoneId| tree.find(bone).ok_or(SetupError::BoneNotInChains(bone));

        self.node = find(self.bone)?;
        self.child_nodes = self.child_bones.iter().map(|&b| find(b)).collect::<Result<_, _>>()?;
        self.plane_nodes = match self.plane_bones {
            Some([a, b, c]) => Some([find(a)?, find(b)?, find(c)?]),
            None => None,
        };
        self.local_positions = vec![Vector3::zeros(); self.child_nodes.len()];

        let chain = &tree.chains()[self.node.chain];
        self.end_effector = chain.nodes().len() > 1
            && self.node.node == chain.nodes().len() - 1
            && chain.children().is_empty();

        self.position = skeleton.position(self.bone);
        self.rotation = skeleton.rotation(self.bone);
        Ok(())
    }

    /// Zero the offsets of every node this effector touches.
    pub(crate) fn reset_offset(&self, tree: &mut ChainTree) {
        tree.node_mut(self.node).offset = Vector3::zeros();
        for &child in &self.child_nodes {
            tree.node_mut(child).offset = Vector3::zeros();
        }
    }

    /// Drain the offset and push weights, rotation and offsets into the nodes.
    pub(crate) fn pre_solve(
        &mut self,
        tree: &mut ChainTree,
        skeleton: &Skeleton,
        frame: FrameParams,
        diagnostics: &mut Diagnostics,
    ) {
        if let Some(target) = self.target.filter(|&t| skeleton.contains(t)) {
            self.position = skeleton.position(target);
            self.rotation = skeleton.rotation(target);
        }
        if !self.sanitize(skeleton) {
            diagnostics.report(SolverWarning::InvalidEffector(self.bone));
        }

        self.position_w = self.position_weight * frame.master_weight;

        let mut offset = self.position_offset.drain();
        if !is_finite(&offset) || offset.norm() > frame.max_offset {
            diagnostics.report(SolverWarning::InvalidOffset(self.bone));
            offset = Vector3::zeros();
        }
        let offset = offset * frame.master_weight;

        let node = tree.node_mut(self.node);
        node.effector_position_weight = self.position_w;
        node.effector_rotation_weight = self.rotation_weight * frame.master_weight;
        node.rotation = self.rotation;
        node.offset += offset;

        if self.effect_child_nodes && frame.iterations > 0 {
            let origin = skeleton.position(self.bone);
            for (i, &child) in self.child_nodes.iter().enumerate() {
                let child_node = tree.node_mut(child);
                self.local_positions[i] = skeleton.position(child_node.bone) - origin;
                child_node.offset += offset;
            }
        }

        self.animated_bone_position = skeleton.position(self.bone);
        if let Some([a, b, c]) = self.plane_bones {
            self.animated_plane_origin = skeleton.position(a);
            if self.maintain_relative_position_weight > 0.0 {
                self.animated_plane_rotation =
                    plane_rotation(&skeleton.position(a), &skeleton.position(b), &skeleton.position(c))
                        .unwrap_or_else(|| {
                            diagnostics.report(SolverWarning::CoincidentPlaneNodes(self.bone));
                            UnitQuaternion::identity()
                        });
            }
        }
        self.first_update = true;
    }

    /// Force the runtime inputs into range. Non-finite values are dropped:
    /// weights fall to 0, position and rotation fall back to the bone's pose.
    /// Returns `false` if anything was non-finite.
    fn sanitize(&mut self, skeleton: &Skeleton) -> bool {
        let mut valid = true;
        for weight in [
            &mut self.position_weight,
            &mut self.rotation_weight,
            &mut self.maintain_relative_position_weight,
        ] {
            let finite = weight.is_finite();
            valid &= finite;
            *weight = if finite { weight.clamp(0.0, 1.0) } else { 0.0 };
        }
        if !is_finite(&self.position) {
            self.position = skeleton.position(self.bone);
            self.position_weight = 0.0;
            valid = false;
        }
        if !self.rotation.coords.iter().all(|v| v.is_finite()) {
            self.rotation = skeleton.rotation(self.bone);
            self.rotation_weight = 0.0;
            valid = false;
        }
        valid
    }

    /// Blend the node (and its children) toward the effector position.
    pub(crate) fn update(&mut self, tree: &mut ChainTree, diagnostics: &mut Diagnostics) {
        if self.first_update {
            self.animated_position = self.animated_bone_position + tree.node(self.node).offset;
            self.first_update = false;
        }

        let base = self.solved_position(tree, diagnostics);
        let position = base.lerp(&self.position, self.position_w);
        tree.node_mut(self.node).position = position;

        if !self.effect_child_nodes {
            return;
        }
        for (&child, local) in self.child_nodes.iter().zip(&self.local_positions) {
            let node = tree.node_mut(child);
            node.position = node.position.lerp(&(position + local), self.position_w);
        }
    }

    /// Where the node would be without this effector's target.
    fn solved_position(&self, tree: &ChainTree, diagnostics: &mut Diagnostics) -> Vector3<f32> {
        if !self.end_effector {
            return tree.node(self.node).position;
        }
        let w = self.maintain_relative_position_weight;
        let Some(planes) = self.plane_nodes.filter(|_| w > 0.0) else {
            return self.animated_position;
        };

        let [p1, p2, p3] = planes.map(|r| tree.node(r).position);
        let offset_rotation = plane_rotation(&p1, &p2, &p3).map_or_else(
            || {
                diagnostics.report(SolverWarning::CoincidentPlaneNodes(self.bone));
                UnitQuaternion::identity()
            },
            |solved| solved * self.animated_plane_rotation.inverse(),
        );
        let attached = p1 + offset_rotation * (self.animated_bone_position - self.animated_plane_origin);
        self.animated_position
            .lerp(&(attached + tree.node(self.node).offset), w)
    }
}

/// Orientation of the triangle `p1 p2 p3`, or `None` when it is degenerate.
pub(crate) fn plane_rotation(
    p1: &Vector3<f32>,
    p2: &Vector3<f32>,
    p3: &Vector3<f32>,
) -> Option<UnitQuaternion<f32>> {
    let forward = p2 - p1;
    let up = p3 - p1;
    if forward.cross(&up).norm_squared() <= EPSILON {
        return None;
    }
    Some(look_rotation(&forward, &up))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
