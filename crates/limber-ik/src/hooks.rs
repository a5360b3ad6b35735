//! Phase callbacks invoked synchronously during [`FullBodySolver::update`].

use limber_core::Skeleton;

use crate::solver::FullBodySolver;

/// Fixed points in a frame at which hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolverPhase {
    /// Before the animated pose is read into the nodes.
    PreRead,
    /// After reading, before the first iteration.
    PreSolve,
    /// Before iteration `i` (0-based).
    PreIteration(u32),
    /// After iteration `i`.
    PostIteration(u32),
    /// Before the final bend pass.
    PreBend,
    /// After solving, before the pose is written back.
    PostSolve,
}

/// Add-on logic that adjusts effectors or chains between solve phases.
///
/// Hooks run in registration order. A hook may register further hooks; those
/// start running from the next phase.
pub trait SolverHook: Send + Sync {
    fn on_phase(&mut self, phase: SolverPhase, solver: &mut FullBodySolver, skeleton: &Skeleton);
}

impl<F> SolverHook for F
where
    F: FnMut(SolverPhase, &mut FullBodySolver, &Skeleton) + Send + Sync,
{
    fn on_phase(&mut self, phase: SolverPhase, solver: &mut FullBodySolver, skeleton: &Skeleton) {
        self(phase, solver, skeleton);
    }
}
