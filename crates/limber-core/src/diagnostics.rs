//! Caller-owned sink for runtime solver warnings.
//!
//! Runtime problems never interrupt a frame. They are reported here instead;
//! each distinct warning is logged through `tracing` the first time it is
//! seen and only counted afterwards. Every solver instance gets its own sink,
//! so suppression state is never shared between characters.

use std::collections::HashMap;

use thiserror::Error;

use crate::skeleton::BoneId;

/// A recoverable problem detected while solving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum SolverWarning {
    #[error("Bone length between {from:?} and {to:?} is zero, chain skipped this frame")]
    ZeroBoneLength { from: BoneId, to: BoneId },

    #[error("Invalid position offset on effector {0:?} (NaN, Inf or runaway accumulation), offset discarded")]
    InvalidOffset(BoneId),

    #[error("Effector {0:?} plane nodes coincide, relative position not maintained")]
    CoincidentPlaneNodes(BoneId),

    #[error("Bend goal of chain {0} coincides with the limb root, keeping last direction")]
    DegenerateBendGoal(usize),

    #[error("Effector {0:?} has a NaN or infinite weight, position or rotation, input ignored")]
    InvalidEffector(BoneId),

    #[error("Skeleton has {found} bones but the solver was bound to {bound}, frame skipped")]
    SkeletonMismatch { bound: usize, found: usize },
}

/// Warning latch and counter.
#[derive(Debug, Default)]
pub struct Diagnostics {
    seen: HashMap<SolverWarning, u32>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning. Returns `true` if this was its first occurrence.
    pub fn report(&mut self, warning: SolverWarning) -> bool {
        let count = self.seen.entry(warning).or_insert(0);
        *count += 1;
        if *count == 1 {
            tracing::warn!("limber: {warning}");
            true
        } else {
            false
        }
    }

    /// How many times a warning was reported.
    pub fn count(&self, warning: &SolverWarning) -> u32 {
        self.seen.get(warning).copied().unwrap_or(0)
    }

    /// Distinct warnings seen so far.
    pub fn warnings(&self) -> impl Iterator<Item = &SolverWarning> {
        self.seen.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Forget all warnings so they are logged again.
    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_report_latches() {
        let mut d = Diagnostics::new();
        let w = SolverWarning::InvalidOffset(BoneId(7));
        assert!(d.report(w));
        assert!(!d.report(w));
        assert!(!d.report(w));
        assert_eq!(d.count(&w), 3);
    }

    #[test]
    fn distinct_warnings_tracked_separately() {
        let mut d = Diagnostics::new();
        assert!(d.report(SolverWarning::InvalidOffset(BoneId(1))));
        assert!(d.report(SolverWarning::InvalidOffset(BoneId(2))));
        assert_eq!(d.warnings().count(), 2);
    }

    #[test]
    fn sinks_are_independent() {
        let mut a = Diagnostics::new();
        let mut b = Diagnostics::new();
        let w = SolverWarning::DegenerateBendGoal(1);
        assert!(a.report(w));
        assert!(b.report(w));
    }

    #[test]
    fn clear_rearms_latch() {
        let mut d = Diagnostics::new();
        let w = SolverWarning::CoincidentPlaneNodes(BoneId(0));
        d.report(w);
        d.clear();
        assert!(d.is_empty());
        assert!(d.report(w));
    }
}
