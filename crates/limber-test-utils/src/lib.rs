//! Shared test fixtures and utilities for limber crates.
//!
//! Provides skeleton fixtures (a two-bone limb and a bent-pose biped) and
//! deterministic RNG setup.

pub mod fixtures;
pub mod rng;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use fixtures::{BipedBones, LIMB_LENGTHS, biped_skeleton, limb_skeleton};
pub use rng::{random_point, seeded_rng};
