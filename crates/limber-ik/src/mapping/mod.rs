//! Translation between the solver's node rig and the real skeleton.
//!
//! The solver works on at most three nodes per chain. Mappings read each
//! frame's animated pose relative to support planes of those nodes, and after
//! solving rebuild every mapped bone from the solved nodes:
//!
//! - [`SpineMapping`]: any number of spine bones between the hip and chest
//!   triangles.
//! - [`LimbMapping`]: a three-bone limb with an optional clavicle.
//! - [`BoneMapping`]: a single bone held at its animated world rotation.

pub(crate) mod bone_map;

pub mod bone;
pub mod limb;
pub mod spine;

pub use bone::BoneMapping;
pub use limb::LimbMapping;
pub use spine::{SpineAnchors, SpineMapping};
