// limber-core: skeleton, configuration, errors and diagnostics for full-body IK.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod skeleton;

pub use config::{ChainWeights, MAX_ITERATIONS, Smoothing, SolverConfig, unit_weight};
pub use diagnostics::{Diagnostics, SolverWarning};
pub use error::{ConfigError, LimberError, SetupError, SkeletonError};
pub use skeleton::{Bone, BoneId, Skeleton};
