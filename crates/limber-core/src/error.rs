use thiserror::Error;

use crate::skeleton::BoneId;

/// Top-level error type for limber.
#[derive(Debug, Error)]
pub enum LimberError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Skeleton error: {0}")]
    Skeleton(#[from] SkeletonError),

    #[error("Setup error: {0}")]
    Setup(#[from] SetupError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid iterations: {0} (must be in 0..=10)")]
    InvalidIterations(u32),

    #[error("Invalid value for {field}: {value} (must be in [{min}, {max}])")]
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
}

/// Errors raised while building or editing a [`Skeleton`](crate::Skeleton).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkeletonError {
    #[error("Unknown parent bone {0:?}")]
    UnknownParent(BoneId),

    #[error("Duplicate bone name: {0}")]
    DuplicateName(String),

    #[error("Unknown bone {0:?}")]
    UnknownBone(BoneId),
}

/// Reasons a solver refuses to bind to a skeleton.
///
/// The `Display` text is the message reported by the validity query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error("FBIK chain tree is empty, can't initiate solver")]
    EmptyTree,

    #[error("FBIK chain {chain} contains no nodes")]
    EmptyChain { chain: usize },

    #[error("FBIK chain {chain} has {count} nodes (at most 3 are supported)")]
    TooManyNodes { chain: usize, count: usize },

    #[error("Bone {0:?} does not exist in the skeleton")]
    MissingBone(BoneId),

    #[error("Bone {0:?} is referenced but does not exist in the node chain")]
    BoneNotInChains(BoneId),

    #[error("Bone {0:?} appears in more than one chain node")]
    DuplicateBone(BoneId),

    #[error("Chain {chain} lists child {child}, which is out of range")]
    ChildOutOfRange { chain: usize, child: usize },

    #[error("Chain {0} is part of a parenting cycle or has more than one parent")]
    CircularParenting(usize),

    #[error("Chain {0} is not reachable from the root chain")]
    UnreachableChain(usize),

    #[error("Bone length between {from:?} and {to:?} is zero, can't solve")]
    ZeroLengthBone { from: BoneId, to: BoneId },

    #[error("Bend constraint of chain {0} has a degenerate bend vector (limb is fully straight)")]
    DegenerateBend(usize),

    #[error("Plane defined by {0:?}, {1:?}, {2:?} is degenerate")]
    DegeneratePlane(BoneId, BoneId, BoneId),

    #[error("Spine mapping needs at least two bones, got {0}")]
    SpineTooShort(usize),

    #[error("Spine mapping does not contain any solver nodes")]
    SpineHasNoNodes,

    #[error("Child constraint bone {0:?} is not the first node of a chain")]
    ConstraintNotOnChainRoot(BoneId),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limber_error_from_setup_error() {
        let err: LimberError = SetupError::EmptyTree.into();
        assert!(matches!(err, LimberError::Setup(_)));
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn limber_error_from_config_error() {
        let err: LimberError = ConfigError::InvalidIterations(12).into();
        assert!(matches!(err, LimberError::Config(_)));
        assert!(err.to_string().contains("12"));
    }

    #[test]
    fn config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let config_err: ConfigError = io_err.into();
        assert!(matches!(config_err, ConfigError::Io(_)));
    }

    #[test]
    fn setup_error_display_messages() {
        assert_eq!(
            SetupError::EmptyChain { chain: 2 }.to_string(),
            "FBIK chain 2 contains no nodes"
        );
        assert_eq!(
            SetupError::ZeroLengthBone {
                from: BoneId(3),
                to: BoneId(4)
            }
            .to_string(),
            "Bone length between BoneId(3) and BoneId(4) is zero, can't solve"
        );
        assert_eq!(
            SetupError::ChildOutOfRange { chain: 0, child: 9 }.to_string(),
            "Chain 0 lists child 9, which is out of range"
        );
        assert_eq!(
            SetupError::SpineTooShort(1).to_string(),
            "Spine mapping needs at least two bones, got 1"
        );
    }

    #[test]
    fn config_error_display_messages() {
        assert_eq!(
            ConfigError::OutOfRange {
                field: "weight",
                value: 2.0,
                min: 0.0,
                max: 1.0
            }
            .to_string(),
            "Invalid value for weight: 2 (must be in [0, 1])"
        );
    }

    #[test]
    fn skeleton_error_display_messages() {
        assert_eq!(
            SkeletonError::DuplicateName("hip".into()).to_string(),
            "Duplicate bone name: hip"
        );
    }
}
