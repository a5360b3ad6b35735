use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Upper bound for solver iterations.
pub const MAX_ITERATIONS: u32 = 10;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_iterations() -> u32 {
    4
}
const fn default_one() -> f32 {
    1.0
}
const fn default_spine_iterations() -> u32 {
    3
}
const fn default_max_offset() -> f32 {
    1.0e4
}
const fn default_reach() -> f32 {
    0.05
}

/// Clamp a weight to `0..=1`. NaN becomes 0.
#[must_use]
pub fn unit_weight(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Smoothing
// ---------------------------------------------------------------------------

/// Shaping applied to push and reach forces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Smoothing {
    None,
    #[default]
    Quadratic,
    Cubic,
}

impl Smoothing {
    /// Apply the smoothing curve to a force factor.
    #[must_use]
    pub fn apply(self, f: f32) -> f32 {
        match self {
            Self::None => f,
            Self::Quadratic => f * f,
            Self::Cubic => f * f * f,
        }
    }
}

// ---------------------------------------------------------------------------
// ChainWeights
// ---------------------------------------------------------------------------

/// Per-chain solving weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChainWeights {
    /// How strongly the chain resists being pulled by its children (0..=1).
    #[serde(default)]
    pub pin: f32,
    /// How strongly this chain pulls its parent (0..=1).
    #[serde(default = "default_one")]
    pub pull: f32,
    /// Push the chain root away when the end target comes close (0..=1).
    #[serde(default)]
    pub push: f32,
    /// Fraction of the push forwarded to the parent chain (-1..=1).
    #[serde(default)]
    pub push_parent: f32,
    /// Slack removal for three-node chains (0..=1).
    #[serde(default = "default_reach")]
    pub reach: f32,
    #[serde(default)]
    pub reach_smoothing: Smoothing,
    #[serde(default)]
    pub push_smoothing: Smoothing,
}

impl Default for ChainWeights {
    fn default() -> Self {
        Self {
            pin: 0.0,
            pull: 1.0,
            push: 0.0,
            push_parent: 0.0,
            reach: default_reach(),
            reach_smoothing: Smoothing::default(),
            push_smoothing: Smoothing::default(),
        }
    }
}

impl ChainWeights {
    /// Weights for the body chain: no reach.
    #[must_use]
    pub fn body() -> Self {
        Self {
            reach: 0.0,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_pull(mut self, pull: f32) -> Self {
        self.pull = pull;
        self
    }

    #[must_use]
    pub const fn with_reach(mut self, reach: f32) -> Self {
        self.reach = reach;
        self
    }

    #[must_use]
    pub const fn with_push(mut self, push: f32, push_parent: f32) -> Self {
        self.push = push;
        self.push_parent = push_parent;
        self
    }

    #[must_use]
    pub const fn with_pin(mut self, pin: f32) -> Self {
        self.pin = pin;
        self
    }

    /// The same weights forced into their documented ranges. NaN becomes the
    /// low end of the range.
    #[must_use]
    pub fn sanitized(self) -> Self {
        let push_parent = if self.push_parent.is_nan() {
            0.0
        } else {
            self.push_parent.clamp(-1.0, 1.0)
        };
        Self {
            pin: unit_weight(self.pin),
            pull: unit_weight(self.pull),
            push: unit_weight(self.push),
            push_parent,
            reach: unit_weight(self.reach),
            ..self
        }
    }

    /// Validate weight ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("pin", self.pin, 0.0, 1.0)?;
        check_range("pull", self.pull, 0.0, 1.0)?;
        check_range("push", self.push, 0.0, 1.0)?;
        check_range("push_parent", self.push_parent, -1.0, 1.0)?;
        check_range("reach", self.reach, 0.0, 1.0)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SolverConfig
// ---------------------------------------------------------------------------

/// Full-body solver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Solver iterations per frame (0..=10). 0 moves only end-effector nodes.
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Master weight (0..=1). 0 disables solving and clears pending offsets.
    #[serde(default = "default_one")]
    pub weight: f32,

    /// Blend of the body placement toward its animated position (0..=1).
    #[serde(default)]
    pub root_pin: f32,

    /// Stop iterating early once no node moves further than this. 0 runs all iterations.
    #[serde(default)]
    pub tolerance: f32,

    /// Relaxation passes of the spine mapping.
    #[serde(default = "default_spine_iterations")]
    pub spine_iterations: u32,

    /// Spine twist toward the solved shoulder line (0..=1).
    #[serde(default = "default_one")]
    pub spine_twist_weight: f32,

    /// Effector offsets longer than this are treated as runaway accumulation.
    #[serde(default = "default_max_offset")]
    pub max_offset: f32,

    #[serde(default = "ChainWeights::body")]
    pub body: ChainWeights,

    #[serde(default)]
    pub arms: ChainWeights,

    #[serde(default)]
    pub legs: ChainWeights,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            weight: 1.0,
            root_pin: 0.0,
            tolerance: 0.0,
            spine_iterations: default_spine_iterations(),
            spine_twist_weight: 1.0,
            max_offset: default_max_offset(),
            body: ChainWeights::body(),
            arms: ChainWeights::default(),
            legs: ChainWeights::default(),
        }
    }
}

impl SolverConfig {
    /// The same configuration forced into its documented ranges.
    ///
    /// Used for configs built in code, which never pass through
    /// [`validate`](Self::validate). Non-finite or negative tolerances become 0 and a
    /// NaN or negative `max_offset` falls back to its default.
    #[must_use]
    pub fn sanitized(self) -> Self {
        let tolerance = if self.tolerance.is_finite() { self.tolerance.max(0.0) } else { 0.0 };
        let max_offset = if self.max_offset >= 0.0 { self.max_offset } else { default_max_offset() };
        Self {
            iterations: self.iterations.min(MAX_ITERATIONS),
            weight: unit_weight(self.weight),
            root_pin: unit_weight(self.root_pin),
            tolerance,
            spine_twist_weight: unit_weight(self.spine_twist_weight),
            max_offset,
            body: self.body.sanitized(),
            arms: self.arms.sanitized(),
            legs: self.legs.sanitized(),
            ..self
        }
    }

    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations > MAX_ITERATIONS {
            return Err(ConfigError::InvalidIterations(self.iterations));
        }
        check_range("weight", self.weight, 0.0, 1.0)?;
        check_range("root_pin", self.root_pin, 0.0, 1.0)?;
        check_range("tolerance", self.tolerance, 0.0, f32::MAX)?;
        check_range("spine_twist_weight", self.spine_twist_weight, 0.0, 1.0)?;
        check_range("max_offset", self.max_offset, 0.0, f32::MAX)?;
        self.body.validate()?;
        self.arms.validate()?;
        self.legs.validate()?;
        Ok(())
    }

    /// Parse from a TOML string and validate.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

fn check_range(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SolverConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = SolverConfig::from_toml_str("").unwrap();
        assert_eq!(config, SolverConfig::default());
    }

    #[test]
    fn toml_overrides() {
        let config = SolverConfig::from_toml_str(
            r#"
            iterations = 2
            weight = 0.5

            [arms]
            reach = 0.2
            push = 0.3
            push_smoothing = "cubic"
            "#,
        )
        .unwrap();
        assert_eq!(config.iterations, 2);
        assert!((config.weight - 0.5).abs() < f32::EPSILON);
        assert!((config.arms.reach - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.arms.push_smoothing, Smoothing::Cubic);
        assert!((config.arms.pull - 1.0).abs() < f32::EPSILON);
        assert!((config.body.reach - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn too_many_iterations_rejected() {
        let config = SolverConfig {
            iterations: 11,
            ..SolverConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidIterations(11))
        ));
    }

    #[test]
    fn out_of_range_weight_rejected() {
        let err = SolverConfig::from_toml_str("weight = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "weight", .. }));
    }

    #[test]
    fn nan_weight_rejected() {
        let weights = ChainWeights {
            pull: f32::NAN,
            ..ChainWeights::default()
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn smoothing_curves() {
        assert!((Smoothing::None.apply(0.5) - 0.5).abs() < f32::EPSILON);
        assert!((Smoothing::Quadratic.apply(0.5) - 0.25).abs() < f32::EPSILON);
        assert!((Smoothing::Cubic.apply(0.5) - 0.125).abs() < f32::EPSILON);
    }

    #[test]
    fn bad_toml_is_parse_error() {
        assert!(matches!(
            SolverConfig::from_toml_str("iterations = \"many\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn builders_set_weights() {
        let weights = ChainWeights::default().with_pin(0.4).with_push(0.5, -0.2);
        assert!((weights.pin - 0.4).abs() < f32::EPSILON);
        assert!((weights.push_parent + 0.2).abs() < f32::EPSILON);
        assert!(weights.validate().is_ok());
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join("limber_config_loads_from_file.toml");
        std::fs::write(&path, "iterations = 6\nroot_pin = 0.5\n").unwrap();
        let config = SolverConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.iterations, 6);
        assert!((config.root_pin - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = SolverConfig::from_file("/nonexistent/limber.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn sanitized_forces_ranges() {
        let config = SolverConfig {
            iterations: 40,
            weight: f32::NAN,
            root_pin: 3.0,
            tolerance: -1.0,
            spine_twist_weight: f32::INFINITY,
            max_offset: f32::NAN,
            arms: ChainWeights {
                pull: f32::NAN,
                push_parent: -4.0,
                reach: 2.0,
                ..ChainWeights::default()
            },
            ..SolverConfig::default()
        }
        .sanitized();

        assert_eq!(config.iterations, MAX_ITERATIONS);
        assert!(config.weight.abs() < f32::EPSILON);
        assert!((config.root_pin - 1.0).abs() < f32::EPSILON);
        assert!(config.tolerance.abs() < f32::EPSILON);
        assert!((config.spine_twist_weight - 1.0).abs() < f32::EPSILON);
        assert!((config.max_offset - 1.0e4).abs() < f32::EPSILON);
        assert!(config.arms.pull.abs() < f32::EPSILON);
        assert!((config.arms.push_parent + 1.0).abs() < f32::EPSILON);
        assert!((config.arms.reach - 1.0).abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sanitizing_a_valid_config_changes_nothing() {
        let config = SolverConfig::from_toml_str("root_pin = 0.3\ntolerance = 0.001").unwrap();
        assert_eq!(config.clone().sanitized(), config);
    }

    #[test]
    fn unit_weight_maps_nan_to_zero() {
        assert!(unit_weight(f32::NAN).abs() < f32::EPSILON);
        assert!((unit_weight(f32::INFINITY) - 1.0).abs() < f32::EPSILON);
        assert!((unit_weight(0.25) - 0.25).abs() < f32::EPSILON);
    }
}
