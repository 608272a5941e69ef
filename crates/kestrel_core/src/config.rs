//! # Scene Configuration
//!
//! Startup tunables loaded once from TOML. These cover the knobs a shipped
//! build exposes. The async-load frame budget is deliberately NOT here:
//! it is a compile-time constant derived from the minimum acceptable
//! frame rate.

use serde::{Deserialize, Serialize};

use crate::error::{SceneError, SceneResult};

/// Default transform-smoothing time constant.
pub const DEFAULT_SMOOTHING_CONSTANT: f32 = 50.0;
/// Default smoothing snap threshold in world units.
pub const DEFAULT_SNAP_THRESHOLD: f32 = 5.0;

/// Tunables applied to a scene at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SceneConfig {
    /// Multiplier applied to every update time step.
    pub time_scale: f32,
    /// Transform-smoothing time constant; higher converges faster.
    pub smoothing_constant: f32,
    /// Distance beyond which smoothing consumers teleport instead of
    /// interpolating.
    pub snap_threshold: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            smoothing_constant: DEFAULT_SMOOTHING_CONSTANT,
            snap_threshold: DEFAULT_SNAP_THRESHOLD,
        }
    }
}

impl SceneConfig {
    /// Parses a config from TOML text.
    ///
    /// # Errors
    ///
    /// [`SceneError::InvalidConfig`] on syntax errors, unknown fields or
    /// out-of-range values.
    pub fn from_toml(text: &str) -> SceneResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| SceneError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the config to TOML text.
    ///
    /// # Errors
    ///
    /// [`SceneError::InvalidConfig`] if serialization fails (not expected
    /// for this type).
    pub fn to_toml(&self) -> SceneResult<String> {
        toml::to_string_pretty(self).map_err(|e| SceneError::InvalidConfig(e.to_string()))
    }

    fn validate(&self) -> SceneResult<()> {
        if self.time_scale <= 0.0 {
            return Err(SceneError::InvalidConfig(format!(
                "time_scale must be positive, got {}",
                self.time_scale
            )));
        }
        if self.smoothing_constant <= 0.0 {
            return Err(SceneError::InvalidConfig(format!(
                "smoothing_constant must be positive, got {}",
                self.smoothing_constant
            )));
        }
        if self.snap_threshold < 0.0 {
            return Err(SceneError::InvalidConfig(format!(
                "snap_threshold must be non-negative, got {}",
                self.snap_threshold
            )));
        }
        Ok(())
    }
}
