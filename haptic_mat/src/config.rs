//! Configuration for the mat connection, the clustering stage and the feedback loop.

use crate::error::{MatError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable that overrides `serial.port`.
pub const PORT_ENV_VAR: &str = "HAPTIC_MAT_PORT";

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path of the mat, e.g. `/dev/ttyACM0` or `COM3`.
    pub port: String,
    pub baud_rate: u32,
    /// Read timeout for a single response (milliseconds). Must be non-zero.
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            timeout_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Number of seeded k-means restarts; the lowest-inertia run wins.
    pub n_init: usize,
    /// Lloyd iteration bound per restart.
    pub max_iter: usize,
    pub seed: u64,
    /// Converged once the summed squared centroid shift drops to this.
    pub tolerance: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            n_init: 10,
            max_iter: 300,
            seed: 42,
            tolerance: 1e-4,
        }
    }
}

/// What the actuators show for a cycle that produced no valid analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipPolicy {
    /// All actuators off.
    #[default]
    Neutral,
    /// Repeat the last valid selection.
    HoldLast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Pause between the end of one cycle and the next request (milliseconds).
    pub cycle_interval_ms: u64,
    pub skip_policy: SkipPolicy,
    /// |Δcol| must exceed this before any actuator fires.
    pub column_dead_band: f64,
    /// Capacity of the channel toward the actuation transport.
    pub channel_capacity: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            cycle_interval_ms: 100,
            skip_policy: SkipPolicy::default(),
            column_dead_band: 0.0,
            channel_capacity: 8,
        }
    }
}

impl MatConfig {
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.trim().is_empty() {
            return Err(MatError::Config("serial.port must not be empty".into()));
        }
        if self.serial.timeout_ms == 0 {
            return Err(MatError::Config("serial.timeout_ms must be non-zero".into()));
        }
        if self.serial.baud_rate == 0 {
            return Err(MatError::Config("serial.baud_rate must be non-zero".into()));
        }
        if self.clustering.n_init == 0 || self.clustering.max_iter == 0 {
            return Err(MatError::Config(
                "clustering.n_init and clustering.max_iter must be non-zero".into(),
            ));
        }
        if !(self.clustering.tolerance >= 0.0) {
            return Err(MatError::Config("clustering.tolerance must be >= 0".into()));
        }
        if !(self.feedback.column_dead_band >= 0.0) {
            return Err(MatError::Config("feedback.column_dead_band must be >= 0".into()));
        }
        if self.feedback.channel_capacity == 0 {
            return Err(MatError::Config("feedback.channel_capacity must be non-zero".into()));
        }
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| MatError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| MatError::Config(e.to_string()))
    }

    /// Applies `HAPTIC_MAT_PORT` if it is set.
    pub fn with_env_overrides(self) -> Self {
        self.with_port_override(std::env::var(PORT_ENV_VAR).ok())
    }

    pub fn with_port_override(mut self, port: Option<String>) -> Self {
        if let Some(port) = port.filter(|p| !p.trim().is_empty()) {
            self.serial.port = port;
        }
        self
    }
}
