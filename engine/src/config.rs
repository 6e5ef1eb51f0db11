//! `EngineConfig`: a recognized-options struct loaded from environment
//! variables. Unknown env keys are ignored with a warning; unknown values
//! for recognized keys are rejected at construction time.

use waymark_types::routing::ModelTier;

const RECOGNIZED_KEYS: &[&str] = &[
    "WAYMARK_WORKFLOW_ENGINE",
    "WAYMARK_DEFAULT_MODEL_TIER",
    "WAYMARK_MAX_CONCURRENT_WORKFLOWS",
    "WAYMARK_MAX_CONCURRENT_AGENTS",
    "WAYMARK_STREAMING_BUFFER_SIZE",
    "WAYMARK_HEARTBEAT_INTERVAL_SECS",
    "WAYMARK_BUDGET_MAX_TOKENS",
    "WAYMARK_BUDGET_MAX_ITERATIONS",
    "WAYMARK_BUDGET_MAX_WALL_TIME_SECS",
    "WAYMARK_RESEARCH_MAX_ITERATIONS",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowEngineKind {
    Durable,
    Remote,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("unrecognized value {value:?} for {key}")]
    UnrecognizedValue { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub workflow_engine: WorkflowEngineKind,
    pub default_model_tier: ModelTier,
    pub max_concurrent_workflows: u32,
    pub max_concurrent_agents: usize,
    pub streaming_buffer_size: usize,
    pub heartbeat_interval_secs: u64,
    pub budget_max_tokens: u64,
    pub budget_max_iterations: u32,
    pub budget_max_wall_time_secs: u64,
    pub research_max_iterations: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workflow_engine: WorkflowEngineKind::Durable,
            default_model_tier: ModelTier::Medium,
            max_concurrent_workflows: 16,
            max_concurrent_agents: 4,
            streaming_buffer_size: 256,
            heartbeat_interval_secs: 10,
            budget_max_tokens: 100_000,
            budget_max_iterations: 20,
            budget_max_wall_time_secs: 3600,
            research_max_iterations: 3,
        }
    }
}

impl EngineConfig {
    /// Loads recognized env vars over the defaults, warning (not failing) on
    /// any unrecognized key seen with the `WAYMARK_` prefix.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (key, value) in std::env::vars() {
            if !key.starts_with("WAYMARK_") {
                continue;
            }
            if !RECOGNIZED_KEYS.contains(&key.as_str()) {
                tracing::warn!(key = %key, "unrecognized WAYMARK_ environment variable, ignoring");
                continue;
            }
            config.apply(&key, &value)?;
        }

        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        macro_rules! parse_or_reject {
            ($field:expr, $key_name:expr) => {
                match value.parse() {
                    Ok(parsed) => $field = parsed,
                    Err(_) => {
                        return Err(ConfigError::UnrecognizedValue { key: $key_name, value: value.to_string() })
                    }
                }
            };
        }

        match key {
            "WAYMARK_WORKFLOW_ENGINE" => {
                self.workflow_engine = match value {
                    "durable" => WorkflowEngineKind::Durable,
                    "remote" => WorkflowEngineKind::Remote,
                    _ => {
                        return Err(ConfigError::UnrecognizedValue {
                            key: "WAYMARK_WORKFLOW_ENGINE",
                            value: value.to_string(),
                        })
                    }
                };
            }
            "WAYMARK_DEFAULT_MODEL_TIER" => {
                self.default_model_tier = match value {
                    "small" => ModelTier::Small,
                    "medium" => ModelTier::Medium,
                    "large" => ModelTier::Large,
                    _ => {
                        return Err(ConfigError::UnrecognizedValue {
                            key: "WAYMARK_DEFAULT_MODEL_TIER",
                            value: value.to_string(),
                        })
                    }
                };
            }
            "WAYMARK_MAX_CONCURRENT_WORKFLOWS" => parse_or_reject!(self.max_concurrent_workflows, "WAYMARK_MAX_CONCURRENT_WORKFLOWS"),
            "WAYMARK_MAX_CONCURRENT_AGENTS" => parse_or_reject!(self.max_concurrent_agents, "WAYMARK_MAX_CONCURRENT_AGENTS"),
            "WAYMARK_STREAMING_BUFFER_SIZE" => parse_or_reject!(self.streaming_buffer_size, "WAYMARK_STREAMING_BUFFER_SIZE"),
            "WAYMARK_HEARTBEAT_INTERVAL_SECS" => parse_or_reject!(self.heartbeat_interval_secs, "WAYMARK_HEARTBEAT_INTERVAL_SECS"),
            "WAYMARK_BUDGET_MAX_TOKENS" => parse_or_reject!(self.budget_max_tokens, "WAYMARK_BUDGET_MAX_TOKENS"),
            "WAYMARK_BUDGET_MAX_ITERATIONS" => parse_or_reject!(self.budget_max_iterations, "WAYMARK_BUDGET_MAX_ITERATIONS"),
            "WAYMARK_BUDGET_MAX_WALL_TIME_SECS" => parse_or_reject!(self.budget_max_wall_time_secs, "WAYMARK_BUDGET_MAX_WALL_TIME_SECS"),
            "WAYMARK_RESEARCH_MAX_ITERATIONS" => parse_or_reject!(self.research_max_iterations, "WAYMARK_RESEARCH_MAX_ITERATIONS"),
            _ => unreachable!("filtered by RECOGNIZED_KEYS above"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_expected_values() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrent_agents, 4);
        assert_eq!(config.streaming_buffer_size, 256);
        assert_eq!(config.heartbeat_interval_secs, 10);
    }

    #[test]
    fn unknown_value_for_known_key_is_rejected() {
        let mut config = EngineConfig::default();
        let err = config.apply("WAYMARK_DEFAULT_MODEL_TIER", "huge").unwrap_err();
        assert!(matches!(err, ConfigError::UnrecognizedValue { .. }));
    }

    #[test]
    fn known_value_is_applied() {
        let mut config = EngineConfig::default();
        config.apply("WAYMARK_MAX_CONCURRENT_AGENTS", "16").unwrap();
        assert_eq!(config.max_concurrent_agents, 16);
    }
}
