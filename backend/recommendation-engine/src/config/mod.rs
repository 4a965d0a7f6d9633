use crate::models::{EngineWeights, WeightError};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment error: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid engine weights: {0}")]
    InvalidWeights(#[from] WeightError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub weights: EngineWeights,
    pub scoring: ScoringConfig,
    pub llm: LlmConfig,
    pub retention: RetentionConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Words per minute used to estimate read time
    #[serde(default = "default_reading_speed")]
    pub reading_speed_wpm: u32,
    /// Default size of the diversified result list
    #[serde(default = "default_target_size")]
    pub target_size: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            reading_speed_wpm: default_reading_speed(),
            target_size: default_target_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-call budget for the similarity classifier
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Consecutive failures before the classifier is skipped
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_timeout_ms(),
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Feedback older than this is pruned
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Hard cap on stored feedback entries, oldest evicted first
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            max_entries: default_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    pub redis_url: Option<String>,
}

fn default_service_name() -> String {
    "recommendation-engine".to_string()
}
fn default_reading_speed() -> u32 {
    200
}
fn default_target_size() -> usize {
    12
}
fn default_provider() -> String {
    "anthropic".to_string()
}
fn default_model() -> String {
    "claude-3-haiku-20240307".to_string()
}
fn default_max_tokens() -> u32 {
    16
}
fn default_timeout_ms() -> u64 {
    3000
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_cooldown_secs() -> u64 {
    60
}
fn default_retention_days() -> i64 {
    180
}
fn default_max_entries() -> usize {
    10_000
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Config {
            service: envy::from_env::<ServiceConfig>()?,
            weights: envy::prefixed("RECOMMENDATION_WEIGHT_").from_env::<EngineWeights>()?,
            scoring: envy::prefixed("SCORING_").from_env::<ScoringConfig>()?,
            llm: envy::prefixed("LLM_").from_env::<LlmConfig>()?,
            retention: envy::prefixed("FEEDBACK_").from_env::<RetentionConfig>()?,
            store: envy::from_env::<StoreConfig>()?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;

        if self.scoring.reading_speed_wpm == 0 {
            return Err(ConfigError::Invalid(
                "SCORING_READING_SPEED_WPM must be greater than zero".to_string(),
            ));
        }
        if self.scoring.target_size == 0 {
            return Err(ConfigError::Invalid(
                "SCORING_TARGET_SIZE must be greater than zero".to_string(),
            ));
        }
        if self.retention.retention_days <= 0 {
            return Err(ConfigError::Invalid(
                "FEEDBACK_RETENTION_DAYS must be positive".to_string(),
            ));
        }
        if self.llm.enabled && self.llm.api_key.is_empty() {
            return Err(ConfigError::Invalid(
                "LLM_API_KEY is required when LLM_ENABLED=true".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                service_name: default_service_name(),
            },
            weights: EngineWeights::default(),
            scoring: ScoringConfig::default(),
            llm: LlmConfig::default(),
            retention: RetentionConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scoring.target_size, 12);
        assert_eq!(config.weights.personalized, 40.0);
    }

    #[test]
    fn test_weights_from_prefixed_env() {
        let vars = vec![
            (
                "RECOMMENDATION_WEIGHT_TRENDING".to_string(),
                "55".to_string(),
            ),
            (
                "RECOMMENDATION_WEIGHT_RECENCY_BOOST".to_string(),
                "0.1".to_string(),
            ),
        ];

        let weights: EngineWeights = envy::prefixed("RECOMMENDATION_WEIGHT_")
            .from_iter(vars)
            .unwrap();

        assert_eq!(weights.trending, 55.0);
        assert!((weights.recency_boost - 0.1).abs() < 1e-6);
        // Unset fields keep their defaults
        assert_eq!(weights.personalized, 40.0);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let config = Config {
            weights: EngineWeights {
                editorial: -5.0,
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWeights(_))
        ));
    }

    #[test]
    fn test_enabled_llm_requires_key() {
        let config = Config {
            llm: LlmConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
