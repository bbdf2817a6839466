//! Configuration management for the risk scoring engine

use crate::fusion::FusionWeights;
use crate::rules::RuleThresholds;
use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub redis: RedisConfig,
    pub model: ModelConfig,
    pub rules: RuleThresholds,
    pub scoring: ScoringConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming scoring requests
    pub transaction_subject: String,
    /// Subject for outgoing risk assessments
    pub decision_subject: String,
    /// Subject for incoming ground-truth labels
    pub feedback_subject: String,
}

/// Redis (behavioral window store) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

/// Learned scorer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Directory for the topology descriptor and serialized weights
    pub artifact_dir: String,
    /// When false the model path is bypassed and the rule score decides
    #[serde(default = "default_enable_ml")]
    pub enable_ml_model: bool,
}

fn default_enable_ml() -> bool {
    true
}

/// Score fusion and thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Final score at or above which a transaction is flagged and denied
    pub fraud_threshold: f64,
    /// Informational MEDIUM/HIGH cutoff, not consumed by the decision path
    pub risk_threshold: f64,
    #[serde(flatten)]
    pub weights: FusionWeights,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Number of concurrent scoring tasks
    pub workers: usize,
    /// Per-request scoring deadline in milliseconds
    pub timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        let app: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app.validate()?;
        Ok(app)
    }

    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.scoring.weights.validate()?;
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.scoring.fraud_threshold),
            "fraud_threshold must lie in [0,1]"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.scoring.risk_threshold),
            "risk_threshold must lie in [0,1]"
        );
        anyhow::ensure!(
            self.rules.night_time_start < 24 && self.rules.night_time_end < 24,
            "night window hours must lie in 0..24"
        );
        anyhow::ensure!(self.pipeline.workers > 0, "pipeline.workers must be positive");
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                transaction_subject: "transactions.score".to_string(),
                decision_subject: "transactions.decisions".to_string(),
                feedback_subject: "transactions.feedback".to_string(),
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
            },
            model: ModelConfig {
                artifact_dir: "model".to_string(),
                enable_ml_model: true,
            },
            rules: RuleThresholds::default(),
            scoring: ScoringConfig {
                fraud_threshold: 0.7,
                risk_threshold: 0.5,
                weights: FusionWeights::default(),
            },
            pipeline: PipelineConfig {
                workers: 4,
                timeout_ms: 1_000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}
