use serde::Deserialize;
use std::env;

use dealgrid_risk::{ChurnRiskConfig, RiskThresholds, RiskWeights};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub scoring: ScoringConfig,
    pub workers: WorkerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// Churn-scoring knobs, deserialized then validated at load time.
#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    pub weights: WeightsConfig,
    pub thresholds: ThresholdsConfig,
    #[serde(default = "default_minimum_activity_days")]
    pub minimum_activity_days: u32,
    #[serde(default = "default_decay_rate")]
    pub engagement_decay_rate: f64,
}

fn default_lookback_days() -> i64 {
    30
}

fn default_minimum_activity_days() -> u32 {
    3
}

fn default_decay_rate() -> f64 {
    1.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct WeightsConfig {
    pub inactivity: f64,
    pub engagement_trend: f64,
    pub conversion_rate: f64,
    pub session_frequency: f64,
    pub lifetime_value: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThresholdsConfig {
    pub low: u8,
    pub medium: u8,
    pub high: u8,
    pub critical: u8,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    #[serde(default = "default_escalation_interval")]
    pub escalation_interval_seconds: u64,
    #[serde(default = "default_followup_interval")]
    pub followup_interval_seconds: u64,
    #[serde(default = "default_check_interval")]
    pub success_check_interval_seconds: u64,
}

fn default_escalation_interval() -> u64 {
    900
}

fn default_followup_interval() -> u64 {
    300
}

fn default_check_interval() -> u64 {
    600
}

impl ScoringConfig {
    pub fn to_risk_config(&self) -> ChurnRiskConfig {
        ChurnRiskConfig {
            lookback_days: self.lookback_days,
            weights: RiskWeights {
                inactivity: self.weights.inactivity,
                engagement_trend: self.weights.engagement_trend,
                conversion_rate: self.weights.conversion_rate,
                session_frequency: self.weights.session_frequency,
                lifetime_value: self.weights.lifetime_value,
            },
            thresholds: RiskThresholds {
                low: self.thresholds.low,
                medium: self.thresholds.medium,
                high: self.thresholds.high,
                critical: self.thresholds.critical,
            },
            minimum_activity_days: self.minimum_activity_days,
            engagement_decay_rate: self.engagement_decay_rate,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Then the environment-specific file, which is optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Env vars with the DEALGRID prefix, e.g. DEALGRID__SERVER__PORT
            .add_source(config::Environment::with_prefix("DEALGRID").separator("__"))
            .build()?;

        let loaded: Config = s.try_deserialize()?;

        // Threshold ordering and weight positivity are hard invariants of
        // the scorer; refuse to boot on a bad file.
        loaded
            .scoring
            .to_risk_config()
            .validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;

        Ok(loaded)
    }
}
