use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use dealgrid_core::Channel;

/// Churn risk tier. Ordering matters: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityTrend {
    Increasing,
    Stable,
    Decreasing,
    Inactive,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FactorImpact {
    Positive,
    Negative,
}

/// One weighted signal contributing to the overall churn score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: String,
    pub weight: f64,
    /// Normalized contribution in [0, 100]; higher means more churn-prone.
    pub value: f64,
    pub impact: FactorImpact,
    pub description: String,
    pub category: String,
}

/// One scoring run for one user. Append-only: a new record per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChurnRisk {
    pub id: Uuid,
    pub user_id: String,
    pub score: u8,
    pub level: RiskLevel,
    pub factors: Vec<RiskFactor>,
    pub predicted_churn_at: Option<DateTime<Utc>>,
    pub confidence: u8,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub trend: ActivityTrend,
    pub engagement_score: f64,
    pub lifetime_value: f64,
    pub recommendations: Vec<InterventionRecommendation>,
    pub calculated_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Weights for the five risk factors. Relative magnitudes are what matter;
/// the score normalizes by the weight sum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskWeights {
    pub inactivity: f64,
    pub engagement_trend: f64,
    pub conversion_rate: f64,
    pub session_frequency: f64,
    pub lifetime_value: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            inactivity: 0.30,
            engagement_trend: 0.25,
            conversion_rate: 0.15,
            session_frequency: 0.15,
            lifetime_value: 0.15,
        }
    }
}

impl RiskWeights {
    pub fn sum(&self) -> f64 {
        self.inactivity
            + self.engagement_trend
            + self.conversion_rate
            + self.session_frequency
            + self.lifetime_value
    }
}

/// Score thresholds per tier. A score maps to the highest tier whose
/// threshold it meets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub low: u8,
    pub medium: u8,
    pub high: u8,
    pub critical: u8,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low: 0,
            medium: 40,
            high: 60,
            critical: 80,
        }
    }
}

impl RiskThresholds {
    pub fn level_for(&self, score: u8) -> RiskLevel {
        if score >= self.critical {
            RiskLevel::Critical
        } else if score >= self.high {
            RiskLevel::High
        } else if score >= self.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChurnRiskConfig {
    pub lookback_days: i64,
    pub weights: RiskWeights,
    pub thresholds: RiskThresholds,
    /// Minimum distinct active days before behavior patterns are reported.
    pub minimum_activity_days: u32,
    /// Per-day decay applied to the recency term of the engagement score.
    pub engagement_decay_rate: f64,
}

impl Default for ChurnRiskConfig {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            weights: RiskWeights::default(),
            thresholds: RiskThresholds::default(),
            minimum_activity_days: 3,
            engagement_decay_rate: 1.0,
        }
    }
}

impl ChurnRiskConfig {
    /// Load-time hardening: tiers must be strictly ordered and weights
    /// strictly positive.
    pub fn validate(&self) -> Result<(), crate::RiskError> {
        let t = &self.thresholds;
        if !(t.low < t.medium && t.medium < t.high && t.high < t.critical) {
            return Err(crate::RiskError::InvalidConfig(format!(
                "thresholds must be strictly ordered low<medium<high<critical, got {}/{}/{}/{}",
                t.low, t.medium, t.high, t.critical
            )));
        }
        let w = &self.weights;
        for (name, value) in [
            ("inactivity", w.inactivity),
            ("engagement_trend", w.engagement_trend),
            ("conversion_rate", w.conversion_rate),
            ("session_frequency", w.session_frequency),
            ("lifetime_value", w.lifetime_value),
        ] {
            if value <= 0.0 {
                return Err(crate::RiskError::InvalidConfig(format!(
                    "weight {name} must be positive, got {value}"
                )));
            }
        }
        if self.lookback_days <= 0 {
            return Err(crate::RiskError::InvalidConfig(format!(
                "lookback_days must be positive, got {}",
                self.lookback_days
            )));
        }
        Ok(())
    }
}

/// Normalized per-user activity snapshot for a lookback window.
/// Recomputed on every call, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityData {
    pub sessions: u32,
    pub clicks: u32,
    pub conversions: u32,
    pub revenue: f64,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub days_since_last_activity: i64,
    pub days_active: u32,
    /// Sessions per lookback day.
    pub frequency: f64,
    /// Clicks per session; impressions never reach the retention core, so
    /// this stands in for CTR.
    pub clicks_per_session: f64,
    /// Conversions per click, in percent.
    pub conversion_rate: f64,
    pub lifetime_value: f64,
    pub engagement_score: f64,
    pub trend: ActivityTrend,
}

// ── Monitoring ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelUsage {
    pub source: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityMetrics {
    pub total_sessions: u32,
    pub total_clicks: u32,
    pub total_conversions: u32,
    pub total_revenue: f64,
    pub days_active: u32,
    pub days_inactive: u32,
    pub longest_inactive_streak: u32,
    pub avg_session_duration_minutes: f64,
    pub avg_hours_between_sessions: f64,
    pub peak_activity_hour: u8,
    pub top_channels: Vec<ChannelUsage>,
    pub device_distribution: BTreeMap<String, u64>,
    pub location_distribution: BTreeMap<String, u64>,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Flat,
    Down,
}

/// A temporal or channel regularity in a user's behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorPattern {
    pub kind: String,
    pub description: String,
    /// Observations supporting the pattern inside the window.
    pub frequency: u64,
    /// Share of activity the pattern explains, in [0, 1].
    pub strength: f64,
    pub trend: TrendDirection,
    pub predictability: f64,
}

/// Direction and strength of one engagement metric over the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementTrend {
    pub metric: String,
    pub direction: TrendDirection,
    /// Least-squares slope of the daily series.
    pub slope: f64,
    /// Pearson correlation of the daily series against time.
    pub correlation: f64,
    pub significance: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    SuddenDrop,
    ConversionStall,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityAnomaly {
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub description: String,
    pub expected_value: f64,
    pub actual_value: f64,
    pub deviation: f64,
    pub confidence: f64,
    pub possible_causes: Vec<String>,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    AtRisk,
    Churning,
    Churned,
    Reactivated,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::AtRisk => "at_risk",
            UserStatus::Churning => "churning",
            UserStatus::Churned => "churned",
            UserStatus::Reactivated => "reactivated",
        }
    }
}

/// One monitoring snapshot for one user. Persisted per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityMonitoring {
    pub id: Uuid,
    pub user_id: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub metrics: ActivityMetrics,
    pub patterns: Vec<BehaviorPattern>,
    pub trends: Vec<EngagementTrend>,
    pub anomalies: Vec<ActivityAnomaly>,
    pub health_score: u8,
    pub status: UserStatus,
    pub last_updated: DateTime<Utc>,
}

// ── Interventions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Urgent => 4,
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    EngagementCampaign,
    ProductRecommendation,
    SupportOutreach,
    DiscountOffer,
}

/// Advisory only: feeds the escalation engine's action menu, it is not
/// itself an execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionRecommendation {
    pub kind: InterventionKind,
    pub priority: Priority,
    pub description: String,
    pub expected_impact: f64,
    pub cost: f64,
    pub timeframe_days: u32,
    pub channels: Vec<Channel>,
    pub parameters: serde_json::Value,
}

// ── Batch scoring ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    pub user_id: String,
    pub error: String,
}

/// Outcome of a batch scoring run. `risks.len() + failures.len()` always
/// equals the requested user count, so silent drops are detectable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchScoreOutcome {
    pub risks: Vec<ChurnRisk>,
    pub failures: Vec<BatchFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_mapping_is_deterministic_and_monotonic() {
        let t = RiskThresholds::default();
        assert_eq!(t.level_for(0), RiskLevel::Low);
        assert_eq!(t.level_for(39), RiskLevel::Low);
        assert_eq!(t.level_for(40), RiskLevel::Medium);
        assert_eq!(t.level_for(60), RiskLevel::High);
        assert_eq!(t.level_for(79), RiskLevel::High);
        assert_eq!(t.level_for(80), RiskLevel::Critical);
        assert_eq!(t.level_for(100), RiskLevel::Critical);

        // Same inputs, same output.
        assert_eq!(t.level_for(55), t.level_for(55));

        let mut previous = RiskLevel::Low;
        for score in 0..=100u8 {
            let level = t.level_for(score);
            assert!(level >= previous, "level regressed at score {score}");
            previous = level;
        }
    }

    #[test]
    fn config_validation_rejects_unordered_thresholds() {
        let mut config = ChurnRiskConfig::default();
        config.thresholds.medium = 90;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_validation_rejects_non_positive_weights() {
        let mut config = ChurnRiskConfig::default();
        config.weights.conversion_rate = 0.0;
        assert!(config.validate().is_err());

        config.weights.conversion_rate = -0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn priority_ranks_descend_from_urgent() {
        assert!(Priority::Urgent.rank() > Priority::High.rank());
        assert!(Priority::High.rank() > Priority::Medium.rank());
        assert!(Priority::Medium.rank() > Priority::Low.rank());
    }
}
