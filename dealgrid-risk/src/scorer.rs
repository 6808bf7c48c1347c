use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use serde_json::json;
use uuid::Uuid;

use dealgrid_core::{UserStore, UserProfile};

use crate::activity::ActivityAggregator;
use crate::models::{
    ActivityData, ActivityTrend, BatchFailure, BatchScoreOutcome, ChurnRisk, ChurnRiskConfig,
    FactorImpact, RiskFactor,
};
use crate::planner::generate_recommendations;
use crate::store::RiskStore;
use crate::RiskError;

/// Users scored concurrently per batch chunk.
const BATCH_CHUNK: usize = 50;

/// Computes weighted churn-risk factors, the overall score and tier, and a
/// confidence estimate, appending one `ChurnRisk` record per run.
pub struct RiskScorer {
    users: Arc<dyn UserStore>,
    aggregator: ActivityAggregator,
    store: Arc<dyn RiskStore>,
    config: ChurnRiskConfig,
}

impl RiskScorer {
    pub fn new(
        users: Arc<dyn UserStore>,
        aggregator: ActivityAggregator,
        store: Arc<dyn RiskStore>,
        config: ChurnRiskConfig,
    ) -> Result<Self, RiskError> {
        config.validate()?;
        Ok(Self {
            users,
            aggregator,
            store,
            config,
        })
    }

    /// Score one user and append the resulting record.
    ///
    /// Fails with `NoActivityData` when the user has no clicks or
    /// conversions inside the lookback window; that is "not yet
    /// scoreable", not "zero risk".
    pub async fn calculate_churn_risk(
        &self,
        user_id: &str,
        overrides: Option<&ChurnRiskConfig>,
    ) -> Result<ChurnRisk, RiskError> {
        let config = match overrides {
            Some(c) => {
                c.validate()?;
                c
            }
            None => &self.config,
        };

        let profile = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| RiskError::UserNotFound(user_id.to_string()))?;

        let now = Utc::now();
        let activity = self.aggregator.collect(user_id, now, config).await?;

        let risk = score(&profile, &activity, config, now);
        self.store.append_churn_risk(&risk).await?;

        tracing::info!(
            user_id,
            score = risk.score,
            level = risk.level.as_str(),
            confidence = risk.confidence,
            "churn risk calculated"
        );

        Ok(risk)
    }

    /// Score many users in bounded chunks. One bad user is logged and
    /// skipped, never aborting the batch; the outcome carries both the
    /// scored records and the per-user failures.
    pub async fn batch_calculate_churn_risk(
        &self,
        user_ids: &[String],
        overrides: Option<&ChurnRiskConfig>,
    ) -> BatchScoreOutcome {
        let mut outcome = BatchScoreOutcome {
            risks: Vec::with_capacity(user_ids.len()),
            failures: Vec::new(),
        };

        for chunk in user_ids.chunks(BATCH_CHUNK) {
            let results = join_all(
                chunk
                    .iter()
                    .map(|user_id| async move {
                        (user_id, self.calculate_churn_risk(user_id, overrides).await)
                    }),
            )
            .await;

            for (user_id, result) in results {
                match result {
                    Ok(risk) => outcome.risks.push(risk),
                    Err(err) => {
                        tracing::warn!(user_id = %user_id, error = %err, "batch scoring skipped user");
                        outcome.failures.push(BatchFailure {
                            user_id: user_id.clone(),
                            error: err.to_string(),
                        });
                    }
                }
            }
        }

        tracing::info!(
            requested = user_ids.len(),
            scored = outcome.risks.len(),
            failed = outcome.failures.len(),
            "batch scoring finished"
        );

        outcome
    }
}

/// Pure scoring over an activity snapshot. Time enters as a parameter so
/// threshold and date behavior stays testable.
pub fn score(
    profile: &UserProfile,
    activity: &ActivityData,
    config: &ChurnRiskConfig,
    now: DateTime<Utc>,
) -> ChurnRisk {
    let factors = build_factors(activity, config);

    let weight_sum: f64 = factors.iter().map(|f| f.weight).sum();
    let weighted: f64 = factors.iter().map(|f| f.value * f.weight).sum();
    let raw = if weight_sum > 0.0 { weighted / weight_sum } else { 0.0 };
    let score = raw.round().clamp(0.0, 100.0) as u8;

    let level = config.thresholds.level_for(score);

    let predicted_churn_at = if score >= 50 {
        let days = (((100 - score) as f64) / 2.0).round().max(1.0) as i64;
        Some(now + Duration::days(days))
    } else {
        None
    };

    let confidence = confidence(profile, activity, &factors, now);

    let recommendations = generate_recommendations(&factors, level, activity);

    ChurnRisk {
        id: Uuid::new_v4(),
        user_id: profile.user_id.clone(),
        score,
        level,
        factors,
        predicted_churn_at,
        confidence,
        last_activity_at: activity.last_activity_at,
        trend: activity.trend,
        engagement_score: activity.engagement_score,
        lifetime_value: activity.lifetime_value,
        recommendations,
        calculated_at: now,
        metadata: json!({
            "lookback_days": config.lookback_days,
            "sessions": activity.sessions,
            "clicks": activity.clicks,
        }),
    }
}

fn build_factors(activity: &ActivityData, config: &ChurnRiskConfig) -> Vec<RiskFactor> {
    let w = &config.weights;

    let inactivity = (activity.days_since_last_activity as f64 / 30.0).min(1.0) * 100.0;
    let trend_value = match activity.trend {
        ActivityTrend::Increasing => 0.0,
        ActivityTrend::Stable => 25.0,
        ActivityTrend::Decreasing => 75.0,
        ActivityTrend::Inactive => 100.0,
    };
    let conversion = (100.0 - activity.conversion_rate * 10.0).max(0.0);
    let frequency = (100.0 - activity.frequency * 20.0).max(0.0);
    let ltv = if activity.lifetime_value < 1000.0 {
        (100.0 - activity.lifetime_value / 10.0).max(0.0)
    } else {
        0.0
    };

    vec![
        RiskFactor {
            factor: "inactivity".to_string(),
            weight: w.inactivity,
            value: inactivity,
            impact: FactorImpact::Negative,
            description: format!(
                "{} days since last activity",
                activity.days_since_last_activity
            ),
            category: "activity".to_string(),
        },
        RiskFactor {
            factor: "engagement_trend".to_string(),
            weight: w.engagement_trend,
            value: trend_value,
            impact: if trend_value > 25.0 {
                FactorImpact::Negative
            } else {
                FactorImpact::Positive
            },
            description: format!("click trend is {:?}", activity.trend),
            category: "engagement".to_string(),
        },
        RiskFactor {
            factor: "conversion_rate".to_string(),
            weight: w.conversion_rate,
            value: conversion,
            impact: FactorImpact::Negative,
            description: format!("{:.1}% of clicks convert", activity.conversion_rate),
            category: "monetization".to_string(),
        },
        RiskFactor {
            factor: "session_frequency".to_string(),
            weight: w.session_frequency,
            value: frequency,
            impact: FactorImpact::Negative,
            description: format!("{:.2} sessions per day", activity.frequency),
            category: "activity".to_string(),
        },
        RiskFactor {
            factor: "lifetime_value".to_string(),
            weight: w.lifetime_value,
            value: ltv,
            impact: FactorImpact::Negative,
            description: format!("lifetime value {:.0}", activity.lifetime_value),
            category: "monetization".to_string(),
        },
    ]
}

fn confidence(
    profile: &UserProfile,
    activity: &ActivityData,
    factors: &[RiskFactor],
    now: DateTime<Utc>,
) -> u8 {
    let mut confidence: f64 = 70.0;

    if activity.sessions > 10 {
        confidence += 10.0;
    }
    if activity.sessions < 3 {
        confidence -= 20.0;
    }

    let tenure_days = profile.days_since_registration(now);
    if tenure_days > 30 {
        confidence += 10.0;
    }
    if tenure_days < 7 {
        confidence -= 15.0;
    }

    // Agreeing factors make the score more trustworthy, scattered ones less.
    let spread = normalized_std_dev(factors);
    if spread < 0.2 {
        confidence += 10.0;
    } else if spread > 0.5 {
        confidence -= 10.0;
    }

    confidence.clamp(0.0, 100.0).round() as u8
}

/// Standard deviation of factor values, normalized into [0, 1].
fn normalized_std_dev(factors: &[RiskFactor]) -> f64 {
    if factors.is_empty() {
        return 0.0;
    }
    let n = factors.len() as f64;
    let mean = factors.iter().map(|f| f.value).sum::<f64>() / n;
    let variance = factors.iter().map(|f| (f.value - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RiskLevel, RiskWeights};

    fn sample_activity() -> ActivityData {
        ActivityData {
            sessions: 2,
            clicks: 4,
            conversions: 0,
            revenue: 0.0,
            last_activity_at: None,
            days_since_last_activity: 40,
            days_active: 2,
            frequency: 2.0 / 30.0,
            clicks_per_session: 2.0,
            conversion_rate: 0.0,
            lifetime_value: 0.0,
            engagement_score: 5.0,
            trend: ActivityTrend::Inactive,
        }
    }

    fn profile() -> UserProfile {
        UserProfile::new("u-1", Utc::now() - Duration::days(120))
    }

    #[test]
    fn dormant_user_lands_in_a_high_tier() {
        let config = ChurnRiskConfig::default();
        let risk = score(&profile(), &sample_activity(), &config, Utc::now());

        let inactivity = risk
            .factors
            .iter()
            .find(|f| f.factor == "inactivity")
            .unwrap();
        assert_eq!(inactivity.value, 100.0);

        assert!(
            risk.level == RiskLevel::High || risk.level == RiskLevel::Critical,
            "expected high tier, got {:?} at score {}",
            risk.level,
            risk.score
        );
        assert!(risk.predicted_churn_at.is_some());
    }

    #[test]
    fn predicted_date_set_iff_score_at_least_fifty() {
        let config = ChurnRiskConfig::default();
        let now = Utc::now();

        let risky = score(&profile(), &sample_activity(), &config, now);
        assert!(risky.score >= 50);
        let predicted = risky.predicted_churn_at.unwrap();
        assert!(predicted > now, "predicted churn date must be in the future");

        let mut healthy_activity = sample_activity();
        healthy_activity.days_since_last_activity = 0;
        healthy_activity.sessions = 40;
        healthy_activity.clicks = 200;
        healthy_activity.conversions = 10;
        healthy_activity.frequency = 40.0 / 30.0;
        healthy_activity.conversion_rate = 5.0;
        healthy_activity.lifetime_value = 4000.0;
        healthy_activity.trend = ActivityTrend::Increasing;

        let healthy = score(&profile(), &healthy_activity, &config, now);
        assert!(healthy.score < 50, "got score {}", healthy.score);
        assert!(healthy.predicted_churn_at.is_none());
    }

    #[test]
    fn score_is_normalized_for_any_weight_magnitude() {
        let mut config = ChurnRiskConfig::default();
        config.weights = RiskWeights {
            inactivity: 300.0,
            engagement_trend: 250.0,
            conversion_rate: 150.0,
            session_frequency: 150.0,
            lifetime_value: 150.0,
        };

        let scaled = score(&profile(), &sample_activity(), &config, Utc::now());
        let baseline = score(
            &profile(),
            &sample_activity(),
            &ChurnRiskConfig::default(),
            Utc::now(),
        );

        // Scaling all weights by a constant leaves the normalized score alone.
        assert_eq!(scaled.score, baseline.score);
        assert!(scaled.score <= 100);
    }

    #[test]
    fn inactivity_never_lowers_the_score() {
        let config = ChurnRiskConfig::default();
        let mut previous = 0u8;
        for days in [0i64, 5, 10, 20, 30, 45, 90] {
            let mut activity = sample_activity();
            activity.days_since_last_activity = days;
            let risk = score(&profile(), &activity, &config, Utc::now());
            assert!(
                risk.score + 1 >= previous,
                "score dropped from {previous} to {} at {days} days",
                risk.score
            );
            previous = risk.score;
        }
    }

    #[test]
    fn confidence_penalizes_thin_history() {
        let now = Utc::now();
        let activity = sample_activity();
        let factors = build_factors(&activity, &ChurnRiskConfig::default());

        let veteran = UserProfile::new("u-1", now - Duration::days(120));
        let newcomer = UserProfile::new("u-2", now - Duration::days(2));

        let veteran_confidence = confidence(&veteran, &activity, &factors, now);
        let newcomer_confidence = confidence(&newcomer, &activity, &factors, now);
        assert!(veteran_confidence > newcomer_confidence);
    }
}
