use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use dealgrid_core::BoxedError;
use dealgrid_escalation::SuccessProbe;
use dealgrid_followup::FollowUpStore;
use dealgrid_risk::{ActivityAggregator, ChurnRiskConfig, RiskError, RiskStore, UserStatus};

/// Live success measurement: engagement from the activity aggregate,
/// responses from follow-up history, reactivation from the latest
/// monitoring snapshot.
pub struct LiveSuccessProbe {
    aggregator: ActivityAggregator,
    config: ChurnRiskConfig,
    followups: Arc<dyn FollowUpStore>,
    risks: Arc<dyn RiskStore>,
}

impl LiveSuccessProbe {
    pub fn new(
        aggregator: ActivityAggregator,
        config: ChurnRiskConfig,
        followups: Arc<dyn FollowUpStore>,
        risks: Arc<dyn RiskStore>,
    ) -> Self {
        Self {
            aggregator,
            config,
            followups,
            risks,
        }
    }
}

#[async_trait]
impl SuccessProbe for LiveSuccessProbe {
    async fn engagement_score(&self, user_id: &str) -> Result<f64, BoxedError> {
        match self.aggregator.collect(user_id, Utc::now(), &self.config).await {
            Ok(activity) => Ok(activity.engagement_score),
            // A user with no activity is simply fully disengaged.
            Err(RiskError::NoActivityData(_)) => Ok(0.0),
            Err(err) => Err(Box::new(err)),
        }
    }

    async fn response_count(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, BoxedError> {
        self.followups.response_count_since(user_id, since).await
    }

    async fn reactivated(&self, user_id: &str, since: DateTime<Utc>) -> Result<bool, BoxedError> {
        let snapshot = self.risks.latest_monitoring(user_id).await?;
        Ok(snapshot
            .map(|s| {
                s.last_updated >= since
                    && matches!(s.status, UserStatus::Reactivated | UserStatus::Active)
            })
            .unwrap_or(false))
    }
}
