use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use dealgrid_core::{
    MessagingGateway, RecommendationProvider, TrafficStore, UserProfile, UserStore,
};
use dealgrid_shared::Masked;

use crate::content::compose;
use crate::models::{
    FollowUpCondition, FollowUpConfig, FollowUpExecution, FollowUpKind, FollowUpResponse,
    FollowUpStatus, ResponseKind,
};
use crate::store::FollowUpStore;
use crate::FollowUpError;

/// How many due rows one sweep picks up.
const SWEEP_LIMIT: usize = 200;

/// Schedules, dispatches and tracks delayed personalized follow-ups.
pub struct FollowUpScheduler {
    users: Arc<dyn UserStore>,
    traffic: Arc<dyn TrafficStore>,
    recommendations: Arc<dyn RecommendationProvider>,
    gateway: Arc<dyn MessagingGateway>,
    store: Arc<dyn FollowUpStore>,
}

impl FollowUpScheduler {
    pub fn new(
        users: Arc<dyn UserStore>,
        traffic: Arc<dyn TrafficStore>,
        recommendations: Arc<dyn RecommendationProvider>,
        gateway: Arc<dyn MessagingGateway>,
        store: Arc<dyn FollowUpStore>,
    ) -> Self {
        Self {
            users,
            traffic,
            recommendations,
            gateway,
            store,
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn FollowUpStore> {
        &self.store
    }

    pub(crate) fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    pub(crate) fn traffic(&self) -> &Arc<dyn TrafficStore> {
        &self.traffic
    }

    /// Create a follow-up in `Scheduled` state, `delay_hours` from now.
    /// Every condition must hold; a live duplicate of the same
    /// (user, trigger_event, kind) is rejected.
    pub async fn schedule_follow_up(
        &self,
        user_id: &str,
        config: FollowUpConfig,
    ) -> Result<FollowUpExecution, FollowUpError> {
        let profile = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| FollowUpError::UserNotFound(user_id.to_string()))?;

        self.check_conditions(&profile, &config.conditions).await?;

        let recommendations = if config.recommendation_count > 0 {
            self.recommendations
                .top_recommendations(user_id, config.recommendation_count)
                .await
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let content = compose(
            &profile,
            &config.template,
            config.offer.clone(),
            recommendations,
        );

        let now = Utc::now();
        let execution = FollowUpExecution {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            kind: config.kind.clone(),
            trigger_event: config.trigger_event.clone(),
            channel: config.channel,
            scheduled_at: now + Duration::hours(config.delay_hours),
            executed_at: None,
            status: FollowUpStatus::Scheduled,
            content,
            response: None,
            metadata: serde_json::json!({ "kind_tag": config.kind.tag() }),
        };

        if !self.store.insert_follow_up(&execution).await? {
            return Err(FollowUpError::Duplicate {
                user_id: user_id.to_string(),
                trigger_event: config.trigger_event,
            });
        }

        tracing::info!(
            user_id,
            kind = %config.kind.tag(),
            trigger = %execution.trigger_event,
            scheduled_at = %execution.scheduled_at,
            "follow-up scheduled"
        );

        Ok(execution)
    }

    async fn check_conditions(
        &self,
        profile: &UserProfile,
        conditions: &[FollowUpCondition],
    ) -> Result<(), FollowUpError> {
        for condition in conditions {
            match condition {
                FollowUpCondition::MinLifetimeValue { value } => {
                    let now = Utc::now();
                    let conversions = self
                        .traffic
                        .conversions(&profile.user_id, now - Duration::days(365), now)
                        .await?;
                    let ltv: f64 = conversions.iter().map(|c| c.order_value).sum();
                    if ltv < *value {
                        return Err(FollowUpError::ConditionsNotMet(format!(
                            "lifetime value {ltv:.0} below {value:.0}"
                        )));
                    }
                }
                FollowUpCondition::MaxDaysSinceActivity { days } => {
                    let now = Utc::now();
                    let clicks = self
                        .traffic
                        .clicks(&profile.user_id, now - Duration::days(*days), now)
                        .await?;
                    if clicks.is_empty() {
                        return Err(FollowUpError::ConditionsNotMet(format!(
                            "no activity within {days} days"
                        )));
                    }
                }
                FollowUpCondition::LifecycleStageIs { stage } => {
                    if profile.lifecycle_stage != *stage {
                        return Err(FollowUpError::ConditionsNotMet(format!(
                            "lifecycle stage is {:?}, wanted {stage:?}",
                            profile.lifecycle_stage
                        )));
                    }
                }
                FollowUpCondition::InSegment { segment } => {
                    if !profile.segments.iter().any(|s| s == segment) {
                        return Err(FollowUpError::ConditionsNotMet(format!(
                            "user not in segment {segment}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Periodic sweep: dispatch everything due. Idempotent by construction
    /// because only rows still in `Scheduled` are picked up, and dispatch
    /// immediately moves them out of it. Per-item failures are logged and
    /// never abort the sweep.
    pub async fn execute_scheduled_follow_ups(
        &self,
    ) -> Result<Vec<FollowUpExecution>, FollowUpError> {
        let now = Utc::now();
        let due = self.store.due_follow_ups(now, SWEEP_LIMIT).await?;
        let mut dispatched = Vec::new();

        for mut execution in due {
            match self
                .gateway
                .send(&execution.user_id, execution.channel, &execution.content)
                .await
            {
                Ok(_) => {
                    execution.advance(FollowUpStatus::Sent)?;
                    execution.executed_at = Some(now);
                    self.store.save_follow_up(&execution).await?;

                    tracing::info!(
                        follow_up_id = %execution.id,
                        user_id = %execution.user_id,
                        kind = %execution.kind.tag(),
                        body = %Masked(&execution.content.body),
                        "follow-up dispatched"
                    );
                    dispatched.push(execution);
                }
                Err(err) => {
                    tracing::warn!(
                        follow_up_id = %execution.id,
                        user_id = %execution.user_id,
                        error = %err,
                        "follow-up dispatch failed"
                    );
                    execution.advance(FollowUpStatus::Failed)?;
                    self.store.save_follow_up(&execution).await?;
                }
            }
        }

        Ok(dispatched)
    }

    /// Record a delivery/interaction response. A later response implies the
    /// earlier stages occurred, so the status jumps forward; a stale or
    /// out-of-order response never moves it back.
    pub async fn track_follow_up_response(
        &self,
        id: Uuid,
        kind: ResponseKind,
        note: Option<String>,
    ) -> Result<FollowUpExecution, FollowUpError> {
        let mut execution = self
            .store
            .get_follow_up(id)
            .await?
            .ok_or(FollowUpError::NotFound(id))?;

        let next = kind.status();
        if !execution.status.can_advance_to(next) {
            tracing::debug!(
                follow_up_id = %id,
                current = execution.status.as_str(),
                response = next.as_str(),
                "stale response ignored"
            );
            return Ok(execution);
        }

        execution.status = next;
        execution.response = Some(FollowUpResponse {
            kind,
            received_at: Utc::now(),
            note,
        });
        self.store.save_follow_up(&execution).await?;

        // Seasonal responses also feed the campaign's counters.
        if let FollowUpKind::Seasonal { season, campaign_id } = &execution.kind {
            if let Some(mut campaign) = self.store.active_campaign_for_season(*season).await? {
                if campaign.id == *campaign_id {
                    match next {
                        FollowUpStatus::Opened => campaign.performance.opened += 1,
                        FollowUpStatus::Clicked => campaign.performance.clicked += 1,
                        FollowUpStatus::Converted => campaign.performance.converted += 1,
                        _ => {}
                    }
                    self.store.save_campaign(&campaign).await?;
                }
            }
        }

        Ok(execution)
    }
}
