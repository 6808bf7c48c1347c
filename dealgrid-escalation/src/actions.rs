use std::sync::Arc;

use dealgrid_core::{
    message::render_template, AlertSeverity, AlertStore, Channel, DealOffer, MessageContent,
    MessagingGateway, RecommendationProvider, RetentionAlert, UserProfile, UserStore,
};

use crate::models::{EscalationAction, EscalationState};
use crate::EscalationError;

/// Executes the actions of one escalation level against the external
/// collaborators. Transport details stay behind the gateway trait.
pub struct ActionDispatcher {
    users: Arc<dyn UserStore>,
    gateway: Arc<dyn MessagingGateway>,
    recommendations: Arc<dyn RecommendationProvider>,
    alerts: Arc<dyn AlertStore>,
}

impl ActionDispatcher {
    pub fn new(
        users: Arc<dyn UserStore>,
        gateway: Arc<dyn MessagingGateway>,
        recommendations: Arc<dyn RecommendationProvider>,
        alerts: Arc<dyn AlertStore>,
    ) -> Self {
        Self {
            users,
            gateway,
            recommendations,
            alerts,
        }
    }

    /// Dispatch a single action. Failures are transient by policy: the
    /// engine leaves the level pending and retries on the next pass.
    pub async fn dispatch(
        &self,
        action: &EscalationAction,
        state: &mut EscalationState,
    ) -> Result<(), EscalationError> {
        let user_id = state.user_id.clone();
        let profile = self
            .users
            .get_user(&user_id)
            .await?
            .unwrap_or_else(|| UserProfile::new(&user_id, chrono::Utc::now()));

        match action {
            EscalationAction::IncreaseOffer {
                delta_percent,
                max_percent,
            } => {
                let new_discount =
                    (state.current_discount_percent + delta_percent).min(*max_percent);
                state.current_discount_percent = new_discount;

                let content = MessageContent::plain(render_template(
                    "{name}, your personal deal just got better",
                    &profile,
                ))
                .with_offer(DealOffer::discount("Loyalty boost", new_discount, 7));

                self.gateway
                    .send(&user_id, Channel::Telegram, &content)
                    .await
                    .map_err(|e| EscalationError::Dispatch(e.to_string()))?;

                tracing::info!(user_id = %user_id, discount = new_discount, "offer increased");
            }

            EscalationAction::ChangeChannel {
                channels,
                personalized,
                schedule_call,
            } => {
                let body = if *personalized {
                    render_template("{name}, we found deals you have been missing", &profile)
                } else {
                    "New deals are waiting for you".to_string()
                };
                let recommendations = if *personalized {
                    self.recommendations
                        .top_recommendations(&user_id, 3)
                        .await
                        .unwrap_or_default()
                } else {
                    Vec::new()
                };
                let content = MessageContent::plain(body).with_recommendations(recommendations);

                for channel in channels {
                    self.gateway
                        .send(&user_id, *channel, &content)
                        .await
                        .map_err(|e| EscalationError::Dispatch(e.to_string()))?;
                }

                if *schedule_call {
                    self.alerts
                        .insert_alert(&RetentionAlert::new(
                            &user_id,
                            AlertSeverity::Medium,
                            "Schedule retention call",
                            "Multi-channel outreach exhausted, a phone call is queued",
                        ))
                        .await?;
                }
            }

            EscalationAction::PersonalOutreach {
                assign_to,
                urgent_call,
            } => {
                let severity = if *urgent_call {
                    AlertSeverity::High
                } else {
                    AlertSeverity::Medium
                };
                self.alerts
                    .insert_alert(
                        &RetentionAlert::new(
                            &user_id,
                            severity,
                            "Personal outreach required",
                            format!(
                                "Automated retention steps did not land; assigned to {assign_to}"
                            ),
                        )
                        .assigned(assign_to.clone()),
                    )
                    .await?;

                tracing::info!(user_id = %user_id, assign_to = %assign_to, "personal outreach assigned");
            }

            EscalationAction::ExecutiveIntervention => {
                self.alerts
                    .insert_alert(&RetentionAlert::new(
                        &user_id,
                        AlertSeverity::High,
                        "Executive intervention",
                        "Top-tier account at imminent risk of churn",
                    ))
                    .await?;

                let content = MessageContent::plain(render_template(
                    "{name}, our team lead would like to make things right personally",
                    &profile,
                ));
                self.gateway
                    .send(&user_id, Channel::Email, &content)
                    .await
                    .map_err(|e| EscalationError::Dispatch(e.to_string()))?;
            }

            EscalationAction::EmergencyCampaign { discount_percent } => {
                let content = MessageContent::plain(render_template(
                    "{name}, a one-time offer before you go",
                    &profile,
                ))
                .with_offer(DealOffer::discount(
                    "Last-chance deal",
                    *discount_percent,
                    2,
                ));

                for channel in [Channel::Telegram, Channel::Push, Channel::Email] {
                    self.gateway
                        .send(&user_id, channel, &content)
                        .await
                        .map_err(|e| EscalationError::Dispatch(e.to_string()))?;
                }

                self.alerts
                    .insert_alert(&RetentionAlert::new(
                        &user_id,
                        AlertSeverity::High,
                        "Emergency campaign fired",
                        format!("Single-user emergency campaign at {discount_percent}% discount"),
                    ))
                    .await?;
            }
        }

        Ok(())
    }
}
