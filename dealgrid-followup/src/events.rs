use chrono::{DateTime, Duration, Utc};

use dealgrid_core::{Channel, ConversionEvent};

use crate::content::{seasonal_offer, seasonal_template};
use crate::models::{
    FollowUpConfig, FollowUpExecution, FollowUpKind, PostPurchaseKind, RecommendationContext,
    Season, SeasonalCampaign,
};
use crate::scheduler::FollowUpScheduler;
use crate::FollowUpError;

/// Order value above which the thank-you goes out fast and personal.
const HIGH_VALUE_ORDER: f64 = 5000.0;

/// Order value that earns the extended nurture sequence.
const NURTURE_ORDER: f64 = 2000.0;

/// Pick the post-purchase subtype and its delay in hours.
pub fn post_purchase_plan(order_value: f64, first_purchase: bool) -> (PostPurchaseKind, i64) {
    if order_value > HIGH_VALUE_ORDER {
        (PostPurchaseKind::HighValueThankYou, 2)
    } else if first_purchase {
        (PostPurchaseKind::FirstPurchaseWelcome, 4)
    } else {
        (PostPurchaseKind::StandardThankYou, 24)
    }
}

fn post_purchase_template(subtype: PostPurchaseKind) -> &'static str {
    match subtype {
        PostPurchaseKind::HighValueThankYou => {
            "{name}, thank you for a great order — your VIP perks are active"
        }
        PostPurchaseKind::FirstPurchaseWelcome => {
            "{name}, welcome aboard! Here is how to get the most out of your deals"
        }
        PostPurchaseKind::StandardThankYou => "{name}, thanks for your order — enjoy!",
    }
}

impl FollowUpScheduler {
    /// Post-purchase entry point: a thank-you tuned to the order, plus the
    /// care/survey/replenishment sequence for larger orders.
    pub async fn send_post_purchase_follow_up(
        &self,
        conversion: &ConversionEvent,
    ) -> Result<(), FollowUpError> {
        let lifetime = self
            .traffic()
            .lifetime_conversion_count(&conversion.user_id)
            .await?;
        // The triggering conversion is already counted.
        let first_purchase = lifetime <= 1;

        let (subtype, delay_hours) = post_purchase_plan(conversion.order_value, first_purchase);
        let trigger_event = format!("conversion:{}", conversion.id);

        self.schedule_follow_up(
            &conversion.user_id,
            FollowUpConfig {
                kind: FollowUpKind::PostPurchase { subtype },
                trigger_event: trigger_event.clone(),
                delay_hours,
                channel: Channel::Telegram,
                template: post_purchase_template(subtype).to_string(),
                conditions: vec![],
                recommendation_count: 0,
                offer: None,
            },
        )
        .await?;

        if conversion.order_value > NURTURE_ORDER {
            let sequence: [(FollowUpKind, i64, &str); 3] = [
                (
                    FollowUpKind::CareTips,
                    72,
                    "{name}, a few tips to get the most from your purchase",
                ),
                (
                    FollowUpKind::SatisfactionSurvey,
                    168,
                    "{name}, how did we do? Two quick questions",
                ),
                (
                    FollowUpKind::ReplenishmentReminder,
                    720,
                    "{name}, running low? Reorder in one tap",
                ),
            ];

            for (kind, delay_hours, template) in sequence {
                let result = self
                    .schedule_follow_up(
                        &conversion.user_id,
                        FollowUpConfig {
                            kind,
                            trigger_event: trigger_event.clone(),
                            delay_hours,
                            channel: Channel::Telegram,
                            template: template.to_string(),
                            conditions: vec![],
                            recommendation_count: 0,
                            offer: None,
                        },
                    )
                    .await;

                if let Err(err) = result {
                    // A duplicate step of the sequence is fine on retries.
                    tracing::debug!(
                        user_id = %conversion.user_id,
                        error = %err,
                        "nurture step not scheduled"
                    );
                }
            }
        }

        Ok(())
    }

    /// Push the user's current top-5 deals, delayed depending on context.
    pub async fn send_product_recommendations(
        &self,
        user_id: &str,
        context: RecommendationContext,
    ) -> Result<FollowUpExecution, FollowUpError> {
        let delay_hours = match context {
            RecommendationContext::PostPurchase => 24,
            RecommendationContext::Browsing => 2,
        };

        self.schedule_follow_up(
            user_id,
            FollowUpConfig {
                kind: FollowUpKind::Recommendations { context },
                trigger_event: format!("recommendations:{context:?}"),
                delay_hours,
                channel: Channel::Telegram,
                template: "{name}, picked for you today".to_string(),
                conditions: vec![],
                recommendation_count: 5,
                offer: None,
            },
        )
        .await
    }

    /// Persist a campaign shell with zeroed performance counters.
    pub async fn create_seasonal_campaign(
        &self,
        season: Season,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        target_segments: Vec<String>,
    ) -> Result<SeasonalCampaign, FollowUpError> {
        let mut campaign = SeasonalCampaign::new(
            season,
            starts_at,
            ends_at,
            seasonal_template(season),
            seasonal_offer(season),
        );
        campaign.target_segments = target_segments;

        self.store().save_campaign(&campaign).await?;
        tracing::info!(season = season.as_str(), campaign_id = %campaign.id, "seasonal campaign created");
        Ok(campaign)
    }

    /// Fan one reminder out to every active (and, if configured, targeted)
    /// user. Per-user failures are logged and the fan-out continues.
    pub async fn send_seasonal_reminders(&self, season: Season) -> Result<u64, FollowUpError> {
        let mut campaign = match self.store().active_campaign_for_season(season).await? {
            Some(campaign) => campaign,
            None => {
                let now = Utc::now();
                self.create_seasonal_campaign(season, now, now + Duration::days(7), vec![])
                    .await?
            }
        };

        let user_ids = self.users().list_active_user_ids().await?;
        let mut scheduled = 0u64;

        for user_id in user_ids {
            if !campaign.target_segments.is_empty() {
                let Some(profile) = self.users().get_user(&user_id).await? else {
                    continue;
                };
                let targeted = profile
                    .segments
                    .iter()
                    .any(|s| campaign.target_segments.contains(s));
                if !targeted {
                    continue;
                }
            }

            let result = self
                .schedule_follow_up(
                    &user_id,
                    FollowUpConfig {
                        kind: FollowUpKind::Seasonal {
                            season,
                            campaign_id: campaign.id,
                        },
                        trigger_event: format!("campaign:{}", campaign.id),
                        delay_hours: 1,
                        channel: Channel::Telegram,
                        template: campaign.message.clone(),
                        conditions: vec![],
                        recommendation_count: 3,
                        offer: Some(campaign.offer.clone()),
                    },
                )
                .await;

            match result {
                Ok(_) => scheduled += 1,
                Err(err) => {
                    tracing::warn!(user_id = %user_id, error = %err, "seasonal reminder skipped");
                }
            }
        }

        campaign.performance.scheduled += scheduled;
        self.store().save_campaign(&campaign).await?;

        tracing::info!(
            season = season.as_str(),
            scheduled,
            "seasonal reminders fanned out"
        );
        Ok(scheduled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_value_orders_get_the_fast_personal_thank_you() {
        let (subtype, delay) = post_purchase_plan(8000.0, false);
        assert_eq!(subtype, PostPurchaseKind::HighValueThankYou);
        assert_eq!(delay, 2);
    }

    #[test]
    fn first_purchase_wins_over_standard() {
        let (subtype, delay) = post_purchase_plan(300.0, true);
        assert_eq!(subtype, PostPurchaseKind::FirstPurchaseWelcome);
        assert_eq!(delay, 4);
    }

    #[test]
    fn repeat_small_orders_get_the_standard_delay() {
        let (subtype, delay) = post_purchase_plan(300.0, false);
        assert_eq!(subtype, PostPurchaseKind::StandardThankYou);
        assert_eq!(delay, 24);
    }

    #[test]
    fn high_value_beats_first_purchase() {
        let (subtype, _) = post_purchase_plan(6000.0, true);
        assert_eq!(subtype, PostPurchaseKind::HighValueThankYou);
    }
}
