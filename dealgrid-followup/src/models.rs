use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dealgrid_core::{Channel, DealOffer, LifecycleStage, MessageContent};

use crate::FollowUpError;

/// Delivery lifecycle of one follow-up. Advancement is one-way:
/// Scheduled → Sent → Delivered → Opened → Clicked → Converted, with
/// Failed and Cancelled as terminal exits from any live state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpStatus {
    Scheduled,
    Sent,
    Delivered,
    Opened,
    Clicked,
    Converted,
    Failed,
    Cancelled,
}

impl FollowUpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FollowUpStatus::Scheduled => "scheduled",
            FollowUpStatus::Sent => "sent",
            FollowUpStatus::Delivered => "delivered",
            FollowUpStatus::Opened => "opened",
            FollowUpStatus::Clicked => "clicked",
            FollowUpStatus::Converted => "converted",
            FollowUpStatus::Failed => "failed",
            FollowUpStatus::Cancelled => "cancelled",
        }
    }

    fn ladder_rank(&self) -> Option<u8> {
        match self {
            FollowUpStatus::Scheduled => Some(0),
            FollowUpStatus::Sent => Some(1),
            FollowUpStatus::Delivered => Some(2),
            FollowUpStatus::Opened => Some(3),
            FollowUpStatus::Clicked => Some(4),
            FollowUpStatus::Converted => Some(5),
            FollowUpStatus::Failed | FollowUpStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FollowUpStatus::Converted | FollowUpStatus::Failed | FollowUpStatus::Cancelled
        )
    }

    /// Whether moving to `next` is a legal one-way advancement.
    pub fn can_advance_to(&self, next: FollowUpStatus) -> bool {
        if *self == next {
            return false;
        }
        if self.is_terminal() {
            return false;
        }
        match next {
            FollowUpStatus::Failed | FollowUpStatus::Cancelled => true,
            _ => match (self.ladder_rank(), next.ladder_rank()) {
                (Some(current), Some(next)) => next > current,
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PostPurchaseKind {
    HighValueThankYou,
    FirstPurchaseWelcome,
    StandardThankYou,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationContext {
    PostPurchase,
    Browsing,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
    BlackFriday,
    NewYear,
}

impl Season {
    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
            Season::Winter => "winter",
            Season::BlackFriday => "black_friday",
            Season::NewYear => "new_year",
        }
    }
}

/// What a follow-up is, with its typed payload. Dispatch sites match
/// exhaustively, so a new kind is a compile-time extension.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FollowUpKind {
    PostPurchase { subtype: PostPurchaseKind },
    CareTips,
    SatisfactionSurvey,
    ReplenishmentReminder,
    Recommendations { context: RecommendationContext },
    Seasonal { season: Season, campaign_id: Uuid },
}

impl FollowUpKind {
    /// Stable tag used in the (user, trigger_event, kind) idempotency key.
    pub fn tag(&self) -> String {
        match self {
            FollowUpKind::PostPurchase { subtype } => match subtype {
                PostPurchaseKind::HighValueThankYou => "post_purchase:high_value".to_string(),
                PostPurchaseKind::FirstPurchaseWelcome => "post_purchase:first".to_string(),
                PostPurchaseKind::StandardThankYou => "post_purchase:standard".to_string(),
            },
            FollowUpKind::CareTips => "care_tips".to_string(),
            FollowUpKind::SatisfactionSurvey => "satisfaction_survey".to_string(),
            FollowUpKind::ReplenishmentReminder => "replenishment_reminder".to_string(),
            FollowUpKind::Recommendations { context } => match context {
                RecommendationContext::PostPurchase => "recommendations:post_purchase".to_string(),
                RecommendationContext::Browsing => "recommendations:browsing".to_string(),
            },
            FollowUpKind::Seasonal { season, .. } => format!("seasonal:{}", season.as_str()),
        }
    }
}

/// Gate that must hold before a follow-up is scheduled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum FollowUpCondition {
    MinLifetimeValue { value: f64 },
    MaxDaysSinceActivity { days: i64 },
    LifecycleStageIs { stage: LifecycleStage },
    InSegment { segment: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpConfig {
    pub kind: FollowUpKind,
    pub trigger_event: String,
    pub delay_hours: i64,
    pub channel: Channel,
    pub template: String,
    pub conditions: Vec<FollowUpCondition>,
    /// How many ranked deals to inject into the content; 0 for none.
    pub recommendation_count: usize,
    pub offer: Option<DealOffer>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Delivered,
    Opened,
    Clicked,
    Converted,
    Failed,
}

impl ResponseKind {
    pub fn status(&self) -> FollowUpStatus {
        match self {
            ResponseKind::Delivered => FollowUpStatus::Delivered,
            ResponseKind::Opened => FollowUpStatus::Opened,
            ResponseKind::Clicked => FollowUpStatus::Clicked,
            ResponseKind::Converted => FollowUpStatus::Converted,
            ResponseKind::Failed => FollowUpStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpResponse {
    pub kind: ResponseKind,
    pub received_at: DateTime<Utc>,
    pub note: Option<String>,
}

/// One scheduled (and possibly dispatched) follow-up message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpExecution {
    pub id: Uuid,
    pub user_id: String,
    pub kind: FollowUpKind,
    pub trigger_event: String,
    pub channel: Channel,
    pub scheduled_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub status: FollowUpStatus,
    pub content: MessageContent,
    pub response: Option<FollowUpResponse>,
    pub metadata: serde_json::Value,
}

impl FollowUpExecution {
    /// Apply a one-way status advancement.
    pub fn advance(&mut self, next: FollowUpStatus) -> Result<(), FollowUpError> {
        if !self.status.can_advance_to(next) {
            return Err(FollowUpError::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignPerformance {
    pub scheduled: u64,
    pub sent: u64,
    pub opened: u64,
    pub clicked: u64,
    pub converted: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalCampaign {
    pub id: Uuid,
    pub season: Season,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub target_segments: Vec<String>,
    pub message: String,
    pub offer: DealOffer,
    pub performance: CampaignPerformance,
    pub is_active: bool,
}

impl SeasonalCampaign {
    pub fn new(
        season: Season,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        message: impl Into<String>,
        offer: DealOffer,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            season,
            starts_at,
            ends_at,
            target_segments: Vec::new(),
            message: message.into(),
            offer,
            performance: CampaignPerformance::default(),
            is_active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ladder_never_regresses() {
        assert!(FollowUpStatus::Scheduled.can_advance_to(FollowUpStatus::Sent));
        assert!(FollowUpStatus::Sent.can_advance_to(FollowUpStatus::Converted));
        assert!(!FollowUpStatus::Converted.can_advance_to(FollowUpStatus::Sent));
        assert!(!FollowUpStatus::Clicked.can_advance_to(FollowUpStatus::Opened));
        assert!(!FollowUpStatus::Sent.can_advance_to(FollowUpStatus::Sent));
    }

    #[test]
    fn failure_and_cancellation_are_terminal() {
        assert!(FollowUpStatus::Scheduled.can_advance_to(FollowUpStatus::Cancelled));
        assert!(FollowUpStatus::Delivered.can_advance_to(FollowUpStatus::Failed));
        assert!(!FollowUpStatus::Failed.can_advance_to(FollowUpStatus::Sent));
        assert!(!FollowUpStatus::Cancelled.can_advance_to(FollowUpStatus::Scheduled));
        assert!(!FollowUpStatus::Converted.can_advance_to(FollowUpStatus::Failed));
    }

    #[test]
    fn advance_rejects_illegal_moves() {
        let mut execution = FollowUpExecution {
            id: Uuid::new_v4(),
            user_id: "u-1".to_string(),
            kind: FollowUpKind::CareTips,
            trigger_event: "conversion:1".to_string(),
            channel: Channel::Telegram,
            scheduled_at: Utc::now(),
            executed_at: None,
            status: FollowUpStatus::Converted,
            content: MessageContent::plain("hi"),
            response: None,
            metadata: serde_json::json!({}),
        };

        let err = execution.advance(FollowUpStatus::Sent).unwrap_err();
        assert!(matches!(err, FollowUpError::InvalidTransition { .. }));
        assert_eq!(execution.status, FollowUpStatus::Converted);
    }

    #[test]
    fn kind_tags_distinguish_post_purchase_subtypes() {
        let high = FollowUpKind::PostPurchase {
            subtype: PostPurchaseKind::HighValueThankYou,
        };
        let standard = FollowUpKind::PostPurchase {
            subtype: PostPurchaseKind::StandardThankYou,
        };
        assert_ne!(high.tag(), standard.tag());
    }
}
