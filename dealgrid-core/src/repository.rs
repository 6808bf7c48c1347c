use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::alert::RetentionAlert;
use crate::deals::RecommendedDeal;
use crate::message::{Channel, DeliveryReceipt, MessageContent};
use crate::traffic::{ClickEvent, ConversionEvent};
use crate::user::UserProfile;

pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Access to bot user profiles.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, BoxedError>;

    /// Users considered active for campaign fan-out.
    async fn list_active_user_ids(&self) -> Result<Vec<String>, BoxedError>;
}

/// Access to raw click/conversion history.
#[async_trait]
pub trait TrafficStore: Send + Sync {
    async fn clicks(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ClickEvent>, BoxedError>;

    async fn conversions(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ConversionEvent>, BoxedError>;

    /// All-time conversion count, used for first-purchase detection.
    async fn lifetime_conversion_count(&self, user_id: &str) -> Result<u64, BoxedError>;
}

/// Ranked deal recommendations for a user.
#[async_trait]
pub trait RecommendationProvider: Send + Sync {
    async fn top_recommendations(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<RecommendedDeal>, BoxedError>;
}

/// Outbound message delivery. Transport details live behind this trait.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send(
        &self,
        user_id: &str,
        channel: Channel,
        content: &MessageContent,
    ) -> Result<DeliveryReceipt, BoxedError>;
}

/// Persistence for retention-team alerts.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn insert_alert(&self, alert: &RetentionAlert) -> Result<(), BoxedError>;
}
