use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use dealgrid_core::BoxedError;

use crate::models::{FollowUpExecution, Season, SeasonalCampaign};

/// Persistence for follow-up executions and seasonal campaigns.
#[async_trait]
pub trait FollowUpStore: Send + Sync {
    /// Insert a new execution. Returns false when a still-scheduled row
    /// with the same (user_id, trigger_event, kind tag) already exists —
    /// the idempotency guard against retried scheduling calls.
    async fn insert_follow_up(&self, execution: &FollowUpExecution) -> Result<bool, BoxedError>;

    async fn get_follow_up(&self, id: Uuid) -> Result<Option<FollowUpExecution>, BoxedError>;

    /// Rows still in `Scheduled` whose time has come.
    async fn due_follow_ups(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FollowUpExecution>, BoxedError>;

    async fn save_follow_up(&self, execution: &FollowUpExecution) -> Result<(), BoxedError>;

    /// Responses recorded since `since`, feeding engagement measurement.
    async fn response_count_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, BoxedError>;

    async fn save_campaign(&self, campaign: &SeasonalCampaign) -> Result<(), BoxedError>;

    async fn active_campaign_for_season(
        &self,
        season: Season,
    ) -> Result<Option<SeasonalCampaign>, BoxedError>;
}
