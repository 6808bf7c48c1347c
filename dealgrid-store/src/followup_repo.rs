use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use dealgrid_core::BoxedError;
use dealgrid_followup::{FollowUpExecution, FollowUpStore, Season, SeasonalCampaign};

/// Postgres-backed follow-up persistence. The partial unique index
/// `uniq_follow_ups_live` enforces the (user, trigger, kind) idempotency
/// key for rows still in `scheduled`.
pub struct PostgresFollowUpStore {
    pub pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct PayloadRow {
    payload: serde_json::Value,
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}

#[async_trait]
impl FollowUpStore for PostgresFollowUpStore {
    async fn insert_follow_up(&self, execution: &FollowUpExecution) -> Result<bool, BoxedError> {
        let result = sqlx::query(
            r#"
            INSERT INTO follow_ups
                (id, user_id, trigger_event, kind_tag, status, scheduled_at, executed_at, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(execution.id)
        .bind(&execution.user_id)
        .bind(&execution.trigger_event)
        .bind(execution.kind.tag())
        .bind(execution.status.as_str())
        .bind(execution.scheduled_at)
        .bind(execution.executed_at)
        .bind(serde_json::to_value(execution)?)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) if is_unique_violation(&err) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn get_follow_up(&self, id: Uuid) -> Result<Option<FollowUpExecution>, BoxedError> {
        let row = sqlx::query_as::<_, PayloadRow>(
            "SELECT payload FROM follow_ups WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| serde_json::from_value(r.payload))
            .transpose()
            .map_err(Into::into)
    }

    async fn due_follow_ups(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FollowUpExecution>, BoxedError> {
        let rows = sqlx::query_as::<_, PayloadRow>(
            r#"
            SELECT payload FROM follow_ups
            WHERE status = 'scheduled' AND scheduled_at <= $1
            ORDER BY scheduled_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| serde_json::from_value(r.payload).map_err(Into::into))
            .collect()
    }

    async fn save_follow_up(&self, execution: &FollowUpExecution) -> Result<(), BoxedError> {
        sqlx::query(
            r#"
            UPDATE follow_ups
            SET status = $2,
                executed_at = $3,
                responded_at = $4,
                payload = $5
            WHERE id = $1
            "#,
        )
        .bind(execution.id)
        .bind(execution.status.as_str())
        .bind(execution.executed_at)
        .bind(execution.response.as_ref().map(|r| r.received_at))
        .bind(serde_json::to_value(execution)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn response_count_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, BoxedError> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT COUNT(*) FROM follow_ups
            WHERE user_id = $1 AND responded_at >= $2
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0 as u64)
    }

    async fn save_campaign(&self, campaign: &SeasonalCampaign) -> Result<(), BoxedError> {
        sqlx::query(
            r#"
            INSERT INTO seasonal_campaigns (id, season, is_active, payload)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET season = EXCLUDED.season,
                is_active = EXCLUDED.is_active,
                payload = EXCLUDED.payload
            "#,
        )
        .bind(campaign.id)
        .bind(campaign.season.as_str())
        .bind(campaign.is_active)
        .bind(serde_json::to_value(campaign)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn active_campaign_for_season(
        &self,
        season: Season,
    ) -> Result<Option<SeasonalCampaign>, BoxedError> {
        let row = sqlx::query_as::<_, PayloadRow>(
            r#"
            SELECT payload FROM seasonal_campaigns
            WHERE season = $1 AND is_active
            LIMIT 1
            "#,
        )
        .bind(season.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| serde_json::from_value(r.payload))
            .transpose()
            .map_err(Into::into)
    }
}
