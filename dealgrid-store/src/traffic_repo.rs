use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use dealgrid_core::{
    AlertStore, BoxedError, ClickEvent, ConversionEvent, LifecycleStage, RetentionAlert,
    TrafficStore, UserProfile, UserStore,
};

pub struct PostgresUserStore {
    pub pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: String,
    display_name: Option<String>,
    language: Option<String>,
    segments: Vec<String>,
    lifecycle_stage: String,
    created_at: DateTime<Utc>,
}

fn parse_stage(raw: &str) -> LifecycleStage {
    match raw {
        "active" => LifecycleStage::Active,
        "established" => LifecycleStage::Established,
        "dormant" => LifecycleStage::Dormant,
        _ => LifecycleStage::New,
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, BoxedError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, display_name, language, segments, lifecycle_stage, created_at
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| UserProfile {
            user_id: r.user_id,
            display_name: r.display_name,
            language: r.language,
            segments: r.segments,
            lifecycle_stage: parse_stage(&r.lifecycle_stage),
            created_at: r.created_at,
        }))
    }

    async fn list_active_user_ids(&self) -> Result<Vec<String>, BoxedError> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT user_id FROM users WHERE is_active",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}

pub struct PostgresTrafficStore {
    pub pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct ClickRow {
    id: Uuid,
    user_id: String,
    deal_id: Option<Uuid>,
    source: String,
    device: Option<String>,
    location: Option<String>,
    occurred_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ConversionRow {
    id: Uuid,
    user_id: String,
    deal_id: Option<Uuid>,
    order_value: f64,
    currency: String,
    occurred_at: DateTime<Utc>,
}

#[async_trait]
impl TrafficStore for PostgresTrafficStore {
    async fn clicks(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ClickEvent>, BoxedError> {
        let rows = sqlx::query_as::<_, ClickRow>(
            r#"
            SELECT id, user_id, deal_id, source, device, location, occurred_at
            FROM clicks
            WHERE user_id = $1 AND occurred_at >= $2 AND occurred_at <= $3
            ORDER BY occurred_at
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ClickEvent {
                id: r.id,
                user_id: r.user_id,
                deal_id: r.deal_id,
                source: r.source,
                device: r.device,
                location: r.location,
                occurred_at: r.occurred_at,
            })
            .collect())
    }

    async fn conversions(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ConversionEvent>, BoxedError> {
        let rows = sqlx::query_as::<_, ConversionRow>(
            r#"
            SELECT id, user_id, deal_id, order_value, currency, occurred_at
            FROM conversions
            WHERE user_id = $1 AND occurred_at >= $2 AND occurred_at <= $3
            ORDER BY occurred_at
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ConversionEvent {
                id: r.id,
                user_id: r.user_id,
                deal_id: r.deal_id,
                order_value: r.order_value,
                currency: r.currency,
                occurred_at: r.occurred_at,
            })
            .collect())
    }

    async fn lifetime_conversion_count(&self, user_id: &str) -> Result<u64, BoxedError> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM conversions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0 as u64)
    }
}

pub struct PostgresAlertStore {
    pub pool: PgPool,
}

#[async_trait]
impl AlertStore for PostgresAlertStore {
    async fn insert_alert(&self, alert: &RetentionAlert) -> Result<(), BoxedError> {
        sqlx::query(
            r#"
            INSERT INTO retention_alerts
                (id, user_id, severity, title, message, assigned_to, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(alert.id)
        .bind(&alert.user_id)
        .bind(match alert.severity {
            dealgrid_core::AlertSeverity::Low => "low",
            dealgrid_core::AlertSeverity::Medium => "medium",
            dealgrid_core::AlertSeverity::High => "high",
        })
        .bind(&alert.title)
        .bind(&alert.message)
        .bind(&alert.assigned_to)
        .bind(alert.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
