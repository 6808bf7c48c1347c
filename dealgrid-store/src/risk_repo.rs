use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use dealgrid_core::BoxedError;
use dealgrid_risk::{ActivityMonitoring, ChurnRisk, RiskLevel, RiskStore, Severity};

/// Postgres-backed risk history. Records are stored as a JSONB payload
/// next to the columns the queries filter on.
pub struct PostgresRiskStore {
    pub pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct PayloadRow {
    payload: serde_json::Value,
}

#[derive(sqlx::FromRow)]
struct UserIdRow {
    user_id: String,
}

fn levels_at_or_above(min_level: RiskLevel) -> Vec<&'static str> {
    [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ]
    .into_iter()
    .filter(|level| *level >= min_level)
    .map(|level| level.as_str())
    .collect()
}

fn severities_at_or_above(min_severity: Severity) -> Vec<&'static str> {
    let all = [
        (Severity::Low, "low"),
        (Severity::Medium, "medium"),
        (Severity::High, "high"),
    ];
    all.into_iter()
        .filter(|(severity, _)| *severity >= min_severity)
        .map(|(_, name)| name)
        .collect()
}

#[async_trait]
impl RiskStore for PostgresRiskStore {
    async fn append_churn_risk(&self, risk: &ChurnRisk) -> Result<(), BoxedError> {
        sqlx::query(
            r#"
            INSERT INTO churn_risks (id, user_id, score, level, calculated_at, payload)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(risk.id)
        .bind(&risk.user_id)
        .bind(risk.score as i16)
        .bind(risk.level.as_str())
        .bind(risk.calculated_at)
        .bind(serde_json::to_value(risk)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_churn_risk(&self, user_id: &str) -> Result<Option<ChurnRisk>, BoxedError> {
        let row = sqlx::query_as::<_, PayloadRow>(
            r#"
            SELECT payload FROM churn_risks
            WHERE user_id = $1
            ORDER BY calculated_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| serde_json::from_value(r.payload))
            .transpose()
            .map_err(Into::into)
    }

    async fn recent_churn_risks(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ChurnRisk>, BoxedError> {
        let rows = sqlx::query_as::<_, PayloadRow>(
            r#"
            SELECT payload FROM churn_risks
            WHERE user_id = $1
            ORDER BY calculated_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| serde_json::from_value(r.payload).map_err(Into::into))
            .collect()
    }

    async fn high_risk_users(
        &self,
        min_level: RiskLevel,
        limit: usize,
    ) -> Result<Vec<ChurnRisk>, BoxedError> {
        // Latest record per user, then the level/score cut.
        let rows = sqlx::query_as::<_, PayloadRow>(
            r#"
            SELECT payload FROM (
                SELECT DISTINCT ON (user_id) payload, level, score
                FROM churn_risks
                ORDER BY user_id, calculated_at DESC
            ) latest
            WHERE level = ANY($1)
            ORDER BY score DESC
            LIMIT $2
            "#,
        )
        .bind(levels_at_or_above(min_level))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| serde_json::from_value(r.payload).map_err(Into::into))
            .collect()
    }

    async fn save_monitoring(&self, snapshot: &ActivityMonitoring) -> Result<(), BoxedError> {
        let max_severity = snapshot
            .anomalies
            .iter()
            .map(|a| a.severity)
            .max()
            .map(|severity| match severity {
                Severity::Low => "low",
                Severity::Medium => "medium",
                Severity::High => "high",
            });

        sqlx::query(
            r#"
            INSERT INTO activity_monitoring
                (id, user_id, health_score, status, max_anomaly_severity, last_updated, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(snapshot.id)
        .bind(&snapshot.user_id)
        .bind(snapshot.health_score as i16)
        .bind(snapshot.status.as_str())
        .bind(max_severity)
        .bind(snapshot.last_updated)
        .bind(serde_json::to_value(snapshot)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_monitoring(
        &self,
        user_id: &str,
    ) -> Result<Option<ActivityMonitoring>, BoxedError> {
        let row = sqlx::query_as::<_, PayloadRow>(
            r#"
            SELECT payload FROM activity_monitoring
            WHERE user_id = $1
            ORDER BY last_updated DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| serde_json::from_value(r.payload))
            .transpose()
            .map_err(Into::into)
    }

    async fn users_with_recent_anomaly(
        &self,
        min_severity: Severity,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>, BoxedError> {
        let rows = sqlx::query_as::<_, UserIdRow>(
            r#"
            SELECT user_id FROM (
                SELECT DISTINCT ON (user_id) user_id, max_anomaly_severity, last_updated
                FROM activity_monitoring
                ORDER BY user_id, last_updated DESC
            ) latest
            WHERE max_anomaly_severity = ANY($1)
              AND last_updated >= $2
            "#,
        )
        .bind(severities_at_or_above(min_severity))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.user_id).collect())
    }
}
