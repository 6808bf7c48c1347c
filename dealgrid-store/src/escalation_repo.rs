use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use dealgrid_core::BoxedError;
use dealgrid_escalation::{EscalationState, EscalationStateStore, SuccessCheck};

/// Postgres-backed escalation state with compare-and-swap writes. The
/// version column is the optimistic guard: a save against a stale version
/// touches zero rows and the caller treats the pass as already taken.
pub struct PostgresEscalationStore {
    pub pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct PayloadRow {
    payload: serde_json::Value,
}

#[async_trait]
impl EscalationStateStore for PostgresEscalationStore {
    async fn load_state(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> Result<Option<EscalationState>, BoxedError> {
        let row = sqlx::query_as::<_, PayloadRow>(
            r#"
            SELECT payload FROM escalation_states
            WHERE user_id = $1 AND plan_id = $2
            "#,
        )
        .bind(user_id)
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| serde_json::from_value(r.payload))
            .transpose()
            .map_err(Into::into)
    }

    async fn save_state(
        &self,
        state: &EscalationState,
        expected_version: i64,
    ) -> Result<bool, BoxedError> {
        let payload = serde_json::to_value(state)?;

        if expected_version == 0 {
            // First write for this pair; a concurrent insert loses the race
            // and reports a conflict.
            let result = sqlx::query(
                r#"
                INSERT INTO escalation_states (user_id, plan_id, version, payload)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (user_id, plan_id) DO NOTHING
                "#,
            )
            .bind(&state.user_id)
            .bind(&state.plan_id)
            .bind(state.version)
            .bind(&payload)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                return Ok(true);
            }
            // The row exists already; fall through to the guarded update so
            // a legal re-save of version 0 still works.
        }

        let result = sqlx::query(
            r#"
            UPDATE escalation_states
            SET version = $3, payload = $4
            WHERE user_id = $1 AND plan_id = $2 AND version = $5
            "#,
        )
        .bind(&state.user_id)
        .bind(&state.plan_id)
        .bind(state.version)
        .bind(&payload)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn schedule_check(&self, check: &SuccessCheck) -> Result<(), BoxedError> {
        sqlx::query(
            r#"
            INSERT INTO success_checks (id, user_id, plan_id, level, due_at, payload)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(check.id)
        .bind(&check.user_id)
        .bind(&check.plan_id)
        .bind(check.level as i32)
        .bind(check.due_at)
        .bind(serde_json::to_value(check)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn has_pending_check(&self, user_id: &str, plan_id: &str) -> Result<bool, BoxedError> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT COUNT(*) FROM success_checks
            WHERE user_id = $1 AND plan_id = $2
            "#,
        )
        .bind(user_id)
        .bind(plan_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0 > 0)
    }

    async fn due_checks(&self, now: DateTime<Utc>) -> Result<Vec<SuccessCheck>, BoxedError> {
        let rows = sqlx::query_as::<_, PayloadRow>(
            r#"
            SELECT payload FROM success_checks
            WHERE due_at <= $1
            ORDER BY due_at
            LIMIT 200
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| serde_json::from_value(r.payload).map_err(Into::into))
            .collect()
    }

    async fn complete_check(&self, check_id: Uuid) -> Result<(), BoxedError> {
        sqlx::query("DELETE FROM success_checks WHERE id = $1")
            .bind(check_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
