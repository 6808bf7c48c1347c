use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use dealgrid_core::BoxedError;

use crate::models::{EscalationState, SuccessCheck};

/// Persistence for per-(user, plan) escalation state and the deferred
/// success checks.
#[async_trait]
pub trait EscalationStateStore: Send + Sync {
    async fn load_state(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> Result<Option<EscalationState>, BoxedError>;

    /// Compare-and-swap save: persists `state` (with `state.version`
    /// already incremented) only when the stored version still equals
    /// `expected_version`. Returns false on conflict.
    async fn save_state(
        &self,
        state: &EscalationState,
        expected_version: i64,
    ) -> Result<bool, BoxedError>;

    async fn schedule_check(&self, check: &SuccessCheck) -> Result<(), BoxedError>;

    /// True while a check for this pair is still waiting to be evaluated.
    async fn has_pending_check(&self, user_id: &str, plan_id: &str) -> Result<bool, BoxedError>;

    async fn due_checks(&self, now: DateTime<Utc>) -> Result<Vec<SuccessCheck>, BoxedError>;

    async fn complete_check(&self, check_id: Uuid) -> Result<(), BoxedError>;
}

/// Mutual exclusion for periodic passes; backed by Redis SET NX EX in
/// production.
#[async_trait]
pub trait LockManager: Send + Sync {
    async fn try_acquire(&self, key: &str, ttl_seconds: u64) -> Result<bool, BoxedError>;

    async fn release(&self, key: &str) -> Result<(), BoxedError>;
}

/// Measurement seam for success criteria. Engagement comes from the live
/// activity aggregate, responses and reactivation from follow-up history;
/// the API crate wires the composite implementation.
#[async_trait]
pub trait SuccessProbe: Send + Sync {
    async fn engagement_score(&self, user_id: &str) -> Result<f64, BoxedError>;

    async fn response_count(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, BoxedError>;

    async fn reactivated(&self, user_id: &str, since: DateTime<Utc>) -> Result<bool, BoxedError>;
}
