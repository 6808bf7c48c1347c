use async_trait::async_trait;
use chrono::{DateTime, Utc};

use dealgrid_core::BoxedError;

use crate::models::{ActivityMonitoring, ChurnRisk, RiskLevel, Severity};

/// Persistence for churn-risk history and monitoring snapshots.
///
/// Risk history is append-only: `append_churn_risk` never overwrites a
/// prior record, so trend comparisons can always read the last two runs.
#[async_trait]
pub trait RiskStore: Send + Sync {
    async fn append_churn_risk(&self, risk: &ChurnRisk) -> Result<(), BoxedError>;

    async fn latest_churn_risk(&self, user_id: &str) -> Result<Option<ChurnRisk>, BoxedError>;

    /// Most recent runs first.
    async fn recent_churn_risks(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ChurnRisk>, BoxedError>;

    /// Latest risk per user at or above `min_level`, highest scores first.
    async fn high_risk_users(
        &self,
        min_level: RiskLevel,
        limit: usize,
    ) -> Result<Vec<ChurnRisk>, BoxedError>;

    async fn save_monitoring(&self, snapshot: &ActivityMonitoring) -> Result<(), BoxedError>;

    async fn latest_monitoring(
        &self,
        user_id: &str,
    ) -> Result<Option<ActivityMonitoring>, BoxedError>;

    /// Users whose latest snapshot carries an anomaly at or above
    /// `min_severity`, detected since `since`.
    async fn users_with_recent_anomaly(
        &self,
        min_severity: Severity,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>, BoxedError>;
}
