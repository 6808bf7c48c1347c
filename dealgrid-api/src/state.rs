use std::sync::Arc;

use tokio::sync::broadcast;

use dealgrid_escalation::EscalationEngine;
use dealgrid_followup::FollowUpScheduler;
use dealgrid_risk::{ActivityMonitor, RiskScorer, RiskStore};
use dealgrid_shared::RetentionEvent;
use dealgrid_store::RedisClient;

#[derive(Clone)]
pub struct AppState {
    pub scorer: Arc<RiskScorer>,
    pub monitor: Arc<ActivityMonitor>,
    pub scheduler: Arc<FollowUpScheduler>,
    pub engine: Arc<EscalationEngine>,
    pub risks: Arc<dyn RiskStore>,
    /// Absent in tests; rate limiting fails open without it.
    pub redis: Option<Arc<RedisClient>>,
    pub sse_tx: broadcast::Sender<RetentionEvent>,
}

impl AppState {
    /// Best-effort fan-out to SSE subscribers; nobody listening is fine.
    pub fn publish(&self, event: RetentionEvent) {
        let _ = self.sse_tx.send(event);
    }
}
