use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct RiskScoredEvent {
    pub user_id: String,
    pub score: u8,
    pub level: String,
    pub confidence: u8,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct AnomalyDetectedEvent {
    pub user_id: String,
    pub kind: String,
    pub severity: String,
    pub deviation: f64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct EscalationStepEvent {
    pub user_id: String,
    pub plan_id: String,
    pub level: u32,
    pub actions: Vec<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct FollowUpDispatchedEvent {
    pub follow_up_id: Uuid,
    pub user_id: String,
    pub kind: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct AlertRaisedEvent {
    pub alert_id: Uuid,
    pub user_id: String,
    pub severity: String,
    pub title: String,
    pub timestamp: i64,
}

/// Envelope broadcast on the API's event stream.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RetentionEvent {
    RiskScored(RiskScoredEvent),
    AnomalyDetected(AnomalyDetectedEvent),
    EscalationStep(EscalationStepEvent),
    FollowUpDispatched(FollowUpDispatchedEvent),
    AlertRaised(AlertRaisedEvent),
}
