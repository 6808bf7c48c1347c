use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single deal click recorded by the traffic pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickEvent {
    pub id: Uuid,
    pub user_id: String,
    pub deal_id: Option<Uuid>,
    /// Traffic source, e.g. "telegram", "webapp", "push".
    pub source: String,
    pub device: Option<String>,
    pub location: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ClickEvent {
    pub fn new(user_id: impl Into<String>, source: impl Into<String>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            deal_id: None,
            source: source.into(),
            device: None,
            location: None,
            occurred_at,
        }
    }
}

/// A confirmed purchase attributed to a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionEvent {
    pub id: Uuid,
    pub user_id: String,
    pub deal_id: Option<Uuid>,
    pub order_value: f64,
    pub currency: String,
    pub occurred_at: DateTime<Utc>,
}

impl ConversionEvent {
    pub fn new(user_id: impl Into<String>, order_value: f64, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            deal_id: None,
            order_value,
            currency: "EUR".to_string(),
            occurred_at,
        }
    }
}
