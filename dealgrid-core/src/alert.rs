use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
}

/// An alert for the retention team, raised when automated measures need a
/// human in the loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionAlert {
    pub id: Uuid,
    pub user_id: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RetentionAlert {
    pub fn new(
        user_id: impl Into<String>,
        severity: AlertSeverity,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            severity,
            title: title.into(),
            message: message.into(),
            assigned_to: None,
            created_at: Utc::now(),
        }
    }

    pub fn assigned(mut self, agent: impl Into<String>) -> Self {
        self.assigned_to = Some(agent.into());
        self
    }
}
