use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a user sits in their lifecycle with the bot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    New,
    Active,
    Established,
    Dormant,
}

/// Profile data for a bot user, as served by the user store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: Option<String>,
    pub language: Option<String>,
    pub segments: Vec<String>,
    pub lifecycle_stage: LifecycleStage,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
            language: None,
            segments: Vec::new(),
            lifecycle_stage: LifecycleStage::New,
            created_at,
        }
    }

    /// Name used in personalized copy; falls back to a neutral greeting.
    pub fn salutation(&self) -> &str {
        self.display_name.as_deref().unwrap_or("there")
    }

    pub fn days_since_registration(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days().max(0)
    }
}
