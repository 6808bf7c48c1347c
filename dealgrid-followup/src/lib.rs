pub mod content;
pub mod events;
pub mod models;
pub mod scheduler;
pub mod store;

pub use models::*;
pub use scheduler::FollowUpScheduler;
pub use store::FollowUpStore;

use dealgrid_core::BoxedError;

#[derive(Debug, thiserror::Error)]
pub enum FollowUpError {
    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("conditions not met: {0}")]
    ConditionsNotMet(String),

    #[error("follow-up already scheduled for user {user_id} on {trigger_event}")]
    Duplicate {
        user_id: String,
        trigger_event: String,
    },

    #[error("follow-up not found: {0}")]
    NotFound(uuid::Uuid),

    #[error("status cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("store error: {0}")]
    Store(String),

    #[error("gateway error: {0}")]
    Gateway(String),
}

impl From<BoxedError> for FollowUpError {
    fn from(err: BoxedError) -> Self {
        FollowUpError::Store(err.to_string())
    }
}
