pub mod actions;
pub mod engine;
pub mod models;
pub mod plans;
pub mod store;

pub use actions::ActionDispatcher;
pub use engine::EscalationEngine;
pub use models::*;
pub use plans::default_plans;
pub use store::{EscalationStateStore, LockManager, SuccessProbe};

use dealgrid_core::BoxedError;

#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    #[error("store error: {0}")]
    Store(String),

    #[error("action dispatch failed: {0}")]
    Dispatch(String),

    #[error("concurrent update on escalation state for user {user_id} plan {plan_id}")]
    VersionConflict { user_id: String, plan_id: String },

    #[error("unknown escalation plan: {0}")]
    UnknownPlan(String),
}

impl From<BoxedError> for EscalationError {
    fn from(err: BoxedError) -> Self {
        EscalationError::Store(err.to_string())
    }
}
