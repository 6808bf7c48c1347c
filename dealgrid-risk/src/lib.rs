pub mod activity;
pub mod models;
pub mod monitor;
pub mod planner;
pub mod scorer;
pub mod store;

pub use activity::ActivityAggregator;
pub use models::*;
pub use monitor::ActivityMonitor;
pub use planner::generate_recommendations;
pub use scorer::RiskScorer;
pub use store::RiskStore;

use dealgrid_core::BoxedError;

#[derive(Debug, thiserror::Error)]
pub enum RiskError {
    #[error("no activity data for user {0}")]
    NoActivityData(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("invalid scoring config: {0}")]
    InvalidConfig(String),

    #[error("store error: {0}")]
    Store(String),
}

impl From<BoxedError> for RiskError {
    fn from(err: BoxedError) -> Self {
        RiskError::Store(err.to_string())
    }
}
