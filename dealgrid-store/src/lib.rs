pub mod app_config;
pub mod database;
pub mod escalation_repo;
pub mod followup_repo;
pub mod outbox_repo;
pub mod redis_repo;
pub mod risk_repo;
pub mod traffic_repo;

pub use database::DbClient;
pub use escalation_repo::PostgresEscalationStore;
pub use followup_repo::PostgresFollowUpStore;
pub use outbox_repo::{OutboxGateway, PostgresRecommendationProvider};
pub use redis_repo::RedisClient;
pub use risk_repo::PostgresRiskStore;
pub use traffic_repo::{PostgresAlertStore, PostgresTrafficStore, PostgresUserStore};
