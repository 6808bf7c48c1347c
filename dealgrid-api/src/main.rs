use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dealgrid_api::{app, probe::LiveSuccessProbe, state::AppState, worker};
use dealgrid_escalation::{default_plans, ActionDispatcher, EscalationEngine};
use dealgrid_followup::FollowUpScheduler;
use dealgrid_risk::{ActivityAggregator, ActivityMonitor, RiskScorer};
use dealgrid_store::{
    DbClient, OutboxGateway, PostgresAlertStore, PostgresEscalationStore, PostgresFollowUpStore,
    PostgresRecommendationProvider, PostgresRiskStore, PostgresTrafficStore, PostgresUserStore,
    RedisClient,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dealgrid_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = dealgrid_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Dealgrid retention API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let redis = RedisClient::new(&config.redis.url)
        .await
        .expect("Failed to connect to Redis");
    let redis = Arc::new(redis);

    let pool = db.pool.clone();
    let users = Arc::new(PostgresUserStore { pool: pool.clone() });
    let traffic = Arc::new(PostgresTrafficStore { pool: pool.clone() });
    let risks = Arc::new(PostgresRiskStore { pool: pool.clone() });
    let states = Arc::new(PostgresEscalationStore { pool: pool.clone() });
    let followups = Arc::new(PostgresFollowUpStore { pool: pool.clone() });
    let alerts = Arc::new(PostgresAlertStore { pool: pool.clone() });
    let gateway = Arc::new(OutboxGateway { pool: pool.clone() });
    let recommendations = Arc::new(PostgresRecommendationProvider { pool });

    let risk_config = config.scoring.to_risk_config();

    let scorer = RiskScorer::new(
        users.clone(),
        ActivityAggregator::new(traffic.clone()),
        risks.clone(),
        risk_config.clone(),
    )
    .expect("Invalid scoring config");

    let monitor = ActivityMonitor::new(traffic.clone(), risks.clone(), risk_config.clone());

    let scheduler = FollowUpScheduler::new(
        users.clone(),
        traffic.clone(),
        recommendations.clone(),
        gateway.clone(),
        followups.clone(),
    );

    let probe = LiveSuccessProbe::new(
        ActivityAggregator::new(traffic.clone()),
        risk_config,
        followups.clone(),
        risks.clone(),
    );

    let dispatcher = ActionDispatcher::new(
        users.clone(),
        gateway.clone(),
        recommendations.clone(),
        alerts.clone(),
    );

    let engine = EscalationEngine::new(
        default_plans(),
        risks.clone(),
        states,
        redis.clone(),
        Arc::new(probe),
        dispatcher,
    );

    let (sse_tx, _) = tokio::sync::broadcast::channel(100);

    let app_state = AppState {
        scorer: Arc::new(scorer),
        monitor: Arc::new(monitor),
        scheduler: Arc::new(scheduler),
        engine: Arc::new(engine),
        risks,
        redis: Some(redis),
        sse_tx,
    };

    worker::start_retention_workers(app_state.clone(), config.workers.clone());

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
