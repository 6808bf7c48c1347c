use tokio::time::{interval, Duration};
use tracing::{error, info};

use dealgrid_store::app_config::WorkerConfig;

use crate::state::AppState;

/// Spawn the three periodic retention jobs. Each loop is fire-and-forget:
/// a failed pass is logged and the next tick tries again. Plan-level
/// single-flight lives inside the engine (Redis lock), and the follow-up
/// sweep is idempotent by construction, so overlapping workers are safe.
pub fn start_retention_workers(state: AppState, config: WorkerConfig) {
    let escalation_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.escalation_interval_seconds));
        info!("Escalation trigger worker started");
        loop {
            ticker.tick().await;
            if let Err(e) = escalation_state.engine.monitor_triggers().await {
                error!("Escalation trigger pass failed: {}", e);
            }
        }
    });

    let check_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.success_check_interval_seconds));
        info!("Success-check worker started");
        loop {
            ticker.tick().await;
            if let Err(e) = check_state.engine.evaluate_due_success_checks().await {
                error!("Success-check pass failed: {}", e);
            }
        }
    });

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.followup_interval_seconds));
        info!("Follow-up sweep worker started");
        loop {
            ticker.tick().await;
            match state.scheduler.execute_scheduled_follow_ups().await {
                Ok(dispatched) if dispatched.is_empty() => {}
                Ok(dispatched) => info!("Follow-up sweep dispatched {} messages", dispatched.len()),
                Err(e) => error!("Follow-up sweep failed: {}", e),
            }
        }
    });
}
