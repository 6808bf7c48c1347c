use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use dealgrid_core::ConversionEvent;
use dealgrid_followup::{
    FollowUpConfig, FollowUpError, FollowUpExecution, RecommendationContext, ResponseKind, Season,
    SeasonalCampaign,
};
use dealgrid_risk::{
    ActivityMonitoring, BatchScoreOutcome, ChurnRisk, ChurnRiskConfig, RiskError, RiskLevel,
};
use dealgrid_shared::models::events::{
    AnomalyDetectedEvent, FollowUpDispatchedEvent, RiskScoredEvent,
};
use dealgrid_shared::RetentionEvent;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/retention/risk/{user_id}", post(calculate_risk))
        .route("/v1/retention/risk/batch", post(batch_calculate_risk))
        .route("/v1/retention/risk/high", get(high_risk_users))
        .route("/v1/retention/monitor/{user_id}", post(monitor_activity))
        .route("/v1/retention/followups", post(schedule_follow_up))
        .route("/v1/retention/followups/run", post(run_follow_up_sweep))
        .route(
            "/v1/retention/followups/post-purchase",
            post(post_purchase_follow_up),
        )
        .route(
            "/v1/retention/followups/{id}/response",
            post(track_response),
        )
        .route(
            "/v1/retention/recommendations/{user_id}",
            post(push_recommendations),
        )
        .route("/v1/retention/escalations/run", post(run_escalation_pass))
        .route("/v1/retention/campaigns/seasonal", post(create_campaign))
        .route(
            "/v1/retention/campaigns/seasonal/{season}/send",
            post(send_seasonal),
        )
        .route("/v1/retention/events", get(event_stream))
}

fn map_risk_error(err: RiskError) -> AppError {
    match err {
        RiskError::NoActivityData(user) => {
            AppError::ValidationError(format!("user {user} has no activity yet"))
        }
        RiskError::UserNotFound(user) => AppError::NotFoundError(format!("user {user} not found")),
        RiskError::InvalidConfig(msg) => AppError::ValidationError(msg),
        RiskError::Store(msg) => AppError::Anyhow(anyhow::anyhow!(msg)),
    }
}

fn map_follow_up_error(err: FollowUpError) -> AppError {
    match err {
        FollowUpError::UserNotFound(user) => {
            AppError::NotFoundError(format!("user {user} not found"))
        }
        FollowUpError::NotFound(id) => AppError::NotFoundError(format!("follow-up {id} not found")),
        FollowUpError::ConditionsNotMet(msg) => AppError::ValidationError(msg),
        FollowUpError::Duplicate { .. } => AppError::ConflictError(err.to_string()),
        FollowUpError::InvalidTransition { .. } => AppError::ConflictError(err.to_string()),
        other => AppError::Anyhow(anyhow::anyhow!(other.to_string())),
    }
}

// ── Risk ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct CalculateRiskRequest {
    overrides: Option<ChurnRiskConfig>,
}

async fn calculate_risk(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: Option<Json<CalculateRiskRequest>>,
) -> Result<Json<ChurnRisk>, AppError> {
    let overrides = body.and_then(|Json(b)| b.overrides);
    let risk = state
        .scorer
        .calculate_churn_risk(&user_id, overrides.as_ref())
        .await
        .map_err(map_risk_error)?;

    state.publish(RetentionEvent::RiskScored(RiskScoredEvent {
        user_id: risk.user_id.clone(),
        score: risk.score,
        level: risk.level.as_str().to_string(),
        confidence: risk.confidence,
        timestamp: risk.calculated_at.timestamp(),
    }));

    Ok(Json(risk))
}

#[derive(Debug, Deserialize)]
struct BatchRequest {
    user_ids: Vec<String>,
    overrides: Option<ChurnRiskConfig>,
}

async fn batch_calculate_risk(
    State(state): State<AppState>,
    Json(body): Json<BatchRequest>,
) -> Result<Json<BatchScoreOutcome>, AppError> {
    let outcome = state
        .scorer
        .batch_calculate_churn_risk(&body.user_ids, body.overrides.as_ref())
        .await;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct HighRiskQuery {
    level: Option<RiskLevel>,
    limit: Option<usize>,
}

async fn high_risk_users(
    State(state): State<AppState>,
    Query(query): Query<HighRiskQuery>,
) -> Result<Json<Vec<ChurnRisk>>, AppError> {
    let risks = state
        .risks
        .high_risk_users(
            query.level.unwrap_or(RiskLevel::High),
            query.limit.unwrap_or(20),
        )
        .await
        .map_err(|e| AppError::Anyhow(anyhow::anyhow!(e.to_string())))?;
    Ok(Json(risks))
}

// ── Monitoring ───────────────────────────────────────────────────────────────

async fn monitor_activity(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ActivityMonitoring>, AppError> {
    let snapshot = state
        .monitor
        .monitor_user_activity(&user_id)
        .await
        .map_err(map_risk_error)?;

    for anomaly in &snapshot.anomalies {
        state.publish(RetentionEvent::AnomalyDetected(AnomalyDetectedEvent {
            user_id: snapshot.user_id.clone(),
            kind: format!("{:?}", anomaly.kind),
            severity: format!("{:?}", anomaly.severity),
            deviation: anomaly.deviation,
            timestamp: anomaly.detected_at.timestamp(),
        }));
    }

    Ok(Json(snapshot))
}

// ── Follow-ups ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ScheduleFollowUpRequest {
    user_id: String,
    config: FollowUpConfig,
}

async fn schedule_follow_up(
    State(state): State<AppState>,
    Json(body): Json<ScheduleFollowUpRequest>,
) -> Result<Json<FollowUpExecution>, AppError> {
    let execution = state
        .scheduler
        .schedule_follow_up(&body.user_id, body.config)
        .await
        .map_err(map_follow_up_error)?;
    Ok(Json(execution))
}

async fn post_purchase_follow_up(
    State(state): State<AppState>,
    Json(conversion): Json<ConversionEvent>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .scheduler
        .send_post_purchase_follow_up(&conversion)
        .await
        .map_err(map_follow_up_error)?;
    Ok(Json(serde_json::json!({ "status": "scheduled" })))
}

async fn run_follow_up_sweep(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let dispatched = state
        .scheduler
        .execute_scheduled_follow_ups()
        .await
        .map_err(map_follow_up_error)?;

    for execution in &dispatched {
        state.publish(RetentionEvent::FollowUpDispatched(FollowUpDispatchedEvent {
            follow_up_id: execution.id,
            user_id: execution.user_id.clone(),
            kind: execution.kind.tag(),
            timestamp: execution.executed_at.unwrap_or_else(Utc::now).timestamp(),
        }));
    }

    Ok(Json(serde_json::json!({ "dispatched": dispatched.len() })))
}

#[derive(Debug, Deserialize)]
struct TrackResponseRequest {
    kind: ResponseKind,
    note: Option<String>,
}

async fn track_response(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<TrackResponseRequest>,
) -> Result<Json<FollowUpExecution>, AppError> {
    let execution = state
        .scheduler
        .track_follow_up_response(id, body.kind, body.note)
        .await
        .map_err(map_follow_up_error)?;
    Ok(Json(execution))
}

#[derive(Debug, Deserialize)]
struct PushRecommendationsRequest {
    context: RecommendationContext,
}

async fn push_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<PushRecommendationsRequest>,
) -> Result<Json<FollowUpExecution>, AppError> {
    let execution = state
        .scheduler
        .send_product_recommendations(&user_id, body.context)
        .await
        .map_err(map_follow_up_error)?;
    Ok(Json(execution))
}

// ── Escalations ──────────────────────────────────────────────────────────────

async fn run_escalation_pass(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .engine
        .monitor_triggers()
        .await
        .map_err(|e| AppError::Anyhow(anyhow::anyhow!(e.to_string())))?;
    state
        .engine
        .evaluate_due_success_checks()
        .await
        .map_err(|e| AppError::Anyhow(anyhow::anyhow!(e.to_string())))?;
    Ok(Json(serde_json::json!({ "status": "completed" })))
}

// ── Seasonal campaigns ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CreateCampaignRequest {
    season: Season,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    #[serde(default)]
    target_segments: Vec<String>,
}

async fn create_campaign(
    State(state): State<AppState>,
    Json(body): Json<CreateCampaignRequest>,
) -> Result<Json<SeasonalCampaign>, AppError> {
    let campaign = state
        .scheduler
        .create_seasonal_campaign(body.season, body.starts_at, body.ends_at, body.target_segments)
        .await
        .map_err(map_follow_up_error)?;
    Ok(Json(campaign))
}

async fn send_seasonal(
    State(state): State<AppState>,
    Path(season): Path<Season>,
) -> Result<Json<serde_json::Value>, AppError> {
    let scheduled = state
        .scheduler
        .send_seasonal_reminders(season)
        .await
        .map_err(map_follow_up_error)?;
    Ok(Json(serde_json::json!({ "scheduled": scheduled })))
}

// ── Event stream ─────────────────────────────────────────────────────────────

async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let rx = state.sse_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|message| async move {
        match message {
            Ok(event) => Some(Event::default().json_data(&event)),
            // A lagged subscriber just skips what it missed.
            Err(_) => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
