use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use dealgrid_core::{
    AlertStore, BoxedError, Channel, DeliveryReceipt, MessageContent, MessagingGateway,
    RecommendationProvider, RecommendedDeal, RetentionAlert, UserProfile, UserStore,
};
use dealgrid_escalation::{
    default_plans, ActionDispatcher, EscalationEngine, EscalationState, EscalationStateStore,
    LockManager, SuccessCheck, SuccessProbe,
};
use dealgrid_risk::{ActivityMonitoring, ActivityTrend, ChurnRisk, RiskLevel, RiskStore, Severity};

// ── Fakes ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryStates {
    states: Mutex<HashMap<(String, String), EscalationState>>,
    checks: Mutex<Vec<SuccessCheck>>,
}

#[async_trait]
impl EscalationStateStore for MemoryStates {
    async fn load_state(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> Result<Option<EscalationState>, BoxedError> {
        Ok(self
            .states
            .lock()
            .unwrap()
            .get(&(user_id.to_string(), plan_id.to_string()))
            .cloned())
    }

    async fn save_state(
        &self,
        state: &EscalationState,
        expected_version: i64,
    ) -> Result<bool, BoxedError> {
        let mut states = self.states.lock().unwrap();
        let key = (state.user_id.clone(), state.plan_id.clone());
        let stored_version = states.get(&key).map(|s| s.version).unwrap_or(0);
        if stored_version != expected_version {
            return Ok(false);
        }
        states.insert(key, state.clone());
        Ok(true)
    }

    async fn schedule_check(&self, check: &SuccessCheck) -> Result<(), BoxedError> {
        self.checks.lock().unwrap().push(check.clone());
        Ok(())
    }

    async fn has_pending_check(&self, user_id: &str, plan_id: &str) -> Result<bool, BoxedError> {
        Ok(self
            .checks
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.user_id == user_id && c.plan_id == plan_id))
    }

    async fn due_checks(&self, now: DateTime<Utc>) -> Result<Vec<SuccessCheck>, BoxedError> {
        Ok(self
            .checks
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.due_at <= now)
            .cloned()
            .collect())
    }

    async fn complete_check(&self, check_id: Uuid) -> Result<(), BoxedError> {
        self.checks.lock().unwrap().retain(|c| c.id != check_id);
        Ok(())
    }
}

impl MemoryStates {
    fn force_all_checks_due(&self) {
        let mut checks = self.checks.lock().unwrap();
        for check in checks.iter_mut() {
            check.due_at = Utc::now() - Duration::seconds(1);
        }
    }
}

#[derive(Default)]
struct AlwaysLock;

#[async_trait]
impl LockManager for AlwaysLock {
    async fn try_acquire(&self, _key: &str, _ttl_seconds: u64) -> Result<bool, BoxedError> {
        Ok(true)
    }

    async fn release(&self, _key: &str) -> Result<(), BoxedError> {
        Ok(())
    }
}

struct FakeProbe {
    engagement: Mutex<f64>,
    responses: Mutex<u64>,
}

impl FakeProbe {
    fn quiet() -> Self {
        Self {
            engagement: Mutex::new(10.0),
            responses: Mutex::new(0),
        }
    }
}

#[async_trait]
impl SuccessProbe for FakeProbe {
    async fn engagement_score(&self, _user_id: &str) -> Result<f64, BoxedError> {
        Ok(*self.engagement.lock().unwrap())
    }

    async fn response_count(&self, _user_id: &str, _since: DateTime<Utc>) -> Result<u64, BoxedError> {
        Ok(*self.responses.lock().unwrap())
    }

    async fn reactivated(&self, _user_id: &str, _since: DateTime<Utc>) -> Result<bool, BoxedError> {
        Ok(false)
    }
}

struct MemoryRisks {
    risks: Mutex<Vec<ChurnRisk>>,
}

#[async_trait]
impl RiskStore for MemoryRisks {
    async fn append_churn_risk(&self, risk: &ChurnRisk) -> Result<(), BoxedError> {
        self.risks.lock().unwrap().push(risk.clone());
        Ok(())
    }

    async fn latest_churn_risk(&self, user_id: &str) -> Result<Option<ChurnRisk>, BoxedError> {
        Ok(self
            .risks
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .last()
            .cloned())
    }

    async fn recent_churn_risks(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ChurnRisk>, BoxedError> {
        let risks = self.risks.lock().unwrap();
        let mut matching: Vec<ChurnRisk> = risks
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        matching.reverse();
        matching.truncate(limit);
        Ok(matching)
    }

    async fn high_risk_users(
        &self,
        min_level: RiskLevel,
        limit: usize,
    ) -> Result<Vec<ChurnRisk>, BoxedError> {
        let mut latest: HashMap<String, ChurnRisk> = HashMap::new();
        for risk in self.risks.lock().unwrap().iter() {
            latest.insert(risk.user_id.clone(), risk.clone());
        }
        let mut result: Vec<ChurnRisk> = latest
            .into_values()
            .filter(|r| r.level >= min_level)
            .collect();
        result.sort_by(|a, b| b.score.cmp(&a.score));
        result.truncate(limit);
        Ok(result)
    }

    async fn save_monitoring(&self, _snapshot: &ActivityMonitoring) -> Result<(), BoxedError> {
        Ok(())
    }

    async fn latest_monitoring(
        &self,
        _user_id: &str,
    ) -> Result<Option<ActivityMonitoring>, BoxedError> {
        Ok(None)
    }

    async fn users_with_recent_anomaly(
        &self,
        _min_severity: Severity,
        _since: DateTime<Utc>,
    ) -> Result<Vec<String>, BoxedError> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct RecordingGateway {
    sends: Mutex<Vec<(String, Channel)>>,
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn send(
        &self,
        user_id: &str,
        channel: Channel,
        _content: &MessageContent,
    ) -> Result<DeliveryReceipt, BoxedError> {
        self.sends.lock().unwrap().push((user_id.to_string(), channel));
        Ok(DeliveryReceipt {
            channel,
            provider_message_id: None,
        })
    }
}

#[derive(Default)]
struct MemoryAlerts {
    alerts: Mutex<Vec<RetentionAlert>>,
}

#[async_trait]
impl AlertStore for MemoryAlerts {
    async fn insert_alert(&self, alert: &RetentionAlert) -> Result<(), BoxedError> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

struct FakeUsers;

#[async_trait]
impl UserStore for FakeUsers {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, BoxedError> {
        Ok(Some(UserProfile::new(user_id, Utc::now() - Duration::days(90))))
    }

    async fn list_active_user_ids(&self) -> Result<Vec<String>, BoxedError> {
        Ok(vec![])
    }
}

struct FakeRecs;

#[async_trait]
impl RecommendationProvider for FakeRecs {
    async fn top_recommendations(
        &self,
        _user_id: &str,
        _limit: usize,
    ) -> Result<Vec<RecommendedDeal>, BoxedError> {
        Ok(vec![])
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
    engine: EscalationEngine,
    states: Arc<MemoryStates>,
    gateway: Arc<RecordingGateway>,
    alerts: Arc<MemoryAlerts>,
}

fn high_risk(user_id: &str, score: u8) -> ChurnRisk {
    ChurnRisk {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        score,
        level: if score >= 80 {
            RiskLevel::Critical
        } else {
            RiskLevel::High
        },
        factors: vec![],
        predicted_churn_at: Some(Utc::now() + Duration::days(10)),
        confidence: 75,
        last_activity_at: Some(Utc::now() - Duration::days(12)),
        trend: ActivityTrend::Decreasing,
        engagement_score: 12.0,
        lifetime_value: 300.0,
        recommendations: vec![],
        calculated_at: Utc::now(),
        metadata: serde_json::json!({}),
    }
}

fn harness(risks: Vec<ChurnRisk>) -> Harness {
    let states = Arc::new(MemoryStates::default());
    let gateway = Arc::new(RecordingGateway::default());
    let alerts = Arc::new(MemoryAlerts::default());

    let dispatcher = ActionDispatcher::new(
        Arc::new(FakeUsers),
        gateway.clone(),
        Arc::new(FakeRecs),
        alerts.clone(),
    );

    let engine = EscalationEngine::new(
        default_plans(),
        Arc::new(MemoryRisks {
            risks: Mutex::new(risks),
        }),
        states.clone(),
        Arc::new(AlwaysLock),
        Arc::new(FakeProbe::quiet()),
        dispatcher,
    );

    Harness {
        engine,
        states,
        gateway,
        alerts,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn trigger_pass_executes_level_zero_once() {
    let h = harness(vec![high_risk("u-1", 75)]);

    h.engine.monitor_triggers().await.unwrap();
    assert_eq!(h.gateway.sends.lock().unwrap().len(), 1);

    // A second pass while the success check is pending must not re-send.
    h.engine.monitor_triggers().await.unwrap();
    assert_eq!(h.gateway.sends.lock().unwrap().len(), 1);

    let state = h
        .states
        .load_state("u-1", "high_risk_winback")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.current_level, 0);
    assert!(state.last_action_at.is_some());
}

#[tokio::test]
async fn failed_checks_walk_the_ladder_without_skipping() {
    let h = harness(vec![high_risk("u-1", 85)]);

    let mut observed_levels = vec![];
    for _ in 0..6 {
        h.engine.monitor_triggers().await.unwrap();
        h.states.force_all_checks_due();
        h.engine.evaluate_due_success_checks().await.unwrap();

        let state = h
            .states
            .load_state("u-1", "high_risk_winback")
            .await
            .unwrap()
            .unwrap();
        observed_levels.push(state.current_level);
        if state.closed {
            break;
        }
    }

    for pair in observed_levels.windows(2) {
        assert!(pair[1] >= pair[0], "levels regressed: {observed_levels:?}");
        assert!(pair[1] - pair[0] <= 1, "levels skipped: {observed_levels:?}");
    }

    let final_state = h
        .states
        .load_state("u-1", "high_risk_winback")
        .await
        .unwrap()
        .unwrap();
    assert!(final_state.closed, "exhausted ladder must close the plan");
    assert!(final_state.current_level <= 3);
    assert!(final_state.cooldown_until.is_some());

    // The personal-outreach rung raised an alert along the way.
    assert!(!h.alerts.alerts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn no_action_fires_during_cooldown() {
    let h = harness(vec![high_risk("u-1", 75)]);

    let mut state = EscalationState::fresh("u-1", "high_risk_winback");
    state.closed = true;
    state.cooldown_until = Some(Utc::now() + Duration::hours(2));
    h.states.save_state(&state, 0).await.unwrap();

    h.engine.monitor_triggers().await.unwrap();
    assert!(
        h.gateway.sends.lock().unwrap().is_empty(),
        "cooldown must suppress every action"
    );
}

#[tokio::test]
async fn expired_cooldown_reopens_at_level_zero() {
    let h = harness(vec![high_risk("u-1", 75)]);

    let mut state = EscalationState::fresh("u-1", "high_risk_winback");
    state.current_level = 3;
    state.closed = true;
    state.cooldown_until = Some(Utc::now() - Duration::hours(1));
    h.states.save_state(&state, 0).await.unwrap();

    h.engine.monitor_triggers().await.unwrap();

    let state = h
        .states
        .load_state("u-1", "high_risk_winback")
        .await
        .unwrap()
        .unwrap();
    assert!(!state.closed);
    assert_eq!(state.current_level, 0, "fresh trigger restarts the ladder");
    assert_eq!(h.gateway.sends.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn cooldowns_are_independent_across_plans() {
    // User is cooling down on the winback plan but the anomaly plan has no
    // state at all; only the winback plan is suppressed.
    let h = harness(vec![high_risk("u-1", 75)]);

    let mut state = EscalationState::fresh("u-1", "high_risk_winback");
    state.closed = true;
    state.cooldown_until = Some(Utc::now() + Duration::hours(2));
    h.states.save_state(&state, 0).await.unwrap();

    let other = h
        .states
        .load_state("u-1", "sudden_drop_response")
        .await
        .unwrap();
    assert!(other.is_none());
}

#[tokio::test]
async fn increase_offer_is_capped_at_plan_maximum() {
    use dealgrid_escalation::{
        ConditionField, ConditionOp, EscalationAction, EscalationLevel, EscalationPlan,
        FailureAction, Measurement, SuccessCriteria, SuccessMetric, Trigger, TriggerCondition,
        TriggerSource,
    };

    // One-level plan that repeats on failure, so the offer action fires
    // over and over against the same state.
    let plan = EscalationPlan {
        id: "offer_ladder".to_string(),
        name: "Offer ladder".to_string(),
        triggers: vec![Trigger {
            id: "t".to_string(),
            name: "score".to_string(),
            source: TriggerSource::HighRisk {
                min_level: RiskLevel::High,
            },
            conditions: vec![TriggerCondition {
                field: ConditionField::ChurnRiskScore,
                op: ConditionOp::GreaterThan,
                value: 60.0,
            }],
        }],
        levels: vec![EscalationLevel {
            level: 0,
            actions: vec![EscalationAction::IncreaseOffer {
                delta_percent: 10.0,
                max_percent: 25.0,
            }],
            success: SuccessCriteria {
                metric: SuccessMetric::UserEngagement,
                target_value: 90.0,
                timeframe_hours: 24,
                measurement: Measurement::Absolute,
            },
            failure_action: FailureAction::Repeat,
            max_attempts: 10,
        }],
        max_escalation_level: 1,
        cooldown_hours: 48,
        is_active: true,
    };

    let states = Arc::new(MemoryStates::default());
    let gateway = Arc::new(RecordingGateway::default());
    let dispatcher = ActionDispatcher::new(
        Arc::new(FakeUsers),
        gateway.clone(),
        Arc::new(FakeRecs),
        Arc::new(MemoryAlerts::default()),
    );
    let engine = EscalationEngine::new(
        vec![plan],
        Arc::new(MemoryRisks {
            risks: Mutex::new(vec![high_risk("u-1", 85)]),
        }),
        states.clone(),
        Arc::new(AlwaysLock),
        Arc::new(FakeProbe::quiet()),
        dispatcher,
    );

    for _ in 0..5 {
        engine.monitor_triggers().await.unwrap();
        states.force_all_checks_due();
        engine.evaluate_due_success_checks().await.unwrap();

        let state = states
            .load_state("u-1", "offer_ladder")
            .await
            .unwrap()
            .unwrap();
        assert!(state.current_discount_percent <= 25.0);
        if state.closed {
            break;
        }
    }

    let state = states
        .load_state("u-1", "offer_ladder")
        .await
        .unwrap()
        .unwrap();
    // 10 + 10 + capped 5: never past the configured maximum.
    assert_eq!(state.current_discount_percent, 25.0);
}
