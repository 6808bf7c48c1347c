use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use dealgrid_core::{
    BoxedError, ClickEvent, ConversionEvent, TrafficStore, UserProfile, UserStore,
};
use dealgrid_risk::{
    ActivityAggregator, ActivityMonitoring, ChurnRisk, ChurnRiskConfig, RiskError, RiskLevel,
    RiskScorer, RiskStore, Severity,
};

// ── Fakes ────────────────────────────────────────────────────────────────────

struct FakeUsers {
    users: HashMap<String, UserProfile>,
}

#[async_trait]
impl UserStore for FakeUsers {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, BoxedError> {
        Ok(self.users.get(user_id).cloned())
    }

    async fn list_active_user_ids(&self) -> Result<Vec<String>, BoxedError> {
        Ok(self.users.keys().cloned().collect())
    }
}

struct FakeTraffic {
    clicks: HashMap<String, Vec<ClickEvent>>,
    conversions: HashMap<String, Vec<ConversionEvent>>,
}

#[async_trait]
impl TrafficStore for FakeTraffic {
    async fn clicks(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ClickEvent>, BoxedError> {
        Ok(self
            .clicks
            .get(user_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|c| c.occurred_at >= from && c.occurred_at <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn conversions(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ConversionEvent>, BoxedError> {
        Ok(self
            .conversions
            .get(user_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|c| c.occurred_at >= from && c.occurred_at <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn lifetime_conversion_count(&self, user_id: &str) -> Result<u64, BoxedError> {
        Ok(self
            .conversions
            .get(user_id)
            .map(|c| c.len() as u64)
            .unwrap_or(0))
    }
}

#[derive(Default)]
struct MemoryRiskStore {
    risks: Mutex<Vec<ChurnRisk>>,
}

#[async_trait]
impl RiskStore for MemoryRiskStore {
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

// ── Fixtures ─────────────────────────────────────────────────────────────────

fn active_user(user_id: &str, now: DateTime<Utc>) -> (UserProfile, Vec<ClickEvent>, Vec<ConversionEvent>) {
    let profile = UserProfile::new(user_id, now - Duration::days(90));
    let clicks = (0..12)
        .map(|i| ClickEvent::new(user_id, "telegram", now - Duration::days(i * 2) - Duration::hours(3)))
        .collect();
    let conversions = vec![ConversionEvent::new(user_id, 120.0, now - Duration::days(4))];
    (profile, clicks, conversions)
}

fn scorer_over(users: FakeUsers, traffic: FakeTraffic) -> RiskScorer {
    let traffic = Arc::new(traffic);
    RiskScorer::new(
        Arc::new(users),
        ActivityAggregator::new(traffic),
        Arc::new(MemoryRiskStore::default()),
        ChurnRiskConfig::default(),
    )
    .unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn one_silent_user_does_not_sink_the_batch() {
    let now = Utc::now();
    let mut users = HashMap::new();
    let mut clicks = HashMap::new();
    let mut conversions = HashMap::new();

    for id in ["u-1", "u-2", "u-4"] {
        let (profile, user_clicks, user_conversions) = active_user(id, now);
        users.insert(id.to_string(), profile);
        clicks.insert(id.to_string(), user_clicks);
        conversions.insert(id.to_string(), user_conversions);
    }
    // u-3 exists but has no history at all.
    users.insert("u-3".to_string(), UserProfile::new("u-3", now - Duration::days(10)));

    let scorer = scorer_over(
        FakeUsers { users },
        FakeTraffic { clicks, conversions },
    );

    let ids: Vec<String> = ["u-1", "u-2", "u-3", "u-4"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let outcome = scorer.batch_calculate_churn_risk(&ids, None).await;

    assert_eq!(outcome.risks.len(), 3);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].user_id, "u-3");
    assert!(outcome.failures[0].error.contains("no activity data"));
    assert_eq!(outcome.risks.len() + outcome.failures.len(), ids.len());
}

#[tokio::test]
async fn scoring_a_silent_user_directly_is_a_distinct_error() {
    let now = Utc::now();
    let mut users = HashMap::new();
    users.insert("ghost".to_string(), UserProfile::new("ghost", now - Duration::days(40)));

    let scorer = scorer_over(
        FakeUsers { users },
        FakeTraffic {
            clicks: HashMap::new(),
            conversions: HashMap::new(),
        },
    );

    let err = scorer.calculate_churn_risk("ghost", None).await.unwrap_err();
    assert!(matches!(err, RiskError::NoActivityData(_)));
}

#[tokio::test]
async fn each_scoring_run_appends_a_record() {
    let now = Utc::now();
    let (profile, user_clicks, user_conversions) = active_user("u-1", now);

    let mut users = HashMap::new();
    users.insert("u-1".to_string(), profile);
    let mut clicks = HashMap::new();
    clicks.insert("u-1".to_string(), user_clicks);
    let mut conversions = HashMap::new();
    conversions.insert("u-1".to_string(), user_conversions);

    let store = Arc::new(MemoryRiskStore::default());
    let traffic = Arc::new(FakeTraffic { clicks, conversions });
    let scorer = RiskScorer::new(
        Arc::new(FakeUsers { users }),
        ActivityAggregator::new(traffic),
        store.clone(),
        ChurnRiskConfig::default(),
    )
    .unwrap();

    scorer.calculate_churn_risk("u-1", None).await.unwrap();
    scorer.calculate_churn_risk("u-1", None).await.unwrap();

    let history = store.recent_churn_risks("u-1", 10).await.unwrap();
    assert_eq!(history.len(), 2, "history must be append-only");
}
