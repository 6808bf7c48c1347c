use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dealgrid_core::Channel;
use dealgrid_risk::{ChurnRisk, RiskLevel, Severity};

// ── Triggers ─────────────────────────────────────────────────────────────────

/// Where a trigger finds its candidate users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum TriggerSource {
    /// Latest risk record at or above a tier.
    HighRisk { min_level: RiskLevel },
    /// Users whose monitoring snapshot raised an anomaly recently.
    RecentAnomaly { min_severity: Severity },
    /// Every scored user, filtered purely by the trigger's conditions.
    Criteria,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionField {
    ChurnRiskScore,
    EngagementScore,
    DaysSinceLastActivity,
    LifetimeValue,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    GreaterThan,
    LessThan,
    Equals,
    /// Change between the two most recent risk records, in percent.
    PercentageChange,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerCondition {
    pub field: ConditionField,
    pub op: ConditionOp,
    pub value: f64,
}

impl TriggerCondition {
    pub fn field_value(field: ConditionField, risk: &ChurnRisk, now: DateTime<Utc>) -> f64 {
        match field {
            ConditionField::ChurnRiskScore => risk.score as f64,
            ConditionField::EngagementScore => risk.engagement_score,
            ConditionField::DaysSinceLastActivity => risk
                .last_activity_at
                .map(|t| (now - t).num_days().max(0) as f64)
                .unwrap_or(f64::MAX),
            ConditionField::LifetimeValue => risk.lifetime_value,
        }
    }

    /// Evaluate against the latest risk record; `previous` feeds the
    /// percentage-change operator.
    pub fn matches(
        &self,
        latest: &ChurnRisk,
        previous: Option<&ChurnRisk>,
        now: DateTime<Utc>,
    ) -> bool {
        let current = Self::field_value(self.field, latest, now);
        match self.op {
            ConditionOp::GreaterThan => current > self.value,
            ConditionOp::LessThan => current < self.value,
            ConditionOp::Equals => (current - self.value).abs() < f64::EPSILON,
            ConditionOp::PercentageChange => {
                let Some(previous) = previous else { return false };
                let baseline = Self::field_value(self.field, previous, now);
                if baseline == 0.0 {
                    return false;
                }
                let change = (current - baseline) / baseline * 100.0;
                change.abs() >= self.value
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub id: String,
    pub name: String,
    pub source: TriggerSource,
    pub conditions: Vec<TriggerCondition>,
}

// ── Levels and actions ───────────────────────────────────────────────────────

/// One retention measure. Adding a kind is a compile-time extension: every
/// dispatch site matches exhaustively.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EscalationAction {
    IncreaseOffer {
        delta_percent: f64,
        max_percent: f64,
    },
    ChangeChannel {
        channels: Vec<Channel>,
        personalized: bool,
        schedule_call: bool,
    },
    PersonalOutreach {
        assign_to: String,
        urgent_call: bool,
    },
    ExecutiveIntervention,
    EmergencyCampaign {
        discount_percent: f64,
    },
}

impl EscalationAction {
    pub fn kind(&self) -> &'static str {
        match self {
            EscalationAction::IncreaseOffer { .. } => "increase_offer",
            EscalationAction::ChangeChannel { .. } => "change_channel",
            EscalationAction::PersonalOutreach { .. } => "personal_outreach",
            EscalationAction::ExecutiveIntervention => "executive_intervention",
            EscalationAction::EmergencyCampaign { .. } => "emergency_campaign",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuccessMetric {
    UserEngagement,
    UserResponse,
    UserReactivation,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Measurement {
    Absolute,
    PercentageChange,
    RelativeToBaseline,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuccessCriteria {
    pub metric: SuccessMetric,
    pub target_value: f64,
    pub timeframe_hours: i64,
    pub measurement: Measurement,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FailureAction {
    Escalate,
    End,
    Repeat,
    Custom(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationLevel {
    pub level: u32,
    pub actions: Vec<EscalationAction>,
    pub success: SuccessCriteria,
    pub failure_action: FailureAction,
    pub max_attempts: u32,
}

/// Operator-authored static configuration for one escalation workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPlan {
    pub id: String,
    pub name: String,
    pub triggers: Vec<Trigger>,
    pub levels: Vec<EscalationLevel>,
    /// One past the last executable level index.
    pub max_escalation_level: u32,
    pub cooldown_hours: i64,
    pub is_active: bool,
}

impl EscalationPlan {
    pub fn level_config(&self, level: u32) -> Option<&EscalationLevel> {
        self.levels.iter().find(|l| l.level == level)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::hours(self.cooldown_hours)
    }
}

// ── Runtime state ────────────────────────────────────────────────────────────

/// Persisted per (user, plan). Writes are compare-and-swap on `version`;
/// a conflict means another pass already acted on this pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationState {
    pub user_id: String,
    pub plan_id: String,
    pub current_level: u32,
    pub attempts_at_level: u32,
    pub current_discount_percent: f64,
    pub last_action_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub baseline_engagement: Option<f64>,
    pub closed: bool,
    pub version: i64,
}

impl EscalationState {
    pub fn fresh(user_id: impl Into<String>, plan_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            plan_id: plan_id.into(),
            current_level: 0,
            attempts_at_level: 0,
            current_discount_percent: 0.0,
            last_action_at: None,
            cooldown_until: None,
            baseline_engagement: None,
            closed: false,
            version: 0,
        }
    }

    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.map(|until| now < until).unwrap_or(false)
    }

    pub fn exhausted(&self, plan: &EscalationPlan) -> bool {
        self.current_level >= plan.max_escalation_level
    }

    /// Advance exactly one level, resetting the attempt counter. Never
    /// moves past the plan's ceiling; at the ceiling the plan instance is
    /// closed and the cooldown starts instead.
    pub fn escalate(&mut self, plan: &EscalationPlan, now: DateTime<Utc>) {
        let next = self.current_level + 1;
        if next >= plan.max_escalation_level {
            self.current_level = plan.max_escalation_level;
            self.close(plan, now);
        } else {
            self.current_level = next;
            self.attempts_at_level = 0;
        }
    }

    /// Re-run the current level; past `max_attempts` the plan forces an
    /// escalation instead of looping forever.
    pub fn repeat(&mut self, plan: &EscalationPlan, level: &EscalationLevel, now: DateTime<Utc>) {
        self.attempts_at_level += 1;
        if self.attempts_at_level >= level.max_attempts {
            self.escalate(plan, now);
        }
    }

    /// Terminate the plan instance and start the cooldown window.
    pub fn close(&mut self, plan: &EscalationPlan, now: DateTime<Utc>) {
        self.closed = true;
        self.cooldown_until = Some(now + plan.cooldown());
    }

    /// A fresh trigger after the cooldown elapsed restarts the workflow.
    pub fn reopen(&mut self) {
        self.current_level = 0;
        self.attempts_at_level = 0;
        self.current_discount_percent = 0.0;
        self.baseline_engagement = None;
        self.cooldown_until = None;
        self.closed = false;
    }
}

/// A deferred success evaluation: persisted when a level executes and
/// drained by the periodic worker once due. This replaces any
/// "sleep N hours then check" construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessCheck {
    pub id: Uuid,
    pub user_id: String,
    pub plan_id: String,
    pub level: u32,
    pub due_at: DateTime<Utc>,
    pub criteria: SuccessCriteria,
    pub baseline_value: Option<f64>,
    pub scheduled_at: DateTime<Utc>,
}

impl SuccessCheck {
    pub fn for_level(
        state: &EscalationState,
        level: &EscalationLevel,
        baseline_value: Option<f64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: state.user_id.clone(),
            plan_id: state.plan_id.clone(),
            level: level.level,
            due_at: now + Duration::hours(level.success.timeframe_hours),
            criteria: level.success.clone(),
            baseline_value,
            scheduled_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plans::default_plans;

    fn plan() -> EscalationPlan {
        default_plans().into_iter().next().unwrap()
    }

    #[test]
    fn escalate_moves_exactly_one_level() {
        let plan = plan();
        let mut state = EscalationState::fresh("u-1", &plan.id);
        let now = Utc::now();

        state.escalate(&plan, now);
        assert_eq!(state.current_level, 1);
        assert_eq!(state.attempts_at_level, 0);
        assert!(!state.closed);
    }

    #[test]
    fn escalate_at_ceiling_closes_and_cools_down() {
        let plan = plan();
        let mut state = EscalationState::fresh("u-1", &plan.id);
        state.current_level = plan.max_escalation_level - 1;
        let now = Utc::now();

        state.escalate(&plan, now);
        assert_eq!(state.current_level, plan.max_escalation_level);
        assert!(state.closed);
        assert_eq!(state.cooldown_until, Some(now + plan.cooldown()));
    }

    #[test]
    fn level_sequence_is_non_decreasing_and_bounded() {
        let plan = plan();
        let mut state = EscalationState::fresh("u-1", &plan.id);
        let now = Utc::now();

        let mut observed = vec![state.current_level];
        for _ in 0..10 {
            state.escalate(&plan, now);
            observed.push(state.current_level);
        }

        for pair in observed.windows(2) {
            assert!(pair[1] >= pair[0], "level regressed: {observed:?}");
            assert!(pair[1] - pair[0] <= 1, "level skipped: {observed:?}");
        }
        assert!(*observed.last().unwrap() <= plan.max_escalation_level);
    }

    #[test]
    fn repeat_forces_escalation_past_max_attempts() {
        let plan = plan();
        let level = plan.level_config(0).unwrap().clone();
        let mut state = EscalationState::fresh("u-1", &plan.id);
        let now = Utc::now();

        for _ in 0..level.max_attempts.saturating_sub(1) {
            state.repeat(&plan, &level, now);
            assert_eq!(state.current_level, 0);
        }
        state.repeat(&plan, &level, now);
        assert_eq!(state.current_level, 1, "exhausted repeats must escalate");
        assert_eq!(state.attempts_at_level, 0);
    }

    #[test]
    fn cooldown_boundary_is_exclusive() {
        let now = Utc::now();
        let mut state = EscalationState::fresh("u-1", "p-1");
        state.cooldown_until = Some(now);

        // At the boundary the cooldown is over.
        assert!(!state.in_cooldown(now));
        assert!(state.in_cooldown(now - Duration::seconds(1)));
    }

    #[test]
    fn percentage_change_needs_history() {
        let condition = TriggerCondition {
            field: ConditionField::EngagementScore,
            op: ConditionOp::PercentageChange,
            value: 20.0,
        };
        let now = Utc::now();
        let latest = sample_risk(40.0);

        assert!(!condition.matches(&latest, None, now));

        let previous = sample_risk(80.0);
        // 40 from 80 is a 50% drop.
        assert!(condition.matches(&latest, Some(&previous), now));

        let barely = sample_risk(41.0);
        assert!(!condition.matches(&latest, Some(&barely), now));
    }

    fn sample_risk(engagement: f64) -> ChurnRisk {
        ChurnRisk {
            id: Uuid::new_v4(),
            user_id: "u-1".to_string(),
            score: 70,
            level: RiskLevel::High,
            factors: vec![],
            predicted_churn_at: None,
            confidence: 70,
            last_activity_at: Some(Utc::now() - Duration::days(10)),
            trend: dealgrid_risk::ActivityTrend::Decreasing,
            engagement_score: engagement,
            lifetime_value: 100.0,
            recommendations: vec![],
            calculated_at: Utc::now(),
            metadata: serde_json::json!({}),
        }
    }
}
