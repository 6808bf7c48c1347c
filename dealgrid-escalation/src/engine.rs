use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use dealgrid_risk::{ChurnRisk, RiskLevel, RiskStore};

use crate::actions::ActionDispatcher;
use crate::models::{
    EscalationPlan, EscalationState, FailureAction, Measurement, SuccessCheck, SuccessMetric,
    Trigger, TriggerSource,
};
use crate::store::{EscalationStateStore, LockManager, SuccessProbe};
use crate::EscalationError;

/// TTL on the per-plan pass lock; generous compared to one sweep.
const PLAN_LOCK_TTL_SECONDS: u64 = 300;

/// Upper bound on candidates pulled per trigger source.
const CANDIDATE_LIMIT: usize = 500;

/// The per-(user, plan) escalation state machine.
///
/// `monitor_triggers` and `evaluate_due_success_checks` are both invoked by
/// the periodic worker; neither ever blocks waiting for a user to react —
/// waiting is a persisted `SuccessCheck` row.
pub struct EscalationEngine {
    plans: Vec<EscalationPlan>,
    risks: Arc<dyn RiskStore>,
    states: Arc<dyn EscalationStateStore>,
    locks: Arc<dyn LockManager>,
    probe: Arc<dyn SuccessProbe>,
    dispatcher: ActionDispatcher,
}

impl EscalationEngine {
    pub fn new(
        plans: Vec<EscalationPlan>,
        risks: Arc<dyn RiskStore>,
        states: Arc<dyn EscalationStateStore>,
        locks: Arc<dyn LockManager>,
        probe: Arc<dyn SuccessProbe>,
        dispatcher: ActionDispatcher,
    ) -> Self {
        Self {
            plans,
            risks,
            states,
            locks,
            probe,
            dispatcher,
        }
    }

    /// One periodic pass over every active plan. Each plan pass is
    /// single-flight: a second worker hitting the same plan is a no-op.
    pub async fn monitor_triggers(&self) -> Result<(), EscalationError> {
        let now = Utc::now();

        for plan in self.plans.iter().filter(|p| p.is_active) {
            let lock_key = format!("escalation:plan:{}", plan.id);
            if !self.locks.try_acquire(&lock_key, PLAN_LOCK_TTL_SECONDS).await? {
                tracing::debug!(plan_id = %plan.id, "plan pass already running elsewhere");
                continue;
            }

            let result = self.run_plan_pass(plan, now).await;
            self.locks.release(&lock_key).await?;
            result?;
        }

        Ok(())
    }

    async fn run_plan_pass(
        &self,
        plan: &EscalationPlan,
        now: DateTime<Utc>,
    ) -> Result<(), EscalationError> {
        let mut seen: HashSet<String> = HashSet::new();

        for trigger in &plan.triggers {
            let candidates = self.candidates_for(trigger, now).await?;
            for risk in candidates {
                if !seen.insert(risk.user_id.clone()) {
                    continue;
                }
                if let Err(err) = self.execute_for_user(plan, &risk, now).await {
                    // One user's failure never aborts the plan pass.
                    tracing::warn!(
                        plan_id = %plan.id,
                        user_id = %risk.user_id,
                        error = %err,
                        "escalation step failed"
                    );
                }
            }
        }

        Ok(())
    }

    async fn candidates_for(
        &self,
        trigger: &Trigger,
        now: DateTime<Utc>,
    ) -> Result<Vec<ChurnRisk>, EscalationError> {
        let pool: Vec<ChurnRisk> = match &trigger.source {
            TriggerSource::HighRisk { min_level } => {
                self.risks.high_risk_users(*min_level, CANDIDATE_LIMIT).await?
            }
            TriggerSource::RecentAnomaly { min_severity } => {
                let since = now - chrono::Duration::hours(24);
                let user_ids = self
                    .risks
                    .users_with_recent_anomaly(*min_severity, since)
                    .await?;
                let mut risks = Vec::with_capacity(user_ids.len());
                for user_id in user_ids {
                    if let Some(risk) = self.risks.latest_churn_risk(&user_id).await? {
                        risks.push(risk);
                    }
                }
                risks
            }
            TriggerSource::Criteria => {
                self.risks.high_risk_users(RiskLevel::Low, CANDIDATE_LIMIT).await?
            }
        };

        let mut matching = Vec::new();
        for risk in pool {
            if self.conditions_hold(trigger, &risk, now).await? {
                matching.push(risk);
            }
        }
        Ok(matching)
    }

    async fn conditions_hold(
        &self,
        trigger: &Trigger,
        latest: &ChurnRisk,
        now: DateTime<Utc>,
    ) -> Result<bool, EscalationError> {
        if trigger.conditions.is_empty() {
            return Ok(true);
        }

        // The percentage-change operator needs the run before the latest.
        let needs_history = trigger
            .conditions
            .iter()
            .any(|c| c.op == crate::models::ConditionOp::PercentageChange);
        let previous = if needs_history {
            self.risks
                .recent_churn_risks(&latest.user_id, 2)
                .await?
                .into_iter()
                .nth(1)
        } else {
            None
        };

        Ok(trigger
            .conditions
            .iter()
            .all(|c| c.matches(latest, previous.as_ref(), now)))
    }

    /// Advance one user through the plan: skip while cooling down or
    /// waiting for a success check, otherwise execute the current level and
    /// schedule its deferred evaluation.
    pub async fn execute_for_user(
        &self,
        plan: &EscalationPlan,
        risk: &ChurnRisk,
        now: DateTime<Utc>,
    ) -> Result<(), EscalationError> {
        let user_id = &risk.user_id;

        let mut state = match self.states.load_state(user_id, &plan.id).await? {
            Some(state) => state,
            None => EscalationState::fresh(user_id.clone(), plan.id.clone()),
        };
        let expected_version = state.version;

        if state.in_cooldown(now) {
            tracing::debug!(user_id = %user_id, plan_id = %plan.id, "cooling down, skipped");
            return Ok(());
        }

        if state.closed {
            // Cooldown elapsed and the trigger fired again: restart.
            state.reopen();
        }

        if state.exhausted(plan) {
            tracing::info!(user_id = %user_id, plan_id = %plan.id, "plan exhausted, skipped");
            return Ok(());
        }

        if self.states.has_pending_check(user_id, &plan.id).await? {
            // Still waiting on the last level's outcome.
            return Ok(());
        }

        let level = plan
            .level_config(state.current_level)
            .ok_or_else(|| EscalationError::UnknownPlan(plan.id.clone()))?;

        let mut dispatch_failed = false;
        for action in &level.actions {
            if let Err(err) = self.dispatcher.dispatch(action, &mut state).await {
                tracing::warn!(
                    user_id = %user_id,
                    plan_id = %plan.id,
                    action = action.kind(),
                    error = %err,
                    "action dispatch failed, level stays pending"
                );
                dispatch_failed = true;
                break;
            }
        }

        if dispatch_failed {
            // Transient: retried next pass. Past max_attempts it is a
            // permanent failure and the level's failure policy applies.
            state.attempts_at_level += 1;
            if state.attempts_at_level >= level.max_attempts {
                self.apply_failure(&mut state, plan, now);
            }
        } else {
            state.last_action_at = Some(now);
            let baseline = self.probe.engagement_score(user_id).await.ok();
            state.baseline_engagement = baseline;
            let check = SuccessCheck::for_level(&state, level, baseline, now);
            self.states.schedule_check(&check).await?;
        }

        state.version += 1;
        if !self.states.save_state(&state, expected_version).await? {
            return Err(EscalationError::VersionConflict {
                user_id: user_id.clone(),
                plan_id: plan.id.clone(),
            });
        }

        Ok(())
    }

    /// Drain due success checks: close the plan on success, otherwise apply
    /// the level's failure policy.
    pub async fn evaluate_due_success_checks(&self) -> Result<(), EscalationError> {
        let now = Utc::now();
        let due = self.states.due_checks(now).await?;

        for check in due {
            if let Err(err) = self.evaluate_check(&check, now).await {
                tracing::warn!(
                    user_id = %check.user_id,
                    plan_id = %check.plan_id,
                    error = %err,
                    "success check evaluation failed"
                );
            }
            self.states.complete_check(check.id).await?;
        }

        Ok(())
    }

    async fn evaluate_check(
        &self,
        check: &SuccessCheck,
        now: DateTime<Utc>,
    ) -> Result<(), EscalationError> {
        let plan = self
            .plans
            .iter()
            .find(|p| p.id == check.plan_id)
            .ok_or_else(|| EscalationError::UnknownPlan(check.plan_id.clone()))?;

        let Some(mut state) = self.states.load_state(&check.user_id, &check.plan_id).await? else {
            return Ok(());
        };
        let expected_version = state.version;

        if state.closed || state.current_level != check.level {
            // The workflow moved on while this check was in flight.
            return Ok(());
        }

        let succeeded = self.criteria_met(check, now).await?;

        if succeeded {
            tracing::info!(
                user_id = %check.user_id,
                plan_id = %check.plan_id,
                level = check.level,
                "escalation level succeeded, closing plan instance"
            );
            state.close(plan, now);
        } else {
            self.apply_failure(&mut state, plan, now);
        }

        state.version += 1;
        if !self.states.save_state(&state, expected_version).await? {
            return Err(EscalationError::VersionConflict {
                user_id: check.user_id.clone(),
                plan_id: check.plan_id.clone(),
            });
        }

        Ok(())
    }

    fn apply_failure(&self, state: &mut EscalationState, plan: &EscalationPlan, now: DateTime<Utc>) {
        let Some(level) = plan.level_config(state.current_level) else {
            state.close(plan, now);
            return;
        };

        match &level.failure_action {
            FailureAction::Escalate => state.escalate(plan, now),
            FailureAction::End => state.close(plan, now),
            FailureAction::Repeat => state.repeat(plan, level, now),
            FailureAction::Custom(name) => {
                // No custom hooks are registered in this deployment.
                tracing::warn!(
                    plan_id = %plan.id,
                    custom = %name,
                    "custom failure action treated as end"
                );
                state.close(plan, now);
            }
        }
    }

    async fn criteria_met(
        &self,
        check: &SuccessCheck,
        _now: DateTime<Utc>,
    ) -> Result<bool, EscalationError> {
        let since = check.scheduled_at;

        let measured = match check.criteria.metric {
            SuccessMetric::UserEngagement => self.probe.engagement_score(&check.user_id).await?,
            SuccessMetric::UserResponse => {
                self.probe.response_count(&check.user_id, since).await? as f64
            }
            SuccessMetric::UserReactivation => {
                if self.probe.reactivated(&check.user_id, since).await? {
                    1.0
                } else {
                    0.0
                }
            }
        };

        let target = check.criteria.target_value;
        let met = match check.criteria.measurement {
            Measurement::Absolute => measured >= target,
            Measurement::PercentageChange => {
                let baseline = check.baseline_value.unwrap_or(0.0);
                if baseline == 0.0 {
                    measured > 0.0
                } else {
                    (measured - baseline) / baseline * 100.0 >= target
                }
            }
            Measurement::RelativeToBaseline => {
                let baseline = check.baseline_value.unwrap_or(0.0);
                measured >= baseline + target
            }
        };

        Ok(met)
    }
}
