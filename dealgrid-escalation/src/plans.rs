use dealgrid_core::Channel;
use dealgrid_risk::{RiskLevel, Severity};

use crate::models::{
    ConditionField, ConditionOp, EscalationAction, EscalationLevel, EscalationPlan, FailureAction,
    Measurement, SuccessCriteria, SuccessMetric, Trigger, TriggerCondition, TriggerSource,
};

/// Operator-authored default plans. Loaded at startup; runtime never
/// derives plans on its own.
pub fn default_plans() -> Vec<EscalationPlan> {
    vec![
        EscalationPlan {
            id: "high_risk_winback".to_string(),
            name: "High-risk winback ladder".to_string(),
            triggers: vec![Trigger {
                id: "high-risk-score".to_string(),
                name: "Churn score above high tier".to_string(),
                source: TriggerSource::HighRisk {
                    min_level: RiskLevel::High,
                },
                conditions: vec![TriggerCondition {
                    field: ConditionField::ChurnRiskScore,
                    op: ConditionOp::GreaterThan,
                    value: 60.0,
                }],
            }],
            levels: vec![
                EscalationLevel {
                    level: 0,
                    actions: vec![EscalationAction::IncreaseOffer {
                        delta_percent: 5.0,
                        max_percent: 25.0,
                    }],
                    success: SuccessCriteria {
                        metric: SuccessMetric::UserEngagement,
                        target_value: 40.0,
                        timeframe_hours: 48,
                        measurement: Measurement::Absolute,
                    },
                    failure_action: FailureAction::Escalate,
                    max_attempts: 2,
                },
                EscalationLevel {
                    level: 1,
                    actions: vec![EscalationAction::ChangeChannel {
                        channels: vec![Channel::Telegram, Channel::Push, Channel::Email],
                        personalized: true,
                        schedule_call: false,
                    }],
                    success: SuccessCriteria {
                        metric: SuccessMetric::UserResponse,
                        target_value: 1.0,
                        timeframe_hours: 72,
                        measurement: Measurement::Absolute,
                    },
                    failure_action: FailureAction::Escalate,
                    max_attempts: 2,
                },
                EscalationLevel {
                    level: 2,
                    actions: vec![EscalationAction::PersonalOutreach {
                        assign_to: "retention-team".to_string(),
                        urgent_call: true,
                    }],
                    success: SuccessCriteria {
                        metric: SuccessMetric::UserReactivation,
                        target_value: 1.0,
                        timeframe_hours: 120,
                        measurement: Measurement::Absolute,
                    },
                    failure_action: FailureAction::End,
                    max_attempts: 1,
                },
            ],
            max_escalation_level: 3,
            cooldown_hours: 336,
            is_active: true,
        },
        EscalationPlan {
            id: "sudden_drop_response".to_string(),
            name: "Sudden-drop anomaly response".to_string(),
            triggers: vec![Trigger {
                id: "high-severity-anomaly".to_string(),
                name: "High-severity activity anomaly".to_string(),
                source: TriggerSource::RecentAnomaly {
                    min_severity: Severity::High,
                },
                conditions: vec![],
            }],
            levels: vec![
                EscalationLevel {
                    level: 0,
                    actions: vec![EscalationAction::ChangeChannel {
                        channels: vec![Channel::Telegram, Channel::Push],
                        personalized: true,
                        schedule_call: false,
                    }],
                    success: SuccessCriteria {
                        metric: SuccessMetric::UserResponse,
                        target_value: 1.0,
                        timeframe_hours: 48,
                        measurement: Measurement::Absolute,
                    },
                    failure_action: FailureAction::Repeat,
                    max_attempts: 2,
                },
                EscalationLevel {
                    level: 1,
                    actions: vec![EscalationAction::EmergencyCampaign {
                        discount_percent: 30.0,
                    }],
                    success: SuccessCriteria {
                        metric: SuccessMetric::UserEngagement,
                        target_value: 20.0,
                        timeframe_hours: 96,
                        measurement: Measurement::RelativeToBaseline,
                    },
                    failure_action: FailureAction::End,
                    max_attempts: 1,
                },
            ],
            max_escalation_level: 2,
            cooldown_hours: 168,
            is_active: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_plans_are_internally_consistent() {
        for plan in default_plans() {
            assert!(plan.is_active);
            assert!(!plan.levels.is_empty());
            assert_eq!(plan.max_escalation_level as usize, plan.levels.len());
            for (index, level) in plan.levels.iter().enumerate() {
                assert_eq!(level.level as usize, index, "levels must be contiguous");
                assert!(level.max_attempts >= 1);
                assert!(level.success.timeframe_hours > 0);
            }
            assert!(plan.cooldown_hours > 0);
        }
    }
}
