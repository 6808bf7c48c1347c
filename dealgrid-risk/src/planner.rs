use serde_json::json;
use std::cmp::Reverse;

use dealgrid_core::Channel;

use crate::models::{
    ActivityData, InterventionKind, InterventionRecommendation, Priority, RiskFactor, RiskLevel,
};

/// Produce ranked intervention recommendations from risk factors.
///
/// Pure and side-effect free: the ordered rule set below may fire several
/// rules for one user, and the output is stably sorted by priority rank,
/// highest first.
pub fn generate_recommendations(
    factors: &[RiskFactor],
    level: RiskLevel,
    activity: &ActivityData,
) -> Vec<InterventionRecommendation> {
    let mut recommendations = Vec::new();

    let factor_value = |name: &str| {
        factors
            .iter()
            .find(|f| f.factor == name)
            .map(|f| f.value)
            .unwrap_or(0.0)
    };

    if factor_value("inactivity") > 50.0 {
        let discount = if level == RiskLevel::Critical { 20.0 } else { 15.0 };
        recommendations.push(InterventionRecommendation {
            kind: InterventionKind::EngagementCampaign,
            priority: if level == RiskLevel::Critical {
                Priority::Urgent
            } else {
                Priority::High
            },
            description: "Re-engagement push with a personal comeback deal".to_string(),
            expected_impact: 0.35,
            cost: 0.2,
            timeframe_days: 3,
            channels: vec![Channel::Telegram, Channel::Push],
            parameters: json!({
                "discount_percent": discount,
                "template": "we_miss_you",
            }),
        });
    }

    if factor_value("conversion_rate") > 60.0 {
        recommendations.push(InterventionRecommendation {
            kind: InterventionKind::ProductRecommendation,
            priority: Priority::Medium,
            description: "Push better-matched deals to a browsing-only user".to_string(),
            expected_impact: 0.2,
            cost: 0.05,
            timeframe_days: 7,
            channels: vec![Channel::Telegram],
            parameters: json!({ "top_n": 5 }),
        });
    }

    if activity.lifetime_value > 5000.0 && level != RiskLevel::Low {
        recommendations.push(InterventionRecommendation {
            kind: InterventionKind::SupportOutreach,
            priority: Priority::High,
            description: "VIP check-in by a retention agent".to_string(),
            expected_impact: 0.5,
            cost: 0.6,
            timeframe_days: 2,
            channels: vec![Channel::Telegram, Channel::Email],
            parameters: json!({ "vip": true }),
        });
    }

    if level == RiskLevel::High || level == RiskLevel::Medium {
        let discount = if level == RiskLevel::High { 15.0 } else { 10.0 };
        recommendations.push(InterventionRecommendation {
            kind: InterventionKind::DiscountOffer,
            priority: if level == RiskLevel::High {
                Priority::High
            } else {
                Priority::Medium
            },
            description: "Time-boxed discount to nudge the next order".to_string(),
            expected_impact: 0.25,
            cost: 0.3,
            timeframe_days: 7,
            channels: vec![Channel::Telegram],
            parameters: json!({
                "discount_percent": discount,
                "validity_days": 7,
                "min_order_value": 500,
            }),
        });
    }

    // Stable sort keeps rule order within a priority tier.
    recommendations.sort_by_key(|r| Reverse(r.priority.rank()));
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityTrend;

    fn activity(ltv: f64) -> ActivityData {
        ActivityData {
            sessions: 3,
            clicks: 10,
            conversions: 0,
            revenue: ltv,
            last_activity_at: None,
            days_since_last_activity: 20,
            days_active: 3,
            frequency: 0.1,
            clicks_per_session: 3.3,
            conversion_rate: 0.0,
            lifetime_value: ltv,
            engagement_score: 10.0,
            trend: ActivityTrend::Decreasing,
        }
    }

    fn factor(name: &str, value: f64) -> RiskFactor {
        RiskFactor {
            factor: name.to_string(),
            weight: 0.2,
            value,
            impact: crate::models::FactorImpact::Negative,
            description: String::new(),
            category: String::new(),
        }
    }

    #[test]
    fn critical_inactivity_yields_urgent_engagement_campaign() {
        let factors = vec![factor("inactivity", 90.0)];
        let recs = generate_recommendations(&factors, RiskLevel::Critical, &activity(0.0));

        let campaign = recs
            .iter()
            .find(|r| r.kind == InterventionKind::EngagementCampaign)
            .unwrap();
        assert_eq!(campaign.priority, Priority::Urgent);
        assert_eq!(campaign.parameters["discount_percent"], 20.0);
    }

    #[test]
    fn vip_user_gets_support_outreach_unless_low_risk() {
        let factors = vec![factor("inactivity", 10.0)];

        let at_risk = generate_recommendations(&factors, RiskLevel::Medium, &activity(9000.0));
        assert!(at_risk
            .iter()
            .any(|r| r.kind == InterventionKind::SupportOutreach));

        let low = generate_recommendations(&factors, RiskLevel::Low, &activity(9000.0));
        assert!(!low
            .iter()
            .any(|r| r.kind == InterventionKind::SupportOutreach));
    }

    #[test]
    fn output_is_sorted_by_priority_rank() {
        let factors = vec![factor("inactivity", 80.0), factor("conversion_rate", 90.0)];
        let recs = generate_recommendations(&factors, RiskLevel::Critical, &activity(6000.0));

        assert!(recs.len() >= 3);
        for pair in recs.windows(2) {
            assert!(pair[0].priority.rank() >= pair[1].priority.rank());
        }
    }

    #[test]
    fn quiet_healthy_user_gets_nothing() {
        let factors = vec![
            factor("inactivity", 5.0),
            factor("conversion_rate", 10.0),
        ];
        let recs = generate_recommendations(&factors, RiskLevel::Low, &activity(100.0));
        assert!(recs.is_empty());
    }
}
