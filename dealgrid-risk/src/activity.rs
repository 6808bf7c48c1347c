use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use dealgrid_core::{ClickEvent, TrafficStore};

use crate::models::{ActivityData, ActivityTrend, ChurnRiskConfig};
use crate::RiskError;

/// A contiguous run of clicks with no gap above the session boundary.
#[derive(Debug, Clone)]
pub struct Session {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub clicks: u32,
}

/// Gap between clicks that starts a new session.
const SESSION_GAP_MINUTES: i64 = 30;

/// Turns raw click/conversion events into a normalized `ActivityData`
/// snapshot for a lookback window.
pub struct ActivityAggregator {
    traffic: Arc<dyn TrafficStore>,
}

impl ActivityAggregator {
    pub fn new(traffic: Arc<dyn TrafficStore>) -> Self {
        Self { traffic }
    }

    pub async fn collect(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        config: &ChurnRiskConfig,
    ) -> Result<ActivityData, RiskError> {
        let from = now - Duration::days(config.lookback_days);
        let clicks = self.traffic.clicks(user_id, from, now).await?;
        let conversions = self.traffic.conversions(user_id, from, now).await?;

        if clicks.is_empty() && conversions.is_empty() {
            return Err(RiskError::NoActivityData(user_id.to_string()));
        }

        let sessions = group_sessions(&clicks);
        let revenue: f64 = conversions.iter().map(|c| c.order_value).sum();

        let last_click = clicks.iter().map(|c| c.occurred_at).max();
        let last_conversion = conversions.iter().map(|c| c.occurred_at).max();
        let last_activity_at = last_click.max(last_conversion);
        let days_since_last_activity = last_activity_at
            .map(|t| (now - t).num_days().max(0))
            .unwrap_or(config.lookback_days);

        let days_active = distinct_active_days(&clicks);
        let session_count = sessions.len() as u32;
        let click_count = clicks.len() as u32;
        let conversion_count = conversions.len() as u32;

        let frequency = session_count as f64 / config.lookback_days as f64;
        let clicks_per_session = if session_count > 0 {
            click_count as f64 / session_count as f64
        } else {
            0.0
        };
        let conversion_rate = if click_count > 0 {
            conversion_count as f64 / click_count as f64 * 100.0
        } else {
            0.0
        };

        let engagement_score = engagement_score(
            session_count,
            click_count,
            conversion_count,
            days_since_last_activity,
            config.engagement_decay_rate,
        );

        let trend = classify_trend(&clicks, now, config.lookback_days);

        Ok(ActivityData {
            sessions: session_count,
            clicks: click_count,
            conversions: conversion_count,
            revenue,
            last_activity_at,
            days_since_last_activity,
            days_active,
            frequency,
            clicks_per_session,
            conversion_rate,
            lifetime_value: revenue,
            engagement_score,
            trend,
        })
    }
}

/// Group clicks into sessions: a gap of 30+ minutes starts a new one.
pub fn group_sessions(clicks: &[ClickEvent]) -> Vec<Session> {
    let mut times: Vec<DateTime<Utc>> = clicks.iter().map(|c| c.occurred_at).collect();
    times.sort_unstable();

    let mut sessions: Vec<Session> = Vec::new();
    let gap = Duration::minutes(SESSION_GAP_MINUTES);

    for t in times {
        match sessions.last_mut() {
            Some(current) if t - current.ended_at < gap => {
                current.ended_at = t;
                current.clicks += 1;
            }
            _ => sessions.push(Session {
                started_at: t,
                ended_at: t,
                clicks: 1,
            }),
        }
    }

    sessions
}

pub fn distinct_active_days(clicks: &[ClickEvent]) -> u32 {
    let mut days: Vec<_> = clicks.iter().map(|c| c.occurred_at.date_naive()).collect();
    days.sort_unstable();
    days.dedup();
    days.len() as u32
}

/// Capped-component engagement score, clamped to [0, 100].
pub fn engagement_score(
    sessions: u32,
    clicks: u32,
    conversions: u32,
    days_since_last_activity: i64,
    decay_rate: f64,
) -> f64 {
    let session_part = (sessions as f64 * 2.0).min(30.0);
    let click_part = (clicks as f64 * 0.5).min(30.0);
    let conversion_part = (conversions as f64 * 5.0).min(25.0);
    let recency_part = (15.0 - days_since_last_activity as f64 * decay_rate).max(0.0);

    (session_part + click_part + conversion_part + recency_part).clamp(0.0, 100.0)
}

/// Compare the click rate of the most recent 7 days against the rest of the
/// window: `Increasing` above 1.2x, `Decreasing` below 0.8x, else `Stable`.
/// No clicks at all maps to `Inactive`.
pub fn classify_trend(clicks: &[ClickEvent], now: DateTime<Utc>, lookback_days: i64) -> ActivityTrend {
    if clicks.is_empty() {
        return ActivityTrend::Inactive;
    }

    let recent_cutoff = now - Duration::days(7);
    let recent = clicks.iter().filter(|c| c.occurred_at >= recent_cutoff).count() as f64;
    let older = clicks.len() as f64 - recent;

    let older_days = (lookback_days - 7).max(1) as f64;
    let recent_rate = recent / 7.0;
    let older_rate = older / older_days;

    if older_rate == 0.0 {
        // All activity inside the last week.
        return if recent > 0.0 {
            ActivityTrend::Increasing
        } else {
            ActivityTrend::Stable
        };
    }

    let ratio = recent_rate / older_rate;
    if ratio > 1.2 {
        ActivityTrend::Increasing
    } else if ratio < 0.8 {
        ActivityTrend::Decreasing
    } else {
        ActivityTrend::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click_at(now: DateTime<Utc>, minutes_ago: i64) -> ClickEvent {
        ClickEvent::new("u-1", "telegram", now - Duration::minutes(minutes_ago))
    }

    #[test]
    fn clicks_within_thirty_minutes_share_a_session() {
        let now = Utc::now();
        let clicks = vec![click_at(now, 0), click_at(now, 10), click_at(now, 25)];

        let sessions = group_sessions(&clicks);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].clicks, 3);
    }

    #[test]
    fn thirty_minute_gap_starts_a_new_session() {
        let now = Utc::now();
        let clicks = vec![click_at(now, 0), click_at(now, 31), click_at(now, 200)];

        let sessions = group_sessions(&clicks);
        assert_eq!(sessions.len(), 3);
    }

    #[test]
    fn engagement_components_are_capped() {
        // 100 sessions would contribute 200 uncapped; each part is capped.
        let score = engagement_score(100, 1000, 50, 0, 1.0);
        assert_eq!(score, 30.0 + 30.0 + 25.0 + 15.0);
    }

    #[test]
    fn engagement_recency_term_decays_to_zero() {
        let fresh = engagement_score(2, 4, 0, 0, 1.0);
        let stale = engagement_score(2, 4, 0, 40, 1.0);
        assert!(fresh > stale);
        // 40 days out, the recency term is fully decayed.
        assert_eq!(stale, 4.0 + 2.0);
    }

    #[test]
    fn trend_is_inactive_without_clicks() {
        assert_eq!(classify_trend(&[], Utc::now(), 30), ActivityTrend::Inactive);
    }

    #[test]
    fn trend_detects_recent_surge() {
        let now = Utc::now();
        // 10 clicks this week, 2 clicks across the previous 23 days.
        let mut clicks: Vec<ClickEvent> = (0..10).map(|i| click_at(now, i * 60)).collect();
        clicks.push(click_at(now, 60 * 24 * 20));
        clicks.push(click_at(now, 60 * 24 * 25));

        assert_eq!(classify_trend(&clicks, now, 30), ActivityTrend::Increasing);
    }

    #[test]
    fn trend_detects_decay() {
        let now = Utc::now();
        // Zero clicks this week, plenty earlier in the window.
        let clicks: Vec<ClickEvent> = (0..12)
            .map(|i| click_at(now, 60 * 24 * (10 + i)))
            .collect();

        assert_eq!(classify_trend(&clicks, now, 30), ActivityTrend::Decreasing);
    }
}
