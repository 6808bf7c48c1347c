use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Timelike, Utc};
use uuid::Uuid;

use dealgrid_core::{ClickEvent, ConversionEvent, TrafficStore};

use crate::activity::{classify_trend, group_sessions};
use crate::models::{
    ActivityAnomaly, ActivityMetrics, ActivityMonitoring, ActivityTrend, AnomalyKind,
    BehaviorPattern, ChannelUsage, ChurnRiskConfig, EngagementTrend, Severity, TrendDirection,
    UserStatus,
};
use crate::store::RiskStore;
use crate::RiskError;

/// Monitoring window, fixed at 30 days.
const WINDOW_DAYS: i64 = 30;

/// Inactive streak above this raises a sudden-drop anomaly.
const STREAK_ANOMALY_DAYS: u32 = 7;

/// Computes behavioral health for one user: metrics, patterns, trends,
/// anomalies, a 0-100 health score and a lifecycle status. Persists one
/// snapshot per call and acts as the second escalation trigger source,
/// independent of risk scoring.
pub struct ActivityMonitor {
    traffic: Arc<dyn TrafficStore>,
    store: Arc<dyn RiskStore>,
    config: ChurnRiskConfig,
}

impl ActivityMonitor {
    pub fn new(
        traffic: Arc<dyn TrafficStore>,
        store: Arc<dyn RiskStore>,
        config: ChurnRiskConfig,
    ) -> Self {
        Self {
            traffic,
            store,
            config,
        }
    }

    pub async fn monitor_user_activity(
        &self,
        user_id: &str,
    ) -> Result<ActivityMonitoring, RiskError> {
        let now = Utc::now();
        let from = now - Duration::days(WINDOW_DAYS);

        let clicks = self.traffic.clicks(user_id, from, now).await?;
        let conversions = self.traffic.conversions(user_id, from, now).await?;
        let previous = self.store.latest_monitoring(user_id).await?;

        let snapshot = build_snapshot(
            user_id,
            &clicks,
            &conversions,
            previous.as_ref().map(|p| p.status),
            &self.config,
            from,
            now,
        );

        self.store.save_monitoring(&snapshot).await?;

        tracing::info!(
            user_id,
            health = snapshot.health_score,
            status = ?snapshot.status,
            anomalies = snapshot.anomalies.len(),
            "activity snapshot recorded"
        );

        Ok(snapshot)
    }
}

/// Pure snapshot construction; `now` is a parameter for test determinism.
pub fn build_snapshot(
    user_id: &str,
    clicks: &[ClickEvent],
    conversions: &[ConversionEvent],
    previous_status: Option<UserStatus>,
    config: &ChurnRiskConfig,
    period_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ActivityMonitoring {
    let metrics = compute_metrics(clicks, conversions, period_start, now);
    let trend = classify_trend(clicks, now, WINDOW_DAYS);
    let patterns = detect_patterns(clicks, &metrics, trend, config);
    let trends = compute_trends(clicks, conversions, period_start, now);
    let anomalies = detect_anomalies(&metrics, now);
    let health_score = health_score(&metrics, &anomalies);
    let status = classify_status(health_score, &anomalies, previous_status);

    ActivityMonitoring {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        period_start,
        period_end: now,
        metrics,
        patterns,
        trends,
        anomalies,
        health_score,
        status,
        last_updated: now,
    }
}

fn compute_metrics(
    clicks: &[ClickEvent],
    conversions: &[ConversionEvent],
    period_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ActivityMetrics {
    let sessions = group_sessions(clicks);

    let mut active_day_indices: Vec<i64> = clicks
        .iter()
        .map(|c| (c.occurred_at - period_start).num_days())
        .collect();
    active_day_indices.sort_unstable();
    active_day_indices.dedup();

    let days_active = active_day_indices.len() as u32;
    let days_inactive = (WINDOW_DAYS as u32).saturating_sub(days_active);

    let longest_inactive_streak = longest_inactive_streak(&active_day_indices, WINDOW_DAYS);

    let avg_session_duration_minutes = if sessions.is_empty() {
        0.0
    } else {
        let total: i64 = sessions
            .iter()
            .map(|s| (s.ended_at - s.started_at).num_minutes())
            .sum();
        total as f64 / sessions.len() as f64
    };

    let avg_hours_between_sessions = if sessions.len() > 1 {
        let total: i64 = sessions
            .windows(2)
            .map(|pair| (pair[1].started_at - pair[0].ended_at).num_minutes())
            .sum();
        total as f64 / 60.0 / (sessions.len() - 1) as f64
    } else {
        0.0
    };

    let mut hour_histogram = [0u64; 24];
    for click in clicks {
        hour_histogram[click.occurred_at.hour() as usize] += 1;
    }
    let peak_activity_hour = hour_histogram
        .iter()
        .enumerate()
        .max_by_key(|(_, count)| **count)
        .map(|(hour, _)| hour as u8)
        .unwrap_or(0);

    let mut channel_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut device_distribution: BTreeMap<String, u64> = BTreeMap::new();
    let mut location_distribution: BTreeMap<String, u64> = BTreeMap::new();
    for click in clicks {
        *channel_counts.entry(click.source.clone()).or_default() += 1;
        if let Some(device) = &click.device {
            *device_distribution.entry(device.clone()).or_default() += 1;
        }
        if let Some(location) = &click.location {
            *location_distribution.entry(location.clone()).or_default() += 1;
        }
    }
    let mut top_channels: Vec<ChannelUsage> = channel_counts
        .into_iter()
        .map(|(source, count)| ChannelUsage { source, count })
        .collect();
    top_channels.sort_by(|a, b| b.count.cmp(&a.count));
    top_channels.truncate(3);

    let conversion_rate = if clicks.is_empty() {
        0.0
    } else {
        conversions.len() as f64 / clicks.len() as f64 * 100.0
    };

    ActivityMetrics {
        total_sessions: sessions.len() as u32,
        total_clicks: clicks.len() as u32,
        total_conversions: conversions.len() as u32,
        total_revenue: conversions.iter().map(|c| c.order_value).sum(),
        days_active,
        days_inactive,
        longest_inactive_streak,
        avg_session_duration_minutes,
        avg_hours_between_sessions,
        peak_activity_hour,
        top_channels,
        device_distribution,
        location_distribution,
        conversion_rate,
    }
}

/// Single forward scan over sorted active-day indices: the longest quiet
/// stretch is the max of internal gaps between consecutive active days
/// (minus one) and the trailing gap from the last active day to window end.
fn longest_inactive_streak(active_day_indices: &[i64], window_days: i64) -> u32 {
    let Some(&last) = active_day_indices.last() else {
        return window_days as u32;
    };

    let mut longest: i64 = 0;
    for pair in active_day_indices.windows(2) {
        longest = longest.max(pair[1] - pair[0] - 1);
    }
    longest = longest.max(window_days - last);

    longest.max(0) as u32
}

fn detect_patterns(
    clicks: &[ClickEvent],
    metrics: &ActivityMetrics,
    trend: ActivityTrend,
    config: &ChurnRiskConfig,
) -> Vec<BehaviorPattern> {
    // Too few active days to call anything a habit.
    if metrics.days_active < config.minimum_activity_days || clicks.is_empty() {
        return Vec::new();
    }

    let direction = match trend {
        ActivityTrend::Increasing => TrendDirection::Up,
        ActivityTrend::Stable => TrendDirection::Flat,
        ActivityTrend::Decreasing | ActivityTrend::Inactive => TrendDirection::Down,
    };

    let mut patterns = Vec::new();
    let total = clicks.len() as f64;

    let peak_count = clicks
        .iter()
        .filter(|c| c.occurred_at.hour() as u8 == metrics.peak_activity_hour)
        .count() as u64;
    let peak_share = peak_count as f64 / total;
    if peak_share > 0.3 {
        patterns.push(BehaviorPattern {
            kind: "hourly_routine".to_string(),
            description: format!(
                "browses around {:02}:00 on most visits",
                metrics.peak_activity_hour
            ),
            frequency: peak_count,
            strength: peak_share,
            trend: direction,
            predictability: peak_share.min(1.0),
        });
    }

    if let Some(top) = metrics.top_channels.first() {
        let share = top.count as f64 / total;
        if share > 0.5 {
            patterns.push(BehaviorPattern {
                kind: "channel_affinity".to_string(),
                description: format!("{} carries most of this user's traffic", top.source),
                frequency: top.count,
                strength: share,
                trend: direction,
                predictability: share.min(1.0),
            });
        }
    }

    patterns
}

fn compute_trends(
    clicks: &[ClickEvent],
    conversions: &[ConversionEvent],
    period_start: DateTime<Utc>,
    _now: DateTime<Utc>,
) -> Vec<EngagementTrend> {
    let click_series = daily_series(clicks.iter().map(|c| c.occurred_at), period_start);
    let conversion_series = daily_series(conversions.iter().map(|c| c.occurred_at), period_start);

    [("clicks", click_series), ("conversions", conversion_series)]
        .into_iter()
        .filter_map(|(metric, series)| {
            let (slope, correlation) = least_squares(&series)?;
            let direction = if slope > 0.01 {
                TrendDirection::Up
            } else if slope < -0.01 {
                TrendDirection::Down
            } else {
                TrendDirection::Flat
            };
            Some(EngagementTrend {
                metric: metric.to_string(),
                direction,
                slope,
                correlation,
                significance: correlation.abs(),
            })
        })
        .collect()
}

fn daily_series(
    timestamps: impl Iterator<Item = DateTime<Utc>>,
    period_start: DateTime<Utc>,
) -> Vec<f64> {
    let mut series = vec![0.0; WINDOW_DAYS as usize];
    for t in timestamps {
        let index = (t - period_start).num_days();
        if (0..WINDOW_DAYS).contains(&index) {
            series[index as usize] += 1.0;
        }
    }
    series
}

/// Least-squares slope and Pearson correlation of a daily series against
/// its day index. Returns None for a flat-zero series.
fn least_squares(series: &[f64]) -> Option<(f64, f64)> {
    let n = series.len() as f64;
    if n < 2.0 || series.iter().all(|v| *v == 0.0) {
        return None;
    }

    let mean_x = (n - 1.0) / 2.0;
    let mean_y = series.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (i, y) in series.iter().enumerate() {
        let dx = i as f64 - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let slope = cov / var_x;
    let correlation = if var_y == 0.0 {
        0.0
    } else {
        cov / (var_x.sqrt() * var_y.sqrt())
    };

    Some((slope, correlation))
}

fn detect_anomalies(metrics: &ActivityMetrics, now: DateTime<Utc>) -> Vec<ActivityAnomaly> {
    let mut anomalies = Vec::new();

    if metrics.longest_inactive_streak > STREAK_ANOMALY_DAYS {
        let severity = if metrics.longest_inactive_streak > 14 {
            Severity::High
        } else {
            Severity::Medium
        };
        // Expected quiet stretch for a user active on `days_active` days.
        let expected = if metrics.days_active > 0 {
            (WINDOW_DAYS as f64 / metrics.days_active as f64).min(7.0)
        } else {
            7.0
        };
        let actual = metrics.longest_inactive_streak as f64;
        anomalies.push(ActivityAnomaly {
            kind: AnomalyKind::SuddenDrop,
            severity,
            description: format!(
                "{} consecutive quiet days inside the window",
                metrics.longest_inactive_streak
            ),
            expected_value: expected,
            actual_value: actual,
            deviation: actual - expected,
            confidence: if severity == Severity::High { 0.9 } else { 0.7 },
            possible_causes: vec![
                "deal fatigue".to_string(),
                "switched to another channel".to_string(),
                "seasonal absence".to_string(),
            ],
            detected_at: now,
        });
    }

    if metrics.total_clicks >= 30 && metrics.total_conversions == 0 {
        anomalies.push(ActivityAnomaly {
            kind: AnomalyKind::ConversionStall,
            severity: Severity::Low,
            description: "heavy browsing with no purchase in the window".to_string(),
            expected_value: metrics.total_clicks as f64 * 0.02,
            actual_value: 0.0,
            deviation: -(metrics.total_clicks as f64 * 0.02),
            confidence: 0.6,
            possible_causes: vec![
                "deals not matching intent".to_string(),
                "price sensitivity".to_string(),
            ],
            detected_at: now,
        });
    }

    anomalies
}

fn health_score(metrics: &ActivityMetrics, anomalies: &[ActivityAnomaly]) -> u8 {
    let mut score: f64 = 100.0;

    if metrics.days_inactive > metrics.days_active {
        score -= 30.0;
    }
    if metrics.longest_inactive_streak > STREAK_ANOMALY_DAYS {
        score -= 20.0;
    }
    if metrics.conversion_rate < 2.0 {
        score -= 15.0;
    }
    if metrics.total_sessions < 5 {
        score -= 10.0;
    }

    for anomaly in anomalies {
        score -= match anomaly.severity {
            Severity::High => 15.0,
            Severity::Medium => 10.0,
            Severity::Low => 5.0,
        };
    }

    score.clamp(0.0, 100.0) as u8
}

fn classify_status(
    health_score: u8,
    anomalies: &[ActivityAnomaly],
    previous_status: Option<UserStatus>,
) -> UserStatus {
    let has_high_anomaly = anomalies.iter().any(|a| a.severity == Severity::High);

    let computed = if health_score >= 80 {
        UserStatus::Active
    } else if health_score >= 60 {
        UserStatus::AtRisk
    } else if health_score >= 30 || has_high_anomaly {
        UserStatus::Churning
    } else {
        UserStatus::Churned
    };

    // A user climbing back from the churn tiers is worth flagging distinctly.
    match (previous_status, computed) {
        (Some(UserStatus::Churning) | Some(UserStatus::Churned), UserStatus::Active)
        | (Some(UserStatus::Churning) | Some(UserStatus::Churned), UserStatus::AtRisk) => {
            UserStatus::Reactivated
        }
        _ => computed,
    }
}
