//! Aggregates and projections derived from a tick.
//!
//! Everything here is a pure function of its inputs: the pipeline feeds it the
//! tick's samples and the cache's incident count, and publishes the resulting
//! [`AnalyticsReport`] on `analytics-updates`.

use chrono::{DateTime, Utc};
use roadpulse_types::{
    AnalyticsReport, CongestionBand, HourlyTrend, NetworkSummary, Prediction, Recommendation,
    RecommendationKind, RecommendationPriority, SeverityDistribution, TrafficSample,
};

use crate::congestion::{base_congestion, next_hour};

/// Average congestion above which a `congestion_alert` is raised.
const CONGESTION_ALERT_THRESHOLD: f64 = 0.7;

/// Share of heavy segments above which an `incident_alert` is raised.
const HEAVY_SHARE_THRESHOLD: f64 = 0.3;

/// Weight of the baseline pull in the next-hour projection.
const PROJECTION_WEIGHT: f64 = 0.5;

/// Aggregate a set of samples into a [`NetworkSummary`].
///
/// Average congestion is rounded to two decimals and average speed to the
/// nearest km/h. An empty input yields an all-zero summary.
pub fn summarize(samples: &[TrafficSample]) -> NetworkSummary {
    let total_segments = u32::try_from(samples.len()).unwrap_or(u32::MAX);
    if total_segments == 0 {
        return NetworkSummary::default();
    }

    let mut congestion_sum = 0.0;
    let mut speed_sum = 0.0;
    let mut distribution = SeverityDistribution::default();

    for sample in samples {
        congestion_sum += sample.congestion_level;
        speed_sum += f64::from(sample.current_speed_kph);
        let bucket = match CongestionBand::classify(sample.congestion_level) {
            CongestionBand::Free => &mut distribution.free,
            CongestionBand::Light => &mut distribution.light,
            CongestionBand::Moderate => &mut distribution.moderate,
            CongestionBand::Heavy => &mut distribution.heavy,
        };
        *bucket = bucket.saturating_add(1);
    }

    let count = f64::from(total_segments);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let average_speed = (speed_sum / count).round().max(0.0) as u32;

    NetworkSummary {
        total_segments,
        average_congestion: ((congestion_sum / count) * 100.0).round() / 100.0,
        average_speed,
        severity_distribution: distribution,
    }
}

/// Projected network congestion for the hour after `hour`.
///
/// Moves the current average halfway towards the next hour's baseline and
/// clamps to `[0, 1]`, two decimals.
pub fn project_next_hour(current: f64, hour: u32) -> f64 {
    let target = base_congestion(next_hour(hour));
    let projected = (current + (target - current) * PROJECTION_WEIGHT).clamp(0.0, 1.0);
    (projected * 100.0).round() / 100.0
}

/// Recommendations for a network summary, most urgent first.
pub fn recommendations(summary: &NetworkSummary) -> Vec<Recommendation> {
    let mut out = Vec::with_capacity(3);

    let heavy_limit = f64::from(summary.total_segments) * HEAVY_SHARE_THRESHOLD;
    if f64::from(summary.severity_distribution.heavy) > heavy_limit {
        out.push(recommendation(
            RecommendationKind::IncidentAlert,
            RecommendationPriority::Critical,
            "Multiple heavy congestion areas detected.",
            &["incident_avoidance", "real_time_updates"],
        ));
    }

    if summary.average_congestion > CONGESTION_ALERT_THRESHOLD {
        out.push(recommendation(
            RecommendationKind::CongestionAlert,
            RecommendationPriority::High,
            "High congestion detected. Consider alternative routes.",
            &["route_alternatives", "departure_delay"],
        ));
    }

    out.push(recommendation(
        RecommendationKind::Optimization,
        RecommendationPriority::Medium,
        "Monitor traffic patterns for optimal route planning.",
        &["pattern_analysis", "predictive_routing"],
    ));

    out
}

fn recommendation(
    kind: RecommendationKind,
    priority: RecommendationPriority,
    message: &str,
    actions: &[&str],
) -> Recommendation {
    Recommendation {
        kind,
        priority,
        message: message.to_owned(),
        actions: actions.iter().map(|&a| a.to_owned()).collect(),
    }
}

/// Build the analytics report for a tick.
pub fn build_report(
    tick: u64,
    timestamp: DateTime<Utc>,
    hour: u32,
    summary: NetworkSummary,
    active_incidents: u32,
) -> AnalyticsReport {
    let predictions = Prediction {
        next_hour: next_hour(hour),
        next_hour_congestion: project_next_hour(summary.average_congestion, hour),
        recommendations: recommendations(&summary),
    };

    AnalyticsReport {
        timestamp,
        tick,
        real_time: summary,
        hourly_trend: HourlyTrend {
            hour: hour % 24,
            typical_congestion: base_congestion(hour),
        },
        predictions,
        active_incidents,
    }
}

#[cfg(test)]
mod tests {
    use roadpulse_types::SegmentId;

    use super::*;

    fn sample(congestion_level: f64, speed: u32) -> TrafficSample {
        TrafficSample {
            segment_id: SegmentId::new("s"),
            current_speed_kph: speed,
            free_flow_speed_kph: 100,
            congestion_level,
            travel_time_minutes: 1.0,
            sampled_at: Utc::now(),
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn summary_of_empty_input_is_zero() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_segments, 0);
        assert_eq!(summary.average_speed, 0);
        assert!(approx(summary.average_congestion, 0.0));
    }

    #[test]
    fn summary_buckets_by_band() {
        let samples = [
            sample(0.1, 90),
            sample(0.3, 70),
            sample(0.5, 50),
            sample(0.9, 10),
        ];
        let summary = summarize(&samples);
        assert_eq!(summary.total_segments, 4);
        assert_eq!(summary.average_speed, 55);
        assert!(approx(summary.average_congestion, 0.45));
        assert_eq!(
            summary.severity_distribution,
            SeverityDistribution {
                free: 1,
                light: 1,
                moderate: 1,
                heavy: 1,
            }
        );
    }

    #[test]
    fn projection_pulls_towards_next_baseline() {
        // 08 -> 09 baseline 0.75; halfway from 0.25 is 0.5.
        assert!(approx(project_next_hour(0.25, 8), 0.5));
        // 23 -> 00 baseline 0.10.
        assert!(approx(project_next_hour(0.3, 23), 0.2));
        for hour in 0..24 {
            for current in [0.0, 0.5, 1.0] {
                assert!((0.0..=1.0).contains(&project_next_hour(current, hour)));
            }
        }
    }

    #[test]
    fn calm_network_only_gets_optimization_hint() {
        let summary = summarize(&[sample(0.1, 90), sample(0.2, 80)]);
        let recs = recommendations(&summary);
        assert_eq!(recs.len(), 1);
        assert!(recs
            .iter()
            .all(|r| r.kind == RecommendationKind::Optimization));
    }

    #[test]
    fn gridlocked_network_raises_alerts() {
        let summary = summarize(&[sample(0.9, 10), sample(0.8, 20), sample(0.75, 25)]);
        let kinds: Vec<RecommendationKind> =
            recommendations(&summary).iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RecommendationKind::IncidentAlert,
                RecommendationKind::CongestionAlert,
                RecommendationKind::Optimization,
            ]
        );
    }

    #[test]
    fn report_carries_tick_and_trend() {
        let summary = summarize(&[sample(0.4, 60)]);
        let report = build_report(7, Utc::now(), 17, summary, 3);
        assert_eq!(report.tick, 7);
        assert_eq!(report.hourly_trend.hour, 17);
        assert!(approx(report.hourly_trend.typical_congestion, 0.85));
        assert_eq!(report.predictions.next_hour, 18);
        assert_eq!(report.active_incidents, 3);
    }
}
