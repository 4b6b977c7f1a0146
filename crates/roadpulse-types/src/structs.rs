//! Core entity structs for the RoadPulse simulation.
//!
//! Field names follow the Rust data model; `serde` renames map them onto the
//! wire names the dashboard already consumes (`current_speed`,
//! `incident_id`, `type`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{
    IncidentStatus, IncidentType, RecommendationKind, RecommendationPriority, RoadClass,
};
use crate::ids::{IncidentId, SegmentId};

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A `[latitude, longitude]` pair in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Coordinate(pub f64, pub f64);

impl Coordinate {
    /// Latitude in degrees.
    pub const fn lat(self) -> f64 {
        self.0
    }

    /// Longitude in degrees.
    pub const fn lng(self) -> f64 {
        self.1
    }

    /// Linear interpolation towards `other`; `factor` 0 yields `self`,
    /// 1 yields `other`.
    pub fn lerp(self, other: Self, factor: f64) -> Self {
        Self(
            self.0 + (other.0 - self.0) * factor,
            self.1 + (other.1 - self.1) * factor,
        )
    }

    /// Whether both components are finite numbers.
    pub const fn is_finite(self) -> bool {
        self.0.is_finite() && self.1.is_finite()
    }
}

// ---------------------------------------------------------------------------
// Road network
// ---------------------------------------------------------------------------

/// A road segment of the static network. Immutable after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RoadSegment {
    /// Unique segment identifier.
    #[serde(rename = "segment_id")]
    pub id: SegmentId,
    /// Human-readable name.
    pub name: String,
    /// Functional class.
    #[serde(rename = "type")]
    pub class: RoadClass,
    /// Ordered polyline, at least two points.
    #[serde(rename = "coordinates")]
    pub geometry: Vec<Coordinate>,
    /// Segment length in kilometres (> 0).
    pub length_km: f64,
    /// Posted speed limit in km/h (> 0). Doubles as the free-flow speed.
    #[serde(rename = "speed_limit")]
    pub speed_limit_kph: u32,
}

impl RoadSegment {
    /// First point of the geometry.
    pub fn start(&self) -> Option<Coordinate> {
        self.geometry.first().copied()
    }

    /// Last point of the geometry.
    pub fn end(&self) -> Option<Coordinate> {
        self.geometry.last().copied()
    }
}

// ---------------------------------------------------------------------------
// Measurements
// ---------------------------------------------------------------------------

/// One synthesized measurement for a segment at a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TrafficSample {
    /// The measured segment.
    pub segment_id: SegmentId,
    /// Observed speed in km/h, `0 ..= free_flow_speed_kph`.
    #[serde(rename = "current_speed")]
    pub current_speed_kph: u32,
    /// Free-flow speed (the segment speed limit) in km/h.
    #[serde(rename = "free_flow_speed")]
    pub free_flow_speed_kph: u32,
    /// Normalized congestion in `[0, 1]`.
    pub congestion_level: f64,
    /// Travel time across the segment in minutes, one decimal.
    pub travel_time_minutes: f64,
    /// When the sample was taken.
    #[serde(rename = "timestamp")]
    pub sampled_at: DateTime<Utc>,
}

/// A traffic incident attached (usually) to a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Incident {
    /// Unique incident identifier.
    #[serde(rename = "incident_id")]
    pub id: IncidentId,
    /// Segment the incident lies on, if any.
    pub segment_id: Option<SegmentId>,
    /// Incident kind.
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    /// Severity from 1 (low) to 5 (critical).
    pub severity: u8,
    /// Free-text description.
    pub description: String,
    /// Position of the incident.
    pub location: Coordinate,
    /// When the incident started.
    pub start_time: DateTime<Utc>,
    /// Expected clearance time, strictly after `start_time`.
    pub end_time: DateTime<Utc>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: IncidentStatus,
}

impl Incident {
    /// Whether the incident is still active.
    pub fn is_active(&self) -> bool {
        self.status == IncidentStatus::Active
    }

    /// Whether the expected clearance time has passed at `now`.
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        self.end_time <= now
    }
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// Count of segments per congestion band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SeverityDistribution {
    /// Segments with congestion `< 0.2`.
    pub free: u32,
    /// Segments with congestion in `[0.2, 0.4)`.
    pub light: u32,
    /// Segments with congestion in `[0.4, 0.7)`.
    pub moderate: u32,
    /// Segments with congestion `>= 0.7`.
    pub heavy: u32,
}

/// Network-wide aggregate of a set of samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NetworkSummary {
    /// Number of samples aggregated.
    pub total_segments: u32,
    /// Mean congestion, two decimals.
    pub average_congestion: f64,
    /// Mean current speed in km/h, rounded.
    pub average_speed: u32,
    /// Histogram of congestion bands.
    pub severity_distribution: SeverityDistribution,
}

/// Typical congestion for the hour a tick ran in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct HourlyTrend {
    /// Hour of day, `0..24`.
    pub hour: u32,
    /// Baseline congestion for that hour.
    pub typical_congestion: f64,
}

/// An actionable hint derived from the network summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Recommendation {
    /// Recommendation category.
    #[serde(rename = "type")]
    pub kind: RecommendationKind,
    /// Urgency.
    pub priority: RecommendationPriority,
    /// Human-readable message.
    pub message: String,
    /// Suggested client-side actions.
    pub actions: Vec<String>,
}

/// Short-horizon projection of network congestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Prediction {
    /// The hour being projected, `0..24`.
    pub next_hour: u32,
    /// Projected average congestion for that hour, in `[0, 1]`.
    pub next_hour_congestion: f64,
    /// Recommendations for observers.
    pub recommendations: Vec<Recommendation>,
}

/// Analytics-oriented transform of a tick, published on `analytics-updates`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AnalyticsReport {
    /// When the underlying tick ran.
    pub timestamp: DateTime<Utc>,
    /// Tick sequence number.
    pub tick: u64,
    /// Aggregate of the tick's samples.
    pub real_time: NetworkSummary,
    /// Baseline for the current hour.
    pub hourly_trend: HourlyTrend,
    /// Next-hour projection and recommendations.
    pub predictions: Prediction,
    /// Active incidents held in the state cache after the tick.
    pub active_incidents: u32,
}

/// One hourly aggregate returned by historical queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct HistoricalRecord {
    /// Start of the hour bucket.
    pub hour_start: DateTime<Utc>,
    /// Mean current speed in km/h.
    pub avg_speed: f64,
    /// Mean congestion level.
    pub avg_congestion: f64,
    /// Number of samples in the bucket.
    pub sample_count: u64,
}
