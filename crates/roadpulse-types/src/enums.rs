//! Enumeration types for the RoadPulse simulation.
//!
//! Road classes, incident taxonomy, broker topics and the congestion bands
//! used by the analytics histogram.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Road network
// ---------------------------------------------------------------------------

/// Functional class of a road segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum RoadClass {
    /// Limited-access highway or bridge approach.
    Highway,
    /// Urban arterial road.
    Arterial,
    /// Residential street.
    Residential,
}

impl RoadClass {
    /// Wire name of the class (`highway`, `arterial`, `residential`).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Highway => "highway",
            Self::Arterial => "arterial",
            Self::Residential => "residential",
        }
    }
}

// ---------------------------------------------------------------------------
// Incidents
// ---------------------------------------------------------------------------

/// Kind of traffic incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum IncidentType {
    /// Vehicle collision.
    Accident,
    /// Road works or maintenance.
    Construction,
    /// Full or partial road closure.
    Closure,
    /// Adverse weather conditions.
    Weather,
    /// Traffic caused by a scheduled event.
    Event,
}

impl IncidentType {
    /// Every incident type, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Accident,
        Self::Construction,
        Self::Closure,
        Self::Weather,
        Self::Event,
    ];

    /// Wire name of the incident type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accident => "accident",
            Self::Construction => "construction",
            Self::Closure => "closure",
            Self::Weather => "weather",
            Self::Event => "event",
        }
    }
}

/// Lifecycle status of an incident.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    /// The incident is ongoing.
    #[default]
    Active,
    /// The incident has been cleared.
    Resolved,
}

// ---------------------------------------------------------------------------
// Broker topics
// ---------------------------------------------------------------------------

/// Named broadcast channel that connections opt into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum Topic {
    /// Per-tick traffic samples for every segment.
    #[serde(rename = "traffic-updates")]
    TrafficUpdates,
    /// Incidents produced by a tick.
    #[serde(rename = "incident-updates")]
    IncidentUpdates,
    /// Aggregated analytics derived from a tick.
    #[serde(rename = "analytics-updates")]
    AnalyticsUpdates,
}

impl Topic {
    /// Every topic, in declaration order.
    pub const ALL: [Self; 3] = [
        Self::TrafficUpdates,
        Self::IncidentUpdates,
        Self::AnalyticsUpdates,
    ];

    /// Wire-level topic name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TrafficUpdates => "traffic-updates",
            Self::IncidentUpdates => "incident-updates",
            Self::AnalyticsUpdates => "analytics-updates",
        }
    }
}

impl core::fmt::Display for Topic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a [`Topic`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTopic(pub String);

impl core::fmt::Display for UnknownTopic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "unknown topic: {}", self.0)
    }
}

impl std::error::Error for UnknownTopic {}

impl core::str::FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s.trim())
            .ok_or_else(|| UnknownTopic(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

/// Congestion band used by the severity histogram.
///
/// | Band | Congestion level |
/// |------|------------------|
/// | Free | `< 0.2` |
/// | Light | `0.2 ..< 0.4` |
/// | Moderate | `0.4 ..< 0.7` |
/// | Heavy | `>= 0.7` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum CongestionBand {
    /// Free-flowing traffic.
    Free,
    /// Light congestion.
    Light,
    /// Moderate congestion.
    Moderate,
    /// Heavy congestion.
    Heavy,
}

impl CongestionBand {
    /// Classify a congestion level into its band.
    pub fn classify(level: f64) -> Self {
        if level < 0.2 {
            Self::Free
        } else if level < 0.4 {
            Self::Light
        } else if level < 0.7 {
            Self::Moderate
        } else {
            Self::Heavy
        }
    }
}

/// Urgency attached to an analytics recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum RecommendationPriority {
    /// Informational.
    Medium,
    /// Observers should act.
    High,
    /// Network-wide problem.
    Critical,
}

/// Category of an analytics recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    /// Average congestion is high across the network.
    CongestionAlert,
    /// A large share of segments is heavily congested.
    IncidentAlert,
    /// Routine monitoring advice.
    Optimization,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_wire_names_roundtrip() {
        for topic in Topic::ALL {
            let json = serde_json::to_string(&topic).ok();
            assert_eq!(json, Some(format!("\"{}\"", topic.as_str())));
            assert_eq!(topic.as_str().parse::<Topic>(), Ok(topic));
        }
    }

    #[test]
    fn unknown_topic_is_rejected() {
        assert!("weather-updates".parse::<Topic>().is_err());
    }

    #[test]
    fn congestion_band_thresholds() {
        assert_eq!(CongestionBand::classify(0.0), CongestionBand::Free);
        assert_eq!(CongestionBand::classify(0.19), CongestionBand::Free);
        assert_eq!(CongestionBand::classify(0.2), CongestionBand::Light);
        assert_eq!(CongestionBand::classify(0.4), CongestionBand::Moderate);
        assert_eq!(CongestionBand::classify(0.69), CongestionBand::Moderate);
        assert_eq!(CongestionBand::classify(0.7), CongestionBand::Heavy);
        assert_eq!(CongestionBand::classify(1.0), CongestionBand::Heavy);
    }

    #[test]
    fn incident_type_serializes_snake_case() {
        let json = serde_json::to_string(&IncidentType::Construction).ok();
        assert_eq!(json.as_deref(), Some("\"construction\""));
    }
}
