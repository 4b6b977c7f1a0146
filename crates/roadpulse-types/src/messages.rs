//! Wire messages exchanged with live observers.
//!
//! Server messages are adjacently tagged: `{"event": "traffic-update",
//! "data": {...}}`. Client commands are internally tagged:
//! `{"action": "subscribe", "topic": "traffic-updates"}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::Topic;
use crate::structs::{AnalyticsReport, Incident, NetworkSummary, TrafficSample};

/// Live batch of samples published on [`Topic::TrafficUpdates`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TrafficUpdate {
    /// When the tick ran.
    pub timestamp: DateTime<Utc>,
    /// Tick sequence number.
    pub tick: u64,
    /// One sample per segment.
    pub traffic_data: Vec<TrafficSample>,
    /// Aggregate of `traffic_data`.
    pub summary: NetworkSummary,
}

/// Live batch of incidents published on [`Topic::IncidentUpdates`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct IncidentUpdate {
    /// When the tick ran.
    pub timestamp: DateTime<Utc>,
    /// Tick sequence number.
    pub tick: u64,
    /// Incidents produced by the tick.
    pub incidents: Vec<Incident>,
}

/// Snapshot of all current samples, sent to a new traffic subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TrafficSnapshot {
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Last tick applied to the cache (0 before the first tick).
    pub tick: u64,
    /// Current sample of every segment.
    pub traffic_data: Vec<TrafficSample>,
    /// Aggregate of `traffic_data`.
    pub summary: NetworkSummary,
}

/// Snapshot of all known incidents, sent to a new incident subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct IncidentSnapshot {
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Last tick applied to the cache (0 before the first tick).
    pub tick: u64,
    /// Every incident held by the cache.
    pub incidents: Vec<Incident>,
}

/// Error reported to a client, e.g. for an unparseable command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ErrorPayload {
    /// What went wrong.
    pub message: String,
}

/// Message pushed from the server to a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Live traffic samples.
    TrafficUpdate(TrafficUpdate),
    /// Live incidents.
    IncidentUpdate(IncidentUpdate),
    /// Live analytics.
    AnalyticsUpdate(AnalyticsReport),
    /// Traffic snapshot replay.
    InitialTrafficData(TrafficSnapshot),
    /// Incident snapshot replay.
    InitialIncidentData(IncidentSnapshot),
    /// Command error.
    Error(ErrorPayload),
}

impl ServerMessage {
    /// The topic a live message belongs to; `None` for snapshots and errors.
    pub const fn topic(&self) -> Option<Topic> {
        match self {
            Self::TrafficUpdate(_) => Some(Topic::TrafficUpdates),
            Self::IncidentUpdate(_) => Some(Topic::IncidentUpdates),
            Self::AnalyticsUpdate(_) => Some(Topic::AnalyticsUpdates),
            Self::InitialTrafficData(_) | Self::InitialIncidentData(_) | Self::Error(_) => None,
        }
    }

    /// Wire event name of the message.
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::TrafficUpdate(_) => "traffic-update",
            Self::IncidentUpdate(_) => "incident-update",
            Self::AnalyticsUpdate(_) => "analytics-update",
            Self::InitialTrafficData(_) => "initial-traffic-data",
            Self::InitialIncidentData(_) => "initial-incident-data",
            Self::Error(_) => "error",
        }
    }
}

/// Command sent by a client over its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Join a topic; the first join pushes the topic snapshot.
    Subscribe {
        /// Topic to join.
        topic: Topic,
    },
    /// Leave a topic.
    Unsubscribe {
        /// Topic to leave.
        topic: Topic,
    },
    /// Ask for the topic snapshot without changing membership.
    Snapshot {
        /// Topic whose snapshot is requested.
        topic: Topic,
    },
}
