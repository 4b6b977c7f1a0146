//! Shared type definitions for the RoadPulse traffic simulation.
//!
//! This crate is the single source of truth for every type that crosses a
//! crate or process boundary. Wire types flow to `TypeScript` via `ts-rs`
//! for the map dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Incident/connection UUID wrappers and string segment ids
//! - [`enums`] -- Road classes, incident taxonomy, topics, congestion bands
//! - [`structs`] -- Segments, samples, incidents and analytics aggregates
//! - [`messages`] -- Server messages and client commands for live observers

pub mod enums;
pub mod ids;
pub mod messages;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{
    CongestionBand, IncidentStatus, IncidentType, RecommendationKind, RecommendationPriority,
    RoadClass, Topic, UnknownTopic,
};
pub use ids::{ConnectionId, IncidentId, SegmentId};
pub use messages::{
    ClientCommand, ErrorPayload, IncidentSnapshot, IncidentUpdate, ServerMessage,
    TrafficSnapshot, TrafficUpdate,
};
pub use structs::{
    AnalyticsReport, Coordinate, HistoricalRecord, HourlyTrend, Incident, NetworkSummary,
    Prediction, Recommendation, RoadSegment, SeverityDistribution, TrafficSample,
};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation for the dashboard.

    #[test]
    fn export_bindings() {
        // ts-rs writes the files to `bindings/` relative to the crate root
        // when `export_all` runs.
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::IncidentId::export_all();
        let _ = crate::ids::ConnectionId::export_all();
        let _ = crate::ids::SegmentId::export_all();

        // Enums
        let _ = crate::enums::RoadClass::export_all();
        let _ = crate::enums::IncidentType::export_all();
        let _ = crate::enums::IncidentStatus::export_all();
        let _ = crate::enums::Topic::export_all();
        let _ = crate::enums::CongestionBand::export_all();

        // Structs and messages
        let _ = crate::structs::RoadSegment::export_all();
        let _ = crate::structs::TrafficSample::export_all();
        let _ = crate::structs::Incident::export_all();
        let _ = crate::structs::AnalyticsReport::export_all();
        let _ = crate::messages::ServerMessage::export_all();
        let _ = crate::messages::ClientCommand::export_all();
    }
}
