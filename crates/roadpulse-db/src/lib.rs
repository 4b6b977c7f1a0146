//! `PostgreSQL` persistence for the RoadPulse simulation.
//!
//! The tick pipeline only knows the [`PersistenceGateway`] trait from
//! `roadpulse-core`; this crate supplies the durable implementation,
//! [`PostgresGateway`], on top of three table stores.
//!
//! ```text
//! TickPipeline --persist_tick--> PostgresGateway
//!                                  |-- SegmentStore   (road_segments)
//!                                  |-- SampleStore    (traffic_samples, hourly rollups)
//!                                  +-- IncidentStore  (traffic_incidents)
//! ```
//!
//! # Modules
//!
//! - [`postgres`] -- Connection pool, configuration and migrations
//! - [`segment_store`] -- Road segment registration
//! - [`sample_store`] -- Batched sample inserts, latest-per-segment and hourly queries
//! - [`incident_store`] -- Incident upserts and active incident queries
//! - [`gateway`] -- The [`PersistenceGateway`] implementation
//! - [`error`] -- Shared error types
//!
//! [`PersistenceGateway`]: roadpulse_core::persistence::PersistenceGateway

pub mod error;
pub mod gateway;
pub mod incident_store;
pub mod postgres;
pub mod sample_store;
pub mod segment_store;

pub use error::DbError;
pub use gateway::PostgresGateway;
pub use incident_store::{IncidentRow, IncidentStore};
pub use postgres::{PostgresConfig, PostgresPool};
pub use sample_store::{HourlyRow, SampleRow, SampleStore};
pub use segment_store::{SegmentRow, SegmentStore};
