//! Observer API server for the RoadPulse simulation.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws`) where clients subscribe to
//!   `traffic-updates`, `incident-updates` and `analytics-updates` through
//!   the [`Broker`]
//! - **REST endpoints** under `/api/traffic` for segments, the latest
//!   samples, incidents, the network summary and hourly history
//! - **Health endpoint** (`GET /api/health`)
//!
//! # Architecture
//!
//! The observer never runs simulation logic. Live traffic reaches clients
//! through their per-connection broker queue; REST reads go to the
//! [`StateCache`] or the persistence gateway. A slow client only fills its
//! own queue and never blocks the tick cycle.
//!
//! [`Broker`]: roadpulse_core::broker::Broker
//! [`StateCache`]: roadpulse_core::cache::StateCache

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::AppState;
