//! Shared application state for the Observer API server.
//!
//! [`AppState`] bundles the handles the engine constructs at startup. The
//! observer only reads through them, except for broker membership changes
//! driven by `WebSocket` clients.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use roadpulse_core::broker::Broker;
use roadpulse_core::cache::StateCache;
use roadpulse_core::network::RoadNetwork;
use roadpulse_core::persistence::PersistenceGateway;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Topic broker; every `WebSocket` connection registers here.
    pub broker: Arc<Broker>,
    /// Latest sample per segment and known incidents.
    pub cache: Arc<StateCache>,
    /// The static road network.
    pub network: Arc<RoadNetwork>,
    /// Durable store backing the realtime and historical endpoints.
    pub gateway: Arc<dyn PersistenceGateway>,
    /// When the process started serving.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create application state over the engine's shared handles. The
    /// cache is taken from the broker so both always agree.
    pub fn new(
        broker: Arc<Broker>,
        network: Arc<RoadNetwork>,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Self {
        Self {
            cache: Arc::clone(broker.cache()),
            broker,
            network,
            gateway,
            started_at: Utc::now(),
        }
    }

    /// Seconds since [`AppState::started_at`], never negative.
    pub fn uptime_seconds(&self) -> u64 {
        let elapsed = Utc::now().signed_duration_since(self.started_at);
        u64::try_from(elapsed.num_seconds()).unwrap_or(0)
    }
}
