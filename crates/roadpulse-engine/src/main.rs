//! Engine binary for the RoadPulse simulation.
//!
//! This is the composition root: it loads configuration, builds the road
//! network, cache, broker, persistence gateway and tick pipeline, starts
//! the scheduler and the observer server, and tears everything down on
//! `Ctrl-C` or `SIGTERM`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `roadpulse-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Build and validate the road network
//! 4. Create the state cache and broker
//! 5. Connect persistence (`PostgreSQL`, falling back to memory) and
//!    register the road segments
//! 6. Build the sampler and tick pipeline, start the scheduler
//! 7. Start the observer API server
//! 8. Wait for a shutdown signal, stop the scheduler, drain the server

mod error;

use std::path::Path;
use std::sync::Arc;

use chrono::FixedOffset;
use roadpulse_core::broker::Broker;
use roadpulse_core::cache::StateCache;
use roadpulse_core::config::{LoggingConfig, SimulationConfig};
use roadpulse_core::network::RoadNetwork;
use roadpulse_core::persistence::{InMemoryGateway, PersistenceGateway};
use roadpulse_core::pipeline::TickPipeline;
use roadpulse_core::sampler::Sampler;
use roadpulse_core::scheduler::Scheduler;
use roadpulse_db::{DbError, PostgresGateway, PostgresPool};
use roadpulse_observer::state::AppState;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Configuration file looked up in the working directory.
const CONFIG_PATH: &str = "roadpulse-config.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if any startup step fails.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let config = SimulationConfig::load(Path::new(CONFIG_PATH))?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(
        tick_interval_ms = config.scheduler.tick_interval_ms,
        seed = ?config.sampler.seed,
        incident_probability = config.sampler.incident_probability,
        incident_retention = ?config.cache.incident_retention,
        "roadpulse-engine starting"
    );

    // 3. Road network.
    let network = Arc::new(config.road_network()?);
    info!(segments = network.len(), "Road network loaded");

    // 4. Cache and broker.
    let cache = Arc::new(StateCache::new(config.cache.incident_retention));
    let broker = Arc::new(Broker::new(
        Arc::clone(&cache),
        config.broker.connection_buffer,
    ));

    // 5. Persistence.
    let settings = config.sampler.settings()?;
    let (gateway, pool) =
        connect_gateway(config.infrastructure.database_url.as_deref(), settings.utc_offset).await;
    register_segments(gateway.as_ref(), &network).await;

    // 6. Sampler, pipeline, scheduler.
    let sampler = match config.sampler.seed {
        Some(seed) => Sampler::seeded(Arc::clone(&network), settings, seed),
        None => Sampler::from_os_rng(Arc::clone(&network), settings),
    };
    let pipeline = Arc::new(TickPipeline::new(
        sampler,
        Arc::clone(&cache),
        Arc::clone(&broker),
        Arc::clone(&gateway),
    ));
    let scheduler = Scheduler::new(pipeline, config.scheduler.tick_interval())?;

    // 7. Observer API server. Bound before the first tick so a port
    //    conflict aborts startup cleanly.
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let app_state = Arc::new(AppState::new(
        Arc::clone(&broker),
        Arc::clone(&network),
        Arc::clone(&gateway),
    ));
    let observer_port = config.infrastructure.observer_port;
    let observer = roadpulse_observer::startup::spawn_observer(observer_port, app_state, async move {
        // An error means the sender is gone, which is also a shutdown.
        let _ = shutdown_rx.changed().await;
    })
    .await?;
    info!(port = observer_port, "Observer API server started");

    scheduler.start().await;

    // 8. Run until signalled.
    shutdown_signal().await;
    info!("Shutdown signal received");

    scheduler.stop().await;
    let _ = shutdown_tx.send(true);
    if let Err(e) = observer.await {
        warn!(error = %e, "Observer task ended abnormally");
    }
    if let Some(pool) = pool {
        pool.close().await;
    }

    info!(ticks = scheduler.ticks(), "roadpulse-engine shutdown complete");
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Pick the persistence backend.
///
/// Without a database URL, or when the database cannot be reached or
/// migrated, the in-memory gateway is used. The pool is returned so it can
/// be closed on shutdown.
async fn connect_gateway(
    database_url: Option<&str>,
    utc_offset: FixedOffset,
) -> (Arc<dyn PersistenceGateway>, Option<PostgresPool>) {
    let Some(url) = database_url else {
        info!("No database configured, using in-memory persistence");
        return (Arc::new(InMemoryGateway::new(utc_offset)), None);
    };

    match connect_postgres(url).await {
        Ok(pool) => {
            info!("Using PostgreSQL persistence");
            (Arc::new(PostgresGateway::new(pool.clone())), Some(pool))
        }
        Err(e) => {
            warn!(error = %e, "PostgreSQL unavailable, falling back to in-memory persistence");
            (Arc::new(InMemoryGateway::new(utc_offset)), None)
        }
    }
}

async fn connect_postgres(url: &str) -> Result<PostgresPool, DbError> {
    let pool = PostgresPool::connect_url(url).await?;
    pool.run_migrations().await?;
    Ok(pool)
}

/// Register every segment with the gateway. Failures are logged only.
async fn register_segments(gateway: &dyn PersistenceGateway, network: &RoadNetwork) {
    let mut failed: usize = 0;
    for segment in network.segments() {
        if let Err(e) = gateway.insert_segment(segment).await {
            failed = failed.saturating_add(1);
            warn!(segment_id = %segment.id, error = %e, "Failed to register segment");
        }
    }
    info!(
        backend = gateway.backend_name(),
        segments = network.len(),
        failed,
        "Road segments registered"
    );
}

/// Resolve on `Ctrl-C` or, on Unix, `SIGTERM`.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Offset, Utc};

    use super::*;

    #[tokio::test]
    async fn no_database_url_uses_memory() {
        let (gateway, pool) = connect_gateway(None, Utc.fix()).await;
        assert_eq!(gateway.backend_name(), "memory");
        assert!(pool.is_none());
    }

    #[tokio::test]
    async fn unparseable_database_url_falls_back_to_memory() {
        let (gateway, pool) = connect_gateway(Some("not a url"), Utc.fix()).await;
        assert_eq!(gateway.backend_name(), "memory");
        assert!(pool.is_none());
    }

    #[tokio::test]
    async fn segments_register_with_memory_gateway() {
        let gateway = InMemoryGateway::default();
        let network = RoadNetwork::default_network().unwrap();
        register_segments(&gateway, &network).await;
        assert_eq!(gateway.segment_count().await, network.len());
    }
}
