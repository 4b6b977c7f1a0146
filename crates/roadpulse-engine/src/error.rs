//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps every failure
//! that is fatal at startup. Once the scheduler runs nothing is fatal.

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: roadpulse_core::config::ConfigError,
    },

    /// The road network is invalid.
    #[error("network error: {source}")]
    Network {
        /// The underlying network error.
        #[from]
        source: roadpulse_core::network::NetworkError,
    },

    /// The scheduler could not be built.
    #[error("scheduler error: {source}")]
    Scheduler {
        /// The underlying scheduler error.
        #[from]
        source: roadpulse_core::scheduler::SchedulerError,
    },

    /// Observer API server failed to start.
    #[error("observer error: {source}")]
    Observer {
        /// The underlying startup error.
        #[from]
        source: roadpulse_observer::startup::StartupError,
    },
}
