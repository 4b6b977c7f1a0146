//! Traffic generation, state and fan-out for the RoadPulse simulation.
//!
//! This crate owns everything that happens on a tick: sampling the road
//! network, updating the state cache, publishing to subscribed observers and
//! handing the results to persistence.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `roadpulse-config.yaml` into
//!   strongly-typed structs.
//! - [`network`] -- Validated road network and the built-in demo network.
//! - [`congestion`] -- Time-of-day baseline congestion model.
//! - [`sampler`] -- Seedable per-segment traffic and incident synthesis.
//! - [`cache`] -- Latest sample per segment and known incidents.
//! - [`broker`] -- Topic subscriptions over bounded per-connection queues.
//! - [`analytics`] -- Network summary, next-hour projection, recommendations.
//! - [`persistence`] -- [`PersistenceGateway`] trait and [`InMemoryGateway`].
//! - [`pipeline`] -- The per-tick [`TickPipeline`].
//! - [`scheduler`] -- Fixed-period [`Scheduler`] driving the pipeline.
//!
//! [`PersistenceGateway`]: persistence::PersistenceGateway
//! [`InMemoryGateway`]: persistence::InMemoryGateway
//! [`TickPipeline`]: pipeline::TickPipeline
//! [`Scheduler`]: scheduler::Scheduler

pub mod analytics;
pub mod broker;
pub mod cache;
pub mod config;
pub mod congestion;
pub mod network;
pub mod persistence;
pub mod pipeline;
pub mod sampler;
pub mod scheduler;
