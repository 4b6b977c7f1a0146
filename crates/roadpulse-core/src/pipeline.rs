//! The per-tick pipeline.
//!
//! ```text
//! Sampler::generate
//!   -> StateCache::apply_tick        (write guard taken)
//!   -> publish traffic-updates
//!   -> publish incident-updates      (only if the tick produced incidents)
//!   -> analytics -> publish analytics-updates
//!                                    (write guard released)
//!   -> resolve incidents past end_time
//!   -> persist_tick                  (spawned, best effort)
//! ```
//!
//! Nothing in a tick can fail: publication is fire-and-forget per connection
//! and persistence errors only reach the logs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::rngs::StdRng;
use roadpulse_types::{IncidentId, IncidentUpdate, ServerMessage, Topic, TrafficUpdate};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::analytics::{build_report, summarize};
use crate::broker::{Broker, PublishReport};
use crate::cache::StateCache;
use crate::congestion::hour_of_day;
use crate::persistence::{PersistenceGateway, persist_tick};
use crate::sampler::Sampler;
use crate::scheduler::TickHandler;

/// What a single tick produced.
#[derive(Debug)]
pub struct TickOutcome {
    /// Tick sequence number.
    pub tick: u64,
    /// Samples generated.
    pub samples: usize,
    /// Incidents generated.
    pub incidents: usize,
    /// Earlier incidents resolved because their end time passed.
    pub resolved: usize,
    /// Delivery report for `traffic-updates`.
    pub traffic: PublishReport,
    /// Background persistence task.
    pub persistence: JoinHandle<()>,
}

/// Sampler, cache, broker and gateway wired together.
#[derive(Debug)]
pub struct TickPipeline<R = StdRng> {
    sampler: Mutex<Sampler<R>>,
    cache: Arc<StateCache>,
    broker: Arc<Broker>,
    gateway: Arc<dyn PersistenceGateway>,
}

impl<R: Rng + Send + 'static> TickPipeline<R> {
    /// Assemble a pipeline. The broker should read from the same `cache`.
    pub fn new(
        sampler: Sampler<R>,
        cache: Arc<StateCache>,
        broker: Arc<Broker>,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Self {
        Self {
            sampler: Mutex::new(sampler),
            cache,
            broker,
            gateway,
        }
    }

    /// Run one tick.
    pub async fn run_tick(&self, tick: u64, now: DateTime<Utc>) -> TickOutcome {
        let (batch, utc_offset) = {
            let mut sampler = self.sampler.lock().await;
            let offset = sampler.settings().utc_offset;
            (sampler.generate(now), offset)
        };
        let summary = summarize(&batch.samples);
        let hour = hour_of_day(now, utc_offset);

        let guard = self
            .cache
            .apply_tick(tick, now, &batch.samples, &batch.incidents)
            .await;
        let finished: Vec<IncidentId> = guard
            .active_incidents()
            .filter(|i| i.has_expired(now))
            .map(|i| i.id)
            .collect();
        let active_incidents = guard
            .active_incidents()
            .count()
            .saturating_sub(finished.len());
        let active_incidents = u32::try_from(active_incidents).unwrap_or(u32::MAX);

        let traffic = self
            .broker
            .publish(
                Topic::TrafficUpdates,
                ServerMessage::TrafficUpdate(TrafficUpdate {
                    timestamp: now,
                    tick,
                    traffic_data: batch.samples.clone(),
                    summary,
                }),
            )
            .await;

        if !batch.incidents.is_empty() {
            self.broker
                .publish(
                    Topic::IncidentUpdates,
                    ServerMessage::IncidentUpdate(IncidentUpdate {
                        timestamp: now,
                        tick,
                        incidents: batch.incidents.clone(),
                    }),
                )
                .await;
        }

        let report = build_report(tick, now, hour, summary, active_incidents);
        self.broker
            .publish(Topic::AnalyticsUpdates, ServerMessage::AnalyticsUpdate(report))
            .await;
        drop(guard);

        let mut to_persist = batch.incidents;
        let incidents = to_persist.len();
        for id in finished {
            if let Some(incident) = self.cache.resolve_incident(id).await {
                to_persist.push(incident);
            }
        }
        let resolved = to_persist.len().saturating_sub(incidents);
        if resolved > 0 {
            debug!(tick, resolved, "Resolved finished incidents");
        }

        let samples = batch.samples.len();
        let persistence = persist_tick(Arc::clone(&self.gateway), tick, batch.samples, to_persist);

        info!(
            tick,
            hour,
            samples,
            incidents,
            average_congestion = summary.average_congestion,
            subscribers = traffic.delivered,
            "Tick complete"
        );

        TickOutcome {
            tick,
            samples,
            incidents,
            resolved,
            traffic,
            persistence,
        }
    }
}

impl<R: Rng + Send + 'static> TickHandler for TickPipeline<R> {
    async fn on_tick(&self, tick: u64, now: DateTime<Utc>) {
        // Persistence keeps running in the background.
        drop(self.run_tick(tick, now).await);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeDelta, TimeZone};
    use roadpulse_types::{Coordinate, RoadClass, RoadSegment, SegmentId};

    use super::*;
    use crate::network::RoadNetwork;
    use crate::persistence::InMemoryGateway;
    use crate::sampler::SamplerSettings;
    use crate::scheduler::Scheduler;

    struct Fixture {
        pipeline: TickPipeline,
        cache: Arc<StateCache>,
        broker: Arc<Broker>,
        gateway: Arc<InMemoryGateway>,
    }

    fn test_segment(id: &str, length_km: f64, speed_limit_kph: u32) -> RoadSegment {
        RoadSegment {
            id: SegmentId::new(id),
            name: id.to_owned(),
            class: RoadClass::Arterial,
            geometry: vec![Coordinate(37.0, -122.0), Coordinate(37.5, -122.5)],
            length_km,
            speed_limit_kph,
        }
    }

    fn fixture(incident_probability: f64) -> Fixture {
        let network = Arc::new(
            RoadNetwork::new(vec![test_segment("A", 10.0, 100), test_segment("B", 5.0, 50)])
                .unwrap(),
        );
        let settings = SamplerSettings {
            incident_probability,
            ..SamplerSettings::default()
        };
        let cache = Arc::new(StateCache::default());
        let broker = Arc::new(Broker::new(Arc::clone(&cache), 32));
        let gateway = Arc::new(InMemoryGateway::default());
        let pipeline = TickPipeline::new(
            Sampler::seeded(network, settings, 5),
            Arc::clone(&cache),
            Arc::clone(&broker),
            Arc::clone(&gateway) as Arc<dyn PersistenceGateway>,
        );
        Fixture {
            pipeline,
            cache,
            broker,
            gateway,
        }
    }

    fn rush_hour() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 3, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn tick_updates_cache_publishes_and_persists() {
        let fx = fixture(1.0);
        let mut conn = fx.broker.connect().await;
        for topic in Topic::ALL {
            fx.broker.subscribe(conn.id, topic).await.unwrap();
        }
        // Traffic and incident snapshots of the empty cache.
        for _ in 0..2 {
            conn.receiver.recv().await.unwrap();
        }

        let outcome = fx.pipeline.run_tick(1, rush_hour()).await;
        assert_eq!(outcome.samples, 2);
        assert_eq!(outcome.incidents, 2);
        assert_eq!(outcome.traffic.delivered, 1);

        let events: Vec<&'static str> = std::iter::from_fn(|| conn.receiver.try_recv().ok())
            .map(|m| m.event_name())
            .collect();
        assert_eq!(
            events,
            vec!["traffic-update", "incident-update", "analytics-update"]
        );

        assert_eq!(fx.cache.sample_count().await, 2);
        assert_eq!(fx.cache.incident_count().await, 2);

        outcome.persistence.await.unwrap();
        assert_eq!(fx.gateway.sample_count().await, 2);
        assert_eq!(fx.gateway.incident_count().await, 2);
    }

    #[tokio::test]
    async fn finished_incidents_are_resolved_and_persisted() {
        let fx = fixture(1.0);
        let first = fx.pipeline.run_tick(1, rush_hour()).await;
        first.persistence.await.unwrap();
        assert_eq!(fx.cache.active_incidents().await.len(), 2);

        let quiet = TickPipeline::new(
            Sampler::seeded(
                Arc::new(
                    RoadNetwork::new(vec![test_segment("A", 10.0, 100)]).unwrap(),
                ),
                SamplerSettings {
                    incident_probability: 0.0,
                    ..SamplerSettings::default()
                },
                5,
            ),
            Arc::clone(&fx.cache),
            Arc::clone(&fx.broker),
            Arc::clone(&fx.gateway) as Arc<dyn PersistenceGateway>,
        );
        let later = rush_hour() + TimeDelta::hours(3);
        let second = quiet.run_tick(2, later).await;
        assert_eq!(second.incidents, 0);
        assert_eq!(second.resolved, 2);
        second.persistence.await.unwrap();

        assert!(fx.cache.active_incidents().await.is_empty());
        assert_eq!(fx.cache.incident_count().await, 2);
        assert_eq!(fx.gateway.active_incident_count().await, 0);

        let third = quiet.run_tick(3, later).await;
        assert_eq!(third.resolved, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_scheduler_leaves_cache_untouched() {
        let fx = fixture(0.05);
        let period = Duration::from_secs(30);
        let scheduler = Scheduler::new(Arc::new(fx.pipeline), period).unwrap();

        assert!(scheduler.start().await);
        tokio::time::sleep(period + Duration::from_secs(1)).await;
        assert!(scheduler.stop().await);

        let frozen = fx.cache.read().await.tick();
        assert_eq!(frozen, 2);

        tokio::time::sleep(period * 2).await;
        assert_eq!(fx.cache.read().await.tick(), frozen);
        assert_eq!(scheduler.ticks(), frozen);
    }

    #[tokio::test]
    async fn quiet_tick_skips_incident_topic() {
        let fx = fixture(0.0);
        let mut conn = fx.broker.connect().await;
        fx.broker
            .subscribe(conn.id, Topic::IncidentUpdates)
            .await
            .unwrap();
        conn.receiver.recv().await.unwrap();

        fx.pipeline.run_tick(1, rush_hour()).await;
        assert!(conn.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn cache_holds_one_sample_per_segment_after_many_ticks() {
        let fx = fixture(0.05);
        for tick in 1..=20 {
            fx.pipeline.run_tick(tick, rush_hour()).await;
        }
        let contents = fx.cache.snapshot().await;
        assert_eq!(contents.sample_count(), 2);
        assert_eq!(contents.tick(), 20);
    }

    #[tokio::test]
    async fn analytics_report_reflects_tick() {
        let fx = fixture(0.0);
        let mut conn = fx.broker.connect().await;
        fx.broker
            .subscribe(conn.id, Topic::AnalyticsUpdates)
            .await
            .unwrap();

        fx.pipeline.run_tick(3, rush_hour()).await;
        let message = conn.receiver.recv().await.unwrap();
        assert!(matches!(
            message.as_ref(),
            ServerMessage::AnalyticsUpdate(report)
                if report.tick == 3
                    && report.real_time.total_segments == 2
                    && report.hourly_trend.hour == 8
                    && report.predictions.next_hour == 9
                    && !report.predictions.recommendations.is_empty()
        ));
    }
}
