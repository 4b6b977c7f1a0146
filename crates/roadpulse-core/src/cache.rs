//! In-memory state cache: latest sample per segment, every known incident.
//!
//! Both maps are last-write-wins keyed by id. The whole cache sits behind one
//! async [`RwLock`] so a tick's samples and incidents land in a single write:
//! readers observe either all of a tick or none of it.
//!
//! [`StateCache::apply_tick`] hands the write guard back to the caller. The
//! tick pipeline keeps holding it while it fans the tick out, and the broker
//! takes a read guard while it snapshots and registers a new subscriber, so a
//! subscriber never sees a tick twice and never misses one.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use roadpulse_types::{
    Incident, IncidentId, IncidentSnapshot, IncidentStatus, SegmentId, ServerMessage, Topic,
    TrafficSample, TrafficSnapshot,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::analytics::summarize;

/// What happens to incidents once they are over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentRetention {
    /// Keep every incident for the lifetime of the process. Finished ones
    /// are marked resolved by the tick pipeline.
    #[default]
    KeepAll,
    /// Drop incidents that are resolved or past their end time on each tick.
    EvictExpired,
}

/// The data guarded by the cache lock.
#[derive(Debug, Default, Clone)]
pub struct CacheContents {
    samples: BTreeMap<SegmentId, TrafficSample>,
    incidents: BTreeMap<IncidentId, Incident>,
    tick: u64,
}

impl CacheContents {
    /// Last tick applied, 0 before the first tick.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Latest sample of a segment.
    pub fn sample(&self, id: &SegmentId) -> Option<&TrafficSample> {
        self.samples.get(id)
    }

    /// Latest samples, ordered by segment id.
    pub fn samples(&self) -> impl Iterator<Item = &TrafficSample> {
        self.samples.values()
    }

    /// Every incident held, ordered by id. Ids are v7, so incidents from
    /// earlier ticks come first.
    pub fn incidents(&self) -> impl Iterator<Item = &Incident> {
        self.incidents.values()
    }

    /// Incidents whose status is still active.
    pub fn active_incidents(&self) -> impl Iterator<Item = &Incident> {
        self.incidents.values().filter(|i| i.is_active())
    }

    /// Number of segments with a sample.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Number of incidents held.
    pub fn incident_count(&self) -> usize {
        self.incidents.len()
    }

    /// Point-in-time traffic snapshot.
    pub fn traffic_snapshot(&self, now: DateTime<Utc>) -> TrafficSnapshot {
        let traffic_data: Vec<TrafficSample> = self.samples.values().cloned().collect();
        TrafficSnapshot {
            timestamp: now,
            tick: self.tick,
            summary: summarize(&traffic_data),
            traffic_data,
        }
    }

    /// Point-in-time incident snapshot.
    pub fn incident_snapshot(&self, now: DateTime<Utc>) -> IncidentSnapshot {
        IncidentSnapshot {
            timestamp: now,
            tick: self.tick,
            incidents: self.incidents.values().cloned().collect(),
        }
    }

    /// The snapshot message for a topic, if the topic has one.
    pub fn snapshot_message(&self, topic: Topic, now: DateTime<Utc>) -> Option<ServerMessage> {
        match topic {
            Topic::TrafficUpdates => Some(ServerMessage::InitialTrafficData(
                self.traffic_snapshot(now),
            )),
            Topic::IncidentUpdates => Some(ServerMessage::InitialIncidentData(
                self.incident_snapshot(now),
            )),
            Topic::AnalyticsUpdates => None,
        }
    }

    fn upsert_samples<'a>(&mut self, batch: impl IntoIterator<Item = &'a TrafficSample>) {
        for sample in batch {
            self.samples
                .insert(sample.segment_id.clone(), sample.clone());
        }
    }

    fn upsert_incidents<'a>(&mut self, batch: impl IntoIterator<Item = &'a Incident>) {
        for incident in batch {
            self.incidents.insert(incident.id, incident.clone());
        }
    }

    fn evict_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.incidents.len();
        self.incidents
            .retain(|_, incident| incident.is_active() && !incident.has_expired(now));
        before.saturating_sub(self.incidents.len())
    }
}

/// Shared, lock-protected state cache.
#[derive(Debug, Default)]
pub struct StateCache {
    inner: RwLock<CacheContents>,
    retention: IncidentRetention,
}

impl StateCache {
    /// Create an empty cache with the given incident retention policy.
    pub fn new(retention: IncidentRetention) -> Self {
        Self {
            inner: RwLock::new(CacheContents::default()),
            retention,
        }
    }

    /// The configured retention policy.
    pub const fn retention(&self) -> IncidentRetention {
        self.retention
    }

    /// Upsert samples by segment id.
    pub async fn upsert_samples(&self, batch: &[TrafficSample]) {
        self.inner.write().await.upsert_samples(batch);
    }

    /// Upsert incidents by incident id.
    pub async fn upsert_incidents(&self, batch: &[Incident]) {
        self.inner.write().await.upsert_incidents(batch);
    }

    /// Apply one tick under a single write and return the held guard.
    ///
    /// Drop the guard once the tick has been published.
    pub async fn apply_tick(
        &self,
        tick: u64,
        now: DateTime<Utc>,
        samples: &[TrafficSample],
        incidents: &[Incident],
    ) -> RwLockWriteGuard<'_, CacheContents> {
        let mut guard = self.inner.write().await;
        guard.upsert_samples(samples);
        guard.upsert_incidents(incidents);
        guard.tick = tick;

        if self.retention == IncidentRetention::EvictExpired {
            let evicted = guard.evict_expired(now);
            if evicted > 0 {
                tracing::debug!(tick, evicted, "Evicted finished incidents");
            }
        }
        guard
    }

    /// Shared read access; holds off ticks while alive.
    pub async fn read(&self) -> RwLockReadGuard<'_, CacheContents> {
        self.inner.read().await
    }

    /// Consistent copy of the cache contents.
    pub async fn snapshot(&self) -> CacheContents {
        self.inner.read().await.clone()
    }

    /// Latest sample of one segment.
    pub async fn sample(&self, id: &SegmentId) -> Option<TrafficSample> {
        self.inner.read().await.sample(id).cloned()
    }

    /// Incidents still marked active.
    pub async fn active_incidents(&self) -> Vec<Incident> {
        self.inner.read().await.active_incidents().cloned().collect()
    }

    /// Mark an incident resolved and return the updated record, or `None`
    /// if it is unknown.
    pub async fn resolve_incident(&self, id: IncidentId) -> Option<Incident> {
        let mut guard = self.inner.write().await;
        let incident = guard.incidents.get_mut(&id)?;
        incident.status = IncidentStatus::Resolved;
        Some(incident.clone())
    }

    /// Number of segments with a sample.
    pub async fn sample_count(&self) -> usize {
        self.inner.read().await.sample_count()
    }

    /// Number of incidents held.
    pub async fn incident_count(&self) -> usize {
        self.inner.read().await.incident_count()
    }
}
