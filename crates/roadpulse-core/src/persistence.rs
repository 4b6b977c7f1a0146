//! Persistence gateway abstraction and the in-memory fallback.
//!
//! The tick pipeline writes through a [`PersistenceGateway`] trait object and
//! never waits for the outcome: [`persist_tick`] spawns the writes and logs
//! failures. The `PostgreSQL` implementation lives in `roadpulse-db`; the
//! [`InMemoryGateway`] here is used when no database is configured or the
//! database is unreachable at startup.

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, DurationRound, FixedOffset, Offset, TimeDelta, Utc};
use roadpulse_types::{HistoricalRecord, Incident, IncidentId, RoadSegment, SegmentId, TrafficSample};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::congestion::{base_congestion, hour_of_day};
use crate::sampler::derive_speed;

/// Upper bound on the number of hourly buckets a historical query returns.
pub const MAX_HISTORICAL_BUCKETS: usize = 24 * 31;

/// Errors surfaced by persistence gateways.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// The backing store rejected or failed the operation.
    #[error("persistence backend error: {message}")]
    Backend {
        /// Human-readable description of the failure.
        message: String,
        /// The underlying error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A date range whose start lies after its end.
    #[error("invalid date range: {start} is after {end}")]
    InvalidRange {
        /// Requested start.
        start: DateTime<Utc>,
        /// Requested end.
        end: DateTime<Utc>,
    },
}

impl PersistenceError {
    /// Wrap a backend error with context.
    pub fn backend(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Inclusive time window for historical queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateRange {
    /// Build a range, rejecting `start > end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, PersistenceError> {
        if start > end {
            return Err(PersistenceError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Range start.
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Range end.
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Whether `at` falls inside the range.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Durable storage for segments, samples and incidents.
///
/// Implementations must be safe to call concurrently. An empty `segment_ids`
/// slice means "all segments".
#[async_trait]
pub trait PersistenceGateway: Send + Sync + Debug {
    /// Short backend name for logs and health output.
    fn backend_name(&self) -> &'static str;

    /// Check that the backend is reachable. In-process stores always are.
    async fn ping(&self) -> Result<(), PersistenceError> {
        Ok(())
    }

    /// Register a road segment. Idempotent.
    async fn insert_segment(&self, segment: &RoadSegment) -> Result<(), PersistenceError>;

    /// Append one traffic sample.
    async fn insert_sample(&self, sample: &TrafficSample) -> Result<(), PersistenceError>;

    /// Append a tick's samples. The default appends them one at a time and
    /// stops at the first failure.
    async fn insert_samples(&self, samples: &[TrafficSample]) -> Result<(), PersistenceError> {
        for sample in samples {
            self.insert_sample(sample).await?;
        }
        Ok(())
    }

    /// Insert or replace an incident.
    async fn insert_incident(&self, incident: &Incident) -> Result<(), PersistenceError>;

    /// Most recent sample per requested segment.
    async fn get_latest(
        &self,
        segment_ids: &[SegmentId],
    ) -> Result<Vec<TrafficSample>, PersistenceError>;

    /// Hourly aggregates over `range`, oldest first.
    async fn get_historical(
        &self,
        range: DateRange,
        segment_ids: &[SegmentId],
    ) -> Result<Vec<HistoricalRecord>, PersistenceError>;
}

/// Write a tick's samples and incidents in the background.
///
/// Samples go out as one batch. Failures are logged and otherwise ignored;
/// the returned handle exists for tests and shutdown, callers are free to
/// drop it.
pub fn persist_tick(
    gateway: Arc<dyn PersistenceGateway>,
    tick: u64,
    samples: Vec<TrafficSample>,
    incidents: Vec<Incident>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut failures: u32 = 0;
        if let Err(e) = gateway.insert_samples(&samples).await {
            failures = failures.saturating_add(1);
            warn!(tick, count = samples.len(), error = %e, "Failed to persist samples");
        }
        for incident in &incidents {
            if let Err(e) = gateway.insert_incident(incident).await {
                failures = failures.saturating_add(1);
                warn!(tick, incident_id = %incident.id, error = %e, "Failed to persist incident");
            }
        }
        debug!(
            tick,
            backend = gateway.backend_name(),
            samples = samples.len(),
            incidents = incidents.len(),
            failures,
            "Tick persisted"
        );
    })
}

#[derive(Debug, Default)]
struct MemoryStore {
    segments: BTreeMap<SegmentId, RoadSegment>,
    /// Sample history, oldest first, trimmed to the historical window.
    samples: VecDeque<TrafficSample>,
    latest: BTreeMap<SegmentId, TrafficSample>,
    incidents: BTreeMap<IncidentId, Incident>,
}

impl MemoryStore {
    fn push_sample(&mut self, sample: &TrafficSample) {
        let newer = self
            .latest
            .get(&sample.segment_id)
            .is_none_or(|current| current.sampled_at <= sample.sampled_at);
        if newer {
            self.latest.insert(sample.segment_id.clone(), sample.clone());
        }
        self.samples.push_back(sample.clone());
    }

    /// Drop history older than the longest window a historical query can
    /// return, measured back from `newest`.
    fn prune(&mut self, newest: DateTime<Utc>) {
        let Some(cutoff) = newest.checked_sub_signed(history_window()) else {
            return;
        };
        while self.samples.front().is_some_and(|s| s.sampled_at < cutoff) {
            self.samples.pop_front();
        }
    }
}

fn history_window() -> TimeDelta {
    let hours = i64::try_from(MAX_HISTORICAL_BUCKETS).unwrap_or(i64::MAX);
    TimeDelta::try_hours(hours).unwrap_or(TimeDelta::MAX)
}

/// Process-local gateway used when no database is available.
///
/// Only the last [`MAX_HISTORICAL_BUCKETS`] hours of samples are kept, plus
/// the newest sample of each segment. Hours in a historical query that have
/// no recorded samples are estimated from the congestion model (with
/// `sample_count` 0), so dashboards get a continuous series on a fresh
/// process.
#[derive(Debug)]
pub struct InMemoryGateway {
    store: RwLock<MemoryStore>,
    utc_offset: FixedOffset,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}

impl InMemoryGateway {
    /// Create an empty store; `utc_offset` localizes estimated hours.
    pub fn new(utc_offset: FixedOffset) -> Self {
        Self {
            store: RwLock::new(MemoryStore::default()),
            utc_offset,
        }
    }

    /// Number of stored samples.
    pub async fn sample_count(&self) -> usize {
        self.store.read().await.samples.len()
    }

    /// Number of stored incidents.
    pub async fn incident_count(&self) -> usize {
        self.store.read().await.incidents.len()
    }

    /// Number of stored incidents still marked active.
    pub async fn active_incident_count(&self) -> usize {
        self.store
            .read()
            .await
            .incidents
            .values()
            .filter(|i| i.is_active())
            .count()
    }

    /// Number of registered segments.
    pub async fn segment_count(&self) -> usize {
        self.store.read().await.segments.len()
    }
}

fn selected(segment_ids: &[SegmentId], id: &SegmentId) -> bool {
    segment_ids.is_empty() || segment_ids.contains(id)
}

fn mean(sum: f64, count: u64) -> f64 {
    // Counts stay far below 2^32 per bucket.
    let count = u32::try_from(count).unwrap_or(u32::MAX);
    if count == 0 { 0.0 } else { sum / f64::from(count) }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn insert_segment(&self, segment: &RoadSegment) -> Result<(), PersistenceError> {
        self.store
            .write()
            .await
            .segments
            .insert(segment.id.clone(), segment.clone());
        Ok(())
    }

    async fn insert_sample(&self, sample: &TrafficSample) -> Result<(), PersistenceError> {
        self.insert_samples(std::slice::from_ref(sample)).await
    }

    async fn insert_samples(&self, samples: &[TrafficSample]) -> Result<(), PersistenceError> {
        let Some(newest) = samples.iter().map(|s| s.sampled_at).max() else {
            return Ok(());
        };
        let mut store = self.store.write().await;
        for sample in samples {
            store.push_sample(sample);
        }
        store.prune(newest);
        Ok(())
    }

    async fn insert_incident(&self, incident: &Incident) -> Result<(), PersistenceError> {
        self.store
            .write()
            .await
            .incidents
            .insert(incident.id, incident.clone());
        Ok(())
    }

    async fn get_latest(
        &self,
        segment_ids: &[SegmentId],
    ) -> Result<Vec<TrafficSample>, PersistenceError> {
        let store = self.store.read().await;
        Ok(store
            .latest
            .values()
            .filter(|s| selected(segment_ids, &s.segment_id))
            .cloned()
            .collect())
    }

    async fn get_historical(
        &self,
        range: DateRange,
        segment_ids: &[SegmentId],
    ) -> Result<Vec<HistoricalRecord>, PersistenceError> {
        let store = self.store.read().await;

        // hour_start -> (speed sum, congestion sum, count)
        let mut buckets: BTreeMap<DateTime<Utc>, (f64, f64, u64)> = BTreeMap::new();
        for sample in store.samples.iter().filter(|s| {
            range.contains(s.sampled_at) && selected(segment_ids, &s.segment_id)
        }) {
            let Ok(hour_start) = sample.sampled_at.duration_trunc(TimeDelta::hours(1)) else {
                continue;
            };
            let entry = buckets.entry(hour_start).or_insert((0.0, 0.0, 0));
            entry.0 += f64::from(sample.current_speed_kph);
            entry.1 += sample.congestion_level;
            entry.2 = entry.2.saturating_add(1);
        }

        let limits: Vec<u32> = store
            .segments
            .values()
            .filter(|s| selected(segment_ids, &s.id))
            .map(|s| s.speed_limit_kph)
            .collect();

        let Ok(mut hour_start) = range.start().duration_trunc(TimeDelta::hours(1)) else {
            return Ok(Vec::new());
        };
        let mut records = Vec::new();
        while hour_start <= range.end() && records.len() < MAX_HISTORICAL_BUCKETS {
            let record = match buckets.get(&hour_start) {
                Some(&(speed_sum, congestion_sum, count)) => HistoricalRecord {
                    hour_start,
                    avg_speed: mean(speed_sum, count),
                    avg_congestion: mean(congestion_sum, count),
                    sample_count: count,
                },
                None => self.estimate(hour_start, &limits),
            };
            records.push(record);
            let Some(next) = hour_start.checked_add_signed(TimeDelta::hours(1)) else {
                break;
            };
            hour_start = next;
        }
        Ok(records)
    }
}

impl InMemoryGateway {
    fn estimate(&self, hour_start: DateTime<Utc>, limits: &[u32]) -> HistoricalRecord {
        let congestion = base_congestion(hour_of_day(hour_start, self.utc_offset));
        let speed_sum: f64 = limits
            .iter()
            .map(|&limit| f64::from(derive_speed(limit, congestion)))
            .sum();
        let count = u64::try_from(limits.len()).unwrap_or(u64::MAX);
        HistoricalRecord {
            hour_start,
            avg_speed: mean(speed_sum, count),
            avg_congestion: congestion,
            sample_count: 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use chrono::TimeZone;
    use roadpulse_types::{Coordinate, IncidentStatus, IncidentType, RoadClass};

    use super::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, hour, minute, 0).unwrap()
    }

    fn sample(segment: &str, at: DateTime<Utc>, speed: u32, congestion_level: f64) -> TrafficSample {
        TrafficSample {
            segment_id: SegmentId::new(segment),
            current_speed_kph: speed,
            free_flow_speed_kph: 100,
            congestion_level,
            travel_time_minutes: 5.0,
            sampled_at: at,
        }
    }

    fn road(id: &str, speed_limit_kph: u32) -> RoadSegment {
        RoadSegment {
            id: SegmentId::new(id),
            name: id.to_owned(),
            class: RoadClass::Highway,
            geometry: vec![Coordinate(0.0, 0.0), Coordinate(1.0, 1.0)],
            length_km: 5.0,
            speed_limit_kph,
        }
    }

    #[derive(Debug, Default)]
    struct BatchRecorder {
        batches: std::sync::Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl PersistenceGateway for BatchRecorder {
        fn backend_name(&self) -> &'static str {
            "recorder"
        }

        async fn insert_segment(&self, _segment: &RoadSegment) -> Result<(), PersistenceError> {
            Ok(())
        }

        async fn insert_sample(&self, _sample: &TrafficSample) -> Result<(), PersistenceError> {
            self.batches.lock().unwrap().push(1);
            Ok(())
        }

        async fn insert_samples(&self, samples: &[TrafficSample]) -> Result<(), PersistenceError> {
            self.batches.lock().unwrap().push(samples.len());
            Ok(())
        }

        async fn insert_incident(&self, _incident: &Incident) -> Result<(), PersistenceError> {
            Ok(())
        }

        async fn get_latest(
            &self,
            _segment_ids: &[SegmentId],
        ) -> Result<Vec<TrafficSample>, PersistenceError> {
            Ok(Vec::new())
        }

        async fn get_historical(
            &self,
            _range: DateRange,
            _segment_ids: &[SegmentId],
        ) -> Result<Vec<HistoricalRecord>, PersistenceError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn persist_tick_writes_samples_as_one_batch() {
        let recorder = Arc::new(BatchRecorder::default());
        let samples = ["a", "b", "c"]
            .into_iter()
            .map(|id| sample(id, at(7, 0), 50, 0.5))
            .collect();
        persist_tick(
            Arc::clone(&recorder) as Arc<dyn PersistenceGateway>,
            4,
            samples,
            Vec::new(),
        )
        .await
        .unwrap();
        assert_eq!(*recorder.batches.lock().unwrap(), vec![3]);
    }

    #[test]
    fn date_range_rejects_inverted_bounds() {
        assert!(DateRange::new(at(10, 0), at(9, 0)).is_err());
        assert!(DateRange::new(at(9, 0), at(9, 0)).is_ok());
    }

    #[tokio::test]
    async fn latest_returns_newest_sample_per_segment() {
        let gateway = InMemoryGateway::default();
        gateway.insert_sample(&sample("a", at(8, 0), 50, 0.5)).await.unwrap();
        gateway.insert_sample(&sample("a", at(8, 30), 40, 0.6)).await.unwrap();
        gateway.insert_sample(&sample("b", at(8, 10), 70, 0.3)).await.unwrap();

        let all = gateway.get_latest(&[]).await.unwrap();
        assert_eq!(all.len(), 2);
        let only_a = gateway.get_latest(&[SegmentId::new("a")]).await.unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a.first().unwrap().current_speed_kph, 40);
    }

    #[tokio::test]
    async fn history_stays_within_the_query_window() {
        let gateway = InMemoryGateway::default();
        let start = at(0, 0);
        let hours = MAX_HISTORICAL_BUCKETS.saturating_mul(2);
        for hour in 0..hours {
            let offset = TimeDelta::hours(i64::try_from(hour).unwrap());
            let sampled_at = start.checked_add_signed(offset).unwrap();
            gateway
                .insert_samples(&[
                    sample("a", sampled_at, 50, 0.5),
                    sample("b", sampled_at, 70, 0.3),
                ])
                .await
                .unwrap();
        }

        let retained = gateway.sample_count().await;
        assert!(retained <= (MAX_HISTORICAL_BUCKETS + 1) * 2);
        assert!(retained >= MAX_HISTORICAL_BUCKETS * 2);

        let newest = start
            .checked_add_signed(TimeDelta::hours(i64::try_from(hours - 1).unwrap()))
            .unwrap();
        let latest = gateway.get_latest(&[]).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert!(latest.iter().all(|s| s.sampled_at == newest));
    }

    #[tokio::test]
    async fn latest_ignores_late_older_samples() {
        let gateway = InMemoryGateway::default();
        gateway.insert_sample(&sample("a", at(9, 0), 40, 0.6)).await.unwrap();
        gateway.insert_sample(&sample("a", at(8, 0), 90, 0.1)).await.unwrap();

        let latest = gateway.get_latest(&[SegmentId::new("a")]).await.unwrap();
        assert_eq!(latest.first().unwrap().current_speed_kph, 40);
    }

    #[tokio::test]
    async fn historical_aggregates_recorded_hours() {
        let gateway = InMemoryGateway::default();
        gateway.insert_sample(&sample("a", at(8, 0), 40, 0.6)).await.unwrap();
        gateway.insert_sample(&sample("a", at(8, 30), 60, 0.4)).await.unwrap();
        gateway.insert_sample(&sample("b", at(8, 45), 10, 0.9)).await.unwrap();

        let range = DateRange::new(at(8, 0), at(8, 59)).unwrap();
        let records = gateway
            .get_historical(range, &[SegmentId::new("a")])
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        let record = records.first().unwrap();
        assert_eq!(record.hour_start, at(8, 0));
        assert_eq!(record.sample_count, 2);
        assert!((record.avg_speed - 50.0).abs() < 1e-9);
        assert!((record.avg_congestion - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn historical_estimates_empty_hours() {
        let gateway = InMemoryGateway::default();
        gateway.insert_segment(&road("a", 100)).await.unwrap();
        gateway.insert_segment(&road("a", 100)).await.unwrap();
        assert_eq!(gateway.segment_count().await, 1);

        let range = DateRange::new(at(17, 15), at(19, 0)).unwrap();
        let records = gateway.get_historical(range, &[]).await.unwrap();
        assert_eq!(records.len(), 3);
        for record in &records {
            assert_eq!(record.sample_count, 0);
            assert!((record.avg_congestion - 0.85).abs() < 1e-9);
            assert!((record.avg_speed - 15.0).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn persist_tick_writes_in_background() {
        let gateway = Arc::new(InMemoryGateway::default());
        let incident = Incident {
            id: IncidentId::new(),
            segment_id: None,
            incident_type: IncidentType::Construction,
            severity: 3,
            description: String::from("Utility work"),
            location: Coordinate(37.0, -122.0),
            start_time: at(9, 0),
            end_time: at(10, 0),
            status: IncidentStatus::Active,
        };
        let handle = persist_tick(
            Arc::clone(&gateway) as Arc<dyn PersistenceGateway>,
            1,
            vec![sample("a", at(9, 0), 30, 0.7), sample("b", at(9, 0), 60, 0.2)],
            vec![incident],
        );
        handle.await.unwrap();
        assert_eq!(gateway.sample_count().await, 2);
        assert_eq!(gateway.incident_count().await, 1);
    }
}
