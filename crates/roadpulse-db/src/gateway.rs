//! [`PersistenceGateway`] backed by `PostgreSQL`.

use async_trait::async_trait;
use roadpulse_core::persistence::{DateRange, PersistenceError, PersistenceGateway};
use roadpulse_types::{HistoricalRecord, Incident, RoadSegment, SegmentId, TrafficSample};

use crate::incident_store::IncidentStore;
use crate::postgres::PostgresPool;
use crate::sample_store::SampleStore;
use crate::segment_store::SegmentStore;

/// Persistence gateway writing to the `roadpulse` schema.
#[derive(Debug, Clone)]
pub struct PostgresGateway {
    pool: PostgresPool,
}

impl PostgresGateway {
    /// Wrap a connected, migrated pool.
    pub const fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PersistenceGateway for PostgresGateway {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<(), PersistenceError> {
        Ok(self.pool.ping().await?)
    }

    async fn insert_segment(&self, segment: &RoadSegment) -> Result<(), PersistenceError> {
        SegmentStore::new(self.pool.pool()).upsert(segment).await?;
        Ok(())
    }

    async fn insert_sample(&self, sample: &TrafficSample) -> Result<(), PersistenceError> {
        self.insert_samples(std::slice::from_ref(sample)).await
    }

    /// One `UNNEST` insert per call.
    async fn insert_samples(&self, samples: &[TrafficSample]) -> Result<(), PersistenceError> {
        Ok(SampleStore::new(self.pool.pool())
            .batch_insert(samples)
            .await?)
    }

    async fn insert_incident(&self, incident: &Incident) -> Result<(), PersistenceError> {
        IncidentStore::new(self.pool.pool()).upsert(incident).await?;
        Ok(())
    }

    async fn get_latest(
        &self,
        segment_ids: &[SegmentId],
    ) -> Result<Vec<TrafficSample>, PersistenceError> {
        Ok(SampleStore::new(self.pool.pool()).latest(segment_ids).await?)
    }

    async fn get_historical(
        &self,
        range: DateRange,
        segment_ids: &[SegmentId],
    ) -> Result<Vec<HistoricalRecord>, PersistenceError> {
        Ok(SampleStore::new(self.pool.pool())
            .hourly(range.start(), range.end(), segment_ids)
            .await?)
    }
}
