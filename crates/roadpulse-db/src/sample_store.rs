//! Traffic sample storage and hourly aggregation.
//!
//! Samples are append-only. A tick's batch is written with a single
//! `UNNEST` insert so one tick costs one round-trip.

use chrono::{DateTime, Utc};
use roadpulse_types::{HistoricalRecord, SegmentId, TrafficSample};
use sqlx::PgPool;

use crate::error::DbError;

/// Operations on the `traffic_samples` table.
pub struct SampleStore<'a> {
    pool: &'a PgPool,
}

impl<'a> SampleStore<'a> {
    /// Create a sample store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Append samples in one statement.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn batch_insert(&self, samples: &[TrafficSample]) -> Result<(), DbError> {
        if samples.is_empty() {
            return Ok(());
        }

        let len = samples.len();
        let mut segment_ids = Vec::with_capacity(len);
        let mut speeds = Vec::with_capacity(len);
        let mut free_flow = Vec::with_capacity(len);
        let mut congestion = Vec::with_capacity(len);
        let mut travel = Vec::with_capacity(len);
        let mut recorded = Vec::with_capacity(len);

        for sample in samples {
            segment_ids.push(sample.segment_id.as_str().to_owned());
            speeds.push(to_db_int(sample.current_speed_kph));
            free_flow.push(to_db_int(sample.free_flow_speed_kph));
            congestion.push(sample.congestion_level);
            travel.push(sample.travel_time_minutes);
            recorded.push(sample.sampled_at);
        }

        sqlx::query(
            r"INSERT INTO traffic_samples (segment_id, current_speed, free_flow_speed, congestion_level, travel_time_minutes, recorded_at)
              SELECT * FROM UNNEST($1::TEXT[], $2::INTEGER[], $3::INTEGER[], $4::DOUBLE PRECISION[], $5::DOUBLE PRECISION[], $6::TIMESTAMPTZ[])",
        )
        .bind(&segment_ids)
        .bind(&speeds)
        .bind(&free_flow)
        .bind(&congestion)
        .bind(&travel)
        .bind(&recorded)
        .execute(self.pool)
        .await?;

        tracing::debug!(count = len, "Inserted traffic samples (batch UNNEST)");
        Ok(())
    }

    /// Most recent sample per segment. An empty `segment_ids` means all.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails or a row cannot be decoded.
    pub async fn latest(&self, segment_ids: &[SegmentId]) -> Result<Vec<TrafficSample>, DbError> {
        let ids = id_strings(segment_ids);
        let rows = sqlx::query_as::<_, SampleRow>(
            r"SELECT DISTINCT ON (segment_id)
                     segment_id, current_speed, free_flow_speed, congestion_level, travel_time_minutes, recorded_at
              FROM traffic_samples
              WHERE cardinality($1::TEXT[]) = 0 OR segment_id = ANY($1)
              ORDER BY segment_id, recorded_at DESC",
        )
        .bind(&ids)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(SampleRow::into_sample).collect()
    }

    /// Hourly averages between `start` and `end` inclusive, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn hourly(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        segment_ids: &[SegmentId],
    ) -> Result<Vec<HistoricalRecord>, DbError> {
        let ids = id_strings(segment_ids);
        let rows = sqlx::query_as::<_, HourlyRow>(
            r"SELECT date_trunc('hour', recorded_at) AS hour_start,
                     AVG(current_speed)::DOUBLE PRECISION AS avg_speed,
                     AVG(congestion_level)::DOUBLE PRECISION AS avg_congestion,
                     COUNT(*) AS sample_count
              FROM traffic_samples
              WHERE recorded_at BETWEEN $1 AND $2
                AND (cardinality($3::TEXT[]) = 0 OR segment_id = ANY($3))
              GROUP BY 1
              ORDER BY 1",
        )
        .bind(start)
        .bind(end)
        .bind(&ids)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(HourlyRow::into_record).collect())
    }
}

fn id_strings(segment_ids: &[SegmentId]) -> Vec<String> {
    segment_ids.iter().map(|id| id.as_str().to_owned()).collect()
}

fn to_db_int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn from_db_int(column: &'static str, value: i32) -> Result<u32, DbError> {
    u32::try_from(value).map_err(|e| DbError::InvalidValue {
        column,
        value: format!("{value} ({e})"),
    })
}

/// A row from the `traffic_samples` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SampleRow {
    /// Measured segment.
    pub segment_id: String,
    /// Observed speed in km/h.
    pub current_speed: i32,
    /// Free-flow speed in km/h.
    pub free_flow_speed: i32,
    /// Congestion in `[0, 1]`.
    pub congestion_level: f64,
    /// Travel time in minutes.
    pub travel_time_minutes: f64,
    /// Sample time.
    pub recorded_at: DateTime<Utc>,
}

impl SampleRow {
    /// Convert the row into a domain [`TrafficSample`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidValue`] for negative speeds.
    pub fn into_sample(self) -> Result<TrafficSample, DbError> {
        Ok(TrafficSample {
            segment_id: SegmentId::new(self.segment_id),
            current_speed_kph: from_db_int("current_speed", self.current_speed)?,
            free_flow_speed_kph: from_db_int("free_flow_speed", self.free_flow_speed)?,
            congestion_level: self.congestion_level,
            travel_time_minutes: self.travel_time_minutes,
            sampled_at: self.recorded_at,
        })
    }
}

/// One aggregated hour.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HourlyRow {
    /// Start of the hour.
    pub hour_start: DateTime<Utc>,
    /// Mean speed.
    pub avg_speed: Option<f64>,
    /// Mean congestion.
    pub avg_congestion: Option<f64>,
    /// Samples in the hour.
    pub sample_count: i64,
}

impl HourlyRow {
    /// Convert into a [`HistoricalRecord`].
    pub fn into_record(self) -> HistoricalRecord {
        HistoricalRecord {
            hour_start: self.hour_start,
            avg_speed: self.avg_speed.unwrap_or_default(),
            avg_congestion: self.avg_congestion.unwrap_or_default(),
            sample_count: u64::try_from(self.sample_count).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sample_row_round_trips_units() {
        let at = Utc::now();
        let sample = SampleRow {
            segment_id: "hwy_101_north".to_owned(),
            current_speed: 42,
            free_flow_speed: 100,
            congestion_level: 0.58,
            travel_time_minutes: 17.9,
            recorded_at: at,
        }
        .into_sample()
        .unwrap();
        assert_eq!(sample.current_speed_kph, 42);
        assert_eq!(sample.free_flow_speed_kph, 100);
        assert_eq!(sample.sampled_at, at);
    }

    #[test]
    fn negative_speed_is_rejected() {
        let row = SampleRow {
            segment_id: "a".to_owned(),
            current_speed: -1,
            free_flow_speed: 100,
            congestion_level: 0.5,
            travel_time_minutes: 1.0,
            recorded_at: Utc::now(),
        };
        assert!(matches!(
            row.into_sample(),
            Err(DbError::InvalidValue {
                column: "current_speed",
                ..
            })
        ));
    }

    #[test]
    fn hourly_row_defaults_missing_averages() {
        let record = HourlyRow {
            hour_start: Utc::now(),
            avg_speed: None,
            avg_congestion: Some(0.4),
            sample_count: 3,
        }
        .into_record();
        assert_eq!(record.sample_count, 3);
        assert!(record.avg_speed.abs() < f64::EPSILON);
    }

    #[test]
    fn db_int_saturates() {
        assert_eq!(to_db_int(u32::MAX), i32::MAX);
        assert_eq!(to_db_int(80), 80);
    }
}
