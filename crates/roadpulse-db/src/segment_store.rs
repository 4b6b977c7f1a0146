//! Road segment registration.
//!
//! Segments are written once at startup so samples and incidents can
//! reference them. Re-registering a segment refreshes its attributes.

use roadpulse_types::{RoadClass, RoadSegment, SegmentId};
use sqlx::PgPool;

use crate::error::DbError;

/// Operations on the `road_segments` table.
pub struct SegmentStore<'a> {
    pool: &'a PgPool,
}

impl<'a> SegmentStore<'a> {
    /// Create a segment store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a segment, or update it if the id already exists.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if the geometry cannot be encoded
    /// and [`DbError::Postgres`] if the upsert fails.
    pub async fn upsert(&self, segment: &RoadSegment) -> Result<(), DbError> {
        let coordinates = serde_json::to_value(&segment.geometry)?;
        sqlx::query(
            r"INSERT INTO road_segments (segment_id, name, road_class, coordinates, length_km, speed_limit)
              VALUES ($1, $2, $3, $4, $5, $6)
              ON CONFLICT (segment_id) DO UPDATE
                SET name = EXCLUDED.name,
                    road_class = EXCLUDED.road_class,
                    coordinates = EXCLUDED.coordinates,
                    length_km = EXCLUDED.length_km,
                    speed_limit = EXCLUDED.speed_limit",
        )
        .bind(segment.id.as_str())
        .bind(&segment.name)
        .bind(segment.class.as_str())
        .bind(coordinates)
        .bind(segment.length_km)
        .bind(i32::try_from(segment.speed_limit_kph).unwrap_or(i32::MAX))
        .execute(self.pool)
        .await?;

        tracing::debug!(segment_id = %segment.id, "Registered road segment");
        Ok(())
    }

    /// All registered segments, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails or a row cannot be decoded.
    pub async fn list(&self) -> Result<Vec<RoadSegment>, DbError> {
        let rows = sqlx::query_as::<_, SegmentRow>(
            r"SELECT segment_id, name, road_class, coordinates, length_km, speed_limit
              FROM road_segments
              ORDER BY segment_id",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(SegmentRow::into_segment).collect()
    }
}

/// A row from the `road_segments` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SegmentRow {
    /// Segment identifier.
    pub segment_id: String,
    /// Human-readable name.
    pub name: String,
    /// Road class as stored (`highway`, `arterial`, `residential`).
    pub road_class: String,
    /// Geometry as a JSON array of `[lat, lng]` pairs.
    pub coordinates: serde_json::Value,
    /// Length in kilometres.
    pub length_km: f64,
    /// Speed limit in km/h.
    pub speed_limit: i32,
}

impl SegmentRow {
    /// Convert the row into a domain [`RoadSegment`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] for unknown road classes, malformed geometry or a
    /// negative speed limit.
    pub fn into_segment(self) -> Result<RoadSegment, DbError> {
        Ok(RoadSegment {
            class: road_class_from_db(&self.road_class)?,
            geometry: serde_json::from_value(self.coordinates)?,
            speed_limit_kph: u32::try_from(self.speed_limit).map_err(|e| DbError::InvalidValue {
                column: "speed_limit",
                value: format!("{} ({e})", self.speed_limit),
            })?,
            id: SegmentId::new(self.segment_id),
            name: self.name,
            length_km: self.length_km,
        })
    }
}

fn road_class_from_db(value: &str) -> Result<RoadClass, DbError> {
    [RoadClass::Highway, RoadClass::Arterial, RoadClass::Residential]
        .into_iter()
        .find(|class| class.as_str() == value)
        .ok_or_else(|| DbError::InvalidValue {
            column: "road_class",
            value: value.to_owned(),
        })
}
