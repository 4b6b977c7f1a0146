//! Incident storage.
//!
//! Incidents are keyed by their UUID; writing an incident twice replaces the
//! stored row, so status changes can be persisted with the same call.

use chrono::{DateTime, Utc};
use roadpulse_types::{Coordinate, Incident, IncidentId, IncidentStatus, IncidentType, SegmentId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DbError;

/// Operations on the `traffic_incidents` table.
pub struct IncidentStore<'a> {
    pool: &'a PgPool,
}

impl<'a> IncidentStore<'a> {
    /// Create an incident store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert or replace an incident.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the upsert fails.
    pub async fn upsert(&self, incident: &Incident) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO traffic_incidents
                (incident_id, segment_id, incident_type, severity, description, latitude, longitude, start_time, end_time, status)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
              ON CONFLICT (incident_id) DO UPDATE
                SET status = EXCLUDED.status,
                    end_time = EXCLUDED.end_time",
        )
        .bind(incident.id.into_inner())
        .bind(incident.segment_id.as_ref().map(SegmentId::as_str))
        .bind(incident.incident_type.as_str())
        .bind(i16::from(incident.severity))
        .bind(&incident.description)
        .bind(incident.location.lat())
        .bind(incident.location.lng())
        .bind(incident.start_time)
        .bind(incident.end_time)
        .bind(status_to_db(incident.status))
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Incidents still marked active, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails or a row cannot be decoded.
    pub async fn active(&self) -> Result<Vec<Incident>, DbError> {
        let rows = sqlx::query_as::<_, IncidentRow>(
            r"SELECT incident_id, segment_id, incident_type, severity, description, latitude, longitude, start_time, end_time, status
              FROM traffic_incidents
              WHERE status = 'active'
              ORDER BY start_time DESC",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(IncidentRow::into_incident).collect()
    }
}

const fn status_to_db(status: IncidentStatus) -> &'static str {
    match status {
        IncidentStatus::Active => "active",
        IncidentStatus::Resolved => "resolved",
    }
}

fn status_from_db(value: &str) -> Result<IncidentStatus, DbError> {
    match value {
        "active" => Ok(IncidentStatus::Active),
        "resolved" => Ok(IncidentStatus::Resolved),
        other => Err(DbError::InvalidValue {
            column: "status",
            value: other.to_owned(),
        }),
    }
}

fn incident_type_from_db(value: &str) -> Result<IncidentType, DbError> {
    IncidentType::ALL
        .into_iter()
        .find(|t| t.as_str() == value)
        .ok_or_else(|| DbError::InvalidValue {
            column: "incident_type",
            value: value.to_owned(),
        })
}

/// A row from the `traffic_incidents` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IncidentRow {
    /// Incident id.
    pub incident_id: Uuid,
    /// Segment, if any.
    pub segment_id: Option<String>,
    /// Incident type as stored.
    pub incident_type: String,
    /// Severity 1-5.
    pub severity: i16,
    /// Description.
    pub description: String,
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
    /// Start time.
    pub start_time: DateTime<Utc>,
    /// Expected end time.
    pub end_time: DateTime<Utc>,
    /// Status as stored.
    pub status: String,
}

impl IncidentRow {
    /// Convert the row into a domain [`Incident`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidValue`] for unknown types or statuses and
    /// out-of-range severities.
    pub fn into_incident(self) -> Result<Incident, DbError> {
        let severity = u8::try_from(self.severity)
            .ok()
            .filter(|s| (1..=5).contains(s))
            .ok_or_else(|| DbError::InvalidValue {
                column: "severity",
                value: self.severity.to_string(),
            })?;

        Ok(Incident {
            id: IncidentId::from(self.incident_id),
            segment_id: self.segment_id.map(SegmentId::new),
            incident_type: incident_type_from_db(&self.incident_type)?,
            severity,
            description: self.description,
            location: Coordinate(self.latitude, self.longitude),
            start_time: self.start_time,
            end_time: self.end_time,
            status: status_from_db(&self.status)?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn row() -> IncidentRow {
        let start = Utc::now();
        IncidentRow {
            incident_id: Uuid::now_v7(),
            segment_id: Some("lombard_st".to_owned()),
            incident_type: "closure".to_owned(),
            severity: 4,
            description: "Police activity".to_owned(),
            latitude: 37.8,
            longitude: -122.42,
            start_time: start,
            end_time: start + TimeDelta::minutes(90),
            status: "active".to_owned(),
        }
    }

    #[test]
    fn row_converts_to_incident() {
        let incident = row().into_incident().unwrap();
        assert_eq!(incident.incident_type, IncidentType::Closure);
        assert_eq!(incident.severity, 4);
        assert!(incident.is_active());
        assert_eq!(incident.segment_id, Some(SegmentId::new("lombard_st")));
    }

    #[test]
    fn rejects_out_of_range_severity() {
        let mut bad = row();
        bad.severity = 9;
        assert!(bad.into_incident().is_err());
    }

    #[test]
    fn status_round_trips() {
        for status in [IncidentStatus::Active, IncidentStatus::Resolved] {
            assert_eq!(status_from_db(status_to_db(status)).unwrap(), status);
        }
        assert!(status_from_db("closed").is_err());
    }
}
