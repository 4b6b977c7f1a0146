//! REST API endpoint handlers for the Observer server.
//!
//! Every response uses the same envelope: `success`, `timestamp`, `data`
//! and, for lists, `count`. Errors are rendered by [`ObserverError`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/health` | Liveness, uptime, backend reachability and current tick |
//! | `GET` | `/api/traffic/segments` | Road segments, optionally by class |
//! | `GET` | `/api/traffic/realtime` | Latest sample per segment |
//! | `GET` | `/api/traffic/incidents` | Known incidents with filters |
//! | `GET` | `/api/traffic/summary` | Network summary of the cached samples |
//! | `GET` | `/api/traffic/historical` | Hourly aggregates over a date range |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use roadpulse_core::analytics::summarize;
use roadpulse_core::persistence::DateRange;
use roadpulse_types::{IncidentType, RoadClass, SegmentId, TrafficSample};
use serde::Serialize;

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

/// Query parameters for `GET /api/traffic/segments`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct SegmentsQuery {
    /// Road class filter (`highway`, `arterial`, `residential`).
    #[serde(alias = "type")]
    pub class: Option<String>,
}

/// Query parameters for `GET /api/traffic/realtime`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct RealtimeQuery {
    /// Comma-separated segment ids; all segments when absent.
    pub segments: Option<String>,
}

/// Query parameters for `GET /api/traffic/incidents`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct IncidentsQuery {
    /// Incident type filter.
    #[serde(rename = "type")]
    pub incident_type: Option<String>,
    /// Exact severity filter.
    pub severity: Option<u8>,
    /// `true` keeps only active incidents.
    pub active: Option<bool>,
}

/// Query parameters for `GET /api/traffic/historical`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct HistoricalQuery {
    /// Range start: `YYYY-MM-DD` (start of day) or RFC 3339.
    pub start_date: Option<String>,
    /// Range end: `YYYY-MM-DD` (end of day) or RFC 3339.
    pub end_date: Option<String>,
    /// Comma-separated segment ids; all segments when absent.
    pub segments: Option<String>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn list_response<T: Serialize>(items: &[T]) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "timestamp": Utc::now(),
        "data": items,
        "count": items.len(),
    }))
}

fn parse_segment_list(raw: Option<&str>) -> Vec<SegmentId> {
    raw.map(|list| {
        list.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(SegmentId::from)
            .collect()
    })
    .unwrap_or_default()
}

fn parse_road_class(raw: &str) -> Result<RoadClass, ObserverError> {
    [RoadClass::Highway, RoadClass::Arterial, RoadClass::Residential]
        .into_iter()
        .find(|class| class.as_str() == raw)
        .ok_or_else(|| ObserverError::InvalidQuery(format!("unknown road class: {raw}")))
}

fn parse_incident_type(raw: &str) -> Result<IncidentType, ObserverError> {
    IncidentType::ALL
        .into_iter()
        .find(|t| t.as_str() == raw)
        .ok_or_else(|| ObserverError::InvalidQuery(format!("unknown incident type: {raw}")))
}

/// Parse a range bound. A bare date means the first instant of the day for
/// `start` and the last for `end`.
fn parse_bound(name: &str, raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, ObserverError> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| ObserverError::InvalidQuery(format!("{name} is not a date: {raw} ({e})")))?;
    let time = if end_of_day {
        NaiveTime::from_hms_opt(23, 59, 59)
    } else {
        Some(NaiveTime::MIN)
    };
    time.map(|t| date.and_time(t).and_utc())
        .ok_or_else(|| ObserverError::InvalidQuery(format!("{name} is out of range: {raw}")))
}

// ---------------------------------------------------------------------------
// GET /api/health
// ---------------------------------------------------------------------------

/// Liveness probe with uptime, persistence backend and cache counters.
///
/// An unreachable backend reports `degraded`; the simulation keeps running
/// without it, so the response stays `200`.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let persistence_ok = match state.gateway.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Persistence backend unreachable");
            false
        }
    };

    let (tick, samples, incidents) = {
        let contents = state.cache.read().await;
        (
            contents.tick(),
            contents.sample_count(),
            contents.incident_count(),
        )
    };

    Json(serde_json::json!({
        "status": if persistence_ok { "healthy" } else { "degraded" },
        "timestamp": Utc::now(),
        "uptime_seconds": state.uptime_seconds(),
        "persistence": state.gateway.backend_name(),
        "persistence_reachable": persistence_ok,
        "tick": tick,
        "segments": state.network.len(),
        "cached_samples": samples,
        "cached_incidents": incidents,
        "connections": state.broker.connection_count().await,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/traffic/segments
// ---------------------------------------------------------------------------

/// List the road network, optionally restricted to one class.
pub async fn list_segments(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SegmentsQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let class = params.class.as_deref().map(parse_road_class).transpose()?;

    let segments: Vec<_> = state
        .network
        .segments()
        .iter()
        .filter(|segment| class.is_none_or(|c| segment.class == c))
        .collect();

    Ok(list_response(&segments))
}

// ---------------------------------------------------------------------------
// GET /api/traffic/realtime
// ---------------------------------------------------------------------------

/// Latest persisted sample of each requested segment.
pub async fn realtime(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RealtimeQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let mut ids = parse_segment_list(params.segments.as_deref());
    if ids.is_empty() {
        ids = state.network.ids().cloned().collect();
    }

    let samples = state.gateway.get_latest(&ids).await?;
    Ok(list_response(&samples))
}

// ---------------------------------------------------------------------------
// GET /api/traffic/incidents
// ---------------------------------------------------------------------------

/// Incidents held by the cache, filtered by type, severity and status.
pub async fn list_incidents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<IncidentsQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let incident_type = params
        .incident_type
        .as_deref()
        .map(parse_incident_type)
        .transpose()?;
    let active_only = params.active.unwrap_or(false);

    let incidents: Vec<_> = {
        let contents = state.cache.read().await;
        contents
            .incidents()
            .filter(|i| incident_type.is_none_or(|t| i.incident_type == t))
            .filter(|i| params.severity.is_none_or(|s| i.severity == s))
            .filter(|i| !active_only || i.is_active())
            .cloned()
            .collect()
    };

    Ok(list_response(&incidents))
}

// ---------------------------------------------------------------------------
// GET /api/traffic/summary
// ---------------------------------------------------------------------------

/// Network summary over the cached samples.
pub async fn summary(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let samples: Vec<TrafficSample> = state.cache.read().await.samples().cloned().collect();

    Json(serde_json::json!({
        "success": true,
        "timestamp": Utc::now(),
        "data": summarize(&samples),
    }))
}

// ---------------------------------------------------------------------------
// GET /api/traffic/historical
// ---------------------------------------------------------------------------

/// Hourly averages between `start_date` and `end_date`. Both are required.
pub async fn historical(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoricalQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let (Some(start_raw), Some(end_raw)) = (params.start_date.as_deref(), params.end_date.as_deref())
    else {
        return Err(ObserverError::InvalidQuery(String::from(
            "start_date and end_date are required",
        )));
    };

    let start = parse_bound("start_date", start_raw, false)?;
    let end = parse_bound("end_date", end_raw, true)?;
    let range = DateRange::new(start, end)?;
    let ids = parse_segment_list(params.segments.as_deref());

    let records = state.gateway.get_historical(range, &ids).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "timestamp": Utc::now(),
        "data": records,
        "count": records.len(),
        "aggregation": "hourly",
    })))
}
