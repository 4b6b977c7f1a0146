//! Road network model.
//!
//! The network is a static, validated table of [`RoadSegment`]s loaded once
//! at startup. Table order is preserved: the sampler walks segments in that
//! order, which keeps seeded runs reproducible.

use std::collections::BTreeMap;

use roadpulse_types::{Coordinate, RoadClass, RoadSegment, SegmentId};

/// Errors raised while validating a road network.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Two segments share an identifier.
    #[error("duplicate segment id: {0}")]
    DuplicateSegment(SegmentId),

    /// A segment has a non-positive or non-finite length.
    #[error("segment {0} has invalid length {1} km")]
    InvalidLength(SegmentId, f64),

    /// A segment has a zero speed limit.
    #[error("segment {0} has a zero speed limit")]
    InvalidSpeedLimit(SegmentId),

    /// A segment geometry has fewer than two points or non-finite coordinates.
    #[error("segment {0} has invalid geometry: {1}")]
    InvalidGeometry(SegmentId, String),

    /// The network contains no segments.
    #[error("road network is empty")]
    Empty,
}

/// Immutable, validated set of road segments.
#[derive(Debug, Clone)]
pub struct RoadNetwork {
    segments: Vec<RoadSegment>,
    index: BTreeMap<SegmentId, usize>,
}

impl RoadNetwork {
    /// Validate and build a network from a segment list.
    ///
    /// # Errors
    ///
    /// Returns a [`NetworkError`] naming the first offending segment.
    pub fn new(segments: Vec<RoadSegment>) -> Result<Self, NetworkError> {
        if segments.is_empty() {
            return Err(NetworkError::Empty);
        }

        let mut index = BTreeMap::new();
        for (position, segment) in segments.iter().enumerate() {
            validate_segment(segment)?;
            if index.insert(segment.id.clone(), position).is_some() {
                return Err(NetworkError::DuplicateSegment(segment.id.clone()));
            }
        }

        Ok(Self { segments, index })
    }

    /// The built-in San Francisco demonstration network.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the table is validated like any other input.
    pub fn default_network() -> Result<Self, NetworkError> {
        Self::new(default_segments())
    }

    /// Segments in table order.
    pub fn segments(&self) -> &[RoadSegment] {
        &self.segments
    }

    /// Look up a segment by id.
    pub fn get(&self, id: &SegmentId) -> Option<&RoadSegment> {
        self.index.get(id).and_then(|&i| self.segments.get(i))
    }

    /// Whether the network contains `id`.
    pub fn contains(&self, id: &SegmentId) -> bool {
        self.index.contains_key(id)
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always `false` for a constructed network; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segment ids in table order.
    pub fn ids(&self) -> impl Iterator<Item = &SegmentId> {
        self.segments.iter().map(|s| &s.id)
    }
}

fn validate_segment(segment: &RoadSegment) -> Result<(), NetworkError> {
    if !segment.length_km.is_finite() || segment.length_km <= 0.0 {
        return Err(NetworkError::InvalidLength(
            segment.id.clone(),
            segment.length_km,
        ));
    }
    if segment.speed_limit_kph == 0 {
        return Err(NetworkError::InvalidSpeedLimit(segment.id.clone()));
    }
    if segment.geometry.len() < 2 {
        return Err(NetworkError::InvalidGeometry(
            segment.id.clone(),
            format!("{} point(s), need at least 2", segment.geometry.len()),
        ));
    }
    if let Some(bad) = segment.geometry.iter().find(|c| !c.is_finite()) {
        return Err(NetworkError::InvalidGeometry(
            segment.id.clone(),
            format!("non-finite coordinate {bad:?}"),
        ));
    }
    Ok(())
}

fn segment(
    id: &str,
    name: &str,
    class: RoadClass,
    length_km: f64,
    speed_limit_kph: u32,
    from: (f64, f64),
    to: (f64, f64),
) -> RoadSegment {
    RoadSegment {
        id: SegmentId::new(id),
        name: name.to_owned(),
        class,
        geometry: vec![Coordinate(from.0, from.1), Coordinate(to.0, to.1)],
        length_km,
        speed_limit_kph,
    }
}

/// The 16 segments of the demonstration network.
pub fn default_segments() -> Vec<RoadSegment> {
    use RoadClass::{Arterial, Highway, Residential};

    vec![
        // Major highways
        segment("hwy_101_north", "Highway 101 North", Highway, 12.5, 100, (37.7749, -122.4194), (37.8044, -122.2711)),
        segment("hwy_101_south", "Highway 101 South", Highway, 12.5, 100, (37.8044, -122.2711), (37.7749, -122.4194)),
        segment("hwy_280_north", "Highway 280 North", Highway, 15.2, 110, (37.7749, -122.4194), (37.8044, -122.2711)),
        segment("hwy_280_south", "Highway 280 South", Highway, 15.2, 110, (37.8044, -122.2711), (37.7749, -122.4194)),
        // Urban arterials
        segment("market_st", "Market Street", Arterial, 3.2, 50, (37.7849, -122.4094), (37.7749, -122.4194)),
        segment("van_ness_ave", "Van Ness Avenue", Arterial, 4.1, 45, (37.8044, -122.4211), (37.7749, -122.4194)),
        segment("geary_blvd", "Geary Boulevard", Arterial, 8.5, 40, (37.7849, -122.4094), (37.7749, -122.4594)),
        segment("lombard_st", "Lombard Street", Arterial, 2.8, 35, (37.8044, -122.4211), (37.7944, -122.4311)),
        // Residential streets
        segment("fillmore_st", "Fillmore Street", Residential, 2.1, 30, (37.7849, -122.4294), (37.7749, -122.4194)),
        segment("haight_st", "Haight Street", Residential, 1.8, 25, (37.7749, -122.4294), (37.7649, -122.4394)),
        segment("castro_st", "Castro Street", Residential, 1.5, 25, (37.7649, -122.4394), (37.7549, -122.4494)),
        segment("mission_st", "Mission Street", Arterial, 5.2, 35, (37.7849, -122.4094), (37.7649, -122.4194)),
        // Bridge approaches
        segment("bay_bridge_east", "Bay Bridge East Approach", Highway, 4.8, 80, (37.8044, -122.4211), (37.8244, -122.4011)),
        segment("bay_bridge_west", "Bay Bridge West Approach", Highway, 4.8, 80, (37.8244, -122.4011), (37.8044, -122.4211)),
        segment("golden_gate_north", "Golden Gate Bridge North", Highway, 2.7, 70, (37.8044, -122.4711), (37.8344, -122.4811)),
        segment("golden_gate_south", "Golden Gate Bridge South", Highway, 2.7, 70, (37.8344, -122.4811), (37.8044, -122.4711)),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn two_point(id: &str, length_km: f64, speed_limit_kph: u32) -> RoadSegment {
        segment(
            id,
            id,
            RoadClass::Arterial,
            length_km,
            speed_limit_kph,
            (0.0, 0.0),
            (1.0, 1.0),
        )
    }

    #[test]
    fn default_network_is_valid() {
        let network = RoadNetwork::default_network().unwrap();
        assert_eq!(network.len(), 16);
        assert!(network.contains(&SegmentId::new("market_st")));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let result = RoadNetwork::new(vec![two_point("a", 1.0, 50), two_point("a", 2.0, 50)]);
        assert!(matches!(result, Err(NetworkError::DuplicateSegment(_))));
    }

    #[test]
    fn rejects_bad_length_and_speed() {
        assert!(matches!(
            RoadNetwork::new(vec![two_point("a", 0.0, 50)]),
            Err(NetworkError::InvalidLength(..))
        ));
        assert!(matches!(
            RoadNetwork::new(vec![two_point("a", f64::NAN, 50)]),
            Err(NetworkError::InvalidLength(..))
        ));
        assert!(matches!(
            RoadNetwork::new(vec![two_point("a", 1.0, 0)]),
            Err(NetworkError::InvalidSpeedLimit(_))
        ));
    }

    #[test]
    fn rejects_short_geometry() {
        let mut seg = two_point("a", 1.0, 50);
        seg.geometry.truncate(1);
        assert!(matches!(
            RoadNetwork::new(vec![seg]),
            Err(NetworkError::InvalidGeometry(..))
        ));
    }

    #[test]
    fn rejects_empty_network() {
        assert!(matches!(RoadNetwork::new(Vec::new()), Err(NetworkError::Empty)));
    }

    #[test]
    fn preserves_table_order() {
        let network = RoadNetwork::new(vec![two_point("b", 1.0, 50), two_point("a", 1.0, 50)]);
        let ids: Vec<String> = network
            .map(|n| n.ids().map(ToString::to_string).collect())
            .unwrap_or_default();
        assert_eq!(ids, vec!["b".to_owned(), "a".to_owned()]);
    }
}
