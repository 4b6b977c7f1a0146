//! Traffic sampler: synthesizes one sample per segment, plus incidents.
//!
//! For every segment of the [`RoadNetwork`], in table order:
//!
//! 1. `base = base_congestion(hour(tick_time))`
//! 2. `noise ~ Uniform(-amplitude, amplitude)` (amplitude 0.15 by default)
//! 3. `congestion = round2(clamp(base + noise, 0, 1))`
//! 4. `speed = round(speed_limit * (1 - congestion))`
//! 5. `travel_time = round1(length_km / max(speed, 1) * 60)`
//! 6. with probability 0.05, an [`Incident`] on the segment
//!
//! # Determinism
//!
//! All randomness is drawn from the injected generator `R`, in a fixed order
//! per segment. [`Sampler::seeded`] therefore reproduces the same batches
//! (incident ids included) for the same seed and tick times.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Offset, TimeDelta, Utc};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use roadpulse_types::{
    Coordinate, Incident, IncidentId, IncidentStatus, IncidentType, RoadSegment, TrafficSample,
};

use crate::congestion::{base_congestion, hour_of_day};
use crate::network::RoadNetwork;

/// Default per-segment, per-tick incident probability.
pub const DEFAULT_INCIDENT_PROBABILITY: f64 = 0.05;

/// Default half-width of the uniform congestion noise.
pub const DEFAULT_NOISE_AMPLITUDE: f64 = 0.15;

/// Shortest expected incident duration, in minutes.
const MIN_INCIDENT_MINUTES: f64 = 30.0;

/// Longest expected incident duration, in minutes.
const MAX_INCIDENT_MINUTES: f64 = 150.0;

/// Divisor floor for travel-time computation, in km/h.
const MIN_DIVISOR_SPEED_KPH: u32 = 1;

/// Tunables of the sampler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerSettings {
    /// Probability in `[0, 1]` that a segment produces an incident on a tick.
    pub incident_probability: f64,
    /// Half-width in `[0, 1]` of the uniform congestion noise.
    pub noise_amplitude: f64,
    /// Offset used to derive the local hour of day from tick times.
    pub utc_offset: FixedOffset,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            incident_probability: DEFAULT_INCIDENT_PROBABILITY,
            noise_amplitude: DEFAULT_NOISE_AMPLITUDE,
            utc_offset: Utc.fix(),
        }
    }
}

/// Output of one sampling pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TickBatch {
    /// The tick time the batch was generated for.
    pub tick_time: DateTime<Utc>,
    /// One sample per segment, in network order.
    pub samples: Vec<TrafficSample>,
    /// Incidents produced on this tick (possibly none).
    pub incidents: Vec<Incident>,
}

/// Generates [`TickBatch`]es from the network and the congestion model.
#[derive(Debug)]
pub struct Sampler<R = StdRng> {
    network: Arc<RoadNetwork>,
    settings: SamplerSettings,
    rng: R,
}

impl Sampler<StdRng> {
    /// Create a sampler with a reproducible generator.
    pub fn seeded(network: Arc<RoadNetwork>, settings: SamplerSettings, seed: u64) -> Self {
        Self::with_rng(network, settings, StdRng::seed_from_u64(seed))
    }

    /// Create a sampler seeded from operating-system entropy.
    pub fn from_os_rng(network: Arc<RoadNetwork>, settings: SamplerSettings) -> Self {
        Self::with_rng(network, settings, StdRng::from_os_rng())
    }
}

impl<R: Rng> Sampler<R> {
    /// Create a sampler drawing randomness from `rng`.
    pub const fn with_rng(network: Arc<RoadNetwork>, settings: SamplerSettings, rng: R) -> Self {
        Self {
            network,
            settings,
            rng,
        }
    }

    /// The network being sampled.
    pub const fn network(&self) -> &Arc<RoadNetwork> {
        &self.network
    }

    /// The active settings.
    pub const fn settings(&self) -> &SamplerSettings {
        &self.settings
    }

    /// Generate one sample per segment and zero or more incidents.
    pub fn generate(&mut self, tick_time: DateTime<Utc>) -> TickBatch {
        let hour = hour_of_day(tick_time, self.settings.utc_offset);
        let base = base_congestion(hour);
        let probability = self.settings.incident_probability.clamp(0.0, 1.0);

        let network = Arc::clone(&self.network);
        let mut samples = Vec::with_capacity(network.len());
        let mut incidents = Vec::new();

        for segment in network.segments() {
            samples.push(self.sample_segment(segment, base, tick_time));
            if self.rng.random_bool(probability) {
                incidents.push(self.generate_incident(segment, tick_time));
            }
        }

        tracing::debug!(
            hour,
            base,
            samples = samples.len(),
            incidents = incidents.len(),
            "Sampled traffic"
        );

        TickBatch {
            tick_time,
            samples,
            incidents,
        }
    }

    fn sample_segment(
        &mut self,
        segment: &RoadSegment,
        base: f64,
        at: DateTime<Utc>,
    ) -> TrafficSample {
        let amplitude = self.settings.noise_amplitude.clamp(0.0, 1.0);
        let noise = if amplitude > 0.0 {
            self.rng.random_range(-amplitude..amplitude)
        } else {
            0.0
        };
        let congestion_level = round_to(clamp_unit(base + noise), 2);
        let current_speed_kph = derive_speed(segment.speed_limit_kph, congestion_level);

        TrafficSample {
            segment_id: segment.id.clone(),
            current_speed_kph,
            free_flow_speed_kph: segment.speed_limit_kph,
            congestion_level,
            travel_time_minutes: travel_time_minutes(segment.length_km, current_speed_kph),
            sampled_at: at,
        }
    }

    fn generate_incident(&mut self, segment: &RoadSegment, start_time: DateTime<Utc>) -> Incident {
        let incident_type = IncidentType::ALL
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(IncidentType::Accident);
        let severity: u8 = self.rng.random_range(1..=5);
        let description = incident_phrases(incident_type)
            .choose(&mut self.rng)
            .copied()
            .unwrap_or_default()
            .to_owned();

        let factor: f64 = self.rng.random();
        let location = match (segment.start(), segment.end()) {
            (Some(from), Some(to)) => from.lerp(to, factor),
            (Some(only), None) | (None, Some(only)) => only,
            (None, None) => Coordinate(0.0, 0.0),
        };

        let minutes = self
            .rng
            .random_range(MIN_INCIDENT_MINUTES..MAX_INCIDENT_MINUTES);
        let end_time = start_time
            .checked_add_signed(minutes_to_delta(minutes))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        // v7 layout with seeded random bits: ids sort by start time.
        let millis = u64::try_from(start_time.timestamp_millis()).unwrap_or(0);
        let random_bytes: [u8; 10] = self.rng.random();
        let id = IncidentId::from(
            uuid::Builder::from_unix_timestamp_millis(millis, &random_bytes).into_uuid(),
        );

        Incident {
            id,
            segment_id: Some(segment.id.clone()),
            incident_type,
            severity,
            description,
            location,
            start_time,
            end_time,
            status: IncidentStatus::Active,
        }
    }
}

/// Current speed for a speed limit and congestion level, rounded and
/// bounded to `0 ..= speed_limit_kph`.
pub fn derive_speed(speed_limit_kph: u32, congestion_level: f64) -> u32 {
    let raw = (f64::from(speed_limit_kph) * (1.0 - clamp_unit(congestion_level))).round();
    let bounded = raw.clamp(0.0, f64::from(speed_limit_kph));
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let speed = bounded as u32;
    speed
}

/// Minutes to traverse `length_km` at `speed_kph`, one decimal.
///
/// Speeds below 1 km/h are floored to 1 km/h for the division.
pub fn travel_time_minutes(length_km: f64, speed_kph: u32) -> f64 {
    let divisor = f64::from(speed_kph.max(MIN_DIVISOR_SPEED_KPH));
    round_to(length_km / divisor * 60.0, 1)
}

/// Description phrases for an incident type.
pub const fn incident_phrases(incident_type: IncidentType) -> &'static [&'static str] {
    match incident_type {
        IncidentType::Accident => &[
            "Multi-vehicle collision",
            "Rear-end collision",
            "Sideswipe accident",
            "Single vehicle crash",
        ],
        IncidentType::Construction => &[
            "Lane closure for maintenance",
            "Road construction ahead",
            "Bridge repair work",
            "Utility work",
        ],
        IncidentType::Closure => &[
            "Road closure due to event",
            "Emergency road closure",
            "Police activity",
            "Special event closure",
        ],
        IncidentType::Weather => &[
            "Heavy rain conditions",
            "Fog advisory",
            "High winds",
            "Flooding",
        ],
        IncidentType::Event => &[
            "Sporting event traffic",
            "Concert venue traffic",
            "Festival traffic",
            "Parade route",
        ],
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

fn minutes_to_delta(minutes: f64) -> TimeDelta {
    #[allow(clippy::cast_possible_truncation)]
    let millis = (minutes * 60_000.0).round() as i64;
    TimeDelta::try_milliseconds(millis).unwrap_or_else(|| TimeDelta::minutes(30))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use roadpulse_types::{RoadClass, SegmentId};

    use super::*;

    fn segment(id: &str, length_km: f64, speed_limit_kph: u32) -> RoadSegment {
        RoadSegment {
            id: SegmentId::new(id),
            name: id.to_uppercase(),
            class: RoadClass::Arterial,
            geometry: vec![Coordinate(37.0, -122.0), Coordinate(38.0, -121.0)],
            length_km,
            speed_limit_kph,
        }
    }

    fn two_segment_network() -> Arc<RoadNetwork> {
        Arc::new(RoadNetwork::new(vec![segment("A", 10.0, 100), segment("B", 5.0, 50)]).unwrap())
    }

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 12, hour, 0, 0).unwrap()
    }

    #[test]
    fn rush_hour_scenario() {
        let mut sampler = Sampler::seeded(two_segment_network(), SamplerSettings::default(), 7);
        for _ in 0..200 {
            let batch = sampler.generate(at_hour(8));
            assert_eq!(batch.samples.len(), 2);
            assert!(batch.incidents.len() <= 2);

            let a = batch.samples.first().unwrap();
            assert_eq!(a.segment_id.as_str(), "A");
            assert!((0.60..=0.90).contains(&a.congestion_level), "{}", a.congestion_level);
            assert_eq!(a.current_speed_kph, derive_speed(100, a.congestion_level));
            let expected_travel =
                (10.0 / f64::from(a.current_speed_kph) * 60.0 * 10.0).round() / 10.0;
            assert!((a.travel_time_minutes - expected_travel).abs() < 1e-9);
            assert_eq!(a.free_flow_speed_kph, 100);
        }
    }

    #[test]
    fn samples_respect_bounds_at_every_hour() {
        let network = Arc::new(RoadNetwork::default_network().unwrap());
        let mut sampler = Sampler::seeded(network, SamplerSettings::default(), 99);
        for hour in 0..24 {
            let batch = sampler.generate(at_hour(hour));
            for sample in &batch.samples {
                assert!((0.0..=1.0).contains(&sample.congestion_level));
                assert!(sample.current_speed_kph <= sample.free_flow_speed_kph);
                assert!(sample.travel_time_minutes > 0.0);
            }
        }
    }

    #[test]
    fn incidents_are_well_formed() {
        let settings = SamplerSettings {
            incident_probability: 1.0,
            ..SamplerSettings::default()
        };
        let mut sampler = Sampler::seeded(two_segment_network(), settings, 3);
        let start = at_hour(14);
        for _ in 0..50 {
            let batch = sampler.generate(start);
            assert_eq!(batch.incidents.len(), 2);
            for incident in &batch.incidents {
                assert!((1..=5).contains(&incident.severity));
                assert!(incident.end_time > incident.start_time);
                let minutes = (incident.end_time - incident.start_time).num_minutes();
                assert!((30..=150).contains(&minutes));
                assert!(incident_phrases(incident.incident_type)
                    .contains(&incident.description.as_str()));
                assert!((37.0..=38.0).contains(&incident.location.lat()));
                assert!((-122.0..=-121.0).contains(&incident.location.lng()));
                assert!(incident.is_active());
            }
        }
    }

    #[test]
    fn incident_ids_sort_by_start_time() {
        let settings = SamplerSettings {
            incident_probability: 1.0,
            ..SamplerSettings::default()
        };
        let mut sampler = Sampler::seeded(two_segment_network(), settings, 11);
        let earlier = sampler.generate(at_hour(9)).incidents;
        let later = sampler.generate(at_hour(10)).incidents;
        assert_eq!(earlier.len(), 2);
        assert_eq!(later.len(), 2);

        for old in &earlier {
            assert_eq!(old.id.into_inner().get_version_num(), 7);
            assert!(later.iter().all(|new| new.id > old.id));
        }
    }

    #[test]
    fn zero_probability_never_emits_incidents() {
        let settings = SamplerSettings {
            incident_probability: 0.0,
            ..SamplerSettings::default()
        };
        let mut sampler = Sampler::seeded(two_segment_network(), settings, 11);
        for _ in 0..100 {
            assert!(sampler.generate(at_hour(18)).incidents.is_empty());
        }
    }

    #[test]
    fn same_seed_reproduces_batches() {
        let mut a = Sampler::seeded(two_segment_network(), SamplerSettings::default(), 42);
        let mut b = Sampler::seeded(two_segment_network(), SamplerSettings::default(), 42);
        for hour in [3, 8, 12, 18] {
            assert_eq!(a.generate(at_hour(hour)), b.generate(at_hour(hour)));
        }
    }

    #[test]
    fn full_gridlock_keeps_travel_time_finite() {
        assert_eq!(derive_speed(100, 1.0), 0);
        let minutes = travel_time_minutes(10.0, 0);
        assert!(minutes.is_finite());
        assert!((minutes - 600.0).abs() < 1e-9);
    }

    #[test]
    fn derive_speed_never_exceeds_limit() {
        assert_eq!(derive_speed(50, 0.0), 50);
        assert_eq!(derive_speed(50, -0.5), 50);
        assert_eq!(derive_speed(50, 0.5), 25);
    }

    #[test]
    fn noiseless_sampler_hits_baseline() {
        let settings = SamplerSettings {
            noise_amplitude: 0.0,
            incident_probability: 0.0,
            ..SamplerSettings::default()
        };
        let mut sampler = Sampler::seeded(two_segment_network(), settings, 1);
        let batch = sampler.generate(at_hour(18));
        let b = batch.samples.get(1).unwrap();
        assert!((b.congestion_level - 0.85).abs() < 1e-9);
        assert_eq!(b.current_speed_kph, 8);
        assert!((b.travel_time_minutes - 37.5).abs() < 1e-9);
    }
}
