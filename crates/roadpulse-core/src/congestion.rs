//! Time-of-day congestion model.
//!
//! A pure lookup from hour of day to the baseline congestion the sampler
//! perturbs. The same table feeds the analytics projection and the
//! historical estimates, so every consumer agrees on what "typical" means.
//!
//! | Hours | Baseline |
//! |-------|----------|
//! | 07-09 | 0.75 (morning rush) |
//! | 17-19 | 0.85 (evening rush) |
//! | 10-16 | 0.35 (daytime) |
//! | 22-23, 00-05 | 0.10 (night) |
//! | otherwise | 0.25 |

use chrono::{DateTime, FixedOffset, Timelike, Utc};

/// Baseline congestion for an hour of day. Hours wrap modulo 24.
pub const fn base_congestion(hour: u32) -> f64 {
    match hour % 24 {
        7..=9 => 0.75,
        17..=19 => 0.85,
        10..=16 => 0.35,
        0..=5 | 22..=23 => 0.10,
        _ => 0.25,
    }
}

/// Hour of day of `at`, observed at the given UTC offset.
pub fn hour_of_day(at: DateTime<Utc>, offset: FixedOffset) -> u32 {
    at.with_timezone(&offset).hour()
}

/// The hour following `hour`, wrapping at midnight.
pub const fn next_hour(hour: u32) -> u32 {
    (hour % 24).saturating_add(1) % 24
}
