//! # Emission Schedule
//!
//! The emission rate is a right-continuous step function of time:
//!
//! ```text
//! rate(t) = 0                                   for t < genesis
//! rate(t) = initial_rate >> floor((t - genesis) / interval)
//!
//!   rate
//!    │ ────────┐
//!    │         └────────┐
//!    │                  └────────┐
//!    └─────────┴────────┴────────┴──── t
//!           g+I      g+2I     g+3I
//! ```
//!
//! The schedule holds no mutable state. It is built once from configuration
//! and shared read-only.

use serde::{Deserialize, Serialize};

use growlab_core::{Amount, LabError, Timestamp};

use crate::constants::*;

/// Emission era information
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmissionEra {
    /// Era number (0 = first interval after genesis)
    pub era: u64,
    /// Start timestamp
    pub start_time: Timestamp,
    /// End timestamp (exclusive)
    pub end_time: Timestamp,
    /// Rate per second per unit of power, in base units
    pub rate: Amount,
}

/// Emission schedule (Bitcoin-style halving)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmissionSchedule {
    /// Genesis timestamp (Unix seconds)
    genesis_time: Timestamp,
    /// Rate during era 0, base units per second per unit of power
    initial_rate: Amount,
    /// Halving interval in seconds
    halving_interval: u64,
}

impl Default for EmissionSchedule {
    fn default() -> Self {
        Self {
            genesis_time: DEFAULT_GENESIS_TIME,
            initial_rate: DEFAULT_INITIAL_RATE,
            halving_interval: DEFAULT_HALVING_INTERVAL_SECS,
        }
    }
}

impl EmissionSchedule {
    /// Create a schedule.
    ///
    /// The interval must be positive and fit in a signed timestamp.
    pub fn new(
        genesis_time: Timestamp,
        initial_rate: Amount,
        halving_interval: u64,
    ) -> Result<Self, LabError> {
        if halving_interval == 0 || halving_interval > i64::MAX as u64 {
            return Err(LabError::InvalidInput(format!(
                "halving interval must be in 1..={} seconds, got {}",
                i64::MAX,
                halving_interval
            )));
        }
        Ok(Self {
            genesis_time,
            initial_rate,
            halving_interval,
        })
    }

    pub fn genesis_time(&self) -> Timestamp {
        self.genesis_time
    }

    pub fn initial_rate(&self) -> Amount {
        self.initial_rate
    }

    pub fn halving_interval(&self) -> u64 {
        self.halving_interval
    }

    fn interval(&self) -> i64 {
        self.halving_interval as i64
    }

    /// Number of halvings elapsed at `timestamp` (0 before genesis)
    pub fn era_at(&self, timestamp: Timestamp) -> u64 {
        if timestamp < self.genesis_time {
            return 0;
        }
        let elapsed = (timestamp as i128 - self.genesis_time as i128) as u128;
        (elapsed / self.halving_interval as u128) as u64
    }

    /// Rate for a given era
    pub fn rate_for_era(&self, era: u64) -> Amount {
        if era >= MAX_HALVINGS {
            return 0;
        }
        self.initial_rate >> era
    }

    /// Instantaneous rate at `timestamp`, per second per unit of power
    pub fn rate_at(&self, timestamp: Timestamp) -> Amount {
        if timestamp < self.genesis_time {
            return 0;
        }
        self.rate_for_era(self.era_at(timestamp))
    }

    /// Smallest `genesis + k * interval` strictly greater than `timestamp`.
    ///
    /// `k` may be negative, so boundaries before genesis are reported too;
    /// the rate is zero on both sides of those.
    pub fn next_boundary_after(&self, timestamp: Timestamp) -> Timestamp {
        let interval = self.interval() as i128;
        let offset = timestamp as i128 - self.genesis_time as i128;
        let k = offset.div_euclid(interval) + 1;
        let boundary = self.genesis_time as i128 + k * interval;
        boundary.min(i64::MAX as i128) as Timestamp
    }

    /// Era information
    pub fn era_info(&self, era: u64) -> EmissionEra {
        let start = self.genesis_time as i128 + era as i128 * self.interval() as i128;
        let end = start + self.interval() as i128;
        EmissionEra {
            era,
            start_time: start.min(i64::MAX as i128) as Timestamp,
            end_time: end.min(i64::MAX as i128) as Timestamp,
            rate: self.rate_for_era(era),
        }
    }

    /// Whether every instant from `timestamp` on emits nothing
    pub fn exhausted_at(&self, timestamp: Timestamp) -> bool {
        timestamp >= self.genesis_time && self.rate_at(timestamp) == 0
    }
}
