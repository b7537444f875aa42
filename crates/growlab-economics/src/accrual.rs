//! # Reward Accrual
//!
//! Integrates the emission step function over an interval for a constant
//! power. The interval is cut at every halving boundary it contains and each
//! piece is credited at the rate in force at its start:
//!
//! ```text
//!  from            g+kI                 to
//!   ├──── rate_k ────┼──── rate_k+1 ────┤
//!   accrue = p·rate_k·(g+kI - from) + p·rate_k+1·(to - g+kI)
//! ```
//!
//! Amounts are integers, so the result is exactly additive over any
//! partition of the interval. Averaging the rate over a boundary-crossing
//! interval would misallocate reward between epochs.

use serde::{Deserialize, Serialize};

use growlab_core::{Account, Amount, LabError, Power, Timestamp};

use crate::emission::EmissionSchedule;

/// A maximal sub-interval lying within one halving epoch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSegment {
    /// Segment start (inclusive)
    pub start: Timestamp,
    /// Segment end (exclusive)
    pub end: Timestamp,
    /// Rate in force throughout the segment
    pub rate: Amount,
}

impl EpochSegment {
    pub fn duration(&self) -> u64 {
        (self.end as i128 - self.start as i128) as u64
    }

    /// Reward earned over this segment by `power`
    pub fn reward(&self, power: Power) -> Amount {
        (power as Amount)
            .saturating_mul(self.rate)
            .saturating_mul(self.duration() as Amount)
    }
}

/// Iterator over the epoch segments of `[from, to)`
pub struct EpochSegments<'a> {
    schedule: &'a EmissionSchedule,
    current: Timestamp,
    end: Timestamp,
}

impl Iterator for EpochSegments<'_> {
    type Item = EpochSegment;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.end {
            return None;
        }
        // Every later epoch has a zero rate as well
        if self.schedule.exhausted_at(self.current) {
            self.current = self.end;
            return None;
        }
        let boundary = self
            .schedule
            .next_boundary_after(self.current)
            .min(self.end);
        let segment = EpochSegment {
            start: self.current,
            end: boundary,
            rate: self.schedule.rate_at(self.current),
        };
        self.current = boundary;
        Some(segment)
    }
}

/// Accrual engine over an emission schedule
#[derive(Clone, Copy, Debug)]
pub struct AccrualEngine {
    schedule: EmissionSchedule,
}

impl AccrualEngine {
    /// Create an engine for a schedule
    pub fn new(schedule: EmissionSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &EmissionSchedule {
        &self.schedule
    }

    /// Epoch segments of `[from, to)` (empty when `to <= from`)
    pub fn segments(&self, from: Timestamp, to: Timestamp) -> EpochSegments<'_> {
        EpochSegments {
            schedule: &self.schedule,
            current: from,
            end: to,
        }
    }

    /// Exact reward earned by a constant `power` over `[from, to)`
    pub fn accrue(&self, power: Power, from: Timestamp, to: Timestamp) -> Result<Amount, LabError> {
        if to < from {
            return Err(LabError::InvalidInterval { from, to });
        }
        if to == from || power == 0 {
            return Ok(0);
        }

        let mut total: Amount = 0;
        let mut crossed = 0u32;
        for segment in self.segments(from, to) {
            total = total.saturating_add(segment.reward(power));
            crossed += 1;
        }

        tracing::debug!(power, from, to, segments = crossed, total = %total, "accrued");
        Ok(total)
    }

    /// Reward accrued by an account since its last settlement.
    ///
    /// A `now` earlier than `settled_at` accrues nothing.
    pub fn accrued_since_settlement(&self, account: &Account, now: Timestamp) -> Amount {
        if now <= account.settled_at {
            return 0;
        }
        self.accrue(account.power, account.settled_at, now)
            .unwrap_or_default()
    }

    /// Pending snapshot plus everything accrued since settlement
    pub fn pending_at(&self, account: &Account, now: Timestamp) -> Amount {
        account
            .pending_snapshot
            .saturating_add(self.accrued_since_settlement(account, now))
    }
}
