//! # GrowLab Economics - Emission & Accrual
//!
//! Reward emission for GrowLab labs, halving on a fixed schedule.
//!
//! ## Key Features
//!
//! - **Bitcoin-style halving**: the per-power emission rate halves every
//!   `halving_interval` seconds after genesis
//! - **Exact accrual**: rewards are integrated epoch by epoch, so an interval
//!   that crosses a halving boundary is credited at the right rate on each side
//!
//! ## Emission Schedule (defaults)
//!
//! | Era | Days since genesis | Rate per power | Per day (100 power) |
//! |-----|--------------------|----------------|---------------------|
//! | 0 | 0-14 | 0.5 / s | 4,320,000 |
//! | 1 | 14-28 | 0.25 / s | 2,160,000 |
//! | 2 | 28-42 | 0.125 / s | 1,080,000 |
//! | ... | ... | (halving continues) | ... |

pub mod accrual;
pub mod emission;

// Re-exports
pub use accrual::{AccrualEngine, EpochSegment};
pub use emission::{EmissionEra, EmissionSchedule};

/// Default emission constants
pub mod constants {
    use growlab_core::{Amount, Timestamp, UNITS_PER_TOKEN};

    /// Default genesis: 2024-01-01 00:00:00 UTC
    pub const DEFAULT_GENESIS_TIME: Timestamp = 1_704_067_200;

    /// Default initial rate: 0.5 token per second per unit of power
    pub const DEFAULT_INITIAL_RATE: Amount = UNITS_PER_TOKEN / 2;

    /// Default halving interval: 14 days
    pub const DEFAULT_HALVING_INTERVAL_SECS: u64 = 14 * 24 * 3600;

    /// Past this many halvings any u128 rate has reached zero
    pub const MAX_HALVINGS: u64 = 128;
}

pub use constants::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rate() {
        assert_eq!(DEFAULT_INITIAL_RATE, 500_000);
    }

    #[test]
    fn test_default_interval() {
        assert_eq!(DEFAULT_HALVING_INTERVAL_SECS, 1_209_600);
    }
}
