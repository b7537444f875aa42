//! Participant accounts
//!
//! An account is created once, when its lab is activated, and never deleted.
//! Rewards are folded into `pending_snapshot` whenever the account is settled,
//! and move into `cumulative_claimed` only through a claim.

use serde::{Deserialize, Serialize};

use crate::types::{AccountId, Amount, Power, Timestamp};

/// A participant's lab
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Participant identity
    pub id: AccountId,

    /// Reward weight
    pub power: Power,

    /// Total rewards ever claimed
    pub cumulative_claimed: Amount,

    /// Accrued but unclaimed rewards as of `settled_at`
    pub pending_snapshot: Amount,

    /// Instant through which rewards have been settled
    pub settled_at: Timestamp,

    /// Activation timestamp
    pub activated_at: Timestamp,
}

impl Account {
    /// Create a freshly activated account
    pub fn new(id: AccountId, power: Power, now: Timestamp) -> Self {
        Self {
            id,
            power,
            cumulative_claimed: 0,
            pending_snapshot: 0,
            settled_at: now,
            activated_at: now,
        }
    }

    /// Fold an accrued amount into the pending snapshot and advance `settled_at`.
    ///
    /// `settled_at` never moves backwards; a stale `now` folds nothing.
    pub fn fold_accrued(&mut self, accrued: Amount, now: Timestamp) {
        if now < self.settled_at {
            return;
        }
        self.pending_snapshot = self.pending_snapshot.saturating_add(accrued);
        self.settled_at = now;
    }

    /// Move the pending snapshot into the claimed total, returning the amount moved
    pub fn claim_pending(&mut self) -> Amount {
        let amount = self.pending_snapshot;
        self.pending_snapshot = 0;
        self.cumulative_claimed = self.cumulative_claimed.saturating_add(amount);
        amount
    }

    /// Increase power (upgrades only ever add)
    pub fn add_power(&mut self, bonus: Power) {
        self.power = self.power.saturating_add(bonus);
    }
}
