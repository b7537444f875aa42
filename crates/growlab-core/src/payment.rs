//! Payment records
//!
//! One record per external transaction reference. Verification and
//! consumption are separate events: a payment can be verified and then the
//! process can stop before the benefit is applied, so a retry must be able to
//! see "verified, not consumed" and resume from there.

use serde::{Deserialize, Serialize};

use crate::types::{AccountId, Amount, Power, Timestamp, TxReference};

/// What a payment buys
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentPurpose {
    /// Lab activation
    Activation,
    /// Booster pack (power upgrade)
    Upgrade,
}

/// Position of a record in the payment state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PaymentStage {
    Recorded,
    Verified,
    Consumed,
}

/// A payment keyed by its transaction reference
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// External transaction reference
    pub reference: TxReference,

    /// Identity that submitted the reference
    pub payer: AccountId,

    /// Amount transferred (as reported by the verifier once verified)
    pub amount: Amount,

    /// What the payment is applied to
    pub purpose: PaymentPurpose,

    /// Whether the payment has been verified
    pub verified: bool,

    /// Verification timestamp
    pub verified_at: Option<Timestamp>,

    /// Whether the payment has been applied
    pub consumed: bool,

    /// Consumption timestamp
    pub consumed_at: Option<Timestamp>,

    /// Power added to the payer's account by this payment (upgrades only)
    pub granted_power: Option<Power>,

    /// When the upgrade bonus reached the account
    pub applied_at: Option<Timestamp>,

    /// First-seen timestamp
    pub recorded_at: Timestamp,
}

impl PaymentRecord {
    /// Create an unverified record
    pub fn new(
        reference: TxReference,
        payer: AccountId,
        amount: Amount,
        purpose: PaymentPurpose,
        now: Timestamp,
    ) -> Self {
        Self {
            reference,
            payer,
            amount,
            purpose,
            verified: false,
            verified_at: None,
            consumed: false,
            consumed_at: None,
            granted_power: None,
            applied_at: None,
            recorded_at: now,
        }
    }

    /// Current stage
    pub fn stage(&self) -> PaymentStage {
        if self.consumed {
            PaymentStage::Consumed
        } else if self.verified {
            PaymentStage::Verified
        } else {
            PaymentStage::Recorded
        }
    }

    /// Verified but not yet applied
    pub fn awaiting_consumption(&self) -> bool {
        self.verified && !self.consumed
    }

    /// Consumed for an upgrade whose bonus never reached the account
    pub fn upgrade_unapplied(&self) -> bool {
        self.consumed && self.purpose == PaymentPurpose::Upgrade && self.applied_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_progression() {
        let mut rec = PaymentRecord::new(
            TxReference::parse("aa11").unwrap(),
            AccountId::parse("addr1").unwrap(),
            1_000_000,
            PaymentPurpose::Activation,
            10,
        );
        assert_eq!(rec.stage(), PaymentStage::Recorded);
        assert!(!rec.awaiting_consumption());

        rec.verified = true;
        rec.verified_at = Some(11);
        assert_eq!(rec.stage(), PaymentStage::Verified);
        assert!(rec.awaiting_consumption());

        rec.consumed = true;
        assert_eq!(rec.stage(), PaymentStage::Consumed);
        assert!(PaymentStage::Recorded < PaymentStage::Consumed);
    }

    #[test]
    fn test_upgrade_unapplied() {
        let mut rec = PaymentRecord::new(
            TxReference::parse("bb22").unwrap(),
            AccountId::parse("addr1").unwrap(),
            300,
            PaymentPurpose::Upgrade,
            10,
        );
        rec.verified = true;
        assert!(!rec.upgrade_unapplied());

        rec.consumed = true;
        assert!(rec.upgrade_unapplied());

        rec.applied_at = Some(12);
        rec.granted_power = Some(25);
        assert!(!rec.upgrade_unapplied());

        rec.purpose = PaymentPurpose::Activation;
        rec.applied_at = None;
        assert!(!rec.upgrade_unapplied());
    }
}
