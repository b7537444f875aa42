//! Payment ledger
//!
//! Records payments by external transaction reference and drives each one
//! through `Recorded → Verified → Consumed`. Every transition happens at most
//! once; a reference can never be applied to two activations or upgrades.

use std::sync::Arc;

use growlab_core::{
    AccountId, Amount, LabError, PaymentPurpose, PaymentRecord, Power, Timestamp, TxReference,
};
use growlab_storage::LabStorage;

use crate::registry::commit;
use crate::verifier::PaymentGate;

/// Payment ledger
pub struct PaymentLedger {
    storage: Arc<LabStorage>,
}

impl PaymentLedger {
    pub fn new(storage: Arc<LabStorage>) -> Self {
        Self { storage }
    }

    pub fn get(&self, reference: &TxReference) -> Option<PaymentRecord> {
        self.storage.payments().get(reference)
    }

    /// Record an unverified payment unless the reference is already known.
    ///
    /// Returns the stored record and whether it was created by this call.
    pub fn record_if_absent(
        &self,
        reference: &TxReference,
        payer: &AccountId,
        amount: Amount,
        purpose: PaymentPurpose,
        now: Timestamp,
    ) -> Result<(PaymentRecord, bool), LabError> {
        let record = PaymentRecord::new(reference.clone(), payer.clone(), amount, purpose, now);
        let (stored, inserted) = self
            .storage
            .payments()
            .insert_if_absent(reference.clone(), record);
        if inserted {
            tracing::debug!(%reference, %payer, ?purpose, "Payment recorded");
            commit(&self.storage, "record payment")?;
        }
        Ok((stored, inserted))
    }

    /// Mark a payment verified with the amount the verifier reported
    pub fn mark_verified(
        &self,
        reference: &TxReference,
        amount: Amount,
        now: Timestamp,
    ) -> Result<PaymentRecord, LabError> {
        let record = self
            .storage
            .payments()
            .update(reference, |record| {
                if record.verified {
                    return Err(LabError::AlreadyVerified(reference.clone()));
                }
                record.verified = true;
                record.verified_at = Some(now);
                record.amount = amount;
                Ok(record.clone())
            })
            .ok_or_else(|| LabError::PaymentNotFound(reference.clone()))??;

        commit(&self.storage, "verify payment")?;
        Ok(record)
    }

    /// Whether the payment has been applied
    pub fn is_consumed(&self, reference: &TxReference) -> bool {
        self.get(reference).map(|r| r.consumed).unwrap_or(false)
    }

    /// Mark a verified payment as applied
    pub fn mark_consumed(&self, reference: &TxReference, now: Timestamp) -> Result<PaymentRecord, LabError> {
        let record = self
            .storage
            .payments()
            .update(reference, |record| {
                if !record.verified {
                    return Err(LabError::PaymentUnverified(reference.clone()));
                }
                if record.consumed {
                    return Err(LabError::AlreadyConsumed(reference.clone()));
                }
                record.consumed = true;
                record.consumed_at = Some(now);
                Ok(record.clone())
            })
            .ok_or_else(|| LabError::PaymentNotFound(reference.clone()))??;

        commit(&self.storage, "consume payment")?;
        Ok(record)
    }

    /// Hand an unverified record to a new payer and purpose.
    ///
    /// Nothing is owned until the verifier accepts the payment, so whoever
    /// submits a still-unverified reference takes it over.
    fn rebind(
        &self,
        reference: &TxReference,
        payer: &AccountId,
        purpose: PaymentPurpose,
    ) -> Result<(), LabError> {
        let previous = self
            .storage
            .payments()
            .update(reference, |record| {
                if record.verified {
                    return Err(LabError::PaymentAlreadyUsed(reference.clone()));
                }
                let previous = std::mem::replace(&mut record.payer, payer.clone());
                record.purpose = purpose;
                Ok(previous)
            })
            .ok_or_else(|| LabError::PaymentNotFound(reference.clone()))??;

        tracing::info!(%reference, %payer, %previous, ?purpose, "Unverified payment rebound");
        commit(&self.storage, "rebind payment")
    }

    /// Record that an upgrade bonus reached the account.
    ///
    /// Not committed here: call it from inside the account update that adds
    /// the power, so both land in the same snapshot. Returns `false` if the
    /// record is missing, not a consumed upgrade, or already applied.
    pub fn note_applied(&self, reference: &TxReference, granted_power: Power, now: Timestamp) -> bool {
        self.storage
            .payments()
            .update(reference, |record| {
                if !record.upgrade_unapplied() {
                    return false;
                }
                record.granted_power = Some(granted_power);
                record.applied_at = Some(now);
                true
            })
            .unwrap_or(false)
    }

    /// Drive a payment from wherever it stands to `Consumed` for `payer`.
    ///
    /// A consumed reference, or a verified one bound to another payer or
    /// purpose, is `PaymentAlreadyUsed`. An unverified record is rebound to
    /// the caller. A verified record skips the gate, so retrying after a crash
    /// between verification and consumption does not ask the verifier again.
    /// Callers hold the reference guard.
    pub async fn redeem(
        &self,
        gate: &PaymentGate,
        reference: &TxReference,
        payer: &AccountId,
        price: Amount,
        purpose: PaymentPurpose,
        now: Timestamp,
    ) -> Result<PaymentRecord, LabError> {
        let (record, _) = self.record_if_absent(reference, payer, price, purpose, now)?;
        let foreign = record.payer != *payer || record.purpose != purpose;
        if record.consumed || (record.verified && foreign) {
            tracing::warn!(%reference, %payer, owner = %record.payer, "Payment reference reused");
            return Err(LabError::PaymentAlreadyUsed(reference.clone()));
        }
        if foreign {
            self.rebind(reference, payer, purpose)?;
        }

        if !record.verified {
            let amount = gate.check(reference, price).await?;
            match self.mark_verified(reference, amount, now) {
                Ok(_) | Err(LabError::AlreadyVerified(_)) => {}
                Err(e) => return Err(e),
            }
        }

        self.mark_consumed(reference, now).map_err(|e| match e {
            LabError::AlreadyConsumed(r) => LabError::PaymentAlreadyUsed(r),
            other => other,
        })
    }

    /// All payments, newest first
    pub fn list(&self) -> Vec<PaymentRecord> {
        let mut payments = self.storage.payments().values();
        payments.sort_by(|a, b| {
            b.recorded_at
                .cmp(&a.recorded_at)
                .then_with(|| a.reference.cmp(&b.reference))
        });
        payments
    }

    /// Sum of verified payment amounts
    pub fn verified_total(&self) -> Amount {
        self.storage
            .payments()
            .values()
            .iter()
            .filter(|r| r.verified)
            .map(|r| r.amount)
            .sum()
    }
}
