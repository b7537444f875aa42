//! # Lab Activation
//!
//! ```text
//! activate(id, now, proof?)
//!   ├─ account exists ───────────────▶ AlreadyActive
//!   ├─ id == treasury ───────────────▶ create(base_power)
//!   ├─ no proof ─────────────────────▶ MissingPayment
//!   └─ lock(id) → lock(reference)
//!        ├─ account exists ──────────▶ AlreadyActive
//!        ├─ consumed by id, no account ▶ create(base_power)   (resume)
//!        └─ redeem(reference) ───────▶ create(base_power)
//! ```
//!
//! Identity guards are always taken before reference guards.

use std::sync::Arc;

use growlab_core::{Account, AccountId, Amount, LabError, PaymentPurpose, Power, Timestamp, TxReference};

use crate::guard::KeyedGuards;
use crate::ledger::PaymentLedger;
use crate::metrics::LabMetrics;
use crate::registry::AccountRegistry;
use crate::verifier::PaymentGate;

/// Activation service
pub struct ActivationService {
    registry: Arc<AccountRegistry>,
    ledger: Arc<PaymentLedger>,
    gate: Arc<PaymentGate>,
    identities: Arc<KeyedGuards>,
    references: Arc<KeyedGuards>,
    metrics: Arc<LabMetrics>,
    treasury: AccountId,
    price: Amount,
    base_power: Power,
}

impl ActivationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<AccountRegistry>,
        ledger: Arc<PaymentLedger>,
        gate: Arc<PaymentGate>,
        identities: Arc<KeyedGuards>,
        references: Arc<KeyedGuards>,
        metrics: Arc<LabMetrics>,
        price: Amount,
        base_power: Power,
    ) -> Self {
        let treasury = gate.recipient().clone();
        Self {
            registry,
            ledger,
            gate,
            identities,
            references,
            metrics,
            treasury,
            price,
            base_power,
        }
    }

    pub fn price(&self) -> Amount {
        self.price
    }

    /// Activate a lab for `id`, paid for by `proof` unless `id` is the treasury
    pub async fn activate(
        &self,
        id: &AccountId,
        now: Timestamp,
        proof: Option<&TxReference>,
    ) -> Result<Account, LabError> {
        if self.registry.get(id).is_some() {
            return Err(LabError::AlreadyActive(id.clone()));
        }

        if *id == self.treasury {
            let account = self.registry.create(id, self.base_power, now)?;
            tracing::info!(%id, power = account.power, "Treasury lab activated");
            self.activated();
            return Ok(account);
        }

        let reference = proof.ok_or(LabError::MissingPayment)?;

        let _identity = self.identities.lock(id.as_str()).await;
        let _reference = self.references.lock(reference.as_str()).await;

        if self.registry.get(id).is_some() {
            return Err(LabError::AlreadyActive(id.clone()));
        }

        let resumable = self.ledger.get(reference).is_some_and(|record| {
            record.consumed && record.payer == *id && record.purpose == PaymentPurpose::Activation
        });
        if resumable {
            tracing::warn!(%id, %reference, "Resuming activation from a consumed payment");
        } else {
            self.ledger
                .redeem(
                    &self.gate,
                    reference,
                    id,
                    self.price,
                    PaymentPurpose::Activation,
                    now,
                )
                .await?;
        }

        let account = self.registry.create(id, self.base_power, now)?;
        tracing::info!(%id, %reference, power = account.power, "Lab activated");
        self.activated();
        Ok(account)
    }

    fn activated(&self) {
        self.metrics.activations.inc();
        self.metrics
            .observe_network(self.registry.count(), self.registry.total_power());
    }
}
