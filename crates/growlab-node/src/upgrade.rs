//! # Power Upgrades
//!
//! A booster pack is a paid power bonus. The payment goes through the same
//! ledger path as activation, at the booster price, and is consumed before
//! the account is touched:
//!
//! ```text
//! lock(id) → lock(reference)
//!   ├─ consumed upgrade by id, not applied ─▶ settle, power += bonus   (resume)
//!   └─ redeem(reference) ───────────────────▶ settle, power += bonus
//! ```
//!
//! The settle marks the payment applied inside the same account update, so
//! the bonus and its marker reach disk in one snapshot. A crash after
//! consumption leaves the payment unapplied and the next call with the same
//! reference grants it exactly once.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;

use growlab_core::{AccountId, Amount, LabError, PaymentPurpose, Power, Timestamp, TxReference};

use crate::guard::KeyedGuards;
use crate::ledger::PaymentLedger;
use crate::metrics::LabMetrics;
use crate::registry::AccountRegistry;
use crate::verifier::PaymentGate;

/// Booster pack rarity, by power bonus
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub fn for_bonus(bonus: Power) -> Self {
        if bonus >= 40 {
            Rarity::Legendary
        } else if bonus >= 30 {
            Rarity::Epic
        } else if bonus >= 20 {
            Rarity::Rare
        } else {
            Rarity::Common
        }
    }
}

impl std::fmt::Display for Rarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Rarity::Common => "Common",
            Rarity::Rare => "Rare",
            Rarity::Epic => "Epic",
            Rarity::Legendary => "Legendary",
        };
        f.write_str(name)
    }
}

/// A rolled booster pack
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoosterPack {
    pub rarity: Rarity,
    pub power_bonus: Power,
}

impl BoosterPack {
    /// Roll a bonus uniformly from `range`
    pub fn roll<R: Rng + ?Sized>(range: RangeInclusive<Power>, rng: &mut R) -> Self {
        let power_bonus = rng.gen_range(range);
        Self {
            rarity: Rarity::for_bonus(power_bonus),
            power_bonus,
        }
    }
}

/// Outcome of an applied upgrade
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeReceipt {
    pub new_power: Power,
    pub power_bonus: Power,
    pub reference: TxReference,
}

/// Outcome of an opened booster pack
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoosterOpening {
    pub pack: BoosterPack,
    pub receipt: UpgradeReceipt,
}

/// Upgrade service
pub struct UpgradeService {
    registry: Arc<AccountRegistry>,
    ledger: Arc<PaymentLedger>,
    gate: Arc<PaymentGate>,
    identities: Arc<KeyedGuards>,
    references: Arc<KeyedGuards>,
    metrics: Arc<LabMetrics>,
    price: Amount,
    bonus_range: RangeInclusive<Power>,
}

impl UpgradeService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<AccountRegistry>,
        ledger: Arc<PaymentLedger>,
        gate: Arc<PaymentGate>,
        identities: Arc<KeyedGuards>,
        references: Arc<KeyedGuards>,
        metrics: Arc<LabMetrics>,
        price: Amount,
        bonus_range: RangeInclusive<Power>,
    ) -> Self {
        Self {
            registry,
            ledger,
            gate,
            identities,
            references,
            metrics,
            price,
            bonus_range,
        }
    }

    pub fn price(&self) -> Amount {
        self.price
    }

    pub fn bonus_range(&self) -> RangeInclusive<Power> {
        self.bonus_range.clone()
    }

    /// Add `power_bonus` to `id`, paid for by `reference`.
    ///
    /// Everything accrued up to `now` is settled at the old power first.
    pub async fn grant_upgrade(
        &self,
        id: &AccountId,
        now: Timestamp,
        reference: &TxReference,
        power_bonus: Power,
    ) -> Result<UpgradeReceipt, LabError> {
        if power_bonus == 0 {
            return Err(LabError::InvalidInput("power bonus must be positive".to_string()));
        }
        if self.registry.get(id).is_none() {
            return Err(LabError::AccountNotFound(id.clone()));
        }

        let _identity = self.identities.lock(id.as_str()).await;
        let _reference = self.references.lock(reference.as_str()).await;

        let resumable = self
            .ledger
            .get(reference)
            .is_some_and(|record| record.upgrade_unapplied() && record.payer == *id);
        if resumable {
            tracing::warn!(%id, %reference, "Resuming upgrade from a consumed payment");
        } else {
            self.ledger
                .redeem(&self.gate, reference, id, self.price, PaymentPurpose::Upgrade, now)
                .await?;
        }

        let ledger = &self.ledger;
        let (account, applied) = self.registry.settle(id, now, |account| {
            let applied = ledger.note_applied(reference, power_bonus, now);
            if applied {
                account.add_power(power_bonus);
            }
            applied
        })?;
        if !applied {
            return Err(LabError::PaymentAlreadyUsed(reference.clone()));
        }

        self.metrics.upgrades.inc();
        self.metrics
            .observe_network(self.registry.count(), self.registry.total_power());
        tracing::info!(%id, %reference, power_bonus, new_power = account.power, "Lab upgraded");

        Ok(UpgradeReceipt {
            new_power: account.power,
            power_bonus,
            reference: reference.clone(),
        })
    }

    /// Roll a booster pack and apply it.
    ///
    /// The roll happens up front; a failed payment discards it.
    pub async fn open_booster<R: Rng + ?Sized>(
        &self,
        id: &AccountId,
        now: Timestamp,
        reference: &TxReference,
        rng: &mut R,
    ) -> Result<BoosterOpening, LabError> {
        let pack = BoosterPack::roll(self.bonus_range(), rng);
        let receipt = self.grant_upgrade(id, now, reference, pack.power_bonus).await?;
        tracing::info!(%id, rarity = %pack.rarity, bonus = pack.power_bonus, "Booster pack opened");
        Ok(BoosterOpening { pack, receipt })
    }
}
