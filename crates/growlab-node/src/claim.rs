//! Reward claims

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use growlab_core::{AccountId, Amount, LabError, Timestamp};

use crate::metrics::LabMetrics;
use crate::registry::AccountRegistry;

/// Outcome of a successful claim
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    /// Base units moved into the claimed total
    pub claimed_amount: Amount,
    /// Claimed total after this claim
    pub new_total: Amount,
    pub claimed_at: Timestamp,
}

/// Claim service
pub struct ClaimService {
    registry: Arc<AccountRegistry>,
    metrics: Arc<LabMetrics>,
}

impl ClaimService {
    pub fn new(registry: Arc<AccountRegistry>, metrics: Arc<LabMetrics>) -> Self {
        Self { registry, metrics }
    }

    /// Settle `id` at `now` and move everything pending into its claimed total.
    ///
    /// With nothing pending the account is only settled and the call fails
    /// with `NothingToClaim`.
    pub fn claim(&self, id: &AccountId, now: Timestamp) -> Result<ClaimReceipt, LabError> {
        let (account, claimed) = self
            .registry
            .settle(id, now, |account| account.claim_pending())?;

        if claimed == 0 {
            tracing::warn!(%id, "Nothing to claim");
            return Err(LabError::NothingToClaim);
        }

        self.metrics.record_claim(claimed);
        tracing::info!(%id, claimed = %claimed, total = %account.cumulative_claimed, "Rewards claimed");

        Ok(ClaimReceipt {
            claimed_amount: claimed,
            new_total: account.cumulative_claimed,
            claimed_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use growlab_core::UNITS_PER_TOKEN;
    use growlab_economics::{AccrualEngine, EmissionSchedule};
    use growlab_storage::LabStorage;

    const T0: Timestamp = 1_704_067_200;
    const RATE: Amount = UNITS_PER_TOKEN / 2;

    fn setup() -> (ClaimService, Arc<AccountRegistry>, Arc<LabMetrics>) {
        let schedule = EmissionSchedule::new(T0, RATE, 604_800).unwrap();
        let registry = Arc::new(AccountRegistry::new(
            Arc::new(LabStorage::in_memory()),
            AccrualEngine::new(schedule),
        ));
        let metrics = Arc::new(LabMetrics::new().unwrap());
        (ClaimService::new(registry.clone(), metrics.clone()), registry, metrics)
    }

    fn id(raw: &str) -> AccountId {
        AccountId::parse(raw).unwrap()
    }

    #[test]
    fn test_claim_moves_pending() {
        let (service, registry, metrics) = setup();
        registry.create(&id("alice"), 100, T0).unwrap();

        let receipt = service.claim(&id("alice"), T0 + 10).unwrap();
        assert_eq!(receipt.claimed_amount, 100 * RATE * 10);
        assert_eq!(receipt.new_total, receipt.claimed_amount);
        assert_eq!(receipt.claimed_at, T0 + 10);

        let account = registry.get(&id("alice")).unwrap();
        assert_eq!(account.pending_snapshot, 0);
        assert_eq!(account.settled_at, T0 + 10);
        assert_eq!(metrics.claims.get(), 1);
    }

    #[test]
    fn test_totals_accumulate() {
        let (service, registry, _) = setup();
        registry.create(&id("alice"), 100, T0).unwrap();

        let first = service.claim(&id("alice"), T0 + 10).unwrap();
        let second = service.claim(&id("alice"), T0 + 30).unwrap();
        assert_eq!(second.claimed_amount, 100 * RATE * 20);
        assert_eq!(second.new_total, first.new_total + second.claimed_amount);
    }

    #[test]
    fn test_nothing_to_claim() {
        let (service, registry, _) = setup();
        registry.create(&id("alice"), 100, T0).unwrap();
        service.claim(&id("alice"), T0 + 10).unwrap();

        let err = service.claim(&id("alice"), T0 + 10).unwrap_err();
        assert_eq!(err, LabError::NothingToClaim);
        assert_eq!(registry.get(&id("alice")).unwrap().cumulative_claimed, 100 * RATE * 10);
    }

    #[test]
    fn test_claim_before_genesis() {
        let (service, registry, _) = setup();
        registry.create(&id("early"), 100, T0 - 100).unwrap();
        assert_eq!(
            service.claim(&id("early"), T0).unwrap_err(),
            LabError::NothingToClaim
        );
    }

    #[test]
    fn test_claim_unknown_account() {
        let (service, _, _) = setup();
        assert_eq!(
            service.claim(&id("ghost"), T0).unwrap_err(),
            LabError::AccountNotFound(id("ghost"))
        );
    }
}
