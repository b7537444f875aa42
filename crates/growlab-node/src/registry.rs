//! Account registry
//!
//! Owns account records and the derived network power total. All writes go
//! through [`AccountRegistry::create`] or [`AccountRegistry::settle`], each a
//! single atomic read-modify-write followed by a durable commit.

use std::sync::Arc;

use growlab_core::{Account, AccountId, LabError, Power, Timestamp};
use growlab_economics::AccrualEngine;
use growlab_storage::LabStorage;

/// Flush storage after a decided transition.
///
/// A failure here leaves memory ahead of disk, so it is logged at error level
/// and returned as a fatal error.
pub(crate) fn commit(storage: &LabStorage, what: &str) -> Result<(), LabError> {
    storage.flush().map_err(|e| {
        tracing::error!(error = %e, transition = what, "Failed to persist committed transition");
        LabError::Storage(format!("{what}: {e}"))
    })
}

/// Account registry
pub struct AccountRegistry {
    storage: Arc<LabStorage>,
    engine: AccrualEngine,
}

impl AccountRegistry {
    /// Create a registry over shared storage
    pub fn new(storage: Arc<LabStorage>, engine: AccrualEngine) -> Self {
        Self { storage, engine }
    }

    pub fn engine(&self) -> &AccrualEngine {
        &self.engine
    }

    /// Get an account
    pub fn get(&self, id: &AccountId) -> Option<Account> {
        self.storage.accounts().get(id)
    }

    /// Create an account. Fails with `AlreadyActive` if the identity exists.
    pub fn create(&self, id: &AccountId, power: Power, now: Timestamp) -> Result<Account, LabError> {
        if power == 0 {
            return Err(LabError::InvalidInput("power must be positive".to_string()));
        }

        let account = Account::new(id.clone(), power, now);
        let (stored, inserted) = self
            .storage
            .accounts()
            .insert_if_absent(id.clone(), account);
        if !inserted {
            return Err(LabError::AlreadyActive(id.clone()));
        }

        commit(&self.storage, "create account")?;
        Ok(stored)
    }

    /// Sum of power over all accounts, computed on every call
    pub fn total_power(&self) -> u128 {
        self.storage
            .accounts()
            .values()
            .iter()
            .map(|a| a.power as u128)
            .sum()
    }

    /// All accounts
    pub fn list(&self) -> Vec<Account> {
        self.storage.accounts().values()
    }

    pub fn count(&self) -> usize {
        self.storage.accounts().len()
    }

    /// Settle an account at `now`, then apply `mutator`.
    ///
    /// Settlement folds everything accrued at the current power since
    /// `settled_at` into the pending snapshot and advances `settled_at`. The
    /// mutator runs inside the same critical section, so a power change is
    /// only ever applied to time after `now`.
    ///
    /// Returns the account as stored after the mutator, and its result.
    pub fn settle<R>(
        &self,
        id: &AccountId,
        now: Timestamp,
        mutator: impl FnOnce(&mut Account) -> R,
    ) -> Result<(Account, R), LabError> {
        let engine = &self.engine;
        let (account, result) = self
            .storage
            .accounts()
            .update(id, |account| {
                let accrued = engine.accrued_since_settlement(account, now);
                account.fold_accrued(accrued, now);
                let result = mutator(account);
                (account.clone(), result)
            })
            .ok_or_else(|| LabError::AccountNotFound(id.clone()))?;

        commit(&self.storage, "settle account")?;
        Ok((account, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use growlab_core::UNITS_PER_TOKEN;
    use growlab_economics::EmissionSchedule;

    const T0: Timestamp = 1_700_000_000;

    fn registry() -> AccountRegistry {
        let schedule = EmissionSchedule::new(T0, UNITS_PER_TOKEN / 2, 604_800).unwrap();
        AccountRegistry::new(Arc::new(LabStorage::in_memory()), AccrualEngine::new(schedule))
    }

    fn id(raw: &str) -> AccountId {
        AccountId::parse(raw).unwrap()
    }

    #[test]
    fn test_create_once() {
        let reg = registry();
        reg.create(&id("addr1"), 100, T0).unwrap();

        let err = reg.create(&id("addr1"), 100, T0 + 1).unwrap_err();
        assert_eq!(err, LabError::AlreadyActive(id("addr1")));
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn test_zero_power_rejected() {
        assert!(matches!(
            registry().create(&id("addr1"), 0, T0),
            Err(LabError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_total_power_recomputed() {
        let reg = registry();
        assert_eq!(reg.total_power(), 0);
        reg.create(&id("a"), 100, T0).unwrap();
        reg.create(&id("b"), 900, T0).unwrap();
        assert_eq!(reg.total_power(), 1_000);

        reg.settle(&id("a"), T0 + 1, |acc| acc.add_power(50)).unwrap();
        assert_eq!(reg.total_power(), 1_050);
    }

    #[test]
    fn test_settle_folds_accrual() {
        let reg = registry();
        reg.create(&id("a"), 100, T0).unwrap();

        let (acc, ()) = reg.settle(&id("a"), T0 + 10, |_| ()).unwrap();
        assert_eq!(acc.pending_snapshot, 100 * (UNITS_PER_TOKEN / 2) * 10);
        assert_eq!(acc.settled_at, T0 + 10);
    }

    #[test]
    fn test_power_change_not_retroactive() {
        let reg = registry();
        reg.create(&id("a"), 100, T0).unwrap();

        reg.settle(&id("a"), T0 + 10, |acc| acc.add_power(100)).unwrap();
        let (acc, ()) = reg.settle(&id("a"), T0 + 20, |_| ()).unwrap();

        let rate = UNITS_PER_TOKEN / 2;
        assert_eq!(acc.pending_snapshot, 100 * rate * 10 + 200 * rate * 10);
    }

    #[test]
    fn test_settle_backwards_is_noop() {
        let reg = registry();
        reg.create(&id("a"), 100, T0 + 100).unwrap();

        let (acc, ()) = reg.settle(&id("a"), T0 + 50, |_| ()).unwrap();
        assert_eq!(acc.settled_at, T0 + 100);
        assert_eq!(acc.pending_snapshot, 0);
    }

    #[test]
    fn test_settle_unknown_account() {
        let err = registry().settle(&id("ghost"), T0, |_| ()).unwrap_err();
        assert_eq!(err, LabError::AccountNotFound(id("ghost")));
    }

    #[test]
    fn test_commit_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LabStorage::open(dir.path().join("gone").join("lab.db")).unwrap();
        let schedule = EmissionSchedule::new(T0, 1, 10).unwrap();
        let reg = AccountRegistry::new(Arc::new(storage), AccrualEngine::new(schedule));

        let err = reg.create(&id("a"), 1, T0).unwrap_err();
        assert!(err.is_fatal());
    }
}
