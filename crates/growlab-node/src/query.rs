//! Read-only views: account state, leaderboard, network statistics,
//! public configuration and treasury-only admin views.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use growlab_core::{Account, AccountId, Amount, LabError, PaymentRecord, Power, Timestamp};

use crate::config::LabConfig;
use crate::ledger::PaymentLedger;
use crate::registry::AccountRegistry;

/// State of one lab at a point in time
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub id: AccountId,
    pub power: Power,
    /// Claimable now: the pending snapshot plus accrual since settlement
    pub pending: Amount,
    pub cumulative_claimed: Amount,
    /// Share of the current total power, in percent
    pub network_share: f64,
    /// Per-power emission rate at the query time
    pub current_rate: Amount,
    pub next_halving_at: Timestamp,
    pub activated_at: Timestamp,
    pub settled_at: Timestamp,
}

/// Leaderboard row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: AccountId,
    pub power: Power,
    pub cumulative_claimed: Amount,
    pub activated_at: Timestamp,
}

/// Network-wide statistics
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub accounts: usize,
    pub total_power: u128,
    pub total_claimed: Amount,
    pub total_pending: Amount,
    pub current_rate: Amount,
    pub era: u64,
    pub next_halving_at: Timestamp,
}

/// Treasury dashboard
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminStats {
    pub network: NetworkStats,
    /// Sum of verified payment amounts
    pub verified_payment_volume: Amount,
    pub activation_price: Amount,
    pub halving_interval_secs: u64,
}

/// Configuration a client needs to build payments
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublicConfig {
    pub network: String,
    pub treasury_address: Option<String>,
    pub policy_id: Option<String>,
    pub asset_name: String,
    pub token_unit: Option<String>,
    pub activation_price: Amount,
    pub booster_price: Amount,
    pub booster_min_bonus: Power,
    pub booster_max_bonus: Power,
    pub base_power: Power,
    pub genesis_time: Timestamp,
    pub emission_per_second: f64,
    pub halving_interval_secs: u64,
}

impl PublicConfig {
    pub fn from_config(config: &LabConfig) -> Self {
        Self {
            network: config.verifier.network.clone(),
            treasury_address: config.activation.treasury_address.clone(),
            policy_id: config.verifier.policy_id.clone(),
            asset_name: config.verifier.asset_name.clone(),
            token_unit: config.verifier.token_unit(),
            activation_price: Amount::from(config.activation.price),
            booster_price: Amount::from(config.booster.price),
            booster_min_bonus: config.booster.min_bonus,
            booster_max_bonus: config.booster.max_bonus,
            base_power: config.activation.base_power,
            genesis_time: config.emission.genesis_time,
            emission_per_second: config.emission.emission_per_second,
            halving_interval_secs: config.emission.halving_interval_secs,
        }
    }
}

/// Query service
pub struct QueryService {
    registry: Arc<AccountRegistry>,
    ledger: Arc<PaymentLedger>,
    treasury: AccountId,
    public: PublicConfig,
}

impl QueryService {
    pub fn new(
        registry: Arc<AccountRegistry>,
        ledger: Arc<PaymentLedger>,
        treasury: AccountId,
        public: PublicConfig,
    ) -> Self {
        Self {
            registry,
            ledger,
            treasury,
            public,
        }
    }

    /// State of `id` at `now`. Nothing is settled or written.
    pub fn query_state(&self, id: &AccountId, now: Timestamp) -> Result<AccountState, LabError> {
        let account = self
            .registry
            .get(id)
            .ok_or_else(|| LabError::AccountNotFound(id.clone()))?;
        Ok(self.state_of(&account, self.registry.total_power(), now))
    }

    fn state_of(&self, account: &Account, total_power: u128, now: Timestamp) -> AccountState {
        let engine = self.registry.engine();
        let schedule = engine.schedule();
        AccountState {
            id: account.id.clone(),
            power: account.power,
            pending: engine.pending_at(account, now),
            cumulative_claimed: account.cumulative_claimed,
            network_share: share_percent(account.power, total_power),
            current_rate: schedule.rate_at(now),
            next_halving_at: schedule.next_boundary_after(now),
            activated_at: account.activated_at,
            settled_at: account.settled_at,
        }
    }

    /// Top `limit` labs by claimed total
    pub fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let mut accounts = self.registry.list();
        accounts.sort_by(|a, b| {
            b.cumulative_claimed
                .cmp(&a.cumulative_claimed)
                .then_with(|| a.id.cmp(&b.id))
        });
        accounts
            .into_iter()
            .take(limit)
            .map(|a| LeaderboardEntry {
                id: a.id,
                power: a.power,
                cumulative_claimed: a.cumulative_claimed,
                activated_at: a.activated_at,
            })
            .collect()
    }

    pub fn network_stats(&self, now: Timestamp) -> NetworkStats {
        let engine = self.registry.engine();
        let schedule = engine.schedule();
        let accounts = self.registry.list();

        NetworkStats {
            accounts: accounts.len(),
            total_power: accounts.iter().map(|a| a.power as u128).sum(),
            total_claimed: accounts.iter().map(|a| a.cumulative_claimed).sum(),
            total_pending: accounts.iter().map(|a| engine.pending_at(a, now)).sum(),
            current_rate: schedule.rate_at(now),
            era: schedule.era_at(now),
            next_halving_at: schedule.next_boundary_after(now),
        }
    }

    pub fn public_config(&self) -> &PublicConfig {
        &self.public
    }

    fn authorize(&self, caller: &AccountId) -> Result<(), LabError> {
        if *caller != self.treasury {
            tracing::warn!(%caller, "Rejected admin request");
            return Err(LabError::Unauthorized);
        }
        Ok(())
    }

    pub fn admin_stats(&self, caller: &AccountId, now: Timestamp) -> Result<AdminStats, LabError> {
        self.authorize(caller)?;
        Ok(AdminStats {
            network: self.network_stats(now),
            verified_payment_volume: self.ledger.verified_total(),
            activation_price: self.public.activation_price,
            halving_interval_secs: self.public.halving_interval_secs,
        })
    }

    /// Every lab's state at `now`, largest power first
    pub fn admin_users(&self, caller: &AccountId, now: Timestamp) -> Result<Vec<AccountState>, LabError> {
        self.authorize(caller)?;
        let accounts = self.registry.list();
        let total_power = accounts.iter().map(|a| a.power as u128).sum();

        let mut users: Vec<_> = accounts
            .iter()
            .map(|a| self.state_of(a, total_power, now))
            .collect();
        users.sort_by(|a, b| b.power.cmp(&a.power).then_with(|| a.id.cmp(&b.id)));
        Ok(users)
    }

    /// Every payment, newest first
    pub fn admin_payments(&self, caller: &AccountId) -> Result<Vec<PaymentRecord>, LabError> {
        self.authorize(caller)?;
        Ok(self.ledger.list())
    }
}

fn share_percent(power: Power, total_power: u128) -> f64 {
    if total_power == 0 {
        return 0.0;
    }
    power as f64 * 100.0 / total_power as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use growlab_core::{PaymentPurpose, UNITS_PER_TOKEN};
    use growlab_economics::{AccrualEngine, EmissionSchedule};
    use growlab_storage::LabStorage;

    const T0: Timestamp = 1_704_067_200;
    const WEEK: u64 = 604_800;
    const RATE: Amount = UNITS_PER_TOKEN / 2;

    fn id(raw: &str) -> AccountId {
        AccountId::parse(raw).unwrap()
    }

    fn setup() -> (QueryService, Arc<AccountRegistry>, Arc<PaymentLedger>) {
        let storage = Arc::new(LabStorage::in_memory());
        let schedule = EmissionSchedule::new(T0, RATE, WEEK).unwrap();
        let registry = Arc::new(AccountRegistry::new(storage.clone(), AccrualEngine::new(schedule)));
        let ledger = Arc::new(PaymentLedger::new(storage));

        let mut config = LabConfig::default();
        config.activation.treasury_address = Some("treasury".to_string());
        config.emission.halving_interval_secs = WEEK;

        let service = QueryService::new(
            registry.clone(),
            ledger.clone(),
            id("treasury"),
            PublicConfig::from_config(&config),
        );
        (service, registry, ledger)
    }

    #[test]
    fn test_query_state() {
        let (service, registry, _) = setup();
        registry.create(&id("alice"), 100, T0).unwrap();
        registry.create(&id("bob"), 300, T0).unwrap();

        let state = service.query_state(&id("alice"), T0 + 10).unwrap();
        assert_eq!(state.pending, 100 * RATE * 10);
        assert_eq!(state.network_share, 25.0);
        assert_eq!(state.current_rate, RATE);
        assert_eq!(state.next_halving_at, T0 + WEEK as i64);

        // Reads never settle
        assert_eq!(registry.get(&id("alice")).unwrap().settled_at, T0);
    }

    #[test]
    fn test_query_state_after_halving() {
        let (service, registry, _) = setup();
        registry.create(&id("alice"), 100, T0).unwrap();

        let state = service.query_state(&id("alice"), T0 + WEEK as i64 + 1).unwrap();
        assert_eq!(state.current_rate, RATE / 2);
        assert_eq!(state.next_halving_at, T0 + 2 * WEEK as i64);
    }

    #[test]
    fn test_query_unknown() {
        let (service, _, _) = setup();
        assert_eq!(
            service.query_state(&id("ghost"), T0).unwrap_err(),
            LabError::AccountNotFound(id("ghost"))
        );
    }

    #[test]
    fn test_leaderboard_order() {
        let (service, registry, _) = setup();
        registry.create(&id("a"), 100, T0).unwrap();
        registry.create(&id("b"), 100, T0).unwrap();
        registry.create(&id("c"), 100, T0 + 5).unwrap();
        registry.settle(&id("b"), T0 + 10, |acc| acc.claim_pending()).unwrap();
        registry.settle(&id("c"), T0 + 10, |acc| acc.claim_pending()).unwrap();

        let board = service.leaderboard(2);
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].id, id("b"));
        assert_eq!(board[1].id, id("c"));
    }

    #[test]
    fn test_network_stats() {
        let (service, registry, _) = setup();
        registry.create(&id("a"), 100, T0).unwrap();
        registry.create(&id("b"), 50, T0).unwrap();
        registry.settle(&id("a"), T0 + 10, |acc| acc.claim_pending()).unwrap();

        let stats = service.network_stats(T0 + 20);
        assert_eq!(stats.accounts, 2);
        assert_eq!(stats.total_power, 150);
        assert_eq!(stats.total_claimed, 100 * RATE * 10);
        assert_eq!(stats.total_pending, 100 * RATE * 10 + 50 * RATE * 20);
        assert_eq!(stats.era, 0);
    }

    #[test]
    fn test_admin_views_require_treasury() {
        let (service, registry, ledger) = setup();
        registry.create(&id("a"), 100, T0).unwrap();
        ledger
            .record_if_absent(
                &growlab_core::TxReference::parse("aa").unwrap(),
                &id("a"),
                1_000_000,
                PaymentPurpose::Activation,
                T0,
            )
            .unwrap();

        assert_eq!(service.admin_stats(&id("a"), T0).unwrap_err(), LabError::Unauthorized);
        assert_eq!(service.admin_users(&id("a"), T0).unwrap_err(), LabError::Unauthorized);
        assert_eq!(service.admin_payments(&id("a")).unwrap_err(), LabError::Unauthorized);

        let stats = service.admin_stats(&id("treasury"), T0).unwrap();
        assert_eq!(stats.verified_payment_volume, 0);
        assert_eq!(stats.activation_price, 1_000_000);
        assert_eq!(stats.halving_interval_secs, WEEK);
        assert_eq!(service.admin_users(&id("treasury"), T0).unwrap().len(), 1);
        assert_eq!(service.admin_payments(&id("treasury")).unwrap().len(), 1);
    }

    #[test]
    fn test_public_config() {
        let (service, _, _) = setup();
        let public = service.public_config();
        assert_eq!(public.asset_name, "COKE");
        assert_eq!(public.booster_price, 300);
        assert_eq!(public.treasury_address.as_deref(), Some("treasury"));
    }
}
