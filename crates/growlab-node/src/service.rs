//! # Lab Service
//!
//! The single entry point callers use. Wires the registry, ledger, payment
//! gate and guards from a [`LabConfig`] and exposes every operation.
//!
//! ```text
//!                    ┌──────────────────────────────┐
//!  activate ────────►│ ActivationService ─┐         │
//!  grant_upgrade ───►│ UpgradeService ────┼─► PaymentLedger ─► PaymentGate ─► PaymentVerifier
//!  claim ───────────►│ ClaimService ──────┼─► AccountRegistry ─► AccrualEngine
//!  query_state ─────►│ QueryService ──────┘         │
//!                    └──────────────┬───────────────┘
//!                                   ▼
//!                               LabStorage
//! ```

use rand::Rng;
use std::sync::Arc;

use growlab_core::{Account, AccountId, LabError, PaymentRecord, Power, Timestamp, TxReference};
use growlab_economics::{AccrualEngine, EmissionSchedule};
use growlab_storage::LabStorage;

use crate::activation::ActivationService;
use crate::claim::{ClaimReceipt, ClaimService};
use crate::config::{ConfigError, LabConfig};
use crate::guard::KeyedGuards;
use crate::ledger::PaymentLedger;
use crate::metrics::LabMetrics;
use crate::query::{AccountState, AdminStats, LeaderboardEntry, NetworkStats, PublicConfig, QueryService};
use crate::registry::AccountRegistry;
use crate::upgrade::{BoosterOpening, UpgradeReceipt, UpgradeService};
use crate::verifier::{PaymentGate, PaymentVerifier};

/// Errors building a [`LabService`]
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid emission schedule: {0}")]
    Schedule(LabError),

    #[error("Failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// GrowLab service facade
pub struct LabService {
    schedule: EmissionSchedule,
    storage: Arc<LabStorage>,
    registry: Arc<AccountRegistry>,
    ledger: Arc<PaymentLedger>,
    metrics: Arc<LabMetrics>,
    metrics_enabled: bool,
    activation: ActivationService,
    claims: ClaimService,
    upgrades: UpgradeService,
    queries: QueryService,
}

impl LabService {
    /// Build every service over `storage`, verifying payments with `verifier`
    pub fn new(
        config: &LabConfig,
        storage: Arc<LabStorage>,
        verifier: Arc<dyn PaymentVerifier>,
    ) -> Result<Self, SetupError> {
        let treasury = config.treasury().ok_or_else(|| {
            ConfigError::Invalid(vec!["activation.treasury_address is required".to_string()])
        })?;
        if config.booster.min_bonus == 0 || config.booster.min_bonus > config.booster.max_bonus {
            return Err(ConfigError::Invalid(vec![format!(
                "booster bonus range {}..={} is empty or starts at zero",
                config.booster.min_bonus, config.booster.max_bonus
            )])
            .into());
        }
        let schedule = config.schedule().map_err(SetupError::Schedule)?;
        let metrics = Arc::new(LabMetrics::new()?);

        let registry = Arc::new(AccountRegistry::new(storage.clone(), AccrualEngine::new(schedule)));
        let ledger = Arc::new(PaymentLedger::new(storage.clone()));
        let gate = Arc::new(PaymentGate::new(
            verifier,
            treasury.clone(),
            config.verifier.timeout(),
            metrics.clone(),
        ));
        let identities = Arc::new(KeyedGuards::new());
        let references = Arc::new(KeyedGuards::new());

        let activation = ActivationService::new(
            registry.clone(),
            ledger.clone(),
            gate.clone(),
            identities.clone(),
            references.clone(),
            metrics.clone(),
            config.activation.price.into(),
            config.activation.base_power,
        );
        let claims = ClaimService::new(registry.clone(), metrics.clone());
        let upgrades = UpgradeService::new(
            registry.clone(),
            ledger.clone(),
            gate,
            identities,
            references,
            metrics.clone(),
            config.booster.price.into(),
            config.booster.min_bonus..=config.booster.max_bonus,
        );
        let queries = QueryService::new(
            registry.clone(),
            ledger.clone(),
            treasury,
            PublicConfig::from_config(config),
        );

        tracing::debug!(
            accounts = registry.count(),
            genesis = schedule.genesis_time(),
            interval = schedule.halving_interval(),
            "Lab service ready"
        );

        let service = Self {
            schedule,
            storage,
            registry,
            ledger,
            metrics,
            metrics_enabled: config.metrics.enabled,
            activation,
            claims,
            upgrades,
            queries,
        };
        service.refresh_gauges();
        Ok(service)
    }

    fn refresh_gauges(&self) {
        let accounts = self.registry.list();
        let power: u128 = accounts.iter().map(|a| a.power as u128).sum();
        let claimed: u128 = accounts.iter().map(|a| a.cumulative_claimed).sum();
        let consumed = self.ledger.list().iter().filter(|p| p.consumed).count();

        self.metrics.observe_network(accounts.len(), power);
        self.metrics
            .observe_totals(claimed, consumed, self.ledger.verified_total());
    }

    /// Prometheus text exposition, or `None` when metrics are disabled
    pub fn export_metrics(&self) -> Result<Option<String>, prometheus::Error> {
        if !self.metrics_enabled {
            return Ok(None);
        }
        self.refresh_gauges();
        self.metrics.render().map(Some)
    }

    pub fn schedule(&self) -> &EmissionSchedule {
        &self.schedule
    }

    pub fn storage(&self) -> &Arc<LabStorage> {
        &self.storage
    }

    pub fn metrics(&self) -> &Arc<LabMetrics> {
        &self.metrics
    }

    pub async fn activate(
        &self,
        id: &AccountId,
        now: Timestamp,
        proof: Option<&TxReference>,
    ) -> Result<Account, LabError> {
        self.activation.activate(id, now, proof).await
    }

    pub fn claim(&self, id: &AccountId, now: Timestamp) -> Result<ClaimReceipt, LabError> {
        self.claims.claim(id, now)
    }

    pub async fn grant_upgrade(
        &self,
        id: &AccountId,
        now: Timestamp,
        reference: &TxReference,
        power_bonus: Power,
    ) -> Result<UpgradeReceipt, LabError> {
        self.upgrades.grant_upgrade(id, now, reference, power_bonus).await
    }

    pub async fn open_booster<R: Rng + ?Sized>(
        &self,
        id: &AccountId,
        now: Timestamp,
        reference: &TxReference,
        rng: &mut R,
    ) -> Result<BoosterOpening, LabError> {
        self.upgrades.open_booster(id, now, reference, rng).await
    }

    pub fn query_state(&self, id: &AccountId, now: Timestamp) -> Result<AccountState, LabError> {
        self.queries.query_state(id, now)
    }

    pub fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        self.queries.leaderboard(limit)
    }

    pub fn network_stats(&self, now: Timestamp) -> NetworkStats {
        self.queries.network_stats(now)
    }

    pub fn public_config(&self) -> &PublicConfig {
        self.queries.public_config()
    }

    pub fn admin_stats(&self, caller: &AccountId, now: Timestamp) -> Result<AdminStats, LabError> {
        self.queries.admin_stats(caller, now)
    }

    pub fn admin_users(&self, caller: &AccountId, now: Timestamp) -> Result<Vec<AccountState>, LabError> {
        self.queries.admin_users(caller, now)
    }

    pub fn admin_payments(&self, caller: &AccountId) -> Result<Vec<PaymentRecord>, LabError> {
        self.queries.admin_payments(caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::testing::{Scripted, ScriptedVerifier};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const T0: Timestamp = 1_704_067_200;

    fn config() -> LabConfig {
        let mut config = LabConfig::default();
        config.activation.treasury_address = Some("treasury".to_string());
        config
    }

    fn id(raw: &str) -> AccountId {
        AccountId::parse(raw).unwrap()
    }

    fn tx(raw: &str) -> TxReference {
        TxReference::parse(raw).unwrap()
    }

    #[test]
    fn test_requires_treasury() {
        let result = LabService::new(
            &LabConfig::default(),
            Arc::new(LabStorage::in_memory()),
            Arc::new(ScriptedVerifier::new()),
        );
        assert!(matches!(result, Err(SetupError::Config(ConfigError::Invalid(_)))));
    }

    #[test]
    fn test_rejects_empty_bonus_range() {
        let mut config = config();
        config.booster.min_bonus = 0;
        let result = LabService::new(
            &config,
            Arc::new(LabStorage::in_memory()),
            Arc::new(ScriptedVerifier::new()),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let verifier = Arc::new(ScriptedVerifier::new());
        verifier.set("aa", Scripted::Pays(1_000_000));
        verifier.set("bb", Scripted::Pays(300));
        let service = LabService::new(&config(), Arc::new(LabStorage::in_memory()), verifier).unwrap();

        service.activate(&id("alice"), T0, Some(&tx("aa"))).await.unwrap();
        let receipt = service.claim(&id("alice"), T0 + 60).unwrap();
        assert!(receipt.claimed_amount > 0);

        let mut rng = StdRng::seed_from_u64(1);
        let opening = service
            .open_booster(&id("alice"), T0 + 120, &tx("bb"), &mut rng)
            .await
            .unwrap();
        let state = service.query_state(&id("alice"), T0 + 120).unwrap();
        assert_eq!(state.power, 100 + opening.pack.power_bonus);
        assert_eq!(state.network_share, 100.0);

        assert_eq!(service.metrics().activations.get(), 1);
        assert_eq!(service.metrics().upgrades.get(), 1);
        assert_eq!(service.network_stats(T0 + 120).accounts, 1);
        assert_eq!(service.admin_payments(&id("treasury")).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_export_metrics_seeded_from_storage() {
        let verifier = Arc::new(ScriptedVerifier::new());
        verifier.set("aa", Scripted::Pays(1_000_000));
        let storage = Arc::new(LabStorage::in_memory());

        let first = LabService::new(&config(), storage.clone(), verifier.clone()).unwrap();
        first.activate(&id("alice"), T0, Some(&tx("aa"))).await.unwrap();
        let claimed = first.claim(&id("alice"), T0 + 10).unwrap().claimed_amount;

        let second = LabService::new(&config(), storage, verifier).unwrap();
        let text = second.export_metrics().unwrap().unwrap();
        assert!(text.contains("growlab_accounts 1"));
        assert!(text.contains("growlab_network_power 100"));
        assert!(text.contains(&format!("growlab_total_claimed_units {claimed}")));
        assert!(text.contains("growlab_payments_consumed 1"));
        assert!(text.contains("growlab_verified_payment_units 1000000"));
        assert!(text.contains("growlab_activations_total 0"));
    }

    #[test]
    fn test_export_metrics_disabled() {
        let mut config = config();
        config.metrics.enabled = false;
        let service = LabService::new(
            &config,
            Arc::new(LabStorage::in_memory()),
            Arc::new(ScriptedVerifier::new()),
        )
        .unwrap();
        assert!(service.export_metrics().unwrap().is_none());
    }
}
