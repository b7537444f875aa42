//! Prometheus metrics
//!
//! Counters cover the current process. Gauges are refreshed from storage, so
//! they are meaningful from a one-shot process too.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Lab metrics
pub struct LabMetrics {
    /// Prometheus registry
    registry: Registry,
    pub activations: IntCounter,
    pub claims: IntCounter,
    pub claimed_units: IntCounter,
    pub upgrades: IntCounter,
    pub verification_failures: IntCounter,
    pub accounts: IntGauge,
    pub network_power: IntGauge,
    pub claimed_total: IntGauge,
    pub payments_consumed: IntGauge,
    pub verified_volume: IntGauge,
}

fn saturating_i64<T: TryInto<i64>>(value: T) -> i64 {
    value.try_into().unwrap_or(i64::MAX)
}

impl LabMetrics {
    /// Create and register every metric
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let activations = IntCounter::new("growlab_activations_total", "Labs activated")?;
        let claims = IntCounter::new("growlab_claims_total", "Successful claims")?;
        let claimed_units = IntCounter::new(
            "growlab_claimed_units_total",
            "Reward base units moved into claimed totals",
        )?;
        let upgrades = IntCounter::new("growlab_upgrades_total", "Booster packs applied")?;
        let verification_failures = IntCounter::new(
            "growlab_verification_failures_total",
            "Payment verifications that failed or timed out",
        )?;
        let accounts = IntGauge::new("growlab_accounts", "Active labs")?;
        let network_power = IntGauge::new("growlab_network_power", "Sum of power over all labs")?;
        let claimed_total = IntGauge::new(
            "growlab_total_claimed_units",
            "Reward base units claimed over all labs",
        )?;
        let payments_consumed =
            IntGauge::new("growlab_payments_consumed", "Payments applied to a lab")?;
        let verified_volume = IntGauge::new(
            "growlab_verified_payment_units",
            "Sum of verified payment amounts in base units",
        )?;

        for collector in [
            Box::new(activations.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(claims.clone()),
            Box::new(claimed_units.clone()),
            Box::new(upgrades.clone()),
            Box::new(verification_failures.clone()),
            Box::new(accounts.clone()),
            Box::new(network_power.clone()),
            Box::new(claimed_total.clone()),
            Box::new(payments_consumed.clone()),
            Box::new(verified_volume.clone()),
        ] {
            registry.register(collector)?;
        }

        Ok(Self {
            registry,
            activations,
            claims,
            claimed_units,
            upgrades,
            verification_failures,
            accounts,
            network_power,
            claimed_total,
            payments_consumed,
            verified_volume,
        })
    }

    /// Record claimed base units (saturating at the counter's range)
    pub fn record_claim(&self, units: u128) {
        self.claims.inc();
        self.claimed_units.inc_by(u64::try_from(units).unwrap_or(u64::MAX));
    }

    /// Refresh the network gauges
    pub fn observe_network(&self, accounts: usize, power: u128) {
        self.accounts.set(saturating_i64(accounts));
        self.network_power.set(saturating_i64(power));
    }

    /// Refresh the claim and payment gauges
    pub fn observe_totals(&self, claimed: u128, consumed_payments: usize, verified_volume: u128) {
        self.claimed_total.set(saturating_i64(claimed));
        self.payments_consumed.set(saturating_i64(consumed_payments));
        self.verified_volume.set(saturating_i64(verified_volume));
    }

    /// Text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_metrics() {
        let metrics = LabMetrics::new().unwrap();
        metrics.activations.inc();
        metrics.record_claim(1_500);
        metrics.observe_network(2, 1_000);

        let text = metrics.render().unwrap();
        assert!(text.contains("growlab_activations_total 1"));
        assert!(text.contains("growlab_claimed_units_total 1500"));
        assert!(text.contains("growlab_network_power 1000"));
    }

    #[test]
    fn test_totals_saturate() {
        let metrics = LabMetrics::new().unwrap();
        metrics.observe_totals(u128::MAX, 3, 42);
        assert_eq!(metrics.claimed_total.get(), i64::MAX);
        assert_eq!(metrics.payments_consumed.get(), 3);

        let text = metrics.render().unwrap();
        assert!(text.contains("growlab_verified_payment_units 42"));
    }

    #[test]
    fn test_independent_registries() {
        let a = LabMetrics::new().unwrap();
        let b = LabMetrics::new().unwrap();
        a.claims.inc();
        assert_eq!(b.claims.get(), 0);
    }
}
