//! Lab configuration types
//!
//! Loaded from an optional TOML file, then overlaid with `GROWLAB__*`
//! environment variables (`GROWLAB__ACTIVATION__PRICE=2000000`).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use growlab_core::{tokens_to_units, AccountId, Amount, LabError, Power};
use growlab_economics::{EmissionSchedule, DEFAULT_GENESIS_TIME, DEFAULT_HALVING_INTERVAL_SECS};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "GROWLAB";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Complete lab configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LabConfig {
    /// Emission schedule parameters
    #[serde(default)]
    pub emission: EmissionSettings,

    /// Lab activation
    #[serde(default)]
    pub activation: ActivationSettings,

    /// Booster packs
    #[serde(default)]
    pub booster: BoosterSettings,

    /// Payment verifier
    #[serde(default)]
    pub verifier: VerifierSettings,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsSettings,
}

impl LabConfig {
    /// Load from an optional file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Parse from a TOML string
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Invalid(vec![e.to_string()]))
    }

    /// Problems that prevent the lab from serving payments
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        match &self.activation.treasury_address {
            None => problems.push("activation.treasury_address is required".to_string()),
            Some(addr) if AccountId::parse(addr).is_err() => {
                problems.push(format!("activation.treasury_address is invalid: {addr:?}"))
            }
            Some(_) => {}
        }
        if self.verifier.project_id.is_none() {
            problems.push("verifier.project_id is required".to_string());
        }
        if self.verifier.policy_id.is_none() {
            problems.push("verifier.policy_id is required".to_string());
        }
        if self.activation.base_power == 0 {
            problems.push("activation.base_power must be positive".to_string());
        }
        if self.booster.min_bonus == 0 || self.booster.min_bonus > self.booster.max_bonus {
            problems.push(format!(
                "booster bonus range {}..={} is empty or starts at zero",
                self.booster.min_bonus, self.booster.max_bonus
            ));
        }
        if self.emission.halving_interval_secs == 0 {
            problems.push("emission.halving_interval_secs must be positive".to_string());
        }

        problems
    }

    /// Fail with every problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    /// Build the emission schedule
    pub fn schedule(&self) -> Result<EmissionSchedule, LabError> {
        EmissionSchedule::new(
            self.emission.genesis_time,
            self.emission.initial_rate(),
            self.emission.halving_interval_secs,
        )
    }

    /// Treasury identity, if configured and well-formed
    pub fn treasury(&self) -> Option<AccountId> {
        self.activation
            .treasury_address
            .as_deref()
            .and_then(|addr| AccountId::parse(addr).ok())
    }
}

/// Emission settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmissionSettings {
    /// Genesis timestamp (Unix seconds)
    #[serde(default = "default_genesis_time")]
    pub genesis_time: i64,

    /// Era-0 emission per second per unit of power, in tokens
    #[serde(default = "default_emission_per_second")]
    pub emission_per_second: f64,

    /// Halving interval in seconds
    #[serde(default = "default_halving_interval")]
    pub halving_interval_secs: u64,
}

fn default_genesis_time() -> i64 {
    DEFAULT_GENESIS_TIME
}

fn default_emission_per_second() -> f64 {
    0.5
}

fn default_halving_interval() -> u64 {
    DEFAULT_HALVING_INTERVAL_SECS
}

impl EmissionSettings {
    /// Era-0 rate in base units
    pub fn initial_rate(&self) -> Amount {
        tokens_to_units(self.emission_per_second)
    }
}

impl Default for EmissionSettings {
    fn default() -> Self {
        Self {
            genesis_time: default_genesis_time(),
            emission_per_second: default_emission_per_second(),
            halving_interval_secs: default_halving_interval(),
        }
    }
}

/// Activation settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivationSettings {
    /// Activation price in token base units
    #[serde(default = "default_activation_price")]
    pub price: u64,

    /// Power granted on activation
    #[serde(default = "default_base_power")]
    pub base_power: Power,

    /// Treasury address: receives payments, activates for free, sees admin views
    #[serde(default)]
    pub treasury_address: Option<String>,
}

fn default_activation_price() -> u64 {
    1_000_000
}

fn default_base_power() -> Power {
    100
}

impl Default for ActivationSettings {
    fn default() -> Self {
        Self {
            price: default_activation_price(),
            base_power: default_base_power(),
            treasury_address: None,
        }
    }
}

/// Booster pack settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BoosterSettings {
    /// Booster price in token base units
    #[serde(default = "default_booster_price")]
    pub price: u64,

    /// Smallest power bonus a pack can roll
    #[serde(default = "default_min_bonus")]
    pub min_bonus: Power,

    /// Largest power bonus a pack can roll
    #[serde(default = "default_max_bonus")]
    pub max_bonus: Power,
}

fn default_booster_price() -> u64 {
    300
}

fn default_min_bonus() -> Power {
    10
}

fn default_max_bonus() -> Power {
    50
}

impl Default for BoosterSettings {
    fn default() -> Self {
        Self {
            price: default_booster_price(),
            min_bonus: default_min_bonus(),
            max_bonus: default_max_bonus(),
        }
    }
}

/// Payment verifier settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifierSettings {
    /// Network: preprod or mainnet
    #[serde(default = "default_network")]
    pub network: String,

    /// Blockfrost project id
    #[serde(default)]
    pub project_id: Option<String>,

    /// API base URL (derived from the network when absent)
    #[serde(default)]
    pub api_url: Option<String>,

    /// Token policy id (hex)
    #[serde(default)]
    pub policy_id: Option<String>,

    /// Token asset name
    #[serde(default = "default_asset_name")]
    pub asset_name: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_network() -> String {
    "preprod".to_string()
}

fn default_asset_name() -> String {
    "COKE".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

impl VerifierSettings {
    /// API base URL
    pub fn api_base(&self) -> String {
        if let Some(url) = &self.api_url {
            return url.trim_end_matches('/').to_string();
        }
        if self.network == "mainnet" {
            "https://cardano-mainnet.blockfrost.io/api/v0".to_string()
        } else {
            "https://cardano-preprod.blockfrost.io/api/v0".to_string()
        }
    }

    /// Native token unit: policy id followed by the hex-encoded asset name
    pub fn token_unit(&self) -> Option<String> {
        self.policy_id
            .as_ref()
            .map(|policy| format!("{}{}", policy, hex::encode(self.asset_name.as_bytes())))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            network: default_network(),
            project_id: None,
            api_url: None,
            policy_id: None,
            asset_name: default_asset_name(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Storage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Snapshot file path
    #[serde(default = "default_data_file")]
    pub data_file: String,
}

fn default_data_file() -> String {
    "./growlab.db".to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Metrics configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Enable metrics
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}
