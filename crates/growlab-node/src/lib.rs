//! # GrowLab Node
//!
//! Payment-gated lab activation, reward claims, booster upgrades and
//! read-only views over shared storage, behind the [`LabService`] facade.

pub mod activation;
pub mod blockfrost;
pub mod claim;
pub mod config;
pub mod guard;
pub mod ledger;
pub mod metrics;
pub mod query;
pub mod registry;
pub mod service;
pub mod upgrade;
pub mod verifier;

pub use blockfrost::BlockfrostVerifier;
pub use claim::ClaimReceipt;
pub use config::{ConfigError, LabConfig};
pub use metrics::LabMetrics;
pub use query::{AccountState, AdminStats, LeaderboardEntry, NetworkStats, PublicConfig};
pub use service::{LabService, SetupError};
pub use upgrade::{BoosterOpening, BoosterPack, Rarity, UpgradeReceipt};
pub use verifier::{Confirmation, PaymentVerifier, Verification, VerifierError};
