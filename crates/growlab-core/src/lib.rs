//! # GrowLab Core
//!
//! Core data structures shared by every GrowLab crate.
//!
//! - `Account` - a participant's lab: power, pending and claimed rewards
//! - `PaymentRecord` - an externally verified payment, keyed by its transaction reference
//! - `LabError` - the error taxonomy returned by every service operation
//!
//! ## Account lifecycle
//!
//! ```text
//!   Uninitialized ──activate──► Active ──┬── claim (settle + move pending)
//!                                        └── upgrade (settle + add power)
//! ```
//!
//! ## Payment lifecycle
//!
//! ```text
//!   Unseen ──► Recorded ──► Verified ──► Consumed
//! ```

pub mod account;
pub mod error;
pub mod payment;
pub mod types;

pub use account::*;
pub use error::*;
pub use payment::*;
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::account::Account;
    pub use crate::error::{ErrorKind, LabError, Result};
    pub use crate::payment::{PaymentPurpose, PaymentRecord, PaymentStage};
    pub use crate::types::*;
}
