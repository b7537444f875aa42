//! Error types for GrowLab operations

use crate::types::{AccountId, TxReference};
use thiserror::Error;

/// Result type alias for GrowLab operations
pub type Result<T> = std::result::Result<T, LabError>;

/// Broad error classes, used by callers to choose a response
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before touching state
    Validation,
    /// State already satisfies (or forbids) the request
    Conflict,
    /// Account or payment does not exist
    NotFound,
    /// Verifier unreachable or payment not (yet) acceptable
    ExternalFailure,
    /// Nothing happened; not a failure of the system
    NoOp,
    /// Caller lacks the treasury identity
    Unauthorized,
    /// A decided transition could not be committed
    Fatal,
}

/// Errors that can occur in GrowLab operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LabError {
    // === Validation ===
    /// Malformed or missing input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Interval end precedes its start
    #[error("Invalid interval: to ({to}) precedes from ({from})")]
    InvalidInterval { from: i64, to: i64 },

    /// Non-treasury activation without a transaction reference
    #[error("Missing txHash for payment")]
    MissingPayment,

    // === Conflicts ===
    /// Account already exists for this identity
    #[error("Lab already activated for this address: {0}")]
    AlreadyActive(AccountId),

    /// Transaction reference already consumed (or owned by another payer)
    #[error("Transaction already processed: {0}")]
    PaymentAlreadyUsed(TxReference),

    /// Payment already marked verified
    #[error("Payment already verified: {0}")]
    AlreadyVerified(TxReference),

    /// Payment already consumed
    #[error("Payment already consumed: {0}")]
    AlreadyConsumed(TxReference),

    /// Consumption attempted before verification
    #[error("Payment not verified yet: {0}")]
    PaymentUnverified(TxReference),

    // === Not found ===
    /// No account for this identity
    #[error("Lab not found for this address: {0}")]
    AccountNotFound(AccountId),

    /// No payment for this reference
    #[error("Payment not found: {0}")]
    PaymentNotFound(TxReference),

    // === External ===
    /// The verifier could not confirm the payment
    #[error("Payment verification failed: {reason}")]
    PaymentNotVerified { reason: String },

    // === No-op ===
    /// Claim with zero pending reward
    #[error("No pending rewards to claim")]
    NothingToClaim,

    // === Authorization ===
    /// Admin view requested by a non-treasury identity
    #[error("Unauthorized: admin access only")]
    Unauthorized,

    // === Fatal ===
    /// Storage failed to commit a decided transition
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LabError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::InvalidInterval { .. } | Self::MissingPayment => {
                ErrorKind::Validation
            }
            Self::AlreadyActive(_)
            | Self::PaymentAlreadyUsed(_)
            | Self::AlreadyVerified(_)
            | Self::AlreadyConsumed(_)
            | Self::PaymentUnverified(_) => ErrorKind::Conflict,
            Self::AccountNotFound(_) | Self::PaymentNotFound(_) => ErrorKind::NotFound,
            Self::PaymentNotVerified { .. } => ErrorKind::ExternalFailure,
            Self::NothingToClaim => ErrorKind::NoOp,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Storage(_) => ErrorKind::Fatal,
        }
    }

    /// HTTP-style status code for API responses
    pub fn code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::Conflict | ErrorKind::NoOp => 400,
            ErrorKind::ExternalFailure => 400,
            ErrorKind::Unauthorized => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Fatal => 500,
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::ExternalFailure | ErrorKind::Fatal)
    }

    /// Whether the error must be surfaced loudly
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}
