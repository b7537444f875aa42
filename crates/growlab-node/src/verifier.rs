//! # Payment Verification
//!
//! The lab never inspects the chain itself. It asks a [`PaymentVerifier`]
//! two questions about a transaction reference:
//!
//! 1. Is it confirmed?
//! 2. Did it pay at least `minimum_amount` of the lab token to the treasury?
//!
//! [`PaymentGate`] wraps a verifier with the timeout and error mapping every
//! payment-gated operation shares. Any failure surfaces as a retryable
//! `PaymentNotVerified`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use growlab_core::{AccountId, Amount, LabError, TxReference};

use crate::metrics::LabMetrics;

/// Confirmation status of a transaction
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub confirmed: bool,
    pub block_height: Option<u64>,
    pub block_time: Option<i64>,
    pub reason: Option<String>,
}

impl Confirmation {
    pub fn confirmed(block_height: Option<u64>, block_time: Option<i64>) -> Self {
        Self {
            confirmed: true,
            block_height,
            block_time,
            reason: None,
        }
    }

    pub fn unconfirmed(reason: impl Into<String>) -> Self {
        Self {
            confirmed: false,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// Result of checking a payment's content
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub verified: bool,
    pub amount: Amount,
    pub reason: Option<String>,
}

impl Verification {
    pub fn verified(amount: Amount) -> Self {
        Self {
            verified: true,
            amount,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            verified: false,
            amount: 0,
            reason: Some(reason.into()),
        }
    }
}

/// Verifier errors
#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    #[error("Verifier request failed: {0}")]
    Request(String),

    #[error("Verifier API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Malformed verifier response: {0}")]
    Decode(String),

    #[error("Verifier not configured: {0}")]
    NotConfigured(String),
}

/// External payment verification collaborator
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    /// Verifier name, for logs
    fn name(&self) -> &str;

    /// Whether the transaction is confirmed on chain
    async fn confirmation_status(&self, reference: &TxReference) -> Result<Confirmation, VerifierError>;

    /// Whether the transaction paid at least `minimum_amount` to `recipient`
    async fn verify(
        &self,
        reference: &TxReference,
        minimum_amount: Amount,
        recipient: &AccountId,
    ) -> Result<Verification, VerifierError>;
}

/// Confirmation-then-verification with a deadline
pub struct PaymentGate {
    verifier: Arc<dyn PaymentVerifier>,
    recipient: AccountId,
    timeout: Duration,
    metrics: Arc<LabMetrics>,
}

impl PaymentGate {
    pub fn new(
        verifier: Arc<dyn PaymentVerifier>,
        recipient: AccountId,
        timeout: Duration,
        metrics: Arc<LabMetrics>,
    ) -> Self {
        Self {
            verifier,
            recipient,
            timeout,
            metrics,
        }
    }

    pub fn recipient(&self) -> &AccountId {
        &self.recipient
    }

    /// Confirm and verify a payment of at least `minimum_amount`.
    ///
    /// Returns the verified amount. Every failure is `PaymentNotVerified`.
    pub async fn check(&self, reference: &TxReference, minimum_amount: Amount) -> Result<Amount, LabError> {
        let outcome = tokio::time::timeout(self.timeout, self.check_inner(reference, minimum_amount)).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(format!(
                "verification timed out after {}s",
                self.timeout.as_secs()
            )),
        };

        result.map_err(|reason| {
            self.metrics.verification_failures.inc();
            tracing::warn!(
                %reference,
                verifier = self.verifier.name(),
                %reason,
                "Payment verification failed"
            );
            LabError::PaymentNotVerified { reason }
        })
    }

    async fn check_inner(&self, reference: &TxReference, minimum_amount: Amount) -> Result<Amount, String> {
        let status = self
            .verifier
            .confirmation_status(reference)
            .await
            .map_err(|e| e.to_string())?;
        if !status.confirmed {
            return Err(status
                .reason
                .unwrap_or_else(|| "Transaction not confirmed".to_string()));
        }

        let verification = self
            .verifier
            .verify(reference, minimum_amount, &self.recipient)
            .await
            .map_err(|e| e.to_string())?;
        if !verification.verified {
            return Err(verification
                .reason
                .unwrap_or_else(|| "Payment not found".to_string()));
        }
        if verification.amount < minimum_amount {
            return Err(format!(
                "paid {} but {} is required",
                verification.amount, minimum_amount
            ));
        }

        tracing::info!(%reference, amount = %verification.amount, "Payment verified");
        Ok(verification.amount)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted verifier for service tests

    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Canned verifier outcome for one reference
    #[derive(Clone, Debug)]
    pub enum Scripted {
        Pays(Amount),
        Unconfirmed,
        Unreachable,
        Hangs,
    }

    /// Verifier answering from a script; unknown references are unconfirmed
    #[derive(Default)]
    pub struct ScriptedVerifier {
        script: Mutex<HashMap<TxReference, Scripted>>,
        calls: Mutex<Vec<TxReference>>,
    }

    impl ScriptedVerifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set(&self, reference: &str, outcome: Scripted) {
            self.script
                .lock()
                .insert(TxReference::parse(reference).unwrap(), outcome);
        }

        pub fn calls(&self) -> usize {
            self.calls.lock().len()
        }

        fn outcome(&self, reference: &TxReference) -> Option<Scripted> {
            self.script.lock().get(reference).cloned()
        }
    }

    #[async_trait]
    impl PaymentVerifier for ScriptedVerifier {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn confirmation_status(&self, reference: &TxReference) -> Result<Confirmation, VerifierError> {
            self.calls.lock().push(reference.clone());
            match self.outcome(reference) {
                Some(Scripted::Pays(_)) => Ok(Confirmation::confirmed(Some(1), Some(1))),
                Some(Scripted::Unreachable) => Err(VerifierError::Request("connection refused".into())),
                Some(Scripted::Hangs) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Confirmation::unconfirmed("late"))
                }
                Some(Scripted::Unconfirmed) | None => {
                    Ok(Confirmation::unconfirmed("Transaction not found or not yet confirmed"))
                }
            }
        }

        async fn verify(
            &self,
            reference: &TxReference,
            minimum_amount: Amount,
            _recipient: &AccountId,
        ) -> Result<Verification, VerifierError> {
            match self.outcome(reference) {
                Some(Scripted::Pays(amount)) if amount >= minimum_amount => Ok(Verification::verified(amount)),
                Some(Scripted::Pays(_)) => Ok(Verification::rejected(format!(
                    "No payment of {minimum_amount} found to treasury address"
                ))),
                _ => Ok(Verification::rejected("not paid")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn gate(verifier: Arc<ScriptedVerifier>) -> PaymentGate {
        PaymentGate::new(
            verifier,
            AccountId::parse("treasury").unwrap(),
            Duration::from_secs(5),
            Arc::new(LabMetrics::new().unwrap()),
        )
    }

    fn tx(raw: &str) -> TxReference {
        TxReference::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_check_pays() {
        let v = Arc::new(ScriptedVerifier::new());
        v.set("aa", Scripted::Pays(1_500));
        assert_eq!(gate(v).check(&tx("aa"), 1_000).await.unwrap(), 1_500);
    }

    #[tokio::test]
    async fn test_check_underpaid() {
        let v = Arc::new(ScriptedVerifier::new());
        v.set("aa", Scripted::Pays(10));
        let err = gate(v).check(&tx("aa"), 1_000).await.unwrap_err();
        assert!(matches!(err, LabError::PaymentNotVerified { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_check_unconfirmed_reports_reason() {
        let v = Arc::new(ScriptedVerifier::new());
        let err = gate(v).check(&tx("aa"), 1).await.unwrap_err();
        match err {
            LabError::PaymentNotVerified { reason } => assert!(reason.contains("not yet confirmed")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_check_unreachable() {
        let v = Arc::new(ScriptedVerifier::new());
        v.set("aa", Scripted::Unreachable);
        let metrics = Arc::new(LabMetrics::new().unwrap());
        let g = PaymentGate::new(
            v,
            AccountId::parse("treasury").unwrap(),
            Duration::from_secs(5),
            metrics.clone(),
        );
        assert!(g.check(&tx("aa"), 1).await.is_err());
        assert_eq!(metrics.verification_failures.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_times_out() {
        let v = Arc::new(ScriptedVerifier::new());
        v.set("aa", Scripted::Hangs);
        let err = gate(v).check(&tx("aa"), 1).await.unwrap_err();
        match err {
            LabError::PaymentNotVerified { reason } => assert!(reason.contains("timed out")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
