//! Blockfrost-backed payment verifier
//!
//! - `GET /txs/{hash}` answers confirmation (404 means not yet on chain)
//! - `GET /txs/{hash}/utxos` lists outputs; a payment is an output to the
//!   treasury address carrying enough of the lab token unit

use async_trait::async_trait;
use serde::Deserialize;

use growlab_core::{AccountId, Amount, TxReference};

use crate::config::VerifierSettings;
use crate::verifier::{Confirmation, PaymentVerifier, Verification, VerifierError};

#[derive(Debug, Deserialize)]
struct TxInfo {
    block_height: Option<u64>,
    block_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TxUtxos {
    outputs: Vec<UtxoOutput>,
}

#[derive(Debug, Deserialize)]
struct UtxoOutput {
    address: String,
    amount: Vec<UtxoAmount>,
}

#[derive(Debug, Deserialize)]
struct UtxoAmount {
    unit: String,
    quantity: String,
}

/// Blockfrost HTTP verifier
pub struct BlockfrostVerifier {
    client: reqwest::Client,
    api_base: String,
    project_id: String,
    token_unit: String,
    asset_name: String,
}

impl BlockfrostVerifier {
    /// Build from settings; the project id and policy id are required
    pub fn new(settings: &VerifierSettings) -> Result<Self, VerifierError> {
        let project_id = settings
            .project_id
            .clone()
            .ok_or_else(|| VerifierError::NotConfigured("verifier.project_id".to_string()))?;
        let token_unit = settings
            .token_unit()
            .ok_or_else(|| VerifierError::NotConfigured("verifier.policy_id".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| VerifierError::Request(e.to_string()))?;

        Ok(Self {
            client,
            api_base: settings.api_base(),
            project_id,
            token_unit,
            asset_name: settings.asset_name.clone(),
        })
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, VerifierError> {
        let url = format!("{}{}", self.api_base, path);
        self.client
            .get(&url)
            .header("project_id", &self.project_id)
            .send()
            .await
            .map_err(|e| VerifierError::Request(e.to_string()))
    }

    async fn api_error(response: reqwest::Response) -> VerifierError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        VerifierError::Api { status, body }
    }
}

/// Largest quantity of `unit` paid to `recipient`, if any
fn paid_to(outputs: &[UtxoOutput], recipient: &str, unit: &str) -> Result<Option<Amount>, VerifierError> {
    let mut best: Option<Amount> = None;
    for output in outputs.iter().filter(|o| o.address == recipient) {
        for amount in output.amount.iter().filter(|a| a.unit == unit) {
            let quantity: Amount = amount
                .quantity
                .parse()
                .map_err(|_| VerifierError::Decode(format!("bad quantity {:?}", amount.quantity)))?;
            best = Some(best.map_or(quantity, |b| b.max(quantity)));
        }
    }
    Ok(best)
}

#[async_trait]
impl PaymentVerifier for BlockfrostVerifier {
    fn name(&self) -> &str {
        "blockfrost"
    }

    async fn confirmation_status(&self, reference: &TxReference) -> Result<Confirmation, VerifierError> {
        let response = self.get(&format!("/txs/{}", reference)).await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Confirmation::unconfirmed(
                "Transaction not found or not yet confirmed",
            ));
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let info: TxInfo = response
            .json()
            .await
            .map_err(|e| VerifierError::Decode(e.to_string()))?;
        Ok(Confirmation::confirmed(info.block_height, info.block_time))
    }

    async fn verify(
        &self,
        reference: &TxReference,
        minimum_amount: Amount,
        recipient: &AccountId,
    ) -> Result<Verification, VerifierError> {
        let response = self.get(&format!("/txs/{}/utxos", reference)).await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let utxos: TxUtxos = response
            .json()
            .await
            .map_err(|e| VerifierError::Decode(e.to_string()))?;

        match paid_to(&utxos.outputs, recipient.as_str(), &self.token_unit)? {
            Some(quantity) if quantity >= minimum_amount => {
                tracing::debug!(%reference, %quantity, "Treasury output found");
                Ok(Verification::verified(quantity))
            }
            _ => Ok(Verification::rejected(format!(
                "No payment of {} {} found to treasury address",
                minimum_amount, self.asset_name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs() -> Vec<UtxoOutput> {
        let raw = r#"{
            "outputs": [
                {"address": "addr_user", "amount": [{"unit": "lovelace", "quantity": "1000"}]},
                {"address": "addr_treasury", "amount": [
                    {"unit": "lovelace", "quantity": "1500000"},
                    {"unit": "abcd434f4b45", "quantity": "1000000"}
                ]}
            ]
        }"#;
        serde_json::from_str::<TxUtxos>(raw).unwrap().outputs
    }

    #[test]
    fn test_paid_to_treasury() {
        let paid = paid_to(&outputs(), "addr_treasury", "abcd434f4b45").unwrap();
        assert_eq!(paid, Some(1_000_000));
    }

    #[test]
    fn test_wrong_recipient_or_unit() {
        assert_eq!(paid_to(&outputs(), "addr_user", "abcd434f4b45").unwrap(), None);
        assert_eq!(paid_to(&outputs(), "addr_treasury", "ffff").unwrap(), None);
    }

    #[test]
    fn test_bad_quantity() {
        let outs = vec![UtxoOutput {
            address: "t".into(),
            amount: vec![UtxoAmount {
                unit: "u".into(),
                quantity: "lots".into(),
            }],
        }];
        assert!(matches!(paid_to(&outs, "t", "u"), Err(VerifierError::Decode(_))));
    }

    #[test]
    fn test_requires_configuration() {
        let settings = VerifierSettings::default();
        assert!(matches!(
            BlockfrostVerifier::new(&settings),
            Err(VerifierError::NotConfigured(_))
        ));
    }
}
