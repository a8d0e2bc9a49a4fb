use crate::config::PaymentsConfig;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("payment API key is not configured (set AIWALLS_PAYMENTS_API_KEY)")]
    MissingApiKey,
    #[error("payment {0} has no transaction id yet")]
    MissingTxid(String),
    #[error("processor rejected {step} of payment {payment_id}: HTTP {status}")]
    Rejected {
        step: &'static str,
        payment_id: String,
        status: u16,
    },
    #[error("processor did not confirm {step} of payment {payment_id}")]
    NotConfirmed {
        step: &'static str,
        payment_id: String,
    },
    #[error("payment request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("no authenticated wallet user")]
    NotAuthenticated,
    #[error("invalid payment amount {0}")]
    InvalidAmount(f64),
    #[error("balance {0:?} is not a number")]
    InvalidBalance(String),
    #[error("withdrawing {amount} would leave {remaining}, below the minimum of {min_balance}")]
    InsufficientBalance {
        amount: f64,
        remaining: f64,
        min_balance: f64,
    },
    #[error("payment {0} was cancelled")]
    Cancelled(String),
    #[error("wallet reported an error: {0}")]
    Wallet(String),
    #[error("payment events ended before the payment completed")]
    StreamClosed,
}

/// Server-side half of the payment handshake: approve and complete calls
/// against the processor's REST API.
#[derive(Clone)]
pub struct PaymentApiClient {
    client: Client,
    api_base: String,
    api_key: String,
}

impl PaymentApiClient {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Build from config. The key must come from config or environment.
    pub fn from_config(config: &PaymentsConfig) -> Result<Self, PaymentError> {
        let key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(PaymentError::MissingApiKey)?;
        Ok(Self::new(
            config.api_base.clone(),
            key,
            Duration::from_secs(config.timeout_secs),
        ))
    }

    fn payment_url(&self, payment_id: &str, step: &str) -> String {
        format!("{}/v2/payments/{payment_id}/{step}", self.api_base)
    }

    async fn post(
        &self,
        step: &'static str,
        payment_id: &str,
        body: Value,
    ) -> Result<Value, PaymentError> {
        let url = self.payment_url(payment_id, step);
        debug!(payment_id, step, "Calling payment processor");
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Key {}", self.api_key))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PaymentError::Rejected {
                step,
                payment_id: payment_id.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.json::<Value>().await?)
    }

    /// Approve a payment the wallet reported as ready for server approval.
    pub async fn approve(&self, payment_id: &str) -> Result<Value, PaymentError> {
        let data = self.post("approve", payment_id, json!({})).await?;
        if !confirmed(&data, "developer_approved") {
            return Err(PaymentError::NotConfirmed {
                step: "approve",
                payment_id: payment_id.to_string(),
            });
        }
        info!(payment_id, "Payment approved");
        Ok(data)
    }

    /// Complete a payment once the wallet has an on-chain transaction id.
    pub async fn complete(&self, payment_id: &str, txid: &str) -> Result<Value, PaymentError> {
        if txid.trim().is_empty() {
            return Err(PaymentError::MissingTxid(payment_id.to_string()));
        }
        let data = self
            .post("complete", payment_id, json!({ "txid": txid }))
            .await?;
        if !confirmed(&data, "developer_completed") {
            return Err(PaymentError::NotConfirmed {
                step: "complete",
                payment_id: payment_id.to_string(),
            });
        }
        info!(payment_id, txid, "Payment completed");
        Ok(data)
    }
}

/// `status.<flag> == true`, or the older `success == true` shape.
fn confirmed(data: &Value, flag: &str) -> bool {
    data.pointer(&format!("/status/{flag}"))
        .and_then(Value::as_bool)
        .or_else(|| data.get("success").and_then(Value::as_bool))
        .unwrap_or(false)
}
