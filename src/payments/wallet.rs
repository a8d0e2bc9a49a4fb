use super::client::{PaymentApiClient, PaymentError};
use crate::observability::{NoopObserver, Observer, ObserverEvent};
use crate::storage::{TransactionLog, TransactionRecord, TransactionStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub const DEFAULT_SCOPES: &[&str] = &["username", "payments"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletUser {
    pub uid: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSpec {
    pub amount: f64,
    pub memo: String,
    #[serde(default)]
    pub metadata: Value,
    /// Recipient wallet, when the wallet SDK needs one
    #[serde(default)]
    pub to_address: Option<String>,
}

/// Callbacks of the wallet SDK, delivered in order over a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    IncompleteFound {
        payment_id: String,
        txid: Option<String>,
    },
    ReadyForServerApproval {
        payment_id: String,
    },
    ReadyForServerCompletion {
        payment_id: String,
        txid: Option<String>,
    },
    Cancelled {
        payment_id: String,
    },
    Failed {
        payment_id: Option<String>,
        message: String,
    },
}

/// External wallet SDK. Its authentication and signing internals are
/// opaque; only these entry points are used.
#[async_trait]
pub trait WalletSdk: Send + Sync {
    async fn authenticate(&self, scopes: &[&str]) -> anyhow::Result<WalletUser>;

    /// User from the last successful `authenticate`, if any.
    fn current_user(&self) -> Option<WalletUser>;

    /// Raw balance as reported by the wallet.
    async fn balance(&self) -> anyhow::Result<String>;

    /// Start a payment. Progress arrives on `events`.
    async fn create_payment(
        &self,
        spec: PaymentSpec,
        events: mpsc::Sender<PaymentEvent>,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub payment_id: String,
    pub txid: String,
}

/// Drives the server side of one payment from wallet events.
pub struct PaymentFlow {
    api: PaymentApiClient,
    log: Option<TransactionLog>,
    observer: Arc<dyn Observer>,
}

impl PaymentFlow {
    pub fn new(api: PaymentApiClient) -> Self {
        Self {
            api,
            log: None,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_log(mut self, log: TransactionLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Consume events until the payment completes, is cancelled or fails.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<PaymentEvent>,
    ) -> Result<PaymentOutcome, PaymentError> {
        while let Some(event) = events.recv().await {
            match event {
                PaymentEvent::IncompleteFound { payment_id, txid } => {
                    warn!(payment_id = %payment_id, txid = ?txid, "Wallet reported an incomplete payment");
                }
                PaymentEvent::ReadyForServerApproval { payment_id } => {
                    let result = self.api.approve(&payment_id).await;
                    self.step(&payment_id, "approve", result.is_ok());
                    if let Err(e) = result {
                        self.record(&payment_id, None, TransactionStatus::Failed)
                            .await;
                        return Err(e);
                    }
                }
                PaymentEvent::ReadyForServerCompletion { payment_id, txid } => {
                    let Some(txid) = txid.filter(|t| !t.trim().is_empty()) else {
                        self.step(&payment_id, "complete", false);
                        self.record(&payment_id, None, TransactionStatus::Failed)
                            .await;
                        return Err(PaymentError::MissingTxid(payment_id));
                    };
                    let result = self.api.complete(&payment_id, &txid).await;
                    self.step(&payment_id, "complete", result.is_ok());
                    if let Err(e) = result {
                        self.record(&payment_id, Some(txid), TransactionStatus::Failed)
                            .await;
                        return Err(e);
                    }
                    self.record(&payment_id, Some(txid.clone()), TransactionStatus::Completed)
                        .await;
                    return Ok(PaymentOutcome { payment_id, txid });
                }
                PaymentEvent::Cancelled { payment_id } => {
                    info!(payment_id = %payment_id, "Payment cancelled by user");
                    self.record(&payment_id, None, TransactionStatus::Cancelled)
                        .await;
                    return Err(PaymentError::Cancelled(payment_id));
                }
                PaymentEvent::Failed {
                    payment_id,
                    message,
                } => {
                    if let Some(payment_id) = &payment_id {
                        self.record(payment_id, None, TransactionStatus::Failed)
                            .await;
                    }
                    return Err(PaymentError::Wallet(message));
                }
            }
        }
        Err(PaymentError::StreamClosed)
    }

    fn step(&self, payment_id: &str, step: &str, success: bool) {
        self.observer.record_event(&ObserverEvent::PaymentStep {
            payment_id: payment_id.to_string(),
            step: step.to_string(),
            success,
        });
    }

    async fn record(&self, payment_id: &str, txid: Option<String>, status: TransactionStatus) {
        let Some(log) = &self.log else {
            return;
        };
        if let Err(e) = log
            .append(TransactionRecord::new(payment_id, txid, status))
            .await
        {
            warn!("Failed to persist transaction record for {payment_id}: {e:#}");
        }
    }
}

/// Start a payment through the wallet and drive it to completion.
pub async fn send_payment(
    sdk: &dyn WalletSdk,
    spec: PaymentSpec,
    flow: &PaymentFlow,
) -> Result<PaymentOutcome, PaymentError> {
    if sdk.current_user().is_none() {
        return Err(PaymentError::NotAuthenticated);
    }
    if !spec.amount.is_finite() || spec.amount <= 0.0 {
        return Err(PaymentError::InvalidAmount(spec.amount));
    }

    let (tx, rx) = mpsc::channel(16);
    let (created, outcome) = tokio::join!(sdk.create_payment(spec, tx), flow.run(rx));
    created.map_err(|e| PaymentError::Wallet(format!("{e:#}")))?;
    outcome
}

/// Parse a wallet balance string.
pub fn parse_balance(raw: &str) -> Result<f64, PaymentError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|b| b.is_finite())
        .ok_or_else(|| PaymentError::InvalidBalance(raw.to_string()))
}

/// Reject withdrawals that are non-positive or would leave less than
/// `min_balance`. Returns the remaining balance.
pub fn check_withdrawal(balance: f64, amount: f64, min_balance: f64) -> Result<f64, PaymentError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(PaymentError::InvalidAmount(amount));
    }
    let remaining = balance - amount;
    if remaining < min_balance {
        return Err(PaymentError::InsufficientBalance {
            amount,
            remaining,
            min_balance,
        });
    }
    Ok(remaining)
}

/// Check a withdrawal against the wallet's live balance.
pub async fn check_wallet_withdrawal(
    sdk: &dyn WalletSdk,
    amount: f64,
    min_balance: f64,
) -> Result<f64, PaymentError> {
    if sdk.current_user().is_none() {
        return Err(PaymentError::NotAuthenticated);
    }
    let raw = sdk
        .balance()
        .await
        .map_err(|e| PaymentError::Wallet(format!("{e:#}")))?;
    check_withdrawal(parse_balance(&raw)?, amount, min_balance)
}
