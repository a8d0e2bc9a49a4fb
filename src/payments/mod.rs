//! Thin wrapper around an external wallet SDK and the payment processor's
//! server API.

pub mod client;
pub mod wallet;

pub use client::{PaymentApiClient, PaymentError};
pub use wallet::{
    DEFAULT_SCOPES, PaymentEvent, PaymentFlow, PaymentOutcome, PaymentSpec, WalletSdk,
    WalletUser, check_wallet_withdrawal, check_withdrawal, parse_balance, send_payment,
};

use crate::config::Config;
use crate::storage::{TransactionLog, TransactionRecord, TransactionStatus, create_store};

pub async fn handle_command(command: crate::PaymentCommands, config: &Config) -> anyhow::Result<()> {
    let api = PaymentApiClient::from_config(&config.payments)?;
    let log = TransactionLog::new(create_store(&config.storage, &config.workspace_dir));
    match command {
        crate::PaymentCommands::Approve { payment_id } => {
            api.approve(&payment_id).await?;
            log.append(TransactionRecord::new(
                &payment_id,
                None,
                TransactionStatus::Approved,
            ))
            .await?;
            println!("✅ Approved payment {payment_id}");
        }
        crate::PaymentCommands::Complete { payment_id, txid } => {
            api.complete(&payment_id, &txid).await?;
            log.append(TransactionRecord::new(
                &payment_id,
                Some(txid.clone()),
                TransactionStatus::Completed,
            ))
            .await?;
            println!("✅ Completed payment {payment_id} (txid {txid})");
        }
    }
    Ok(())
}
