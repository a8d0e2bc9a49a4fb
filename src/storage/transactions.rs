use super::traits::KeyValueStore;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

pub const TRANSACTIONS_KEY: &str = "transactions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Approved,
    Completed,
    Cancelled,
    Failed,
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub payment_id: String,
    pub txid: Option<String>,
    pub status: TransactionStatus,
    pub timestamp: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new(payment_id: impl Into<String>, txid: Option<String>, status: TransactionStatus) -> Self {
        Self {
            payment_id: payment_id.into(),
            txid,
            status,
            timestamp: Utc::now(),
        }
    }
}

/// Append-only list of payment records kept under one store key.
///
/// Clones share one write lock, so read-modify-write cycles never interleave.
#[derive(Clone)]
pub struct TransactionLog {
    store: Arc<dyn KeyValueStore>,
    write_lock: Arc<Mutex<()>>,
}

impl TransactionLog {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn list(&self) -> anyhow::Result<Vec<TransactionRecord>> {
        match self.store.get(TRANSACTIONS_KEY).await? {
            None => Ok(Vec::new()),
            Some(value) => {
                serde_json::from_value(value).context("Stored transaction log is malformed")
            }
        }
    }

    pub async fn append(&self, record: TransactionRecord) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.list().await?;
        records.push(record);
        let value = serde_json::to_value(&records).context("Failed to serialize transactions")?;
        self.store.set(TRANSACTIONS_KEY, value).await
    }

    /// Returns how many records were removed.
    pub async fn clear(&self) -> anyhow::Result<usize> {
        let _guard = self.write_lock.lock().await;
        let count = self.list().await?.len();
        self.store.remove(TRANSACTIONS_KEY).await?;
        Ok(count)
    }
}

pub async fn handle_command(
    command: crate::TransactionCommands,
    config: &crate::config::Config,
) -> anyhow::Result<()> {
    let log = TransactionLog::new(super::create_store(&config.storage, &config.workspace_dir));
    match command {
        crate::TransactionCommands::List => {
            let records = log.list().await?;
            if records.is_empty() {
                println!("No transactions recorded yet.");
                return Ok(());
            }
            println!("🧾 Transactions ({}):", records.len());
            for record in records {
                println!(
                    "  {}  {:<10} {}  txid={}",
                    record.timestamp.to_rfc3339(),
                    record.status,
                    record.payment_id,
                    record.txid.as_deref().unwrap_or("-")
                );
            }
        }
        crate::TransactionCommands::Clear => {
            let removed = log.clear().await?;
            println!("✅ Removed {removed} transaction record(s)");
        }
    }
    Ok(())
}
