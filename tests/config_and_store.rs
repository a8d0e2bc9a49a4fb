//! Config files on disk and the file-backed store.

use aiwalls::config::{Config, FlavorSourceConfig};
use aiwalls::storage::{
    FileStore, KeyValueStore, TransactionLog, TransactionRecord, TransactionStatus,
};
use serde_json::json;
use std::sync::Arc;

#[test]
fn first_run_writes_defaults_and_second_run_reads_them_back() {
    let tmp = tempfile::TempDir::new().unwrap();
    let first = Config::load_or_init_in(tmp.path()).unwrap();
    assert!(first.config_path.exists());
    assert!(first.workspace_dir.is_dir());

    let mut edited = first.clone();
    edited.scheduler.speed_factor = 1.0;
    edited.scheduler.seed = Some(99);
    edited.bots[0].source = FlavorSourceConfig::Static {
        lines: vec!["Knock knock.".into()],
    };
    edited.save().unwrap();

    let second = Config::load_or_init_in(tmp.path()).unwrap();
    assert_eq!(second.scheduler.speed_factor, 1.0);
    assert_eq!(second.scheduler.seed, Some(99));
    assert_eq!(second.bots, edited.bots);
    second.validate().unwrap();
}

#[test]
fn env_style_overrides_win_over_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut config = Config::load_or_init_in(tmp.path()).unwrap();
    config.apply_overrides_from(|key| match key {
        "AIWALLS_SPEED_FACTOR" => Some("0.1".into()),
        "AIWALLS_SEED" => Some("5".into()),
        "AIWALLS_PAYMENTS_API_KEY" => Some("from-env".into()),
        _ => None,
    });
    assert_eq!(config.scheduler.speed_factor, 0.1);
    assert_eq!(config.scheduler.seed, Some(5));
    assert_eq!(config.payments.api_key.as_deref(), Some("from-env"));
}

#[tokio::test]
async fn file_store_round_trips_values_across_instances() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("store.json");

    let store = FileStore::new(&path);
    assert_eq!(store.get("missing").await.unwrap(), None);
    store.set("drip.accumulated", json!(0.35)).await.unwrap();
    store.set("other", json!({"a": 1})).await.unwrap();
    assert!(store.remove("other").await.unwrap());
    assert!(!store.remove("other").await.unwrap());

    let reopened = FileStore::new(&path);
    assert_eq!(
        reopened.get("drip.accumulated").await.unwrap(),
        Some(json!(0.35))
    );
    assert_eq!(reopened.get("other").await.unwrap(), None);
}

#[tokio::test]
async fn transaction_log_persists_in_order_and_clears() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(tmp.path().join("store.json")));
    let log = TransactionLog::new(store.clone());

    log.append(TransactionRecord::new("pay_1", None, TransactionStatus::Approved))
        .await
        .unwrap();
    log.append(TransactionRecord::new(
        "pay_1",
        Some("tx_1".into()),
        TransactionStatus::Completed,
    ))
    .await
    .unwrap();

    let reopened = TransactionLog::new(Arc::new(FileStore::new(tmp.path().join("store.json"))));
    let records = reopened.list().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, TransactionStatus::Approved);
    assert_eq!(records[1].txid.as_deref(), Some("tx_1"));

    assert_eq!(reopened.clear().await.unwrap(), 2);
    assert!(log.list().await.unwrap().is_empty());
}
