//! Server-side payment handshake against a mock processor, driven by a
//! scripted wallet.

use aiwalls::config::PaymentsConfig;
use aiwalls::payments::{
    PaymentApiClient, PaymentError, PaymentEvent, PaymentFlow, PaymentSpec, WalletSdk,
    WalletUser, check_wallet_withdrawal, send_payment,
};
use aiwalls::storage::{FileStore, KeyValueStore, MemoryStore, TransactionLog, TransactionStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "test-server-key";

/// Wallet that replays a fixed list of callbacks for every payment.
struct ScriptedWallet {
    user: Mutex<Option<WalletUser>>,
    script: Vec<PaymentEvent>,
}

impl ScriptedWallet {
    fn new(script: Vec<PaymentEvent>) -> Self {
        Self {
            user: Mutex::new(None),
            script,
        }
    }
}

#[async_trait]
impl WalletSdk for ScriptedWallet {
    async fn authenticate(&self, _scopes: &[&str]) -> anyhow::Result<WalletUser> {
        let user = WalletUser {
            uid: "uid-1".into(),
            username: "walker".into(),
        };
        *self.user.lock() = Some(user.clone());
        Ok(user)
    }

    fn current_user(&self) -> Option<WalletUser> {
        self.user.lock().clone()
    }

    async fn balance(&self) -> anyhow::Result<String> {
        Ok("25.0".into())
    }

    async fn create_payment(
        &self,
        _spec: PaymentSpec,
        events: mpsc::Sender<PaymentEvent>,
    ) -> anyhow::Result<()> {
        for event in self.script.clone() {
            events.send(event).await?;
        }
        Ok(())
    }
}

fn spec(amount: f64) -> PaymentSpec {
    PaymentSpec {
        amount,
        memo: "Wall reward".into(),
        metadata: json!({"wall": "Pi"}),
        to_address: None,
    }
}

fn happy_script() -> Vec<PaymentEvent> {
    vec![
        PaymentEvent::ReadyForServerApproval {
            payment_id: "pay_1".into(),
        },
        PaymentEvent::ReadyForServerCompletion {
            payment_id: "pay_1".into(),
            txid: Some("tx_abc".into()),
        },
    ]
}

async fn processor() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/payments/pay_1/approve"))
        .and(header("Authorization", format!("Key {API_KEY}").as_str()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": {"developer_approved": true}})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/payments/pay_1/complete"))
        .and(header("Authorization", format!("Key {API_KEY}").as_str()))
        .and(body_json(json!({"txid": "tx_abc"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": {"developer_completed": true}})),
        )
        .expect(1)
        .mount(&server)
        .await;
    server
}

fn api(server: &MockServer) -> PaymentApiClient {
    PaymentApiClient::new(server.uri(), API_KEY, Duration::from_secs(5))
}

#[tokio::test]
async fn approve_then_complete_records_transaction() {
    let server = processor().await;
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let log = TransactionLog::new(store);
    let flow = PaymentFlow::new(api(&server)).with_log(log.clone());

    let wallet = ScriptedWallet::new(happy_script());
    wallet.authenticate(&["payments"]).await.unwrap();

    let outcome = send_payment(&wallet, spec(1.5), &flow).await.unwrap();
    assert_eq!(outcome.payment_id, "pay_1");
    assert_eq!(outcome.txid, "tx_abc");

    let records = log.list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, TransactionStatus::Completed);
    assert_eq!(records[0].txid.as_deref(), Some("tx_abc"));
}

#[tokio::test]
async fn completed_record_survives_reopening_the_file_store() {
    let server = processor().await;
    let tmp = tempfile::TempDir::new().unwrap();
    let file = tmp.path().join("store.json");

    {
        let flow = PaymentFlow::new(api(&server))
            .with_log(TransactionLog::new(Arc::new(FileStore::new(&file))));
        let wallet = ScriptedWallet::new(happy_script());
        wallet.authenticate(&["payments"]).await.unwrap();
        send_payment(&wallet, spec(2.0), &flow).await.unwrap();
    }

    let reopened = TransactionLog::new(Arc::new(FileStore::new(&file)));
    let records = reopened.list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].payment_id, "pay_1");
}

#[tokio::test]
async fn unauthenticated_wallet_is_rejected_before_any_call() {
    let server = MockServer::start().await;
    let flow = PaymentFlow::new(api(&server));
    let wallet = ScriptedWallet::new(happy_script());

    let err = send_payment(&wallet, spec(1.0), &flow).await.unwrap_err();
    assert!(matches!(err, PaymentError::NotAuthenticated));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn non_positive_amount_is_rejected() {
    let server = MockServer::start().await;
    let flow = PaymentFlow::new(api(&server));
    let wallet = ScriptedWallet::new(happy_script());
    wallet.authenticate(&["payments"]).await.unwrap();

    for amount in [0.0, -1.0, f64::NAN] {
        let err = send_payment(&wallet, spec(amount), &flow).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidAmount(_)));
    }
}

#[tokio::test]
async fn completion_without_txid_never_calls_complete() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/payments/pay_2/approve"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/payments/pay_2/complete"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let wallet = ScriptedWallet::new(vec![
        PaymentEvent::ReadyForServerApproval {
            payment_id: "pay_2".into(),
        },
        PaymentEvent::ReadyForServerCompletion {
            payment_id: "pay_2".into(),
            txid: None,
        },
    ]);
    wallet.authenticate(&["payments"]).await.unwrap();
    let log = TransactionLog::new(Arc::new(MemoryStore::new()));
    let flow = PaymentFlow::new(api(&server)).with_log(log.clone());

    let err = send_payment(&wallet, spec(1.0), &flow).await.unwrap_err();
    assert!(matches!(err, PaymentError::MissingTxid(id) if id == "pay_2"));

    let records = log.list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].payment_id, "pay_2");
    assert_eq!(records[0].status, TransactionStatus::Failed);
    assert_eq!(records[0].txid, None);
}

#[tokio::test]
async fn unconfirmed_approval_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/payments/pay_3/approve"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": {"developer_approved": false}})),
        )
        .mount(&server)
        .await;

    let client = api(&server);
    assert!(matches!(
        client.approve("pay_3").await,
        Err(PaymentError::NotConfirmed { step: "approve", .. })
    ));
}

#[tokio::test]
async fn processor_rejection_carries_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/payments/pay_4/approve"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    match api(&server).approve("pay_4").await {
        Err(PaymentError::Rejected { status, .. }) => assert_eq!(status, 401),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn cancelled_payment_is_logged_and_returned() {
    let server = MockServer::start().await;
    let log = TransactionLog::new(Arc::new(MemoryStore::new()));
    let flow = PaymentFlow::new(api(&server)).with_log(log.clone());
    let wallet = ScriptedWallet::new(vec![
        PaymentEvent::IncompleteFound {
            payment_id: "old".into(),
            txid: None,
        },
        PaymentEvent::Cancelled {
            payment_id: "pay_5".into(),
        },
    ]);
    wallet.authenticate(&["payments"]).await.unwrap();

    let err = send_payment(&wallet, spec(1.0), &flow).await.unwrap_err();
    assert!(matches!(err, PaymentError::Cancelled(id) if id == "pay_5"));
    let records = log.list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, TransactionStatus::Cancelled);
}

#[tokio::test]
async fn wallet_going_quiet_ends_the_flow() {
    let server = MockServer::start().await;
    let flow = PaymentFlow::new(api(&server));
    let wallet = ScriptedWallet::new(Vec::new());
    wallet.authenticate(&["payments"]).await.unwrap();

    let err = send_payment(&wallet, spec(1.0), &flow).await.unwrap_err();
    assert!(matches!(err, PaymentError::StreamClosed));
}

#[tokio::test]
async fn withdrawal_checks_live_balance_against_minimum() {
    let wallet = ScriptedWallet::new(Vec::new());
    let min_balance = PaymentsConfig::default().min_balance;
    assert!(matches!(
        check_wallet_withdrawal(&wallet, 5.0, min_balance).await,
        Err(PaymentError::NotAuthenticated)
    ));

    wallet.authenticate(&["payments"]).await.unwrap();
    assert_eq!(
        check_wallet_withdrawal(&wallet, 5.0, min_balance)
            .await
            .unwrap(),
        20.0
    );
    assert!(matches!(
        check_wallet_withdrawal(&wallet, 24.5, min_balance).await,
        Err(PaymentError::InsufficientBalance { .. })
    ));
}
