//! End-to-end money-movement scenarios against a live Postgres.
//!
//! Run with a disposable database:
//!   DATABASE_URL=postgres://localhost/seller_ledger_test \
//!     cargo test --test ledger_flow -- --ignored

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use seller_ledger::error::{AppError, LedgerError, PayoutError};
use seller_ledger::ledger::{LedgerRepository, TransactionStatus, TransactionType};
use seller_ledger::payouts::bank_details::{BankDetails, BankDetailsCipher};
use seller_ledger::payouts::executor::PayoutExecutor;
use seller_ledger::payouts::scheduler::PayoutScheduler;
use seller_ledger::payouts::{
    PayoutMethod, PayoutProvider, PayoutRepository, PayoutSchedule, PayoutStatus, SettingsUpdate,
};
use seller_ledger::providers::CardNetworkClient;
use seller_ledger::reconciliation::ReconciliationService;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

struct Harness {
    ledger: Arc<LedgerRepository>,
    payouts: Arc<PayoutRepository>,
    executor: Arc<PayoutExecutor>,
    scheduler: Arc<PayoutScheduler>,
    reconciliation: Arc<ReconciliationService>,
    cipher: Arc<BankDetailsCipher>,
    pool: PgPool,
}

async fn harness() -> Harness {
    // provider endpoint that nothing should reach
    harness_with_provider("http://localhost:1").await
}

async fn harness_with_provider(provider_url: &str) -> Harness {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");
    let pool = PgPool::connect(&url).await.expect("connect");
    sqlx::migrate!("./migrations").run(&pool).await.expect("migrate");

    let ledger = Arc::new(LedgerRepository::new(pool.clone(), "USD"));
    let payouts = Arc::new(PayoutRepository::new(pool.clone()));
    let cipher = Arc::new(
        BankDetailsCipher::from_base64_key(
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=",
        )
        .expect("cipher"),
    );
    let card_network =
        Arc::new(CardNetworkClient::new(provider_url, "test-key", 1).expect("client"));

    let executor = Arc::new(PayoutExecutor::new(
        ledger.clone(),
        payouts.clone(),
        card_network.clone(),
        cipher.clone(),
    ));
    let scheduler = Arc::new(PayoutScheduler::new(
        payouts.clone(),
        executor.clone(),
        std::time::Duration::from_secs(10),
    ));
    let reconciliation = Arc::new(ReconciliationService::new(
        ledger.clone(),
        card_network,
        dec!(5.0),
        dec!(2.9),
        7,
    ));

    Harness {
        ledger,
        payouts,
        executor,
        scheduler,
        reconciliation,
        cipher,
        pool,
    }
}

async fn mature_all_holds(h: &Harness, store_id: Uuid) {
    sqlx::query(
        "UPDATE balance_transactions SET available_at = NOW() - INTERVAL '1 hour' \
         WHERE store_id = $1 AND status = 'pending'",
    )
    .bind(store_id)
    .execute(&h.pool)
    .await
    .expect("backdate holds");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn capture_hold_promote_lifecycle() {
    let h = harness().await;
    let store_id = Uuid::new_v4();
    let order_id = Uuid::new_v4();

    h.reconciliation
        .on_payment_captured(order_id, store_id, dec!(100.00), "USD", "card_network")
        .await
        .expect("capture");

    // payment is held; both fees hit the available balance immediately
    let balance = h.ledger.get_balance(store_id).await.expect("balance");
    assert_eq!(balance.pending_balance, dec!(100.00));
    assert_eq!(balance.available_balance, dec!(-7.90));

    // duplicate webhook delivery is a silent no-op
    h.reconciliation
        .on_payment_captured(order_id, store_id, dec!(100.00), "USD", "card_network")
        .await
        .expect("redelivery");
    let balance = h.ledger.get_balance(store_id).await.expect("balance");
    assert_eq!(balance.pending_balance, dec!(100.00));

    mature_all_holds(&h, store_id).await;
    let summary = h
        .ledger
        .promote_matured_holds(chrono::Utc::now())
        .await
        .expect("promotion");
    assert!(summary.promoted >= 1);
    assert!(summary.errors.is_empty());

    let balance = h.ledger.get_balance(store_id).await.expect("balance");
    assert_eq!(balance.pending_balance, Decimal::ZERO);
    assert_eq!(balance.available_balance, dec!(92.10));

    // a second promotion pass finds nothing to do for this store
    let feed = h
        .ledger
        .get_activity_feed(store_id, 1, 10)
        .await
        .expect("feed");
    assert_eq!(feed.len(), 3);
    assert_eq!(feed[0].running_balance, dec!(92.10));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn refund_reverses_fees_proportionally_and_guards_over_refund() {
    let h = harness().await;
    let store_id = Uuid::new_v4();
    let order_id = Uuid::new_v4();

    h.reconciliation
        .on_payment_captured(order_id, store_id, dec!(100.00), "USD", "card_network")
        .await
        .expect("capture");

    h.reconciliation
        .on_refund(order_id, store_id, dec!(50.00), "USD")
        .await
        .expect("refund");

    // -7.90 fees, -50.00 refund, +2.50 fee reversal
    let balance = h.ledger.get_balance(store_id).await.expect("balance");
    assert_eq!(balance.available_balance, dec!(-55.40));
    assert_eq!(balance.pending_balance, dec!(100.00));

    // only 50.00 of the original payment remains refundable
    let err = h
        .reconciliation
        .on_refund(order_id, store_id, dec!(60.00), "USD")
        .await
        .expect_err("over-refund must fail");
    assert!(matches!(
        err,
        AppError::Ledger(LedgerError::OverRefund { .. })
    ));

    // cancellation of a partially refunded order refunds the remainder
    h.reconciliation
        .on_cancellation(order_id, store_id)
        .await
        .expect("cancellation");
    let refunded = h.ledger.refunded_total(order_id).await.expect("refunded");
    assert_eq!(refunded, dec!(100.00));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn completed_payout_debits_once_and_sweeps_available_rows() {
    let h = harness().await;
    let store_id = Uuid::new_v4();

    // seed an immediately-available credit
    h.ledger
        .post_transaction(store_id, TransactionType::Adjustment, dec!(80.00), "USD", 0, None)
        .await
        .expect("seed");

    let payout = h
        .payouts
        .create_payout(store_id, dec!(80.00), "USD", PayoutProvider::RegionalWallet, PayoutStatus::Pending)
        .await
        .expect("create");
    h.payouts
        .transition(payout.id, PayoutStatus::Pending, PayoutStatus::Processing)
        .await
        .expect("processing");

    let completed = h.executor.mark_completed(payout.id).await.expect("complete");
    assert_eq!(completed.status, PayoutStatus::Completed);
    assert!(completed.completed_at.is_some());

    let balance = h.ledger.get_balance(store_id).await.expect("balance");
    assert_eq!(balance.available_balance, Decimal::ZERO);

    // the drained ledger rows are swept out of the available set
    let open_rows: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM balance_transactions WHERE store_id = $1 AND status = 'available'",
    )
    .bind(store_id)
    .fetch_one(&h.pool)
    .await
    .expect("count");
    assert_eq!(open_rows, 0);

    let swept: Decimal = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM balance_transactions \
         WHERE store_id = $1 AND status = 'paid_out'",
    )
    .bind(store_id)
    .fetch_one(&h.pool)
    .await
    .expect("sum");
    assert_eq!(swept, Decimal::ZERO);

    // confirming twice never debits twice
    let err = h
        .executor
        .mark_completed(payout.id)
        .await
        .expect_err("second completion must fail");
    assert!(matches!(
        err,
        AppError::Payout(PayoutError::AlreadyCompleted(_))
    ));
    let balance = h.ledger.get_balance(store_id).await.expect("balance");
    assert_eq!(balance.available_balance, Decimal::ZERO);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn scheduled_pass_pays_out_eligible_regional_wallet_store() {
    let h = harness().await;
    let store_id = Uuid::new_v4();
    let now = chrono::Utc::now();

    h.ledger
        .post_transaction(store_id, TransactionType::Adjustment, dec!(95.00), "USD", 0, None)
        .await
        .expect("seed");

    let envelope = h
        .cipher
        .encrypt(&BankDetails {
            account_name: "Acme Goods LLC".to_string(),
            account_number: "0011223344".to_string(),
            routing_code: "WLT-559".to_string(),
            bank_name: None,
        })
        .expect("encrypt");

    h.payouts
        .upsert_settings(
            store_id,
            SettingsUpdate {
                method: PayoutMethod::Automatic,
                schedule: Some(PayoutSchedule::Weekly),
                payout_day_of_week: Some(5),
                payout_day_of_month: None,
                minimum_amount: dec!(50.00),
                next_payout_at: Some(now - chrono::Duration::hours(1)),
                provider: PayoutProvider::RegionalWallet,
                payouts_enabled: true,
                bank_details_encrypted: Some(envelope),
            },
        )
        .await
        .expect("settings");

    let summary = h
        .scheduler
        .run_scheduled_payout_pass(now)
        .await
        .expect("pass");
    assert_eq!(summary.processed, 1);
    assert!(summary.errors.is_empty());

    // regional wallet stays processing until an operator confirms; the
    // ledger has not been debited yet
    let payouts = h.payouts.list_payouts(store_id, 10).await.expect("list");
    assert_eq!(payouts.len(), 1);
    assert_eq!(payouts[0].status, PayoutStatus::Processing);
    assert_eq!(payouts[0].amount, dec!(95.00));

    let balance = h.ledger.get_balance(store_id).await.expect("balance");
    assert_eq!(balance.available_balance, dec!(95.00));

    // the schedule advanced, so the store is not picked up again
    let settings = h
        .payouts
        .get_settings(store_id)
        .await
        .expect("settings")
        .expect("row");
    assert!(settings.next_payout_at.expect("next") > now);

    let summary = h
        .scheduler
        .run_scheduled_payout_pass(now)
        .await
        .expect("second pass");
    assert_eq!(summary.processed, 0);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn partial_payout_keeps_remaining_rows_available() {
    let h = harness().await;
    let store_id = Uuid::new_v4();

    h.ledger
        .post_transaction(store_id, TransactionType::Adjustment, dec!(100.00), "USD", 0, None)
        .await
        .expect("seed");

    let payout = h
        .payouts
        .create_payout(store_id, dec!(40.00), "USD", PayoutProvider::RegionalWallet, PayoutStatus::Pending)
        .await
        .expect("create");
    h.payouts
        .transition(payout.id, PayoutStatus::Pending, PayoutStatus::Processing)
        .await
        .expect("processing");
    h.executor.mark_completed(payout.id).await.expect("complete");

    let balance = h.ledger.get_balance(store_id).await.expect("balance");
    assert_eq!(balance.available_balance, dec!(60.00));

    // partial payout leaves rows available, still summing to the balance
    let available_sum: Decimal = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM balance_transactions \
         WHERE store_id = $1 AND status = 'available'",
    )
    .bind(store_id)
    .fetch_one(&h.pool)
    .await
    .expect("sum");
    assert_eq!(available_sum, dec!(60.00));

    let feed = h
        .ledger
        .get_activity_feed(store_id, 1, 10)
        .await
        .expect("feed");
    assert_eq!(feed[0].transaction.tx_type, TransactionType::Payout);
    assert_eq!(feed[0].transaction.status, TransactionStatus::Available);
    assert_eq!(feed[0].running_balance, dec!(60.00));
    assert_eq!(feed[1].running_balance, dec!(100.00));
}

/// Minimal card-network stand-in: answers every request on a loopback
/// port with the given status line and JSON body.
async fn stub_provider(status: &'static str, body: &'static str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        request.extend_from_slice(&chunk[..n]);
                        if request_complete(&request) {
                            break;
                        }
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    format!("http://{addr}")
}

fn request_complete(data: &[u8]) -> bool {
    let Some(header_end) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let headers = String::from_utf8_lossy(&data[..header_end]).to_lowercase();
    let body_len = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    data.len() >= header_end + 4 + body_len
}

async fn automatic_card_settings(h: &Harness, store_id: Uuid, now: chrono::DateTime<chrono::Utc>) {
    let envelope = h
        .cipher
        .encrypt(&BankDetails {
            account_name: "Acme Goods LLC".to_string(),
            account_number: "0011223344".to_string(),
            routing_code: "021000021".to_string(),
            bank_name: Some("First Meridian".to_string()),
        })
        .expect("encrypt");

    h.payouts
        .upsert_settings(
            store_id,
            SettingsUpdate {
                method: PayoutMethod::Automatic,
                schedule: Some(PayoutSchedule::Weekly),
                payout_day_of_week: Some(5),
                payout_day_of_month: None,
                minimum_amount: dec!(50.00),
                next_payout_at: Some(now - chrono::Duration::hours(1)),
                provider: PayoutProvider::CardNetwork,
                payouts_enabled: true,
                bank_details_encrypted: Some(envelope),
            },
        )
        .await
        .expect("settings");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_refund_deliveries_post_only_once() {
    let h = harness().await;
    let store_id = Uuid::new_v4();
    let order_id = Uuid::new_v4();

    h.reconciliation
        .on_payment_captured(order_id, store_id, dec!(100.00), "USD", "card_network")
        .await
        .expect("capture");

    // two full-amount refund deliveries racing for the same order
    let (first, second) = tokio::join!(
        h.reconciliation.on_refund(order_id, store_id, dec!(100.00), "USD"),
        h.reconciliation.on_refund(order_id, store_id, dec!(100.00), "USD"),
    );

    let failures: Vec<_> = [first, second]
        .into_iter()
        .filter_map(Result::err)
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        failures[0],
        AppError::Ledger(LedgerError::OverRefund { .. })
    ));

    let refunded = h.ledger.refunded_total(order_id).await.expect("refunded");
    assert_eq!(refunded, dec!(100.00));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn completing_payouts_beyond_the_balance_fails() {
    let h = harness().await;
    let store_id = Uuid::new_v4();

    h.ledger
        .post_transaction(store_id, TransactionType::Adjustment, dec!(80.00), "USD", 0, None)
        .await
        .expect("seed");

    // two payouts were each allowed into processing while the balance
    // could still cover them individually
    let mut payouts = Vec::new();
    for _ in 0..2 {
        let payout = h
            .payouts
            .create_payout(store_id, dec!(80.00), "USD", PayoutProvider::RegionalWallet, PayoutStatus::Pending)
            .await
            .expect("create");
        h.payouts
            .transition(payout.id, PayoutStatus::Pending, PayoutStatus::Processing)
            .await
            .expect("processing");
        payouts.push(payout);
    }

    h.executor.mark_completed(payouts[0].id).await.expect("first completion");

    let err = h
        .executor
        .mark_completed(payouts[1].id)
        .await
        .expect_err("second completion would overdraw");
    assert!(matches!(
        err,
        AppError::Payout(PayoutError::InsufficientBalance { .. })
    ));

    // the failed completion left nothing behind: balance untouched,
    // payout still awaiting confirmation
    let balance = h.ledger.get_balance(store_id).await.expect("balance");
    assert_eq!(balance.available_balance, Decimal::ZERO);
    let remaining = h
        .payouts
        .get_payout(payouts[1].id)
        .await
        .expect("get")
        .expect("row");
    assert_eq!(remaining.status, PayoutStatus::Processing);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn missing_bank_details_leaves_no_payout_rows() {
    let h = harness().await;
    let store_id = Uuid::new_v4();
    let now = chrono::Utc::now();

    h.ledger
        .post_transaction(store_id, TransactionType::Adjustment, dec!(95.00), "USD", 0, None)
        .await
        .expect("seed");

    h.payouts
        .upsert_settings(
            store_id,
            SettingsUpdate {
                method: PayoutMethod::Automatic,
                schedule: Some(PayoutSchedule::Weekly),
                payout_day_of_week: Some(5),
                payout_day_of_month: None,
                minimum_amount: dec!(50.00),
                next_payout_at: Some(now - chrono::Duration::hours(1)),
                provider: PayoutProvider::RegionalWallet,
                payouts_enabled: true,
                bank_details_encrypted: None,
            },
        )
        .await
        .expect("settings");

    let err = h
        .executor
        .execute(store_id, dec!(95.00), "USD")
        .await
        .expect_err("no bank details on file");
    assert!(matches!(
        err,
        AppError::Payout(PayoutError::MissingBankDetails(_))
    ));

    // the rejection happened before any payout row was written
    let payouts = h.payouts.list_payouts(store_id, 10).await.expect("list");
    assert!(payouts.is_empty());

    // a scheduled pass counts the store as skipped, not errored
    let summary = h
        .scheduler
        .run_scheduled_payout_pass(now)
        .await
        .expect("pass");
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.skipped, 1);
    assert!(summary.errors.is_empty());
    let payouts = h.payouts.list_payouts(store_id, 10).await.expect("list");
    assert!(payouts.is_empty());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn card_network_confirmation_settles_in_one_pass() {
    let url = stub_provider("200 OK", r#"{"id":"tr_settle_1","status":"completed"}"#).await;
    let h = harness_with_provider(&url).await;
    let store_id = Uuid::new_v4();
    let now = chrono::Utc::now();

    h.ledger
        .post_transaction(store_id, TransactionType::Adjustment, dec!(95.00), "USD", 0, None)
        .await
        .expect("seed");
    automatic_card_settings(&h, store_id, now).await;

    let summary = h
        .scheduler
        .run_scheduled_payout_pass(now)
        .await
        .expect("pass");
    assert_eq!(summary.processed, 1);
    assert!(summary.errors.is_empty());

    let payouts = h.payouts.list_payouts(store_id, 10).await.expect("list");
    assert_eq!(payouts.len(), 1);
    assert_eq!(payouts[0].status, PayoutStatus::Completed);
    assert_eq!(payouts[0].provider_payout_id.as_deref(), Some("tr_settle_1"));
    assert!(payouts[0].completed_at.is_some());

    // the transfer confirmation and the ledger debit land together
    let balance = h.ledger.get_balance(store_id).await.expect("balance");
    assert_eq!(balance.available_balance, Decimal::ZERO);

    let settings = h
        .payouts
        .get_settings(store_id)
        .await
        .expect("settings")
        .expect("row");
    assert!(settings.next_payout_at.expect("next") > now);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn rejected_transfer_fails_the_payout_without_debiting() {
    let url = stub_provider(
        "200 OK",
        r#"{"id":"tr_rej_1","status":"rejected","error_code":"account_frozen","error_message":"destination account frozen"}"#,
    )
    .await;
    let h = harness_with_provider(&url).await;
    let store_id = Uuid::new_v4();
    let now = chrono::Utc::now();

    h.ledger
        .post_transaction(store_id, TransactionType::Adjustment, dec!(95.00), "USD", 0, None)
        .await
        .expect("seed");
    automatic_card_settings(&h, store_id, now).await;

    // a provider rejection is an error for the pass, not a skip
    let summary = h
        .scheduler
        .run_scheduled_payout_pass(now)
        .await
        .expect("pass");
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.errors.len(), 1);

    let payouts = h.payouts.list_payouts(store_id, 10).await.expect("list");
    assert_eq!(payouts.len(), 1);
    assert_eq!(payouts[0].status, PayoutStatus::Failed);
    let reason = payouts[0].failure_reason.as_deref().expect("reason");
    assert!(reason.contains("account_frozen"));

    // nothing left the ledger
    let balance = h.ledger.get_balance(store_id).await.expect("balance");
    assert_eq!(balance.available_balance, dec!(95.00));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn ambiguous_transfer_outcome_stays_processing() {
    let url = stub_provider("503 Service Unavailable", r#"{"error":"maintenance"}"#).await;
    let h = harness_with_provider(&url).await;
    let store_id = Uuid::new_v4();
    let now = chrono::Utc::now();

    h.ledger
        .post_transaction(store_id, TransactionType::Adjustment, dec!(95.00), "USD", 0, None)
        .await
        .expect("seed");
    automatic_card_settings(&h, store_id, now).await;

    // the transfer may or may not have gone through on the provider
    // side, so the payout is parked rather than failed
    let payout = h
        .executor
        .execute(store_id, dec!(95.00), "USD")
        .await
        .expect("execute");
    assert_eq!(payout.status, PayoutStatus::Processing);

    let balance = h.ledger.get_balance(store_id).await.expect("balance");
    assert_eq!(balance.available_balance, dec!(95.00));

    // once reconciled against the provider, completion settles normally
    let completed = h.executor.mark_completed(payout.id).await.expect("complete");
    assert_eq!(completed.status, PayoutStatus::Completed);
    let balance = h.ledger.get_balance(store_id).await.expect("balance");
    assert_eq!(balance.available_balance, Decimal::ZERO);
}
