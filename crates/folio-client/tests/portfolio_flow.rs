//! Portfolio aggregation and background-watcher flows over the in-memory
//! ledger.

use std::sync::Arc;
use std::time::Duration;

use folio_client::memory::MemoryLedger;
use folio_client::{ClientConfig, FolioClient};
use folio_core::{Address, Amount};

fn addr(s: &str) -> Address {
    Address::new(s).unwrap()
}

fn client(ledger: &Arc<MemoryLedger>) -> FolioClient {
    let mut config = ClientConfig::with_ledger_address(ledger.ledger_address().to_string());
    config.confirmation_poll_ms = 100;
    config.read_retry_delay_ms = 1;
    config.poll_interval_secs = 3;
    FolioClient::new(ledger.clone(), &config).unwrap()
}

#[tokio::test]
async fn portfolio_sums_and_weights_across_notes() {
    let ledger = Arc::new(MemoryLedger::new());
    let owner = addr("0xowner");
    let first = ledger.seed_note(&owner, Amount::from_units(100), 500).await;
    ledger.seed_note(&owner, Amount::from_units(300), 1_000).await;
    ledger.accrue_interest(first, Amount::from_units(2)).await;

    let snapshot = client(&ledger).portfolio(&owner).await.unwrap();
    assert_eq!(snapshot.open_notes, 2);
    assert_eq!(snapshot.repaid_notes, 0);
    assert_eq!(snapshot.total_principal, Amount::from_units(400));
    assert_eq!(snapshot.outstanding_value, Amount::from_units(402));
    // (100 * 500 + 300 * 1000) / 400
    assert_eq!(snapshot.weighted_apr_bps, 875);
}

#[tokio::test]
async fn portfolio_skips_detached_notes() {
    let ledger = Arc::new(MemoryLedger::new());
    let owner = addr("0xowner");
    let first = ledger.seed_note(&owner, Amount::from_units(100), 500).await;
    ledger.seed_note(&owner, Amount::from_units(40), 750).await;
    ledger.detach_note(first).await;

    let snapshot = client(&ledger).portfolio(&owner).await.unwrap();
    assert_eq!(snapshot.open_notes, 1);
    assert_eq!(snapshot.total_principal, Amount::from_units(40));
}

#[tokio::test(start_paused = true)]
async fn deposit_shows_up_in_portfolio() {
    let ledger = Arc::new(MemoryLedger::new());
    let owner = addr("0xowner");
    let tranche = ledger.seed_tranche(Amount::from_units(1_000)).await;
    let client = client(&ledger);

    client
        .deposit(owner.clone(), tranche, Amount::from_units(100))
        .await
        .unwrap();

    let snapshot = client.portfolio(&owner).await.unwrap();
    assert_eq!(snapshot.open_notes, 1);
    assert_eq!(snapshot.total_principal, Amount::from_units(100));
    assert_eq!(snapshot.outstanding_value, Amount::from_units(100));
}

#[tokio::test(start_paused = true)]
async fn full_repayment_settles_note_in_portfolio() {
    let ledger = Arc::new(MemoryLedger::new());
    let owner = addr("0xowner");
    let note = ledger.seed_note(&owner, Amount::from_units(100), 500).await;
    ledger.accrue_interest(note, Amount::from_units(5)).await;
    let client = client(&ledger);

    client
        .repay(owner.clone(), note, Amount::from_units(105))
        .await
        .unwrap();

    let snapshot = client.portfolio(&owner).await.unwrap();
    assert_eq!(snapshot.open_notes, 0);
    assert_eq!(snapshot.repaid_notes, 1);
    assert_eq!(snapshot.outstanding_value, Amount::ZERO);
    assert_eq!(snapshot.total_interest_paid, Amount::from_units(5));
    assert_eq!(snapshot.total_principal_repaid, Amount::from_units(100));
}

#[tokio::test(start_paused = true)]
async fn watcher_refreshes_after_confirmed_action() {
    let ledger = Arc::new(MemoryLedger::new());
    let owner = addr("0xowner");
    let tranche = ledger.seed_tranche(Amount::from_units(1_000)).await;
    let client = client(&ledger);

    let watcher = client.watch_portfolio(owner.clone());
    let mut rx = watcher.subscribe();
    // Let the initial (empty) refresh settle.
    tokio::time::sleep(Duration::from_millis(10)).await;

    client
        .deposit(owner, tranche, Amount::from_units(100))
        .await
        .unwrap();

    // The invalidation-driven refresh lands well before the 3s tick.
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow().open_notes, 1);
    assert_eq!(
        rx.borrow().total_principal,
        Amount::from_units(100)
    );
}

#[tokio::test(start_paused = true)]
async fn watcher_interval_catches_external_changes() {
    let ledger = Arc::new(MemoryLedger::new());
    let owner = addr("0xowner");
    let client = client(&ledger);

    let watcher = client.watch_portfolio(owner.clone());
    let mut rx = watcher.subscribe();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // A note appears without any client action (e.g. a transfer in).
    ledger.seed_note(&owner, Amount::from_units(25), 400).await;
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow().open_notes, 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_watcher_stops_refreshes() {
    let ledger = Arc::new(MemoryLedger::new());
    let owner = addr("0xowner");
    let client = client(&ledger);

    let watcher = client.watch_portfolio(owner.clone());
    let mut rx = watcher.subscribe();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let reads_before = ledger.read_count().await;
    drop(watcher);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(rx.changed().await.is_err());
    assert_eq!(ledger.read_count().await, reads_before);
}
