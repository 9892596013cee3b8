mod common;

use anyhow::Result;
use centavo::application::{HistoryQuery, MAX_HISTORY_LIMIT, TransferInput};
use centavo::domain::{TransactionStatus, TransactionType};
use common::{seed_user, test_engine};

#[tokio::test]
async fn test_history_pagination() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let alice = seed_user(&engine, "alice@example.com", 1_000_000).await?;
    let bob = seed_user(&engine, "bob@example.com", 0).await?;

    // Distinct amounts so ordering is observable
    for amount in 1..=25 {
        engine
            .transfer(
                alice,
                TransferInput {
                    to_user: bob,
                    amount_cents: amount,
                },
            )
            .await?;
    }

    let page1 = engine
        .history(
            alice,
            HistoryQuery {
                page: Some(1),
                limit: Some(10),
                ..Default::default()
            },
        )
        .await?;

    assert_eq!(page1.transactions.len(), 10);
    assert_eq!(page1.pagination.page, 1);
    assert_eq!(page1.pagination.limit, 10);
    assert_eq!(page1.pagination.total, 25);
    assert_eq!(page1.pagination.total_pages, 3);

    // Newest first: the 25-cent transfer was recorded last
    assert_eq!(page1.transactions[0].amount_cents, 25);

    let page3 = engine
        .history(
            alice,
            HistoryQuery {
                page: Some(3),
                limit: Some(10),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(page3.transactions.len(), 5);
    assert_eq!(page3.transactions.last().unwrap().amount_cents, 1);

    Ok(())
}

#[tokio::test]
async fn test_history_includes_sent_and_received() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let alice = seed_user(&engine, "alice@example.com", 50_000).await?;
    let bob = seed_user(&engine, "bob@example.com", 50_000).await?;
    let charlie = seed_user(&engine, "charlie@example.com", 50_000).await?;

    engine
        .transfer(
            alice,
            TransferInput {
                to_user: bob,
                amount_cents: 1000,
            },
        )
        .await?;
    engine
        .transfer(
            bob,
            TransferInput {
                to_user: alice,
                amount_cents: 2000,
            },
        )
        .await?;
    engine
        .transfer(
            bob,
            TransferInput {
                to_user: charlie,
                amount_cents: 3000,
            },
        )
        .await?;

    let history = engine.history(alice, HistoryQuery::default()).await?;
    assert_eq!(history.pagination.total, 2);

    let bob_history = engine.history(bob, HistoryQuery::default()).await?;
    assert_eq!(bob_history.pagination.total, 3);

    Ok(())
}

#[tokio::test]
async fn test_history_filters_by_status_and_type() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let alice = seed_user(&engine, "alice@example.com", 100_000).await?;
    let bob = seed_user(&engine, "bob@example.com", 0).await?;

    let first = engine
        .transfer(
            alice,
            TransferInput {
                to_user: bob,
                amount_cents: 1000,
            },
        )
        .await?;
    engine
        .transfer(
            alice,
            TransferInput {
                to_user: bob,
                amount_cents: 2000,
            },
        )
        .await?;
    engine.reverse(first.id, alice).await?;

    let reversals = engine
        .history(
            alice,
            HistoryQuery {
                tx_type: Some(TransactionType::Reversal),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(reversals.pagination.total, 1);
    assert_eq!(
        reversals.transactions[0].tx_type,
        TransactionType::Reversal
    );

    let completed = engine
        .history(
            alice,
            HistoryQuery {
                status: Some(TransactionStatus::Completed),
                ..Default::default()
            },
        )
        .await?;
    // The reversed original is REVERSED now; the second transfer and the
    // reversal row remain COMPLETED
    assert_eq!(completed.pagination.total, 2);

    let reversed = engine
        .history(
            alice,
            HistoryQuery {
                status: Some(TransactionStatus::Reversed),
                tx_type: Some(TransactionType::Transfer),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(reversed.pagination.total, 1);
    assert_eq!(reversed.transactions[0].id, first.id);

    Ok(())
}

#[tokio::test]
async fn test_empty_history() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let alice = seed_user(&engine, "alice@example.com", 0).await?;

    let history = engine.history(alice, HistoryQuery::default()).await?;

    assert!(history.transactions.is_empty());
    assert_eq!(history.pagination.total, 0);
    assert_eq!(history.pagination.total_pages, 0);

    Ok(())
}

#[tokio::test]
async fn test_history_limit_is_capped() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let alice = seed_user(&engine, "alice@example.com", 0).await?;

    let history = engine
        .history(
            alice,
            HistoryQuery {
                limit: Some(10_000),
                ..Default::default()
            },
        )
        .await?;

    assert_eq!(history.pagination.limit, MAX_HISTORY_LIMIT);

    Ok(())
}

#[tokio::test]
async fn test_history_page_past_the_end_is_empty() -> Result<()> {
    let (engine, _temp) = test_engine().await?;
    let alice = seed_user(&engine, "alice@example.com", 10_000).await?;
    let bob = seed_user(&engine, "bob@example.com", 0).await?;

    engine
        .transfer(
            alice,
            TransferInput {
                to_user: bob,
                amount_cents: 1000,
            },
        )
        .await?;

    let history = engine
        .history(
            alice,
            HistoryQuery {
                page: Some(5),
                limit: Some(10),
                ..Default::default()
            },
        )
        .await?;

    assert!(history.transactions.is_empty());
    assert_eq!(history.pagination.total, 1);
    assert_eq!(history.pagination.total_pages, 1);

    Ok(())
}
