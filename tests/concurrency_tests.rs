mod common;

use common::*;
use escrow_ledger::domain::money::Balance;
use escrow_ledger::domain::order::{OrderStatus, PaymentMethod};
use escrow_ledger::domain::topup::ReviewDecision;
use escrow_ledger::error::ErrorKind;
use rust_decimal_macros::dec;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_debits_never_overdraw() {
    let engine = market();
    fund(&engine, "alice", dec!(100.00)).await;
    let alice = engine.ledger().wallet_for("alice").await.unwrap();
    let bob = engine.ledger().wallet_for("bob").await.unwrap();
    let carol = engine.ledger().wallet_for("carol").await.unwrap();
    let source = alice.id;

    let handles: Vec<_> = [bob.id, carol.id]
        .into_iter()
        .map(|target| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .ledger()
                    .transfer(source, target, dec!(60.00), None, "race")
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::InsufficientFunds),
        }
    }
    assert_eq!(succeeded, 1);
    assert_eq!(balance(&engine, "alice").await, Balance::new(dec!(40.00)));
    assert_ledgers_consistent(&engine).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_transfers_do_not_deadlock() {
    let engine = market();
    fund(&engine, "alice", dec!(500.00)).await;
    fund(&engine, "bob", dec!(500.00)).await;
    let alice = engine.ledger().wallet_for("alice").await.unwrap().id;
    let bob = engine.ledger().wallet_for("bob").await.unwrap().id;

    let mut handles = Vec::new();
    for i in 0..200 {
        let engine = engine.clone();
        let (from, to) = if i % 2 == 0 { (alice, bob) } else { (bob, alice) };
        handles.push(tokio::spawn(async move {
            engine
                .ledger()
                .transfer(from, to, dec!(1.25), None, "ping-pong")
                .await
        }));
    }
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("transfers deadlocked")
            .unwrap()
            .unwrap();
    }

    // equal traffic both ways
    assert_eq!(balance(&engine, "alice").await, Balance::new(dec!(500.00)));
    assert_eq!(balance(&engine, "bob").await, Balance::new(dec!(500.00)));
    assert_ledgers_consistent(&engine).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reviews_credit_once() {
    let engine = market();
    let request = engine
        .topups()
        .submit("alice", dec!(25.00), None)
        .await
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .topups()
                    .review(request.id, ReviewDecision::Approve, ADMIN)
                    .await
            })
        })
        .collect();

    let mut approved = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => approved += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::InvalidState),
        }
    }
    assert_eq!(approved, 1);
    assert_eq!(balance(&engine, "alice").await, Balance::new(dec!(25.00)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_house_one_buyer() {
    let engine = market();
    for buyer in ["alice", "bob", "carol"] {
        fund(&engine, buyer, dec!(150.00)).await;
    }

    let handles: Vec<_> = ["alice", "bob", "carol"]
        .into_iter()
        .map(|buyer| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .orders()
                    .create_order(HOUSE_150, buyer, PaymentMethod::Full, None)
                    .await
            })
        })
        .collect();

    let mut paid = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(order) => paid.push(order),
            Err(e) => assert_eq!(e.kind(), ErrorKind::InvalidState),
        }
    }
    assert_eq!(paid.len(), 1);
    assert_eq!(paid[0].status, OrderStatus::Paid);
    assert_eq!(balance(&engine, "seller").await, Balance::new(dec!(150.00)));

    let mut spent = 0;
    for buyer in ["alice", "bob", "carol"] {
        if balance(&engine, buyer).await == Balance::ZERO {
            spent += 1;
        }
    }
    assert_eq!(spent, 1);
    assert_ledgers_consistent(&engine).await;
}
