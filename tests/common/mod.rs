#![allow(dead_code)]

use escrow_ledger::application::engine::EscrowEngine;
use escrow_ledger::domain::account::Account;
use escrow_ledger::domain::house::{House, HouseId};
use escrow_ledger::domain::money::Balance;
use escrow_ledger::domain::topup::ReviewDecision;
use escrow_ledger::infrastructure::in_memory::{
    InMemoryAccountDirectory, InMemoryHouseCatalog, InMemoryLedgerStore,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

pub const ADMIN: &str = "root";

/// House 1 costs 150.00, house 2 costs 100.00; both are sold by `seller`.
pub const HOUSE_150: HouseId = HouseId(1);
pub const HOUSE_100: HouseId = HouseId(2);

pub fn accounts() -> Vec<Account> {
    vec![
        Account::admin(1, ADMIN),
        Account::admin(2, "fallen").blacklisted(),
        Account::new(3, "buyer"),
        Account::new(4, "seller"),
        Account::new(5, "alice"),
        Account::new(6, "bob"),
        Account::new(7, "carol"),
    ]
}

pub fn houses() -> Vec<House> {
    vec![
        House::new(1, "Hill cottage", "seller", dec!(150.00)),
        House::new(2, "River loft", "seller", dec!(100.00)),
    ]
}

pub fn market() -> EscrowEngine {
    EscrowEngine::with_defaults(
        Arc::new(InMemoryLedgerStore::new()),
        Arc::new(InMemoryAccountDirectory::with_accounts(accounts())),
        Arc::new(InMemoryHouseCatalog::with_houses(houses())),
    )
}

/// Credits `username` through the regular submit + approve path.
pub async fn fund(engine: &EscrowEngine, username: &str, amount: Decimal) {
    let request = engine.topups().submit(username, amount, None).await.unwrap();
    engine
        .topups()
        .review(request.id, ReviewDecision::Approve, ADMIN)
        .await
        .unwrap();
}

pub async fn balance(engine: &EscrowEngine, username: &str) -> Balance {
    engine.ledger().wallet_for(username).await.unwrap().balance
}

/// Asserts that every wallet's balance equals the sum of its ledger and is not negative.
pub async fn assert_ledgers_consistent(engine: &EscrowEngine) {
    let wallets = engine.ledger().store().all_wallets().await.unwrap();
    for wallet in wallets {
        let sum = engine.ledger().ledger_balance(wallet.id).await.unwrap();
        assert_eq!(sum, wallet.balance, "wallet {} drifted from its ledger", wallet.id);
        assert!(wallet.balance >= Balance::ZERO, "wallet {} is negative", wallet.id);
    }
}
