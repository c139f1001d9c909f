mod common;

use common::*;
use escrow_ledger::domain::money::Balance;
use escrow_ledger::domain::order::{OrderId, PaymentMethod, ProgressStage};
use escrow_ledger::domain::topup::ReviewDecision;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::HashMap;

const USERS: [&str; 5] = ["buyer", "seller", "alice", "bob", "carol"];

/// Random mix of top-ups, transfers, purchases, returns and cancellations.
/// Whatever succeeds or fails, money is neither created nor destroyed and
/// every wallet still matches its ledger.
#[tokio::test]
async fn test_random_operations_conserve_funds() {
    let engine = market();
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let mut minted = Decimal::ZERO;
    let mut orders: Vec<OrderId> = Vec::new();

    for _ in 0..400 {
        let amount = Decimal::new(rng.gen_range(1..=20_000), 2);
        let actor = *USERS.choose(&mut rng).unwrap();
        match rng.gen_range(0..6) {
            0 => {
                let request = engine.topups().submit(actor, amount, None).await.unwrap();
                let decision = if rng.gen_bool(0.7) {
                    ReviewDecision::Approve
                } else {
                    ReviewDecision::Reject
                };
                engine.topups().review(request.id, decision, ADMIN).await.unwrap();
                if decision == ReviewDecision::Approve {
                    minted += request.amount.value();
                }
            }
            1 | 2 => {
                let other = *USERS.choose(&mut rng).unwrap();
                let from = engine.ledger().wallet_for(actor).await.unwrap();
                let to = engine.ledger().wallet_for(other).await.unwrap();
                let _ = engine.ledger().transfer(from.id, to.id, amount, None, "random").await;
            }
            3 => {
                let house = if rng.gen_bool(0.5) { HOUSE_150 } else { HOUSE_100 };
                let result = if rng.gen_bool(0.5) {
                    engine
                        .orders()
                        .create_order(house, actor, PaymentMethod::Full, None)
                        .await
                } else {
                    engine.orders().reserve_house(house, actor).await
                };
                if let Ok(order) = result {
                    orders.push(order.id);
                }
            }
            4 => {
                if let Some(order) = orders.choose(&mut rng) {
                    let _ = engine.orders().request_return(*order, actor, None).await;
                }
            }
            _ => {
                if let Some(order) = orders.choose(&mut rng) {
                    let _ = engine.orders().cancel_order(*order, actor, None).await;
                    let _ = engine
                        .orders()
                        .advance_progress(*order, actor, ProgressStage::FeedbackSubmitted)
                        .await;
                }
            }
        }
    }

    assert_ledgers_consistent(&engine).await;

    let wallets = engine.ledger().store().all_wallets().await.unwrap();
    let total: Decimal = wallets.iter().map(|w| w.balance.value()).sum();
    assert_eq!(total, minted);

    let by_port: HashMap<&str, usize> = wallets
        .iter()
        .map(|w| (w.virtual_port.as_str(), 1))
        .collect();
    assert_eq!(by_port.len(), wallets.len(), "virtual ports must be unique");
    assert!(wallets.iter().all(|w| w.balance >= Balance::ZERO));
}
