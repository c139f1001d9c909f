use crate::domain::order::Order;
use crate::domain::topup::TopUpRequest;
use crate::domain::transaction::WalletTransaction;
use crate::domain::wallet::Wallet;

/// Every write of one business operation.
///
/// A store applies a changeset completely or not at all. Wallets, top-up
/// requests and orders are upserts keyed by id; transactions are appends.
#[derive(Debug, Default, Clone)]
pub struct Changeset {
    pub wallets: Vec<Wallet>,
    pub transactions: Vec<WalletTransaction>,
    pub topups: Vec<TopUpRequest>,
    pub orders: Vec<Order>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `wallet`, replacing an earlier staged copy of the same wallet.
    pub fn put_wallet(&mut self, wallet: Wallet) {
        match self.wallets.iter_mut().find(|w| w.id == wallet.id) {
            Some(staged) => *staged = wallet,
            None => self.wallets.push(wallet),
        }
    }

    pub fn append_transaction(&mut self, transaction: WalletTransaction) {
        self.transactions.push(transaction);
    }

    pub fn put_topup(&mut self, request: TopUpRequest) {
        self.topups.push(request);
    }

    pub fn put_order(&mut self, order: Order) {
        match self.orders.iter_mut().find(|o| o.id == order.id) {
            Some(staged) => *staged = order,
            None => self.orders.push(order),
        }
    }
}
