use super::account::{Account, AccountId};
use super::changeset::Changeset;
use super::house::{House, HouseId};
use super::order::{Order, OrderId, OrderStatus};
use super::topup::{TopUpId, TopUpRequest, TopUpStatus};
use super::transaction::WalletTransaction;
use super::wallet::{Wallet, WalletId};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Identifier sequences handed out by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sequence {
    Wallet,
    Transaction,
    TopUp,
    Order,
}

impl Sequence {
    pub fn name(&self) -> &'static str {
        match self {
            Sequence::Wallet => "wallet",
            Sequence::Transaction => "transaction",
            Sequence::TopUp => "topup",
            Sequence::Order => "order",
        }
    }
}

/// The transactional store of record for wallets, ledger entries, top-up
/// requests and orders.
///
/// List methods return rows in ascending id order, which is also creation order.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn next_id(&self, sequence: Sequence) -> Result<u64>;

    async fn wallet(&self, id: WalletId) -> Result<Option<Wallet>>;
    async fn wallet_by_owner(&self, owner: AccountId) -> Result<Option<Wallet>>;
    async fn virtual_port_exists(&self, virtual_port: &str) -> Result<bool>;
    async fn all_wallets(&self) -> Result<Vec<Wallet>>;
    async fn transactions(&self, wallet: WalletId) -> Result<Vec<WalletTransaction>>;

    async fn topup(&self, id: TopUpId) -> Result<Option<TopUpRequest>>;
    async fn topups_by_status(&self, status: TopUpStatus) -> Result<Vec<TopUpRequest>>;

    async fn order(&self, id: OrderId) -> Result<Option<Order>>;
    async fn orders_for_house(&self, house: HouseId) -> Result<Vec<Order>>;
    async fn orders_for_account(&self, account: AccountId) -> Result<Vec<Order>>;
    async fn orders_by_status(&self, status: OrderStatus) -> Result<Vec<Order>>;

    /// Applies every write in `changes`, or none of them.
    async fn commit(&self, changes: Changeset) -> Result<()>;
}

/// Read-only view of the external auth subsystem.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn lookup(&self, username: &str) -> Result<Option<Account>>;
    async fn get(&self, id: AccountId) -> Result<Option<Account>>;
}

/// Read-only view of the external listing subsystem.
#[async_trait]
pub trait HouseCatalog: Send + Sync {
    async fn house(&self, id: HouseId) -> Result<Option<House>>;
}

pub type LedgerStoreBox = Arc<dyn LedgerStore>;
pub type AccountDirectoryBox = Arc<dyn AccountDirectory>;
pub type HouseCatalogBox = Arc<dyn HouseCatalog>;
