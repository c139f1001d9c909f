use crate::domain::account::{Account, AccountId};
use crate::domain::changeset::Changeset;
use crate::domain::house::{House, HouseId};
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::ports::{AccountDirectory, HouseCatalog, LedgerStore, Sequence};
use crate::domain::topup::{TopUpId, TopUpRequest, TopUpStatus};
use crate::domain::transaction::WalletTransaction;
use crate::domain::wallet::{Wallet, WalletId};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    sequences: HashMap<&'static str, u64>,
    wallets: BTreeMap<WalletId, Wallet>,
    transactions: BTreeMap<WalletId, Vec<WalletTransaction>>,
    topups: BTreeMap<TopUpId, TopUpRequest>,
    orders: BTreeMap<OrderId, Order>,
}

impl Tables {
    /// Rejects a staged wallet that would break owner or virtual port uniqueness.
    fn check_wallet_unique(&self, wallet: &Wallet) -> Result<()> {
        let clash = self.wallets.values().find(|existing| {
            existing.id != wallet.id
                && (existing.owner == wallet.owner || existing.virtual_port == wallet.virtual_port)
        });
        match clash {
            Some(existing) => Err(LedgerError::InvalidState(format!(
                "wallet {} conflicts with existing wallet {} (owner or virtual port)",
                wallet.id, existing.id
            ))),
            None => Ok(()),
        }
    }
}

/// A thread-safe in-memory store of record.
///
/// All tables sit behind one `RwLock`, so a [`Changeset`] is applied inside a
/// single write guard and readers never observe half of it.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn next_id(&self, sequence: Sequence) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let counter = tables.sequences.entry(sequence.name()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        let tables = self.tables.read().await;
        Ok(tables.wallets.get(&id).cloned())
    }

    async fn wallet_by_owner(&self, owner: AccountId) -> Result<Option<Wallet>> {
        let tables = self.tables.read().await;
        Ok(tables.wallets.values().find(|w| w.owner == owner).cloned())
    }

    async fn virtual_port_exists(&self, virtual_port: &str) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .wallets
            .values()
            .any(|w| w.virtual_port == virtual_port))
    }

    async fn all_wallets(&self) -> Result<Vec<Wallet>> {
        let tables = self.tables.read().await;
        Ok(tables.wallets.values().cloned().collect())
    }

    async fn transactions(&self, wallet: WalletId) -> Result<Vec<WalletTransaction>> {
        let tables = self.tables.read().await;
        Ok(tables.transactions.get(&wallet).cloned().unwrap_or_default())
    }

    async fn topup(&self, id: TopUpId) -> Result<Option<TopUpRequest>> {
        let tables = self.tables.read().await;
        Ok(tables.topups.get(&id).cloned())
    }

    async fn topups_by_status(&self, status: TopUpStatus) -> Result<Vec<TopUpRequest>> {
        let tables = self.tables.read().await;
        Ok(tables
            .topups
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(&id).cloned())
    }

    async fn orders_for_house(&self, house: HouseId) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .filter(|o| o.house_id == house)
            .cloned()
            .collect())
    }

    async fn orders_for_account(&self, account: AccountId) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .filter(|o| o.is_participant(account))
            .cloned()
            .collect())
    }

    async fn orders_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect())
    }

    async fn commit(&self, changes: Changeset) -> Result<()> {
        let mut tables = self.tables.write().await;

        // validate everything before the first write
        for wallet in &changes.wallets {
            tables.check_wallet_unique(wallet)?;
        }
        for tx in &changes.transactions {
            if !tables.wallets.contains_key(&tx.wallet_id)
                && !changes.wallets.iter().any(|w| w.id == tx.wallet_id)
            {
                return Err(LedgerError::not_found("wallet", tx.wallet_id.0));
            }
        }

        for wallet in changes.wallets {
            tables.wallets.insert(wallet.id, wallet);
        }
        for tx in changes.transactions {
            tables.transactions.entry(tx.wallet_id).or_default().push(tx);
        }
        for request in changes.topups {
            tables.topups.insert(request.id, request);
        }
        for order in changes.orders {
            tables.orders.insert(order.id, order);
        }
        Ok(())
    }
}

/// Fixture-backed account directory.
#[derive(Default, Clone)]
pub struct InMemoryAccountDirectory {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
}

impl InMemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let map = accounts
            .into_iter()
            .map(|a| (a.username.clone(), a))
            .collect();
        Self {
            accounts: Arc::new(RwLock::new(map)),
        }
    }

    /// Inserts or replaces an account, as the auth subsystem would.
    pub async fn upsert(&self, account: Account) {
        let mut accounts = self.accounts.write().await;
        accounts.insert(account.username.clone(), account);
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn lookup(&self, username: &str) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(username).cloned())
    }

    async fn get(&self, id: AccountId) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().find(|a| a.id == id).cloned())
    }
}

/// Fixture-backed house catalog.
#[derive(Default, Clone)]
pub struct InMemoryHouseCatalog {
    houses: Arc<RwLock<HashMap<HouseId, House>>>,
}

impl InMemoryHouseCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_houses(houses: impl IntoIterator<Item = House>) -> Self {
        let map = houses.into_iter().map(|h| (h.id, h)).collect();
        Self {
            houses: Arc::new(RwLock::new(map)),
        }
    }

    /// Inserts or replaces a listing, e.g. to simulate a price edit.
    pub async fn upsert(&self, house: House) {
        let mut houses = self.houses.write().await;
        houses.insert(house.id, house);
    }
}

#[async_trait]
impl HouseCatalog for InMemoryHouseCatalog {
    async fn house(&self, id: HouseId) -> Result<Option<House>> {
        let houses = self.houses.read().await;
        Ok(houses.get(&id).cloned())
    }
}
