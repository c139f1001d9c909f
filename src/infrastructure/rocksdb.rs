use crate::domain::account::AccountId;
use crate::domain::changeset::Changeset;
use crate::domain::house::HouseId;
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::ports::{LedgerStore, Sequence};
use crate::domain::topup::{TopUpId, TopUpRequest, TopUpStatus};
use crate::domain::transaction::WalletTransaction;
use crate::domain::wallet::{Wallet, WalletId};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for wallet rows, keyed by wallet id.
pub const CF_WALLETS: &str = "wallets";
/// Unique index: owner account id -> wallet id.
pub const CF_WALLET_OWNERS: &str = "wallet_owners";
/// Unique index: virtual port -> wallet id.
pub const CF_VIRTUAL_PORTS: &str = "virtual_ports";
/// Ledger entries, keyed by wallet id followed by transaction id.
pub const CF_TRANSACTIONS: &str = "wallet_transactions";
/// Column Family for top-up requests.
pub const CF_TOPUPS: &str = "topup_requests";
/// Column Family for house orders.
pub const CF_ORDERS: &str = "orders";
/// Sequence counters.
pub const CF_META: &str = "meta";

const COLUMN_FAMILIES: [&str; 7] = [
    CF_WALLETS,
    CF_WALLET_OWNERS,
    CF_VIRTUAL_PORTS,
    CF_TRANSACTIONS,
    CF_TOPUPS,
    CF_ORDERS,
    CF_META,
];

/// A persistent store of record on RocksDB.
///
/// Each [`Changeset`] becomes one `WriteBatch`, so a commit lands atomically.
/// Writers (commits and sequence bumps) are serialized by `write_lock` so the
/// uniqueness checks and the batch see the same state.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn transaction_key(wallet: WalletId, tx: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&wallet.0.to_be_bytes());
    key[8..].copy_from_slice(&tx.to_be_bytes());
    key
}

fn read_u64(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| {
        LedgerError::storage(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "expected an 8-byte big-endian integer",
        ))
    })?;
    Ok(u64::from_be_bytes(raw))
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating any
    /// missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            LedgerError::storage(std::io::Error::other(format!(
                "{name} column family not found"
            )))
        })
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, IteratorMode::Start) {
            let (_key, value) = item?;
            rows.push(decode(&value)?);
        }
        Ok(rows)
    }

    fn index_points_elsewhere(&self, cf: &str, key: &[u8], wallet: WalletId) -> Result<bool> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(read_u64(&bytes)? != wallet.0),
            None => Ok(false),
        }
    }
}

#[async_trait]
impl LedgerStore for RocksDBStore {
    async fn next_id(&self, sequence: Sequence) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_META)?;
        let key = sequence.name().as_bytes();
        let current = match self.db.get_cf(cf, key)? {
            Some(bytes) => read_u64(&bytes)?,
            None => 0,
        };
        let next = current + 1;
        self.db.put_cf(cf, key, next.to_be_bytes())?;
        Ok(next)
    }

    async fn wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        self.get_json(CF_WALLETS, &id.0.to_be_bytes())
    }

    async fn wallet_by_owner(&self, owner: AccountId) -> Result<Option<Wallet>> {
        match self.db.get_cf(self.cf(CF_WALLET_OWNERS)?, owner.0.to_be_bytes())? {
            Some(bytes) => self.wallet(WalletId(read_u64(&bytes)?)).await,
            None => Ok(None),
        }
    }

    async fn virtual_port_exists(&self, virtual_port: &str) -> Result<bool> {
        let result = self
            .db
            .get_pinned_cf(self.cf(CF_VIRTUAL_PORTS)?, virtual_port.as_bytes())?;
        Ok(result.is_some())
    }

    async fn all_wallets(&self) -> Result<Vec<Wallet>> {
        self.scan(CF_WALLETS)
    }

    async fn transactions(&self, wallet: WalletId) -> Result<Vec<WalletTransaction>> {
        let prefix = wallet.0.to_be_bytes();
        let mode = IteratorMode::From(&prefix, Direction::Forward);
        let mut entries = Vec::new();
        for item in self.db.iterator_cf(self.cf(CF_TRANSACTIONS)?, mode) {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            entries.push(decode(&value)?);
        }
        Ok(entries)
    }

    async fn topup(&self, id: TopUpId) -> Result<Option<TopUpRequest>> {
        self.get_json(CF_TOPUPS, &id.0.to_be_bytes())
    }

    async fn topups_by_status(&self, status: TopUpStatus) -> Result<Vec<TopUpRequest>> {
        let all: Vec<TopUpRequest> = self.scan(CF_TOPUPS)?;
        Ok(all.into_iter().filter(|r| r.status == status).collect())
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        self.get_json(CF_ORDERS, &id.0.to_be_bytes())
    }

    async fn orders_for_house(&self, house: HouseId) -> Result<Vec<Order>> {
        let all: Vec<Order> = self.scan(CF_ORDERS)?;
        Ok(all.into_iter().filter(|o| o.house_id == house).collect())
    }

    async fn orders_for_account(&self, account: AccountId) -> Result<Vec<Order>> {
        let all: Vec<Order> = self.scan(CF_ORDERS)?;
        Ok(all.into_iter().filter(|o| o.is_participant(account)).collect())
    }

    async fn orders_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        let all: Vec<Order> = self.scan(CF_ORDERS)?;
        Ok(all.into_iter().filter(|o| o.status == status).collect())
    }

    async fn commit(&self, changes: Changeset) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        for wallet in &changes.wallets {
            let owner_taken =
                self.index_points_elsewhere(CF_WALLET_OWNERS, &wallet.owner.0.to_be_bytes(), wallet.id)?;
            let port_taken =
                self.index_points_elsewhere(CF_VIRTUAL_PORTS, wallet.virtual_port.as_bytes(), wallet.id)?;
            if owner_taken || port_taken {
                return Err(LedgerError::InvalidState(format!(
                    "wallet {} conflicts with an existing wallet (owner or virtual port)",
                    wallet.id
                )));
            }
        }

        let mut batch = WriteBatch::default();
        for wallet in &changes.wallets {
            let id = wallet.id.0.to_be_bytes();
            batch.put_cf(self.cf(CF_WALLETS)?, id, encode(wallet)?);
            batch.put_cf(self.cf(CF_WALLET_OWNERS)?, wallet.owner.0.to_be_bytes(), id);
            batch.put_cf(self.cf(CF_VIRTUAL_PORTS)?, wallet.virtual_port.as_bytes(), id);
        }
        for tx in &changes.transactions {
            let key = transaction_key(tx.wallet_id, tx.id.0);
            batch.put_cf(self.cf(CF_TRANSACTIONS)?, key, encode(tx)?);
        }
        for request in &changes.topups {
            batch.put_cf(self.cf(CF_TOPUPS)?, request.id.0.to_be_bytes(), encode(request)?);
        }
        for order in &changes.orders {
            batch.put_cf(self.cf(CF_ORDERS)?, order.id.0.to_be_bytes(), encode(order)?);
        }

        self.db.write(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::{Amount, Balance};
    use crate::domain::transaction::{TransactionId, TransactionType};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in COLUMN_FAMILIES {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_rocksdb_wallet_and_ledger() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let mut wallet = Wallet::new(WalletId(1), AccountId(9), "VP-ROCKS".to_string());
        wallet.balance = Balance::new(dec!(100.00));
        let mut changes = Changeset::new();
        changes.put_wallet(wallet.clone());
        changes.append_transaction(WalletTransaction {
            id: TransactionId(1),
            wallet_id: WalletId(1),
            r#type: TransactionType::TopUp,
            amount: dec!(100.00),
            reference: Some("R1".to_string()),
            description: "top-up".to_string(),
            created_at: Utc::now(),
        });
        store.commit(changes).await.unwrap();

        assert_eq!(store.wallet(WalletId(1)).await.unwrap(), Some(wallet.clone()));
        assert_eq!(store.wallet_by_owner(AccountId(9)).await.unwrap(), Some(wallet));
        assert!(store.virtual_port_exists("VP-ROCKS").await.unwrap());
        assert_eq!(store.transactions(WalletId(1)).await.unwrap().len(), 1);
        assert!(store.transactions(WalletId(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rocksdb_rejects_second_wallet_for_owner() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let mut changes = Changeset::new();
        changes.put_wallet(Wallet::new(WalletId(1), AccountId(9), "VP-1".to_string()));
        store.commit(changes).await.unwrap();

        let mut changes = Changeset::new();
        changes.put_wallet(Wallet::new(WalletId(2), AccountId(9), "VP-2".to_string()));
        assert!(store.commit(changes).await.is_err());
        assert!(store.wallet(WalletId(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rocksdb_sequences_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            assert_eq!(store.next_id(Sequence::TopUp).await.unwrap(), 1);
            assert_eq!(store.next_id(Sequence::TopUp).await.unwrap(), 2);
        }
        let store = RocksDBStore::open(dir.path()).unwrap();
        assert_eq!(store.next_id(Sequence::TopUp).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_rocksdb_topups_by_status() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let amount = Amount::new(dec!(10.00)).unwrap();

        let mut changes = Changeset::new();
        changes.put_topup(TopUpRequest::new(TopUpId(1), AccountId(1), amount, None));
        let mut decided = TopUpRequest::new(TopUpId(2), AccountId(1), amount, None);
        decided
            .mark_reviewed(crate::domain::topup::ReviewDecision::Reject, "root")
            .unwrap();
        changes.put_topup(decided);
        store.commit(changes).await.unwrap();

        let pending = store.topups_by_status(TopUpStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, TopUpId(1));
    }
}
