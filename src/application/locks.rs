use crate::domain::house::HouseId;
use crate::domain::order::OrderId;
use crate::domain::topup::TopUpId;
use crate::domain::wallet::WalletId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Something an operation must hold exclusively while it validates and commits.
///
/// The derived `Ord` is the global acquisition order: first by variant, then
/// by id. Two wallets are therefore always locked in ascending [`WalletId`]
/// order, whichever side of a transfer they are on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    /// Wallet creation (owner and virtual port uniqueness).
    WalletRegistry,
    House(HouseId),
    Order(OrderId),
    TopUp(TopUpId),
    Wallet(WalletId),
}

type Registry = Arc<SyncMutex<HashMap<LockKey, Arc<Mutex<()>>>>>;

/// Guards held for the duration of one operation; dropping releases them.
#[derive(Debug)]
pub struct LockSet {
    keys: Vec<LockKey>,
    guards: Vec<OwnedMutexGuard<()>>,
    registry: Registry,
}

impl LockSet {
    #[cfg(test)]
    fn keys(&self) -> &[LockKey] {
        &self.keys
    }
}

impl Drop for LockSet {
    /// Releases the guards, then forgets every key nobody else is holding or waiting on.
    fn drop(&mut self) {
        self.guards.clear();
        let mut locks = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        for key in &self.keys {
            if locks.get(key).is_some_and(|mutex| Arc::strong_count(mutex) == 1) {
                locks.remove(key);
            }
        }
    }
}

/// Per-key async mutexes, created on first use and dropped once idle.
///
/// The registry only holds keys of operations in flight, so it stays as small
/// as the current concurrency regardless of how many wallets or orders exist.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Registry,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires every key, sorted and deduplicated, and returns once all are held.
    pub async fn acquire(&self, keys: impl IntoIterator<Item = LockKey>) -> LockSet {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut set = LockSet {
            keys: Vec::with_capacity(keys.len()),
            guards: Vec::with_capacity(keys.len()),
            registry: self.locks.clone(),
        };
        for key in keys {
            let mutex = {
                let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
                locks.entry(key).or_default().clone()
            };
            // registered before awaiting so a cancelled acquire still prunes it
            set.keys.push(key);
            set.guards.push(mutex.lock_owned().await);
        }
        set
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
