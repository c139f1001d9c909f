use crate::application::locks::{LockKey, LockManager};
use crate::domain::account::{Account, AccountId};
use crate::domain::changeset::Changeset;
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{AccountDirectoryBox, LedgerStoreBox, Sequence};
use crate::domain::transaction::{
    TransactionId, TransactionType, WalletTransaction, normalize_reference,
};
use crate::domain::wallet::{Wallet, WalletId};
use crate::error::{LedgerError, Result};
use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// How many entries [`LedgerService::wallet_summary`] returns.
pub const RECENT_TRANSACTIONS: usize = 10;

/// Produces candidate virtual ports; uniqueness is checked by the caller.
pub trait VirtualPortGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// `prefix` followed by `length` random upper-case alphanumerics, e.g. `VP-7K2Q0ZB1M4XA`.
#[derive(Debug, Clone)]
pub struct RandomVirtualPorts {
    prefix: String,
    length: usize,
}

impl RandomVirtualPorts {
    pub fn new(prefix: impl Into<String>, length: usize) -> Self {
        Self {
            prefix: prefix.into(),
            length,
        }
    }
}

impl Default for RandomVirtualPorts {
    fn default() -> Self {
        Self::new("VP-", 12)
    }
}

impl VirtualPortGenerator for RandomVirtualPorts {
    fn generate(&self) -> String {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(|b| char::from(b).to_ascii_uppercase())
            .collect();
        format!("{}{}", self.prefix, token)
    }
}

/// Both ledger entries of a committed transfer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transfer {
    pub debit: WalletTransaction,
    pub credit: WalletTransaction,
}

/// Owner-facing view of a wallet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletSummary {
    pub username: String,
    pub display_name: Option<String>,
    pub virtual_port: String,
    pub balance: Balance,
    /// Newest first.
    pub recent_transactions: Vec<WalletTransaction>,
}

/// Wallet creation plus the credit / debit / transfer primitives.
///
/// Every mutation locks the wallets it touches (ascending id order), re-reads
/// them under the lock, stages the new balances together with their ledger
/// entries in one [`Changeset`], and commits. A failure before the commit
/// leaves the store exactly as it was.
#[derive(Clone)]
pub struct LedgerService {
    store: LedgerStoreBox,
    directory: AccountDirectoryBox,
    locks: Arc<LockManager>,
    ports: Arc<dyn VirtualPortGenerator>,
}

impl LedgerService {
    pub fn new(
        store: LedgerStoreBox,
        directory: AccountDirectoryBox,
        locks: Arc<LockManager>,
        ports: Arc<dyn VirtualPortGenerator>,
    ) -> Self {
        Self {
            store,
            directory,
            locks,
            ports,
        }
    }

    pub fn store(&self) -> &LedgerStoreBox {
        &self.store
    }

    pub fn directory(&self) -> &AccountDirectoryBox {
        &self.directory
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    /// Resolves `username` through the account directory.
    pub async fn account(&self, username: &str) -> Result<Account> {
        self.directory
            .lookup(username.trim())
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(username.to_string()))
    }

    /// Returns the account's wallet, creating it on first access.
    #[instrument(skip(self, account), fields(account = %account.id))]
    pub async fn ensure_wallet(&self, account: &Account) -> Result<Wallet> {
        if let Some(wallet) = self.store.wallet_by_owner(account.id).await? {
            return Ok(wallet);
        }

        let _registry = self.locks.acquire([LockKey::WalletRegistry]).await;
        if let Some(wallet) = self.store.wallet_by_owner(account.id).await? {
            return Ok(wallet);
        }

        let virtual_port = loop {
            let candidate = self.ports.generate();
            if !self.store.virtual_port_exists(&candidate).await? {
                break candidate;
            }
            debug!(candidate, "virtual port collision, regenerating");
        };
        let id = WalletId(self.store.next_id(Sequence::Wallet).await?);
        let wallet = Wallet::new(id, account.id, virtual_port);

        let mut changes = Changeset::new();
        changes.put_wallet(wallet.clone());
        self.store.commit(changes).await?;

        info!(wallet = %wallet.id, virtual_port = %wallet.virtual_port, "wallet created");
        Ok(wallet)
    }

    pub async fn wallet_for(&self, username: &str) -> Result<Wallet> {
        let account = self.account(username).await?;
        self.ensure_wallet(&account).await
    }

    /// Wallet of an account known only by id, created if missing.
    pub async fn wallet_of(&self, owner: AccountId) -> Result<Wallet> {
        if let Some(wallet) = self.store.wallet_by_owner(owner).await? {
            return Ok(wallet);
        }
        let account = self
            .directory
            .get(owner)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(owner.to_string()))?;
        self.ensure_wallet(&account).await
    }

    pub async fn wallet(&self, id: WalletId) -> Result<Wallet> {
        self.store
            .wallet(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("wallet", id.0))
    }

    /// Increases the balance and appends one entry, atomically.
    #[instrument(skip(self, reference, description))]
    pub async fn credit(
        &self,
        wallet: WalletId,
        amount: Decimal,
        kind: TransactionType,
        reference: Option<&str>,
        description: &str,
    ) -> Result<WalletTransaction> {
        let amount = Amount::new(amount)?;
        let _locks = self.locks.acquire([LockKey::Wallet(wallet)]).await;

        let mut target = self.wallet(wallet).await?;
        let mut changes = Changeset::new();
        let entry = self
            .stage_credit(&mut changes, &mut target, amount, kind, reference, description)
            .await?;
        self.store.commit(changes).await?;

        info!(wallet = %wallet, %amount, balance = %target.balance, "wallet credited");
        Ok(entry)
    }

    /// Decreases the balance and appends one entry, atomically. Never partial.
    #[instrument(skip(self, reference, description))]
    pub async fn debit(
        &self,
        wallet: WalletId,
        amount: Decimal,
        kind: TransactionType,
        reference: Option<&str>,
        description: &str,
    ) -> Result<WalletTransaction> {
        let amount = Amount::new(amount)?;
        let _locks = self.locks.acquire([LockKey::Wallet(wallet)]).await;

        let mut source = self.wallet(wallet).await?;
        let mut changes = Changeset::new();
        let entry = self
            .stage_debit(&mut changes, &mut source, amount, kind, reference, description)
            .await?;
        self.store.commit(changes).await?;

        info!(wallet = %wallet, %amount, balance = %source.balance, "wallet debited");
        Ok(entry)
    }

    /// Moves `amount` from one wallet to another as a PAYMENT / RECEIVE pair.
    ///
    /// References are metadata only: repeating a reference produces a second,
    /// independent transfer.
    #[instrument(skip(self, reference, description))]
    pub async fn transfer(
        &self,
        from: WalletId,
        to: WalletId,
        amount: Decimal,
        reference: Option<&str>,
        description: &str,
    ) -> Result<Transfer> {
        self.move_funds(
            from,
            to,
            amount,
            (TransactionType::Payment, TransactionType::Receive),
            reference,
            description,
        )
        .await
    }

    /// Same as [`LedgerService::transfer`] but both entries are REFUNDs.
    #[instrument(skip(self, reference, description))]
    pub async fn refund(
        &self,
        from: WalletId,
        to: WalletId,
        amount: Decimal,
        reference: Option<&str>,
        description: &str,
    ) -> Result<Transfer> {
        self.move_funds(
            from,
            to,
            amount,
            (TransactionType::Refund, TransactionType::Refund),
            reference,
            description,
        )
        .await
    }

    async fn move_funds(
        &self,
        from: WalletId,
        to: WalletId,
        amount: Decimal,
        types: (TransactionType, TransactionType),
        reference: Option<&str>,
        description: &str,
    ) -> Result<Transfer> {
        let amount = Amount::new(amount)?;
        if from == to {
            return Err(LedgerError::SelfTransactionNotAllowed);
        }
        let _locks = self
            .locks
            .acquire([LockKey::Wallet(from), LockKey::Wallet(to)])
            .await;

        let mut source = self.wallet(from).await?;
        let mut target = self.wallet(to).await?;
        let mut changes = Changeset::new();
        let transfer = self
            .stage_transfer(
                &mut changes,
                &mut source,
                &mut target,
                amount,
                types,
                reference,
                description,
            )
            .await?;
        self.store.commit(changes).await?;

        info!(%from, %to, %amount, "transfer committed");
        Ok(transfer)
    }

    /// Full ledger of a wallet, oldest first.
    pub async fn transactions(&self, wallet: WalletId) -> Result<Vec<WalletTransaction>> {
        self.store.transactions(wallet).await
    }

    /// Sum of all ledger entries of `wallet`; always equal to its balance.
    pub async fn ledger_balance(&self, wallet: WalletId) -> Result<Balance> {
        let entries = self.store.transactions(wallet).await?;
        Ok(Balance::new(entries.iter().map(|e| e.amount).sum()))
    }

    pub async fn wallet_summary(&self, username: &str) -> Result<WalletSummary> {
        let account = self.account(username).await?;
        let wallet = self.ensure_wallet(&account).await?;
        let mut recent = self.store.transactions(wallet.id).await?;
        recent.reverse();
        recent.truncate(RECENT_TRANSACTIONS);

        Ok(WalletSummary {
            username: account.username,
            display_name: account.display_name,
            virtual_port: wallet.virtual_port,
            balance: wallet.balance,
            recent_transactions: recent,
        })
    }

    async fn entry(
        &self,
        wallet: WalletId,
        r#type: TransactionType,
        amount: Decimal,
        reference: Option<&str>,
        description: &str,
    ) -> Result<WalletTransaction> {
        Ok(WalletTransaction {
            id: TransactionId(self.store.next_id(Sequence::Transaction).await?),
            wallet_id: wallet,
            r#type,
            amount,
            reference: normalize_reference(reference),
            description: description.to_string(),
            created_at: Utc::now(),
        })
    }

    /// Credits `wallet` in memory and stages the new balance plus its entry;
    /// stages nothing on failure.
    ///
    /// The caller must hold the wallet's lock and commit `changes`.
    pub(crate) async fn stage_credit(
        &self,
        changes: &mut Changeset,
        wallet: &mut Wallet,
        amount: Amount,
        kind: TransactionType,
        reference: Option<&str>,
        description: &str,
    ) -> Result<WalletTransaction> {
        wallet.credit(amount)?;
        let entry = self
            .entry(wallet.id, kind, amount.value(), reference, description)
            .await?;
        changes.put_wallet(wallet.clone());
        changes.append_transaction(entry.clone());
        Ok(entry)
    }

    /// Debits `wallet` in memory and stages the result; stages nothing on failure.
    pub(crate) async fn stage_debit(
        &self,
        changes: &mut Changeset,
        wallet: &mut Wallet,
        amount: Amount,
        kind: TransactionType,
        reference: Option<&str>,
        description: &str,
    ) -> Result<WalletTransaction> {
        wallet.debit(amount)?;
        let entry = self
            .entry(wallet.id, kind, amount.outgoing(), reference, description)
            .await?;
        changes.put_wallet(wallet.clone());
        changes.append_transaction(entry.clone());
        Ok(entry)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn stage_transfer(
        &self,
        changes: &mut Changeset,
        from: &mut Wallet,
        to: &mut Wallet,
        amount: Amount,
        (debit_type, credit_type): (TransactionType, TransactionType),
        reference: Option<&str>,
        description: &str,
    ) -> Result<Transfer> {
        let debit = self
            .stage_debit(changes, from, amount, debit_type, reference, description)
            .await?;
        let credit = self
            .stage_credit(changes, to, amount, credit_type, reference, description)
            .await?;
        Ok(Transfer { debit, credit })
    }
}
