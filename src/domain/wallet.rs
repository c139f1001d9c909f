use crate::domain::account::AccountId;
use crate::domain::money::{Amount, Balance, MAX_VALUE};
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(pub u64);

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The single wallet of an account.
///
/// Balance changes only through [`Wallet::credit`] and [`Wallet::debit`], and
/// only inside a committed changeset together with the matching ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub owner: AccountId,
    pub virtual_port: String,
    pub balance: Balance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(id: WalletId, owner: AccountId, virtual_port: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner,
            virtual_port,
            balance: Balance::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Adds `amount` unless the balance would exceed [`MAX_VALUE`].
    pub fn credit(&mut self, amount: Amount) -> Result<(), LedgerError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceLimitExceeded {
                wallet: self.id.0,
                balance: self.balance.value(),
                requested: amount.value(),
            })?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Removes `amount` if the balance covers it; otherwise leaves the wallet untouched.
    pub fn debit(&mut self, amount: Amount) -> Result<(), LedgerError> {
        if !self.balance.covers(amount) {
            return Err(LedgerError::InsufficientFunds {
                wallet: self.id.0,
                balance: self.balance.value(),
                requested: amount.value(),
            });
        }
        self.balance -= amount.into();
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn wallet() -> Wallet {
        Wallet::new(WalletId(1), AccountId(7), "VP-TEST".to_string())
    }

    #[test]
    fn test_wallet_credit() {
        let mut wallet = wallet();
        wallet.credit(Amount::new(dec!(10.00)).unwrap()).unwrap();
        assert_eq!(wallet.balance, Balance::new(dec!(10.00)));
    }

    #[test]
    fn test_wallet_credit_past_max_is_refused() {
        let mut wallet = wallet();
        wallet.balance = Balance::new(MAX_VALUE - dec!(5.00));

        let result = wallet.credit(Amount::new(dec!(5.01)).unwrap());
        assert!(matches!(
            result,
            Err(LedgerError::BalanceLimitExceeded { wallet: 1, .. })
        ));
        assert_eq!(wallet.balance, Balance::new(MAX_VALUE - dec!(5.00)));
    }

    #[test]
    fn test_wallet_debit_success() {
        let mut wallet = wallet();
        wallet.balance = Balance::new(dec!(10.00));

        wallet.debit(Amount::new(dec!(10.00)).unwrap()).unwrap();
        assert_eq!(wallet.balance, Balance::ZERO);
    }

    #[test]
    fn test_wallet_debit_insufficient() {
        let mut wallet = wallet();
        wallet.balance = Balance::new(dec!(10.00));

        let result = wallet.debit(Amount::new(dec!(10.01)).unwrap());
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientFunds { wallet: 1, .. })
        ));
        assert_eq!(wallet.balance, Balance::new(dec!(10.00)));
    }
}
