use crate::domain::wallet::WalletId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub u64);

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    TopUp,
    Payment,
    Receive,
    Refund,
}

/// An immutable ledger entry; `amount` is signed (negative when money leaves the wallet).
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct WalletTransaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub r#type: TransactionType,
    pub amount: Decimal,
    pub reference: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Trims a caller supplied reference; blank references are dropped.
pub fn normalize_reference(reference: Option<&str>) -> Option<String> {
    reference
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
