use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HouseId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    Pending,
    #[default]
    Approved,
    Rejected,
}

/// A listing as seen through the external house catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct House {
    pub id: HouseId,
    pub title: String,
    #[serde(default)]
    pub seller_username: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub installment_monthly_payment: Option<Decimal>,
    #[serde(default)]
    pub status: ListingStatus,
}

impl House {
    pub fn new(id: u64, title: impl Into<String>, seller: impl Into<String>, price: Decimal) -> Self {
        Self {
            id: HouseId(id),
            title: title.into(),
            seller_username: Some(seller.into()),
            price,
            installment_monthly_payment: None,
            status: ListingStatus::Approved,
        }
    }

    pub fn is_tradable(&self) -> bool {
        self.status == ListingStatus::Approved
    }

    /// The seller username, if the listing has a non-blank one.
    pub fn seller(&self) -> Option<&str> {
        self.seller_username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}
