use crate::error::LedgerError;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::SubAssign;

/// Number of fractional digits every stored monetary value carries.
pub const SCALE: u32 = 2;

/// Largest value a `DECIMAL(18,2)` column holds; bounds amounts and balances.
pub const MAX_VALUE: Decimal = dec!(9999999999999999.99);

fn normalize(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(SCALE);
    rounded
}

/// A wallet balance at 2-digit scale.
///
/// Growth goes through [`Balance::checked_add`], capped at [`MAX_VALUE`]; the
/// non-negative rule is enforced by [`crate::domain::wallet::Wallet::debit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

/// A strictly positive amount of money, rounded half-away-from-zero to 2 digits
/// and no larger than [`MAX_VALUE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, LedgerError> {
        let rounded = normalize(value);
        if rounded > Decimal::ZERO && rounded <= MAX_VALUE {
            Ok(Self(rounded))
        } else {
            Err(LedgerError::InvalidAmount(value))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// The signed ledger value of this amount leaving a wallet.
    pub fn outgoing(&self) -> Decimal {
        -self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = LedgerError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(normalize(amount))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn covers(&self, amount: Amount) -> bool {
        self.0 >= amount.value()
    }

    /// `self + amount`, or `None` when the sum would not fit [`MAX_VALUE`].
    pub fn checked_add(&self, amount: Amount) -> Option<Self> {
        self.0
            .checked_add(amount.value())
            .filter(|sum| *sum <= MAX_VALUE)
            .map(Self)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", normalize(self.0))
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

/// Rounds `value * rate` to the ledger scale, e.g. a reservation deposit.
pub fn portion(value: Amount, rate: Decimal) -> Result<Amount, LedgerError> {
    Amount::new(value.value() * rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balance_arithmetic() {
        let mut balance = Balance::new(dec!(10.00));
        let five = Amount::new(dec!(5.00)).unwrap();
        assert_eq!(balance.checked_add(five), Some(Balance::new(dec!(15.00))));
        balance -= five.into();
        assert_eq!(balance, Balance::new(dec!(5.00)));
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_amount_rounds_half_away_from_zero() {
        assert_eq!(Amount::new(dec!(10.005)).unwrap().value(), dec!(10.01));
        assert_eq!(Amount::new(dec!(10.004)).unwrap().value(), dec!(10.00));
        // rounds to zero, so it is not a positive amount any more
        assert!(Amount::new(dec!(0.004)).is_err());
    }

    #[test]
    fn test_amount_is_bounded_by_column_size() {
        assert_eq!(Amount::new(MAX_VALUE).unwrap().value(), MAX_VALUE);
        assert!(matches!(
            Amount::new(MAX_VALUE + dec!(0.01)),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            Amount::new(dec!(50000000000000000000000000000)),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_balance_checked_add_stops_at_max() {
        let one_cent = Amount::new(dec!(0.01)).unwrap();
        let near_max = Balance::new(MAX_VALUE - dec!(0.01));
        assert_eq!(near_max.checked_add(one_cent), Some(Balance::new(MAX_VALUE)));
        assert_eq!(Balance::new(MAX_VALUE).checked_add(one_cent), None);
    }

    #[test]
    fn test_portion_of_price() {
        let price = Amount::new(dec!(1234.55)).unwrap();
        assert_eq!(portion(price, dec!(0.1)).unwrap().value(), dec!(123.46));
    }

    #[test]
    fn test_balance_display_has_two_digits() {
        assert_eq!(Balance::new(dec!(100)).to_string(), "100.00");
        assert_eq!(Balance::ZERO.to_string(), "0.00");
    }
}
