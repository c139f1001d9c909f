use crate::domain::account::AccountId;
use crate::domain::house::HouseId;
use crate::domain::money::Amount;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Reserved,
    Paid,
    ReturnRequested,
    Returned,
    Cancelled,
}

impl OrderStatus {
    /// Money currently sits with the seller for this order.
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::Reserved | OrderStatus::Paid)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Returned | OrderStatus::Cancelled)
    }
}

/// Milestones of a purchase, in the order they happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressStage {
    DepositPaid,
    ViewingScheduled,
    FeedbackSubmitted,
    HandoverCompleted,
    FundsReleased,
}

impl ProgressStage {
    /// The only stage reachable from this one.
    pub fn next(&self) -> Option<ProgressStage> {
        match self {
            ProgressStage::DepositPaid => Some(ProgressStage::ViewingScheduled),
            ProgressStage::ViewingScheduled => Some(ProgressStage::FeedbackSubmitted),
            ProgressStage::FeedbackSubmitted => Some(ProgressStage::HandoverCompleted),
            ProgressStage::HandoverCompleted => Some(ProgressStage::FundsReleased),
            ProgressStage::FundsReleased => None,
        }
    }
}

impl FromStr for ProgressStage {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEPOSIT_PAID" => Ok(ProgressStage::DepositPaid),
            "VIEWING_SCHEDULED" => Ok(ProgressStage::ViewingScheduled),
            "FEEDBACK_SUBMITTED" => Ok(ProgressStage::FeedbackSubmitted),
            "HANDOVER_COMPLETED" => Ok(ProgressStage::HandoverCompleted),
            "FUNDS_RELEASED" => Ok(ProgressStage::FundsReleased),
            other => Err(LedgerError::InvalidInput(format!(
                "unknown progress stage `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[default]
    Full,
    Installment,
}

impl FromStr for PaymentMethod {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "FULL" => Ok(PaymentMethod::Full),
            "INSTALLMENT" => Ok(PaymentMethod::Installment),
            other => Err(LedgerError::InvalidInput(format!(
                "unknown payment method `{other}`"
            ))),
        }
    }
}

/// One house purchase.
///
/// `amount` is the price snapshot taken when the order was created; later
/// listing edits never change it. `settled_amount` is what the buyer has
/// actually transferred to the seller so far (the deposit for a reservation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub house_id: HouseId,
    pub buyer: AccountId,
    pub seller: AccountId,
    pub amount: Amount,
    pub settled_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub progress_stage: ProgressStage,
    pub return_reason: Option<String>,
    pub viewing_time: Option<DateTime<Utc>>,
    pub viewing_message: Option<String>,
    pub admin_reviewed: bool,
    pub admin_reviewed_by: Option<String>,
    pub admin_reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    fn new(
        id: OrderId,
        house_id: HouseId,
        buyer: AccountId,
        seller: AccountId,
        amount: Amount,
        payment_method: PaymentMethod,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            house_id,
            buyer,
            seller,
            amount,
            settled_amount: Decimal::ZERO,
            payment_method,
            status: OrderStatus::Pending,
            progress_stage: ProgressStage::DepositPaid,
            return_reason: None,
            viewing_time: None,
            viewing_message: None,
            admin_reviewed: false,
            admin_reviewed_by: None,
            admin_reviewed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A fully paid purchase.
    pub fn paid(
        id: OrderId,
        house_id: HouseId,
        buyer: AccountId,
        seller: AccountId,
        amount: Amount,
        payment_method: PaymentMethod,
    ) -> Self {
        let mut order = Self::new(id, house_id, buyer, seller, amount, payment_method);
        order.settled_amount = amount.value();
        order.status = OrderStatus::Paid;
        order
    }

    /// A reservation where only `deposit` of `amount` has been paid.
    pub fn reserved(
        id: OrderId,
        house_id: HouseId,
        buyer: AccountId,
        seller: AccountId,
        amount: Amount,
        deposit: Amount,
    ) -> Self {
        let mut order = Self::new(id, house_id, buyer, seller, amount, PaymentMethod::Full);
        order.settled_amount = deposit.value();
        order.status = OrderStatus::Reserved;
        order
    }

    pub fn is_participant(&self, account: AccountId) -> bool {
        self.buyer == account || self.seller == account
    }

    /// What is still owed before the order counts as paid.
    pub fn outstanding(&self) -> Decimal {
        self.amount.value() - self.settled_amount
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn require_status(&self, allowed: &[OrderStatus], action: &str) -> Result<(), LedgerError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(LedgerError::InvalidState(format!(
                "cannot {action} order {} in status {:?}",
                self.id, self.status
            )))
        }
    }

    /// Turns a reservation into a full purchase once the outstanding part is paid.
    pub fn complete_payment(&mut self, payment_method: PaymentMethod) -> Result<(), LedgerError> {
        self.require_status(&[OrderStatus::Reserved], "complete payment of")?;
        self.settled_amount = self.amount.value();
        self.payment_method = payment_method;
        self.status = OrderStatus::Paid;
        self.touch();
        Ok(())
    }

    pub fn mark_returned(&mut self, reason: String) -> Result<(), LedgerError> {
        self.require_status(&[OrderStatus::Paid], "return")?;
        self.status = OrderStatus::Returned;
        self.return_reason = Some(reason);
        self.touch();
        Ok(())
    }

    /// Closes a reservation whose house went to another buyer.
    pub fn mark_displaced(&mut self, reason: String) -> Result<(), LedgerError> {
        self.require_status(&[OrderStatus::Reserved], "displace")?;
        self.status = OrderStatus::Returned;
        self.return_reason = Some(reason);
        self.touch();
        Ok(())
    }

    pub fn mark_cancelled(&mut self, reason: String) -> Result<(), LedgerError> {
        self.require_status(&[OrderStatus::Reserved, OrderStatus::Paid], "cancel")?;
        self.status = OrderStatus::Cancelled;
        self.return_reason = Some(reason);
        self.touch();
        Ok(())
    }

    /// Moves the progress track one stage forward. Returns `false` when `stage`
    /// is already current.
    ///
    /// Only the stage right after the current one is accepted. `FundsReleased`
    /// needs a completed admin payout review.
    pub fn advance_to(&mut self, stage: ProgressStage) -> Result<bool, LedgerError> {
        self.require_status(&[OrderStatus::Reserved, OrderStatus::Paid], "update progress of")?;
        if stage == self.progress_stage {
            return Ok(false);
        }
        if self.progress_stage.next() != Some(stage) {
            return Err(LedgerError::InvalidState(format!(
                "order {} is at {:?}, cannot move to {:?}",
                self.id, self.progress_stage, stage
            )));
        }
        if stage == ProgressStage::FundsReleased && !self.admin_reviewed {
            return Err(LedgerError::InvalidState(format!(
                "order {} has not passed admin payout review",
                self.id
            )));
        }
        self.progress_stage = stage;
        self.touch();
        Ok(true)
    }

    pub fn schedule_viewing(
        &mut self,
        time: DateTime<Utc>,
        message: Option<String>,
    ) -> Result<(), LedgerError> {
        self.require_status(&[OrderStatus::Reserved, OrderStatus::Paid], "schedule a viewing for")?;
        if self.progress_stage > ProgressStage::ViewingScheduled {
            return Err(LedgerError::InvalidState(format!(
                "order {} is past the viewing stage ({:?})",
                self.id, self.progress_stage
            )));
        }
        self.viewing_time = Some(time);
        self.viewing_message = message;
        if self.progress_stage == ProgressStage::DepositPaid {
            self.progress_stage = ProgressStage::ViewingScheduled;
        }
        self.touch();
        Ok(())
    }

    pub fn mark_admin_reviewed(&mut self, reviewer: &str) -> Result<(), LedgerError> {
        self.require_status(&[OrderStatus::Paid], "review payout of")?;
        if self.admin_reviewed {
            return Err(LedgerError::InvalidState(format!(
                "order {} payout was already reviewed",
                self.id
            )));
        }
        let now = Utc::now();
        self.admin_reviewed = true;
        self.admin_reviewed_by = Some(reviewer.to_string());
        self.admin_reviewed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}
