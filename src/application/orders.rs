use crate::application::gate::AdminReviewGate;
use crate::application::ledger::LedgerService;
use crate::application::locks::LockKey;
use crate::domain::account::{Account, AccountId};
use crate::domain::changeset::Changeset;
use crate::domain::house::{House, HouseId};
use crate::domain::money::{Amount, portion};
use crate::domain::order::{Order, OrderId, OrderStatus, PaymentMethod, ProgressStage};
use crate::domain::ports::{HouseCatalogBox, Sequence};
use crate::domain::topup::ReviewDecision;
use crate::domain::transaction::TransactionType;
use crate::domain::wallet::{Wallet, WalletId};
use crate::error::{AccessDenied, LedgerError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Digits a card number must have to pay by installment.
pub const CARD_NUMBER_DIGITS: usize = 19;

const PAYMENT: (TransactionType, TransactionType) =
    (TransactionType::Payment, TransactionType::Receive);
const REFUND: (TransactionType, TransactionType) =
    (TransactionType::Refund, TransactionType::Refund);

/// Return reason of a reservation closed because another buyer purchased the house.
pub const DISPLACED_RESERVATION_REASON: &str =
    "Seller did not honour the reservation; deposit refunded";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderSettings {
    /// Share of the price paid up front to reserve a house.
    pub reservation_deposit_rate: Decimal,
    /// Used when a return or cancellation comes without a reason.
    pub default_return_reason: String,
}

impl Default for OrderSettings {
    fn default() -> Self {
        Self {
            reservation_deposit_rate: dec!(0.10),
            default_return_reason: "Buyer requested a return".to_string(),
        }
    }
}

/// Everything resolved and checked before an order touches money.
struct Deal {
    house: House,
    price: Amount,
    buyer: Account,
    seller: AccountId,
    buyer_wallet: WalletId,
    seller_wallet: WalletId,
}

impl Deal {
    fn lock_keys(&self) -> [LockKey; 3] {
        [
            LockKey::House(self.house.id),
            LockKey::Wallet(self.buyer_wallet),
            LockKey::Wallet(self.seller_wallet),
        ]
    }
}

fn order_reference(order: OrderId) -> String {
    format!("ORDER-{order}")
}

/// Last four digits of a valid installment card.
fn card_suffix(card_number: Option<&str>) -> Result<String> {
    let digits = card_number.map(str::trim).unwrap_or_default();
    if digits.len() != CARD_NUMBER_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LedgerError::InvalidInput(format!(
            "installment payment needs a {CARD_NUMBER_DIGITS}-digit card number"
        )));
    }
    Ok(digits[CARD_NUMBER_DIGITS - 4..].to_string())
}

/// House purchase lifecycle on top of the ledger.
///
/// Each operation that moves money stages the order row and the transfer in
/// one [`Changeset`]; a failed transfer leaves no order behind. Mutations of
/// one house are serialized by its [`LockKey::House`] key.
#[derive(Clone)]
pub struct OrderStateMachine {
    ledger: LedgerService,
    houses: HouseCatalogBox,
    gate: AdminReviewGate,
    settings: OrderSettings,
}

impl OrderStateMachine {
    pub fn new(
        ledger: LedgerService,
        houses: HouseCatalogBox,
        gate: AdminReviewGate,
        settings: OrderSettings,
    ) -> Self {
        Self {
            ledger,
            houses,
            gate,
            settings,
        }
    }

    /// Buys a house outright.
    ///
    /// If the same buyer holds a reservation on the house, that order is
    /// completed by charging only the outstanding amount. A reservation held
    /// by someone else is closed as RETURNED and its deposit refunded in the
    /// same commit as the new purchase.
    #[instrument(skip(self, card_number))]
    pub async fn create_order(
        &self,
        house_id: HouseId,
        buyer: &str,
        method: PaymentMethod,
        card_number: Option<&str>,
    ) -> Result<Order> {
        let deal = self.deal(house_id, buyer).await?;
        let (amount, card) = match method {
            PaymentMethod::Full => (deal.price, None),
            PaymentMethod::Installment => {
                let monthly = deal.house.installment_monthly_payment.ok_or_else(|| {
                    LedgerError::InvalidInput(format!(
                        "house {} does not offer installments",
                        house_id.0
                    ))
                })?;
                (Amount::new(monthly)?, Some(card_suffix(card_number)?))
            }
        };

        loop {
            // the holder of another buyer's reservation is refunded, so their
            // wallet joins the lock set; retry if the reservation changed hands
            let expected = self.reservation_holder(house_id, deal.buyer.id).await?;
            let keys = deal
                .lock_keys()
                .into_iter()
                .chain(expected.map(|(_, wallet)| LockKey::Wallet(wallet)));
            let _locks = self.ledger.locks().acquire(keys).await;
            if self.reservation_holder(house_id, deal.buyer.id).await? != expected {
                debug!(house = house_id.0, "reservation changed while locking, retrying");
                continue;
            }
            return self
                .settle_purchase(&deal, method, amount, card.as_deref(), expected)
                .await;
        }
    }

    /// The locked part of [`Self::create_order`].
    async fn settle_purchase(
        &self,
        deal: &Deal,
        method: PaymentMethod,
        amount: Amount,
        card: Option<&str>,
        displaced_holder: Option<(OrderId, WalletId)>,
    ) -> Result<Order> {
        let house_id = deal.house.id;
        let mut buyer_wallet = self.ledger.wallet(deal.buyer_wallet).await?;
        let mut seller_wallet = self.ledger.wallet(deal.seller_wallet).await?;
        let mut changes = Changeset::new();

        let (order, charge, mut description) = match self.open_order(house_id).await? {
            Some(mut reserved)
                if reserved.status == OrderStatus::Reserved && reserved.buyer == deal.buyer.id =>
            {
                if method == PaymentMethod::Installment {
                    return Err(LedgerError::InvalidInput(format!(
                        "reservation {} can only be completed with full payment",
                        reserved.id
                    )));
                }
                let charge = Amount::new(reserved.outstanding())?;
                reserved.complete_payment(method)?;
                let description = format!("Balance payment for house: {}", deal.house.title);
                (reserved, charge, description)
            }
            Some(open) if open.status == OrderStatus::Paid => {
                return Err(LedgerError::InvalidState(format!(
                    "house {} already has open order {} ({:?})",
                    house_id.0, open.id, open.status
                )));
            }
            _ => {
                let id = OrderId(self.ledger.store().next_id(Sequence::Order).await?);
                let order = Order::paid(id, house_id, deal.buyer.id, deal.seller, amount, method);
                let description = format!("House purchase: {}", deal.house.title);
                (order, amount, description)
            }
        };
        if let Some(last_four) = card {
            description.push_str(&format!(" (installment, card ending {last_four})"));
        }

        self.stage_settlement(
            &mut changes,
            &mut buyer_wallet,
            &mut seller_wallet,
            charge,
            PAYMENT,
            order.id,
            &description,
        )
        .await?;

        // staged after the payment so the seller's balance already covers the refund
        let mut displaced = None;
        if let Some((reservation_id, holder_wallet)) = displaced_holder {
            let mut reservation = self.order(reservation_id).await?;
            let mut holder = self.ledger.wallet(holder_wallet).await?;
            let deposit = Amount::new(reservation.settled_amount)?;
            reservation.mark_displaced(DISPLACED_RESERVATION_REASON.to_string())?;
            self.stage_settlement(
                &mut changes,
                &mut seller_wallet,
                &mut holder,
                deposit,
                REFUND,
                reservation_id,
                &format!("Refund for order {reservation_id}: {DISPLACED_RESERVATION_REASON}"),
            )
            .await?;
            changes.put_order(reservation);
            displaced = Some((reservation_id, deposit));
        }

        changes.put_order(order.clone());
        self.ledger.store().commit(changes).await?;

        if let Some((reservation_id, deposit)) = displaced {
            info!(order = %reservation_id, %deposit, "reservation displaced and refunded");
        }

        info!(order = %order.id, house = house_id.0, %charge, "order paid");
        Ok(order)
    }

    /// Reserves a house by paying a deposit of the configured share of its price.
    #[instrument(skip(self))]
    pub async fn reserve_house(&self, house_id: HouseId, buyer: &str) -> Result<Order> {
        let deal = self.deal(house_id, buyer).await?;
        let deposit = portion(deal.price, self.settings.reservation_deposit_rate)?;

        let _locks = self.ledger.locks().acquire(deal.lock_keys()).await;

        if let Some(open) = self.open_order(house_id).await? {
            return Err(LedgerError::InvalidState(format!(
                "house {} already has open order {} ({:?})",
                house_id.0, open.id, open.status
            )));
        }

        let id = OrderId(self.ledger.store().next_id(Sequence::Order).await?);
        let order = Order::reserved(id, house_id, deal.buyer.id, deal.seller, deal.price, deposit);

        let mut changes = Changeset::new();
        self.stage_settlement(
            &mut changes,
            &mut self.ledger.wallet(deal.buyer_wallet).await?,
            &mut self.ledger.wallet(deal.seller_wallet).await?,
            deposit,
            PAYMENT,
            id,
            &format!("Reservation deposit: {}", deal.house.title),
        )
        .await?;
        changes.put_order(order.clone());
        self.ledger.store().commit(changes).await?;

        info!(order = %id, house = house_id.0, %deposit, "house reserved");
        Ok(order)
    }

    /// Buyer returns a PAID order; the full amount goes back seller to buyer.
    #[instrument(skip(self, reason))]
    pub async fn request_return(
        &self,
        order_id: OrderId,
        requester: &str,
        reason: Option<&str>,
    ) -> Result<Order> {
        let account = self.ledger.account(requester).await?;
        let order = self.order(order_id).await?;
        if order.buyer != account.id {
            return Err(LedgerError::Unauthorized(account.username));
        }
        let (buyer_wallet, seller_wallet) = self.wallets(&order).await?;

        let _locks = self
            .ledger
            .locks()
            .acquire([
                LockKey::House(order.house_id),
                LockKey::Order(order_id),
                LockKey::Wallet(buyer_wallet),
                LockKey::Wallet(seller_wallet),
            ])
            .await;

        let mut order = self.order(order_id).await?;
        let reason = self.reason_or_default(reason);
        order.mark_returned(reason.clone())?;

        let mut changes = Changeset::new();
        self.stage_settlement(
            &mut changes,
            &mut self.ledger.wallet(seller_wallet).await?,
            &mut self.ledger.wallet(buyer_wallet).await?,
            order.amount,
            REFUND,
            order_id,
            &format!("Refund for order {order_id}: {reason}"),
        )
        .await?;
        changes.put_order(order.clone());
        self.ledger.store().commit(changes).await?;

        info!(order = %order_id, amount = %order.amount, "order returned");
        Ok(order)
    }

    /// Either party calls off a RESERVED or PAID order; whatever was paid is refunded.
    #[instrument(skip(self, reason))]
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        requester: &str,
        reason: Option<&str>,
    ) -> Result<Order> {
        let account = self.ledger.account(requester).await?;
        let order = self.order(order_id).await?;
        if !order.is_participant(account.id) {
            return Err(LedgerError::Unauthorized(account.username));
        }
        let (buyer_wallet, seller_wallet) = self.wallets(&order).await?;

        let _locks = self
            .ledger
            .locks()
            .acquire([
                LockKey::House(order.house_id),
                LockKey::Order(order_id),
                LockKey::Wallet(buyer_wallet),
                LockKey::Wallet(seller_wallet),
            ])
            .await;

        let mut order = self.order(order_id).await?;
        let refund = order.settled_amount;
        let reason = self.reason_or_default(reason);
        order.mark_cancelled(reason.clone())?;

        let mut changes = Changeset::new();
        if refund > Decimal::ZERO {
            self.stage_settlement(
                &mut changes,
                &mut self.ledger.wallet(seller_wallet).await?,
                &mut self.ledger.wallet(buyer_wallet).await?,
                Amount::new(refund)?,
                REFUND,
                order_id,
                &format!("Refund for cancelled order {order_id}: {reason}"),
            )
            .await?;
        }
        changes.put_order(order.clone());
        self.ledger.store().commit(changes).await?;

        info!(order = %order_id, %refund, by = %account.username, "order cancelled");
        Ok(order)
    }

    /// Moves the progress track forward; buyer or seller only.
    #[instrument(skip(self))]
    pub async fn advance_progress(
        &self,
        order_id: OrderId,
        requester: &str,
        stage: ProgressStage,
    ) -> Result<Order> {
        let account = self.ledger.account(requester).await?;
        let order = self.order(order_id).await?;
        if !order.is_participant(account.id) {
            return Err(LedgerError::Unauthorized(account.username));
        }

        let _locks = self
            .ledger
            .locks()
            .acquire([LockKey::House(order.house_id), LockKey::Order(order_id)])
            .await;

        let mut order = self.order(order_id).await?;
        if order.advance_to(stage)? {
            let mut changes = Changeset::new();
            changes.put_order(order.clone());
            self.ledger.store().commit(changes).await?;
            info!(order = %order_id, ?stage, "order progress advanced");
        }
        Ok(order)
    }

    /// Seller proposes a viewing time for a RESERVED or PAID order.
    #[instrument(skip(self, message))]
    pub async fn schedule_viewing(
        &self,
        order_id: OrderId,
        requester: &str,
        time: DateTime<Utc>,
        message: Option<&str>,
    ) -> Result<Order> {
        let account = self.ledger.account(requester).await?;
        let order = self.order(order_id).await?;
        if order.seller != account.id {
            return Err(LedgerError::Unauthorized(account.username));
        }
        if time <= Utc::now() {
            return Err(LedgerError::InvalidInput(format!(
                "viewing time {time} is in the past"
            )));
        }

        let _locks = self
            .ledger
            .locks()
            .acquire([LockKey::House(order.house_id), LockKey::Order(order_id)])
            .await;

        let mut order = self.order(order_id).await?;
        let message = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        order.schedule_viewing(time, message)?;

        let mut changes = Changeset::new();
        changes.put_order(order.clone());
        self.ledger.store().commit(changes).await?;

        info!(order = %order_id, %time, "viewing scheduled");
        Ok(order)
    }

    /// Admin decision on releasing the seller's funds.
    ///
    /// APPROVE marks the order reviewed, which unlocks `FundsReleased`. REJECT
    /// changes nothing and the order stays in the review queue.
    #[instrument(skip(self))]
    pub async fn admin_review_payout(
        &self,
        order_id: OrderId,
        decision: ReviewDecision,
        requester: &str,
    ) -> Result<Order> {
        let admin = self.gate.authorize(requester).await?;
        let order = self.order(order_id).await?;

        let _locks = self
            .ledger
            .locks()
            .acquire([LockKey::House(order.house_id), LockKey::Order(order_id)])
            .await;

        let mut order = self.order(order_id).await?;
        match decision {
            ReviewDecision::Approve => {
                order.mark_admin_reviewed(&admin.username)?;
                let mut changes = Changeset::new();
                changes.put_order(order.clone());
                self.ledger.store().commit(changes).await?;
                info!(order = %order_id, reviewer = %admin.username, "payout approved");
            }
            ReviewDecision::Reject => {
                if order.status != OrderStatus::Paid || order.admin_reviewed {
                    return Err(LedgerError::InvalidState(format!(
                        "order {order_id} is not awaiting payout review"
                    )));
                }
                info!(order = %order_id, reviewer = %admin.username, "payout rejected");
            }
        }
        Ok(order)
    }

    /// Orders the account bought or sold, newest first.
    pub async fn list_orders_for(&self, username: &str) -> Result<Vec<Order>> {
        let account = self.ledger.account(username).await?;
        let mut orders = self.ledger.store().orders_for_account(account.id).await?;
        orders.reverse();
        Ok(orders)
    }

    /// PAID orders still waiting for payout review, oldest first. Admin only.
    pub async fn list_pending_payout_reviews(&self, requester: &str) -> Result<Vec<Order>> {
        self.gate.authorize(requester).await?;
        let orders = self.ledger.store().orders_by_status(OrderStatus::Paid).await?;
        Ok(orders.into_iter().filter(|o| !o.admin_reviewed).collect())
    }

    pub async fn order(&self, id: OrderId) -> Result<Order> {
        self.ledger
            .store()
            .order(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("order", id.0))
    }

    async fn deal(&self, house_id: HouseId, buyer: &str) -> Result<Deal> {
        let house = self
            .houses
            .house(house_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("house", house_id.0))?;
        if !house.is_tradable() {
            return Err(LedgerError::InvalidState(format!(
                "house {} is not listed for sale",
                house_id.0
            )));
        }
        let seller_name = house.seller().ok_or_else(|| {
            LedgerError::InvalidState(format!("house {} has no seller", house_id.0))
        })?;
        let price = Amount::new(house.price)?;

        let buyer = self.ledger.account(buyer).await?;
        let seller = self.ledger.account(seller_name).await?;
        if buyer.id == seller.id {
            return Err(LedgerError::SelfTransactionNotAllowed);
        }
        for party in [&buyer, &seller] {
            if party.blacklisted {
                return Err(AccessDenied::ParticipantBlacklisted(party.username.clone()).into());
            }
        }
        if !buyer.real_name_verified {
            return Err(AccessDenied::NotVerified(buyer.username.clone()).into());
        }

        let buyer_wallet = self.ledger.ensure_wallet(&buyer).await?.id;
        let seller_wallet = self.ledger.ensure_wallet(&seller).await?.id;
        Ok(Deal {
            house,
            price,
            seller: seller.id,
            buyer,
            buyer_wallet,
            seller_wallet,
        })
    }

    /// The RESERVED or PAID order of a house, if any. Callers hold the house lock.
    async fn open_order(&self, house_id: HouseId) -> Result<Option<Order>> {
        let orders = self.ledger.store().orders_for_house(house_id).await?;
        Ok(orders.into_iter().find(|o| o.status.is_open()))
    }

    async fn wallets(&self, order: &Order) -> Result<(WalletId, WalletId)> {
        let buyer = self.ledger.wallet_of(order.buyer).await?;
        let seller = self.ledger.wallet_of(order.seller).await?;
        Ok((buyer.id, seller.id))
    }

    fn reason_or_default(&self, reason: Option<&str>) -> String {
        reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.settings.default_return_reason.clone())
    }

    /// Another buyer's RESERVED order on the house, with that buyer's wallet.
    async fn reservation_holder(
        &self,
        house_id: HouseId,
        buyer: AccountId,
    ) -> Result<Option<(OrderId, WalletId)>> {
        match self.open_order(house_id).await? {
            Some(order) if order.status == OrderStatus::Reserved && order.buyer != buyer => {
                let wallet = self.ledger.wallet_of(order.buyer).await?;
                Ok(Some((order.id, wallet.id)))
            }
            _ => Ok(None),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn stage_settlement(
        &self,
        changes: &mut Changeset,
        from: &mut Wallet,
        to: &mut Wallet,
        amount: Amount,
        types: (TransactionType, TransactionType),
        order: OrderId,
        description: &str,
    ) -> Result<()> {
        self.ledger
            .stage_transfer(
                changes,
                from,
                to,
                amount,
                types,
                Some(&order_reference(order)),
                description,
            )
            .await?;
        Ok(())
    }
}
