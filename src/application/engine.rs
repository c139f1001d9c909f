use crate::application::gate::AdminReviewGate;
use crate::application::ledger::{
    LedgerService, RandomVirtualPorts, Transfer, VirtualPortGenerator,
};
use crate::application::locks::LockManager;
use crate::application::orders::{OrderSettings, OrderStateMachine};
use crate::application::topup::TopUpRequestWorkflow;
use crate::domain::house::HouseId;
use crate::domain::money::Balance;
use crate::domain::order::{Order, OrderId, PaymentMethod, ProgressStage};
use crate::domain::ports::{AccountDirectoryBox, HouseCatalogBox, LedgerStoreBox};
use crate::domain::topup::{ReviewDecision, TopUpId, TopUpRequest};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// One boundary request, already parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SubmitTopUp {
        username: String,
        amount: Decimal,
        reference: Option<String>,
    },
    ReviewTopUp {
        request: TopUpId,
        decision: ReviewDecision,
        requester: String,
    },
    Transfer {
        from: String,
        to: String,
        amount: Decimal,
        reference: Option<String>,
        description: String,
    },
    CreateOrder {
        house: HouseId,
        buyer: String,
        method: PaymentMethod,
        card_number: Option<String>,
    },
    ReserveHouse {
        house: HouseId,
        buyer: String,
    },
    RequestReturn {
        order: OrderId,
        requester: String,
        reason: Option<String>,
    },
    CancelOrder {
        order: OrderId,
        requester: String,
        reason: Option<String>,
    },
    AdvanceProgress {
        order: OrderId,
        requester: String,
        stage: ProgressStage,
    },
    ScheduleViewing {
        order: OrderId,
        requester: String,
        time: DateTime<Utc>,
        message: Option<String>,
    },
    ReviewPayout {
        order: OrderId,
        decision: ReviewDecision,
        requester: String,
    },
}

/// What a successfully executed [`Command`] produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    TopUp(TopUpRequest),
    Transfer(Transfer),
    Order(Order),
}

/// One line of the final wallet report.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletRow {
    pub owner: String,
    pub virtual_port: String,
    pub balance: Balance,
}

/// Wires the services over shared storage and collaborators.
///
/// All services share one [`LockManager`], so operations issued concurrently
/// through the same engine serialize on the wallets, houses and requests they
/// touch.
#[derive(Clone)]
pub struct EscrowEngine {
    ledger: LedgerService,
    topups: TopUpRequestWorkflow,
    orders: OrderStateMachine,
}

impl EscrowEngine {
    pub fn new(
        store: LedgerStoreBox,
        directory: AccountDirectoryBox,
        houses: HouseCatalogBox,
        ports: Arc<dyn VirtualPortGenerator>,
        settings: OrderSettings,
    ) -> Self {
        let gate = AdminReviewGate::new(directory.clone());
        let ledger = LedgerService::new(store, directory, Arc::new(LockManager::new()), ports);
        let topups = TopUpRequestWorkflow::new(ledger.clone(), gate.clone());
        let orders = OrderStateMachine::new(ledger.clone(), houses, gate, settings);
        Self {
            ledger,
            topups,
            orders,
        }
    }

    /// Random `VP-` ports and default order settings.
    pub fn with_defaults(
        store: LedgerStoreBox,
        directory: AccountDirectoryBox,
        houses: HouseCatalogBox,
    ) -> Self {
        Self::new(
            store,
            directory,
            houses,
            Arc::new(RandomVirtualPorts::default()),
            OrderSettings::default(),
        )
    }

    pub fn ledger(&self) -> &LedgerService {
        &self.ledger
    }

    pub fn topups(&self) -> &TopUpRequestWorkflow {
        &self.topups
    }

    pub fn orders(&self) -> &OrderStateMachine {
        &self.orders
    }

    pub async fn execute(&self, command: Command) -> Result<Outcome> {
        debug!(?command, "executing command");
        match command {
            Command::SubmitTopUp {
                username,
                amount,
                reference,
            } => self
                .topups
                .submit(&username, amount, reference.as_deref())
                .await
                .map(Outcome::TopUp),
            Command::ReviewTopUp {
                request,
                decision,
                requester,
            } => self
                .topups
                .review(request, decision, &requester)
                .await
                .map(Outcome::TopUp),
            Command::Transfer {
                from,
                to,
                amount,
                reference,
                description,
            } => {
                let from = self.ledger.wallet_for(&from).await?;
                let to = self.ledger.wallet_for(&to).await?;
                self.ledger
                    .transfer(from.id, to.id, amount, reference.as_deref(), &description)
                    .await
                    .map(Outcome::Transfer)
            }
            Command::CreateOrder {
                house,
                buyer,
                method,
                card_number,
            } => self
                .orders
                .create_order(house, &buyer, method, card_number.as_deref())
                .await
                .map(Outcome::Order),
            Command::ReserveHouse { house, buyer } => self
                .orders
                .reserve_house(house, &buyer)
                .await
                .map(Outcome::Order),
            Command::RequestReturn {
                order,
                requester,
                reason,
            } => self
                .orders
                .request_return(order, &requester, reason.as_deref())
                .await
                .map(Outcome::Order),
            Command::CancelOrder {
                order,
                requester,
                reason,
            } => self
                .orders
                .cancel_order(order, &requester, reason.as_deref())
                .await
                .map(Outcome::Order),
            Command::AdvanceProgress {
                order,
                requester,
                stage,
            } => self
                .orders
                .advance_progress(order, &requester, stage)
                .await
                .map(Outcome::Order),
            Command::ScheduleViewing {
                order,
                requester,
                time,
                message,
            } => self
                .orders
                .schedule_viewing(order, &requester, time, message.as_deref())
                .await
                .map(Outcome::Order),
            Command::ReviewPayout {
                order,
                decision,
                requester,
            } => self
                .orders
                .admin_review_payout(order, decision, &requester)
                .await
                .map(Outcome::Order),
        }
    }

    /// Every wallet with its owner's username, in wallet id order.
    pub async fn wallet_report(&self) -> Result<Vec<WalletRow>> {
        let wallets = self.ledger.store().all_wallets().await?;
        let mut rows = Vec::with_capacity(wallets.len());
        for wallet in wallets {
            let owner = match self.ledger.directory().get(wallet.owner).await? {
                Some(account) => account.username,
                None => wallet.owner.to_string(),
            };
            rows.push(WalletRow {
                owner,
                virtual_port: wallet.virtual_port,
                balance: wallet.balance,
            });
        }
        Ok(rows)
    }
}
