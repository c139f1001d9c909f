use miette::Diagnostic;
use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Reason an actor was refused a privileged or participant-restricted operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessDenied {
    #[error("requester username is blank")]
    BlankRequester,
    #[error("requester `{0}` does not exist")]
    RequesterNotFound(String),
    #[error("`{0}` is not an administrator")]
    NotAdmin(String),
    #[error("administrator `{0}` is blacklisted")]
    RequesterBlacklisted(String),
    #[error("participant `{0}` is blacklisted")]
    ParticipantBlacklisted(String),
    #[error("buyer `{0}` has not completed real-name verification")]
    NotVerified(String),
}

/// Stable, message-independent classification of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidAmount,
    InsufficientFunds,
    AccountNotFound,
    NotFound,
    SelfTransactionNotAllowed,
    InvalidState,
    InvalidInput,
    Unauthorized,
    Forbidden,
    BlankRequester,
    RequesterNotFound,
    NotAdmin,
    RequesterBlacklisted,
    Storage,
    Config,
}

#[derive(Error, Debug, Diagnostic)]
pub enum LedgerError {
    #[error("amount must be positive and fit DECIMAL(18,2), got {0}")]
    #[diagnostic(code(ledger::invalid_amount))]
    InvalidAmount(Decimal),

    #[error("insufficient funds in wallet {wallet}: balance {balance}, requested {requested}")]
    #[diagnostic(code(ledger::insufficient_funds))]
    InsufficientFunds {
        wallet: u64,
        balance: Decimal,
        requested: Decimal,
    },

    #[error("wallet {wallet} cannot hold more: balance {balance}, requested {requested}")]
    #[diagnostic(code(ledger::balance_limit))]
    BalanceLimitExceeded {
        wallet: u64,
        balance: Decimal,
        requested: Decimal,
    },

    #[error("account `{0}` not found")]
    #[diagnostic(code(ledger::account_not_found))]
    AccountNotFound(String),

    #[error("{entity} {id} not found")]
    #[diagnostic(code(ledger::not_found))]
    NotFound { entity: &'static str, id: u64 },

    #[error("buyer and seller are the same account")]
    #[diagnostic(code(ledger::self_transaction))]
    SelfTransactionNotAllowed,

    #[error("invalid state: {0}")]
    #[diagnostic(code(ledger::invalid_state))]
    InvalidState(String),

    #[error("invalid input: {0}")]
    #[diagnostic(code(ledger::invalid_input))]
    InvalidInput(String),

    #[error("`{0}` is not a participant of this order")]
    #[diagnostic(code(ledger::unauthorized))]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    #[diagnostic(code(ledger::forbidden))]
    Forbidden(#[from] AccessDenied),

    #[error("storage error: {0}")]
    #[diagnostic(code(ledger::storage))]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("configuration error: {0}")]
    #[diagnostic(code(ledger::config))]
    Config(String),

    #[error("CSV error: {0}")]
    #[diagnostic(code(ledger::csv))]
    Csv(#[from] csv::Error),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAmount(_) => ErrorKind::InvalidAmount,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::AccountNotFound(_) => ErrorKind::AccountNotFound,
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::SelfTransactionNotAllowed => ErrorKind::SelfTransactionNotAllowed,
            LedgerError::InvalidState(_) | LedgerError::BalanceLimitExceeded { .. } => {
                ErrorKind::InvalidState
            }
            LedgerError::InvalidInput(_) | LedgerError::Csv(_) => ErrorKind::InvalidInput,
            LedgerError::Unauthorized(_) => ErrorKind::Unauthorized,
            LedgerError::Forbidden(denied) => match denied {
                AccessDenied::BlankRequester => ErrorKind::BlankRequester,
                AccessDenied::RequesterNotFound(_) => ErrorKind::RequesterNotFound,
                AccessDenied::NotAdmin(_) => ErrorKind::NotAdmin,
                AccessDenied::RequesterBlacklisted(_) => ErrorKind::RequesterBlacklisted,
                AccessDenied::ParticipantBlacklisted(_) | AccessDenied::NotVerified(_) => {
                    ErrorKind::Forbidden
                }
            },
            LedgerError::Storage(_) => ErrorKind::Storage,
            LedgerError::Config(_) => ErrorKind::Config,
        }
    }

    /// True for every refusal raised by the admin gate or a participant check.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, LedgerError::Forbidden(_))
    }

    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        LedgerError::Storage(Box::new(err))
    }

    pub(crate) fn not_found(entity: &'static str, id: u64) -> Self {
        LedgerError::NotFound { entity, id }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::storage(err)
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LedgerError {
    fn from(err: rocksdb::Error) -> Self {
        LedgerError::storage(err)
    }
}
