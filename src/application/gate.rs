use crate::domain::account::Account;
use crate::domain::ports::AccountDirectoryBox;
use crate::error::{AccessDenied, LedgerError, Result};
use tracing::warn;

/// Authorizes privileged operations.
///
/// Checks run in a fixed order and the first failure wins: blank username,
/// unknown account, non-admin role, blacklisted admin.
#[derive(Clone)]
pub struct AdminReviewGate {
    directory: AccountDirectoryBox,
}

impl AdminReviewGate {
    pub fn new(directory: AccountDirectoryBox) -> Self {
        Self { directory }
    }

    pub async fn authorize(&self, requester: &str) -> Result<Account> {
        let denied = |reason: AccessDenied| {
            warn!(requester, %reason, "admin gate refused requester");
            LedgerError::Forbidden(reason)
        };

        let username = requester.trim();
        if username.is_empty() {
            return Err(denied(AccessDenied::BlankRequester));
        }
        let account = self
            .directory
            .lookup(username)
            .await?
            .ok_or_else(|| denied(AccessDenied::RequesterNotFound(username.to_string())))?;
        if !account.is_admin() {
            return Err(denied(AccessDenied::NotAdmin(account.username)));
        }
        if account.blacklisted {
            return Err(denied(AccessDenied::RequesterBlacklisted(account.username)));
        }
        Ok(account)
    }
}
