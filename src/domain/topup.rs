use crate::domain::account::AccountId;
use crate::domain::money::Amount;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopUpId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TopUpStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl FromStr for ReviewDecision {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "APPROVE" => Ok(ReviewDecision::Approve),
            "REJECT" => Ok(ReviewDecision::Reject),
            other => Err(LedgerError::InvalidInput(format!(
                "unknown review decision `{other}`"
            ))),
        }
    }
}

/// A credit request waiting for an administrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopUpRequest {
    pub id: TopUpId,
    pub requester: AccountId,
    pub amount: Amount,
    pub reference: Option<String>,
    pub status: TopUpStatus,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TopUpRequest {
    pub fn new(id: TopUpId, requester: AccountId, amount: Amount, reference: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            requester,
            amount,
            reference,
            status: TopUpStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TopUpStatus::Pending
    }

    /// Records the decision. A request is reviewed at most once.
    pub fn mark_reviewed(&mut self, decision: ReviewDecision, reviewer: &str) -> Result<(), LedgerError> {
        if !self.is_pending() {
            return Err(LedgerError::InvalidState(format!(
                "top-up request {} was already reviewed ({:?})",
                self.id.0, self.status
            )));
        }
        let now = Utc::now();
        self.status = match decision {
            ReviewDecision::Approve => TopUpStatus::Approved,
            ReviewDecision::Reject => TopUpStatus::Rejected,
        };
        self.reviewed_by = Some(reviewer.to_string());
        self.reviewed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}
