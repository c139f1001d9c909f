use crate::application::gate::AdminReviewGate;
use crate::application::ledger::LedgerService;
use crate::application::locks::LockKey;
use crate::domain::changeset::Changeset;
use crate::domain::money::Amount;
use crate::domain::ports::Sequence;
use crate::domain::topup::{ReviewDecision, TopUpId, TopUpRequest, TopUpStatus};
use crate::domain::transaction::{TransactionType, normalize_reference};
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use tracing::{info, instrument};

/// Credit requests that only take effect once an administrator approves them.
#[derive(Clone)]
pub struct TopUpRequestWorkflow {
    ledger: LedgerService,
    gate: AdminReviewGate,
}

impl TopUpRequestWorkflow {
    pub fn new(ledger: LedgerService, gate: AdminReviewGate) -> Self {
        Self { ledger, gate }
    }

    /// Queues a PENDING request. The balance does not change until approval.
    #[instrument(skip(self, reference))]
    pub async fn submit(
        &self,
        username: &str,
        amount: Decimal,
        reference: Option<&str>,
    ) -> Result<TopUpRequest> {
        let amount = Amount::new(amount)?;
        let account = self.ledger.account(username).await?;
        // the wallet exists before review so approval only has to lock it
        self.ledger.ensure_wallet(&account).await?;

        let id = TopUpId(self.ledger.store().next_id(Sequence::TopUp).await?);
        let request = TopUpRequest::new(id, account.id, amount, normalize_reference(reference));

        let mut changes = Changeset::new();
        changes.put_topup(request.clone());
        self.ledger.store().commit(changes).await?;

        info!(request = id.0, account = %account.id, %amount, "top-up request submitted");
        Ok(request)
    }

    /// PENDING requests, oldest first. Admin only.
    pub async fn list_pending(&self, requester: &str) -> Result<Vec<TopUpRequest>> {
        self.gate.authorize(requester).await?;
        self.ledger.store().topups_by_status(TopUpStatus::Pending).await
    }

    /// Decides a PENDING request.
    ///
    /// On APPROVE the TOP_UP credit and the status change commit together; if
    /// the credit cannot be applied the request stays PENDING.
    #[instrument(skip(self))]
    pub async fn review(
        &self,
        id: TopUpId,
        decision: ReviewDecision,
        requester: &str,
    ) -> Result<TopUpRequest> {
        let admin = self.gate.authorize(requester).await?;

        let request = self.request(id).await?;
        let wallet = self.ledger.wallet_of(request.requester).await?;

        let _locks = self
            .ledger
            .locks()
            .acquire([LockKey::TopUp(id), LockKey::Wallet(wallet.id)])
            .await;

        let mut request = self.request(id).await?;
        request.mark_reviewed(decision, &admin.username)?;

        let mut changes = Changeset::new();
        if decision == ReviewDecision::Approve {
            let mut wallet = self.ledger.wallet(wallet.id).await?;
            let description = format!("Top-up approved by {}", admin.username);
            self.ledger
                .stage_credit(
                    &mut changes,
                    &mut wallet,
                    request.amount,
                    TransactionType::TopUp,
                    request.reference.as_deref(),
                    &description,
                )
                .await?;
        }
        changes.put_topup(request.clone());
        self.ledger.store().commit(changes).await?;

        info!(
            request = id.0,
            status = ?request.status,
            reviewer = %admin.username,
            "top-up request reviewed"
        );
        Ok(request)
    }

    async fn request(&self, id: TopUpId) -> Result<TopUpRequest> {
        self.ledger
            .store()
            .topup(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("top-up request", id.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ledger::RandomVirtualPorts;
    use crate::application::locks::LockManager;
    use crate::domain::account::Account;
    use crate::domain::money::{Balance, MAX_VALUE};
    use crate::error::ErrorKind;
    use crate::infrastructure::in_memory::{InMemoryAccountDirectory, InMemoryLedgerStore};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn workflow() -> TopUpRequestWorkflow {
        let directory = Arc::new(InMemoryAccountDirectory::with_accounts([
            Account::admin(1, "root"),
            Account::new(2, "alice"),
            Account::new(3, "bob"),
        ]));
        let ledger = LedgerService::new(
            Arc::new(InMemoryLedgerStore::new()),
            directory.clone(),
            Arc::new(LockManager::new()),
            Arc::new(RandomVirtualPorts::default()),
        );
        TopUpRequestWorkflow::new(ledger, AdminReviewGate::new(directory))
    }

    async fn balance(workflow: &TopUpRequestWorkflow, username: &str) -> Balance {
        workflow.ledger.wallet_for(username).await.unwrap().balance
    }

    #[tokio::test]
    async fn test_submit_leaves_balance_untouched() {
        let workflow = workflow();
        let request = workflow.submit("alice", dec!(25.00), Some("R1")).await.unwrap();
        assert!(request.is_pending());
        assert_eq!(request.reference.as_deref(), Some("R1"));
        assert_eq!(balance(&workflow, "alice").await, Balance::ZERO);
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_amount() {
        let workflow = workflow();
        let err = workflow.submit("alice", dec!(0), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAmount);
        let pending = workflow.list_pending("root").await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_pending_is_fifo() {
        let workflow = workflow();
        let first = workflow.submit("bob", dec!(1.00), None).await.unwrap();
        let second = workflow.submit("alice", dec!(2.00), None).await.unwrap();

        let pending = workflow.list_pending("root").await.unwrap();
        let ids: Vec<TopUpId> = pending.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn test_list_pending_is_admin_only() {
        let workflow = workflow();
        let err = workflow.list_pending("alice").await.unwrap_err();
        assert!(err.is_forbidden());
    }

    #[tokio::test]
    async fn test_reject_has_no_ledger_effect() {
        let workflow = workflow();
        let request = workflow.submit("alice", dec!(40.00), None).await.unwrap();

        let reviewed = workflow
            .review(request.id, ReviewDecision::Reject, "root")
            .await
            .unwrap();
        assert_eq!(reviewed.status, TopUpStatus::Rejected);
        assert_eq!(reviewed.reviewed_by.as_deref(), Some("root"));

        let wallet = workflow.ledger.wallet_for("alice").await.unwrap();
        assert_eq!(wallet.balance, Balance::ZERO);
        assert!(workflow.ledger.transactions(wallet.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_review_fails_and_credits_once() {
        let workflow = workflow();
        let request = workflow.submit("alice", dec!(40.00), None).await.unwrap();
        workflow
            .review(request.id, ReviewDecision::Approve, "root")
            .await
            .unwrap();

        for decision in [ReviewDecision::Approve, ReviewDecision::Reject] {
            let err = workflow.review(request.id, decision, "root").await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidState);
        }
        assert_eq!(balance(&workflow, "alice").await, Balance::new(dec!(40.00)));
    }

    #[tokio::test]
    async fn test_failed_credit_leaves_request_pending() {
        let workflow = workflow();
        let fill = workflow.submit("alice", MAX_VALUE, None).await.unwrap();
        workflow
            .review(fill.id, ReviewDecision::Approve, "root")
            .await
            .unwrap();
        let extra = workflow.submit("alice", dec!(0.01), Some("R2")).await.unwrap();

        let err = workflow
            .review(extra.id, ReviewDecision::Approve, "root")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let stored = workflow.ledger.store().topup(extra.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TopUpStatus::Pending);
        assert_eq!(stored.reviewed_by, None);
        let wallet = workflow.ledger.wallet_for("alice").await.unwrap();
        assert_eq!(wallet.balance, Balance::new(MAX_VALUE));
        assert_eq!(workflow.ledger.transactions(wallet.id).await.unwrap().len(), 1);

        // still reviewable: rejecting it works
        let rejected = workflow
            .review(extra.id, ReviewDecision::Reject, "root")
            .await
            .unwrap();
        assert_eq!(rejected.status, TopUpStatus::Rejected);
    }

    #[tokio::test]
    async fn test_unknown_request() {
        let workflow = workflow();
        let err = workflow
            .review(TopUpId(42), ReviewDecision::Approve, "root")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_gate_runs_before_lookup() {
        let workflow = workflow();
        let err = workflow
            .review(TopUpId(42), ReviewDecision::Approve, "bob")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAdmin);
    }
}
