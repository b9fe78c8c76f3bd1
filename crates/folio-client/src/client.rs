//! High-level client facade.
//!
//! Ties the orchestrator, allowance gate, aggregator, and watcher together
//! behind one handle. All previews are advisory: they are computed from
//! reads taken at call time and the ledger re-checks everything at
//! execution.

use std::sync::Arc;

use folio_core::{
    allocate, preview_match, Address, Amount, MatchPreview, Note, NoteId, PortfolioSnapshot,
    PreviewError, RepaymentError, RepaymentSplit, Tranche, TrancheId,
};
use futures::stream::Stream;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

use crate::action::{ActionError, ActionEvent, ActionRequest, Invalidation};
use crate::aggregate::{AggregateError, NoteAggregator};
use crate::allowance::GrantPolicy;
use crate::config::{ClientConfig, ConfigError};
use crate::orchestrator::{ActionReceipt, TransactionOrchestrator};
use crate::provider::{LedgerError, LedgerProvider, ReadRetryPolicy};
use crate::watcher::PortfolioWatcher;

/// Failures while answering a read-only query.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueryError {
    /// A ledger read failed after retries.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The preview inputs could not be combined.
    #[error(transparent)]
    Preview(#[from] PreviewError),

    /// The hypothetical payment exceeds the note's outstanding value.
    #[error(transparent)]
    Repayment(#[from] RepaymentError),
}

/// Client handle over one ledger provider.
///
/// Cheap to clone; all clones share the orchestrator's concurrency slots
/// and event channels.
#[derive(Clone)]
pub struct FolioClient {
    provider: Arc<dyn LedgerProvider>,
    orchestrator: Arc<TransactionOrchestrator>,
    aggregator: NoteAggregator,
    retry: ReadRetryPolicy,
    poll_interval: std::time::Duration,
}

impl FolioClient {
    /// Builds a client from a provider and validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration fails validation.
    pub fn new(
        provider: Arc<dyn LedgerProvider>,
        config: &ClientConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let spender = config.ledger_address()?;
        let retry = config.read_retry();
        let orchestrator = Arc::new(TransactionOrchestrator::new(
            provider.clone(),
            spender,
            retry,
            config.confirmation_poll(),
        ));
        let aggregator = NoteAggregator::new(provider.clone(), retry);
        Ok(Self {
            provider,
            orchestrator,
            aggregator,
            retry,
            poll_interval: config.poll_interval(),
        })
    }

    // ---- writes -----------------------------------------------------------

    /// Deposits into a tranche, chaining a grant first when needed.
    ///
    /// # Errors
    ///
    /// See [`TransactionOrchestrator::execute`].
    pub async fn deposit(
        &self,
        owner: Address,
        tranche: TrancheId,
        amount: Amount,
    ) -> Result<ActionReceipt, ActionError> {
        self.orchestrator
            .execute(ActionRequest::Deposit {
                owner,
                tranche,
                amount,
            })
            .await
    }

    /// Repays a note, chaining a grant first when needed.
    ///
    /// # Errors
    ///
    /// See [`TransactionOrchestrator::execute`].
    pub async fn repay(
        &self,
        owner: Address,
        note: NoteId,
        amount: Amount,
    ) -> Result<ActionReceipt, ActionError> {
        self.orchestrator
            .execute(ActionRequest::Repay {
                owner,
                note,
                amount,
            })
            .await
    }

    /// Transfers ownership of a note.
    ///
    /// # Errors
    ///
    /// See [`TransactionOrchestrator::execute`].
    pub async fn transfer(
        &self,
        owner: Address,
        note: NoteId,
        recipient: Address,
    ) -> Result<ActionReceipt, ActionError> {
        self.orchestrator
            .execute(ActionRequest::Transfer {
                owner,
                note,
                recipient,
            })
            .await
    }

    /// Issues a standalone grant to `spender`.
    ///
    /// # Errors
    ///
    /// See [`TransactionOrchestrator::execute`].
    pub async fn approve(
        &self,
        owner: Address,
        spender: Address,
        amount: Amount,
        policy: GrantPolicy,
    ) -> Result<ActionReceipt, ActionError> {
        self.orchestrator
            .execute(ActionRequest::Approve {
                owner,
                spender,
                amount,
                policy,
            })
            .await
    }

    // ---- reads ------------------------------------------------------------

    /// Returns the ledger's active tranche, if one is open.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Ledger` if the read fails after retries.
    pub async fn active_tranche(&self) -> Result<Option<Tranche>, QueryError> {
        Ok(self.retry.run(|| self.provider.active_tranche()).await?)
    }

    /// Returns `owner`'s spendable balance.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Ledger` if the read fails after retries.
    pub async fn balance(&self, owner: &Address) -> Result<Amount, QueryError> {
        Ok(self.retry.run(|| self.provider.balance(owner)).await?)
    }

    /// Previews the matched-funds outcome of a hypothetical deposit.
    ///
    /// Advisory: computed from reads taken now, mirroring the ledger's own
    /// arithmetic exactly. The deposit itself is settled by the ledger.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Ledger` if the inputs cannot be read, or
    /// `QueryError::Preview` if they cannot be combined.
    pub async fn deposit_preview(
        &self,
        tranche: TrancheId,
        candidate: Amount,
    ) -> Result<MatchPreview, QueryError> {
        let inputs = self
            .retry
            .run(|| self.provider.match_inputs(tranche))
            .await?;
        let preview = preview_match(candidate, &inputs)?;
        debug!(%tranche, candidate = %candidate, matched = %preview.match_amount, "deposit preview");
        Ok(preview)
    }

    /// Previews how a hypothetical payment splits across interest and
    /// principal, using the note's figures as read now.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Ledger` if the note cannot be read, or
    /// `QueryError::Repayment` if the payment exceeds outstanding value.
    pub async fn repayment_preview(
        &self,
        note: NoteId,
        payment: Amount,
    ) -> Result<RepaymentSplit, QueryError> {
        let detail = self.retry.run(|| self.provider.note(note)).await?;
        Ok(allocate(
            payment,
            detail.interest_owed(),
            detail.remaining_principal(),
        )?)
    }

    /// Streams the validated notes currently owned by `owner`.
    pub fn owned_notes(
        &self,
        owner: Address,
    ) -> impl Stream<Item = Result<Note, LedgerError>> + Send {
        self.aggregator.owned_notes(owner)
    }

    /// Reads `owner`'s full portfolio and reduces it to a snapshot.
    ///
    /// # Errors
    ///
    /// See [`NoteAggregator::snapshot`].
    pub async fn portfolio(&self, owner: &Address) -> Result<PortfolioSnapshot, AggregateError> {
        self.aggregator.snapshot(owner).await
    }

    // ---- background and events --------------------------------------------

    /// Spawns a background watcher keeping `owner`'s snapshot fresh.
    ///
    /// Refreshes on the configured interval and immediately after any of
    /// this client's actions confirms with a portfolio-relevant effect.
    #[must_use]
    pub fn watch_portfolio(&self, owner: Address) -> PortfolioWatcher {
        PortfolioWatcher::spawn(
            self.aggregator.clone(),
            owner,
            self.poll_interval,
            self.orchestrator.subscribe_invalidations(),
        )
    }

    /// Subscribes to exactly-once action state-transition events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<ActionEvent> {
        self.orchestrator.subscribe_events()
    }

    /// Subscribes to stale-read invalidation signals.
    #[must_use]
    pub fn subscribe_invalidations(&self) -> broadcast::Receiver<Invalidation> {
        self.orchestrator.subscribe_invalidations()
    }
}

#[cfg(test)]
mod tests {
    use folio_core::LimitingFactor;

    use super::*;
    use crate::memory::MemoryLedger;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn client(ledger: &Arc<MemoryLedger>) -> FolioClient {
        let mut config = ClientConfig::with_ledger_address(ledger.ledger_address().to_string());
        config.confirmation_poll_ms = 100;
        config.read_retry_delay_ms = 1;
        FolioClient::new(ledger.clone(), &config).unwrap()
    }

    #[tokio::test]
    async fn test_deposit_preview_reports_limiting_factor() {
        let ledger = Arc::new(MemoryLedger::new());
        let tranche = ledger.seed_tranche(Amount::from_units(1_000)).await;
        ledger
            .set_match_inputs(
                tranche,
                folio_core::MatchInputs {
                    remaining_match_capacity: Amount::from_units(150),
                    vault_available: Amount::from_units(1_000),
                    match_ratio_bps: 10_000,
                },
            )
            .await;
        let preview = client(&ledger)
            .deposit_preview(tranche, Amount::from_units(200))
            .await
            .unwrap();
        assert_eq!(preview.match_amount, Amount::from_units(150));
        assert_eq!(preview.limiting_factor, LimitingFactor::TrancheCapacity);
    }

    #[tokio::test]
    async fn test_repayment_preview_splits_interest_first() {
        let ledger = Arc::new(MemoryLedger::new());
        let owner = addr("0xowner");
        let note = ledger
            .seed_note(&owner, Amount::from_units(100), 500)
            .await;
        ledger.accrue_interest(note, Amount::from_units(2)).await;
        let split = client(&ledger)
            .repayment_preview(note, Amount::from_units(5))
            .await
            .unwrap();
        assert_eq!(split.interest_portion, Amount::from_units(2));
        assert_eq!(split.principal_portion, Amount::from_units(3));
    }

    #[tokio::test]
    async fn test_repayment_preview_rejects_overpayment() {
        let ledger = Arc::new(MemoryLedger::new());
        let owner = addr("0xowner");
        let note = ledger
            .seed_note(&owner, Amount::from_units(100), 500)
            .await;
        let err = client(&ledger)
            .repayment_preview(note, Amount::from_units(200))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QueryError::Repayment(RepaymentError::Overpayment { .. })
        ));
    }

    #[tokio::test]
    async fn test_active_tranche_round_trips() {
        let ledger = Arc::new(MemoryLedger::new());
        let id = ledger.seed_tranche(Amount::from_units(500)).await;
        let tranche = client(&ledger).active_tranche().await.unwrap().unwrap();
        assert_eq!(tranche.id(), id);
        assert_eq!(tranche.cap(), Amount::from_units(500));
    }
}
