//! Allowance gate: fresh-read grant decisions.
//!
//! The allowance is mutated by actors outside this client's control, so the
//! gate never answers from a cached value: every `needs_grant` decision is
//! backed by a read issued at decision time. After a grant confirms, the
//! orchestrator re-reads the allowance before proceeding with the funded
//! action.

use std::sync::Arc;

use folio_core::{Address, Amount, OperationHandle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::provider::{LedgerError, LedgerOperation, LedgerProvider, ReadRetryPolicy};

/// How large a grant to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantPolicy {
    /// Grant exactly the amount needed for the current action (default).
    Exact,
    /// Grant the ledger's unlimited-allowance sentinel.
    ///
    /// Explicit caller opt-in for a trusted collaborator; never chosen
    /// silently.
    Unlimited,
}

/// Decides whether a spending authorization suffices and issues grants.
#[derive(Clone)]
pub struct AllowanceGate {
    provider: Arc<dyn LedgerProvider>,
    retry: ReadRetryPolicy,
}

impl AllowanceGate {
    /// Builds a gate over a provider.
    #[must_use]
    pub fn new(provider: Arc<dyn LedgerProvider>, retry: ReadRetryPolicy) -> Self {
        Self { provider, retry }
    }

    /// Reads the current allowance fresh from the ledger.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError` if the read fails after retries.
    pub async fn current_allowance(
        &self,
        owner: &Address,
        spender: &Address,
    ) -> Result<Amount, LedgerError> {
        self.retry
            .run(|| self.provider.allowance(owner, spender))
            .await
    }

    /// Returns `true` iff the allowance read right now does not cover
    /// `amount`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError` if the read fails after retries.
    pub async fn needs_grant(
        &self,
        owner: &Address,
        spender: &Address,
        amount: Amount,
    ) -> Result<bool, LedgerError> {
        let current = self.current_allowance(owner, spender).await?;
        let needed = current < amount;
        debug!(%owner, %spender, current = %current, required = %amount, needed, "allowance check");
        Ok(needed)
    }

    /// Submits a grant write sized by `policy`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError` if submission fails. Never auto-retried.
    pub async fn grant(
        &self,
        owner: &Address,
        spender: &Address,
        amount: Amount,
        policy: GrantPolicy,
    ) -> Result<OperationHandle, LedgerError> {
        let granted = match policy {
            GrantPolicy::Exact => amount,
            GrantPolicy::Unlimited => Amount::MAX,
        };
        info!(%owner, %spender, amount = %granted, ?policy, "submitting grant");
        self.provider
            .submit(LedgerOperation::Grant {
                owner: owner.clone(),
                spender: spender.clone(),
                amount: granted,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLedger;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_needs_grant_tracks_fresh_allowance() {
        let ledger = Arc::new(MemoryLedger::new());
        let owner = addr("0xowner");
        let spender = ledger.ledger_address();
        ledger
            .set_allowance(&owner, &spender, Amount::from_raw(50))
            .await;

        let gate = AllowanceGate::new(ledger.clone(), ReadRetryPolicy::default());
        assert!(gate
            .needs_grant(&owner, &spender, Amount::from_raw(100))
            .await
            .unwrap());

        // A confirmed grant of 100 flips the fresh re-read.
        gate.grant(&owner, &spender, Amount::from_raw(100), GrantPolicy::Exact)
            .await
            .unwrap();
        assert_eq!(
            gate.current_allowance(&owner, &spender).await.unwrap(),
            Amount::from_raw(100)
        );
        assert!(!gate
            .needs_grant(&owner, &spender, Amount::from_raw(100))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_equal_allowance_is_sufficient() {
        let ledger = Arc::new(MemoryLedger::new());
        let owner = addr("0xowner");
        let spender = ledger.ledger_address();
        ledger
            .set_allowance(&owner, &spender, Amount::from_units(5))
            .await;

        let gate = AllowanceGate::new(ledger, ReadRetryPolicy::default());
        assert!(!gate
            .needs_grant(&owner, &spender, Amount::from_units(5))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unlimited_grant_uses_sentinel() {
        let ledger = Arc::new(MemoryLedger::new());
        let owner = addr("0xowner");
        let spender = ledger.ledger_address();

        let gate = AllowanceGate::new(ledger.clone(), ReadRetryPolicy::default());
        gate.grant(&owner, &spender, Amount::from_units(1), GrantPolicy::Unlimited)
            .await
            .unwrap();
        assert_eq!(
            gate.current_allowance(&owner, &spender).await.unwrap(),
            Amount::MAX
        );
    }

    #[tokio::test]
    async fn test_missing_allowance_reads_as_zero() {
        let ledger = Arc::new(MemoryLedger::new());
        let owner = addr("0xowner");
        let spender = ledger.ledger_address();

        let gate = AllowanceGate::new(ledger, ReadRetryPolicy::default());
        assert!(gate
            .needs_grant(&owner, &spender, Amount::from_raw(1))
            .await
            .unwrap());
    }
}
