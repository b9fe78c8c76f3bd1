//! The ledger provider boundary.
//!
//! [`LedgerProvider`] is the client's only contact with the external ledger.
//! The concrete transport (RPC endpoint, wallet connector, signer) is owned
//! by the embedding application; this crate ships an in-memory double behind
//! the `testing` feature.
//!
//! Reads are idempotent and side-effect-free; they may be retried on
//! connectivity failures through [`ReadRetryPolicy`]. Writes are NOT
//! idempotent: resubmitting a write whose outcome is unknown may duplicate
//! the effect, so nothing in this crate ever auto-retries a submission.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use folio_core::{
    Address, Amount, FailureKind, MatchInputs, Note, NoteId, OperationHandle, TranslatedFailure,
    Tranche, TrancheId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Raw failures at the ledger boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LedgerError {
    /// The ledger could not be reached.
    #[error("ledger unreachable: {detail}")]
    Connectivity {
        /// Transport-level failure text.
        detail: String,
    },

    /// The signer or user refused the operation.
    #[error("operation rejected by signer: {detail}")]
    Rejected {
        /// Rejection text as reported.
        detail: String,
    },

    /// The write could not be submitted.
    #[error("submission failed: {detail}")]
    Submission {
        /// Submission failure text.
        detail: String,
    },

    /// The queried entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity ("note", "tranche", ...).
        entity: &'static str,
        /// Identifier that missed.
        id: String,
    },

    /// The ledger returned a record that fails integrity validation.
    #[error("corrupt ledger record: {detail}")]
    Corrupt {
        /// Validation failure text.
        detail: String,
    },
}

impl LedgerError {
    /// Returns `true` for transient transport failures.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    /// Maps this raw failure into the user-facing taxonomy, preserving the
    /// raw text as the detail field.
    #[must_use]
    pub fn to_failure(&self) -> TranslatedFailure {
        let kind = match self {
            Self::Connectivity { .. } => FailureKind::Connectivity,
            Self::Rejected { .. } => FailureKind::UserRejected,
            Self::NotFound { .. } => FailureKind::TargetNotFound,
            Self::Submission { .. } | Self::Corrupt { .. } => FailureKind::Unknown,
        };
        TranslatedFailure::new(kind, self.to_string())
    }
}

/// A named write operation against the ledger.
///
/// Signing is the provider's concern; the operation carries only the
/// parameters the ledger contract needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum LedgerOperation {
    /// Authorize `spender` to move up to `amount` of `owner`'s funds.
    Grant {
        /// The granting account.
        owner: Address,
        /// The authorized counterparty.
        spender: Address,
        /// Authorization limit (`Amount::MAX` for unlimited).
        amount: Amount,
    },
    /// Contribute funds to a tranche.
    Contribute {
        /// The contributing account.
        owner: Address,
        /// Target tranche.
        tranche: TrancheId,
        /// Contribution amount.
        amount: Amount,
    },
    /// Repay a note.
    Repay {
        /// The paying account.
        owner: Address,
        /// Target note.
        note: NoteId,
        /// Payment amount.
        amount: Amount,
    },
    /// Transfer ownership of a note.
    Transfer {
        /// Current owner.
        owner: Address,
        /// Target note.
        note: NoteId,
        /// New owner.
        recipient: Address,
    },
}

/// Confirmation state of a submitted write, as observed by a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationStatus {
    /// Not yet included; poll again.
    Pending,
    /// Durably confirmed.
    Confirmed,
    /// Included and reverted by the ledger.
    Reverted {
        /// The ledger's revert reason.
        reason: String,
    },
}

/// Typed read/write access to the external ledger.
///
/// Implementations own signing and transport. All monetary values cross this
/// boundary as `10^18`-scaled [`Amount`]s; nothing is reformatted to
/// floating point.
#[async_trait]
pub trait LedgerProvider: Send + Sync {
    /// Returns the currently active tranche, if any.
    async fn active_tranche(&self) -> Result<Option<Tranche>, LedgerError>;

    /// Returns tranche detail by id.
    async fn tranche(&self, id: TrancheId) -> Result<Tranche, LedgerError>;

    /// Returns note detail by id.
    async fn note(&self, id: NoteId) -> Result<Note, LedgerError>;

    /// Returns the number of notes in `owner`'s ownership index.
    async fn owned_note_count(&self, owner: &Address) -> Result<u64, LedgerError>;

    /// Returns the note id at `index` in `owner`'s ownership index.
    ///
    /// The index can change between calls; an out-of-range read fails with
    /// `LedgerError::NotFound`.
    async fn owned_note_at(&self, owner: &Address, index: u64) -> Result<NoteId, LedgerError>;

    /// Returns `owner`'s spendable balance.
    async fn balance(&self, owner: &Address) -> Result<Amount, LedgerError>;

    /// Returns the current allowance granted by `owner` to `spender`.
    async fn allowance(&self, owner: &Address, spender: &Address) -> Result<Amount, LedgerError>;

    /// Returns the ledger's minimum-deposit threshold.
    async fn minimum_deposit(&self) -> Result<Amount, LedgerError>;

    /// Returns the match-preview inputs for a tranche.
    async fn match_inputs(&self, tranche: TrancheId) -> Result<MatchInputs, LedgerError>;

    /// Submits a signed write operation. NOT idempotent.
    async fn submit(&self, operation: LedgerOperation) -> Result<OperationHandle, LedgerError>;

    /// Polls the confirmation status of a submitted write.
    async fn confirmation(
        &self,
        handle: &OperationHandle,
    ) -> Result<ConfirmationStatus, LedgerError>;
}

/// Bounded retry policy for idempotent reads.
///
/// Only `Connectivity` failures are retried; every other failure, and any
/// write, surfaces immediately.
#[derive(Debug, Clone, Copy)]
pub struct ReadRetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl ReadRetryPolicy {
    /// Builds a policy with a total attempt budget (at least 1) and a delay
    /// between attempts.
    #[must_use]
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Returns the total attempt budget.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Runs an idempotent read, retrying connectivity failures up to the
    /// attempt budget.
    ///
    /// # Errors
    ///
    /// Returns the last `LedgerError` once the budget is exhausted, or the
    /// first non-connectivity error immediately.
    pub async fn run<T, F, Fut>(&self, mut read: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let mut attempt = 1;
        loop {
            match read().await {
                Err(error) if error.is_connectivity() && attempt < self.attempts => {
                    warn!(%error, attempt, "read failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.delay).await;
                },
                other => return other,
            }
        }
    }
}

impl Default for ReadRetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(250))
    }
}
