//! Pending actions and their state machine.
//!
//! Every user-initiated operation is tracked by a [`PendingAction`] driven
//! through an explicit finite-state machine. Transition legality is enforced
//! by the machine itself: an illegal transition is rejected as an error,
//! never silently applied, and each applied transition is reported exactly
//! once on the orchestrator's event channel. This replaces any
//! diff-the-snapshots reactive scheme: the machine is the single source of
//! transition truth.

use std::fmt;

use folio_core::{Address, Amount, NoteId, TranslatedFailure, TrancheId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::allowance::GrantPolicy;
use crate::provider::LedgerError;

/// The kind of operation a pending action drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// A standalone allowance grant.
    Approve,
    /// A contribution into a tranche.
    Deposit,
    /// A repayment against a note.
    Repay,
    /// An ownership transfer of a note.
    Transfer,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Approve => "approve",
            Self::Deposit => "deposit",
            Self::Repay => "repay",
            Self::Transfer => "transfer",
        })
    }
}

/// States of a pending action.
///
/// `Input` is the only state accepting parameter edits; `Succeeded` and
/// `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionState {
    /// Collecting parameters; the action can still be abandoned.
    Input,
    /// A prerequisite grant is in flight.
    AwaitingApproval,
    /// The funded operation is about to be submitted.
    AwaitingSubmission,
    /// The funded operation is submitted and awaiting confirmation.
    AwaitingConfirmation,
    /// The operation confirmed.
    Succeeded,
    /// A step failed; the captured failure explains why.
    Failed,
}

impl ActionState {
    /// Returns `true` for `Succeeded` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Returns `true` iff the state accepts parameter edits.
    #[must_use]
    pub const fn accepts_edits(self) -> bool {
        matches!(self, Self::Input)
    }

    /// Returns `true` iff `self -> to` is a legal transition.
    #[must_use]
    pub const fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Input, Self::AwaitingApproval)
                | (Self::Input | Self::AwaitingApproval, Self::AwaitingSubmission)
                | (Self::AwaitingSubmission, Self::AwaitingConfirmation)
                | (Self::AwaitingConfirmation, Self::Succeeded)
                | (
                    Self::Input
                        | Self::AwaitingApproval
                        | Self::AwaitingSubmission
                        | Self::AwaitingConfirmation,
                    Self::Failed,
                )
        )
    }

    /// Returns the state as a stable string identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::AwaitingApproval => "awaiting_approval",
            Self::AwaitingSubmission => "awaiting_submission",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The ledger entity an action operates on.
///
/// Doubles as the concurrency-slot key: at most one action per
/// `(owner, target)` may be outside `Input` at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionTarget {
    /// A tranche (deposits).
    Tranche(TrancheId),
    /// A note (repayments, transfers).
    Note(NoteId),
    /// A spender address (standalone approvals).
    Spender(Address),
}

impl fmt::Display for ActionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tranche(id) => id.fmt(f),
            Self::Note(id) => id.fmt(f),
            Self::Spender(address) => write!(f, "spender-{address}"),
        }
    }
}

/// Parameters of a requested action.
///
/// Preserved verbatim through failure so the caller can re-enter `Input`
/// without re-typing anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ActionRequest {
    /// Stand-alone allowance grant.
    Approve {
        /// The granting account.
        owner: Address,
        /// The counterparty to authorize.
        spender: Address,
        /// Authorization amount (ignored under `GrantPolicy::Unlimited`).
        amount: Amount,
        /// Grant sizing policy.
        policy: GrantPolicy,
    },
    /// Contribution into a tranche.
    Deposit {
        /// The contributing account.
        owner: Address,
        /// Target tranche.
        tranche: TrancheId,
        /// Contribution amount.
        amount: Amount,
    },
    /// Repayment against a note.
    Repay {
        /// The paying account.
        owner: Address,
        /// Target note.
        note: NoteId,
        /// Payment amount.
        amount: Amount,
    },
    /// Ownership transfer of a note.
    Transfer {
        /// Current owner.
        owner: Address,
        /// Target note.
        note: NoteId,
        /// New owner.
        recipient: Address,
    },
}

impl ActionRequest {
    /// Returns the action kind.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Approve { .. } => ActionKind::Approve,
            Self::Deposit { .. } => ActionKind::Deposit,
            Self::Repay { .. } => ActionKind::Repay,
            Self::Transfer { .. } => ActionKind::Transfer,
        }
    }

    /// Returns the initiating account.
    #[must_use]
    pub const fn owner(&self) -> &Address {
        match self {
            Self::Approve { owner, .. }
            | Self::Deposit { owner, .. }
            | Self::Repay { owner, .. }
            | Self::Transfer { owner, .. } => owner,
        }
    }

    /// Returns the concurrency-slot target.
    #[must_use]
    pub fn target(&self) -> ActionTarget {
        match self {
            Self::Approve { spender, .. } => ActionTarget::Spender(spender.clone()),
            Self::Deposit { tranche, .. } => ActionTarget::Tranche(*tranche),
            Self::Repay { note, .. } | Self::Transfer { note, .. } => ActionTarget::Note(*note),
        }
    }

    /// Returns the monetary amount, if the kind carries one.
    #[must_use]
    pub const fn amount(&self) -> Option<Amount> {
        match self {
            Self::Approve { amount, .. }
            | Self::Deposit { amount, .. }
            | Self::Repay { amount, .. } => Some(*amount),
            Self::Transfer { .. } => None,
        }
    }
}

/// A client-local, never-persisted record of one in-flight operation.
#[derive(Debug, Clone)]
pub struct PendingAction {
    id: u64,
    request: ActionRequest,
    state: ActionState,
    failure: Option<TranslatedFailure>,
}

impl PendingAction {
    /// Creates a pending action in `Input`.
    #[must_use]
    pub const fn new(id: u64, request: ActionRequest) -> Self {
        Self {
            id,
            request,
            state: ActionState::Input,
            failure: None,
        }
    }

    /// Returns the client-assigned action id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns the request parameters.
    #[must_use]
    pub const fn request(&self) -> &ActionRequest {
        &self.request
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> ActionState {
        self.state
    }

    /// Returns the captured failure, if the action failed.
    #[must_use]
    pub const fn failure(&self) -> Option<&TranslatedFailure> {
        self.failure.as_ref()
    }

    /// Applies a state transition.
    ///
    /// # Errors
    ///
    /// Returns `ActionError::InvalidTransition` if the move is not in the
    /// legal transition table.
    pub fn advance(&mut self, to: ActionState) -> Result<(), ActionError> {
        if !self.state.can_transition(to) {
            return Err(ActionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Moves the action to `Failed`, capturing the translated failure.
    ///
    /// # Errors
    ///
    /// Returns `ActionError::InvalidTransition` if the action is already
    /// terminal.
    pub fn fail(&mut self, failure: TranslatedFailure) -> Result<(), ActionError> {
        self.advance(ActionState::Failed)?;
        self.failure = Some(failure);
        Ok(())
    }
}

/// A state-transition report, emitted exactly once per applied transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEvent {
    /// Client-assigned action id.
    pub action_id: u64,
    /// The action kind.
    pub kind: ActionKind,
    /// The state just entered.
    pub state: ActionState,
    /// The captured failure, present only when `state` is `Failed`.
    pub failure: Option<TranslatedFailure>,
}

/// Stale-read signal emitted after an action succeeds.
///
/// The ledger is not assumed consistent the instant confirmation returns;
/// subscribers re-read the named data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Invalidation {
    /// Account balances may have changed.
    Balance,
    /// Allowances may have changed.
    Allowance,
    /// The owned-note index may have changed.
    OwnedNotes,
    /// One note's detail may have changed.
    NoteDetail(NoteId),
    /// One tranche's figures may have changed.
    Tranche(TrancheId),
}

impl Invalidation {
    /// Returns `true` if the signal stales a portfolio view.
    #[must_use]
    pub const fn affects_portfolio(&self) -> bool {
        matches!(self, Self::OwnedNotes | Self::NoteDetail(_))
    }
}

/// Errors from action staging and execution.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ActionError {
    /// Another action on the same target is already outside `Input`.
    #[error("an action on {target} by {owner} is already in flight")]
    Conflict {
        /// The initiating account.
        owner: Address,
        /// The contested target.
        target: ActionTarget,
    },

    /// The requested state transition is not legal.
    #[error("illegal action transition: {from} -> {to}")]
    InvalidTransition {
        /// State the action was in.
        from: ActionState,
        /// State that was requested.
        to: ActionState,
    },

    /// The amount is zero.
    #[error("amount must be positive")]
    ZeroAmount,

    /// The deposit is below the ledger's minimum threshold.
    #[error("deposit {amount} is below the minimum {minimum}")]
    BelowMinimum {
        /// The rejected amount.
        amount: Amount,
        /// The ledger's minimum-deposit threshold.
        minimum: Amount,
    },

    /// The tranche is not accepting deposits.
    #[error("{tranche} is not accepting deposits")]
    TrancheClosed {
        /// The closed tranche.
        tranche: TrancheId,
    },

    /// The caller does not own the note.
    #[error("{note} is not owned by {owner}")]
    NotOwner {
        /// The note in question.
        note: NoteId,
        /// The would-be actor.
        owner: Address,
    },

    /// A transfer to the current owner.
    #[error("cannot transfer {note} to its current owner")]
    SelfTransfer {
        /// The note in question.
        note: NoteId,
    },

    /// The payment exceeds the note's outstanding value.
    #[error(transparent)]
    Repayment(#[from] folio_core::RepaymentError),

    /// A pre-submission read failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A remote step failed after the action left `Input`.
    ///
    /// The original request is preserved so the caller can re-enter `Input`
    /// with its parameters intact.
    #[error("action failed: {failure}")]
    Failed {
        /// The translated failure (category plus raw detail).
        failure: TranslatedFailure,
        /// The request as originally staged.
        request: Box<ActionRequest>,
    },
}
