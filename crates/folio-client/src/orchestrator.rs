//! Transaction orchestrator: drives a pending action through its states.
//!
//! The orchestrator owns the required ordering of a funded action: the
//! spending grant is submitted first, its confirmation is awaited, the
//! allowance is re-read fresh, and only then is the funded operation
//! submitted. Trusting the local "grant succeeded" flag alone would race a
//! concurrent actor consuming the allowance between confirmation and
//! submission.
//!
//! Writes are never auto-retried: an ambiguous outcome is reported, never
//! resubmitted. Confirmation polling, by contrast, is an idempotent read and
//! rides through connectivity blips at the poll cadence indefinitely; the
//! machine stays in `AwaitingConfirmation` until a terminal signal is
//! observed.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use folio_core::{
    allocate, translate_revert, Address, Amount, FailureKind, OperationHandle, TranslatedFailure,
};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::action::{
    ActionError, ActionEvent, ActionRequest, ActionState, ActionTarget, Invalidation,
    PendingAction,
};
use crate::allowance::{AllowanceGate, GrantPolicy};
use crate::provider::{
    ConfirmationStatus, LedgerError, LedgerOperation, LedgerProvider, ReadRetryPolicy,
};

/// Capacity of the transition-event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the invalidation broadcast channel.
const INVALIDATION_CHANNEL_CAPACITY: usize = 64;

/// Receipt for a successfully completed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReceipt {
    /// Client-assigned action id.
    pub action_id: u64,
    /// Handle of the confirmed funded operation.
    pub handle: OperationHandle,
}

/// Drives pending actions against the ledger.
pub struct TransactionOrchestrator {
    provider: Arc<dyn LedgerProvider>,
    gate: AllowanceGate,
    spender: Address,
    retry: ReadRetryPolicy,
    confirmation_poll: Duration,
    slots: Mutex<HashSet<(Address, ActionTarget)>>,
    events: broadcast::Sender<ActionEvent>,
    invalidations: broadcast::Sender<Invalidation>,
    next_id: AtomicU64,
}

impl TransactionOrchestrator {
    /// Builds an orchestrator.
    ///
    /// `spender` is the ledger contract address that funded operations pull
    /// from the owner's balance, i.e. the counterparty grants are issued to.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LedgerProvider>,
        spender: Address,
        retry: ReadRetryPolicy,
        confirmation_poll: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (invalidations, _) = broadcast::channel(INVALIDATION_CHANNEL_CAPACITY);
        Self {
            gate: AllowanceGate::new(provider.clone(), retry),
            provider,
            spender,
            retry,
            confirmation_poll,
            slots: Mutex::new(HashSet::new()),
            events,
            invalidations,
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribes to exactly-once state-transition events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<ActionEvent> {
        self.events.subscribe()
    }

    /// Subscribes to stale-read invalidation signals.
    #[must_use]
    pub fn subscribe_invalidations(&self) -> broadcast::Receiver<Invalidation> {
        self.invalidations.subscribe()
    }

    /// Stages and executes an action end to end.
    ///
    /// Validation failures reject the request while it is still in `Input`
    /// (no write attempted, typed error). Failures after the action leaves
    /// `Input` surface as `ActionError::Failed` carrying the translated
    /// failure and the preserved request parameters.
    ///
    /// # Errors
    ///
    /// Returns `ActionError::Conflict` when another action on the same
    /// `(owner, target)` is in flight, a validation error for requests that
    /// fail closed, or `ActionError::Failed` for remote failures.
    pub async fn execute(&self, request: ActionRequest) -> Result<ActionReceipt, ActionError> {
        let _slot = self.acquire_slot(&request)?;
        let action_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut action = PendingAction::new(action_id, request);

        self.validate(action.request()).await?;
        let handle = self.drive(&mut action).await?;
        Ok(ActionReceipt { action_id, handle })
    }

    /// Fail-closed pre-submission validation. Runs while the action is in
    /// `Input`; nothing here touches a write.
    async fn validate(&self, request: &ActionRequest) -> Result<(), ActionError> {
        if let Some(amount) = request.amount() {
            let unlimited_grant = matches!(
                request,
                ActionRequest::Approve {
                    policy: GrantPolicy::Unlimited,
                    ..
                }
            );
            if amount.is_zero() && !unlimited_grant {
                return Err(ActionError::ZeroAmount);
            }
        }

        match request {
            ActionRequest::Approve { .. } => Ok(()),
            ActionRequest::Deposit {
                tranche, amount, ..
            } => {
                let minimum = self.retry.run(|| self.provider.minimum_deposit()).await?;
                if *amount < minimum {
                    return Err(ActionError::BelowMinimum {
                        amount: *amount,
                        minimum,
                    });
                }
                let info = self.retry.run(|| self.provider.tranche(*tranche)).await?;
                if !info.accepts_deposits(now_unix()) {
                    return Err(ActionError::TrancheClosed { tranche: *tranche });
                }
                Ok(())
            },
            ActionRequest::Repay { note, amount, .. } => {
                let detail = self.retry.run(|| self.provider.note(*note)).await?;
                allocate(*amount, detail.interest_owed(), detail.remaining_principal())?;
                Ok(())
            },
            ActionRequest::Transfer {
                owner,
                note,
                recipient,
            } => {
                let detail = self.retry.run(|| self.provider.note(*note)).await?;
                if detail.owner() != owner {
                    return Err(ActionError::NotOwner {
                        note: *note,
                        owner: owner.clone(),
                    });
                }
                if recipient == owner {
                    return Err(ActionError::SelfTransfer { note: *note });
                }
                Ok(())
            },
        }
    }

    async fn drive(&self, action: &mut PendingAction) -> Result<OperationHandle, ActionError> {
        let request = action.request().clone();

        if let Some(amount) = Self::required_grant(&request) {
            let owner = request.owner().clone();
            if self.gate.needs_grant(&owner, &self.spender, amount).await? {
                self.advance(action, ActionState::AwaitingApproval)?;
                let grant = self
                    .gate
                    .grant(&owner, &self.spender, amount, GrantPolicy::Exact)
                    .await;
                let grant_handle = match grant {
                    Ok(handle) => handle,
                    Err(error) => return Err(self.fail(action, error.to_failure())),
                };
                if let Err(failure) = self.await_confirmation(&grant_handle).await {
                    return Err(self.fail(action, failure));
                }
                // The grant is durably confirmed. Re-read before proceeding:
                // a concurrent actor could have consumed it in the meantime.
                let current = match self.gate.current_allowance(&owner, &self.spender).await {
                    Ok(current) => current,
                    Err(error) => return Err(self.fail(action, error.to_failure())),
                };
                if current < amount {
                    let failure = TranslatedFailure::new(
                        FailureKind::InsufficientAllowance,
                        format!(
                            "allowance {current} after confirmed grant no longer covers {amount}"
                        ),
                    );
                    return Err(self.fail(action, failure));
                }
            }
        }

        self.advance(action, ActionState::AwaitingSubmission)?;
        let operation = Self::operation_for(&request);
        let handle = match self.provider.submit(operation).await {
            Ok(handle) => handle,
            Err(error) => return Err(self.fail(action, error.to_failure())),
        };
        info!(action = action.id(), kind = %request.kind(), %handle, "operation submitted");

        self.advance(action, ActionState::AwaitingConfirmation)?;
        if let Err(failure) = self.await_confirmation(&handle).await {
            return Err(self.fail(action, failure));
        }

        self.advance(action, ActionState::Succeeded)?;
        self.invalidate(&request);
        Ok(handle)
    }

    /// Polls a submitted write until a terminal signal is observed.
    ///
    /// Connectivity blips are ridden out at the poll cadence; no timeout is
    /// imposed here.
    async fn await_confirmation(&self, handle: &OperationHandle) -> Result<(), TranslatedFailure> {
        loop {
            match self.provider.confirmation(handle).await {
                Ok(ConfirmationStatus::Confirmed) => return Ok(()),
                Ok(ConfirmationStatus::Reverted { reason }) => {
                    return Err(translate_revert(&reason));
                },
                Ok(ConfirmationStatus::Pending) => {},
                Err(error) if error.is_connectivity() => {
                    warn!(%handle, %error, "confirmation poll failed, will poll again");
                },
                Err(error) => return Err(error.to_failure()),
            }
            tokio::time::sleep(self.confirmation_poll).await;
        }
    }

    /// Amount a prerequisite grant must cover, for funded kinds.
    const fn required_grant(request: &ActionRequest) -> Option<Amount> {
        match request {
            ActionRequest::Deposit { amount, .. } | ActionRequest::Repay { amount, .. } => {
                Some(*amount)
            },
            ActionRequest::Approve { .. } | ActionRequest::Transfer { .. } => None,
        }
    }

    fn operation_for(request: &ActionRequest) -> LedgerOperation {
        match request {
            ActionRequest::Approve {
                owner,
                spender,
                amount,
                policy,
            } => LedgerOperation::Grant {
                owner: owner.clone(),
                spender: spender.clone(),
                amount: match policy {
                    GrantPolicy::Exact => *amount,
                    GrantPolicy::Unlimited => Amount::MAX,
                },
            },
            ActionRequest::Deposit {
                owner,
                tranche,
                amount,
            } => LedgerOperation::Contribute {
                owner: owner.clone(),
                tranche: *tranche,
                amount: *amount,
            },
            ActionRequest::Repay {
                owner,
                note,
                amount,
            } => LedgerOperation::Repay {
                owner: owner.clone(),
                note: *note,
                amount: *amount,
            },
            ActionRequest::Transfer {
                owner,
                note,
                recipient,
            } => LedgerOperation::Transfer {
                owner: owner.clone(),
                note: *note,
                recipient: recipient.clone(),
            },
        }
    }

    fn advance(&self, action: &mut PendingAction, to: ActionState) -> Result<(), ActionError> {
        action.advance(to)?;
        info!(action = action.id(), state = %to, "action transition");
        self.emit(action);
        Ok(())
    }

    fn fail(&self, action: &mut PendingAction, failure: TranslatedFailure) -> ActionError {
        let request = Box::new(action.request().clone());
        warn!(action = action.id(), %failure, detail = failure.detail(), "action failed");
        if action.fail(failure.clone()).is_ok() {
            self.emit(action);
        }
        ActionError::Failed { failure, request }
    }

    fn emit(&self, action: &PendingAction) {
        // Send fails only when nobody subscribes; that is fine.
        let _ = self.events.send(ActionEvent {
            action_id: action.id(),
            kind: action.request().kind(),
            state: action.state(),
            failure: action.failure().cloned(),
        });
    }

    /// Emits stale-read signals for the reads a confirmed action affects.
    fn invalidate(&self, request: &ActionRequest) {
        let signals: Vec<Invalidation> = match request {
            ActionRequest::Approve { .. } => vec![Invalidation::Allowance],
            ActionRequest::Deposit { tranche, .. } => vec![
                Invalidation::Balance,
                Invalidation::Allowance,
                Invalidation::OwnedNotes,
                Invalidation::Tranche(*tranche),
            ],
            ActionRequest::Repay { note, .. } => vec![
                Invalidation::Balance,
                Invalidation::Allowance,
                Invalidation::NoteDetail(*note),
            ],
            ActionRequest::Transfer { note, .. } => {
                vec![Invalidation::OwnedNotes, Invalidation::NoteDetail(*note)]
            },
        };
        for signal in signals {
            let _ = self.invalidations.send(signal);
        }
    }

    fn acquire_slot(&self, request: &ActionRequest) -> Result<SlotGuard<'_>, ActionError> {
        let key = (request.owner().clone(), request.target());
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if !slots.insert(key.clone()) {
            return Err(ActionError::Conflict {
                owner: key.0,
                target: key.1,
            });
        }
        Ok(SlotGuard {
            slots: &self.slots,
            key,
        })
    }
}

/// Releases the `(owner, target)` concurrency slot when the driving future
/// completes or is dropped.
struct SlotGuard<'a> {
    slots: &'a Mutex<HashSet<(Address, ActionTarget)>>,
    key: (Address, ActionTarget),
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.remove(&self.key);
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}
