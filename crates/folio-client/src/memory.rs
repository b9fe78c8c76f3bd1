//! In-memory ledger double for tests.
//!
//! Implements [`LedgerProvider`] over plain maps, applying the effects of a
//! write when its confirmation resolves, so callers observe the same
//! submit-then-poll shape the real ledger has. Failure scripting covers the
//! cases unit and integration tests need: connectivity blips, user
//! rejections, scripted reverts, deferred confirmations, and allowance
//! consumption by a concurrent actor.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use folio_core::{
    Address, Amount, MatchInputs, Note, NoteId, NoteRecord, OperationHandle, Tranche, TrancheId,
    TrancheRecord,
};
use tokio::sync::Mutex;

use crate::provider::{ConfirmationStatus, LedgerError, LedgerOperation, LedgerProvider};

const LEDGER_ADDRESS: &str = "0xfolio-ledger";
const DEFAULT_APR_BPS: u32 = 500;

#[derive(Debug, Clone)]
struct PendingOp {
    operation: LedgerOperation,
    scripted_revert: Option<String>,
    released: bool,
    resolution: Option<ConfirmationStatus>,
}

#[derive(Debug, Default)]
struct State {
    notes: BTreeMap<NoteId, NoteRecord>,
    tranches: BTreeMap<TrancheId, TrancheRecord>,
    owned: HashMap<Address, Vec<NoteId>>,
    balances: HashMap<Address, Amount>,
    allowances: HashMap<(Address, Address), Amount>,
    match_inputs: HashMap<TrancheId, MatchInputs>,
    pending: HashMap<OperationHandle, PendingOp>,
    minimum_deposit: Amount,
    default_balance: Amount,
    auto_confirm: bool,
    read_failures: u32,
    confirm_failures: u32,
    read_count: u64,
    submissions: u64,
    next_note: u64,
    next_tranche: u64,
    next_handle: u64,
    revert_next: Option<String>,
    reject_next: bool,
    submission_error_next: Option<String>,
    post_grant_allowance: Option<Amount>,
}

impl State {
    fn connectivity_if_scripted(&mut self) -> Result<(), LedgerError> {
        self.read_count += 1;
        if self.read_failures > 0 {
            self.read_failures -= 1;
            return Err(LedgerError::Connectivity {
                detail: "scripted read failure".into(),
            });
        }
        Ok(())
    }

    fn balance_of(&self, owner: &Address) -> Amount {
        self.balances
            .get(owner)
            .copied()
            .unwrap_or(self.default_balance)
    }

    fn allowance_of(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    fn ledger(&self) -> Address {
        // The literal is within the address charset; construction cannot
        // fail.
        Address::new(LEDGER_ADDRESS).unwrap_or_else(|_| unreachable!())
    }

    fn resolve(&mut self, handle: &OperationHandle) -> Option<ConfirmationStatus> {
        let op = self.pending.get(handle)?.clone();
        if let Some(resolution) = op.resolution {
            return Some(resolution);
        }
        if !self.auto_confirm && !op.released {
            return Some(ConfirmationStatus::Pending);
        }
        let status = match op.scripted_revert {
            Some(reason) => ConfirmationStatus::Reverted { reason },
            None => match self.apply(&op.operation) {
                Ok(()) => ConfirmationStatus::Confirmed,
                Err(reason) => ConfirmationStatus::Reverted { reason },
            },
        };
        if let Some(entry) = self.pending.get_mut(handle) {
            entry.resolution = Some(status.clone());
        }
        Some(status)
    }

    /// Applies a confirmed write, enforcing the ledger's own policies. A
    /// violated policy reverts with the ledger's identifier string.
    fn apply(&mut self, operation: &LedgerOperation) -> Result<(), String> {
        match operation {
            LedgerOperation::Grant {
                owner,
                spender,
                amount,
            } => {
                let key = (owner.clone(), spender.clone());
                self.allowances.insert(key.clone(), *amount);
                // Models a concurrent actor spending the fresh grant.
                if let Some(consumed_to) = self.post_grant_allowance.take() {
                    self.allowances.insert(key, consumed_to);
                }
                Ok(())
            },
            LedgerOperation::Contribute {
                owner,
                tranche,
                amount,
            } => {
                let record = self
                    .tranches
                    .get(tranche)
                    .ok_or("TRANCHE_NOT_FOUND")?
                    .clone();
                if !record.is_active {
                    return Err("TRANCHE_NOT_ACTIVE".into());
                }
                if record.collected {
                    return Err("TRANCHE_COLLECTED".into());
                }
                if *amount < self.minimum_deposit {
                    return Err("BELOW_MINIMUM_DEPOSIT".into());
                }
                if *amount > record.cap.saturating_sub(record.total_deposited) {
                    return Err("CAP_EXCEEDED".into());
                }
                self.debit(owner, *amount)?;
                if let Some(entry) = self.tranches.get_mut(tranche) {
                    entry.total_deposited = entry.total_deposited.saturating_add(*amount);
                }
                self.insert_note(owner, *tranche, *amount, DEFAULT_APR_BPS);
                Ok(())
            },
            LedgerOperation::Repay {
                owner,
                note,
                amount,
            } => {
                let record = self.notes.get(note).ok_or("NOTE_NOT_FOUND")?.clone();
                let interest = if *amount < record.interest_owed {
                    *amount
                } else {
                    record.interest_owed
                };
                let principal_part = amount.saturating_sub(interest);
                if principal_part > record.remaining_principal {
                    return Err("OVERPAYMENT".into());
                }
                self.debit(owner, *amount)?;
                if let Some(entry) = self.notes.get_mut(note) {
                    entry.interest_owed = entry.interest_owed.saturating_sub(interest);
                    entry.interest_paid = entry.interest_paid.saturating_add(interest);
                    entry.principal_repaid = entry.principal_repaid.saturating_add(principal_part);
                    entry.remaining_principal =
                        entry.remaining_principal.saturating_sub(principal_part);
                    entry.fully_repaid =
                        entry.remaining_principal.is_zero() && entry.interest_owed.is_zero();
                }
                Ok(())
            },
            LedgerOperation::Transfer {
                owner,
                note,
                recipient,
            } => {
                let record = self.notes.get(note).ok_or("NOTE_NOT_FOUND")?.clone();
                if record.owner != *owner {
                    return Err("NOT_NOTE_OWNER".into());
                }
                if let Some(entry) = self.notes.get_mut(note) {
                    entry.owner = recipient.clone();
                }
                if let Some(index) = self.owned.get_mut(owner) {
                    index.retain(|id| id != note);
                }
                self.owned.entry(recipient.clone()).or_default().push(*note);
                Ok(())
            },
        }
    }

    /// Deducts a funded amount from the owner's balance and the ledger
    /// allowance, reverting when either is short.
    fn debit(&mut self, owner: &Address, amount: Amount) -> Result<(), String> {
        let spender = self.ledger();
        let allowance = self.allowance_of(owner, &spender);
        if allowance < amount {
            return Err("INSUFFICIENT_ALLOWANCE".into());
        }
        let balance = self.balance_of(owner);
        if balance < amount {
            return Err("INSUFFICIENT_BALANCE".into());
        }
        self.allowances.insert(
            (owner.clone(), spender),
            allowance.saturating_sub(amount),
        );
        self.balances
            .insert(owner.clone(), balance.saturating_sub(amount));
        Ok(())
    }

    fn insert_note(
        &mut self,
        owner: &Address,
        tranche: TrancheId,
        principal: Amount,
        apr_bps: u32,
    ) -> NoteId {
        self.next_note += 1;
        let id = NoteId(self.next_note);
        self.notes.insert(
            id,
            NoteRecord {
                id,
                tranche_id: tranche,
                apr_bps,
                principal,
                principal_repaid: Amount::ZERO,
                interest_paid: Amount::ZERO,
                interest_accrued: Amount::ZERO,
                interest_owed: Amount::ZERO,
                remaining_principal: principal,
                fully_repaid: false,
                owner: owner.clone(),
            },
        );
        self.owned.entry(owner.clone()).or_default().push(id);
        id
    }
}

/// Scriptable in-memory [`LedgerProvider`].
pub struct MemoryLedger {
    state: Mutex<State>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    /// Builds an empty ledger with auto-confirming writes, a one-unit
    /// minimum deposit, and a generous default balance per account.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                minimum_deposit: Amount::from_units(1),
                default_balance: Amount::from_units(1_000_000),
                auto_confirm: true,
                ..State::default()
            }),
        }
    }

    /// The address funded operations pull from, i.e. the grant spender.
    #[must_use]
    pub fn ledger_address(&self) -> Address {
        Address::new(LEDGER_ADDRESS).unwrap_or_else(|_| unreachable!())
    }

    /// Seeds an active tranche with a wide-open window.
    pub async fn seed_tranche(&self, cap: Amount) -> TrancheId {
        self.seed_tranche_window(cap, 0, u64::MAX, true).await
    }

    /// Seeds a tranche with an explicit window and active flag.
    pub async fn seed_tranche_window(
        &self,
        cap: Amount,
        start_time: u64,
        end_time: u64,
        is_active: bool,
    ) -> TrancheId {
        let mut state = self.state.lock().await;
        state.next_tranche += 1;
        let id = TrancheId(state.next_tranche);
        state.tranches.insert(
            id,
            TrancheRecord {
                id,
                start_time,
                end_time,
                cap,
                total_deposited: Amount::ZERO,
                total_matched: Amount::ZERO,
                is_active,
                collected: false,
            },
        );
        id
    }

    /// Inserts a raw tranche record verbatim, integrity-broken or not.
    pub async fn seed_raw_tranche(&self, record: TrancheRecord) {
        let mut state = self.state.lock().await;
        state.next_tranche = state.next_tranche.max(record.id.0);
        state.tranches.insert(record.id, record);
    }

    /// Seeds an open note owned by `owner` with no interest yet owed.
    pub async fn seed_note(&self, owner: &Address, principal: Amount, apr_bps: u32) -> NoteId {
        let mut state = self.state.lock().await;
        if state.tranches.is_empty() {
            state.next_tranche += 1;
            let id = TrancheId(state.next_tranche);
            state.tranches.insert(
                id,
                TrancheRecord {
                    id,
                    start_time: 0,
                    end_time: u64::MAX,
                    cap: Amount::MAX,
                    total_deposited: Amount::ZERO,
                    total_matched: Amount::ZERO,
                    is_active: true,
                    collected: false,
                },
            );
        }
        let tranche = state
            .tranches
            .keys()
            .next()
            .copied()
            .unwrap_or(TrancheId(1));
        state.insert_note(owner, tranche, principal, apr_bps)
    }

    /// Inserts a raw note record verbatim, integrity-broken or not.
    pub async fn seed_raw_note(&self, record: NoteRecord) {
        let mut state = self.state.lock().await;
        state.next_note = state.next_note.max(record.id.0);
        state
            .owned
            .entry(record.owner.clone())
            .or_default()
            .push(record.id);
        state.notes.insert(record.id, record);
    }

    /// Accrues interest on a note (both owed and lifetime figures).
    pub async fn accrue_interest(&self, note: NoteId, amount: Amount) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.notes.get_mut(&note) {
            entry.interest_owed = entry.interest_owed.saturating_add(amount);
            entry.interest_accrued = entry.interest_accrued.saturating_add(amount);
        }
    }

    /// Removes the note record while leaving its ownership-index entry in
    /// place, so the detail read fails with `NotFound`.
    pub async fn detach_note(&self, note: NoteId) {
        let mut state = self.state.lock().await;
        state.notes.remove(&note);
    }

    /// Sets an account balance.
    pub async fn set_balance(&self, owner: &Address, amount: Amount) {
        let mut state = self.state.lock().await;
        state.balances.insert(owner.clone(), amount);
    }

    /// Sets an allowance directly.
    pub async fn set_allowance(&self, owner: &Address, spender: &Address, amount: Amount) {
        let mut state = self.state.lock().await;
        state
            .allowances
            .insert((owner.clone(), spender.clone()), amount);
    }

    /// Sets the minimum-deposit threshold.
    pub async fn set_minimum_deposit(&self, amount: Amount) {
        let mut state = self.state.lock().await;
        state.minimum_deposit = amount;
    }

    /// Sets the match-preview inputs reported for a tranche.
    pub async fn set_match_inputs(&self, tranche: TrancheId, inputs: MatchInputs) {
        let mut state = self.state.lock().await;
        state.match_inputs.insert(tranche, inputs);
    }

    /// Fails the next `n` reads with a connectivity error.
    pub async fn fail_reads(&self, n: u32) {
        let mut state = self.state.lock().await;
        state.read_failures = n;
    }

    /// Fails the next `n` confirmation polls with a connectivity error.
    pub async fn fail_confirmations(&self, n: u32) {
        let mut state = self.state.lock().await;
        state.confirm_failures = n;
    }

    /// Rejects the next submission as if the user declined to sign.
    pub async fn reject_next_submission(&self) {
        let mut state = self.state.lock().await;
        state.reject_next = true;
    }

    /// Fails the next submission at the transport.
    pub async fn fail_next_submission(&self, detail: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.submission_error_next = Some(detail.into());
    }

    /// Reverts the next submitted write with the given reason.
    pub async fn revert_next(&self, reason: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.revert_next = Some(reason.into());
    }

    /// After the next grant confirms, snaps the allowance to `remaining`,
    /// as if a concurrent actor had spent the difference.
    pub async fn consume_allowance_after_grant(&self, remaining: Amount) {
        let mut state = self.state.lock().await;
        state.post_grant_allowance = Some(remaining);
    }

    /// Toggles auto-confirmation. While off, submitted writes stay
    /// `Pending` until [`Self::confirm_all`].
    pub async fn auto_confirm(&self, enabled: bool) {
        let mut state = self.state.lock().await;
        state.auto_confirm = enabled;
    }

    /// Releases every held write; each resolves on its next poll.
    pub async fn confirm_all(&self) {
        let mut state = self.state.lock().await;
        for op in state.pending.values_mut() {
            op.released = true;
        }
    }

    /// Number of reads issued so far (failed or not).
    pub async fn read_count(&self) -> u64 {
        self.state.lock().await.read_count
    }

    /// Number of writes submitted so far (accepted or not).
    pub async fn submission_count(&self) -> u64 {
        self.state.lock().await.submissions
    }
}

#[async_trait]
impl LedgerProvider for MemoryLedger {
    async fn active_tranche(&self) -> Result<Option<Tranche>, LedgerError> {
        let mut state = self.state.lock().await;
        state.connectivity_if_scripted()?;
        let Some(record) = state.tranches.values().find(|t| t.is_active).cloned() else {
            return Ok(None);
        };
        let tranche = Tranche::try_from(record).map_err(|error| LedgerError::Corrupt {
            detail: error.to_string(),
        })?;
        Ok(Some(tranche))
    }

    async fn tranche(&self, id: TrancheId) -> Result<Tranche, LedgerError> {
        let mut state = self.state.lock().await;
        state.connectivity_if_scripted()?;
        let record = state
            .tranches
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound {
                entity: "tranche",
                id: id.to_string(),
            })?;
        Tranche::try_from(record).map_err(|error| LedgerError::Corrupt {
            detail: error.to_string(),
        })
    }

    async fn note(&self, id: NoteId) -> Result<Note, LedgerError> {
        let mut state = self.state.lock().await;
        state.connectivity_if_scripted()?;
        let record = state
            .notes
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound {
                entity: "note",
                id: id.to_string(),
            })?;
        Note::try_from(record).map_err(|error| LedgerError::Corrupt {
            detail: error.to_string(),
        })
    }

    async fn owned_note_count(&self, owner: &Address) -> Result<u64, LedgerError> {
        let mut state = self.state.lock().await;
        state.connectivity_if_scripted()?;
        Ok(state.owned.get(owner).map_or(0, |index| index.len() as u64))
    }

    async fn owned_note_at(&self, owner: &Address, index: u64) -> Result<NoteId, LedgerError> {
        let mut state = self.state.lock().await;
        state.connectivity_if_scripted()?;
        let position = usize::try_from(index).map_err(|_| LedgerError::NotFound {
            entity: "note-index",
            id: format!("{owner}/{index}"),
        })?;
        state
            .owned
            .get(owner)
            .and_then(|ids| ids.get(position))
            .copied()
            .ok_or_else(|| LedgerError::NotFound {
                entity: "note-index",
                id: format!("{owner}/{index}"),
            })
    }

    async fn balance(&self, owner: &Address) -> Result<Amount, LedgerError> {
        let mut state = self.state.lock().await;
        state.connectivity_if_scripted()?;
        Ok(state.balance_of(owner))
    }

    async fn allowance(&self, owner: &Address, spender: &Address) -> Result<Amount, LedgerError> {
        let mut state = self.state.lock().await;
        state.connectivity_if_scripted()?;
        Ok(state.allowance_of(owner, spender))
    }

    async fn minimum_deposit(&self) -> Result<Amount, LedgerError> {
        let mut state = self.state.lock().await;
        state.connectivity_if_scripted()?;
        Ok(state.minimum_deposit)
    }

    async fn match_inputs(&self, tranche: TrancheId) -> Result<MatchInputs, LedgerError> {
        let mut state = self.state.lock().await;
        state.connectivity_if_scripted()?;
        if let Some(inputs) = state.match_inputs.get(&tranche) {
            return Ok(*inputs);
        }
        let record = state
            .tranches
            .get(&tranche)
            .ok_or_else(|| LedgerError::NotFound {
                entity: "tranche",
                id: tranche.to_string(),
            })?;
        Ok(MatchInputs {
            remaining_match_capacity: record.cap.saturating_sub(record.total_matched),
            vault_available: state.default_balance,
            match_ratio_bps: 10_000,
        })
    }

    async fn submit(&self, operation: LedgerOperation) -> Result<OperationHandle, LedgerError> {
        let mut state = self.state.lock().await;
        state.submissions += 1;
        if state.reject_next {
            state.reject_next = false;
            return Err(LedgerError::Rejected {
                detail: "signature request declined".into(),
            });
        }
        if let Some(detail) = state.submission_error_next.take() {
            return Err(LedgerError::Submission { detail });
        }
        state.next_handle += 1;
        let handle = OperationHandle::new(format!("op-{}", state.next_handle))
            .map_err(|error| LedgerError::Submission {
                detail: error.to_string(),
            })?;
        let scripted_revert = state.revert_next.take();
        state.pending.insert(
            handle.clone(),
            PendingOp {
                operation,
                scripted_revert,
                released: false,
                resolution: None,
            },
        );
        // Auto-confirmed writes take effect immediately; held writes apply
        // when released and polled.
        if state.auto_confirm {
            state.resolve(&handle);
        }
        Ok(handle)
    }

    async fn confirmation(
        &self,
        handle: &OperationHandle,
    ) -> Result<ConfirmationStatus, LedgerError> {
        let mut state = self.state.lock().await;
        if state.confirm_failures > 0 {
            state.confirm_failures -= 1;
            return Err(LedgerError::Connectivity {
                detail: "scripted confirmation failure".into(),
            });
        }
        state.resolve(handle).ok_or_else(|| LedgerError::NotFound {
            entity: "operation",
            id: handle.to_string(),
        })
    }
}
