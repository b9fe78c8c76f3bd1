//! Tranches: time-boxed funding rounds with a capacity.
//!
//! Same ingest discipline as notes: a [`Tranche`] is only constructed from a
//! [`TrancheRecord`] that passes integrity validation, so downstream capacity
//! math can rely on `total_deposited <= cap`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::Amount;
use crate::id::TrancheId;

/// Integrity violations detected when ingesting a tranche from the ledger.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TrancheIntegrityError {
    /// Deposits exceed the tranche cap (the ledger enforces partial-fill
    /// capping, so this can only come from a corrupt read).
    #[error("{tranche}: total_deposited {deposited} exceeds cap {cap}")]
    DepositsExceedCap {
        /// The inconsistent tranche.
        tranche: TrancheId,
        /// Capacity of the round.
        cap: Amount,
        /// Reported deposits.
        deposited: Amount,
    },

    /// The funding window is empty or inverted.
    #[error("{tranche}: window is empty (start {start} >= end {end})")]
    EmptyWindow {
        /// The inconsistent tranche.
        tranche: TrancheId,
        /// Window start (unix seconds).
        start: u64,
        /// Window end (unix seconds).
        end: u64,
    },
}

/// Raw tranche fields as read from the ledger, prior to validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrancheRecord {
    /// Tranche identifier.
    pub id: TrancheId,
    /// Window start (unix seconds).
    pub start_time: u64,
    /// Window end (unix seconds).
    pub end_time: u64,
    /// Deposit capacity of the round.
    pub cap: Amount,
    /// Total deposited so far.
    pub total_deposited: Amount,
    /// Total externally-matched funds committed so far.
    pub total_matched: Amount,
    /// Whether this is the ledger's active round.
    pub is_active: bool,
    /// Whether the round's funds have been swept out (monotonic).
    pub collected: bool,
}

/// A validated funding round.
///
/// # Invariants
///
/// - `total_deposited <= cap`
/// - `start_time < end_time`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tranche {
    id: TrancheId,
    start_time: u64,
    end_time: u64,
    cap: Amount,
    total_deposited: Amount,
    total_matched: Amount,
    is_active: bool,
    collected: bool,
}

impl TryFrom<TrancheRecord> for Tranche {
    type Error = TrancheIntegrityError;

    fn try_from(record: TrancheRecord) -> Result<Self, Self::Error> {
        if record.total_deposited > record.cap {
            return Err(TrancheIntegrityError::DepositsExceedCap {
                tranche: record.id,
                cap: record.cap,
                deposited: record.total_deposited,
            });
        }
        if record.start_time >= record.end_time {
            return Err(TrancheIntegrityError::EmptyWindow {
                tranche: record.id,
                start: record.start_time,
                end: record.end_time,
            });
        }
        Ok(Self {
            id: record.id,
            start_time: record.start_time,
            end_time: record.end_time,
            cap: record.cap,
            total_deposited: record.total_deposited,
            total_matched: record.total_matched,
            is_active: record.is_active,
            collected: record.collected,
        })
    }
}

impl Tranche {
    /// Returns the tranche identifier.
    #[must_use]
    pub const fn id(&self) -> TrancheId {
        self.id
    }

    /// Returns the window start (unix seconds).
    #[must_use]
    pub const fn start_time(&self) -> u64 {
        self.start_time
    }

    /// Returns the window end (unix seconds).
    #[must_use]
    pub const fn end_time(&self) -> u64 {
        self.end_time
    }

    /// Returns the deposit capacity of the round.
    #[must_use]
    pub const fn cap(&self) -> Amount {
        self.cap
    }

    /// Returns total deposits so far.
    #[must_use]
    pub const fn total_deposited(&self) -> Amount {
        self.total_deposited
    }

    /// Returns total externally-matched funds committed so far.
    #[must_use]
    pub const fn total_matched(&self) -> Amount {
        self.total_matched
    }

    /// Returns `true` if this is the ledger's active round.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns `true` once the round's funds have been swept out.
    #[must_use]
    pub const fn collected(&self) -> bool {
        self.collected
    }

    /// Deposit capacity still available: `cap - total_deposited`.
    ///
    /// Exact under the construction invariant.
    #[must_use]
    pub const fn remaining_capacity(&self) -> Amount {
        self.cap.saturating_sub(self.total_deposited)
    }

    /// Returns `true` while `now` falls inside the funding window.
    #[must_use]
    pub const fn window_open(&self, now: u64) -> bool {
        now >= self.start_time && now < self.end_time
    }

    /// Returns `true` if the tranche currently accepts deposits.
    #[must_use]
    pub const fn accepts_deposits(&self, now: u64) -> bool {
        self.is_active && self.window_open(now)
    }
}
