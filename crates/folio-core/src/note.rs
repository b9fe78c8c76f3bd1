//! Notes: individual funded positions held on the ledger.
//!
//! A [`Note`] is validated on construction from raw ledger data
//! ([`NoteRecord`]): a corrupt read fails closed instead of propagating
//! inconsistent figures into previews and portfolio sums. Deserialization
//! goes through the record type so a `Note` can never exist with broken
//! invariants.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::Amount;
use crate::id::{Address, NoteId, TrancheId};

/// Integrity violations detected when ingesting a note from the ledger.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NoteIntegrityError {
    /// More principal was reported repaid than was ever funded.
    #[error("{note}: principal_repaid {repaid} exceeds principal {principal}")]
    RepaidExceedsPrincipal {
        /// The inconsistent note.
        note: NoteId,
        /// Funded principal.
        principal: Amount,
        /// Reported repaid principal.
        repaid: Amount,
    },

    /// `remaining_principal` does not equal `principal - principal_repaid`.
    #[error("{note}: remaining_principal {actual} != expected {expected}")]
    RemainingMismatch {
        /// The inconsistent note.
        note: NoteId,
        /// `principal - principal_repaid`.
        expected: Amount,
        /// Reported remaining principal.
        actual: Amount,
    },

    /// The `fully_repaid` flag disagrees with the outstanding figures.
    #[error(
        "{note}: fully_repaid={fully_repaid} but remaining_principal={remaining} \
         and interest_owed={interest_owed}"
    )]
    FullyRepaidMismatch {
        /// The inconsistent note.
        note: NoteId,
        /// Reported terminal flag.
        fully_repaid: bool,
        /// Reported remaining principal.
        remaining: Amount,
        /// Reported interest owed.
        interest_owed: Amount,
    },

    /// `remaining_principal + interest_owed` overflows.
    #[error("{note}: outstanding value overflows")]
    OutstandingOverflow {
        /// The inconsistent note.
        note: NoteId,
    },
}

/// Raw note fields as read from the ledger, prior to validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoteRecord {
    /// Note identifier.
    pub id: NoteId,
    /// Tranche the note was funded under.
    pub tranche_id: TrancheId,
    /// Interest rate in basis points.
    pub apr_bps: u32,
    /// Funded principal.
    pub principal: Amount,
    /// Principal repaid so far (monotonic).
    pub principal_repaid: Amount,
    /// Interest paid so far (monotonic).
    pub interest_paid: Amount,
    /// Interest accrued over the note's lifetime.
    pub interest_accrued: Amount,
    /// Interest currently owed.
    pub interest_owed: Amount,
    /// Principal still outstanding.
    pub remaining_principal: Amount,
    /// Terminal flag: fully repaid notes never mutate again.
    pub fully_repaid: bool,
    /// Current owner.
    pub owner: Address,
}

/// A validated claim against the ledger representing one funded position.
///
/// # Invariants
///
/// - `remaining_principal == principal - principal_repaid` (never wraps)
/// - `fully_repaid` holds iff `remaining_principal == 0 && interest_owed == 0`
/// - `remaining_principal + interest_owed` does not overflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    id: NoteId,
    tranche_id: TrancheId,
    apr_bps: u32,
    principal: Amount,
    principal_repaid: Amount,
    interest_paid: Amount,
    interest_accrued: Amount,
    interest_owed: Amount,
    remaining_principal: Amount,
    fully_repaid: bool,
    owner: Address,
}

impl TryFrom<NoteRecord> for Note {
    type Error = NoteIntegrityError;

    fn try_from(record: NoteRecord) -> Result<Self, Self::Error> {
        if record.principal_repaid > record.principal {
            return Err(NoteIntegrityError::RepaidExceedsPrincipal {
                note: record.id,
                principal: record.principal,
                repaid: record.principal_repaid,
            });
        }
        let expected = record.principal.saturating_sub(record.principal_repaid);
        if record.remaining_principal != expected {
            return Err(NoteIntegrityError::RemainingMismatch {
                note: record.id,
                expected,
                actual: record.remaining_principal,
            });
        }
        let settled = record.remaining_principal.is_zero() && record.interest_owed.is_zero();
        if record.fully_repaid != settled {
            return Err(NoteIntegrityError::FullyRepaidMismatch {
                note: record.id,
                fully_repaid: record.fully_repaid,
                remaining: record.remaining_principal,
                interest_owed: record.interest_owed,
            });
        }
        record
            .remaining_principal
            .checked_add(record.interest_owed)
            .map_err(|_| NoteIntegrityError::OutstandingOverflow { note: record.id })?;

        Ok(Self {
            id: record.id,
            tranche_id: record.tranche_id,
            apr_bps: record.apr_bps,
            principal: record.principal,
            principal_repaid: record.principal_repaid,
            interest_paid: record.interest_paid,
            interest_accrued: record.interest_accrued,
            interest_owed: record.interest_owed,
            remaining_principal: record.remaining_principal,
            fully_repaid: record.fully_repaid,
            owner: record.owner,
        })
    }
}

impl Note {
    /// Returns the note identifier.
    #[must_use]
    pub const fn id(&self) -> NoteId {
        self.id
    }

    /// Returns the tranche the note was funded under.
    #[must_use]
    pub const fn tranche_id(&self) -> TrancheId {
        self.tranche_id
    }

    /// Returns the interest rate in basis points.
    #[must_use]
    pub const fn apr_bps(&self) -> u32 {
        self.apr_bps
    }

    /// Returns the funded principal.
    #[must_use]
    pub const fn principal(&self) -> Amount {
        self.principal
    }

    /// Returns the principal repaid so far.
    #[must_use]
    pub const fn principal_repaid(&self) -> Amount {
        self.principal_repaid
    }

    /// Returns the interest paid so far.
    #[must_use]
    pub const fn interest_paid(&self) -> Amount {
        self.interest_paid
    }

    /// Returns the interest accrued over the note's lifetime.
    #[must_use]
    pub const fn interest_accrued(&self) -> Amount {
        self.interest_accrued
    }

    /// Returns the interest currently owed.
    #[must_use]
    pub const fn interest_owed(&self) -> Amount {
        self.interest_owed
    }

    /// Returns the principal still outstanding.
    #[must_use]
    pub const fn remaining_principal(&self) -> Amount {
        self.remaining_principal
    }

    /// Returns `true` once the note is terminally settled.
    #[must_use]
    pub const fn fully_repaid(&self) -> bool {
        self.fully_repaid
    }

    /// Returns the current owner.
    #[must_use]
    pub const fn owner(&self) -> &Address {
        &self.owner
    }

    /// Total value still owed: `remaining_principal + interest_owed`.
    ///
    /// Overflow was ruled out at construction, so the sum is exact.
    #[must_use]
    pub const fn outstanding(&self) -> Amount {
        self.remaining_principal.saturating_add(self.interest_owed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64) -> NoteRecord {
        NoteRecord {
            id: NoteId(id),
            tranche_id: TrancheId(1),
            apr_bps: 800,
            principal: Amount::from_units(100),
            principal_repaid: Amount::ZERO,
            interest_paid: Amount::ZERO,
            interest_accrued: Amount::from_units(5),
            interest_owed: Amount::from_units(5),
            remaining_principal: Amount::from_units(100),
            fully_repaid: false,
            owner: Address::new("0xowner").unwrap(),
        }
    }

    #[test]
    fn test_valid_note_ingests() {
        let note = Note::try_from(record(1)).unwrap();
        assert_eq!(note.id(), NoteId(1));
        assert_eq!(note.outstanding(), Amount::from_units(105));
        assert!(!note.fully_repaid());
    }

    #[test]
    fn test_repaid_exceeding_principal_rejected() {
        let mut r = record(2);
        r.principal_repaid = Amount::from_units(101);
        // Keep the derived field consistent with the bogus repaid figure so
        // the repaid check fires first.
        r.remaining_principal = Amount::ZERO;
        assert!(matches!(
            Note::try_from(r),
            Err(NoteIntegrityError::RepaidExceedsPrincipal { .. })
        ));
    }

    #[test]
    fn test_remaining_mismatch_rejected() {
        let mut r = record(3);
        r.remaining_principal = Amount::from_units(99);
        assert!(matches!(
            Note::try_from(r),
            Err(NoteIntegrityError::RemainingMismatch { .. })
        ));
    }

    #[test]
    fn test_fully_repaid_flag_must_match_figures() {
        // Flag set while value is still outstanding.
        let mut r = record(4);
        r.fully_repaid = true;
        assert!(matches!(
            Note::try_from(r),
            Err(NoteIntegrityError::FullyRepaidMismatch { .. })
        ));

        // Flag clear while nothing is outstanding.
        let mut r = record(5);
        r.principal_repaid = r.principal;
        r.remaining_principal = Amount::ZERO;
        r.interest_owed = Amount::ZERO;
        r.fully_repaid = false;
        assert!(matches!(
            Note::try_from(r),
            Err(NoteIntegrityError::FullyRepaidMismatch { .. })
        ));
    }

    #[test]
    fn test_settled_note_ingests() {
        let mut r = record(6);
        r.principal_repaid = r.principal;
        r.remaining_principal = Amount::ZERO;
        r.interest_owed = Amount::ZERO;
        r.interest_paid = Amount::from_units(5);
        r.fully_repaid = true;
        let note = Note::try_from(r).unwrap();
        assert!(note.fully_repaid());
        assert_eq!(note.outstanding(), Amount::ZERO);
    }

    #[test]
    fn test_outstanding_overflow_rejected() {
        let mut r = record(7);
        r.principal = Amount::MAX;
        r.remaining_principal = Amount::MAX;
        r.interest_owed = Amount::from_raw(1);
        assert!(matches!(
            Note::try_from(r),
            Err(NoteIntegrityError::OutstandingOverflow { .. })
        ));
    }

    #[test]
    fn test_record_rejects_unknown_fields() {
        let json = r#"{
            "id": 1,
            "tranche_id": 1,
            "apr_bps": 800,
            "principal": 100,
            "principal_repaid": 0,
            "interest_paid": 0,
            "interest_accrued": 0,
            "interest_owed": 0,
            "remaining_principal": 100,
            "fully_repaid": false,
            "owner": "0xowner",
            "surprise": true
        }"#;
        let result: Result<NoteRecord, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
