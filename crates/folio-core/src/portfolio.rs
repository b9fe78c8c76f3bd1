//! Portfolio reduction over a set of owned notes.
//!
//! The snapshot is recomputed from current ledger reads, never stored. All
//! sums run in the scaled integer domain with checked arithmetic, and the
//! reduction is order-independent: permuting the input notes yields an
//! identical snapshot.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::{Amount, AmountError, BPS_SCALE};
use crate::note::Note;

/// Errors from portfolio reduction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PortfolioError {
    /// A checked sum overflowed.
    #[error(transparent)]
    Amount(#[from] AmountError),

    /// The APR-weighting accumulator overflowed.
    #[error("weighted APR accumulator overflow")]
    WeightOverflow,
}

/// Aggregated view of all notes owned by one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortfolioSnapshot {
    /// Notes still carrying outstanding value.
    pub open_notes: u64,
    /// Notes terminally settled.
    pub repaid_notes: u64,
    /// Sum of funded principal across all notes.
    pub total_principal: Amount,
    /// Sum of interest paid across all notes.
    pub total_interest_paid: Amount,
    /// Sum of principal repaid across all notes.
    pub total_principal_repaid: Amount,
    /// Sum of `remaining_principal + interest_owed` across all notes.
    pub outstanding_value: Amount,
    /// Principal-weighted average APR in basis points (0 with no principal).
    pub weighted_apr_bps: u32,
}

/// Reduces a set of notes into a [`PortfolioSnapshot`].
///
/// The weighted APR is `sum(apr_i * principal_i) / sum(principal_i)`,
/// computed entirely in `u128`. An empty input yields the all-zero snapshot.
///
/// # Errors
///
/// Returns `PortfolioError` if any checked sum overflows.
pub fn reduce<'a, I>(notes: I) -> Result<PortfolioSnapshot, PortfolioError>
where
    I: IntoIterator<Item = &'a Note>,
{
    let mut snapshot = PortfolioSnapshot::default();
    let mut apr_weight: u128 = 0;

    for note in notes {
        if note.fully_repaid() {
            snapshot.repaid_notes += 1;
        } else {
            snapshot.open_notes += 1;
        }
        snapshot.total_principal = snapshot.total_principal.checked_add(note.principal())?;
        snapshot.total_interest_paid = snapshot
            .total_interest_paid
            .checked_add(note.interest_paid())?;
        snapshot.total_principal_repaid = snapshot
            .total_principal_repaid
            .checked_add(note.principal_repaid())?;
        snapshot.outstanding_value = snapshot.outstanding_value.checked_add(note.outstanding())?;

        let weight = u128::from(note.apr_bps())
            .checked_mul(note.principal().raw())
            .ok_or(PortfolioError::WeightOverflow)?;
        apr_weight = apr_weight
            .checked_add(weight)
            .ok_or(PortfolioError::WeightOverflow)?;
    }

    if !snapshot.total_principal.is_zero() {
        let average = apr_weight / snapshot.total_principal.raw();
        snapshot.weighted_apr_bps =
            u32::try_from(average).map_err(|_| PortfolioError::WeightOverflow)?;
    }

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{Address, NoteId, TrancheId};
    use crate::note::NoteRecord;

    fn note(id: u64, principal: u64, apr_bps: u32, repaid: bool) -> Note {
        let principal = Amount::from_units(principal);
        let record = if repaid {
            NoteRecord {
                id: NoteId(id),
                tranche_id: TrancheId(1),
                apr_bps,
                principal,
                principal_repaid: principal,
                interest_paid: Amount::from_units(2),
                interest_accrued: Amount::from_units(2),
                interest_owed: Amount::ZERO,
                remaining_principal: Amount::ZERO,
                fully_repaid: true,
                owner: Address::new("0xowner").unwrap(),
            }
        } else {
            NoteRecord {
                id: NoteId(id),
                tranche_id: TrancheId(1),
                apr_bps,
                principal,
                principal_repaid: Amount::ZERO,
                interest_paid: Amount::ZERO,
                interest_accrued: Amount::from_units(1),
                interest_owed: Amount::from_units(1),
                remaining_principal: principal,
                fully_repaid: false,
                owner: Address::new("0xowner").unwrap(),
            }
        };
        Note::try_from(record).unwrap()
    }

    #[test]
    fn test_empty_reduction_is_all_zero() {
        let snapshot = reduce([]).unwrap();
        assert_eq!(snapshot, PortfolioSnapshot::default());
        assert_eq!(snapshot.weighted_apr_bps, 0);
    }

    #[test]
    fn test_mixed_portfolio() {
        let notes = [
            note(1, 100, 800, false),
            note(2, 300, 1_200, false),
            note(3, 50, 600, true),
        ];
        let snapshot = reduce(&notes).unwrap();

        assert_eq!(snapshot.open_notes, 2);
        assert_eq!(snapshot.repaid_notes, 1);
        assert_eq!(snapshot.total_principal, Amount::from_units(450));
        assert_eq!(snapshot.total_interest_paid, Amount::from_units(2));
        assert_eq!(snapshot.total_principal_repaid, Amount::from_units(50));
        // Two open notes, each 1 unit of interest owed on top of remaining
        // principal: 100 + 1 + 300 + 1.
        assert_eq!(snapshot.outstanding_value, Amount::from_units(402));
        // (100*800 + 300*1200 + 50*600) / 450 = 470000 / 450 = 1044 (floored).
        assert_eq!(snapshot.weighted_apr_bps, 1_044);
    }

    #[test]
    fn test_reduction_is_order_independent() {
        let mut notes = vec![
            note(1, 10, 500, false),
            note(2, 20, 700, true),
            note(3, 30, 900, false),
            note(4, 40, 1_100, false),
        ];
        let forward = reduce(&notes).unwrap();
        notes.reverse();
        assert_eq!(reduce(&notes).unwrap(), forward);
        notes.rotate_left(1);
        assert_eq!(reduce(&notes).unwrap(), forward);
    }

    #[test]
    fn test_single_note_apr_passes_through() {
        let notes = [note(1, 100, 850, false)];
        assert_eq!(reduce(&notes).unwrap().weighted_apr_bps, 850);
    }

    #[test]
    fn test_zero_principal_notes_yield_zero_apr() {
        // A portfolio of settled zero-principal notes has no weight at all.
        let snapshot = reduce([]).unwrap();
        assert_eq!(snapshot.weighted_apr_bps, 0);
    }

    #[test]
    fn test_snapshot_serde_round_trip() {
        let notes = [note(1, 100, 800, false)];
        let snapshot = reduce(&notes).unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: PortfolioSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_bps_scale_constant_alignment() {
        // Weighted APR shares the bps domain with the amount helpers.
        assert_eq!(BPS_SCALE, 10_000);
    }
}
