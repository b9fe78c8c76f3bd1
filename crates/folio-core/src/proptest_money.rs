//! Property-based tests for the money calculators.
//!
//! These verify the allocation, match-preview, and portfolio-reduction
//! invariants over randomized scaled amounts.

use proptest::prelude::*;

use crate::amount::{Amount, BPS_SCALE, UNIT};
use crate::id::{Address, NoteId, TrancheId};
use crate::note::{Note, NoteRecord};
use crate::portfolio::reduce;
use crate::preview::{preview_match, LimitingFactor, MatchInputs};
use crate::repayment::{allocate, RepaymentError};

/// Strategy for scaled amounts up to one million units (keeps intermediate
/// products far from `u128` overflow).
fn amount_raw() -> impl Strategy<Value = u128> {
    0u128..=1_000_000 * UNIT
}

fn amount() -> impl Strategy<Value = Amount> {
    amount_raw().prop_map(Amount::from_raw)
}

fn note_strategy() -> impl Strategy<Value = Note> {
    (1u64..10_000, amount_raw(), amount_raw(), amount_raw(), 0u32..20_000).prop_map(
        |(id, principal, repaid, interest_owed, apr_bps)| {
            let principal = Amount::from_raw(principal.max(repaid));
            let repaid = Amount::from_raw(repaid.min(principal.raw()));
            let remaining = principal.saturating_sub(repaid);
            let interest_owed = Amount::from_raw(interest_owed);
            let fully_repaid = remaining.is_zero() && interest_owed.is_zero();
            Note::try_from(NoteRecord {
                id: NoteId(id),
                tranche_id: TrancheId(1),
                apr_bps,
                principal,
                principal_repaid: repaid,
                interest_paid: repaid,
                interest_accrued: interest_owed,
                interest_owed,
                remaining_principal: remaining,
                fully_repaid,
                owner: Address::new("0xprop").unwrap(),
            })
            .expect("strategy builds consistent records")
        },
    )
}

proptest! {
    /// Property: any accepted payment is conserved across the split, and
    /// each portion respects its cap.
    #[test]
    fn prop_allocate_conserves_and_caps(
        interest_owed in amount(),
        remaining in amount(),
        payment_fraction in 0u128..=10_000,
    ) {
        let maximum = interest_owed.checked_add(remaining).unwrap();
        let payment = Amount::from_raw(maximum.raw() / BPS_SCALE * payment_fraction);
        prop_assume!(payment <= maximum);

        let split = allocate(payment, interest_owed, remaining).unwrap();
        prop_assert_eq!(
            split.interest_portion.checked_add(split.principal_portion).unwrap(),
            payment
        );
        prop_assert!(split.interest_portion <= interest_owed);
        prop_assert!(split.principal_portion <= remaining);
    }

    /// Property: any payment above the outstanding total fails closed.
    #[test]
    fn prop_allocate_rejects_overpayment(
        interest_owed in amount(),
        remaining in amount(),
        excess in 1u128..=UNIT,
    ) {
        let maximum = interest_owed.checked_add(remaining).unwrap();
        let payment = maximum.checked_add(Amount::from_raw(excess)).unwrap();
        prop_assert!(
            matches!(
                allocate(payment, interest_owed, remaining),
                Err(RepaymentError::Overpayment { .. })
            ),
            "expected Overpayment error"
        );
    }

    /// Property: the match never exceeds the theoretical ratio or either
    /// cap, and the limiting factor names the tightest bound.
    #[test]
    fn prop_preview_respects_all_bounds(
        candidate in amount(),
        capacity in amount(),
        vault in amount(),
        ratio_bps in 0u32..=20_000,
    ) {
        let inputs = MatchInputs {
            remaining_match_capacity: capacity,
            vault_available: vault,
            match_ratio_bps: ratio_bps,
        };
        let preview = preview_match(candidate, &inputs).unwrap();
        let theoretical = candidate.checked_scale_bps(ratio_bps).unwrap();

        prop_assert!(preview.match_amount <= theoretical);
        prop_assert!(preview.match_amount <= capacity);
        prop_assert!(preview.match_amount <= vault);

        match preview.limiting_factor {
            LimitingFactor::None => prop_assert_eq!(preview.match_amount, theoretical),
            LimitingFactor::TrancheCapacity => {
                prop_assert_eq!(preview.match_amount, capacity);
                prop_assert!(capacity <= vault);
                prop_assert!(capacity < theoretical);
            },
            LimitingFactor::VaultFunds => {
                prop_assert_eq!(preview.match_amount, vault);
                prop_assert!(vault < theoretical);
                prop_assert!(vault < capacity);
            },
        }
    }

    /// Property: reducing a permuted portfolio yields an identical snapshot.
    #[test]
    fn prop_reduce_is_order_independent(
        mut notes in prop::collection::vec(note_strategy(), 0..12),
    ) {
        let forward = reduce(&notes).unwrap();
        notes.reverse();
        prop_assert_eq!(reduce(&notes).unwrap(), forward);
        if !notes.is_empty() {
            notes.rotate_left(1);
            prop_assert_eq!(reduce(&notes).unwrap(), forward);
        }
    }

    /// Property: snapshot counters partition the input.
    #[test]
    fn prop_reduce_counts_partition(notes in prop::collection::vec(note_strategy(), 0..12)) {
        let snapshot = reduce(&notes).unwrap();
        prop_assert_eq!(
            snapshot.open_notes + snapshot.repaid_notes,
            notes.len() as u64
        );
    }
}
