//! Match preview: expected externally-matched amount for a candidate
//! contribution.
//!
//! The match is advisory and non-binding. The ledger's own values at write
//! time govern the outcome; this calculator exists so the preview a caller
//! sees uses exactly the ledger's capping rules and can explain which cap
//! bound a partial match.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::{Amount, AmountError};

/// Upper bound on the match ratio (1000%), to reject nonsense inputs.
pub const MAX_MATCH_RATIO_BPS: u32 = 100_000;

/// Errors from match preview computation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PreviewError {
    /// The match ratio exceeds [`MAX_MATCH_RATIO_BPS`].
    #[error("match ratio {ratio_bps} bps exceeds maximum {MAX_MATCH_RATIO_BPS}")]
    RatioOutOfRange {
        /// The rejected ratio.
        ratio_bps: u32,
    },

    /// Scaled arithmetic overflowed.
    #[error(transparent)]
    Amount(#[from] AmountError),
}

/// Ledger-side inputs for the match preview, read fresh per preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchInputs {
    /// Remaining space in the tranche's matched-funds budget.
    pub remaining_match_capacity: Amount,
    /// Funds the external vault can still commit.
    pub vault_available: Amount,
    /// Match ratio in basis points (10,000 = 1:1).
    pub match_ratio_bps: u32,
}

/// Which cap bound a partial match, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitingFactor {
    /// The theoretical match fit inside both caps.
    None,
    /// The tranche's matched-funds budget bound the result.
    TrancheCapacity,
    /// The vault's available funds bound the result.
    VaultFunds,
}

/// Outcome of a match preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPreview {
    /// The matched amount the ledger is expected to add.
    pub match_amount: Amount,
    /// `match_amount` as a floored basis-point fraction of the candidate
    /// (0 when the candidate is zero).
    pub match_percent_bps: u32,
    /// Which cap bound the result.
    pub limiting_factor: LimitingFactor,
}

/// Computes the expected match for a candidate contribution.
///
/// The theoretical match is `candidate * match_ratio_bps / 10_000` (floored);
/// the actual match is capped by both the tranche's remaining match budget
/// and the vault's available funds. When both caps bind at the same value,
/// the tranche capacity is reported as the limiting factor.
///
/// # Errors
///
/// Returns `PreviewError::RatioOutOfRange` for a ratio above
/// [`MAX_MATCH_RATIO_BPS`], or `PreviewError::Amount` on arithmetic
/// overflow.
pub fn preview_match(candidate: Amount, inputs: &MatchInputs) -> Result<MatchPreview, PreviewError> {
    if inputs.match_ratio_bps > MAX_MATCH_RATIO_BPS {
        return Err(PreviewError::RatioOutOfRange {
            ratio_bps: inputs.match_ratio_bps,
        });
    }

    let theoretical = candidate.checked_scale_bps(inputs.match_ratio_bps)?;
    let match_amount = theoretical
        .min(inputs.remaining_match_capacity)
        .min(inputs.vault_available);

    let limiting_factor = if match_amount == theoretical {
        LimitingFactor::None
    } else if inputs.remaining_match_capacity <= inputs.vault_available {
        LimitingFactor::TrancheCapacity
    } else {
        LimitingFactor::VaultFunds
    };

    let match_percent_bps = match_amount.ratio_bps_of(candidate)?;

    Ok(MatchPreview {
        match_amount,
        match_percent_bps,
        limiting_factor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(capacity: u64, vault: u64, ratio_bps: u32) -> MatchInputs {
        MatchInputs {
            remaining_match_capacity: Amount::from_units(capacity),
            vault_available: Amount::from_units(vault),
            match_ratio_bps: ratio_bps,
        }
    }

    #[test]
    fn test_tranche_capacity_limits() {
        // candidate 200, capacity 150, vault 1000, ratio 1:1 -> 150.
        let preview = preview_match(Amount::from_units(200), &inputs(150, 1_000, 10_000)).unwrap();
        assert_eq!(preview.match_amount, Amount::from_units(150));
        assert_eq!(preview.limiting_factor, LimitingFactor::TrancheCapacity);
        assert_eq!(preview.match_percent_bps, 7_500);
    }

    #[test]
    fn test_vault_funds_limit() {
        let preview = preview_match(Amount::from_units(200), &inputs(1_000, 80, 10_000)).unwrap();
        assert_eq!(preview.match_amount, Amount::from_units(80));
        assert_eq!(preview.limiting_factor, LimitingFactor::VaultFunds);
        assert_eq!(preview.match_percent_bps, 4_000);
    }

    #[test]
    fn test_unbound_match() {
        let preview = preview_match(Amount::from_units(10), &inputs(1_000, 1_000, 10_000)).unwrap();
        assert_eq!(preview.match_amount, Amount::from_units(10));
        assert_eq!(preview.limiting_factor, LimitingFactor::None);
        assert_eq!(preview.match_percent_bps, 10_000);
    }

    #[test]
    fn test_partial_ratio() {
        let preview = preview_match(Amount::from_units(100), &inputs(1_000, 1_000, 5_000)).unwrap();
        assert_eq!(preview.match_amount, Amount::from_units(50));
        assert_eq!(preview.limiting_factor, LimitingFactor::None);
        assert_eq!(preview.match_percent_bps, 5_000);
    }

    #[test]
    fn test_equal_binding_caps_report_tranche_capacity() {
        let preview = preview_match(Amount::from_units(200), &inputs(150, 150, 10_000)).unwrap();
        assert_eq!(preview.match_amount, Amount::from_units(150));
        assert_eq!(preview.limiting_factor, LimitingFactor::TrancheCapacity);
    }

    #[test]
    fn test_zero_candidate_yields_zero_percent() {
        let preview = preview_match(Amount::ZERO, &inputs(150, 1_000, 10_000)).unwrap();
        assert_eq!(preview.match_amount, Amount::ZERO);
        assert_eq!(preview.match_percent_bps, 0);
        assert_eq!(preview.limiting_factor, LimitingFactor::None);
    }

    #[test]
    fn test_ratio_out_of_range_rejected() {
        let err =
            preview_match(Amount::from_units(1), &inputs(10, 10, MAX_MATCH_RATIO_BPS + 1))
                .unwrap_err();
        assert!(matches!(err, PreviewError::RatioOutOfRange { .. }));
    }

    #[test]
    fn test_zero_capacity_fully_limits() {
        let preview = preview_match(Amount::from_units(200), &inputs(0, 1_000, 10_000)).unwrap();
        assert_eq!(preview.match_amount, Amount::ZERO);
        assert_eq!(preview.limiting_factor, LimitingFactor::TrancheCapacity);
        assert_eq!(preview.match_percent_bps, 0);
    }
}
