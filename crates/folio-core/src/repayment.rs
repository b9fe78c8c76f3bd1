//! Repayment allocation: interest-first split of a payment.
//!
//! This mirrors the ledger's own accounting rule exactly, because the split
//! is shown to the user as a preview of what the ledger will do. Interest is
//! settled before principal; paying more than the note's total outstanding
//! value is rejected up front rather than silently truncated.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::{Amount, AmountError};

/// Errors from repayment allocation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RepaymentError {
    /// The payment exceeds `interest_owed + remaining_principal`.
    #[error("payment {payment} exceeds outstanding value {maximum}")]
    Overpayment {
        /// The rejected payment.
        payment: Amount,
        /// Maximum acceptable payment.
        maximum: Amount,
    },

    /// `interest_owed + remaining_principal` overflows.
    #[error(transparent)]
    Amount(#[from] AmountError),
}

/// How a payment divides between interest and principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepaymentSplit {
    /// Portion applied to interest owed.
    pub interest_portion: Amount,
    /// Portion applied to remaining principal.
    pub principal_portion: Amount,
}

/// Splits `payment` into interest and principal portions under the ledger's
/// interest-first rule.
///
/// `interest_portion = min(payment, interest_owed)`; the remainder goes to
/// principal. For any accepted payment, `interest_portion +
/// principal_portion == payment`.
///
/// A zero payment is valid arithmetic (both portions zero); callers staging
/// a write reject zero amounts separately.
///
/// # Errors
///
/// Returns `RepaymentError::Overpayment` if `payment > interest_owed +
/// remaining_principal`, or `RepaymentError::Amount` if the outstanding
/// total itself overflows.
pub fn allocate(
    payment: Amount,
    interest_owed: Amount,
    remaining_principal: Amount,
) -> Result<RepaymentSplit, RepaymentError> {
    let maximum = interest_owed.checked_add(remaining_principal)?;
    if payment > maximum {
        return Err(RepaymentError::Overpayment { payment, maximum });
    }

    let interest_portion = payment.min(interest_owed);
    // Exact: interest_portion <= payment by construction.
    let principal_portion = payment.saturating_sub(interest_portion);

    Ok(RepaymentSplit {
        interest_portion,
        principal_portion,
    })
}
