//! Failure taxonomy and translation of raw ledger failure text.
//!
//! Every failure surfaced to a caller carries one category from the closed
//! [`FailureKind`] taxonomy plus the untranslated source text in a detail
//! field. The raw text is never hidden and never shown as the primary
//! message.
//!
//! Translation order: exact match against known ledger revert identifiers,
//! then known substrings (wallet rejection phrasing, allowance and balance
//! phrasing), then `Unknown` with the raw message preserved.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed taxonomy of user-facing failure categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FailureKind {
    /// The user (or their signer) declined the request.
    UserRejected,
    /// The spending authorization does not cover the amount.
    InsufficientAllowance,
    /// The account balance does not cover the amount.
    InsufficientBalance,
    /// A capacity limit on the ledger was exceeded.
    CapacityExceeded,
    /// The referenced note or tranche does not exist.
    TargetNotFound,
    /// The ledger reverted the operation for a stated reason.
    LedgerRejected {
        /// The ledger's revert reason, verbatim.
        reason: String,
    },
    /// The ledger could not be reached.
    Connectivity,
    /// No known category matched.
    Unknown,
}

impl FailureKind {
    /// Returns the category as a stable string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UserRejected => "user_rejected",
            Self::InsufficientAllowance => "insufficient_allowance",
            Self::InsufficientBalance => "insufficient_balance",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::TargetNotFound => "target_not_found",
            Self::LedgerRejected { .. } => "ledger_rejected",
            Self::Connectivity => "connectivity",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserRejected => write!(f, "the request was declined by the signer"),
            Self::InsufficientAllowance => {
                write!(f, "the spending authorization does not cover this amount")
            },
            Self::InsufficientBalance => write!(f, "the account balance is insufficient"),
            Self::CapacityExceeded => write!(f, "the round's capacity would be exceeded"),
            Self::TargetNotFound => write!(f, "the referenced position no longer exists"),
            Self::LedgerRejected { reason } => write!(f, "the ledger rejected this: {reason}"),
            Self::Connectivity => write!(f, "the ledger could not be reached"),
            Self::Unknown => write!(f, "the operation failed for an unrecognized reason"),
        }
    }
}

/// A categorized failure with the untranslated source text preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedFailure {
    kind: FailureKind,
    detail: String,
}

impl TranslatedFailure {
    /// Builds a translated failure from a category and the raw source text.
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Returns the failure category.
    #[must_use]
    pub const fn kind(&self) -> &FailureKind {
        &self.kind
    }

    /// Returns the untranslated source text.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl fmt::Display for TranslatedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

/// Known ledger revert identifiers, matched exactly before any substring
/// heuristics run.
const REVERT_IDENTIFIERS: &[(&str, RevertCategory)] = &[
    ("INSUFFICIENT_ALLOWANCE", RevertCategory::InsufficientAllowance),
    ("INSUFFICIENT_BALANCE", RevertCategory::InsufficientBalance),
    ("CAP_EXCEEDED", RevertCategory::CapacityExceeded),
    ("MATCH_CAP_EXCEEDED", RevertCategory::CapacityExceeded),
    ("NOTE_NOT_FOUND", RevertCategory::TargetNotFound),
    ("TRANCHE_NOT_FOUND", RevertCategory::TargetNotFound),
    ("TRANCHE_NOT_ACTIVE", RevertCategory::LedgerRejected),
    ("TRANCHE_COLLECTED", RevertCategory::LedgerRejected),
    ("BELOW_MINIMUM_DEPOSIT", RevertCategory::LedgerRejected),
    ("NOT_NOTE_OWNER", RevertCategory::LedgerRejected),
    ("OVERPAYMENT", RevertCategory::LedgerRejected),
];

#[derive(Clone, Copy)]
enum RevertCategory {
    InsufficientAllowance,
    InsufficientBalance,
    CapacityExceeded,
    TargetNotFound,
    LedgerRejected,
}

impl RevertCategory {
    fn into_kind(self, raw: &str) -> FailureKind {
        match self {
            Self::InsufficientAllowance => FailureKind::InsufficientAllowance,
            Self::InsufficientBalance => FailureKind::InsufficientBalance,
            Self::CapacityExceeded => FailureKind::CapacityExceeded,
            Self::TargetNotFound => FailureKind::TargetNotFound,
            Self::LedgerRejected => FailureKind::LedgerRejected {
                reason: raw.to_string(),
            },
        }
    }
}

/// Translates raw revert or failure text into the closed taxonomy.
///
/// The raw text always survives in the detail field, whatever category is
/// chosen.
#[must_use]
pub fn translate_revert(raw: &str) -> TranslatedFailure {
    let trimmed = raw.trim();
    for (identifier, category) in REVERT_IDENTIFIERS {
        if trimmed == *identifier {
            return TranslatedFailure::new(category.into_kind(trimmed), raw);
        }
    }

    let lowered = trimmed.to_ascii_lowercase();
    let kind = if ["user rejected", "user denied", "rejected the request"]
        .iter()
        .any(|phrase| lowered.contains(phrase))
    {
        FailureKind::UserRejected
    } else if ["insufficient allowance", "exceeds allowance"]
        .iter()
        .any(|phrase| lowered.contains(phrase))
    {
        FailureKind::InsufficientAllowance
    } else if ["insufficient balance", "insufficient funds", "exceeds balance"]
        .iter()
        .any(|phrase| lowered.contains(phrase))
    {
        FailureKind::InsufficientBalance
    } else if ["cap exceeded", "capacity"]
        .iter()
        .any(|phrase| lowered.contains(phrase))
    {
        FailureKind::CapacityExceeded
    } else if ["not found", "nonexistent"]
        .iter()
        .any(|phrase| lowered.contains(phrase))
    {
        FailureKind::TargetNotFound
    } else {
        FailureKind::Unknown
    };

    TranslatedFailure::new(kind, raw)
}
