//! # folio-core
//!
//! Pure domain model for a client of an external funding ledger: fixed-point
//! amounts, validated ledger records, the accounting calculators that back
//! user-facing previews, and the closed failure taxonomy.
//!
//! This crate performs no IO and holds no async machinery; everything here
//! is deterministic and unit-testable in isolation. The async boundary to
//! the ledger lives in `folio-client`.
//!
//! ## Core Concepts
//!
//! - **Amount**: a `10^18`-scaled `u128` with checked arithmetic; values
//!   never pass through floating point before display.
//! - **Note**: one funded position, validated on ingest so corrupt ledger
//!   reads fail closed.
//! - **Tranche**: a time-boxed funding round with a capacity.
//! - **Previews**: [`preview::preview_match`] and [`repayment::allocate`]
//!   mirror the ledger's own capping and interest-first rules exactly, so a
//!   displayed preview is never computed under different accounting than the
//!   eventual write.
//! - **Failure taxonomy**: [`failure::translate_revert`] maps raw failure
//!   text into a closed category set while always preserving the raw text.

#![warn(missing_docs)]

pub mod amount;
pub mod failure;
pub mod id;
pub mod note;
pub mod portfolio;
pub mod preview;
pub mod repayment;
pub mod tranche;

#[cfg(test)]
mod proptest_money;

pub use amount::{Amount, AmountError};
pub use failure::{translate_revert, FailureKind, TranslatedFailure};
pub use id::{Address, IdError, NoteId, OperationHandle, TrancheId};
pub use note::{Note, NoteIntegrityError, NoteRecord};
pub use portfolio::{reduce, PortfolioError, PortfolioSnapshot};
pub use preview::{preview_match, LimitingFactor, MatchInputs, MatchPreview, PreviewError};
pub use repayment::{allocate, RepaymentError, RepaymentSplit};
pub use tranche::{Tranche, TrancheIntegrityError, TrancheRecord};
