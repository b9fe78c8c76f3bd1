//! # folio-client
//!
//! Async client for an external funding ledger: stages and executes
//! financial actions (deposits, repayments, transfers, grants) with
//! exact-preview accounting, an explicit per-action state machine with
//! grant-then-act ordering, and background portfolio aggregation.
//!
//! The ledger is authoritative; this crate validates fail-closed before
//! submitting, never auto-retries a write, and treats every preview as
//! advisory. The pure accounting lives in `folio-core`; this crate adds the
//! IO boundary ([`LedgerProvider`]), the orchestration, and the background
//! machinery.
//!
//! ## Entry points
//!
//! - [`FolioClient`]: the facade most callers want.
//! - [`TransactionOrchestrator`]: the action state machine, usable directly.
//! - [`PortfolioWatcher`]: background snapshot refresh for one owner.
//!
//! Enable the `testing` feature for [`memory::MemoryLedger`], a scriptable
//! in-memory provider for integration tests.

#![warn(missing_docs)]

pub mod action;
pub mod aggregate;
pub mod allowance;
pub mod client;
pub mod config;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod orchestrator;
pub mod provider;
pub mod watcher;

pub use action::{
    ActionError, ActionEvent, ActionKind, ActionRequest, ActionState, ActionTarget, Invalidation,
    PendingAction,
};
pub use aggregate::{AggregateError, NoteAggregator};
pub use allowance::{AllowanceGate, GrantPolicy};
pub use client::{FolioClient, QueryError};
pub use config::{ClientConfig, ConfigError};
pub use orchestrator::{ActionReceipt, TransactionOrchestrator};
pub use provider::{
    ConfirmationStatus, LedgerError, LedgerOperation, LedgerProvider, ReadRetryPolicy,
};
pub use watcher::PortfolioWatcher;
