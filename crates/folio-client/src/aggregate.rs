//! Owned-note enumeration and portfolio aggregation.
//!
//! The ledger exposes ownership as a count plus per-index lookup, and the
//! index can shift while we walk it (a transfer, a new note). Enumeration is
//! therefore lazy and restartable: the count is read at the first poll of
//! each stream, and a note that vanishes between the index read and the
//! detail read is skipped rather than failing the walk.

use std::sync::Arc;

use folio_core::{reduce, Address, Note, PortfolioError, PortfolioSnapshot};
use futures::stream::{self, Stream, TryStreamExt};
use thiserror::Error;
use tracing::debug;

use crate::provider::{LedgerError, LedgerProvider, ReadRetryPolicy};

/// Failures while aggregating a portfolio.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AggregateError {
    /// A ledger read failed after retries.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The validated notes could not be reduced without overflow.
    #[error(transparent)]
    Portfolio(#[from] PortfolioError),
}

/// Walks an owner's notes and reduces them to a portfolio snapshot.
#[derive(Clone)]
pub struct NoteAggregator {
    provider: Arc<dyn LedgerProvider>,
    retry: ReadRetryPolicy,
}

struct Enumeration {
    provider: Arc<dyn LedgerProvider>,
    retry: ReadRetryPolicy,
    owner: Address,
    index: u64,
    count: Option<u64>,
}

impl NoteAggregator {
    /// Builds an aggregator over a provider.
    #[must_use]
    pub fn new(provider: Arc<dyn LedgerProvider>, retry: ReadRetryPolicy) -> Self {
        Self { provider, retry }
    }

    /// Streams the validated notes currently owned by `owner`.
    ///
    /// Nothing is read until the stream is first polled, and each returned
    /// stream re-reads the count, so callers refresh by starting a new
    /// stream. Notes that disappear mid-walk are skipped; connectivity
    /// failures surface after the retry budget and end the stream.
    pub fn owned_notes(
        &self,
        owner: Address,
    ) -> impl Stream<Item = Result<Note, LedgerError>> + Send {
        let state = Enumeration {
            provider: self.provider.clone(),
            retry: self.retry,
            owner,
            index: 0,
            count: None,
        };
        stream::try_unfold(state, |mut state| async move {
            loop {
                let count = match state.count {
                    Some(count) => count,
                    None => {
                        let fresh = state
                            .retry
                            .run(|| state.provider.owned_note_count(&state.owner))
                            .await?;
                        debug!(owner = %state.owner, count = fresh, "owned-note enumeration");
                        state.count = Some(fresh);
                        fresh
                    },
                };
                if state.index >= count {
                    return Ok(None);
                }
                let index = state.index;
                state.index += 1;

                let id = match state
                    .retry
                    .run(|| state.provider.owned_note_at(&state.owner, index))
                    .await
                {
                    Ok(id) => id,
                    Err(LedgerError::NotFound { .. }) => {
                        // The index shifted under us; skip the hole.
                        debug!(owner = %state.owner, index, "ownership index entry vanished");
                        continue;
                    },
                    Err(error) => return Err(error),
                };
                match state.retry.run(|| state.provider.note(id)).await {
                    Ok(note) => return Ok(Some((note, state))),
                    Err(LedgerError::NotFound { .. }) => {
                        debug!(%id, "note vanished between index and detail read");
                        continue;
                    },
                    Err(error) => return Err(error),
                }
            }
        })
    }

    /// Reads all of `owner`'s notes and reduces them to a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `AggregateError::Ledger` if enumeration fails after retries,
    /// or `AggregateError::Portfolio` if the sums overflow.
    pub async fn snapshot(&self, owner: &Address) -> Result<PortfolioSnapshot, AggregateError> {
        let notes: Vec<Note> = self.owned_notes(owner.clone()).try_collect().await?;
        let snapshot = reduce(&notes)?;
        debug!(
            %owner,
            open = snapshot.open_notes,
            repaid = snapshot.repaid_notes,
            outstanding = %snapshot.outstanding_value,
            "portfolio snapshot"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use folio_core::{Amount, NoteId};
    use futures::TryStreamExt;

    use super::*;
    use crate::memory::MemoryLedger;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn aggregator(ledger: &Arc<MemoryLedger>) -> NoteAggregator {
        NoteAggregator::new(ledger.clone(), ReadRetryPolicy::new(1, Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_stream_yields_all_owned_notes() {
        let ledger = Arc::new(MemoryLedger::new());
        let owner = addr("0xowner");
        ledger
            .seed_note(&owner, Amount::from_units(100), 500)
            .await;
        ledger
            .seed_note(&owner, Amount::from_units(40), 750)
            .await;
        let notes: Vec<Note> = aggregator(&ledger)
            .owned_notes(owner)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].principal(), Amount::from_units(100));
        assert_eq!(notes[1].apr_bps(), 750);
    }

    #[tokio::test]
    async fn test_detached_note_is_skipped_not_fatal() {
        let ledger = Arc::new(MemoryLedger::new());
        let owner = addr("0xowner");
        let first = ledger
            .seed_note(&owner, Amount::from_units(100), 500)
            .await;
        ledger
            .seed_note(&owner, Amount::from_units(40), 750)
            .await;
        // The index still lists the note but the detail read fails.
        ledger.detach_note(first).await;
        let notes: Vec<Note> = aggregator(&ledger)
            .owned_notes(owner)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].principal(), Amount::from_units(40));
    }

    #[tokio::test]
    async fn test_stream_is_lazy_until_polled() {
        let ledger = Arc::new(MemoryLedger::new());
        let owner = addr("0xowner");
        let stream = aggregator(&ledger).owned_notes(owner);
        assert_eq!(ledger.read_count().await, 0);
        drop(stream);
        assert_eq!(ledger.read_count().await, 0);
    }

    #[tokio::test]
    async fn test_snapshot_for_empty_owner_is_default() {
        let ledger = Arc::new(MemoryLedger::new());
        let snapshot = aggregator(&ledger)
            .snapshot(&addr("0xnobody"))
            .await
            .unwrap();
        assert_eq!(snapshot, PortfolioSnapshot::default());
    }

    #[tokio::test]
    async fn test_connectivity_failure_surfaces_after_budget() {
        let ledger = Arc::new(MemoryLedger::new());
        let owner = addr("0xowner");
        ledger
            .seed_note(&owner, Amount::from_units(100), 500)
            .await;
        ledger.fail_reads(5).await;
        let result = aggregator(&ledger).snapshot(&owner).await;
        assert!(matches!(
            result,
            Err(AggregateError::Ledger(LedgerError::Connectivity { .. }))
        ));
    }

    #[tokio::test]
    async fn test_note_not_found_id_mentions_note() {
        let ledger = Arc::new(MemoryLedger::new());
        let err = ledger.note(NoteId(99)).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { entity: "note", .. }));
    }
}
