//! Read path: decides whether a paste is visible and spends one view.
//!
//! The controller holds no mutable state of its own. The view budget lives
//! in the store, and the only write on this path is the store's atomic
//! decrement, so any number of concurrent readers can share one controller.

use serde::Serialize;
use tracing::debug;

use crate::error::{PasteError, StoreError};
use crate::store::{CasOutcome, Decrement, PasteRecord, RecordStore, VersionedStore};

/// What a successful read hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessResult {
    pub content: String,
    /// Views left after this one, or `None` when unlimited.
    pub remaining_views: Option<u32>,
    pub expires_at: Option<i64>,
}

#[derive(Clone)]
pub struct AccessController<S> {
    store: S,
}

impl<S: RecordStore> AccessController<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read paste `id` as of `now` (epoch ms), consuming one view if it is limited.
    ///
    /// Absent, expired and exhausted pastes all fail with
    /// [`PasteError::NotFound`]. A failed call never changes the view count.
    pub fn access(&self, id: &str, now: i64) -> Result<AccessResult, PasteError> {
        let record = self.store.get(id)?.ok_or(PasteError::NotFound)?;

        if record.is_expired(now) {
            debug!(id, "paste expired");
            return Err(PasteError::NotFound);
        }
        if record.is_exhausted() {
            debug!(id, "paste out of views");
            return Err(PasteError::NotFound);
        }

        let remaining_views = match record.max_views {
            None => None,
            Some(_) => match self.store.decrement_views_if_positive(id)? {
                Decrement::Remaining(left) => Some(left),
                // Someone else spent the last view (or the sweep removed the
                // record) between our read and the decrement.
                Decrement::AlreadyZero | Decrement::NotFound => return Err(PasteError::NotFound),
                // A limited record never loses its budget; the store is inconsistent.
                Decrement::Unlimited => {
                    return Err(PasteError::StoreUnavailable(anyhow::anyhow!(
                        "paste {id} has a view limit but the store decremented it as unlimited"
                    )))
                }
            },
        };

        let PasteRecord {
            content,
            expires_at,
            ..
        } = record;
        Ok(AccessResult {
            content,
            remaining_views,
            expires_at,
        })
    }
}

/// Default number of compare-and-set attempts before giving up.
pub const DEFAULT_CAS_ATTEMPTS: u32 = 16;

/// Adapts a [`VersionedStore`] into a [`RecordStore`] by retrying
/// compare-and-set until the decrement lands or the budget runs out.
pub struct Optimistic<S> {
    inner: S,
    max_attempts: u32,
}

impl<S: VersionedStore> Optimistic<S> {
    pub fn new(inner: S) -> Self {
        Self::with_max_attempts(inner, DEFAULT_CAS_ATTEMPTS)
    }

    pub fn with_max_attempts(inner: S, max_attempts: u32) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: VersionedStore> RecordStore for Optimistic<S> {
    fn insert(&self, record: &PasteRecord) -> Result<(), StoreError> {
        self.inner.insert(record)
    }

    fn get(&self, id: &str) -> Result<Option<PasteRecord>, StoreError> {
        Ok(self.inner.get_versioned(id)?.map(|v| v.value))
    }

    fn decrement_views_if_positive(&self, id: &str) -> Result<Decrement, StoreError> {
        for attempt in 1..=self.max_attempts {
            let Some(current) = self.inner.get_versioned(id)? else {
                return Ok(Decrement::NotFound);
            };
            let left = match current.value.remaining_views {
                None => return Ok(Decrement::Unlimited),
                Some(0) => return Ok(Decrement::AlreadyZero),
                Some(n) => n - 1,
            };
            match self.inner.compare_and_set_views(id, current.version, left)? {
                CasOutcome::Applied => return Ok(Decrement::Remaining(left)),
                CasOutcome::Missing => return Ok(Decrement::NotFound),
                CasOutcome::Stale => {
                    debug!(id, attempt, "view decrement lost a race, retrying");
                    std::thread::yield_now();
                }
            }
        }
        Err(StoreError::Conflict {
            attempts: self.max_attempts,
        })
    }
}
