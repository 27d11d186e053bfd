pub mod db;
pub mod memory;
pub mod model;

pub use db::Store;
pub use memory::MemoryStore;
pub use model::PasteRecord;

use crate::error::StoreError;

/// Result of an atomic "decrement if positive" on a paste's view budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decrement {
    /// One view was consumed; holds the count left afterwards.
    Remaining(u32),
    /// The budget was already spent. Nothing changed.
    AlreadyZero,
    /// The paste has no view limit. Nothing changed.
    Unlimited,
    /// No paste with that id.
    NotFound,
}

/// Durable storage for pastes.
///
/// `decrement_views_if_positive` must be atomic: concurrent callers on the
/// same id each consume a distinct unit of the budget, and none of them can
/// drive it below zero.
pub trait RecordStore: Send + Sync {
    /// Persist a new record. Fails with [`StoreError::UniqueConflict`] if the id is taken.
    fn insert(&self, record: &PasteRecord) -> Result<(), StoreError>;

    fn get(&self, id: &str) -> Result<Option<PasteRecord>, StoreError>;

    fn decrement_views_if_positive(&self, id: &str) -> Result<Decrement, StoreError>;
}

impl<S: RecordStore + ?Sized> RecordStore for std::sync::Arc<S> {
    fn insert(&self, record: &PasteRecord) -> Result<(), StoreError> {
        (**self).insert(record)
    }

    fn get(&self, id: &str) -> Result<Option<PasteRecord>, StoreError> {
        (**self).get(id)
    }

    fn decrement_views_if_positive(&self, id: &str) -> Result<Decrement, StoreError> {
        (**self).decrement_views_if_positive(id)
    }
}

/// A record paired with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Outcome of a compare-and-set against a record version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Applied,
    /// The record changed since it was read.
    Stale,
    /// The record is gone.
    Missing,
}

/// Storage that can only offer versioned reads and compare-and-set writes.
///
/// Wrap it in [`crate::access::Optimistic`] to obtain a [`RecordStore`].
pub trait VersionedStore: Send + Sync {
    fn insert(&self, record: &PasteRecord) -> Result<(), StoreError>;

    fn get_versioned(&self, id: &str) -> Result<Option<Versioned<PasteRecord>>, StoreError>;

    /// Set `remaining_views` to `remaining` if the record is still at `expected_version`.
    fn compare_and_set_views(
        &self,
        id: &str,
        expected_version: u64,
        remaining: u32,
    ) -> Result<CasOutcome, StoreError>;
}
