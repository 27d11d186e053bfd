use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::model::PasteRecord;
use super::{CasOutcome, VersionedStore, Versioned};
use crate::error::StoreError;

/// In-memory paste store exposing only versioned reads and compare-and-set.
///
/// Every successful write bumps the record's version, so a writer holding a
/// stale read loses the race instead of overwriting a newer count. It has no
/// atomic decrement of its own, so it is read through `Optimistic`. Nothing
/// survives a restart and the server never mounts it.
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<String, Versioned<PasteRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every paste that can no longer be read at `now`. Returns how many were removed.
    pub fn prune(&self, now: i64) -> usize {
        let before = self.records.len();
        self.records.retain(|_, v| v.value.is_accessible(now));
        before - self.records.len()
    }
}

impl VersionedStore for MemoryStore {
    fn insert(&self, record: &PasteRecord) -> Result<(), StoreError> {
        match self.records.entry(record.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::UniqueConflict),
            Entry::Vacant(slot) => {
                slot.insert(Versioned {
                    value: record.clone(),
                    version: 0,
                });
                Ok(())
            }
        }
    }

    fn get_versioned(&self, id: &str) -> Result<Option<Versioned<PasteRecord>>, StoreError> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    fn compare_and_set_views(
        &self,
        id: &str,
        expected_version: u64,
        remaining: u32,
    ) -> Result<CasOutcome, StoreError> {
        let Some(mut slot) = self.records.get_mut(id) else {
            return Ok(CasOutcome::Missing);
        };
        if slot.version != expected_version {
            return Ok(CasOutcome::Stale);
        }
        slot.value.remaining_views = Some(remaining);
        slot.version += 1;
        Ok(CasOutcome::Applied)
    }
}
