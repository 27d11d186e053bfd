use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use redb::{Database, ReadableTable, TableDefinition};
use tokio::time;
use tracing::{debug, info, warn};

use super::model::PasteRecord;
use super::{Decrement, RecordStore};
use crate::error::StoreError;

const PASTES: TableDefinition<&str, &[u8]> = TableDefinition::new("pastes");

/// Thread-safe handle to the redb store.
///
/// redb runs one write transaction at a time, so every mutation below is
/// linearizable with respect to every other.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).context("open redb database")?;

        // Ensure the table exists so read transactions never miss it.
        let write_txn = db.begin_write()?;
        write_txn.open_table(PASTES)?;
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Check that the database answers a read.
    pub fn ping(&self) -> Result<()> {
        let read_txn = self.db.begin_read()?;
        read_txn.open_table(PASTES)?;
        Ok(())
    }

    /// Insert `record` unless its id is taken. Returns false on collision.
    fn insert_new(&self, record: &PasteRecord) -> Result<bool> {
        let bytes = encode(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PASTES)?;
            if table.get(record.id.as_str())?.is_some() {
                // Dropping the uncommitted transaction aborts it.
                return Ok(false);
            }
            table.insert(record.id.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;

        debug!(id = %record.id, "stored paste");
        Ok(true)
    }

    fn load(&self, id: &str) -> Result<Option<PasteRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PASTES)?;
        let raw_bytes: Option<Vec<u8>> = table.get(id)?.map(|guard| guard.value().to_vec());
        raw_bytes.as_deref().map(decode).transpose()
    }

    /// Read, check and rewrite `remaining_views` inside one write transaction.
    fn decrement(&self, id: &str) -> Result<Decrement> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut table = write_txn.open_table(PASTES)?;

            // Copy the bytes out so the AccessGuard (which borrows `table`)
            // is dropped before the insert.
            let raw_bytes: Option<Vec<u8>> = table.get(id)?.map(|guard| guard.value().to_vec());

            match raw_bytes {
                None => Decrement::NotFound,
                Some(bytes) => {
                    let mut record = decode(&bytes)?;
                    match record.remaining_views {
                        None => Decrement::Unlimited,
                        Some(0) => Decrement::AlreadyZero,
                        Some(n) => {
                            let left = n - 1;
                            record.remaining_views = Some(left);
                            let updated = encode(&record)?;
                            table.insert(id, updated.as_slice())?;
                            Decrement::Remaining(left)
                        }
                    }
                }
            }
        };

        if matches!(outcome, Decrement::Remaining(_)) {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }
        Ok(outcome)
    }

    /// Remove every paste that can no longer be read at `now`. Returns the removed ids.
    pub fn prune(&self, now: i64) -> Result<Vec<String>> {
        // Collect in a read pass first. Inaccessibility is permanent, so a
        // record found here is still dead by the time the write pass runs.
        let dead_ids: Vec<String> = {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(PASTES)?;
            let mut ids = Vec::new();
            for item in table.iter()? {
                let (k, v) = item?;
                let record = decode(v.value())?;
                if !record.is_accessible(now) {
                    ids.push(k.value().to_owned());
                }
            }
            ids
        };

        if dead_ids.is_empty() {
            return Ok(vec![]);
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PASTES)?;
            for id in &dead_ids {
                table.remove(id.as_str())?;
            }
        }
        write_txn.commit()?;

        info!(removed = dead_ids.len(), "pruned inaccessible pastes");
        Ok(dead_ids)
    }

    /// Spawn a background Tokio task that calls `prune()` every `interval`.
    pub fn spawn_sweep(self, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.tick().await; // skip first immediate tick
            loop {
                ticker.tick().await;
                if let Err(e) = self.prune(crate::clock::now_millis()) {
                    warn!(error = %e, "background sweep error");
                }
            }
        });
    }
}

impl RecordStore for Store {
    fn insert(&self, record: &PasteRecord) -> Result<(), StoreError> {
        if self.insert_new(record)? {
            Ok(())
        } else {
            Err(StoreError::UniqueConflict)
        }
    }

    fn get(&self, id: &str) -> Result<Option<PasteRecord>, StoreError> {
        Ok(self.load(id)?)
    }

    fn decrement_views_if_positive(&self, id: &str) -> Result<Decrement, StoreError> {
        Ok(self.decrement(id)?)
    }
}

fn encode(record: &PasteRecord) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(record, bincode::config::standard()).context("bincode encode")
}

fn decode(bytes: &[u8]) -> Result<PasteRecord> {
    if bytes.is_empty() {
        anyhow::bail!("empty record");
    }
    let (record, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .context("bincode decode")?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn make_store() -> (Store, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = Store::open(&path).unwrap();
        (store, dir)
    }

    fn paste(id: &str, expires_at: Option<i64>, max_views: Option<u32>) -> PasteRecord {
        PasteRecord::new(id.into(), "hello".into(), 0, expires_at, max_views)
    }

    #[test]
    fn insert_get() {
        let (s, _dir) = make_store();
        let record = paste("a1", Some(60_000), Some(2));
        s.insert(&record).unwrap();
        assert_eq!(s.get("a1").unwrap(), Some(record));
        assert_eq!(s.get("missing").unwrap(), None);
    }

    #[test]
    fn duplicate_id_is_rejected_and_original_kept() {
        let (s, _dir) = make_store();
        s.insert(&paste("dup", None, None)).unwrap();

        let mut other = paste("dup", None, Some(1));
        other.content = "intruder".into();
        assert!(matches!(s.insert(&other), Err(StoreError::UniqueConflict)));
        assert_eq!(s.get("dup").unwrap().unwrap().content, "hello");
    }

    #[test]
    fn decrement_counts_down_then_stops_at_zero() {
        let (s, _dir) = make_store();
        s.insert(&paste("d", None, Some(2))).unwrap();

        assert_eq!(s.decrement_views_if_positive("d").unwrap(), Decrement::Remaining(1));
        assert_eq!(s.decrement_views_if_positive("d").unwrap(), Decrement::Remaining(0));
        assert_eq!(s.decrement_views_if_positive("d").unwrap(), Decrement::AlreadyZero);
        assert_eq!(s.get("d").unwrap().unwrap().remaining_views, Some(0));
    }

    #[test]
    fn decrement_unlimited_and_missing() {
        let (s, _dir) = make_store();
        s.insert(&paste("u", None, None)).unwrap();
        assert_eq!(s.decrement_views_if_positive("u").unwrap(), Decrement::Unlimited);
        assert_eq!(s.decrement_views_if_positive("nope").unwrap(), Decrement::NotFound);
    }

    #[test]
    fn concurrent_decrements_never_repeat_a_value() {
        let (s, _dir) = make_store();
        s.insert(&paste("race", None, Some(20))).unwrap();

        let outcomes: Vec<Decrement> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..32)
                .map(|_| scope.spawn(|| s.decrement_views_if_positive("race").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let seen: BTreeSet<u32> = outcomes
            .iter()
            .filter_map(|o| match o {
                Decrement::Remaining(n) => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(seen, (0..20).collect());
        let zeros = outcomes.iter().filter(|o| **o == Decrement::AlreadyZero).count();
        assert_eq!(zeros, 12);
    }

    #[test]
    fn prune_removes_expired_and_exhausted_only() {
        let (s, _dir) = make_store();
        s.insert(&paste("live", Some(10_000), Some(1))).unwrap();
        s.insert(&paste("old", Some(1_000), None)).unwrap();
        s.insert(&paste("spent", None, Some(1))).unwrap();
        s.decrement_views_if_positive("spent").unwrap();

        let mut removed = s.prune(5_000).unwrap();
        removed.sort();
        assert_eq!(removed, vec!["old".to_string(), "spent".to_string()]);
        assert!(s.get("live").unwrap().is_some());
        assert!(s.get("old").unwrap().is_none());
        assert!(s.prune(5_000).unwrap().is_empty());
    }

    #[test]
    fn reopen_keeps_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("persist.db");
        {
            let s = Store::open(&path).unwrap();
            s.insert(&paste("keep", None, Some(3))).unwrap();
            s.decrement_views_if_positive("keep").unwrap();
        }
        let s = Store::open(&path).unwrap();
        assert_eq!(s.get("keep").unwrap().unwrap().remaining_views, Some(2));
        s.ping().unwrap();
    }
}
