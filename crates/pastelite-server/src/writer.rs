use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{PasteError, StoreError};
use crate::id::generate_paste_id;
use crate::store::{PasteRecord, RecordStore};

/// How many fresh ids to try before reporting the id space as exhausted.
pub const MAX_INSERT_ATTEMPTS: u32 = 5;

/// Creation input as submitted by a client.
///
/// Integers are signed so that zero and negative values reach validation
/// instead of failing deserialization with a less helpful message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPaste {
    pub content: String,
    pub ttl_seconds: Option<i64>,
    pub max_views: Option<i64>,
}

impl NewPaste {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_ttl_seconds(mut self, ttl: i64) -> Self {
        self.ttl_seconds = Some(ttl);
        self
    }

    pub fn with_max_views(mut self, views: i64) -> Self {
        self.max_views = Some(views);
        self
    }

    /// Check the input and resolve it against `now` into `(expires_at, max_views)`.
    fn resolve(&self, now: i64) -> Result<(Option<i64>, Option<u32>), PasteError> {
        if self.content.is_empty() {
            return Err(PasteError::validation("content must not be empty"));
        }

        let expires_at = match self.ttl_seconds {
            None => None,
            Some(ttl) if ttl < 1 => {
                return Err(PasteError::validation("ttl_seconds must be a positive integer"))
            }
            Some(ttl) => Some(
                ttl.checked_mul(1_000)
                    .and_then(|ms| now.checked_add(ms))
                    .ok_or_else(|| PasteError::validation("ttl_seconds is too large"))?,
            ),
        };

        let max_views = match self.max_views {
            None => None,
            Some(views) if views < 1 => {
                return Err(PasteError::validation("max_views must be a positive integer"))
            }
            Some(views) => Some(
                u32::try_from(views)
                    .map_err(|_| PasteError::validation("max_views is too large"))?,
            ),
        };

        Ok((expires_at, max_views))
    }
}

type IdSource = Arc<dyn Fn() -> String + Send + Sync>;

/// Write path: validates input, picks an id, persists the record.
#[derive(Clone)]
pub struct RecordWriter<S> {
    store: S,
    next_id: IdSource,
}

impl<S: RecordStore> RecordWriter<S> {
    pub fn new(store: S) -> Self {
        Self::with_id_source(store, generate_paste_id)
    }

    /// Use a custom id generator. Collisions are still resolved by the store.
    pub fn with_id_source<F>(store: S, next_id: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self {
            store,
            next_id: Arc::new(next_id),
        }
    }

    /// Create a paste at `now` (epoch ms).
    ///
    /// Invalid input never reaches the store, and a failed call leaves no record behind.
    pub fn create(&self, paste: NewPaste, now: i64) -> Result<PasteRecord, PasteError> {
        let (expires_at, max_views) = paste.resolve(now)?;
        let NewPaste { content, .. } = paste;

        let mut record = PasteRecord::new(String::new(), content, now, expires_at, max_views);
        for attempt in 1..=MAX_INSERT_ATTEMPTS {
            record.id = (self.next_id)();
            match self.store.insert(&record) {
                Ok(()) => {
                    info!(
                        id = %record.id,
                        expires_at = ?record.expires_at,
                        max_views = ?record.max_views,
                        "paste created"
                    );
                    return Ok(record);
                }
                Err(StoreError::UniqueConflict) => {
                    debug!(id = %record.id, attempt, "paste id collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(attempts = MAX_INSERT_ATTEMPTS, "no free paste id found");
        Err(PasteError::IdSpaceExhausted {
            attempts: MAX_INSERT_ATTEMPTS,
        })
    }
}
