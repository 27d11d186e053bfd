use serde::{Deserialize, Serialize};

/// A stored paste. Persisted in redb as bincode-encoded bytes.
///
/// All timestamps are Unix epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasteRecord {
    pub id: String,
    /// Opaque payload, never interpreted.
    pub content: String,
    pub created_at: i64,
    /// Deadline after which the paste is gone for good.
    pub expires_at: Option<i64>,
    /// Total views ever allowed.
    pub max_views: Option<u32>,
    /// Views left. Present exactly when `max_views` is.
    pub remaining_views: Option<u32>,
}

impl PasteRecord {
    /// Build a fresh record with its full view budget.
    pub fn new(
        id: String,
        content: String,
        created_at: i64,
        expires_at: Option<i64>,
        max_views: Option<u32>,
    ) -> Self {
        Self {
            id,
            content,
            created_at,
            expires_at,
            max_views,
            remaining_views: max_views,
        }
    }

    /// Returns true if the deadline has been reached. The deadline itself counts as expired.
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(exp) if now >= exp)
    }

    /// Returns true if the view budget exists and is spent.
    pub fn is_exhausted(&self) -> bool {
        self.max_views.is_some() && self.remaining_views.unwrap_or(0) == 0
    }

    /// Returns true if a read at `now` may see this paste.
    pub fn is_accessible(&self, now: i64) -> bool {
        !self.is_expired(now) && !self.is_exhausted()
    }
}
