use thiserror::Error;

/// Failures reported by a record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with the same id already exists.
    #[error("id already in use")]
    UniqueConflict,

    /// The optimistic retry budget ran out before a compare-and-set applied.
    #[error("gave up after {attempts} conflicting updates")]
    Conflict { attempts: u32 },

    /// The backing storage failed (I/O, corruption, encoding).
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Outcome of a create or access call that did not succeed.
#[derive(Debug, Error)]
pub enum PasteError {
    /// Absent, expired or out of views. Callers cannot tell these apart.
    #[error("paste not found")]
    NotFound,

    /// Malformed creation input, rejected before touching the store.
    #[error("{0}")]
    Validation(String),

    /// Every generated id collided with an existing record.
    #[error("could not allocate a unique id after {attempts} attempts")]
    IdSpaceExhausted { attempts: u32 },

    /// Concurrent updates kept invalidating the view decrement.
    #[error("store conflict: {0}")]
    StoreConflict(String),

    /// Transient storage failure; the caller decides whether to retry.
    #[error("store unavailable: {0:#}")]
    StoreUnavailable(anyhow::Error),
}

impl PasteError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for failures worth retrying later (5xx-equivalent, not the caller's fault).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreConflict(_) | Self::StoreUnavailable(_))
    }
}

impl From<StoreError> for PasteError {
    fn from(err: StoreError) -> Self {
        match err {
            // Writers handle collisions themselves; reaching here means a
            // store reported one outside of insert.
            StoreError::UniqueConflict => {
                Self::StoreUnavailable(anyhow::anyhow!("unexpected id conflict"))
            }
            e @ StoreError::Conflict { .. } => Self::StoreConflict(e.to_string()),
            StoreError::Backend(e) => Self::StoreUnavailable(e),
        }
    }
}
