pub mod access;
pub mod clock;
pub mod error;
pub mod handlers;
pub mod id;
pub mod render;
pub mod server;
pub mod store;
pub mod writer;

use access::AccessController;
use clock::RequestClock;
use store::Store;
use writer::RecordWriter;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub reader: AccessController<Store>,
    pub writer: RecordWriter<Store>,
    /// Resolves "now" per request (wall clock, or a pinned header in test mode).
    pub clock: RequestClock,
    /// Base used for the `url` returned on create. Falls back to the Host header.
    pub public_url: Option<String>,
}

impl AppState {
    pub fn new(store: Store, clock: RequestClock, public_url: Option<String>) -> Self {
        Self {
            reader: AccessController::new(store.clone()),
            writer: RecordWriter::new(store.clone()),
            store,
            clock,
            public_url,
        }
    }
}

pub use access::AccessResult;
pub use error::{PasteError, StoreError};
pub use server::{build_router, resolve_data_dir, run, ServerConfig};
pub use writer::NewPaste;
