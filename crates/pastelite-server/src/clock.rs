use std::time::{SystemTime, UNIX_EPOCH};

use http::HeaderMap;

/// Request header carrying an epoch-millisecond override of "now".
pub const TEST_NOW_HEADER: &str = "x-test-now-ms";

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Decides which instant a request is evaluated at.
///
/// Outside test mode this is always the wall clock. In test mode a request
/// may pin its own "now" with [`TEST_NOW_HEADER`], which makes expiry
/// reproducible from the outside.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestClock {
    test_mode: bool,
}

impl RequestClock {
    pub fn new(test_mode: bool) -> Self {
        Self { test_mode }
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    pub fn now(&self, headers: &HeaderMap) -> i64 {
        if self.test_mode {
            let pinned = headers
                .get(TEST_NOW_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<i64>().ok());
            if let Some(ms) = pinned {
                return ms;
            }
        }
        now_millis()
    }
}
