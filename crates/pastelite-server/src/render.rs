use chrono::{DateTime, SecondsFormat};

use crate::access::AccessResult;

/// Escape text for embedding in HTML element content or quoted attributes.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Format epoch milliseconds as RFC 3339 UTC with millisecond precision.
pub fn format_timestamp(ms: i64) -> String {
    match DateTime::from_timestamp_millis(ms) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => ms.to_string(),
    }
}

const STYLE: &str = "body { font-family: sans-serif; padding: 20px; line-height: 1.6; \
max-width: 800px; margin: 0 auto; background: #f4f4f9; } \
pre { background: #fff; padding: 15px; border-radius: 8px; border: 1px solid #ddd; \
overflow-x: auto; white-space: pre-wrap; word-wrap: break-word; } \
.meta { font-size: 0.8em; color: #666; margin-top: 10px; }";

/// Full HTML page for a successfully read paste.
pub fn paste_page(paste: &AccessResult) -> String {
    let expiry = match paste.expires_at {
        Some(ms) => format!("Expires at: {}", format_timestamp(ms)),
        None => "No expiration".to_string(),
    };
    let views = match paste.remaining_views {
        Some(n) => format!(" | Remaining views: {n}"),
        None => String::new(),
    };

    format!(
        "<!DOCTYPE html>\n\
<html lang=\"en\">\n\
<head>\n\
<meta charset=\"UTF-8\">\n\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
<title>Pastelite</title>\n\
<style>{STYLE}</style>\n\
</head>\n\
<body>\n\
<h1>Pastelite</h1>\n\
<pre>{content}</pre>\n\
<div class=\"meta\">{expiry}{views}</div>\n\
</body>\n\
</html>\n",
        content = escape_html(&paste.content),
    )
}

pub fn not_found_page() -> &'static str {
    "<h1>404 Paste Not Found</h1>"
}

pub fn unavailable_page() -> &'static str {
    "<h1>503 Service Unavailable</h1>"
}

pub fn internal_error_page() -> &'static str {
    "<h1>500 Internal Server Error</h1>"
}
