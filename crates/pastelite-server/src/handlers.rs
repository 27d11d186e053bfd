use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use crate::{
    error::PasteError, id::looks_like_paste_id, render, writer::NewPaste, AccessResult, AppState,
};

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health(State(state): State<AppState>) -> Response {
    health_response(state.store.ping())
}

fn health_response(ping: anyhow::Result<()>) -> Response {
    match ping {
        Ok(()) => Json(json!({"ok": true})).into_response(),
        Err(e) => {
            error!(error = %e, "health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"ok": false, "error": "store unavailable"})),
            )
                .into_response()
        }
    }
}

// ── Create ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub id: String,
    pub url: String,
}

pub async fn create_paste(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<NewPaste>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    let now = state.clock.now(&headers);

    match state.writer.create(body, now) {
        Ok(record) => {
            let url = format!("{}/p/{}", base_url(&state, &headers), record.id);
            (
                StatusCode::CREATED,
                Json(CreateResponse { id: record.id, url }),
            )
                .into_response()
        }
        Err(PasteError::Validation(msg)) => bad_request(msg),
        Err(e) => json_error(e),
    }
}

// ── Read (JSON) ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PasteBody {
    pub content: String,
    pub remaining_views: Option<u32>,
    /// RFC 3339, millisecond precision, UTC.
    pub expires_at: Option<String>,
}

impl From<AccessResult> for PasteBody {
    fn from(res: AccessResult) -> Self {
        Self {
            content: res.content,
            remaining_views: res.remaining_views,
            expires_at: res.expires_at.map(render::format_timestamp),
        }
    }
}

pub async fn fetch_paste(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let now = state.clock.now(&headers);
    match read(&state, &id, now) {
        Ok(res) => Json(PasteBody::from(res)).into_response(),
        Err(e) => json_error(e),
    }
}

// ── Read (HTML) ───────────────────────────────────────────────────────────────

pub async fn view_paste(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let now = state.clock.now(&headers);
    match read(&state, &id, now) {
        Ok(res) => Html(render::paste_page(&res)).into_response(),
        Err(e) => html_error(e),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Shared read path. Ids that could never have been issued skip the store.
fn read(state: &AppState, id: &str, now: i64) -> Result<AccessResult, PasteError> {
    if !looks_like_paste_id(id) {
        return Err(PasteError::NotFound);
    }
    let res = state.reader.access(id, now)?;
    info!(id, remaining_views = ?res.remaining_views, "paste read");
    Ok(res)
}

fn base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(ref url) = state.public_url {
        return url.trim_end_matches('/').to_owned();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or("localhost");
    format!("http://{host}")
}

fn bad_request(msg: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": msg.into()})),
    )
        .into_response()
}

fn html_error(e: PasteError) -> Response {
    match e {
        PasteError::NotFound => {
            (StatusCode::NOT_FOUND, Html(render::not_found_page())).into_response()
        }
        e if e.is_transient() => {
            error!(error = %e, "transient failure reading paste");
            (StatusCode::SERVICE_UNAVAILABLE, Html(render::unavailable_page())).into_response()
        }
        e => {
            error!(error = %e, "internal error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(render::internal_error_page()),
            )
                .into_response()
        }
    }
}

fn json_error(e: PasteError) -> Response {
    match e {
        PasteError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "paste not found"})),
        )
            .into_response(),
        PasteError::Validation(msg) => bad_request(msg),
        e if e.is_transient() => {
            error!(error = %e, "transient store failure");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": "service temporarily unavailable"})),
            )
                .into_response()
        }
        e => {
            error!(error = %e, "internal error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal server error"})),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{RequestClock, TEST_NOW_HEADER};
    use crate::store::Store;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tempfile::tempdir;
    use tower::ServiceExt;

    const T: i64 = 1_700_000_000_000;

    fn app(test_mode: bool) -> (axum::Router, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("http.db")).unwrap();
        let state = AppState::new(store, RequestClock::new(test_mode), None);
        (crate::build_router(state, None), dir)
    }

    async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, String) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn create_req(body: Value, now: Option<i64>) -> Request<Body> {
        let mut builder = Request::post("/api/pastes")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::HOST, "paste.test");
        if let Some(ms) = now {
            builder = builder.header(TEST_NOW_HEADER, ms.to_string());
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_req(uri: &str, now: Option<i64>) -> Request<Body> {
        let mut builder = Request::get(uri);
        if let Some(ms) = now {
            builder = builder.header(TEST_NOW_HEADER, ms.to_string());
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn create(app: &axum::Router, body: Value, now: Option<i64>) -> String {
        let (status, text) = send(app, create_req(body, now)).await;
        assert_eq!(status, StatusCode::CREATED, "{text}");
        let json: Value = serde_json::from_str(&text).unwrap();
        json["id"].as_str().unwrap().to_owned()
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let (app, _dir) = app(false);
        let (status, text) = send(&app, get_req("/api/healthz", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn create_returns_id_and_view_url() {
        let (app, _dir) = app(false);
        let (status, text) = send(&app, create_req(json!({"content": "hi"}), None)).await;
        assert_eq!(status, StatusCode::CREATED);
        let json: Value = serde_json::from_str(&text).unwrap();
        let id = json["id"].as_str().unwrap();
        assert_eq!(json["url"], format!("http://paste.test/p/{id}"));
    }

    #[tokio::test]
    async fn invalid_bodies_are_bad_requests() {
        let (app, _dir) = app(false);
        for body in [
            json!({"content": ""}),
            json!({"content": "x", "ttl_seconds": 0}),
            json!({"content": "x", "max_views": -2}),
            json!({"content": "x", "max_views": 1.5}),
            json!({"ttl_seconds": 10}),
        ] {
            let (status, text) = send(&app, create_req(body.clone(), None)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body} -> {text}");
            let json: Value = serde_json::from_str(&text).unwrap();
            assert!(json["error"].is_string());
        }
    }

    #[tokio::test]
    async fn json_read_spends_views_then_404s() {
        let (app, _dir) = app(false);
        let id = create(&app, json!({"content": "Hello World", "max_views": 2}), None).await;
        let uri = format!("/api/pastes/{id}");

        let (status, text) = send(&app, get_req(&uri, None)).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["content"], "Hello World");
        assert_eq!(json["remaining_views"], 1);
        assert!(json["expires_at"].is_null());

        let (_, text) = send(&app, get_req(&uri, None)).await;
        let json: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["remaining_views"], 0);

        let (status, text) = send(&app, get_req(&uri, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({"error": "paste not found"})
        );
    }

    #[tokio::test]
    async fn pinned_clock_drives_expiry_in_test_mode() {
        let (app, _dir) = app(true);
        let id = create(&app, json!({"content": "soon", "ttl_seconds": 10}), Some(T)).await;
        let uri = format!("/api/pastes/{id}");

        let (status, text) = send(&app, get_req(&uri, Some(T + 9_999))).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["expires_at"], "2023-11-14T22:13:30.000Z");

        let (status, _) = send(&app, get_req(&uri, Some(T + 10_000))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn pinned_clock_ignored_outside_test_mode() {
        let (app, _dir) = app(false);
        let id = create(&app, json!({"content": "later", "ttl_seconds": 3600}), None).await;
        let far_future = crate::clock::now_millis() + 86_400_000;
        let (status, _) = send(&app, get_req(&format!("/api/pastes/{id}"), Some(far_future))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn html_view_escapes_content() {
        let (app, _dir) = app(false);
        let id = create(
            &app,
            json!({"content": "<img src=x onerror=\"alert('pwn')\"> & co", "max_views": 1}),
            None,
        )
        .await;
        let uri = format!("/p/{id}");

        let (status, page) = send(&app, get_req(&uri, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!page.contains("<img"));
        assert!(page.contains(
            "&lt;img src=x onerror=&quot;alert(&#039;pwn&#039;)&quot;&gt; &amp; co"
        ));
        assert!(page.contains("Remaining views: 0"));

        let (status, page) = send(&app, get_req(&uri, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(page.contains("404"));
    }

    #[tokio::test]
    async fn unknown_and_malformed_ids_are_404() {
        let (app, _dir) = app(false);
        let (status, _) = send(&app, get_req("/api/pastes/0123456789abcdef", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, get_req("/api/pastes/not-an-id", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, get_req("/p/not-an-id", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    async fn split(resp: Response) -> (StatusCode, String) {
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn store_down() -> PasteError {
        PasteError::StoreUnavailable(anyhow::anyhow!("disk full at /var/lib/pastelite"))
    }

    #[tokio::test]
    async fn healthz_reports_500_when_store_fails() {
        let (status, text) =
            split(health_response(Err(anyhow::anyhow!("disk full at /var/lib/pastelite")))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({"ok": false, "error": "store unavailable"})
        );
        assert!(!text.contains("disk full"));
    }

    #[tokio::test]
    async fn transient_failures_are_503_without_internals() {
        for e in [store_down(), PasteError::StoreConflict("abc: 16 attempts".into())] {
            let (status, text) = split(json_error(e)).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(
                serde_json::from_str::<Value>(&text).unwrap(),
                json!({"error": "service temporarily unavailable"})
            );
        }

        for e in [store_down(), PasteError::StoreConflict("abc: 16 attempts".into())] {
            let (status, page) = split(html_error(e)).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert!(page.contains("503"));
            assert!(!page.contains("disk full"));
            assert!(!page.contains("attempts"));
        }
    }

    #[tokio::test]
    async fn exhausted_id_space_is_500_without_internals() {
        let (status, text) = split(json_error(PasteError::IdSpaceExhausted { attempts: 5 })).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({"error": "internal server error"})
        );

        let (status, page) = split(html_error(PasteError::IdSpaceExhausted { attempts: 5 })).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(page.contains("500"));
    }
}
