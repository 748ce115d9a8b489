use axum::body::Body;
use axum::extract::{Path, RawQuery, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};

use bridge_engine::ImageError;

use super::AppState;

const JSON_TEXT: &str = "text/json";
const JPEG: &str = "image/jpeg; charset=utf-8";

fn json_text(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, JSON_TEXT)], body).into_response()
}

// ═══════════════════════════════════════════════════════════════
//  /metadata
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_metadata(State(state): State<AppState>, method: Method) -> Response {
    if method != Method::GET {
        tracing::info!(%method, "only GET supported on /metadata");
        return StatusCode::OK.into_response();
    }

    let body = match state.store.latest() {
        Some(event) => serde_json::Value::Object(event).to_string(),
        None => "{}".to_string(),
    };
    json_text(StatusCode::OK, body)
}

pub(crate) async fn handle_topic_metadata(
    State(state): State<AppState>,
    Path(topic): Path<String>,
) -> Response {
    match state.store.latest_for(&topic) {
        Some(event) => json_text(StatusCode::OK, serde_json::Value::Object(event).to_string()),
        None => (StatusCode::NOT_FOUND, format!("no metadata for topic '{topic}'")).into_response(),
    }
}

// ═══════════════════════════════════════════════════════════════
//  /image?img_handle=<id>
// ═══════════════════════════════════════════════════════════════

/// Why an `/image` GET produced no image.
#[derive(Debug)]
enum ImageFailure {
    BadQuery,
    Fetch(ImageError),
}

impl ImageFailure {
    fn status(&self) -> StatusCode {
        match self {
            ImageFailure::BadQuery => StatusCode::BAD_REQUEST,
            ImageFailure::Fetch(ImageError::NotFound(_)) => StatusCode::NOT_FOUND,
            ImageFailure::Fetch(ImageError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
            ImageFailure::Fetch(ImageError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ImageFailure::Fetch(ImageError::Request(_) | ImageError::Response(_)) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}

/// The handle from a raw `img_handle=<id>` query. Only the first `=` splits.
pub(crate) fn parse_image_query(raw: Option<&str>) -> Option<&str> {
    let (key, value) = raw?.split_once('=')?;
    (key == "img_handle" && !value.is_empty()).then_some(value)
}

pub(crate) async fn handle_image(
    State(state): State<AppState>,
    method: Method,
    RawQuery(query): RawQuery,
) -> Response {
    match method {
        Method::GET => {}
        Method::POST => return "Received a POST request".into_response(),
        _ => return "Sorry, only GET and POST methods are supported.".into_response(),
    }

    let result = match parse_image_query(query.as_deref()) {
        None => Err(ImageFailure::BadQuery),
        Some(handle) => match &state.image {
            Some(proxy) => proxy.fetch(handle).await.map_err(ImageFailure::Fetch),
            None => Err(ImageFailure::Fetch(ImageError::Unavailable)),
        },
    };

    match result {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, JPEG)],
            Body::from(bytes),
        )
            .into_response(),
        Err(failure) => {
            match &failure {
                ImageFailure::BadQuery => {
                    tracing::warn!(query = ?query, "malformed /image query")
                }
                ImageFailure::Fetch(e) => tracing::error!(error = %e, "image fetch failed"),
            }
            let status = if state.image_error_status {
                failure.status()
            } else {
                StatusCode::OK
            };
            (status, [(header::CONTENT_TYPE, JPEG)]).into_response()
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  /health
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_health() -> impl IntoResponse {
    axum::Json(serde_json::json!({"status": "ok"}))
}
