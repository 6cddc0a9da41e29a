//! Open pixel and click redirect handlers

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use mailwarden_common::Error;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{api_error, error_response};
use crate::auth::AppState;

/// 1x1 transparent GIF
const PIXEL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

#[derive(Debug, Deserialize)]
pub struct ClickQuery {
    pub url: Option<String>,
}

/// GET /t/open/:send_id
///
/// Always answers with the pixel, even for unknown sends.
pub async fn track_open(State(state): State<Arc<AppState>>, Path(send_id): Path<String>) -> Response {
    match Uuid::parse_str(&send_id) {
        Ok(send_id) => {
            if let Err(e) = state.lifecycle.record_open(send_id).await {
                debug!(send_id = %send_id, "Open not recorded: {}", e);
            }
        }
        Err(_) => debug!(send_id = %send_id, "Open for malformed send id"),
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
        ],
        PIXEL_GIF,
    )
        .into_response()
}

/// GET /t/click/:send_id?url=
pub async fn track_click(
    State(state): State<Arc<AppState>>,
    Path(send_id): Path<Uuid>,
    Query(query): Query<ClickQuery>,
) -> Response {
    let Some(target) = query.url.filter(|u| !u.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "Missing url parameter")
            .into_response();
    };

    let location = match state.lifecycle.record_click(send_id, &target).await {
        Ok(location) => location,
        Err(e @ Error::Validation(_)) => {
            let (_, body) = api_error(e);
            return (StatusCode::BAD_REQUEST, body).into_response();
        }
        // Target was validated before the send lookup
        Err(e) => {
            warn!(send_id = %send_id, "Click not recorded: {}", e);
            target
        }
    };

    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}
