use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::server::AppState;

/// Fetch-on-demand proxy for bridge-originated photos: the poller hands
/// clients a `/bridge_image/{file_id}` locator and this resolves it against
/// the bridge when the client actually renders the image. Any failure is a
/// plain 404: a missing picture client-side, never a crash here.
pub async fn bridge_image(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Response {
    match state.bridge.fetch_resource(&file_id).await {
        Ok(resource) => {
            tracing::debug!(file_id = %file_id, bytes = resource.bytes.len(), "serving bridge image");
            (
                [(header::CONTENT_TYPE, content_type_for(&resource.path))],
                resource.bytes,
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!(file_id = %file_id, kind = e.error_kind(), error = %e, "image fetch failed");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Infer a content type from the resource path's extension.
fn content_type_for(path: &str) -> &'static str {
    if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".jpg") || path.ends_with(".jpeg") {
        "image/jpeg"
    } else if path.ends_with(".gif") {
        "image/gif"
    } else {
        "image/jpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_by_extension() {
        assert_eq!(content_type_for("photos/pic.png"), "image/png");
        assert_eq!(content_type_for("photos/pic.jpg"), "image/jpeg");
        assert_eq!(content_type_for("photos/pic.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("photos/anim.gif"), "image/gif");
        assert_eq!(content_type_for("photos/unknown.webp"), "image/jpeg");
        assert_eq!(content_type_for("no-extension"), "image/jpeg");
    }
}
