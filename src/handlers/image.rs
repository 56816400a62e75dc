use axum::{
    extract::State,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::error::CrmError;
use crate::middleware::ImageRequest;
use crate::router::AppState;

/// Proxy an allow-listed remote image. Only `image/*` bodies within the
/// configured size limit are forwarded.
pub async fn image_proxy_handler(
    State(state): State<AppState>,
    ImageRequest(url): ImageRequest,
) -> Result<Response, CrmError> {
    debug!(url = %url, "proxying remote image");
    let upstream = state.http.get(url.clone()).send().await?;
    let status = upstream.status();
    if !status.is_success() {
        warn!(url = %url, status = %status, "image upstream returned an error");
        return Err(CrmError::UpstreamStatus(status));
    }

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .filter(|ct| {
            ct.to_str()
                .is_ok_and(|s| s.trim().to_ascii_lowercase().starts_with("image/"))
        })
        .ok_or_else(|| CrmError::NotAnImage(url.to_string()))?;

    let max = state.image_max_bytes;
    if upstream.content_length().is_some_and(|len| len > max as u64) {
        return Err(CrmError::ImageTooLarge(max));
    }
    let body = read_limited(upstream, max).await?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CACHE_CONTROL,
                HeaderValue::from_static("public, max-age=60"),
            ),
            (
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ),
        ],
        body,
    )
        .into_response())
}

/// Read the body chunk by chunk, giving up as soon as it passes `max`.
async fn read_limited(mut upstream: reqwest::Response, max: usize) -> Result<Vec<u8>, CrmError> {
    let mut body = Vec::new();
    while let Some(chunk) = upstream.chunk().await? {
        if body.len() + chunk.len() > max {
            debug!(limit = max, "image body exceeded the size limit");
            return Err(CrmError::ImageTooLarge(max));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}
