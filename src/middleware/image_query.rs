use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use url::Url;

use crate::error::CrmError;
use crate::router::AppState;

/// Remote image URL taken from `?url=...` and already checked against the
/// allow-list.
#[derive(Debug, Clone)]
pub struct ImageRequest(pub Url);

impl FromRequestParts<AppState> for ImageRequest {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let query = parts.uri.query().unwrap_or_default();
        let Some(raw) = url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == "url")
            .map(|(_, v)| v.into_owned())
        else {
            return Err(CrmError::ImageUrl("missing `url` query parameter".to_string())
                .into_response());
        };
        let url = state
            .images
            .check(&raw)
            .map_err(IntoResponse::into_response)?;
        Ok(Self(url))
    }
}
