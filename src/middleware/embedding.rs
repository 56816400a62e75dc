use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::router::AppState;

/// Stamp `X-Frame-Options` and the `frame-ancestors` CSP onto every
/// response, including static files and error bodies.
pub async fn embedding_headers(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();
    for (name, value) in state.embedding.headers() {
        headers.insert(name, value);
    }
    resp
}
