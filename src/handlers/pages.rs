use axum::{Json, extract::State, response::Html};
use serde_json::{Value, json};

use crate::error::CrmError;
use crate::router::AppState;

pub async fn landing_handler(State(state): State<AppState>) -> Html<String> {
    Html(state.layout.render(&state.landing.render()))
}

/// Readiness probe: one round trip through the database handle.
pub async fn health_handler(State(state): State<AppState>) -> Result<Json<Value>, CrmError> {
    state.db.ping().await?;
    Ok(Json(json!({
        "status": "ok",
        "backend": state.db.backend().as_str(),
    })))
}
