use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum CrmError {
    #[error("missing required setting {0}")]
    MissingSetting(&'static str),

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("libSQL error: {message}")]
    Libsql {
        message: String,
        code: Option<String>,
    },

    #[error("unknown table `{0}`")]
    UnknownTable(String),

    #[error("unknown column `{column}` on table `{table}`")]
    UnknownColumn { table: String, column: String },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid image url: {0}")]
    ImageUrl(String),

    #[error("image host not allowed: {0}")]
    ImageNotAllowed(String),

    #[error("upstream content is not an image: {0}")]
    NotAnImage(String),

    #[error("image exceeds {0} bytes")]
    ImageTooLarge(usize),

    #[error("Upstream error with status: {0}")]
    UpstreamStatus(StatusCode),
}

impl CrmError {
    /// True for the startup-time configuration failures.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            CrmError::MissingSetting(_) | CrmError::InvalidSetting { .. } | CrmError::Figment(_)
        )
    }
}

impl From<figment::Error> for CrmError {
    fn from(e: figment::Error) -> Self {
        CrmError::Figment(Box::new(e))
    }
}

impl IntoResponse for CrmError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_body) = match &self {
            CrmError::DatabaseError(_) | CrmError::Libsql { .. } => {
                let status = StatusCode::SERVICE_UNAVAILABLE;
                let body = ApiErrorBody {
                    code: "DATABASE_UNAVAILABLE".to_string(),
                    message: "The database could not serve the request.".to_string(),
                };
                (status, body)
            }
            CrmError::UnknownTable(_)
            | CrmError::UnknownColumn { .. }
            | CrmError::InvalidQuery(_)
            | CrmError::ImageUrl(_) => {
                let status = StatusCode::BAD_REQUEST;
                let body = ApiErrorBody {
                    code: "BAD_REQUEST".to_string(),
                    message: self.to_string(),
                };
                (status, body)
            }
            CrmError::ImageNotAllowed(_) => {
                let status = StatusCode::FORBIDDEN;
                let body = ApiErrorBody {
                    code: "FORBIDDEN".to_string(),
                    message: self.to_string(),
                };
                (status, body)
            }
            CrmError::NotAnImage(_) => {
                let status = StatusCode::UNSUPPORTED_MEDIA_TYPE;
                let body = ApiErrorBody {
                    code: "UNSUPPORTED_MEDIA_TYPE".to_string(),
                    message: self.to_string(),
                };
                (status, body)
            }
            CrmError::ImageTooLarge(_) => {
                let status = StatusCode::PAYLOAD_TOO_LARGE;
                let body = ApiErrorBody {
                    code: "PAYLOAD_TOO_LARGE".to_string(),
                    message: self.to_string(),
                };
                (status, body)
            }
            CrmError::Reqwest(_) | CrmError::UrlParse(_) | CrmError::UpstreamStatus(_) => {
                let status = StatusCode::BAD_GATEWAY;
                let body = ApiErrorBody {
                    code: "BAD_GATEWAY".to_string(),
                    message: "Upstream service is unavailable.".to_string(),
                };
                (status, body)
            }
            CrmError::MissingSetting(_)
            | CrmError::InvalidSetting { .. }
            | CrmError::Figment(_) => {
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                let body = ApiErrorBody {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred.".to_string(),
                };
                (status, body)
            }
        };
        (status, Json(ApiErrorResponse { error: error_body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_setting_names_the_variable() {
        let err = CrmError::MissingSetting("TURSO_DATABASE_URL");
        assert!(err.is_config());
        assert_eq!(err.to_string(), "missing required setting TURSO_DATABASE_URL");
    }

    #[test]
    fn image_rejections_map_to_client_statuses() {
        let resp = CrmError::ImageNotAllowed("evil.test".into()).into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = CrmError::ImageTooLarge(10).into_response();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn only_settings_errors_count_as_configuration() {
        let err = CrmError::InvalidSetting {
            name: "CRM_MAX_CONNECTIONS",
            reason: "must be at least 1".into(),
        };
        assert!(err.is_config());
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = CrmError::InvalidQuery("bad".into());
        assert!(!err.is_config());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
