use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, middleware::from_fn_with_state, routing::get};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::config::Config;
use crate::db::Db;
use crate::error::CrmError;
use crate::handlers::{health_handler, image_proxy_handler, landing_handler};
use crate::middleware::embedding_headers;
use crate::policy::{EmbeddingPolicy, ImagePolicy};
use crate::ui::{Landing, Layout, PageMeta};

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Db>,
    pub embedding: Arc<EmbeddingPolicy>,
    pub images: Arc<ImagePolicy>,
    pub http: reqwest::Client,
    pub layout: Arc<Layout>,
    pub landing: Arc<Landing>,
    pub image_max_bytes: usize,
}

impl AppState {
    pub fn new(cfg: &Config, db: Db) -> Result<Self, CrmError> {
        let images = Arc::new(cfg.image_policy());
        Ok(Self {
            db: Arc::new(db),
            embedding: Arc::new(cfg.embedding_policy()?),
            http: image_client(images.clone())?,
            images,
            layout: Arc::new(Layout::new(
                PageMeta {
                    title: cfg.site_title.clone(),
                    description: cfg.site_description.clone(),
                },
                cfg.theme,
            )),
            landing: Arc::new(Landing::default()),
            image_max_bytes: cfg.image_max_bytes,
        })
    }
}

/// Client for the image proxy. Redirects are followed only while the target
/// stays inside the allow-list.
fn image_client(images: Arc<ImagePolicy>) -> Result<reqwest::Client, CrmError> {
    let redirects = reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= 5 || !images.allows(attempt.url()) {
            attempt.stop()
        } else {
            attempt.follow()
        }
    });
    Ok(reqwest::Client::builder()
        .user_agent(concat!("crm-shell-image-proxy/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(15))
        .redirect(redirects)
        .build()?)
}

pub fn crm_router(state: AppState, public_dir: &Path) -> Router {
    Router::new()
        .route("/", get(landing_handler))
        .route("/healthz", get(health_handler))
        .route("/_image", get(image_proxy_handler))
        .fallback_service(ServeDir::new(public_dir))
        .layer(from_fn_with_state(state.clone(), embedding_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
