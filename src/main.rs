use crm_shell::{Config, ConnectionSettings, Db, DbOptions};
use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        listen_addr = %cfg.listen_addr,
        backend = cfg.backend.as_str(),
        theme = cfg.theme.as_str(),
        loglevel = %cfg.loglevel
    );

    let settings = ConnectionSettings::from_env(cfg.backend).inspect_err(|e| {
        error!(error = %e, "database configuration rejected");
    })?;
    let db = Db::connect(
        &settings,
        DbOptions {
            max_connections: cfg.max_connections,
        },
    )?;
    if cfg.init_schema {
        db.init_schema().await?;
    }

    let state = crm_shell::router::AppState::new(&cfg, db)?;

    let permissive = state.embedding.ancestors().permissive_tokens();
    if !permissive.is_empty() {
        warn!(
            tokens = ?permissive,
            "frame-ancestors allows wildcard origins; review CRM_FRAME_ANCESTOR_DOMAINS before production"
        );
    }
    let open = state.images.unrestricted_protocols();
    if !open.is_empty() {
        warn!(
            protocols = ?open,
            "image allow-list accepts every host; review CRM_IMAGE_PATTERNS before production"
        );
    }

    let app = crm_shell::router::crm_router(state, &cfg.public_dir);

    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!("HTTP server listening on {}", cfg.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
