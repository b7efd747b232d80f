use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use classroom_stream::api::{self, AppState};
use classroom_stream::classroom::{AttachmentStore, Engine, LogDispatcher};
use classroom_stream::config::AppConfig;
use classroom_stream::db;

/// Upload limit per request
const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "classroom_stream=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    // Initialize database
    let db_path = config.database_path();
    let db = db::init_database(&db_path).await?;
    tracing::info!("Database initialized at {:?}", db_path);

    let backend = config.storage.build().await;
    let files = AttachmentStore::new(backend, config.public_url.clone());
    let engine = Engine::new(db, files, Arc::new(LogDispatcher));
    let state = Arc::new(AppState { engine });

    let app = api::router()
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http());

    tracing::info!("Classroom stream starting on http://{}", config.bind);
    tracing::info!("Attachments served from {}", config.public_url);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
