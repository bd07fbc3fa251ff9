use std::error::Error;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio::signal;

use auditavel::config::Config;
use auditavel::db::Database;
use auditavel::handlers::{build_router, AppState};
use auditavel::storage::LocalImageStore;
use auditavel::tasks::poll_closer;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    if let Err(e) = run().await {
        error!("Fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = Config::from_env()?;
    if config.admin_tokens.is_empty() {
        warn!("ADMIN_TOKENS is empty, admin endpoints will reject every request");
    }

    let database = Arc::new(Database::new(&config).await?);

    let images = LocalImageStore::new(&config.upload_dir, &config.public_base_url, config.max_image_bytes);
    tokio::fs::create_dir_all(images.root()).await?;

    tokio::spawn(poll_closer::run(Arc::clone(&database), config.poll_close_interval));

    let bind_addr = config.bind_addr;
    let state = Arc::new(AppState {
        db: database,
        config,
        images: Arc::new(images),
    });
    let app = build_router(state);

    let listener = TcpListener::bind(bind_addr).await?;
    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!("Failed to listen for SIGTERM: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
