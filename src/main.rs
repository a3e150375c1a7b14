use std::sync::Arc;

use tower_http::cors::CorsLayer;

use ricochet_backend::api::{self, AppState};
use ricochet_backend::config::Config;
use ricochet_backend::db::Database;
use ricochet_backend::{metrics, queue};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::load();
    if let Err(e) = config.generator.validate() {
        tracing::error!("Invalid board generation settings: {e}");
        std::process::exit(1);
    }

    let db = Database::new(&config.database_url)
        .await
        .expect("Failed to initialize database");
    let db = Arc::new(db);

    metrics::register_metrics();

    let port = config.port;
    let state = AppState::new(db, config);

    // Drain full games into the engine workers
    queue::spawn_queue_worker(
        state.db.clone(),
        state.lobby.clone(),
        state.pool.clone(),
        state.queue.clone(),
    );

    let app = api::router(state).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to port {port}: {e}"));

    tracing::info!("Ricochet backend listening on port {port}");
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
