use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_gateway::{GatewayState, connection};
use parley_storage::{HttpObjectStore, Spool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into());
    let spool_dir = std::env::var("PARLEY_SPOOL_DIR").unwrap_or_else(|_| "uploads".into());
    let object_store_url = std::env::var("PARLEY_OBJECT_STORE_URL")
        .unwrap_or_else(|_| "http://localhost:9000/parley".into());
    let host = std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PARLEY_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Shared state
    let db = Arc::new(parley_db::Database::open(&PathBuf::from(&db_path))?);
    let spool = Arc::new(Spool::new(PathBuf::from(&spool_dir)).await?);
    let objects = Arc::new(HttpObjectStore::new(object_store_url));
    let state = GatewayState::new(db, spool, objects);

    // Routes
    let app = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The handshake carries the user identity as a query parameter; an absent
/// or empty value leaves the connection anonymous.
async fn ws_upgrade(
    State(state): State<GatewayState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let user_id = params
        .get("user_id")
        .filter(|id| !id.is_empty())
        .cloned();
    ws.on_upgrade(move |socket| connection::handle_socket(socket, state, user_id))
}
