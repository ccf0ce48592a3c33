//! esign API Server - backend for in-house document signing
//!
//! Provides REST endpoints for:
//! - Users and caller identity
//! - Signature asset upload and management
//! - Document upload, placement and signing

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

mod config;
mod error;
mod handlers;
mod models;
mod state;


use config::Config;
use handlers::{documents, signatures};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("esign_api=info".parse()?)
                .add_directive("esign_core=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    info!("Initializing esign API...");
    let config = Config::from_env()?;
    let port = config.port;
    let state = Arc::new(AppState::new(config).await?);

    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting esign API on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    // CORS configuration for web clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.config.max_request_bytes();

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Users
        .route("/api/users", post(handlers::create_user))
        .route("/api/users/me", get(handlers::current_user))
        // Signature assets
        .route(
            "/api/signatures",
            get(signatures::list_signatures).post(signatures::upload_signature),
        )
        .route(
            "/api/signatures/active/:kind",
            get(signatures::get_active_signature),
        )
        .route(
            "/api/signatures/:id",
            axum::routing::delete(signatures::delete_signature),
        )
        .route(
            "/api/signatures/:id/activate",
            post(signatures::activate_signature),
        )
        .route(
            "/api/signatures/:id/default",
            post(signatures::set_default_signature).delete(signatures::unset_default_signature),
        )
        .route(
            "/api/signatures/:id/image",
            get(signatures::get_signature_image),
        )
        // Documents
        .route(
            "/api/documents",
            get(documents::list_documents).post(documents::upload_document),
        )
        .route(
            "/api/documents/:id",
            axum::routing::delete(documents::delete_document),
        )
        .route("/api/documents/:id/file", get(documents::get_document_file))
        .route(
            "/api/documents/:id/placements",
            put(documents::save_placements).get(documents::get_placements),
        )
        .route("/api/documents/:id/sign", post(documents::sign_document))
        // Add middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
