//! ContentHub comment service: an axum HTTP backend over the shared comment
//! store, exposing the comment create/list/detail/like endpoints.

mod auth;
mod comment_service;
mod error;
mod handlers;
mod request_context;
mod routes;
mod state;
mod thread;
mod user_directory;

use std::{env, path::PathBuf};

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load environment variables
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let db_path = env::var("COMMENT_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/comments.db"));

    tracing::info!("Starting ContentHub comment service");
    tracing::info!("Comment database: {}", db_path.display());

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Initialize application state
    let app_state = state::AppState::new(&db_path)?;

    // Build router
    let app = routes::create_router(app_state);

    // Start server
    // Development: 0.0.0.0 for direct access
    // Production: the platform gateway fronts this service
    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string());
    let addr = format!("{bind_addr}:{port}");
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
