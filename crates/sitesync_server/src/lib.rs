//! Sitesync Server
//!
//! The site's own backend for the editor's alternate persistence path.
//! It keeps a single content document in SQLite and serves it over the
//! same wire types `sitesync_core::server_path` speaks.
//!
//! ## Endpoints
//!
//! - `POST /api/save-content`: store `{content, timestamp}`
//! - `GET /api/get-content`: fetch `{success, content, lastUpdated, version}`, or 404
//! - `DELETE /api/content`: drop the stored document
//! - `GET /health`
//!
//! ## Environment Variables
//!
//! - `HOST`: Server host (default: 0.0.0.0)
//! - `PORT`: Server port (default: 3030)
//! - `DATABASE_PATH`: Path to SQLite database (default: ./sitesync.db)
//! - `CORS_ORIGINS`: Comma-separated list of allowed origins (default: any)
//! - `BODY_LIMIT_BYTES`: Largest accepted request body (default: 10 MiB)

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    routing::get,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

pub use config::Config;
use db::ContentRepo;
use handlers::{ContentState, content_routes};

/// Build the application router.
pub fn app(config: &Config, repo: Arc<ContentRepo>) -> Router {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(allow_origin);

    Router::new()
        .route("/", get(|| async { "Sitesync Server" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", content_routes(ContentState { repo }))
        .layer(DefaultBodyLimit::max(config.body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
