//! Out-of-band interaction evidence store
//!
//! Persists interactions caught by the detection listeners as records tied
//! to the rule that matched them, and serves the management API used to
//! browse, filter and purge that evidence.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  detection (external)        management API (Axum)          │
//! │        │                       │                │           │
//! │        ▼                       ▼                ▼           │
//! │  HttpRecord::create        records::list   records::purge   │
//! │        │                       │                │           │
//! │        ▼                       └──── Predicate ─┘           │
//! │   WriteGate (SQLite only)              │                    │
//! │        └────────────┬──────────────────┘                    │
//! │                     ▼                                       │
//! │              Storage (SQLite │ PostgreSQL)                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod notice;
pub mod query;

use axum::{
    Router,
    routing::get,
    middleware as axum_middleware,
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};

pub use db::Storage;
pub use error::{AppError, AppResult, RecordError};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub config: config::Config,
}

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health::check));

    // Management routes (admin token)
    let management_routes = Router::new()
        // Records
        .route(
            "/api/v1/records/http",
            get(handlers::records::list).delete(handlers::records::purge),
        )

        // Rules
        .route(
            "/api/v1/rules/http",
            get(handlers::rules::list).post(handlers::rules::create),
        )
        .route(
            "/api/v1/rules/http/:name",
            get(handlers::rules::get)
                .put(handlers::rules::update)
                .delete(handlers::rules::delete),
        )

        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_admin_token,
        ));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .merge(management_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
