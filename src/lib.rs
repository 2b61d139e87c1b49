//! # Libris Backend Library
//!
//! Core library for Libris, a library-management REST backend: user accounts, a book
//! catalog, and a borrow/return workflow with due dates and overdue fines.
//!
//! ## Architecture
//!
//! - **Axum**: HTTP server and routing
//! - **SQLx**: asynchronous SQLite access
//! - **Tokio**: async runtime
//! - **Serde**: JSON (de)serialization
//!
//! ## Core Components
//!
//! - [`config`]: layered configuration (embedded defaults, files, environment)
//! - [`db`]: connection pool and schema initialization
//! - [`error`]: the application error type and its HTTP rendering
//! - [`policy`]: due-date, status and fine rules
//! - [`store`]: SQL access for books, loans, users and sessions
//! - [`services`]: lending workflow, catalog and accounts
//! - [`middleware`]: authentication, rate limiting, validation, security headers
//! - [`routes`]: HTTP handlers
//! - [`metrics`]: lending and login counters
//! - [`state`]: shared application state
//! - [`types`]: domain types and request/response DTOs

use axum::extract::DefaultBodyLimit;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod policy;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

use middleware::auth::{require_admin, require_auth, require_staff};
use routes::{auth, books, borrows, health, users};
use state::AppState;

/// Builds the complete HTTP application: operational endpoints at the root and the API
/// under `/api/v1`, with the full middleware stack applied.
pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/books", get(books::list_books))
        .route("/books/{id}", get(books::get_book))
        .route("/books/{id}/availability", get(books::availability));

    let staff = Router::new()
        .route("/books", post(books::create_book))
        .route("/books/{id}", put(books::update_book).delete(books::delete_book))
        .route("/borrow/active", get(borrows::active_borrows))
        .route("/borrow/overdue", get(borrows::overdue_borrows))
        .route_layer(from_fn(require_staff));

    let admin = Router::new()
        .route("/users", get(users::list_users))
        .route("/users/{id}", get(users::get_user).patch(users::update_user))
        .route_layer(from_fn(require_admin));

    let authenticated = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/borrow", post(borrows::borrow_book))
        .route("/borrow/return", post(borrows::return_book))
        .route("/borrow/my-books", get(borrows::my_books))
        .route("/borrow/{id}/fine", get(borrows::fine))
        .merge(staff)
        .merge(admin)
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let cfg_arc = state.config.clone();

    let app = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(health::metrics))
        .route("/metrics/prometheus", get(health::metrics_prometheus))
        .route("/version", get(health::version))
        .nest("/api/v1", public.merge(authenticated))
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit::endpoint_rate_limit_middleware))
        .with_state(state)
        .layer(DefaultBodyLimit::max(middleware::validation::max_body_size()))
        .layer(from_fn(middleware::validation::validate_request_middleware))
        .layer(from_fn(middleware::rate_limit::rate_limit_middleware))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(cfg_arc, middleware::security_headers::security_headers_middleware));

    // CORS: permissive in debug builds for local frontends
    if cfg!(debug_assertions) {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}
