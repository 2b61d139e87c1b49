use std::sync::Arc;

use crate::config::AppConfig;
use crate::metrics::Metrics;
use crate::middleware::EndpointRateLimiter;
use crate::services::{AccountsService, CatalogService, LendingService};

/// The shared application state.
///
/// Cloned into every handler and middleware; all members are cheap handles.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: sqlx::SqlitePool,
    pub config: Arc<AppConfig>,
    pub metrics: Metrics,
    /// Per-path limits on top of the global per-IP limit.
    pub rate_limiter: EndpointRateLimiter,
    pub lending: LendingService,
    pub catalog: CatalogService,
    pub accounts: AccountsService,
}

impl AppState {
    /// Wires the services to `db` and `config`.
    ///
    /// Endpoint limits: 10 logins and 5 registrations per minute per IP, 60 borrow/return
    /// calls per minute per IP.
    pub fn new(db: sqlx::SqlitePool, config: AppConfig) -> Self {
        let rate_limiter = EndpointRateLimiter::new().with_limits(vec![
            ("/api/v1/auth/login", 10, 60),
            ("/api/v1/auth/register", 5, 60),
            ("/api/v1/borrow", 60, 60),
            ("/api/v1/borrow/return", 60, 60),
        ]);
        let metrics = Metrics::new();

        Self {
            lending: LendingService::new(db.clone(), config.lending_policy(), metrics.clone()),
            catalog: CatalogService::new(db.clone()),
            accounts: AccountsService::new(db.clone(), config.auth.clone(), metrics.clone()),
            db,
            config: Arc::new(config),
            metrics,
            rate_limiter,
        }
    }
}
