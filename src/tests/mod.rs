//! Crate-level tests for Libris.
//!
//! ## Test Modules
//!
//! - **lending_tests**: borrow/return workflow, fines, limits and concurrent checkouts
//! - **catalog_tests**: book CRUD, copy resizing and search
//! - **accounts_tests**: registration, login, sessions and user management
//! - **api_tests**: HTTP endpoints end to end through the full router
//! - **error_tests**: error-to-response mapping
//! - **config_tests**: configuration layering and validation
//! - **db_tests**: schema, constraints and indexes
//! - **health_api_tests**: operational endpoints
//!
//! Every test gets its own SQLite file inside a temporary directory.

pub mod accounts_tests;
pub mod api_tests;

pub(crate) mod support {
    use chrono::Utc;
    use sqlx::SqlitePool;
    use tempfile::TempDir;

    use crate::config::AppConfig;
    use crate::db;
    use crate::metrics::Metrics;
    use crate::policy::LendingPolicy;
    use crate::services::{CatalogService, LendingService};
    use crate::state::AppState;
    use crate::store::users;
    use crate::types::{Book, CreateBookRequest, Role, User};

    /// A pool over a fresh database file. The directory lives as long as this value.
    pub struct TestDb {
        pub pool: SqlitePool,
        _dir: TempDir,
    }

    pub async fn setup_test_db() -> TestDb {
        setup_test_db_with(4).await
    }

    pub async fn setup_test_db_with(max_connections: u32) -> TestDb {
        let dir = TempDir::new().unwrap();
        let db_url = format!("sqlite:{}", dir.path().join("libris-test.db").display());
        let pool = db::connect(&db_url, max_connections).await.unwrap();
        db::init_db(&pool).await.unwrap();
        TestDb { pool, _dir: dir }
    }

    /// Inserts a user directly; the password hash is a placeholder, so this user cannot log in.
    pub async fn seed_user(pool: &SqlitePool, username: &str, role: Role) -> User {
        let mut conn = pool.acquire().await.unwrap();
        users::insert(&mut conn, username, &format!("{}@example.org", username), "unusable", role, Utc::now())
            .await
            .unwrap()
    }

    pub fn book_request(isbn: &str, copies: i64) -> CreateBookRequest {
        CreateBookRequest {
            isbn: isbn.to_string(),
            title: format!("Book {}", isbn),
            author: "Test Author".to_string(),
            publisher: None,
            publication_year: Some(2001),
            genre: None,
            description: None,
            total_copies: copies,
        }
    }

    pub async fn seed_book(pool: &SqlitePool, isbn: &str, copies: i64) -> Book {
        CatalogService::new(pool.clone()).create(book_request(isbn, copies)).await.unwrap()
    }

    pub fn lending(pool: &SqlitePool) -> LendingService {
        LendingService::new(pool.clone(), LendingPolicy::default(), Metrics::new())
    }

    pub fn test_config(db_url: &str) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.database.url = db_url.to_string();
        cfg
    }

    pub fn test_state(db: &TestDb) -> AppState {
        AppState::new(db.pool.clone(), test_config("sqlite::memory:"))
    }
}
