//! Accounts: registration, password login and opaque bearer sessions.

use anyhow::anyhow;
use argon2::{
    password_hash::{
        rand_core::{OsRng, RngCore},
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::{AuthConfig, BootstrapAdmin};
use crate::error::{AppError, AppResult, OptionExt};
use crate::metrics::Metrics;
use crate::middleware::validation::{sanitize_for_logging, validate_email, validate_password, validate_username};
use crate::policy::normalize_page;
use crate::store::{sessions, users};
use crate::types::{LoginRequest, LoginResponse, Paginated, RegisterRequest, Role, UpdateUserRequest, User};

/// Largest page size for the user directory listing.
pub const MAX_USER_PAGE_LIMIT: i64 = 100;

/// Hash a password using Argon2.
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow!("failed to hash password: {}", e)))
}

/// Verify a password against a stored hash.
pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| AppError::Internal(anyhow!("invalid password hash: {}", e)))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

/// 32 random bytes, URL-safe base64 without padding.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Clone)]
pub struct AccountsService {
    db: SqlitePool,
    auth: AuthConfig,
    metrics: Metrics,
}

impl AccountsService {
    pub fn new(db: SqlitePool, auth: AuthConfig, metrics: Metrics) -> Self {
        Self { db, auth, metrics }
    }

    /// Self-service signup. New accounts are always members.
    pub async fn register(&self, req: RegisterRequest) -> AppResult<User> {
        if !self.auth.registration_enabled {
            return Err(AppError::NotAuthorized("registration is disabled".into()));
        }
        self.create_user(&req.username, &req.email, &req.password, Role::Member).await
    }

    pub async fn create_user(&self, username: &str, email: &str, password: &str, role: Role) -> AppResult<User> {
        let username = username.trim();
        let email = email.trim().to_lowercase();
        validate_username(username)?;
        validate_email(&email)?;
        validate_password(password)?;

        let mut conn = self.db.acquire().await?;
        if users::find_by_username(&mut conn, username).await?.is_some() {
            return Err(AppError::Conflict("username already exists".into()));
        }
        if users::find_by_email(&mut conn, &email).await?.is_some() {
            return Err(AppError::Conflict("email already exists".into()));
        }

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AppError::Internal(anyhow!("password hashing task failed: {}", e)))??;

        let user = users::insert(&mut conn, username, &email, &password_hash, role, Utc::now()).await?;
        info!(user_id = user.id, username = %user.username, role = %user.role, "User created");
        Ok(user)
    }

    /// Exchanges credentials for a session token. `login` may be a username or an email.
    pub async fn login(&self, req: LoginRequest) -> AppResult<LoginResponse> {
        let login = req.username.trim();
        let mut conn = self.db.acquire().await?;

        let found = match users::find_credentials(&mut conn, login).await? {
            Some(found) => Some(found),
            None => users::find_credentials(&mut conn, &login.to_lowercase()).await?,
        };
        let Some((user, hash)) = found else {
            self.metrics.inc_logins_failed();
            warn!("Login failed for unknown user '{}'", sanitize_for_logging(login));
            return Err(AppError::Unauthorized("invalid credentials".into()));
        };

        let password = req.password;
        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(anyhow!("password verification task failed: {}", e)))??;
        if !valid {
            self.metrics.inc_logins_failed();
            warn!(user_id = user.id, "Login failed: wrong password");
            return Err(AppError::Unauthorized("invalid credentials".into()));
        }
        if !user.is_active {
            self.metrics.inc_logins_failed();
            return Err(AppError::NotAuthorized("account is deactivated".into()));
        }

        let now = Utc::now();
        let expires_at = now + Duration::hours(self.auth.session_ttl_hours);
        let token = generate_token();
        sessions::create(&mut conn, &token, user.id, now, expires_at).await?;

        self.metrics.inc_logins_succeeded();
        info!(user_id = user.id, "User logged in");
        Ok(LoginResponse { token, expires_at, user })
    }

    pub async fn logout(&self, token: &str) -> AppResult<()> {
        let mut conn = self.db.acquire().await?;
        sessions::delete(&mut conn, token).await?;
        Ok(())
    }

    /// The active user behind an unexpired token, if any.
    pub async fn authenticate(&self, token: &str) -> AppResult<Option<User>> {
        let mut conn = self.db.acquire().await?;
        let user = sessions::find_user(&mut conn, token, Utc::now()).await?;
        Ok(user.filter(|u| u.is_active))
    }

    pub async fn get_user(&self, id: i64) -> AppResult<User> {
        let mut conn = self.db.acquire().await?;
        users::find_by_id(&mut conn, id).await?.ok_or_not_found("user")
    }

    pub async fn list_users(&self, page: Option<i64>, limit: Option<i64>) -> AppResult<Paginated<User>> {
        let (page, limit) = normalize_page(page, limit, MAX_USER_PAGE_LIMIT);
        let mut conn = self.db.acquire().await?;
        let (items, total) = users::list(&mut conn, page, limit).await?;
        Ok(Paginated::new(items, page, limit, total))
    }

    /// Changes a user's role or active flag. Deactivating revokes every session.
    pub async fn update_user(&self, id: i64, req: UpdateUserRequest) -> AppResult<User> {
        let mut tx = self.db.begin().await?;
        let user = users::update_access(&mut tx, id, req.role, req.is_active, Utc::now())
            .await?
            .ok_or_not_found("user")?;
        if !user.is_active {
            let revoked = sessions::delete_for_user(&mut tx, id).await?;
            if revoked > 0 {
                info!(user_id = id, revoked, "Sessions revoked for deactivated user");
            }
        }
        tx.commit().await?;
        info!(user_id = id, role = %user.role, is_active = user.is_active, "User updated");
        Ok(user)
    }

    /// Creates the configured admin account unless that username already exists.
    pub async fn ensure_bootstrap_admin(&self, admin: &BootstrapAdmin) -> AppResult<bool> {
        {
            let mut conn = self.db.acquire().await?;
            if users::find_by_username(&mut conn, admin.username.trim()).await?.is_some() {
                return Ok(false);
            }
        }
        self.create_user(&admin.username, &admin.email, &admin.password, Role::Admin).await?;
        Ok(true)
    }

    pub async fn purge_expired_sessions(&self) -> AppResult<u64> {
        let mut conn = self.db.acquire().await?;
        sessions::purge_expired(&mut conn, Utc::now()).await
    }
}
