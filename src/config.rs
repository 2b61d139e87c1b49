use std::path::Path;

use serde::Deserialize;

use crate::policy::LendingPolicy;

const DEFAULTS: &str = include_str!("../config/default.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LendingConfig {
    pub max_books_per_user: i64,
    pub borrow_days: i64,
    pub fine_per_day: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub session_ttl_hours: i64,
    pub registration_enabled: bool,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityConfig {
    pub enable_hsts: Option<bool>,
    pub hsts_max_age: Option<u64>,
    pub hsts_include_subdomains: Option<bool>,
    pub csp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub lending: LendingConfig,
    pub auth: AuthConfig,
    pub security: Option<SecurityConfig>,
}

impl AppConfig {
    /// The borrowing rules handed to the lending workflow.
    pub fn lending_policy(&self) -> LendingPolicy {
        LendingPolicy {
            max_books_per_user: self.lending.max_books_per_user,
            borrow_days: self.lending.borrow_days,
            fine_per_day: self.lending.fine_per_day,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        match ::config::Config::builder()
            .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
            .build()
        {
            Ok(cfg) => match cfg.try_deserialize() {
                Ok(app_cfg) => app_cfg,
                Err(e) => {
                    eprintln!("FATAL: Failed to deserialize default config: {}", e);
                    panic!("Failed to deserialize default config: {}", e);
                }
            },
            Err(e) => {
                eprintln!("FATAL: Failed to parse default config: {}", e);
                panic!("Failed to parse default config: {}", e);
            }
        }
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();

    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
        // Optional local file: libris.toml (in CWD)
        .add_source(::config::File::with_name("libris").required(false));

    if let Ok(custom_path) = std::env::var("LIBRIS_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    // Environment variables last to have highest precedence
    builder = builder.add_source(::config::Environment::with_prefix("LIBRIS").separator("__"));

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

/// Layers a TOML snippet over the embedded defaults and validates the result.
pub fn from_toml_str(overrides: &str) -> anyhow::Result<AppConfig> {
    let cfg = ::config::Config::builder()
        .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
        .add_source(::config::File::from_str(overrides, ::config::FileFormat::Toml))
        .build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    // Server
    if cfg.server.port == 0 {
        return Err(anyhow::anyhow!("invalid server.port: {}", cfg.server.port));
    }
    #[cfg(unix)]
    if cfg.server.port < 1024 {
        tracing::warn!("Using privileged port {} - may require elevated permissions", cfg.server.port);
    }

    if cfg.database.max_connections == 0 {
        return Err(anyhow::anyhow!("database.max_connections must be > 0"));
    }

    // Lending
    if cfg.lending.max_books_per_user < 1 {
        return Err(anyhow::anyhow!("lending.max_books_per_user must be >= 1"));
    }
    if !(1..=365).contains(&cfg.lending.borrow_days) {
        return Err(anyhow::anyhow!("lending.borrow_days must be in 1..=365"));
    }
    if cfg.lending.fine_per_day < 0 {
        return Err(anyhow::anyhow!("lending.fine_per_day must not be negative"));
    }

    // Auth
    if cfg.auth.session_ttl_hours < 1 {
        return Err(anyhow::anyhow!("auth.session_ttl_hours must be >= 1"));
    }
    if let Some(admin) = &cfg.auth.bootstrap_admin {
        if admin.username.trim().is_empty() || admin.email.trim().is_empty() || admin.password.is_empty() {
            return Err(anyhow::anyhow!("auth.bootstrap_admin requires username, email and password"));
        }
    }

    Ok(())
}

pub fn ensure_sqlite_parent_dir(url: &str) -> anyhow::Result<()> {
    let path = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:"));
    if let Some(path) = path {
        if path.starts_with(":memory:") {
            return Ok(());
        }
        // Drop query parameters like ?mode=rwc
        let path = path.split('?').next().unwrap_or(path);
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(())
}
