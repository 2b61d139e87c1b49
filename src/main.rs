use std::net::SocketAddr;

use tokio::time::{self, Duration as TokioDuration};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use libris::{build_router, config, db, middleware::rate_limit::global_limiter, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging (stdout + tägliche Datei-Rotation unter ./logs)
    std::fs::create_dir_all("logs").ok();
    let (stdout_nb, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let file_appender = tracing_appender::rolling::daily("logs", "libris.log");
    let (file_nb, file_guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(stdout_nb))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_nb))
        .init();
    // Guards am Leben halten, damit die Non-Blocking Writer beim Beenden flushen
    let _log_guards = (stdout_guard, file_guard);

    // Load configuration (embedded defaults -> libris.toml -> LIBRIS_CONFIG -> env/.env)
    let app_cfg = config::load()?;

    let db_url = &app_cfg.database.url;
    config::ensure_sqlite_parent_dir(db_url)?;
    let pool = db::connect(db_url, app_cfg.database.max_connections).await?;
    db::init_db(&pool).await?;
    info!("Database ready at {}", db_url);

    let state = AppState::new(pool.clone(), app_cfg.clone());

    if let Some(admin) = app_cfg.auth.bootstrap_admin.as_ref() {
        match state.accounts.ensure_bootstrap_admin(admin).await {
            Ok(true) => info!("Bootstrap admin '{}' created", admin.username),
            Ok(false) => {}
            Err(e) => error!("Failed to create bootstrap admin '{}': {}", admin.username, e),
        }
    }

    // Periodic cleanup: rate limiter maps and expired sessions
    {
        let rl = state.rate_limiter.clone();
        let accounts = state.accounts.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(TokioDuration::from_secs(300));
            loop {
                ticker.tick().await;
                rl.cleanup_all().await;
                global_limiter().cleanup_old_entries().await;
                match accounts.purge_expired_sessions().await {
                    Ok(0) => {}
                    Ok(n) => info!("Purged {} expired sessions", n),
                    Err(e) => error!("Session purge failed: {}", e),
                }
            }
        });
    }

    let app = build_router(state);

    let port: u16 = app_cfg.server.port;
    let host: String = app_cfg.server.host.clone();
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen addr {}:{} - {}", host, port, e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Libris listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown signal received. Stopping server...");
}
