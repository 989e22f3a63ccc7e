use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tracing::info;

mod app;
mod error;
mod http;
mod lifecycle;
mod url_allowlist;

use observatory_auth::CredentialResolver;
use observatory_core::ObservatoryConfig;
use observatory_dispatcher::{Dispatcher, DispatcherConfig, HttpBackend};
use observatory_jobs::JobStore;
use observatory_ratelimit::{DashMapStore, RateLimiter, TierWindowLimits};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "observatory_gateway=info,tower_http=debug".into()),
        )
        .init();

    let config_path = std::env::var("OBSERVATORY_CONFIG").unwrap_or_else(|_| "observatory.toml".to_string());
    let config = ObservatoryConfig::load(&config_path).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "config load failed, using defaults");
        ObservatoryConfig::default()
    });

    let conn = rusqlite::Connection::open(&config.server.db_path)?;
    observatory_auth::db::init_db(&conn)?;
    observatory_jobs::db::init_db(&conn)?;
    let conn = Arc::new(Mutex::new(conn));

    let auth = Arc::new(CredentialResolver::new(
        conn.clone(),
        config.server.credential_cache_capacity,
        config.server.credential_cache_ttl_secs,
    ));

    let rate_limiter = RateLimiter::new(
        DashMapStore::new(),
        TierWindowLimits {
            per_minute: config.tiers.public.per_minute,
            per_hour: config.tiers.public.per_hour,
            per_day: config.tiers.public.per_day,
        },
        TierWindowLimits {
            per_minute: config.tiers.api_key.per_minute,
            per_hour: config.tiers.api_key.per_hour,
            per_day: config.tiers.api_key.per_day,
        },
        TierWindowLimits {
            per_minute: config.tiers.partner.per_minute,
            per_hour: config.tiers.partner.per_hour,
            per_day: config.tiers.partner.per_day,
        },
    );

    let jobs = Arc::new(JobStore::new(
        conn.clone(),
        config.ttl.pending_ttl_secs,
        config.ttl.result_ttl_secs,
        config.ttl.cancelled_ttl_secs,
    ));

    let backend = Arc::new(HttpBackend::new(config.dispatcher.backend_url.clone()));

    let callback_secret_public = std::env::var("OBSERVATORY_CALLBACK_SECRET_PUBLIC").unwrap_or_default();
    let callback_secret_api_key = std::env::var("OBSERVATORY_CALLBACK_SECRET_API_KEY").unwrap_or_default();
    let callback_secret_partner = std::env::var("OBSERVATORY_CALLBACK_SECRET_PARTNER").unwrap_or_default();
    let callback_secrets = Arc::new(app::ConfigCallbackSecrets::new(
        auth.clone(),
        callback_secret_public,
        callback_secret_api_key,
        callback_secret_partner,
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        jobs.clone(),
        backend,
        DispatcherConfig {
            backend_timeout: std::time::Duration::from_secs(config.dispatcher.backend_timeout_secs),
            max_retries: config.dispatcher.max_retries,
            worker_count: config.dispatcher.worker_count,
            queue_depth: config.dispatcher.queue_depth,
        },
        callback_secrets,
    ));

    let (dispatcher_shutdown_tx, dispatcher_shutdown_rx) = observatory_dispatcher::shutdown_pair();
    let worker_handles = dispatcher.spawn_workers(dispatcher_shutdown_rx);

    let (reaper_shutdown_tx, reaper_shutdown_rx) = tokio::sync::watch::channel(false);
    let reaper = observatory_jobs::Reaper::new(jobs.clone(), config.server.reaper_tick_secs);
    let reaper_handle = tokio::spawn(reaper.run(reaper_shutdown_rx));

    let bind_addr = config.server.bind_addr.clone();
    let state = Arc::new(app::AppState { config, auth, rate_limiter, jobs, dispatcher });
    let router = app::build_router(state);

    let addr: SocketAddr = bind_addr.parse()?;
    info!(%addr, "observatory gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = dispatcher_shutdown_tx.send(true);
    let _ = reaper_shutdown_tx.send(true);
    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = reaper_handle.await;

    Ok(())
}

/// Waits for either SIGINT or SIGTERM so `docker stop`/systemd and Ctrl-C
/// both trigger the same graceful drain.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received, draining");
}
