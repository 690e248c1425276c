use chrono::Duration;
use identity_service::{
    build_router,
    config::IdentityConfig,
    db::{create_pool, run_migrations},
    services::{
        build_providers, metrics, AuthService, Database, JwtService, PgTenantDatabase,
        RedisService, SsoService, TenantProvisioner,
    },
    AppState,
};
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    dotenvy::dotenv().ok();

    // Fail fast on invalid configuration
    let config = IdentityConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    metrics::init_metrics()
        .map_err(|e| anyhow::anyhow!("Failed to register metrics: {}", e))?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    let pool = create_pool(&config.database).await?;
    run_migrations(&pool).await?;
    let db = Database::new(pool);
    tracing::info!("Database initialized successfully");

    let redis = Arc::new(RedisService::new(&config.redis).await?);
    tracing::info!("Redis service initialized");

    let jwt = JwtService::new(&config.jwt);
    let providers = build_providers(&config.sso)?;

    let store = Arc::new(db.clone());
    let auth_service = AuthService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        jwt,
        Duration::minutes(config.password_reset_ttl_minutes),
    );
    let sso_service = SsoService::new(
        config.sso.clone(),
        providers,
        redis.clone(),
        store.clone(),
        auth_service.clone(),
    );
    let provisioner = TenantProvisioner::new(
        store,
        Arc::new(PgTenantDatabase::new()),
        config.tenancy.clone(),
    );

    let state = AppState {
        config: config.clone(),
        auth_service,
        sso_service,
        provisioner,
        db: Some(db),
        states: redis,
    };
    let app = build_router(state).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
