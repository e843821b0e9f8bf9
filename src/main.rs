mod core;
mod features;
mod shared;

use crate::core::clock::{Clock, SystemClock};
use crate::core::config::{Config, StorageBackend};
use crate::core::openapi::{ApiDoc, SwaggerInfoModifier};
use crate::core::{database, middleware};
use crate::features::auth;
use crate::features::rate_limits::middleware::{activity_logging_middleware, throttle_middleware};
use crate::features::rate_limits::repositories::{
    ActivityLogRepository, InMemoryActivityLog, InMemoryRateLimitStore, PgActivityLogRepository,
    PgRateLimitConfigRepository, RateLimitConfigRepository,
};
use crate::features::rate_limits::{
    routes as rate_limits_routes, ActivityRetentionService, ActivityService,
    RateLimitConfigService, RateLimitService, RateLimitState, RetentionSweeper, UsageCounter,
};
use axum::{
    middleware::{from_fn, from_fn_with_state},
    Router,
};
use std::sync::Arc;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

fn main() -> anyhow::Result<()> {
    // Build Tokio runtime with configurable worker threads
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .max_blocking_threads(worker_threads * 4)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(worker_threads))
}

/// Storage for limits, audit entries and activity, chosen by `STORAGE_BACKEND`
async fn build_repositories(
    config: &Config,
) -> anyhow::Result<(
    Arc<dyn RateLimitConfigRepository>,
    Arc<dyn ActivityLogRepository>,
)> {
    match config.storage {
        StorageBackend::Postgres => {
            let db_config = config
                .database
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for postgres storage"))?;

            let pool = database::create_pool(db_config).await?;
            tracing::info!("Database connection pool created");

            database::run_migrations(&pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

            let config_repository: Arc<dyn RateLimitConfigRepository> =
                Arc::new(PgRateLimitConfigRepository::new(pool.clone()));
            let activity_repository: Arc<dyn ActivityLogRepository> =
                Arc::new(PgActivityLogRepository::new(pool));
            Ok((config_repository, activity_repository))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; limits and activity are lost on restart");
            let config_repository: Arc<dyn RateLimitConfigRepository> =
                Arc::new(InMemoryRateLimitStore::new());
            let activity_repository: Arc<dyn ActivityLogRepository> =
                Arc::new(InMemoryActivityLog::new());
            Ok((config_repository, activity_repository))
        }
    }
}

async fn async_main(worker_threads: usize) -> anyhow::Result<()> {
    // Load .env file BEFORE initializing logger so RUST_LOG is available
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    let available_cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    tracing::info!(
        "System info: available_cpus={}, tokio_worker_threads={}, pid={}",
        available_cpus,
        worker_threads,
        std::process::id()
    );
    tracing::info!("Configuration loaded successfully");

    let (config_repository, activity_repository) = build_repositories(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let jwt_validator = Arc::new(auth::JwtValidator::new(&config.auth));
    tracing::info!("Auth configuration initialized");

    // Rate limit services
    let config_service = Arc::new(RateLimitConfigService::new(config_repository));
    let usage_counter = Arc::new(UsageCounter::new(
        Arc::clone(&activity_repository),
        Arc::clone(&clock),
    ));
    let rate_limit_service = Arc::new(RateLimitService::new(
        Arc::clone(&config_service),
        usage_counter,
        Arc::clone(&clock),
        &config.rate_limit,
    ));
    let activity_service = Arc::new(ActivityService::new(Arc::clone(&activity_repository)));
    let retention_service = Arc::new(ActivityRetentionService::new(
        activity_repository,
        Arc::clone(&clock),
        config.rate_limit.retention_days,
    ));
    tracing::info!(
        "Rate limit services initialized (default {}/{}s, evaluation timeout {:?})",
        config.rate_limit.default_limit,
        config.rate_limit.default_window_secs,
        config.rate_limit.evaluation_timeout
    );

    // Spawn retention worker
    let sweeper = RetentionSweeper::new(
        Arc::clone(&retention_service),
        config.rate_limit.retention_interval,
    );
    tokio::spawn(async move {
        sweeper.run().await;
    });
    tracing::info!("Activity retention worker spawned");

    let state = RateLimitState {
        config_service,
        rate_limit_service: Arc::clone(&rate_limit_service),
        retention_service,
    };

    // Build application router with dynamic swagger config
    let swagger_modifier = SwaggerInfoModifier {
        title: config.swagger.title.clone(),
        version: config.swagger.version.clone(),
        description: config.swagger.description.clone(),
    };

    let mut openapi = ApiDoc::openapi();
    swagger_modifier.modify(&mut openapi);

    let swagger = if let Some(credentials) = config.swagger.credentials() {
        tracing::info!("Swagger UI basic auth enabled");
        Router::new()
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
            .layer(from_fn(middleware::basic_auth_middleware(Arc::new(
                credentials,
            ))))
    } else {
        tracing::info!("Swagger UI basic auth disabled (no credentials configured)");
        Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
    };

    // Throttled routes: auth, then activity logging, then the admission gate
    let throttled_routes = Router::new()
        .merge(rate_limits_routes::admin_routes(state.clone()))
        .route_layer(from_fn_with_state(rate_limit_service, throttle_middleware))
        .route_layer(from_fn_with_state(
            activity_service,
            activity_logging_middleware,
        ))
        .route_layer(from_fn_with_state(
            jwt_validator.clone(),
            middleware::auth_middleware,
        ));

    // Authenticated but neither throttled nor logged
    let status_routes = rate_limits_routes::routes(state).route_layer(from_fn_with_state(
        jwt_validator,
        middleware::auth_middleware,
    ));

    // Simple health check endpoint (no auth required)
    async fn health_check() -> axum::http::StatusCode {
        axum::http::StatusCode::OK
    }
    let health_route = Router::new().route("/health", axum::routing::get(health_check));

    let app = Router::new()
        .merge(swagger)
        .merge(throttled_routes)
        .merge(status_routes)
        .merge(health_route)
        .layer(middleware::cors_layer(
            config.app.cors_allowed_origins.clone(),
        ))
        // Propagate X-Request-Id to response headers
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(middleware::MakeSpanWithRequestId)
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Generate X-Request-Id using UUID v7 (or use client-provided one)
        .layer(SetRequestIdLayer::x_request_id(middleware::MakeRequestUuid));

    // Start server
    let addr = config.app.server_address();
    let socket_addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address: {}", e))?;

    // Use socket2 for TCP listener configuration
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(socket_addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nodelay(true)?;

    #[cfg(target_os = "linux")]
    {
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(std::time::Duration::from_secs(60))
            .with_interval(std::time::Duration::from_secs(10))
            .with_retries(3);
        socket.set_tcp_keepalive(&keepalive)?;
    }
    #[cfg(not(target_os = "linux"))]
    {
        let keepalive = socket2::TcpKeepalive::new().with_time(std::time::Duration::from_secs(60));
        socket.set_tcp_keepalive(&keepalive)?;
    }

    socket.set_nonblocking(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(1024)?;

    let listener = tokio::net::TcpListener::from_std(socket.into())?;
    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
