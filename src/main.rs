use std::{net::SocketAddr, sync::Arc, time::Duration};

use http::HeaderValue;
use tokio::{signal, sync::mpsc};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};
use tracing::{error, info, warn};

use branch_reservations as app;
use app::notifications::{Broadcaster, InMemoryBroadcaster, RedisBroadcaster};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = app::config::load_config()?;
    app::config::init_tracing(cfg.log_level(), cfg.log_json);
    app::handlers::health::init_start_time();

    // Init DB
    let db_pool = app::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        app::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Local topic hub backing the WebSocket endpoints
    let hub = Arc::new(InMemoryBroadcaster::new(cfg.broadcast_topic_capacity));

    // Publisher used by the fan-out worker
    let broadcaster: Arc<dyn Broadcaster> = if cfg.uses_redis_broadcast() {
        let client = redis::Client::open(cfg.redis_url.clone())?;
        match RedisBroadcaster::connect(client.clone(), cfg.broadcast_namespace.clone()).await {
            Ok(redis_broadcaster) => {
                info!(namespace = %cfg.broadcast_namespace, "Publishing dashboard topics through redis");
                tokio::spawn(app::notifications::relay_redis_to_local(
                    client,
                    cfg.broadcast_namespace.clone(),
                    hub.clone(),
                ));
                Arc::new(redis_broadcaster)
            }
            Err(err) => {
                error!(
                    "Failed to initialize redis broadcaster (falling back to in-memory): {}",
                    err
                );
                hub.clone()
            }
        }
    } else {
        hub.clone()
    };

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = app::events::EventSender::new(event_tx);
    let event_worker = tokio::spawn(app::events::process_events(event_rx, broadcaster));

    // Compose shared app state
    let app_state = app::AppState::new(db_arc.clone(), cfg.clone(), event_sender, hub);

    // Build CORS layer from config
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    let cors_layer = if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        CorsLayer::permissive()
    } else {
        error!("Missing CORS configuration detected; set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true");
        return Err("Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true".into());
    };

    let router = app::build_router(app_state)
        // HTTP tracing layer for consistent request/response telemetry
        .layer(app::tracing::configure_http_tracing())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CompressionLayer::new())
        .layer(cors_layer);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], cfg.port)));
    info!("branch-reservations listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Dropping the router dropped every EventSender, so the worker drains and exits
    if tokio::time::timeout(Duration::from_secs(5), event_worker)
        .await
        .is_err()
    {
        warn!("Event worker did not drain within 5s");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
