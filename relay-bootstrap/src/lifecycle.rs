use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use relay_domain::RuntimeConfig;
use relay_interfaces_http::build_router;

use crate::context::AppContext;

fn with_http_layers(router: Router, config: &RuntimeConfig) -> Router {
    let body_limit = usize::try_from(config.max_body_bytes).unwrap_or(usize::MAX);
    router
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_seconds,
        )))
        .layer(TraceLayer::new_for_http())
}

/// Loads the configuration, binds `bind_addr` and serves until SIGINT or
/// SIGTERM.
pub async fn run_standalone() -> Result<()> {
    let context = AppContext::new().await?;
    let addr: SocketAddr = context
        .state
        .config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind_addr {}", context.state.config.bind_addr))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "cftools relay listening");

    serve(listener, context, shutdown_signal()).await
}

/// Serves the relay on `listener` until `shutdown` resolves, running the
/// dedup sweep alongside.
pub async fn serve(
    listener: TcpListener,
    context: AppContext,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let state = context.state;
    let sweeper = state.dedup.spawn_sweeper(
        Duration::from_secs(state.config.dedup_sweep_interval_seconds),
        Duration::from_secs(state.config.dedup_ttl_seconds),
    );

    let app = with_http_layers(build_router(state.clone()), &state.config);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    sweeper.stop().await;
    info!("relay stopped");
    served?;
    Ok(())
}

async fn shutdown_signal() {
    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    };
    info!(signal, "shutting down");
}
