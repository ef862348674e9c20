use axum::routing::{get, post};
use axum::Router;

use relay_application::AppState;

use crate::handlers::{ops_handlers, webhook_handlers};

pub const WEBHOOK_PREFIX: &str = "/cftools-webhook";

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(WEBHOOK_PREFIX, post(webhook_handlers::receive_unnamed))
        .route(
            &format!("{}/:server", WEBHOOK_PREFIX),
            post(webhook_handlers::receive),
        )
        .route("/ops/health/live", get(ops_handlers::health_live))
        .route(
            "/ops/metrics/prometheus",
            get(ops_handlers::metrics_prometheus),
        )
        .route("/ops/filters", get(ops_handlers::list_filters))
        .with_state(state)
}
