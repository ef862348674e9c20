use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use tracing::{debug, info, warn};

use relay_application::commands::webhook_commands::{handle_delivery, DeliveryOutcome};
use relay_application::AppState;

use crate::error::HttpError;
use crate::middleware::parse_envelope;

pub async fn receive(
    State(state): State<AppState>,
    Path(server): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, HttpError> {
    receive_for(&state, &server, &headers, &body).await
}

/// Deliveries of single-server setups, which configure no server name.
pub async fn receive_unnamed(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, HttpError> {
    receive_for(&state, "", &headers, &body).await
}

async fn receive_for(
    state: &AppState,
    server: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<StatusCode, HttpError> {
    if state.config.server(server).is_none() {
        debug!(server, "delivery for unknown server");
        return Err(HttpError::NotFound);
    }

    let envelope = parse_envelope(headers, body, state.config.max_body_bytes).map_err(|err| {
        warn!(server, "failed to parse webhook delivery: {}", err);
        HttpError::BadRequest(err.to_string())
    })?;
    info!(
        server,
        delivery_id = %envelope.delivery_id,
        event_type = %envelope.event.event_type,
        shard = envelope.shard_id,
        "webhook delivery received"
    );

    match handle_delivery(state, server, envelope).await? {
        DeliveryOutcome::Verified => Ok(StatusCode::NO_CONTENT),
        DeliveryOutcome::Processed | DeliveryOutcome::Coalesced | DeliveryOutcome::Duplicate => {
            Ok(StatusCode::OK)
        }
    }
}
