use std::sync::Arc;

use relay_domain::WebhookEnvelope;
use tracing::{debug, error, info};

use crate::{AppError, AppState, RunOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Endpoint registration handshake; nothing was processed.
    Verified,
    Processed,
    /// A concurrent delivery with the same id processed the event.
    Coalesced,
    /// The delivery id was processed recently.
    Duplicate,
}

/// Handles one inbound delivery addressed to `server_name` (empty for the
/// legacy unnamed server).
pub async fn handle_delivery(
    state: &AppState,
    server_name: &str,
    envelope: WebhookEnvelope,
) -> Result<DeliveryOutcome, AppError> {
    let server = state
        .config
        .server(server_name)
        .ok_or_else(|| AppError::UnknownServer(server_name.to_string()))?;
    state.metrics.record_delivery();

    if envelope.is_verification() {
        info!(server = server_name, delivery_id = %envelope.delivery_id, "webhook verification received");
        return Ok(DeliveryOutcome::Verified);
    }

    if let Err(err) = state.dispatcher.authenticate(&envelope, server) {
        state.metrics.record_error();
        return Err(err);
    }

    // The work outlives this call when the request is dropped, so it owns
    // everything it touches.
    let dispatcher = Arc::clone(&state.dispatcher);
    let metrics = Arc::clone(&state.metrics);
    let name = (!server_name.is_empty()).then(|| server_name.to_string());
    let delivery_id = envelope.delivery_id.clone();
    let event = envelope.event;
    let event_type = event.event_type.clone();
    let run = state
        .dedup
        .run_once(&envelope.delivery_id, move || async move {
            let outcome = dispatcher.process(&event, name.as_deref()).await?;
            metrics.record_relays(outcome.relayed());
            debug!(
                delivery_id = %delivery_id,
                event_type = %event.event_type,
                relayed = outcome.relayed(),
                "delivery processed"
            );
            Ok(())
        })
        .await;

    match run {
        Ok(RunOutcome::Executed) => Ok(DeliveryOutcome::Processed),
        Ok(RunOutcome::Coalesced) => {
            state.metrics.record_duplicate();
            Ok(DeliveryOutcome::Coalesced)
        }
        Ok(RunOutcome::Skipped) => {
            state.metrics.record_duplicate();
            debug!(delivery_id = %envelope.delivery_id, "delivery already processed");
            Ok(DeliveryOutcome::Duplicate)
        }
        Err(shared) => {
            state.metrics.record_error();
            error!(
                delivery_id = %envelope.delivery_id,
                event_type = %event_type,
                error = %shared,
                "delivery failed"
            );
            Err(AppError::from_shared(shared))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::sign_delivery;
    use crate::{DedupCoordinator, DeliveryDispatcher, Metrics};
    use async_trait::async_trait;
    use relay_domain::ports::NotificationTarget;
    use relay_domain::{
        Event, FieldMap, FieldValue, Filter, FilterList, InMemoryEventHistory, RuntimeConfig,
        Server, SignatureScheme, EVENT_PLAYER_KILL, EVENT_VERIFICATION, FIELD_MURDERER_ID,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingTarget {
        relays: AtomicUsize,
    }

    #[async_trait]
    impl NotificationTarget for CountingTarget {
        async fn relay(
            &self,
            _event: &Event,
            _filter: Option<&Filter>,
            _server_name: Option<&str>,
        ) -> anyhow::Result<()> {
            self.relays.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct SlowTarget {
        relays: AtomicUsize,
    }

    #[async_trait]
    impl NotificationTarget for SlowTarget {
        async fn relay(
            &self,
            _event: &Event,
            _filter: Option<&Filter>,
            _server_name: Option<&str>,
        ) -> anyhow::Result<()> {
            tokio::time::sleep(std::time::Duration::from_secs(20)).await;
            self.relays.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn state(target: Arc<dyn NotificationTarget>) -> AppState {
        let mut config = RuntimeConfig::default();
        config
            .servers
            .insert("alpha".to_string(), Server::new("secret"));
        config.servers.insert(
            "legacy".to_string(),
            Server::new("secret").with_scheme(SignatureScheme::Sha256),
        );
        let dispatcher = DeliveryDispatcher::new(
            Arc::new(InMemoryEventHistory::new()),
            FilterList::default(),
            target,
        );
        AppState {
            config,
            dispatcher: Arc::new(dispatcher),
            dedup: DedupCoordinator::new(),
            metrics: Arc::new(Metrics::default()),
        }
    }

    fn envelope(event_type: &str, delivery_id: &str, scheme: SignatureScheme) -> WebhookEnvelope {
        let mut values = FieldMap::new();
        values.insert(FIELD_MURDERER_ID.to_string(), FieldValue::from("M1"));
        WebhookEnvelope {
            shard_id: 0,
            flavor: "cftools".to_string(),
            delivery_id: delivery_id.to_string(),
            signature: sign_delivery(scheme, "secret", delivery_id).expect("sign"),
            event: Event::new(event_type, values),
        }
    }

    #[tokio::test]
    async fn unknown_server_is_rejected() {
        let state = state(Arc::new(CountingTarget::default()));
        let err = handle_delivery(
            &state,
            "missing",
            envelope(EVENT_PLAYER_KILL, "d1", SignatureScheme::HmacSha256),
        )
        .await
        .expect_err("unknown");
        assert!(matches!(err, AppError::UnknownServer(name) if name == "missing"));
    }

    #[tokio::test]
    async fn verification_skips_signature_and_relay() {
        let target = Arc::new(CountingTarget::default());
        let state = state(target.clone());
        let mut verification = envelope(EVENT_VERIFICATION, "d1", SignatureScheme::HmacSha256);
        verification.signature = "bogus".to_string();

        let outcome = handle_delivery(&state, "alpha", verification)
            .await
            .expect("verified");

        assert_eq!(outcome, DeliveryOutcome::Verified);
        assert_eq!(target.relays.load(Ordering::SeqCst), 0);
        assert!(!state.dedup.is_executed("d1"));
    }

    #[tokio::test]
    async fn bad_signature_is_rejected() {
        let target = Arc::new(CountingTarget::default());
        let state = state(target.clone());
        let mut delivery = envelope(EVENT_PLAYER_KILL, "d1", SignatureScheme::HmacSha256);
        delivery.signature = "00".repeat(32);

        let err = handle_delivery(&state, "alpha", delivery)
            .await
            .expect_err("mismatch");

        assert!(matches!(err, AppError::SignatureMismatch));
        assert_eq!(target.relays.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn repeated_delivery_relays_once() {
        let target = Arc::new(CountingTarget::default());
        let state = state(target.clone());

        let first = handle_delivery(
            &state,
            "alpha",
            envelope(EVENT_PLAYER_KILL, "d1", SignatureScheme::HmacSha256),
        )
        .await
        .expect("first");
        let second = handle_delivery(
            &state,
            "alpha",
            envelope(EVENT_PLAYER_KILL, "d1", SignatureScheme::HmacSha256),
        )
        .await
        .expect("second");

        assert_eq!(first, DeliveryOutcome::Processed);
        assert_eq!(second, DeliveryOutcome::Duplicate);
        assert_eq!(target.relays.load(Ordering::SeqCst), 1);
        assert!(state
            .metrics
            .render_prometheus()
            .contains("cftools_relay_duplicates_total 1\n"));
    }

    #[tokio::test]
    async fn digest_scheme_servers_accept_their_signatures() {
        let target = Arc::new(CountingTarget::default());
        let state = state(target.clone());

        let outcome = handle_delivery(
            &state,
            "legacy",
            envelope(EVENT_PLAYER_KILL, "d1", SignatureScheme::Sha256),
        )
        .await
        .expect("processed");

        assert_eq!(outcome, DeliveryOutcome::Processed);
        assert_eq!(target.relays.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_request_still_relays_once() {
        let target = Arc::new(SlowTarget {
            relays: AtomicUsize::new(0),
        });
        let state = state(target.clone());

        let timed_out = tokio::time::timeout(
            std::time::Duration::from_secs(15),
            handle_delivery(
                &state,
                "alpha",
                envelope(EVENT_PLAYER_KILL, "d1", SignatureScheme::HmacSha256),
            ),
        )
        .await;
        assert!(timed_out.is_err());

        let retry = handle_delivery(
            &state,
            "alpha",
            envelope(EVENT_PLAYER_KILL, "d1", SignatureScheme::HmacSha256),
        )
        .await
        .expect("retry");

        assert_eq!(retry, DeliveryOutcome::Coalesced);
        assert_eq!(target.relays.load(Ordering::SeqCst), 1);
        assert!(state.dedup.is_executed("d1"));
    }
}
