use std::sync::Arc;

use relay_domain::ports::{EventHistory, NotificationTarget};
use relay_domain::{Event, Filter, FilterList, FilterMatch, MatchPolicy, Server, WebhookEnvelope};
use tracing::{debug, info};

use crate::signature::verify_delivery;
use crate::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Number of notifications sent.
    Relayed(usize),
    Unmatched,
}

impl DispatchOutcome {
    pub fn relayed(&self) -> usize {
        match self {
            DispatchOutcome::Relayed(count) => *count,
            DispatchOutcome::Unmatched => 0,
        }
    }
}

/// Records each event, evaluates the filters and relays what passes.
pub struct DeliveryDispatcher {
    history: Arc<dyn EventHistory>,
    filters: FilterList,
    policy: MatchPolicy,
    target: Arc<dyn NotificationTarget>,
}

impl DeliveryDispatcher {
    pub fn new(
        history: Arc<dyn EventHistory>,
        filters: FilterList,
        target: Arc<dyn NotificationTarget>,
    ) -> Self {
        Self {
            history,
            filters,
            policy: MatchPolicy::default(),
            target,
        }
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn filters(&self) -> &FilterList {
        &self.filters
    }

    pub fn authenticate(&self, envelope: &WebhookEnvelope, server: &Server) -> Result<(), AppError> {
        if verify_delivery(server, &envelope.delivery_id, &envelope.signature)? {
            Ok(())
        } else {
            Err(AppError::SignatureMismatch)
        }
    }

    /// Saves `event` to the history, then relays it once per passing filter
    /// (or once, unformatted, when no filters are configured).
    ///
    /// Stops at the first failed relay; notifications already sent are not
    /// retracted.
    pub async fn process(
        &self,
        event: &Event,
        server_name: Option<&str>,
    ) -> Result<DispatchOutcome, AppError> {
        self.history.save(event).await?;

        let selected = self
            .filters
            .select(self.policy, self.history.as_ref(), event)
            .await?;
        match selected {
            FilterMatch::Unfiltered => {
                self.relay(event, None, server_name).await?;
                Ok(DispatchOutcome::Relayed(1))
            }
            FilterMatch::Matched(filters) => {
                for &filter in &filters {
                    self.relay(event, Some(filter), server_name).await?;
                }
                Ok(DispatchOutcome::Relayed(filters.len()))
            }
            FilterMatch::Unmatched => {
                if self.filters.has_filter_for(&event.event_type) {
                    debug!(event_type = %event.event_type, "filter rules rejected event");
                }
                Ok(DispatchOutcome::Unmatched)
            }
        }
    }

    async fn relay(
        &self,
        event: &Event,
        filter: Option<&Filter>,
        server_name: Option<&str>,
    ) -> Result<(), AppError> {
        self.target
            .relay(event, filter, server_name)
            .await
            .map_err(AppError::Relay)?;
        info!(
            event_type = %event.event_type,
            server = server_name.unwrap_or_default(),
            "relayed event"
        );
        Ok(())
    }
}
