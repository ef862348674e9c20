// Webhook envelope entity
// One inbound delivery: the event plus the provider's delivery metadata

use crate::entities::Event;

#[derive(Debug, Clone)]
pub struct WebhookEnvelope {
    pub shard_id: i64,
    pub flavor: String,
    pub delivery_id: String,
    pub signature: String,
    pub event: Event,
}

impl WebhookEnvelope {
    pub fn is_verification(&self) -> bool {
        self.event.is_verification()
    }
}
