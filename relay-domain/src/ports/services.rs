use async_trait::async_trait;

use crate::entities::{Event, Filter};

#[async_trait]
pub trait NotificationTarget: Send + Sync {
    /// Formats and delivers one notification for `event`. `filter` carries the
    /// formatting directives of the filter that matched, if any.
    async fn relay(
        &self,
        event: &Event,
        filter: Option<&Filter>,
        server_name: Option<&str>,
    ) -> anyhow::Result<()>;
}
