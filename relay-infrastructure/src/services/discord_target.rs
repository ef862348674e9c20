use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::warn;

use relay_domain::ports::NotificationTarget;
use relay_domain::{color_code, Event, Filter, Format, FormatType, COLOR_DARK_BLUE};

use crate::services::text_template::{render_all_fields, render_text};

pub const RELAY_USERNAME: &str = "CFTools-Relay";
const EMBED_FOOTER: &str = "CFTools Relay by FlorianSW";
const EMBED_PROVIDER: &str = "CFTools Relay";

/// Posts relayed events to a Discord webhook.
pub struct DiscordTarget {
    client: Client,
    webhook_url: String,
}

impl DiscordTarget {
    pub fn new(webhook_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }
}

#[async_trait]
impl NotificationTarget for DiscordTarget {
    async fn relay(
        &self,
        event: &Event,
        filter: Option<&Filter>,
        server_name: Option<&str>,
    ) -> Result<()> {
        let payload = build_payload(event, filter, server_name)?;
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        warn!(
            status = status.as_u16(),
            event_type = %event.event_type,
            body = %body,
            "discord rejected relayed event"
        );
        anyhow::bail!("expected status code 2xx, got {}", status.as_u16())
    }
}

/// Webhook payload for `event` following the filter's format directives.
/// Events relayed without a filter use the rich layout.
pub fn build_payload(
    event: &Event,
    filter: Option<&Filter>,
    server_name: Option<&str>,
) -> Result<Value> {
    let format = filter.and_then(|filter| filter.format.as_ref());
    match filter.map(Filter::format_type).unwrap_or_default() {
        FormatType::Rich => Ok(rich_payload(event, format, server_name)),
        FormatType::Text => text_payload(event, format),
    }
}

fn rich_payload(event: &Event, format: Option<&Format>, server_name: Option<&str>) -> Value {
    let message = format
        .and_then(|format| format.parameter_str("message"))
        .map(ToString::to_string)
        .unwrap_or_else(|| event.message());
    let color = format
        .and_then(|format| format.parameter_str("color"))
        .map(color_code)
        .unwrap_or(COLOR_DARK_BLUE);

    let mut fields = vec![json!({ "name": "Message", "value": message, "inline": false })];
    fields.extend(
        event
            .metadata()
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(label, value)| json!({ "name": label, "value": value, "inline": true })),
    );

    let mut embed = json!({
        "color": color,
        "footer": { "text": EMBED_FOOTER },
        "provider": { "name": EMBED_PROVIDER, "url": "https://github.com" },
        "fields": fields,
    });
    if let Some(server) = server_name {
        embed["title"] = Value::String(server.to_string());
    }

    json!({
        "username": RELAY_USERNAME,
        "embeds": [embed],
    })
}

fn text_payload(event: &Event, format: Option<&Format>) -> Result<Value> {
    let content = match format.and_then(|format| format.parameter_str("template")) {
        Some(template) => render_text(template, &event.values)?,
        None => render_all_fields(&event.values),
    };
    Ok(json!({
        "username": RELAY_USERNAME,
        "content": content,
    }))
}
