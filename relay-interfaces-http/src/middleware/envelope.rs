use std::io::Read;

use anyhow::{anyhow, Context, Result};
use axum::http::header::CONTENT_ENCODING;
use axum::http::HeaderMap;
use flate2::read::GzDecoder;
use serde_json::Value;

use relay_domain::{Event, FieldMap, FieldValue, WebhookEnvelope};

pub const HEADER_SHARD: &str = "x-hephaistos-shard";
pub const HEADER_FLAVOR: &str = "x-hephaistos-flavor";
pub const HEADER_DELIVERY: &str = "x-hephaistos-delivery";
pub const HEADER_SIGNATURE: &str = "x-hephaistos-signature";
pub const HEADER_EVENT: &str = "x-hephaistos-event";

/// Builds the envelope of one webhook delivery from its headers and body.
/// The event is stamped with the receive time. A gzip body may inflate to at
/// most `max_body_bytes`.
pub fn parse_envelope(
    headers: &HeaderMap,
    body: &[u8],
    max_body_bytes: u64,
) -> Result<WebhookEnvelope> {
    let delivery_id = required_header(headers, HEADER_DELIVERY)?;
    let event_type = required_header(headers, HEADER_EVENT)?;
    let shard_id = match optional_header(headers, HEADER_SHARD)? {
        Some(value) => value
            .parse()
            .with_context(|| format!("invalid {} header '{}'", HEADER_SHARD, value))?,
        None => 0,
    };
    let flavor = optional_header(headers, HEADER_FLAVOR)?.unwrap_or_default();
    let signature = optional_header(headers, HEADER_SIGNATURE)?.unwrap_or_default();

    let content = maybe_gunzip(headers, body, max_body_bytes)?;
    let values = parse_values(&content)?;

    Ok(WebhookEnvelope {
        shard_id,
        flavor,
        delivery_id,
        signature,
        event: Event::new(event_type, values),
    })
}

fn required_header(headers: &HeaderMap, name: &str) -> Result<String> {
    optional_header(headers, name)?.ok_or_else(|| anyhow!("missing {} header", name))
}

fn optional_header(headers: &HeaderMap, name: &str) -> Result<Option<String>> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .with_context(|| format!("{} header is not valid text", name))?
        .trim();
    Ok((!value.is_empty()).then(|| value.to_string()))
}

fn maybe_gunzip(headers: &HeaderMap, body: &[u8], limit: u64) -> Result<Vec<u8>> {
    let gzipped = headers
        .get(CONTENT_ENCODING)
        .and_then(|encoding| encoding.to_str().ok())
        .is_some_and(|encoding| encoding.trim().eq_ignore_ascii_case("gzip"));
    if !gzipped {
        return Ok(body.to_vec());
    }
    let mut out = Vec::new();
    GzDecoder::new(body)
        .take(limit.saturating_add(1))
        .read_to_end(&mut out)
        .context("failed to inflate gzip body")?;
    if out.len() as u64 > limit {
        return Err(anyhow!("inflated body exceeds {} bytes", limit));
    }
    Ok(out)
}

fn parse_values(content: &[u8]) -> Result<FieldMap> {
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(FieldMap::new());
    }
    match serde_json::from_slice::<Value>(content).context("body is not valid JSON")? {
        Value::Object(fields) => Ok(fields
            .into_iter()
            .filter_map(|(key, value)| FieldValue::from_json(value).map(|value| (key, value)))
            .collect()),
        Value::Null => Ok(FieldMap::new()),
        _ => Err(anyhow!("body must be a JSON object")),
    }
}
