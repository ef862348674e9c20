use anyhow::{anyhow, Result};
use relay_domain::{Comparator, FilterList};
use tracing::warn;

/// Server names become a path segment of the webhook URL and must not need
/// percent-encoding.
pub fn validate_server_name(name: &str) -> Result<()> {
    if let Some(invalid) = name.chars().find(|ch| !is_unreserved(*ch)) {
        return Err(anyhow!(
            "server name '{}' is expected to be URL-safe, found '{}'",
            name,
            invalid
        ));
    }
    Ok(())
}

fn is_unreserved(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '-' | '.' | '_' | '~')
}

/// Logs rules that load but can never behave as written. Returns the number
/// of problems found.
pub fn lint_filters(filters: &FilterList) -> usize {
    let mut problems = 0;
    for filter in filters.iter() {
        for rule in &filter.rules {
            if rule.comparator == Comparator::Unknown {
                warn!(
                    event = %filter.event,
                    field = %rule.field,
                    "filter rule uses an unknown comparator and never matches"
                );
                problems += 1;
            }
            if !rule.is_event_count() {
                continue;
            }
            if let Err(err) = rule.since_window() {
                warn!(event = %filter.event, "{}", err);
                problems += 1;
            }
        }
    }
    problems
}
