//! Filter and rule evaluation.
//!
//! Rules compare a field of the incoming event against a configured value.
//! The virtual `event_count` field is not part of any payload; it is resolved
//! per rule from the subject's history.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::{Comparator, Event, Filter, FilterList, Rule};
use crate::ports::{EventHistory, HistoryError};
use crate::utils::{parse_duration, DurationParseError};
use crate::value_objects::FieldValue;

pub const EVENT_COUNT_FIELD: &str = "event_count";
const LEGACY_EVENT_COUNT_FIELD: &str = "vf_event_count";
const DEFAULT_EVENT_COUNT_WINDOW: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid since '{value}' on rule for field '{field}': {source}")]
    InvalidSince {
        field: String,
        value: String,
        #[source]
        source: DurationParseError,
    },
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Outcome of evaluating a [`FilterList`] against one event.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterMatch<'a> {
    /// No filters are configured; the event is forwarded as is.
    Unfiltered,
    /// Filters that fully passed, in declaration order. Never empty.
    Matched(Vec<&'a Filter>),
    Unmatched,
}

impl<'a> FilterMatch<'a> {
    pub fn matched_any(&self) -> bool {
        !matches!(self, FilterMatch::Unmatched)
    }

    pub fn filters(&self) -> &[&'a Filter] {
        match self {
            FilterMatch::Matched(filters) => filters,
            FilterMatch::Unfiltered | FilterMatch::Unmatched => &[],
        }
    }
}

/// Which passing filters a delivery is relayed for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// One relay per passing filter.
    #[default]
    All,
    /// Only the first passing filter in declaration order.
    First,
}

impl FilterList {
    pub async fn select(
        &self,
        policy: MatchPolicy,
        history: &dyn EventHistory,
        event: &Event,
    ) -> Result<FilterMatch<'_>, FilterError> {
        match policy {
            MatchPolicy::All => self.matching_filters(history, event).await,
            MatchPolicy::First => self.first_matching(history, event).await,
        }
    }

    /// Evaluates every filter and returns all that pass.
    pub async fn matching_filters(
        &self,
        history: &dyn EventHistory,
        event: &Event,
    ) -> Result<FilterMatch<'_>, FilterError> {
        if self.is_empty() {
            return Ok(FilterMatch::Unfiltered);
        }
        let mut matched = Vec::new();
        for filter in self.iter() {
            if filter.matches(history, event).await? {
                matched.push(filter);
            }
        }
        if matched.is_empty() {
            Ok(FilterMatch::Unmatched)
        } else {
            Ok(FilterMatch::Matched(matched))
        }
    }

    /// Returns at most the first passing filter, skipping the rest.
    pub async fn first_matching(
        &self,
        history: &dyn EventHistory,
        event: &Event,
    ) -> Result<FilterMatch<'_>, FilterError> {
        if self.is_empty() {
            return Ok(FilterMatch::Unfiltered);
        }
        for filter in self.iter() {
            if filter.matches(history, event).await? {
                return Ok(FilterMatch::Matched(vec![filter]));
            }
        }
        Ok(FilterMatch::Unmatched)
    }

    /// Whether any filter cares about this event type at all, regardless of
    /// its rules.
    pub fn has_filter_for(&self, event_type: &str) -> bool {
        self.iter().any(|filter| filter.event == event_type)
    }
}

impl Filter {
    pub async fn matches(
        &self,
        history: &dyn EventHistory,
        event: &Event,
    ) -> Result<bool, FilterError> {
        if event.event_type != self.event {
            return Ok(false);
        }
        for rule in &self.rules {
            if !rule.evaluate(history, event).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Rule {
    pub fn is_event_count(&self) -> bool {
        self.field == EVENT_COUNT_FIELD || self.field == LEGACY_EVENT_COUNT_FIELD
    }

    /// Window of the `event_count` lookup; one hour unless `since` says otherwise.
    pub fn since_window(&self) -> Result<Duration, FilterError> {
        match self.since.as_deref().map(str::trim) {
            None | Some("") => Ok(DEFAULT_EVENT_COUNT_WINDOW),
            Some(value) => parse_duration(value).map_err(|source| FilterError::InvalidSince {
                field: self.field.clone(),
                value: value.to_string(),
                source,
            }),
        }
    }

    pub async fn evaluate(
        &self,
        history: &dyn EventHistory,
        event: &Event,
    ) -> Result<bool, FilterError> {
        if self.is_event_count() {
            let count = self.count_events(history, event).await?;
            return Ok(self.comparator.compare(&FieldValue::Integer(count), &self.value));
        }
        Ok(event
            .value(&self.field)
            .map_or(false, |actual| self.comparator.compare(actual, &self.value)))
    }

    async fn count_events(
        &self,
        history: &dyn EventHistory,
        event: &Event,
    ) -> Result<i64, FilterError> {
        let window = self.since_window()?;
        let Some(subject_id) = event.subject_id() else {
            return Ok(0);
        };
        let events = history
            .find_within(&event.event_type, subject_id, window)
            .await?;
        Ok(i64::try_from(events.len()).unwrap_or(i64::MAX))
    }
}

impl Comparator {
    /// Applies the comparator to a resolved field value and the rule's operand.
    pub fn compare(&self, actual: &FieldValue, expected: &FieldValue) -> bool {
        match self {
            Comparator::Eq => actual == expected,
            Comparator::Contains => actual.to_string().contains(&expected.to_string()),
            Comparator::StartsWith => actual.to_string().starts_with(&expected.to_string()),
            Comparator::EndsWith => actual.to_string().ends_with(&expected.to_string()),
            Comparator::Gt => numeric(actual, expected).map_or(false, |(a, e)| a > e),
            Comparator::Lt => numeric(actual, expected).map_or(false, |(a, e)| a < e),
            Comparator::OneOf => match expected {
                FieldValue::List(options) => actual
                    .as_str()
                    .map_or(false, |value| options.iter().any(|option| option == value)),
                scalar => actual == scalar,
            },
            Comparator::Unknown => false,
        }
    }
}

fn numeric(actual: &FieldValue, expected: &FieldValue) -> Option<(f64, f64)> {
    Some((actual.to_float()?, expected.to_float()?))
}
