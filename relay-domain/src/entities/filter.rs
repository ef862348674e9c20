// Filter entity
// Declarative predicate deciding whether and how an event is relayed

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value_objects::FieldValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Comparator {
    Eq,
    Gt,
    Lt,
    Contains,
    StartsWith,
    EndsWith,
    OneOf,
    /// Any comparator name this build does not know. Never matches.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub comparator: Comparator,
    pub field: String,
    pub value: FieldValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
}

impl Rule {
    pub fn new(comparator: Comparator, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            comparator,
            field: field.into(),
            value: value.into(),
            since: None,
        }
    }

    pub fn since(mut self, since: impl Into<String>) -> Self {
        self.since = Some(since.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatType {
    #[default]
    Rich,
    Text,
}

/// Formatting directives handed to the notification target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Format {
    #[serde(rename = "type", default)]
    pub format_type: FormatType,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

impl Format {
    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub event: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Format>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Filter {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            rules: Vec::new(),
            format: None,
            message: None,
            color: None,
        }
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn format_type(&self) -> FormatType {
        self.format
            .as_ref()
            .map(|format| format.format_type)
            .unwrap_or_default()
    }

    /// Folds the legacy top-level `message`/`color` keys into a rich format
    /// block when no explicit format is configured.
    pub fn normalize_legacy_format(&mut self) {
        let message = self.message.take().filter(|value| !value.trim().is_empty());
        let color = self.color.take().filter(|value| !value.trim().is_empty());
        if self.format.is_some() || (message.is_none() && color.is_none()) {
            return;
        }
        let mut parameters = BTreeMap::new();
        if let Some(message) = message {
            parameters.insert("message".to_string(), Value::String(message));
        }
        if let Some(color) = color {
            parameters.insert("color".to_string(), Value::String(color));
        }
        self.format = Some(Format {
            format_type: FormatType::Rich,
            parameters,
        });
    }
}

/// Ordered set of filters evaluated against every incoming event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterList(Vec<Filter>);

impl FilterList {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self(filters)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Filter> {
        self.0.iter()
    }

    pub fn extend(&mut self, filters: impl IntoIterator<Item = Filter>) {
        self.0.extend(filters);
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Filter> {
        self.0.iter_mut()
    }
}

impl From<Vec<Filter>> for FilterList {
    fn from(filters: Vec<Filter>) -> Self {
        Self(filters)
    }
}
