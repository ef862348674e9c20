use relay_domain::FieldMap;
use thiserror::Error;

/// Rendered in place of a field the event does not carry.
pub const NO_VALUE: &str = "<no value>";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed action at byte {0}")]
    Unclosed(usize),
    #[error("unsupported action '{0}', expected a field reference such as .player_name")]
    Unsupported(String),
}

/// Renders `template`, replacing each `{{.field}}` with the text form of
/// that field.
pub fn render_text(template: &str, values: &FieldMap) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let action_start = start + 2;
        let end = rest[action_start..]
            .find("}}")
            .ok_or(TemplateError::Unclosed(offset + start))?;
        let action = rest[action_start..action_start + end].trim();
        let field = action
            .strip_prefix('.')
            .filter(|field| !field.is_empty() && !field.contains(char::is_whitespace))
            .ok_or_else(|| TemplateError::Unsupported(action.to_string()))?;
        match values.get(field) {
            Some(value) => out.push_str(&value.to_string()),
            None => out.push_str(NO_VALUE),
        }
        let consumed = action_start + end + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Every field value in key order, space separated.
pub fn render_all_fields(values: &FieldMap) -> String {
    values
        .values()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_domain::FieldValue;

    fn values() -> FieldMap {
        let mut values = FieldMap::new();
        values.insert("murderer".to_string(), FieldValue::from("Alice"));
        values.insert("victim".to_string(), FieldValue::from("Bob"));
        values.insert("distance".to_string(), FieldValue::Decimal("120.5".to_string()));
        values
    }

    #[test]
    fn replaces_field_references() {
        let rendered = render_text("{{.murderer}} killed {{ .victim }} at {{.distance}}m", &values())
            .expect("render");
        assert_eq!(rendered, "Alice killed Bob at 120.5m");
    }

    #[test]
    fn missing_fields_render_placeholder() {
        let rendered = render_text("weapon: {{.weapon}}", &values()).expect("render");
        assert_eq!(rendered, "weapon: <no value>");
    }

    #[test]
    fn rejects_malformed_actions() {
        assert_eq!(
            render_text("hi {{.name", &values()),
            Err(TemplateError::Unclosed(3))
        );
        assert_eq!(
            render_text("{{ printf }}", &values()),
            Err(TemplateError::Unsupported("printf".to_string()))
        );
    }

    #[test]
    fn renders_all_fields_in_key_order() {
        assert_eq!(render_all_fields(&values()), "120.5 Alice Bob");
    }
}
