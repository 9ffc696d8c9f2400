//! Conditional-visibility expressions on structured fields.
//!
//! Grammar, loosest binding first: `a || b`, `a && b`, then one of
//! `field == value`, `field != value`, `field contains value`. Values may be
//! bare or wrapped in single or double quotes. Anything that does not parse
//! evaluates to visible.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::FieldValue;

/// `field contains value`
#[allow(clippy::expect_used, reason = "literal pattern, checked by tests")]
static CONTAINS: LazyLock<Regex> =
    LazyLock::new(|| return Regex::new(r"^(\w[\w.-]*)\s+contains\s+(.+)$").expect("valid contains regex"));

/// `field == value`
#[allow(clippy::expect_used, reason = "literal pattern, checked by tests")]
static EQUALS: LazyLock<Regex> =
    LazyLock::new(|| return Regex::new(r"^(\w[\w.-]*)\s*==\s*(.+)$").expect("valid equals regex"));

/// `field != value`
#[allow(clippy::expect_used, reason = "literal pattern, checked by tests")]
static NOT_EQUALS: LazyLock<Regex> =
    LazyLock::new(|| return Regex::new(r"^(\w[\w.-]*)\s*!=\s*(.+)$").expect("valid not-equals regex"));

/// Evaluate one comparison with no `&&`/`||` left in it.
fn evaluate_comparison(expression: &str, responses: &BTreeMap<String, FieldValue>) -> bool {
    if let Some(cap) = CONTAINS.captures(expression)
        && let (Some(field), Some(target)) = (cap.get(1), cap.get(2))
    {
        let target = unquote(target.as_str());
        return match responses.get(field.as_str()) {
            Some(FieldValue::List(items)) => items.iter().any(|item| return item == target),
            Some(other) => other.comparison_text().contains(target),
            None => target.is_empty(),
        };
    }

    if let Some(cap) = NOT_EQUALS.captures(expression)
        && let (Some(field), Some(target)) = (cap.get(1), cap.get(2))
    {
        return field_text(responses, field.as_str()) != unquote(target.as_str());
    }

    if let Some(cap) = EQUALS.captures(expression)
        && let (Some(field), Some(target)) = (cap.get(1), cap.get(2))
    {
        return field_text(responses, field.as_str()) == unquote(target.as_str());
    }

    tracing::debug!(expression, "unparseable visibility expression, showing field");
    return true;
}

/// Whether a field guarded by `expression` should be shown.
/// Empty or whitespace-only expressions are always visible.
pub fn evaluate_show_if(expression: &str, responses: &BTreeMap<String, FieldValue>) -> bool {
    let expression = expression.trim();
    if expression.is_empty() {
        return true;
    }

    if expression.contains("||") {
        return expression.split("||").any(|part| return evaluate_show_if(part, responses));
    }

    if expression.contains("&&") {
        return expression.split("&&").all(|part| return evaluate_show_if(part, responses));
    }

    return evaluate_comparison(expression, responses);
}

/// Stringified answer for a field; unanswered fields compare as "".
fn field_text(responses: &BTreeMap<String, FieldValue>, field: &str) -> String {
    return responses.get(field).map(FieldValue::comparison_text).unwrap_or_default();
}

/// Strip one layer of matching single or double quotes.
fn unquote(value: &str) -> &str {
    let trimmed = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed.strip_prefix(quote).and_then(|rest| return rest.strip_suffix(quote)) {
            return inner;
        }
    }
    return trimmed;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn responses(pairs: &[(&str, FieldValue)]) -> BTreeMap<String, FieldValue> {
        return pairs.iter().map(|(k, v)| return ((*k).to_string(), v.clone())).collect();
    }

    fn text(value: &str) -> FieldValue {
        return FieldValue::Text(value.to_string());
    }

    #[test]
    fn equals_and_not_equals() {
        let r = responses(&[("fever", text("yes"))]);
        assert!(evaluate_show_if("fever == yes", &r));
        assert!(!evaluate_show_if("fever == no", &r));
        assert!(evaluate_show_if("fever != no", &r));
        assert!(!evaluate_show_if("fever != yes", &r));
    }

    #[test]
    fn quoted_values_are_unwrapped() {
        let r = responses(&[("site", text("left ear"))]);
        assert!(evaluate_show_if("site == 'left ear'", &r));
        assert!(evaluate_show_if("site == \"left ear\"", &r));
    }

    #[test]
    fn contains_checks_list_membership() {
        let r = responses(&[(
            "symptoms",
            FieldValue::List(vec!["dysuria".to_string(), "frequency".to_string()]),
        )]);
        assert!(evaluate_show_if("symptoms contains dysuria", &r));
        assert!(!evaluate_show_if("symptoms contains dys", &r));
    }

    #[test]
    fn contains_on_text_is_substring() {
        let r = responses(&[("notes", text("severe headache"))]);
        assert!(evaluate_show_if("notes contains head", &r));
    }

    #[test]
    fn or_binds_looser_than_and() {
        let r = responses(&[("a", text("1")), ("b", text("2")), ("c", text("3"))]);
        assert!(evaluate_show_if("a == 9 && b == 2 || c == 3", &r));
        assert!(!evaluate_show_if("a == 9 || b == 2 && c == 9", &r));
        assert!(evaluate_show_if("duration != acute && a == 1", &r));
    }

    #[test]
    fn missing_field_compares_as_empty() {
        let r = responses(&[]);
        assert!(!evaluate_show_if("fever == yes", &r));
        assert!(evaluate_show_if("fever != yes", &r));
    }

    #[test]
    fn empty_and_unparseable_are_visible() {
        let r = responses(&[]);
        assert!(evaluate_show_if("", &r));
        assert!(evaluate_show_if("   ", &r));
        assert!(evaluate_show_if("fever is high", &r));
    }
}
