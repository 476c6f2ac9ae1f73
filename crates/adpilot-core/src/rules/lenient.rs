//! Tolerant readers for values that arrive from hand-edited JSON documents.

use serde_json::Value;

/// Reads a number that may have been stored as a JSON number or a string.
///
/// Currency symbols, thousands separators, and percent signs are stripped
/// before parsing. Returns `None` for anything that still does not parse.
#[must_use]
pub fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => number_str(s),
        _ => None,
    }
}

/// String form of [`number`].
#[must_use]
pub fn number_str(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '%'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Reads an id list that may be a JSON array or a comma/newline-delimited string.
#[must_use]
pub fn id_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(scalar_to_string)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .replace('\n', ",")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect(),
        Some(Value::Number(n)) => vec![n.to_string()],
        _ => Vec::new(),
    }
}

/// Reads a keyword list: a JSON array, or a single string taken as one keyword.
#[must_use]
pub fn keyword_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(scalar_to_string)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Reads a boolean that may be stored as `true`, `"true"`, or `1`.
#[must_use]
pub fn flag(value: Option<&Value>, default: bool) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => default,
        },
        Some(Value::Number(n)) => n.as_f64().map_or(default, |v| v.abs() > f64::EPSILON),
        _ => default,
    }
}

pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn number_strips_currency_and_separators() {
        assert_eq!(number(&json!("$1,234.50")), Some(1234.5));
        assert_eq!(number(&json!("2.5%")), Some(2.5));
        assert_eq!(number(&json!(40)), Some(40.0));
    }

    #[test]
    fn number_rejects_garbage() {
        assert_eq!(number(&json!("abc")), None);
        assert_eq!(number(&json!("")), None);
        assert_eq!(number(&json!(null)), None);
        assert_eq!(number(&json!([1])), None);
    }

    #[test]
    fn id_list_accepts_delimited_string() {
        let ids = id_list(Some(&json!("1, 2\n3,,")));
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn id_list_accepts_mixed_array() {
        let ids = id_list(Some(&json!(["10", 20, " 30 "])));
        assert_eq!(ids, vec!["10", "20", "30"]);
    }

    #[test]
    fn keyword_list_keeps_commas_inside_single_string() {
        let kws = keyword_list(Some(&json!("Summer, Sale")));
        assert_eq!(kws, vec!["Summer, Sale"]);
    }

    #[test]
    fn flag_reads_common_spellings() {
        assert!(flag(Some(&json!("true")), false));
        assert!(!flag(Some(&json!(0)), true));
        assert!(flag(None, true));
    }
}
