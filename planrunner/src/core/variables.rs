//! `$` parameter capture and substitution.
//!
//! A parameter key prefixed with `$` is not passed to the handler; it stores
//! its value in the execution state under the key without the prefix. A
//! `null` value asks for the step's output instead, captured once the step
//! succeeds. String parameters reference stored variables as `$name` (whole
//! value, keeps the JSON type) or `${name}` (spliced into text).

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::core::types::Parameters;

static WHOLE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$([A-Za-z_][A-Za-z0-9_]*)$").expect("valid regex"));
static INLINE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

/// Parameters split into handler input and state captures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedParameters {
    /// Parameters to dispatch, with references substituted.
    pub dispatch: Parameters,
    /// Variables to store immediately.
    pub captured: Map<String, Value>,
    /// Variables that receive the step output on success.
    pub output_captures: Vec<String>,
}

/// Split `$` keys out of `parameters` and substitute references from `variables`.
///
/// Captured values are substituted too, so `{"$path": "${dir}/out.txt"}` stores the
/// expanded path.
pub fn prepare_parameters(
    parameters: &Parameters,
    variables: &Map<String, Value>,
) -> PreparedParameters {
    let mut prepared = PreparedParameters::default();
    for (key, value) in parameters {
        match key.strip_prefix('$') {
            Some(name) if !name.is_empty() => {
                if value.is_null() {
                    prepared.output_captures.push(name.to_string());
                } else {
                    prepared
                        .captured
                        .insert(name.to_string(), substitute(value, variables));
                }
            }
            _ => {
                prepared
                    .dispatch
                    .insert(key.clone(), substitute(value, variables));
            }
        }
    }
    prepared
}

/// Recursively replace variable references in `value`. Unknown names are left as written.
pub fn substitute(value: &Value, variables: &Map<String, Value>) -> Value {
    match value {
        Value::String(text) => substitute_str(text, variables),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute(item, variables))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), substitute(item, variables)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn substitute_str(text: &str, variables: &Map<String, Value>) -> Value {
    if let Some(found) = WHOLE_REF
        .captures(text)
        .and_then(|caps| variables.get(&caps[1]))
    {
        return found.clone();
    }
    let replaced = INLINE_REF.replace_all(text, |caps: &Captures<'_>| {
        match variables.get(&caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => caps[0].to_string(),
        }
    });
    Value::String(replaced.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn dollar_keys_are_captured_not_dispatched() {
        let params = map(json!({"$file_path": "notes.txt", "content": "hi"}));
        let prepared = prepare_parameters(&params, &Map::new());

        assert_eq!(prepared.dispatch, map(json!({"content": "hi"})));
        assert_eq!(prepared.captured, map(json!({"file_path": "notes.txt"})));
        assert!(prepared.output_captures.is_empty());
    }

    #[test]
    fn null_capture_waits_for_output() {
        let params = map(json!({"filename": "a.txt", "$contents": null}));
        let prepared = prepare_parameters(&params, &Map::new());
        assert_eq!(prepared.output_captures, vec!["contents".to_string()]);
        assert!(prepared.captured.is_empty());
    }

    #[test]
    fn whole_reference_keeps_json_type() {
        let vars = map(json!({"count": 3, "file_path": "notes.txt"}));
        let params = map(json!({"filename": "$file_path", "n": "$count"}));
        let prepared = prepare_parameters(&params, &vars);
        assert_eq!(
            prepared.dispatch,
            map(json!({"filename": "notes.txt", "n": 3}))
        );
    }

    #[test]
    fn inline_reference_splices_text() {
        let vars = map(json!({"dir": "out", "n": 2}));
        let value = substitute(&json!({"cmd": ["ls ${dir}", "echo ${n} ${missing}"]}), &vars);
        assert_eq!(value, json!({"cmd": ["ls out", "echo 2 ${missing}"]}));
    }

    #[test]
    fn unknown_whole_reference_is_literal() {
        let value = substitute(&json!("$HOME"), &Map::new());
        assert_eq!(value, json!("$HOME"));
    }

    #[test]
    fn lone_dollar_key_is_dispatched() {
        let params = map(json!({"$": "x"}));
        let prepared = prepare_parameters(&params, &Map::new());
        assert_eq!(prepared.dispatch, map(json!({"$": "x"})));
    }
}
