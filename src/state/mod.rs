//! Per-run flow state and the post-turn state updater.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Small key/value map threaded across the nodes of one flow run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct FlowState(BTreeMap<String, String>);

impl FlowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FlowState {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One declarative state mutation from the node configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateUpdate {
    pub key: String,
    pub value: String,
}

impl StateUpdate {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Overlay `updates` on `state`, then substitute the turn output into templates.
///
/// Later updates win over earlier ones and over existing keys; untouched keys
/// are kept. Returns a new map, `state` itself is not modified.
pub fn apply(state: &FlowState, updates: &[StateUpdate], output: &str) -> FlowState {
    let mut next = state.clone();
    for update in updates {
        next.insert(update.key.clone(), update.value.clone());
    }
    substitute_output(&next, output)
}

/// Rewrite every value that references the turn output.
///
/// A value containing `{{ output }}` anywhere (spaces optional) is replaced
/// by the output itself; `{{ output.some.path }}` becomes the value at that path of the output
/// parsed as JSON, or stays unchanged when the output is not JSON or the path
/// does not resolve.
pub fn substitute_output(state: &FlowState, output: &str) -> FlowState {
    let mut next = state.clone();
    for (key, value) in state.iter() {
        if !value.contains("{{") || !value.contains("output") {
            continue;
        }
        if OUTPUT_RE.is_match(value) {
            next.insert(key.clone(), output);
            continue;
        }
        let Some(captures) = OUTPUT_PATH_RE.captures(value) else {
            continue;
        };
        let path = &captures[1];
        match resolve_path(output, path) {
            Some(resolved) => next.insert(key.clone(), resolved),
            None => {
                tracing::debug!(key = %key, path, "state template path did not resolve");
            }
        }
    }
    next
}

static OUTPUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*output\s*\}\}").expect("output placeholder regex must compile")
});

static OUTPUT_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*output\.([\w.]+)\s*\}\}").expect("output path regex must compile")
});

fn resolve_path(output: &str, path: &str) -> Option<String> {
    let parsed = parse_output(output)?;
    let mut current = &parsed;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            serde_json::Value::Object(map) => map.get(segment)?,
            serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match current {
        serde_json::Value::Null => None,
        serde_json::Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Parse the output as JSON, unwrapping a fenced ```json block first.
fn parse_output(output: &str) -> Option<serde_json::Value> {
    let trimmed = output.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn state(pairs: &[(&str, &str)]) -> FlowState {
        pairs.iter().copied().collect()
    }

    #[test]
    fn overlay_later_keys_win_and_others_survive() {
        let base = state(&[("a", "1"), ("b", "2")]);
        let next = apply(
            &base,
            &[StateUpdate::new("b", "x"), StateUpdate::new("b", "y"), StateUpdate::new("c", "3")],
            "",
        );
        assert_eq!(next, state(&[("a", "1"), ("b", "y"), ("c", "3")]));
        assert_eq!(base.get("b"), Some("2"));
    }

    #[test]
    fn exact_placeholder_takes_whole_output() {
        let next = apply(
            &FlowState::new(),
            &[StateUpdate::new("answer", "{{ output }}"), StateUpdate::new("tight", "{{output}}")],
            "Paris is sunny",
        );
        assert_eq!(next.get("answer"), Some("Paris is sunny"));
        assert_eq!(next.get("tight"), Some("Paris is sunny"));
    }

    #[test]
    fn placeholder_inside_text_takes_whole_output() {
        let next = apply(
            &FlowState::new(),
            &[StateUpdate::new("summary", "Result: {{ output }}")],
            "Paris is sunny",
        );
        assert_eq!(next.get("summary"), Some("Paris is sunny"));
    }

    #[test]
    fn path_placeholder_extracts_from_json_output() {
        let output = r#"{"city": {"name": "Paris"}, "temps": [12, 15], "ok": true}"#;
        let next = apply(
            &FlowState::new(),
            &[
                StateUpdate::new("city", "{{ output.city.name }}"),
                StateUpdate::new("second", "{{ output.temps.1 }}"),
                StateUpdate::new("flag", "{{ output.ok }}"),
                StateUpdate::new("obj", "{{ output.city }}"),
            ],
            output,
        );
        assert_eq!(next.get("city"), Some("Paris"));
        assert_eq!(next.get("second"), Some("15"));
        assert_eq!(next.get("flag"), Some("true"));
        assert_eq!(next.get("obj"), Some(r#"{"name":"Paris"}"#));
    }

    #[test]
    fn unresolved_path_keeps_template() {
        let next = apply(
            &FlowState::new(),
            &[
                StateUpdate::new("missing", "{{ output.nope }}"),
                StateUpdate::new("plain", "{{ output.city }}"),
            ],
            "not json at all",
        );
        assert_eq!(next.get("missing"), Some("{{ output.nope }}"));
        assert_eq!(next.get("plain"), Some("{{ output.city }}"));
    }

    #[test]
    fn fenced_json_output_is_unwrapped() {
        let output = "```json\n{\"score\": 9}\n```";
        let next = apply(&FlowState::new(), &[StateUpdate::new("s", "{{ output.score }}")], output);
        assert_eq!(next.get("s"), Some("9"));
    }

    #[test]
    fn existing_state_templates_are_substituted_too() {
        let base = state(&[("last", "{{ output }}"), ("keep", "static")]);
        let next = apply(&base, &[], "done");
        assert_eq!(next, state(&[("last", "done"), ("keep", "static")]));
    }
}
