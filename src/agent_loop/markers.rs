//! Structured payloads smuggled through plain-text tool output.
//!
//! A tool may append `<SOURCE_DOCUMENTS>`, `<ARTIFACTS>` or `<TOOL_ARGS>`
//! followed by JSON to its output. Everything before the first marker is the
//! visible output; each payload runs until the next marker.

use crate::types::{Artifact, SourceDocument};

pub const SOURCE_DOCUMENTS_MARKER: &str = "<SOURCE_DOCUMENTS>";
pub const ARTIFACTS_MARKER: &str = "<ARTIFACTS>";
pub const TOOL_ARGS_MARKER: &str = "<TOOL_ARGS>";

const MARKERS: [&str; 3] = [SOURCE_DOCUMENTS_MARKER, ARTIFACTS_MARKER, TOOL_ARGS_MARKER];

/// Tool output split into its visible text and side-channel payloads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideChannels {
    pub output: String,
    pub source_documents: Vec<SourceDocument>,
    pub artifacts: Vec<Artifact>,
    pub tool_args: Option<serde_json::Value>,
}

/// Split `raw` at its side-channel markers.
///
/// Payloads that fail to parse are dropped with a warning; the visible output
/// is kept either way.
pub fn split_side_channels(raw: &str) -> SideChannels {
    let mut positions: Vec<(usize, &str)> = MARKERS
        .iter()
        .flat_map(|marker| raw.match_indices(*marker))
        .collect();
    if positions.is_empty() {
        return SideChannels {
            output: raw.to_string(),
            ..Default::default()
        };
    }
    positions.sort_by_key(|(at, _)| *at);

    let mut channels = SideChannels {
        output: raw[..positions[0].0].to_string(),
        ..Default::default()
    };
    for (i, (at, marker)) in positions.iter().enumerate() {
        let start = at + marker.len();
        let end = positions.get(i + 1).map_or(raw.len(), |(next, _)| *next);
        let payload = raw[start..end].trim();
        let parsed = match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(marker = *marker, error = %err, "dropping unparseable tool side channel");
                continue;
            }
        };
        match *marker {
            SOURCE_DOCUMENTS_MARKER => channels.source_documents.extend(flatten(parsed)),
            ARTIFACTS_MARKER => {
                for value in flatten(parsed) {
                    match serde_json::from_value::<Artifact>(value) {
                        Ok(artifact) => channels.artifacts.push(artifact),
                        Err(err) => {
                            tracing::warn!(error = %err, "dropping malformed artifact");
                        }
                    }
                }
            }
            _ => channels.tool_args = Some(parsed),
        }
    }
    channels
}

fn flatten(value: serde_json::Value) -> Vec<serde_json::Value> {
    match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Null => Vec::new(),
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn plain_output_passes_through() {
        let channels = split_side_channels("15C, sunny");
        assert_eq!(channels.output, "15C, sunny");
        assert!(channels.source_documents.is_empty());
        assert_eq!(channels.tool_args, None);
    }

    #[test]
    fn splits_every_marker_in_any_order() {
        let raw = format!(
            "found 1 doc{ARTIFACTS_MARKER}[{{\"type\":\"html\",\"data\":\"<b>x</b>\"}}]{SOURCE_DOCUMENTS_MARKER}[{{\"pageContent\":\"a\"}}]{TOOL_ARGS_MARKER}{{\"query\":\"q\"}}"
        );
        let channels = split_side_channels(&raw);
        assert_eq!(channels.output, "found 1 doc");
        assert_eq!(channels.source_documents, vec![json!({"pageContent": "a"})]);
        assert_eq!(
            channels.artifacts,
            vec![Artifact {
                kind: "html".into(),
                data: json!("<b>x</b>"),
            }]
        );
        assert_eq!(channels.tool_args, Some(json!({"query": "q"})));
    }

    #[test]
    fn unparseable_payload_is_dropped_and_output_kept() {
        let raw = format!("answer{SOURCE_DOCUMENTS_MARKER}not json");
        let channels = split_side_channels(&raw);
        assert_eq!(channels.output, "answer");
        assert!(channels.source_documents.is_empty());
    }

    #[test]
    fn single_document_object_is_accepted() {
        let raw = format!("x{SOURCE_DOCUMENTS_MARKER}{{\"pageContent\":\"only\"}}");
        assert_eq!(
            split_side_channels(&raw).source_documents,
            vec![json!({"pageContent": "only"})]
        );
    }
}
