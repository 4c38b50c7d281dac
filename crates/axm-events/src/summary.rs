//! Folding a run's events into a [`RunSummary`]

use crate::validate::validate_payload;
use axm_types::{ArtifactKind, EventPayload, RunEvent, RunSummary};
use std::collections::BTreeSet;

/// Summary statistics over an ordered event list
///
/// File counts are distinct paths per artifact kind. Duration spans the
/// first to the last event.
#[must_use]
pub fn summarize_run(events: &[RunEvent]) -> RunSummary {
    let mut summary = RunSummary::default();
    let mut modified = BTreeSet::new();
    let mut created = BTreeSet::new();
    let mut deleted = BTreeSet::new();

    for event in events {
        summary.total_events += 1;
        *summary.events_by_type.entry(event.event_type).or_default() += 1;
        summary.warning_count += validate_payload(&event.data).len() as u64;

        match &event.data {
            EventPayload::ToolCall { .. } => summary.tool_calls += 1,
            EventPayload::ToolResult { success: false, .. } => summary.tool_errors += 1,
            EventPayload::Cost {
                input_tokens,
                output_tokens,
                cost_estimate,
                ..
            } => {
                summary.input_tokens += input_tokens;
                summary.output_tokens += output_tokens;
                summary.cost_estimate += cost_estimate;
            }
            EventPayload::Artifact { path, kind, .. } => match kind {
                ArtifactKind::FileModified => {
                    modified.insert(path.as_str());
                }
                ArtifactKind::FileCreated => {
                    created.insert(path.as_str());
                }
                ArtifactKind::FileDeleted => {
                    deleted.insert(path.as_str());
                }
                ArtifactKind::Diff | ArtifactKind::Log | ArtifactKind::Other => {}
            },
            _ => {}
        }
    }

    summary.files_modified = modified.len() as u64;
    summary.files_created = created.len() as u64;
    summary.files_deleted = deleted.len() as u64;
    if let (Some(first), Some(last)) = (events.first(), events.last()) {
        let millis = (last.timestamp - first.timestamp).num_milliseconds();
        summary.duration_ms = Some(u64::try_from(millis).unwrap_or(0));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use axm_types::{EventId, EventType, RunId};
    use chrono::{Duration, Utc};

    #[test]
    fn folds_files_tokens_and_tools() {
        let run_id = RunId::new_v4();
        let t0 = Utc::now();
        let payloads = vec![
            EventPayload::ToolCall {
                tool_name: "edit".into(),
                input: serde_json::Map::new(),
            },
            EventPayload::ToolResult {
                tool_name: "edit".into(),
                output: None,
                error: Some("conflict".into()),
                success: false,
            },
            EventPayload::artifact("a.rs", ArtifactKind::FileModified, 10),
            EventPayload::artifact("a.rs", ArtifactKind::FileModified, 12),
            EventPayload::artifact("b.rs", ArtifactKind::FileCreated, 4),
            EventPayload::Cost {
                input_tokens: 100,
                output_tokens: 40,
                model: "m".into(),
                cost_estimate: 0.5,
            },
        ];
        let events: Vec<RunEvent> = payloads
            .into_iter()
            .enumerate()
            .map(|(i, p)| {
                RunEvent::new(EventId::new_v4(), run_id, i as u64 + 1, t0 + Duration::seconds(i as i64), p)
            })
            .collect();

        let summary = summarize_run(&events);

        assert_eq!(summary.total_events, 6);
        assert_eq!(summary.tool_calls, 1);
        assert_eq!(summary.tool_errors, 1);
        assert_eq!(summary.files_modified, 1);
        assert_eq!(summary.files_created, 1);
        assert_eq!(summary.files_deleted, 0);
        assert_eq!(summary.input_tokens, 100);
        assert_eq!(summary.output_tokens, 40);
        assert_eq!(summary.events_by_type[&EventType::Artifact], 3);
        // the tool call had an empty input map
        assert_eq!(summary.warning_count, 1);
        assert_eq!(summary.duration_ms, Some(5_000));
        assert_eq!(summary.files_changed(), 2);
    }

    #[test]
    fn empty_run_has_no_duration() {
        assert_eq!(summarize_run(&[]).duration_ms, None);
    }
}
