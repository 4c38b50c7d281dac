use axm_events::{summarize, RunSequence};
use axm_types::{invariants::check_event_order, EventId, EventPayload, EventType, RunEvent, RunId};
use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;

#[test]
fn test_incomplete_capture_stats() {
    let batch = vec![
        EventPayload::ToolCall {
            tool_name: String::new(),
            input: json!({"cmd": "ls"}).as_object().cloned().unwrap(),
        },
        EventPayload::ToolCall {
            tool_name: "read_file".into(),
            input: serde_json::Map::new(),
        },
        EventPayload::message("assistant", ""),
        EventPayload::Cost {
            input_tokens: 0,
            output_tokens: 0,
            model: "sonnet".into(),
            cost_estimate: 0.0,
        },
    ];

    let stats = summarize(&batch);

    assert_eq!(stats.total_events, 4);
    assert_eq!(stats.empty_tool_names, 1);
    assert_eq!(stats.empty_inputs, 1);
    assert_eq!(stats.empty_messages, 1);
    assert_eq!(stats.zero_token_costs, 1);
    assert_eq!(stats.warning_count, 4);
    assert_eq!(stats.by_type[&EventType::ToolCall], 2);
    assert_eq!(stats.by_type[&EventType::Metric], 1);
}

#[test]
fn test_clean_batch_has_no_warnings() {
    let batch = vec![
        EventPayload::log("info", "starting"),
        EventPayload::message("user", "hi"),
        EventPayload::status(
            axm_types::RunStatus::Starting,
            axm_types::RunStatus::Running,
            "",
        ),
    ];
    let stats = summarize(&batch);
    assert_eq!(stats.warning_count, 0);
    assert_eq!(stats.total_events, 3);
}

#[test]
fn test_stats_serialize_camel_case() {
    let stats = summarize(&[EventPayload::message("", "x")]);
    let value = serde_json::to_value(&stats).unwrap();
    assert_eq!(value["emptyMessages"], 1);
    assert_eq!(value["byType"]["message"], 1);
}

proptest! {
    #[test]
    fn prop_sequenced_events_are_ordered(offsets in prop::collection::vec(-5_000i64..5_000, 1..40)) {
        let run_id = RunId::new_v4();
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut seq = RunSequence::new();

        let events: Vec<RunEvent> = offsets
            .iter()
            .map(|ms| {
                let (sequence, ts) = seq.advance(base + Duration::milliseconds(*ms));
                RunEvent::new(EventId::new_v4(), run_id, sequence, ts, EventPayload::log("debug", "tick"))
            })
            .collect();

        prop_assert!(check_event_order(&events).is_ok());

        let resumed = RunSequence::resume(events.last());
        prop_assert_eq!(resumed.last_sequence(), events.len() as u64);
    }
}
