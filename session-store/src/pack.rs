//! Graph-state packing: plain → pruned → compressed → minimal.
//!
//! Tier selection is purely a function of serialized size; the chosen tier is
//! self-describing inside the payload so `unpack_graph_state` needs no side
//! channel.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde_json::{Map, Value, json};
use std::io::{Read, Write};
use tracing::warn;

/// Packed payloads above this size degrade to the next tier.
pub const MAX_GRAPH_STATE_BYTES: usize = 5 * 1024 * 1024;

/// Transcript-ish keys dropped by the pruning tier.
const PRUNE_KEYS: [&str; 7] = [
    "messages",
    "raw_messages",
    "llm_messages",
    "tool_messages",
    "trace",
    "logs",
    "debug",
];

fn json_size(value: &Value) -> usize {
    serde_json::to_vec(value).map(|v| v.len()).unwrap_or(usize::MAX)
}

fn prune(state: &Map<String, Value>) -> Map<String, Value> {
    let mut pruned = state.clone();
    for key in PRUNE_KEYS {
        pruned.remove(key);
    }
    // The ReAct transcript is the usual size offender.
    pruned.remove("agent_messages");
    pruned
}

fn gzip_base64(raw: &[u8]) -> Option<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw).ok()?;
    let compressed = encoder.finish().ok()?;
    Some(BASE64.encode(compressed))
}

fn minimal_skeleton(state: &Map<String, Value>) -> Value {
    let field = |key: &str| state.get(key).cloned().unwrap_or(Value::Null);
    json!({
        "__compressed__": false,
        "__truncated__": true,
        "error": "graph_state too large",
        "task_id": state.get("task_id").cloned().unwrap_or(Value::String(String::new())),
        "current_clause_id": field("current_clause_id"),
        "current_clause_index": state.get("current_clause_index").cloned().unwrap_or(json!(0)),
        "is_complete": state.get("is_complete").cloned().unwrap_or(json!(false)),
        "review_checklist": state.get("review_checklist").cloned().unwrap_or(json!([])),
        "documents": state.get("documents").cloned().unwrap_or(json!([])),
        "pending_diffs": state.get("pending_diffs").cloned().unwrap_or(json!([])),
        "user_decisions": state.get("user_decisions").cloned().unwrap_or(json!({})),
    })
}

/// Packs a graph-state object for persistence.
pub fn pack_graph_state(graph_state: &Value) -> Value {
    let Some(state) = graph_state.as_object() else {
        return graph_state.clone();
    };

    if json_size(graph_state) <= MAX_GRAPH_STATE_BYTES {
        return graph_state.clone();
    }

    let pruned = prune(state);
    let pruned_value = Value::Object(pruned);
    let pruned_raw = serde_json::to_vec(&pruned_value).unwrap_or_default();
    if pruned_raw.len() <= MAX_GRAPH_STATE_BYTES {
        return pruned_value;
    }

    if let Some(payload) = gzip_base64(&pruned_raw) {
        let compressed = json!({
            "__compressed__": true,
            "encoding": "gzip+base64",
            "payload": payload,
        });
        if json_size(&compressed) <= MAX_GRAPH_STATE_BYTES {
            return compressed;
        }
    }

    minimal_skeleton(state)
}

/// Unpacks a persisted graph state. Compressed payloads are inflated;
/// truncated skeletons pass through unchanged (callers must tolerate the
/// missing fields); anything undecodable yields an empty object.
pub fn unpack_graph_state(graph_state: &Value) -> Value {
    let Some(obj) = graph_state.as_object() else {
        return json!({});
    };
    if !obj.get("__compressed__").and_then(Value::as_bool).unwrap_or(false) {
        return graph_state.clone();
    }
    if obj.get("encoding").and_then(Value::as_str) != Some("gzip+base64") {
        return json!({});
    }
    let Some(payload) = obj.get("payload").and_then(Value::as_str) else {
        return json!({});
    };

    let decoded = match BASE64.decode(payload) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(%err, "failed to decode packed graph state");
            return json!({});
        }
    };
    let mut inflated = Vec::new();
    if let Err(err) = GzDecoder::new(decoded.as_slice()).read_to_end(&mut inflated) {
        warn!(%err, "failed to inflate packed graph state");
        return json!({});
    }
    match serde_json::from_slice::<Value>(&inflated) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(_) | Err(_) => json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn small_state_round_trips_unchanged() {
        let state = json!({"task_id": "t1", "current_clause_index": 3});
        let packed = pack_graph_state(&state);
        assert_eq!(packed, state);
        assert_eq!(unpack_graph_state(&packed), state);
    }

    #[test]
    fn compressed_payload_round_trips() {
        // Force the compression tier by hand-building the envelope.
        let state = json!({"task_id": "t1", "pending_diffs": [{"diff_id": "d1"}]});
        let raw = serde_json::to_vec(&state).unwrap();
        let envelope = json!({
            "__compressed__": true,
            "encoding": "gzip+base64",
            "payload": gzip_base64(&raw).unwrap(),
        });
        assert_eq!(unpack_graph_state(&envelope), state);
    }

    #[test]
    fn truncated_skeleton_passes_through() {
        let skeleton = minimal_skeleton(
            json!({"task_id": "t1", "user_decisions": {"d": "approve"}})
                .as_object()
                .unwrap(),
        );
        let unpacked = unpack_graph_state(&skeleton);
        assert_eq!(unpacked["__truncated__"], true);
        assert_eq!(unpacked["task_id"], "t1");
        assert_eq!(unpacked["user_decisions"]["d"], "approve");
    }

    #[test]
    fn unknown_encoding_degrades_to_empty() {
        let envelope = json!({"__compressed__": true, "encoding": "zstd", "payload": "xx"});
        assert_eq!(unpack_graph_state(&envelope), json!({}));
    }

    #[test]
    fn skeleton_preserves_resume_slots() {
        let state = json!({
            "task_id": "t1",
            "current_clause_id": "14.2",
            "current_clause_index": 2,
            "is_complete": false,
            "review_checklist": [{"clause_id": "14.2"}],
            "pending_diffs": [{"diff_id": "d1"}],
            "user_decisions": {"d1": "approve"},
            "agent_messages": ["x"],
        });
        let skeleton = minimal_skeleton(state.as_object().unwrap());
        for key in [
            "task_id",
            "current_clause_id",
            "current_clause_index",
            "is_complete",
            "review_checklist",
            "pending_diffs",
            "user_decisions",
        ] {
            assert_eq!(skeleton[key], state[key], "missing {key}");
        }
    }
}
