//! Provider-specific decoding of incremental response records.

use aiden_proto::StreamEvent;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Event(StreamEvent),
    Finished,
    Failed(String),
    /// Bookkeeping frames and anything unrecognized.
    Skip,
}

/// Anthropic messages API stream records.
pub fn anthropic(payload: &str) -> FrameOutcome {
    let Ok(record) = serde_json::from_str::<Value>(payload) else {
        return FrameOutcome::Skip;
    };
    match record.get("type").and_then(Value::as_str) {
        Some("content_block_delta") => {
            let delta = &record["delta"];
            match delta.get("type").and_then(Value::as_str) {
                Some("text_delta") => text_of(delta, "text").map_or(FrameOutcome::Skip, |t| {
                    FrameOutcome::Event(StreamEvent::text(t))
                }),
                Some("thinking_delta") => {
                    text_of(delta, "thinking").map_or(FrameOutcome::Skip, |t| {
                        FrameOutcome::Event(StreamEvent::thinking(t))
                    })
                }
                _ => FrameOutcome::Skip,
            }
        }
        Some("content_block_start") => {
            let block = &record["content_block"];
            if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                FrameOutcome::Event(StreamEvent::tool_use(block.clone()))
            } else {
                FrameOutcome::Skip
            }
        }
        Some("message_stop") => FrameOutcome::Finished,
        Some("error") => FrameOutcome::Failed(
            record["error"]["message"]
                .as_str()
                .unwrap_or("provider reported an error")
                .to_string(),
        ),
        _ => FrameOutcome::Skip,
    }
}

/// OpenAI chat-completions stream chunks. `[DONE]` is handled by the line
/// decoder before this is called.
pub fn openai(payload: &str) -> FrameOutcome {
    let Ok(record) = serde_json::from_str::<Value>(payload) else {
        return FrameOutcome::Skip;
    };
    if let Some(message) = record["error"]["message"].as_str() {
        return FrameOutcome::Failed(message.to_string());
    }
    match record["choices"][0]["delta"]["content"].as_str() {
        Some(text) if !text.is_empty() => FrameOutcome::Event(StreamEvent::text(text)),
        _ => FrameOutcome::Skip,
    }
}

fn text_of<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
}
