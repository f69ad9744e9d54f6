use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::StreamEvent;

pub mod channels {
    pub const AGENT_CREATED: &str = "agent:created";
    pub const AGENT_STARTED: &str = "agent:started";
    pub const AGENT_RESUMED: &str = "agent:resumed";
    pub const AGENT_OUTPUT: &str = "agent:output";
    pub const AGENT_PAUSED: &str = "agent:paused";
    pub const AGENT_COMPLETED: &str = "agent:completed";
    pub const AGENT_FAILED: &str = "agent:failed";
    pub const AGENT_CANCELLED: &str = "agent:cancelled";

    pub const TERMINAL_STARTED: &str = "terminal:started";
    pub const TERMINAL_OUTPUT: &str = "terminal:output";
    pub const TERMINAL_CLOSED: &str = "terminal:closed";
    pub const TERMINAL_ERROR: &str = "terminal:error";

    pub const STREAM_DATA: &str = "stream:data";
    pub const STREAM_DONE: &str = "stream:done";
    pub const STREAM_ERROR: &str = "stream:error";

    pub const ALL: &[&str] = &[
        AGENT_CREATED,
        AGENT_STARTED,
        AGENT_RESUMED,
        AGENT_OUTPUT,
        AGENT_PAUSED,
        AGENT_COMPLETED,
        AGENT_FAILED,
        AGENT_CANCELLED,
        TERMINAL_STARTED,
        TERMINAL_OUTPUT,
        TERMINAL_CLOSED,
        TERMINAL_ERROR,
        STREAM_DATA,
        STREAM_DONE,
        STREAM_ERROR,
    ];

    pub fn is_known(channel: &str) -> bool {
        ALL.contains(&channel)
    }
}

/// A named event pushed by the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostEvent {
    pub channel: String,
    pub payload: Value,
}

impl HostEvent {
    pub fn new(channel: &str, payload: Value) -> Self {
        Self {
            channel: channel.to_string(),
            payload,
        }
    }
}

/// What a stream listener receives: zero or more `Data`, then exactly one
/// `Done` or `Error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamSignal {
    Data { event: StreamEvent },
    Done,
    Error { message: String },
}

impl StreamSignal {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamSignal::Data { .. })
    }

    /// Host-bus form: `stream:data {streamId, type, content, data}`,
    /// `stream:done {streamId}`, `stream:error {streamId, error}`.
    pub fn to_host_event(&self, stream_id: &str) -> HostEvent {
        match self {
            StreamSignal::Data { event } => {
                let mut payload = serde_json::to_value(event).unwrap_or_else(|_| json!({}));
                if let Some(map) = payload.as_object_mut() {
                    map.insert("streamId".to_string(), Value::String(stream_id.to_string()));
                }
                HostEvent::new(channels::STREAM_DATA, payload)
            }
            StreamSignal::Done => {
                HostEvent::new(channels::STREAM_DONE, json!({ "streamId": stream_id }))
            }
            StreamSignal::Error { message } => HostEvent::new(
                channels::STREAM_ERROR,
                json!({ "streamId": stream_id, "error": message }),
            ),
        }
    }

    /// Inverse of [`StreamSignal::to_host_event`]; `None` for other channels
    /// or malformed payloads.
    pub fn from_host_event(event: &HostEvent) -> Option<(String, StreamSignal)> {
        let stream_id = event.payload.get("streamId")?.as_str()?.to_string();
        let signal = match event.channel.as_str() {
            channels::STREAM_DATA => {
                let mut payload = event.payload.clone();
                if let Some(map) = payload.as_object_mut() {
                    map.remove("streamId");
                }
                StreamSignal::Data {
                    event: serde_json::from_value(payload).ok()?,
                }
            }
            channels::STREAM_DONE => StreamSignal::Done,
            channels::STREAM_ERROR => StreamSignal::Error {
                message: event
                    .payload
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("stream failed")
                    .to_string(),
            },
            _ => return None,
        };
        Some((stream_id, signal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_signal_flattens_event_into_host_payload() {
        let event = StreamSignal::Data {
            event: StreamEvent::text("hello"),
        }
        .to_host_event("s-1");
        assert_eq!(event.channel, channels::STREAM_DATA);
        assert_eq!(
            event.payload,
            json!({"streamId": "s-1", "type": "text", "content": "hello"})
        );
    }

    #[test]
    fn host_event_converts_back_to_signal() {
        let signal = StreamSignal::Error {
            message: "boom".into(),
        };
        let (id, parsed) = StreamSignal::from_host_event(&signal.to_host_event("s-2")).unwrap();
        assert_eq!(id, "s-2");
        assert_eq!(parsed, signal);
    }

    #[test]
    fn non_stream_channel_is_not_a_signal() {
        let event = HostEvent::new(channels::AGENT_OUTPUT, json!({"streamId": "x"}));
        assert!(StreamSignal::from_host_event(&event).is_none());
    }

    #[test]
    fn signal_wire_form_is_tagged() {
        let json = serde_json::to_value(StreamSignal::Done).unwrap();
        assert_eq!(json, json!({"type": "done"}));
        assert!(StreamSignal::Done.is_terminal());
    }

    #[test]
    fn every_channel_is_known() {
        assert!(channels::is_known("agent:resumed"));
        assert!(!channels::is_known("agent:exploded"));
    }
}
