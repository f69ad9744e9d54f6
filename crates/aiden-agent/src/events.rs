use aiden_proto::{channels, AgentSessionInfo, HostEvent, OutputStream};
use serde_json::{json, Value};

/// Lifecycle payload: the session snapshot plus `sessionId`.
pub(crate) fn lifecycle(channel: &str, info: &AgentSessionInfo) -> HostEvent {
    let mut payload = serde_json::to_value(info).unwrap_or_else(|_| json!({}));
    if let Some(map) = payload.as_object_mut() {
        // the snapshot already carries the full output log
        map.remove("output");
        map.insert("sessionId".to_string(), Value::String(info.id.to_string()));
    }
    HostEvent::new(channel, payload)
}

pub(crate) fn output(info: &AgentSessionInfo, stream: OutputStream, data: &str) -> HostEvent {
    HostEvent::new(
        channels::AGENT_OUTPUT,
        json!({ "sessionId": info.id, "type": stream, "data": data }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiden_proto::AgentStatus;

    fn info() -> AgentSessionInfo {
        AgentSessionInfo {
            id: uuid::Uuid::nil(),
            record_id: Some("r1".into()),
            story_id: "s1".into(),
            status: AgentStatus::Running,
            progress: 10,
            output: vec!["big".into()],
            error: None,
            pid: Some(42),
            working_directory: "/tmp".into(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn lifecycle_payload_has_session_id_and_no_output() {
        let event = lifecycle(channels::AGENT_STARTED, &info());
        assert_eq!(event.payload["sessionId"], uuid::Uuid::nil().to_string());
        assert_eq!(event.payload["status"], "running");
        assert_eq!(event.payload["recordId"], "r1");
        assert!(event.payload.get("output").is_none());
    }

    #[test]
    fn output_payload_names_the_stream() {
        let event = output(&info(), OutputStream::Stderr, "oops\n");
        assert_eq!(event.channel, channels::AGENT_OUTPUT);
        assert_eq!(event.payload["type"], "stderr");
        assert_eq!(event.payload["data"], "oops\n");
    }
}
