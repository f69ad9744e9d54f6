#![allow(dead_code)]

use aiden_ai::{CredentialSource, StaticCredentials};
use aiden_config::AppConfig;
use aiden_host::Host;
use aiden_store::Store;
use aiden_transport::{StreamHandlers, Streaming};
use axum::body::{Body, Bytes};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::time::{timeout, Duration};

pub const ANTHROPIC_STREAM: &str = concat!(
    "event: message_start\n",
    "data: {\"type\":\"message_start\",\"message\":{}}\n\n",
    "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
    "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\n",
    "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"!\"}}\n\n",
    "data: {\"type\":\"message_stop\"}\n\n",
);

async fn anthropic(Json(_body): Json<Value>) -> Response {
    ([(header::CONTENT_TYPE, "text/event-stream")], Body::from(ANTHROPIC_STREAM)).into_response()
}

/// One delta, then nothing for two seconds, then the rest.
async fn slow(Json(_body): Json<Value>) -> Response {
    let chunks = futures::stream::unfold(0u8, |step| async move {
        match step {
            0 => Some((
                Ok::<_, std::io::Error>(Bytes::from_static(
                    b"data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"first\"}}\n\n",
                )),
                1,
            )),
            1 => {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Some((
                    Ok(Bytes::from_static(
                        b"data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"late\"}}\n\ndata: {\"type\":\"message_stop\"}\n\n",
                    )),
                    2,
                ))
            }
            _ => None,
        }
    });
    ([(header::CONTENT_TYPE, "text/event-stream")], Body::from_stream(chunks)).into_response()
}

pub async fn slow_provider() -> String {
    serve(Router::new().route("/v1/messages", post(slow))).await
}

/// Serves the Anthropic streaming fixture at `/v1/messages`; returns the base URL.
pub async fn fake_provider() -> String {
    let app = Router::new().route("/v1/messages", post(anthropic));
    serve(app).await
}

pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Terminals disabled, `echo` standing in for the agent CLI.
pub fn config(provider_url: Option<&str>) -> AppConfig {
    let mut config = AppConfig::default();
    config.terminal.enabled = false;
    config.agent.program = "echo".to_string();
    if let Some(url) = provider_url {
        config.ai.anthropic_base_url = url.to_string();
        config.ai.openai_base_url = url.to_string();
    }
    config
}

pub fn keys() -> StaticCredentials {
    StaticCredentials {
        provider: None,
        anthropic_key: Some("sk-ant-test".into()),
        openai_key: None,
    }
}

pub fn host(provider_url: Option<&str>, credentials: StaticCredentials) -> Host {
    let store = Arc::new(Store::in_memory().unwrap());
    let credentials: Arc<dyn CredentialSource> = Arc::new(credentials);
    Host::with_credentials(&config(provider_url), store, credentials)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Seen {
    Data(String),
    Done,
    Error(String),
}

/// Subscribe to `stream_id` and collect until done or error.
pub async fn drain<T: Streaming + ?Sized>(transport: &T, stream_id: &str) -> Vec<Seen> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (end_tx, end_rx) = oneshot::channel::<()>();
    let end_tx = Arc::new(Mutex::new(Some(end_tx)));
    let finish = move || {
        if let Some(tx) = end_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
    };
    let finish_err = finish.clone();
    let (a, b, c) = (seen.clone(), seen.clone(), seen.clone());
    let _sub = transport.subscribe_stream(
        stream_id,
        StreamHandlers::new()
            .on_data(move |e| {
                a.lock()
                    .unwrap()
                    .push(Seen::Data(e.content.clone().unwrap_or_default()))
            })
            .on_done(move || {
                b.lock().unwrap().push(Seen::Done);
                finish();
            })
            .on_error(move |m| {
                c.lock().unwrap().push(Seen::Error(m.to_string()));
                finish_err();
            }),
    );
    timeout(Duration::from_secs(5), end_rx).await.unwrap().unwrap();
    let out = seen.lock().unwrap().clone();
    out
}

pub fn hello_payload() -> Value {
    serde_json::json!({ "messages": [{"role": "user", "content": "hello"}] })
}
