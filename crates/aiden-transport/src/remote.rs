use crate::capability::{
    Agents, Ai, Auth, DataAccess, Events, Filesystem, Git, Invoke, Memory, SourceHosting,
    Streaming, Terminals, Transport,
};
use crate::error::TransportError;
use crate::events::{EventBus, EventListener};
use crate::streams::{StreamHandlers, StreamRegistry};
use crate::subscription::Subscription;
use crate::{spawn_background, stream_id_from};
use aiden_proto::{
    DataLineDecoder, Frame, HostEvent, HostRequest, StreamSignal, TransportMode, WireError,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::task::JoinHandle;

/// Talks to a host's HTTP surface.
///
/// Calls go to `POST /api/invoke`. Streams are started with
/// `POST /api/stream/{endpoint}` and read from `GET /api/stream/{id}/events`;
/// channel events come from `GET /api/events`, opened on first subscription.
/// Terminal operations never leave the process.
pub struct RemoteTransport {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
    bus: EventBus,
    streams: StreamRegistry,
    event_pump: Mutex<Option<JoinHandle<()>>>,
    stream_pumps: Mutex<HashMap<String, JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl RemoteTransport {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            token,
            client: reqwest::Client::new(),
            bus: EventBus::new(),
            streams: StreamRegistry::new(),
            event_pump: Mutex::new(None),
            stream_pumps: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn ensure_live(&self) -> Result<(), TransportError> {
        if self.disposed.load(Ordering::SeqCst) {
            Err(TransportError::Disposed)
        } else {
            Ok(())
        }
    }

    async fn fetch_current_user(&self) -> Result<Value, TransportError> {
        let response = self.request(Method::GET, "/api/auth/me").send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(Value::Null);
        }
        read_json(response).await
    }

    fn ensure_event_pump(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let mut pump = self.event_pump.lock().unwrap_or_else(|e| e.into_inner());
        if pump.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let request = self.request(Method::GET, "/api/events");
        let bus = self.bus.clone();
        *pump = spawn_background(pump_events(request, bus));
    }

    fn spawn_stream_pump(&self, stream_id: &str) {
        let request = self.request(Method::GET, &format!("/api/stream/{stream_id}/events"));
        let Some(handle) =
            spawn_background(pump_stream(request, self.streams.clone(), stream_id.to_string()))
        else {
            return;
        };
        let mut pumps = self.stream_pumps.lock().unwrap_or_else(|e| e.into_inner());
        pumps.retain(|_, h| !h.is_finished());
        pumps.insert(stream_id.to_string(), handle);
    }
}

/// Non-2xx: keep the host's error kind when the body carries one.
pub(crate) fn http_error(status: StatusCode, body: &str) -> TransportError {
    match serde_json::from_str::<WireError>(body) {
        Ok(err) => err.into(),
        Err(_) => TransportError::NetworkFailure(format!("HTTP {}: {}", status.as_u16(), body)),
    }
}

async fn read_json(response: Response) -> Result<Value, TransportError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(http_error(status, &body));
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|e| TransportError::InvalidResponse(e.to_string()))
}

async fn pump_events(request: RequestBuilder, bus: EventBus) {
    let response = match request.send().await {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            tracing::warn!(status = %r.status(), "event stream rejected");
            return;
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to open event stream");
            return;
        }
    };

    let mut body = response.bytes_stream();
    let mut decoder = DataLineDecoder::default();
    while let Some(chunk) = body.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "event stream interrupted");
                return;
            }
        };
        for frame in decoder.feed(&bytes) {
            let Frame::Data(payload) = frame else {
                continue;
            };
            match serde_json::from_str::<HostEvent>(&payload) {
                Ok(event) => bus.emit(&event),
                Err(e) => tracing::debug!(error = %e, "skipping undecodable host event"),
            }
        }
    }
    tracing::debug!("event stream ended");
}

async fn pump_stream(request: RequestBuilder, streams: StreamRegistry, stream_id: String) {
    let fail = |message: String| {
        streams.dispatch(&stream_id, StreamSignal::Error { message });
    };

    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => return fail(e.to_string()),
    };
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return fail(http_error(status, &body).to_string());
    }

    let mut body = response.bytes_stream();
    let mut decoder = DataLineDecoder::default();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                for frame in decoder.feed(&bytes) {
                    if deliver(&streams, &stream_id, frame) {
                        return;
                    }
                }
            }
            Err(e) => return fail(e.to_string()),
        }
    }
    for frame in decoder.finish() {
        if deliver(&streams, &stream_id, frame) {
            return;
        }
    }
    // end of body without a terminal record
    streams.dispatch(&stream_id, StreamSignal::Done);
}

/// Returns true once the stream is over.
fn deliver(streams: &StreamRegistry, stream_id: &str, frame: Frame) -> bool {
    if streams.is_cancelled(stream_id) {
        return true;
    }
    let signal = match frame {
        Frame::Done => StreamSignal::Done,
        Frame::Data(payload) => match serde_json::from_str::<StreamSignal>(&payload) {
            Ok(signal) => signal,
            Err(e) => {
                tracing::debug!(stream_id, error = %e, "skipping undecodable stream record");
                return false;
            }
        },
    };
    let terminal = signal.is_terminal();
    streams.dispatch(stream_id, signal);
    terminal
}

#[async_trait]
impl Invoke for RemoteTransport {
    async fn invoke(&self, request: HostRequest) -> Result<Value, TransportError> {
        self.ensure_live()?;
        if request.is_terminal_op() {
            return Err(TransportError::unsupported(request.op_name()));
        }
        if matches!(request, HostRequest::AuthCurrentUser) {
            return self.fetch_current_user().await;
        }
        tracing::debug!(op = request.op_name(), "remote call");
        let response = self
            .request(Method::POST, "/api/invoke")
            .json(&request)
            .send()
            .await?;
        read_json(response).await
    }
}

impl Events for RemoteTransport {
    fn on(&self, channel: &str, listener: EventListener) -> Subscription {
        if self.ensure_live().is_err() {
            return Subscription::inert();
        }
        self.ensure_event_pump();
        self.bus.on(channel, listener)
    }
}

#[async_trait]
impl Streaming for RemoteTransport {
    async fn start_stream(&self, endpoint: &str, payload: Value) -> Result<String, TransportError> {
        self.ensure_live()?;
        let response = self
            .request(Method::POST, &format!("/api/stream/{endpoint}"))
            .json(&payload)
            .send()
            .await?;
        let stream_id = stream_id_from(&read_json(response).await?)?;
        self.spawn_stream_pump(&stream_id);
        tracing::debug!(stream_id = %stream_id, endpoint, "remote stream started");
        Ok(stream_id)
    }

    fn subscribe_stream(&self, stream_id: &str, handlers: StreamHandlers) -> Subscription {
        if self.ensure_live().is_err() {
            return Subscription::inert();
        }
        self.streams.subscribe(stream_id, handlers)
    }

    async fn cancel_stream(&self, stream_id: &str) -> Result<bool, TransportError> {
        self.ensure_live()?;
        let was_live = self.streams.cancel(stream_id);
        if let Some(pump) = self
            .stream_pumps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(stream_id)
        {
            pump.abort();
        }

        let sent = self
            .request(Method::POST, &format!("/api/stream/{stream_id}/cancel"))
            .send()
            .await;
        match sent {
            Ok(response) => match read_json(response).await {
                Ok(reply) => Ok(reply
                    .get("cancelled")
                    .and_then(Value::as_bool)
                    .unwrap_or(was_live)),
                Err(e) => {
                    tracing::warn!(stream_id, error = %e, "remote stream cancel rejected");
                    Ok(was_live)
                }
            },
            Err(e) => {
                tracing::warn!(stream_id, error = %e, "remote stream cancel failed");
                Ok(was_live)
            }
        }
    }
}

impl DataAccess for RemoteTransport {}
impl Filesystem for RemoteTransport {}
impl Auth for RemoteTransport {}
impl Agents for RemoteTransport {}
impl Terminals for RemoteTransport {}
impl Memory for RemoteTransport {}
impl Git for RemoteTransport {}
impl Ai for RemoteTransport {}
impl SourceHosting for RemoteTransport {}

impl Transport for RemoteTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Remote
    }

    fn is_connected(&self) -> bool {
        !self.disposed.load(Ordering::SeqCst)
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pump) = self
            .event_pump
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            pump.abort();
        }
        for (_, pump) in self
            .stream_pumps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
        {
            pump.abort();
        }
        self.bus.clear();
        self.streams.clear();
        tracing::debug!(base_url = %self.base_url, "remote transport disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiden_proto::ErrorCode;

    #[test]
    fn structured_host_error_keeps_its_kind() {
        let err = http_error(
            StatusCode::NOT_FOUND,
            r#"{"code":"NOT_FOUND","message":"Agent session not found","details":null,"retryable":false}"#,
        );
        assert_eq!(err, TransportError::NotFound("Agent session not found".into()));
    }

    #[test]
    fn plain_body_becomes_network_failure() {
        let err = http_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(
            err,
            TransportError::NetworkFailure("HTTP 502: upstream down".into())
        );
        assert_eq!(err.code(), ErrorCode::NetworkFailure);
    }

    #[test]
    fn base_url_loses_trailing_slash() {
        let transport = RemoteTransport::new("http://host:3000/", None);
        assert_eq!(transport.base_url(), "http://host:3000");
        assert_eq!(transport.mode(), TransportMode::Remote);
        assert!(transport.is_connected());
    }

    #[test]
    fn cancelled_stream_stops_delivery() {
        let streams = StreamRegistry::new();
        streams.cancel("s1");
        assert!(deliver(&streams, "s1", Frame::Data(r#"{"type":"done"}"#.into())));
    }

    #[test]
    fn undecodable_record_is_skipped() {
        let streams = StreamRegistry::new();
        assert!(!deliver(&streams, "s1", Frame::Data("{not json".into())));
        assert!(deliver(&streams, "s1", Frame::Done));
    }
}
