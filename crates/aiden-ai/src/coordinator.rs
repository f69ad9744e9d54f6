use crate::credentials::CredentialSource;
use crate::frames::FrameOutcome;
use crate::provider::ProviderClient;
use crate::AiError;
use aiden_proto::{AiProvider, ChatParams, DataLineDecoder, Frame, HostEvent, StreamSignal};
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Endpoints accepted by [`StreamCoordinator::start`].
pub const CHAT_ENDPOINTS: &[&str] = &["chat", "ai"];

/// Runs AI response streams and publishes them as `stream:*` host events.
///
/// Each stream emits zero or more `stream:data` and then exactly one
/// `stream:done` or `stream:error`, unless it is cancelled first, after
/// which it emits nothing.
#[derive(Clone)]
pub struct StreamCoordinator {
    client: ProviderClient,
    credentials: Arc<dyn CredentialSource>,
    streams: Arc<Mutex<HashMap<String, CancellationToken>>>,
    events: broadcast::Sender<HostEvent>,
}

impl StreamCoordinator {
    pub fn new(
        client: ProviderClient,
        credentials: Arc<dyn CredentialSource>,
        events: broadcast::Sender<HostEvent>,
    ) -> Self {
        Self {
            client,
            credentials,
            streams: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    /// Accept a stream request and return its id. A missing credential is
    /// reported as an immediate `stream:error`, not as an `Err`.
    pub fn start(&self, endpoint: &str, payload: Value) -> Result<String, AiError> {
        if !CHAT_ENDPOINTS.contains(&endpoint) {
            return Err(AiError::UnknownEndpoint(endpoint.to_string()));
        }
        let params: ChatParams =
            serde_json::from_value(payload).map_err(|e| AiError::InvalidPayload(e.to_string()))?;
        Ok(self.stream(params))
    }

    /// Start a chat stream from typed parameters.
    pub fn stream(&self, params: ChatParams) -> String {
        let stream_id = uuid::Uuid::new_v4().to_string();
        let provider = self.provider_for(&params);
        let token = CancellationToken::new();
        self.lock().insert(stream_id.clone(), token.clone());

        let Some(api_key) = self.credentials.api_key(provider) else {
            tracing::warn!(stream_id = %stream_id, %provider, "no API key configured");
            self.publish(
                &stream_id,
                StreamSignal::Error {
                    message: AiError::MissingCredential(provider).to_string(),
                },
            );
            return stream_id;
        };

        tracing::info!(stream_id = %stream_id, %provider, "AI stream started");
        let coordinator = self.clone();
        let id = stream_id.clone();
        tokio::spawn(async move {
            coordinator.produce(id, provider, api_key, params, token).await;
        });
        stream_id
    }

    /// Idempotent. Returns whether a live stream was cancelled.
    pub fn cancel(&self, stream_id: &str) -> bool {
        let Some(token) = self.lock().remove(stream_id) else {
            return false;
        };
        token.cancel();
        tracing::info!(stream_id, "AI stream cancelled");
        true
    }

    pub fn is_active(&self, stream_id: &str) -> bool {
        self.lock().contains_key(stream_id)
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Non-streaming completion.
    pub async fn chat(&self, params: ChatParams) -> Result<String, AiError> {
        let provider = self.provider_for(&params);
        let api_key = self
            .credentials
            .api_key(provider)
            .ok_or(AiError::MissingCredential(provider))?;
        self.client.chat(provider, &api_key, &params).await
    }

    fn provider_for(&self, params: &ChatParams) -> AiProvider {
        params
            .provider
            .or_else(|| self.credentials.preferred_provider())
            .unwrap_or_default()
    }

    async fn produce(
        &self,
        stream_id: String,
        provider: AiProvider,
        api_key: String,
        params: ChatParams,
        token: CancellationToken,
    ) {
        let opened = tokio::select! {
            _ = token.cancelled() => return,
            opened = self.client.open_stream(provider, &api_key, &params) => opened,
        };
        let response = match opened {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(stream_id = %stream_id, error = %e, "AI stream request failed");
                self.publish(&stream_id, StreamSignal::Error { message: e.to_string() });
                return;
            }
        };

        let mut body = response.bytes_stream();
        let mut decoder = DataLineDecoder::default();
        loop {
            let chunk = tokio::select! {
                _ = token.cancelled() => return,
                chunk = body.next() => chunk,
            };
            let ended = chunk.is_none();
            let frames = match chunk {
                Some(Ok(bytes)) => decoder.feed(&bytes),
                Some(Err(e)) => {
                    self.publish(&stream_id, StreamSignal::Error { message: e.to_string() });
                    return;
                }
                None => decoder.finish(),
            };

            for frame in frames {
                let outcome = match frame {
                    Frame::Done => FrameOutcome::Finished,
                    Frame::Data(payload) => ProviderClient::decode_frame(provider, &payload),
                };
                match outcome {
                    FrameOutcome::Event(event) => {
                        if !self.publish(&stream_id, StreamSignal::Data { event }) {
                            return;
                        }
                    }
                    FrameOutcome::Finished => {
                        self.publish(&stream_id, StreamSignal::Done);
                        return;
                    }
                    FrameOutcome::Failed(message) => {
                        self.publish(&stream_id, StreamSignal::Error { message });
                        return;
                    }
                    FrameOutcome::Skip => {}
                }
            }

            if ended {
                self.publish(&stream_id, StreamSignal::Done);
                return;
            }
        }
    }

    /// Emit a signal if the stream is still live; a terminal signal retires
    /// it. The membership check and the send happen under one lock, so
    /// nothing is emitted once `cancel` has returned.
    fn publish(&self, stream_id: &str, signal: StreamSignal) -> bool {
        let mut streams = self.lock();
        if !streams.contains_key(stream_id) {
            return false;
        }
        if signal.is_terminal() {
            streams.remove(stream_id);
            tracing::debug!(stream_id, ?signal, "AI stream finished");
        }
        let _ = self.events.send(signal.to_host_event(stream_id));
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.streams.lock().unwrap_or_else(|e| e.into_inner())
    }
}
