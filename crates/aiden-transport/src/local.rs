use crate::bridge::HostBridge;
use crate::capability::{
    Agents, Ai, Auth, DataAccess, Events, Filesystem, Git, Invoke, Memory, SourceHosting,
    Streaming, Terminals, Transport,
};
use crate::error::TransportError;
use crate::events::{EventBus, EventListener};
use crate::streams::{StreamHandlers, StreamRegistry};
use crate::subscription::Subscription;
use crate::{spawn_background, stream_id_from};
use aiden_proto::{HostEvent, HostRequest, StreamSignal, TransportMode};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Talks to a host running in this process over a [`HostBridge`].
///
/// Holds no business logic. The first subscription (or stream start)
/// starts one pump task that routes host events to channel listeners and
/// to stream listeners.
pub struct LocalTransport {
    mode: TransportMode,
    bridge: HostBridge,
    bus: EventBus,
    streams: StreamRegistry,
    pump: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl LocalTransport {
    pub fn new(bridge: HostBridge) -> Self {
        Self::with_mode(bridge, TransportMode::Local)
    }

    /// `mode` is reported as-is; both local and hybrid use the bridge.
    pub fn with_mode(bridge: HostBridge, mode: TransportMode) -> Self {
        Self {
            mode,
            bridge,
            bus: EventBus::new(),
            streams: StreamRegistry::new(),
            pump: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    fn ensure_live(&self) -> Result<(), TransportError> {
        if self.disposed.load(Ordering::SeqCst) {
            Err(TransportError::Disposed)
        } else {
            Ok(())
        }
    }

    fn ensure_pump(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let mut pump = self.pump.lock().unwrap_or_else(|e| e.into_inner());
        if pump.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        // subscribe before spawning so nothing emitted from here on is missed
        let mut rx = self.bridge.subscribe();
        let bus = self.bus.clone();
        let streams = self.streams.clone();
        *pump = spawn_background(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => route(&bus, &streams, &event),
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "local transport lagged behind host events");
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!("host event channel closed");
                        break;
                    }
                }
            }
        });
    }
}

fn route(bus: &EventBus, streams: &StreamRegistry, event: &HostEvent) {
    if let Some((stream_id, signal)) = StreamSignal::from_host_event(event) {
        streams.dispatch(&stream_id, signal);
    }
    bus.emit(event);
}

#[async_trait]
impl Invoke for LocalTransport {
    async fn invoke(&self, request: HostRequest) -> Result<Value, TransportError> {
        self.ensure_live()?;
        tracing::debug!(op = request.op_name(), "host call");
        self.bridge.call(request).await
    }
}

impl Events for LocalTransport {
    fn on(&self, channel: &str, listener: EventListener) -> Subscription {
        if self.ensure_live().is_err() {
            return Subscription::inert();
        }
        self.ensure_pump();
        self.bus.on(channel, listener)
    }
}

#[async_trait]
impl Streaming for LocalTransport {
    async fn start_stream(&self, endpoint: &str, payload: Value) -> Result<String, TransportError> {
        self.ensure_live()?;
        self.ensure_pump();
        let reply = self
            .bridge
            .call(HostRequest::StreamStart {
                endpoint: endpoint.to_string(),
                payload,
            })
            .await?;
        stream_id_from(&reply)
    }

    fn subscribe_stream(&self, stream_id: &str, handlers: StreamHandlers) -> Subscription {
        if self.ensure_live().is_err() {
            return Subscription::inert();
        }
        self.ensure_pump();
        self.streams.subscribe(stream_id, handlers)
    }

    async fn cancel_stream(&self, stream_id: &str) -> Result<bool, TransportError> {
        self.ensure_live()?;
        self.streams.cancel(stream_id);
        let reply = self
            .bridge
            .call(HostRequest::StreamCancel {
                stream_id: stream_id.to_string(),
            })
            .await?;
        Ok(reply.as_bool().unwrap_or(false))
    }
}

impl DataAccess for LocalTransport {}
impl Filesystem for LocalTransport {}
impl Auth for LocalTransport {}
impl Agents for LocalTransport {}
impl Terminals for LocalTransport {}
impl Memory for LocalTransport {}
impl Git for LocalTransport {}
impl Ai for LocalTransport {}
impl SourceHosting for LocalTransport {}

impl Transport for LocalTransport {
    fn mode(&self) -> TransportMode {
        self.mode
    }

    fn is_connected(&self) -> bool {
        !self.disposed.load(Ordering::SeqCst) && self.bridge.is_open()
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pump) = self.pump.lock().unwrap_or_else(|e| e.into_inner()).take() {
            pump.abort();
        }
        self.bus.clear();
        self.streams.clear();
        tracing::debug!(mode = %self.mode, "local transport disposed");
    }
}
