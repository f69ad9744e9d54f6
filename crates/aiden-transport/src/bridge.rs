use crate::error::TransportError;
use aiden_proto::{HostEvent, HostRequest, WireError};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};

/// One call on the in-process host channel.
#[derive(Debug)]
pub struct BridgeRequest {
    pub request: HostRequest,
    pub reply: oneshot::Sender<Result<Value, WireError>>,
}

/// Client end of the in-process control channel to the host: a request
/// queue answered on one-shot replies, plus the host's event broadcast.
#[derive(Clone, Debug)]
pub struct HostBridge {
    requests: mpsc::Sender<BridgeRequest>,
    events: broadcast::Sender<HostEvent>,
}

impl HostBridge {
    pub fn new(requests: mpsc::Sender<BridgeRequest>, events: broadcast::Sender<HostEvent>) -> Self {
        Self { requests, events }
    }

    pub async fn call(&self, request: HostRequest) -> Result<Value, TransportError> {
        let (reply, answer) = oneshot::channel();
        self.requests
            .send(BridgeRequest { request, reply })
            .await
            .map_err(|_| TransportError::HostUnavailable)?;
        match answer.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(TransportError::HostUnavailable),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    pub fn is_open(&self) -> bool {
        !self.requests.is_closed()
    }
}
