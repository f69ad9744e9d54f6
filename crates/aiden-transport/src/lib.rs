//! Client side of the host: one capability contract, a local transport over
//! the in-process bridge, a remote transport over HTTP, and the switch that
//! keeps exactly one of them active.

pub mod bridge;
pub mod capability;
pub mod error;
pub mod events;
pub mod local;
pub mod remote;
pub mod streams;
pub mod subscription;
pub mod switch;

pub use bridge::{BridgeRequest, HostBridge};
pub use capability::{
    Agents, Ai, Auth, DataAccess, Events, Filesystem, Git, Invoke, Memory, SourceHosting,
    Streaming, Terminals, Transport,
};
pub use error::TransportError;
pub use events::{EventBus, EventListener};
pub use local::LocalTransport;
pub use remote::RemoteTransport;
pub use streams::{StreamHandlers, StreamRegistry};
pub use subscription::Subscription;
pub use switch::{global, install_global, SwitchConfig, TransportSwitch};

use serde_json::Value;
use std::future::Future;
use tokio::task::JoinHandle;

/// Spawn on the current runtime; `None` (with a warning) outside one.
pub(crate) fn spawn_background<F>(future: F) -> Option<JoinHandle<()>>
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Some(handle.spawn(future)),
        Err(_) => {
            tracing::warn!("no tokio runtime; background pump not started");
            None
        }
    }
}

/// `{"streamId": "..."}` as returned by a stream start.
pub(crate) fn stream_id_from(reply: &Value) -> Result<String, TransportError> {
    reply
        .get("streamId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| TransportError::InvalidResponse("missing streamId".to_string()))
}
