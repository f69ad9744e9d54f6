use crate::subscription::Subscription;
use aiden_proto::HostEvent;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub type EventListener = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    channels: HashMap<String, Vec<(u64, EventListener)>>,
}

/// Per-channel listener registry fed by a transport's event pump.
///
/// Listeners run outside the lock, so a listener may subscribe or
/// unsubscribe from inside its callback.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, channel: &str, listener: EventListener) -> Subscription {
        let id = {
            let mut registry = self.lock();
            registry.next_id += 1;
            let id = registry.next_id;
            registry
                .channels
                .entry(channel.to_string())
                .or_default()
                .push((id, listener));
            id
        };

        let inner = Arc::downgrade(&self.inner);
        let channel = channel.to_string();
        Subscription::new(move || {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let mut registry = inner.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(listeners) = registry.channels.get_mut(&channel) {
                listeners.retain(|(lid, _)| *lid != id);
                if listeners.is_empty() {
                    registry.channels.remove(&channel);
                }
            }
        })
    }

    /// Deliver one event to every listener of its channel, in registration order.
    pub fn emit(&self, event: &HostEvent) {
        let listeners: Vec<EventListener> = match self.lock().channels.get(&event.channel) {
            Some(listeners) => listeners.iter().map(|(_, l)| l.clone()).collect(),
            None => return,
        };
        for listener in listeners {
            listener(&event.payload);
        }
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        self.lock().channels.get(channel).map_or(0, Vec::len)
    }

    pub fn clear(&self) {
        self.lock().channels.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
