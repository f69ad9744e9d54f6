use aiden_proto::{HostEvent, StreamSignal};
use aiden_transport::streams::RETENTION;
use aiden_transport::{StreamHandlers, StreamRegistry};
use tokio::sync::{broadcast, mpsc};

/// Replays `stream:*` host events per stream id for HTTP subscribers, which
/// always attach after the stream has been started.
#[derive(Clone, Default)]
pub struct StreamJournal {
    registry: StreamRegistry,
}

impl StreamJournal {
    /// Subscribes to `events` before returning, so nothing emitted after
    /// this call is missed.
    pub fn spawn(events: &broadcast::Sender<HostEvent>) -> Self {
        let journal = Self::default();
        let mut rx = events.subscribe();
        let registry = journal.registry.clone();
        tokio::spawn(async move {
            let mut sweep = tokio::time::interval(RETENTION);
            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Ok(event) => {
                            if let Some((stream_id, signal)) = StreamSignal::from_host_event(&event) {
                                registry.dispatch(&stream_id, signal);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "stream journal lagged behind host events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = sweep.tick() => {
                        registry.sweep(RETENTION);
                    }
                }
            }
        });
        journal
    }

    /// Signals for `stream_id`, ending after the terminal one. `None` once
    /// the stream has finished and a subscriber already drained it.
    pub fn subscribe(&self, stream_id: &str) -> Option<mpsc::UnboundedReceiver<StreamSignal>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (done_tx, error_tx) = (tx.clone(), tx.clone());
        let handlers = StreamHandlers::new()
            .on_data(move |event| {
                let _ = tx.send(StreamSignal::Data {
                    event: event.clone(),
                });
            })
            .on_done(move || {
                let _ = done_tx.send(StreamSignal::Done);
            })
            .on_error(move |message| {
                let _ = error_tx.send(StreamSignal::Error {
                    message: message.to_string(),
                });
            });
        let subscription = self.registry.subscribe(stream_id, handlers);
        (!subscription.is_inert()).then_some(rx)
    }

    /// Close the entry so open subscribers end.
    pub fn cancel(&self, stream_id: &str) -> bool {
        self.registry.cancel(stream_id)
    }
}
