use crate::subscription::Subscription;
use aiden_proto::{StreamEvent, StreamSignal};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub type DataListener = Arc<dyn Fn(&StreamEvent) + Send + Sync>;
pub type DoneListener = Arc<dyn Fn() + Send + Sync>;
pub type ErrorListener = Arc<dyn Fn(&str) + Send + Sync>;

/// How long signals for a stream nobody listens to are kept, and how long
/// a finished or cancelled id is remembered.
pub const RETENTION: Duration = Duration::from_secs(60);

/// Callbacks for one stream.
#[derive(Clone, Default)]
pub struct StreamHandlers {
    on_data: Option<DataListener>,
    on_done: Option<DoneListener>,
    on_error: Option<ErrorListener>,
}

impl StreamHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_data(mut self, f: impl Fn(&StreamEvent) + Send + Sync + 'static) -> Self {
        self.on_data = Some(Arc::new(f));
        self
    }

    pub fn on_done(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_done = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    fn handles(&self, signal: &StreamSignal) -> bool {
        match signal {
            StreamSignal::Data { .. } => self.on_data.is_some(),
            StreamSignal::Done => self.on_done.is_some(),
            StreamSignal::Error { .. } => self.on_error.is_some(),
        }
    }

    fn deliver(&self, signal: &StreamSignal) {
        match signal {
            StreamSignal::Data { event } => {
                if let Some(f) = &self.on_data {
                    f(event);
                }
            }
            StreamSignal::Done => {
                if let Some(f) = &self.on_done {
                    f();
                }
            }
            StreamSignal::Error { message } => {
                if let Some(f) = &self.on_error {
                    f(message);
                }
            }
        }
    }
}

/// A queued signal, either for every attached handler or replayed to the
/// one handler that claimed it from `held`.
struct Queued {
    target: Option<u64>,
    signal: StreamSignal,
}

struct OpenStream {
    handlers: Vec<(u64, StreamHandlers)>,
    queue: VecDeque<Queued>,
    /// Set while some thread is delivering `queue`; keeps delivery ordered
    /// without holding the lock across callbacks.
    draining: bool,
    /// Signals no attached handler could take, in arrival order.
    held: Vec<StreamSignal>,
    /// The terminal signal has arrived; later dispatches are dropped.
    finished: bool,
    touched: Instant,
}

impl OpenStream {
    fn new() -> Self {
        Self {
            handlers: Vec::new(),
            queue: VecDeque::new(),
            draining: false,
            held: Vec::new(),
            finished: false,
            touched: Instant::now(),
        }
    }
}

enum Slot {
    Open(OpenStream),
    Closed { at: Instant, cancelled: bool },
}

struct Registry {
    next_id: u64,
    streams: HashMap<String, Slot>,
    last_sweep: Instant,
}

/// Per-stream-id listener sets.
///
/// Each stream delivers zero or more `data` then exactly one `done` or
/// `error`; once the terminal signal reaches a listener the id is closed
/// and its listeners are dropped. A signal that arrives while no attached
/// listener handles its kind is held and replayed, in order, to the next
/// listener that does. A cancelled id never delivers again.
#[derive(Clone)]
pub struct StreamRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                streams: HashMap::new(),
                last_sweep: Instant::now(),
            })),
        }
    }

    pub fn subscribe(&self, stream_id: &str, handlers: StreamHandlers) -> Subscription {
        let mut registry = self.lock();
        registry.sweep_if_due();
        registry.next_id += 1;
        let handler_id = registry.next_id;

        let slot = registry
            .streams
            .entry(stream_id.to_string())
            .or_insert_with(|| Slot::Open(OpenStream::new()));
        let Slot::Open(stream) = slot else {
            return Subscription::inert();
        };

        let (claimed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut stream.held)
            .into_iter()
            .partition(|signal| handlers.handles(signal));
        stream.held = kept;
        for signal in claimed.into_iter().rev() {
            stream.queue.push_front(Queued {
                target: Some(handler_id),
                signal,
            });
        }
        stream.handlers.push((handler_id, handlers));

        let replay = !stream.draining && !stream.queue.is_empty();
        if replay {
            stream.draining = true;
        }
        drop(registry);

        if replay {
            self.drain(stream_id);
        }

        let inner = Arc::downgrade(&self.inner);
        let stream_id = stream_id.to_string();
        Subscription::new(move || {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let mut registry = inner.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(Slot::Open(stream)) = registry.streams.get_mut(&stream_id) {
                stream.handlers.retain(|(id, _)| *id != handler_id);
            }
        })
    }

    /// Route one decoded signal. Returns false when it was dropped because
    /// the stream is closed, cancelled or already finished.
    pub fn dispatch(&self, stream_id: &str, signal: StreamSignal) -> bool {
        let mut registry = self.lock();
        registry.sweep_if_due();

        let slot = registry
            .streams
            .entry(stream_id.to_string())
            .or_insert_with(|| Slot::Open(OpenStream::new()));
        let Slot::Open(stream) = slot else {
            return false;
        };
        if stream.finished {
            return false;
        }
        stream.finished = signal.is_terminal();
        stream.touched = Instant::now();
        stream.queue.push_back(Queued {
            target: None,
            signal,
        });
        if stream.draining {
            return true;
        }
        stream.draining = true;
        drop(registry);

        self.drain(stream_id);
        true
    }

    /// Close the id so nothing is delivered for it again. Returns false if
    /// it was already finished or cancelled.
    pub fn cancel(&self, stream_id: &str) -> bool {
        let mut registry = self.lock();
        if matches!(registry.streams.get(stream_id), Some(Slot::Closed { .. })) {
            return false;
        }
        registry.streams.insert(
            stream_id.to_string(),
            Slot::Closed {
                at: Instant::now(),
                cancelled: true,
            },
        );
        true
    }

    pub fn is_cancelled(&self, stream_id: &str) -> bool {
        matches!(
            self.lock().streams.get(stream_id),
            Some(Slot::Closed {
                cancelled: true,
                ..
            })
        )
    }

    pub fn is_closed(&self, stream_id: &str) -> bool {
        matches!(self.lock().streams.get(stream_id), Some(Slot::Closed { .. }))
    }

    /// Open streams with at least one listener attached.
    pub fn live_count(&self) -> usize {
        self.lock()
            .streams
            .values()
            .filter(|slot| matches!(slot, Slot::Open(stream) if !stream.handlers.is_empty()))
            .count()
    }

    /// Forget closed ids, and unclaimed or finished streams, idle for
    /// `max_age`.
    pub fn sweep(&self, max_age: Duration) -> usize {
        self.lock().sweep(max_age)
    }

    pub fn clear(&self) {
        self.lock().streams.clear();
    }

    fn drain(&self, stream_id: &str) {
        loop {
            let (signal, targets) = {
                let mut registry = self.lock();
                let Some(Slot::Open(stream)) = registry.streams.get_mut(stream_id) else {
                    return;
                };
                let Some(Queued { target, signal }) = stream.queue.pop_front() else {
                    stream.draining = false;
                    return;
                };
                let targets: Vec<StreamHandlers> = stream
                    .handlers
                    .iter()
                    .filter(|(id, h)| target.map_or(true, |t| t == *id) && h.handles(&signal))
                    .map(|(_, h)| h.clone())
                    .collect();
                if targets.is_empty() {
                    stream.touched = Instant::now();
                    stream.held.push(signal);
                    continue;
                }
                if signal.is_terminal() {
                    registry.streams.insert(
                        stream_id.to_string(),
                        Slot::Closed {
                            at: Instant::now(),
                            cancelled: false,
                        },
                    );
                }
                (signal, targets)
            };

            for handler in &targets {
                handler.deliver(&signal);
            }
            if signal.is_terminal() {
                return;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Registry {
    fn sweep_if_due(&mut self) {
        if self.last_sweep.elapsed() >= RETENTION {
            self.sweep(RETENTION);
        }
    }

    fn sweep(&mut self, max_age: Duration) -> usize {
        self.last_sweep = Instant::now();
        let before = self.streams.len();
        self.streams.retain(|_, slot| match slot {
            Slot::Open(stream) => {
                let idle = stream.handlers.is_empty() || stream.finished;
                !(idle && stream.touched.elapsed() >= max_age)
            }
            Slot::Closed { at, .. } => at.elapsed() < max_age,
        });
        let swept = before - self.streams.len();
        if swept > 0 {
            tracing::debug!(swept, "swept stale stream entries");
        }
        swept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Data(String),
        Done,
        Error(String),
    }

    fn recording() -> (Arc<Mutex<Vec<Seen>>>, StreamHandlers) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (a, b, c) = (seen.clone(), seen.clone(), seen.clone());
        let handlers = StreamHandlers::new()
            .on_data(move |e| {
                a.lock()
                    .unwrap()
                    .push(Seen::Data(e.content.clone().unwrap_or_default()))
            })
            .on_done(move || b.lock().unwrap().push(Seen::Done))
            .on_error(move |m| c.lock().unwrap().push(Seen::Error(m.to_string())));
        (seen, handlers)
    }

    fn data(text: &str) -> StreamSignal {
        StreamSignal::Data {
            event: StreamEvent::text(text),
        }
    }

    // ── delivery ─────────────────────────────────────────────────────

    #[test]
    fn delivers_in_order_then_closes() {
        let registry = StreamRegistry::new();
        let (seen, handlers) = recording();
        let _sub = registry.subscribe("s1", handlers);

        for text in ["a", "b", "c"] {
            assert!(registry.dispatch("s1", data(text)));
        }
        assert!(registry.dispatch("s1", StreamSignal::Done));
        assert!(!registry.dispatch("s1", data("late")));
        assert!(!registry.dispatch("s1", StreamSignal::Done));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Seen::Data("a".into()),
                Seen::Data("b".into()),
                Seen::Data("c".into()),
                Seen::Done
            ]
        );
        assert!(registry.is_closed("s1"));
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn late_subscriber_gets_nothing() {
        let registry = StreamRegistry::new();
        let (_seen, handlers) = recording();
        let _sub = registry.subscribe("s1", handlers);
        registry.dispatch("s1", data("a"));
        registry.dispatch("s1", StreamSignal::Done);

        let (late, handlers) = recording();
        let sub = registry.subscribe("s1", handlers);
        assert!(sub.is_inert());
        assert!(late.lock().unwrap().is_empty());
    }

    #[test]
    fn unsubscribed_handler_stops_receiving() {
        let registry = StreamRegistry::new();
        let (seen, handlers) = recording();
        let sub = registry.subscribe("s1", handlers);
        registry.dispatch("s1", data("a"));
        sub.unsubscribe();
        registry.dispatch("s1", data("b"));
        assert_eq!(*seen.lock().unwrap(), vec![Seen::Data("a".into())]);
    }

    // ── orphans ──────────────────────────────────────────────────────

    #[test]
    fn early_signals_replay_to_first_subscriber() {
        let registry = StreamRegistry::new();
        registry.dispatch("s1", data("a"));
        registry.dispatch("s1", StreamSignal::Error {
            message: "No API key configured for anthropic".into(),
        });
        registry.dispatch("s1", data("dropped"));

        let (seen, handlers) = recording();
        let _sub = registry.subscribe("s1", handlers);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Seen::Data("a".into()),
                Seen::Error("No API key configured for anthropic".into())
            ]
        );

        let (second, handlers) = recording();
        let _sub = registry.subscribe("s1", handlers);
        assert!(second.lock().unwrap().is_empty());
    }

    #[test]
    fn replayed_backlog_precedes_live_signals() {
        let registry = StreamRegistry::new();
        registry.dispatch("s1", data("early"));
        let (seen, handlers) = recording();
        let _sub = registry.subscribe("s1", handlers);
        registry.dispatch("s1", data("live"));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Seen::Data("early".into()), Seen::Data("live".into())]
        );
    }

    #[test]
    fn sweep_forgets_stale_orphans() {
        let registry = StreamRegistry::new();
        registry.dispatch("s1", data("a"));
        assert_eq!(registry.sweep(Duration::ZERO), 1);

        let (seen, handlers) = recording();
        let _sub = registry.subscribe("s1", handlers);
        assert!(seen.lock().unwrap().is_empty());
    }

    // ── separate listeners ───────────────────────────────────────────

    fn data_only(seen: &Arc<Mutex<Vec<Seen>>>) -> StreamHandlers {
        let seen = seen.clone();
        StreamHandlers::new().on_data(move |e| {
            seen.lock()
                .unwrap()
                .push(Seen::Data(e.content.clone().unwrap_or_default()))
        })
    }

    fn done_only(seen: &Arc<Mutex<Vec<Seen>>>) -> StreamHandlers {
        let seen = seen.clone();
        StreamHandlers::new().on_done(move || seen.lock().unwrap().push(Seen::Done))
    }

    #[test]
    fn finished_stream_serves_data_and_done_listeners_registered_apart() {
        let registry = StreamRegistry::new();
        for text in ["one", "two", "three"] {
            registry.dispatch("s1", data(text));
        }
        registry.dispatch("s1", StreamSignal::Done);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let _data = registry.subscribe("s1", data_only(&seen));
        assert!(!registry.is_closed("s1"));
        let done = registry.subscribe("s1", done_only(&seen));
        assert!(!done.is_inert());

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Seen::Data("one".into()),
                Seen::Data("two".into()),
                Seen::Data("three".into()),
                Seen::Done
            ]
        );
        assert!(registry.is_closed("s1"));

        let late = Arc::new(Mutex::new(Vec::new()));
        assert!(registry.subscribe("s1", data_only(&late)).is_inert());
        assert!(late.lock().unwrap().is_empty());
    }

    #[test]
    fn early_error_waits_for_an_error_listener() {
        let registry = StreamRegistry::new();
        registry.dispatch("s1", StreamSignal::Error {
            message: "No API key configured for anthropic".into(),
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let _data = registry.subscribe("s1", data_only(&seen));
        let errors = seen.clone();
        let _error = registry.subscribe(
            "s1",
            StreamHandlers::new()
                .on_error(move |m| errors.lock().unwrap().push(Seen::Error(m.to_string()))),
        );

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Seen::Error("No API key configured for anthropic".into())]
        );
        assert!(registry.is_closed("s1"));
    }

    #[test]
    fn live_done_is_held_until_a_done_listener_attaches() {
        let registry = StreamRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _data = registry.subscribe("s1", data_only(&seen));

        registry.dispatch("s1", data("a"));
        registry.dispatch("s1", StreamSignal::Done);
        assert!(!registry.dispatch("s1", data("late")));
        assert_eq!(*seen.lock().unwrap(), vec![Seen::Data("a".into())]);

        let _done = registry.subscribe("s1", done_only(&seen));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Seen::Data("a".into()), Seen::Done]
        );
        assert!(registry.is_closed("s1"));
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn sweep_forgets_unclaimed_terminal_signals() {
        let registry = StreamRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _data = registry.subscribe("s1", data_only(&seen));
        registry.dispatch("s1", StreamSignal::Done);
        assert_eq!(registry.sweep(Duration::ZERO), 1);
    }

    // ── cancellation ─────────────────────────────────────────────────

    #[test]
    fn cancel_is_idempotent_and_silences_the_stream() {
        let registry = StreamRegistry::new();
        let (seen, handlers) = recording();
        let _sub = registry.subscribe("s1", handlers);
        registry.dispatch("s1", data("a"));

        assert!(registry.cancel("s1"));
        assert!(!registry.cancel("s1"));
        assert!(registry.is_cancelled("s1"));

        assert!(!registry.dispatch("s1", data("b")));
        assert!(!registry.dispatch("s1", StreamSignal::Done));
        assert_eq!(*seen.lock().unwrap(), vec![Seen::Data("a".into())]);
    }

    #[test]
    fn cancel_after_completion_is_a_no_op() {
        let registry = StreamRegistry::new();
        let _sub = registry.subscribe("s1", StreamHandlers::new().on_done(|| {}));
        registry.dispatch("s1", StreamSignal::Done);
        assert!(!registry.cancel("s1"));
        assert!(!registry.is_cancelled("s1"));
    }

    #[test]
    fn handler_may_cancel_its_own_stream() {
        let registry = StreamRegistry::new();
        let inner = registry.clone();
        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        let _sub = registry.subscribe(
            "s1",
            StreamHandlers::new().on_data(move |_| {
                *counter.lock().unwrap() += 1;
                inner.cancel("s1");
            }),
        );
        registry.dispatch("s1", data("a"));
        registry.dispatch("s1", data("b"));
        assert_eq!(*count.lock().unwrap(), 1);
    }
}
