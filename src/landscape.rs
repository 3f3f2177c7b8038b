//! Landscape change notifier
//!
//! One explicitly constructed notifier per process collects "the window
//! layout may have changed" signals from heterogeneous sources (OS app
//! lifecycle observers, input activity hooks, the portable
//! [`InventoryWatcher`]) and fans them out to subscriptions.
//!
//! Signals are hints, not diffs. Subscribers are expected to debounce before
//! acting. Sources only run while at least one subscription is alive.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::capture::ContentSource;
use crate::config;
use crate::inventory::InventoryFingerprint;

/// Why the landscape may have changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LandscapeEvent {
    /// Synthesized once per subscription so the subscriber can do its first refresh
    Initial,
    AppLaunched,
    AppTerminated,
    AppHidden,
    AppUnhidden,
    AppActivated,
    AppDeactivated,
    ActiveSpaceChanged,
    DisplayParametersChanged,
    /// Pointer button released; the user may have moved or closed a window
    PointerReleased,
    KeyReleased,
    /// Polled inventory differs from the previous poll
    InventoryChanged,
}

/// Handle sources use to emit signals. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LandscapeSink {
    tx: broadcast::Sender<LandscapeEvent>,
}

impl LandscapeSink {
    pub fn signal(&self, event: LandscapeEvent) {
        tracing::trace!(?event, "Landscape signal");
        // No receivers is fine; nobody is watching right now.
        let _ = self.tx.send(event);
    }
}

/// Origin of landscape signals, started and stopped by the notifier
pub trait LandscapeSource: Send + 'static {
    /// Begin observing and forward events into `sink`
    fn start(&mut self, sink: LandscapeSink);

    /// Release every OS observation handle taken in `start`
    fn stop(&mut self);

    fn name(&self) -> &'static str;
}

struct SourceSet {
    subscribers: usize,
    sources: Vec<Box<dyn LandscapeSource>>,
}

struct NotifierInner {
    tx: broadcast::Sender<LandscapeEvent>,
    state: Mutex<SourceSet>,
}

impl NotifierInner {
    fn sink(&self) -> LandscapeSink {
        LandscapeSink {
            tx: self.tx.clone(),
        }
    }
}

/// Process-wide landscape change notifier
#[derive(Clone)]
pub struct LandscapeNotifier {
    inner: Arc<NotifierInner>,
}

impl Default for LandscapeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LandscapeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock().unwrap();
        f.debug_struct("LandscapeNotifier")
            .field("subscribers", &state.subscribers)
            .field("sources", &state.sources.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl LandscapeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(config::landscape::SIGNAL_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(NotifierInner {
                tx,
                state: Mutex::new(SourceSet {
                    subscribers: 0,
                    sources: Vec::new(),
                }),
            }),
        }
    }

    /// Register a source. It starts right away if someone is subscribed.
    pub fn add_source(&self, mut source: impl LandscapeSource) {
        let mut state = self.inner.state.lock().unwrap();
        if state.subscribers > 0 {
            source.start(self.inner.sink());
        }
        tracing::debug!(source = source.name(), "Registered landscape source");
        state.sources.push(Box::new(source));
    }

    /// Sink for hosts that forward OS events themselves
    pub fn sink(&self) -> LandscapeSink {
        self.inner.sink()
    }

    pub fn subscribe(&self) -> LandscapeSubscription {
        let mut state = self.inner.state.lock().unwrap();
        let rx = self.inner.tx.subscribe();
        state.subscribers += 1;
        if state.subscribers == 1 {
            let sink = self.inner.sink();
            for source in state.sources.iter_mut() {
                tracing::debug!(source = source.name(), "Starting landscape source");
                source.start(sink.clone());
            }
        }
        LandscapeSubscription {
            rx,
            initial_pending: true,
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().unwrap().subscribers
    }
}

/// A live subscription. The first `recv` yields [`LandscapeEvent::Initial`]
/// immediately. Dropping the last subscription stops every source.
pub struct LandscapeSubscription {
    rx: broadcast::Receiver<LandscapeEvent>,
    initial_pending: bool,
    inner: Arc<NotifierInner>,
}

impl LandscapeSubscription {
    pub async fn recv(&mut self) -> LandscapeEvent {
        if self.initial_pending {
            self.initial_pending = false;
            return LandscapeEvent::Initial;
        }
        loop {
            match self.rx.recv().await {
                Ok(event) => return event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // The next buffered event still signals the change
                    tracing::trace!(skipped, "Landscape subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    // The subscription keeps the sender alive; unreachable in practice
                    std::future::pending::<()>().await;
                }
            }
        }
    }
}

impl Drop for LandscapeSubscription {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock().unwrap();
        state.subscribers = state.subscribers.saturating_sub(1);
        if state.subscribers == 0 {
            for source in state.sources.iter_mut() {
                tracing::debug!(source = source.name(), "Stopping landscape source");
                source.stop();
            }
        }
    }
}

/// Portable source: polls a [`ContentSource`] and signals
/// [`LandscapeEvent::InventoryChanged`] when the set of apps, windows, their
/// on-screen flags or the displays differ from the previous poll.
///
/// Needs a tokio runtime at `start`.
pub struct InventoryWatcher<S: ContentSource> {
    source: Arc<S>,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl<S: ContentSource> InventoryWatcher<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self::with_interval(source, Duration::from_millis(config::landscape::INVENTORY_POLL_MS))
    }

    pub fn with_interval(source: Arc<S>, interval: Duration) -> Self {
        Self {
            source,
            interval,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

impl<S: ContentSource> LandscapeSource for InventoryWatcher<S> {
    fn start(&mut self, sink: LandscapeSink) {
        if self.task.is_some() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("Inventory watcher needs a tokio runtime, not started");
            return;
        };
        let source = Arc::clone(&self.source);
        let interval = self.interval;
        self.task = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last: Option<InventoryFingerprint> = None;
            loop {
                ticker.tick().await;
                match source.shareable_content().await {
                    Ok(content) => {
                        let fingerprint = content.fingerprint();
                        if last.as_ref().map_or(false, |prev| *prev != fingerprint) {
                            sink.signal(LandscapeEvent::InventoryChanged);
                        }
                        last = Some(fingerprint);
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "Inventory poll failed");
                    }
                }
            }
        }));
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn name(&self) -> &'static str {
        "inventory-watcher"
    }
}

impl<S: ContentSource> Drop for InventoryWatcher<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureError;
    use crate::inventory::{ShareableContent, WindowInfo};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        starts: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
        sink: Option<LandscapeSink>,
    }

    impl LandscapeSource for CountingSource {
        fn start(&mut self, sink: LandscapeSink) {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.sink = Some(sink);
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.sink = None;
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn counting() -> (CountingSource, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let starts = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            starts: Arc::clone(&starts),
            stops: Arc::clone(&stops),
            sink: None,
        };
        (source, starts, stops)
    }

    #[tokio::test]
    async fn first_recv_is_initial() {
        let notifier = LandscapeNotifier::new();
        let mut sub = notifier.subscribe();
        assert_eq!(sub.recv().await, LandscapeEvent::Initial);

        notifier.sink().signal(LandscapeEvent::AppLaunched);
        assert_eq!(sub.recv().await, LandscapeEvent::AppLaunched);
    }

    #[tokio::test]
    async fn sources_follow_subscription_lifetime() {
        let notifier = LandscapeNotifier::new();
        let (source, starts, stops) = counting();
        notifier.add_source(source);
        assert_eq!(starts.load(Ordering::SeqCst), 0);

        let a = notifier.subscribe();
        let b = notifier.subscribe();
        assert_eq!(starts.load(Ordering::SeqCst), 1);

        drop(a);
        assert_eq!(stops.load(Ordering::SeqCst), 0);
        drop(b);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.subscriber_count(), 0);

        let _c = notifier.subscribe();
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn late_source_starts_immediately() {
        let notifier = LandscapeNotifier::new();
        let _sub = notifier.subscribe();
        let (source, starts, _) = counting();
        notifier.add_source(source);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lagging_subscriber_still_sees_a_signal() {
        let notifier = LandscapeNotifier::new();
        let mut sub = notifier.subscribe();
        assert_eq!(sub.recv().await, LandscapeEvent::Initial);

        let sink = notifier.sink();
        for _ in 0..(config::landscape::SIGNAL_CHANNEL_CAPACITY * 3) {
            sink.signal(LandscapeEvent::PointerReleased);
        }
        assert_eq!(sub.recv().await, LandscapeEvent::PointerReleased);
    }

    struct ScriptedContent {
        content: Mutex<ShareableContent>,
    }

    #[async_trait]
    impl ContentSource for ScriptedContent {
        async fn shareable_content(&self) -> Result<ShareableContent, CaptureError> {
            Ok(self.content.lock().unwrap().clone())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn inventory_watcher_signals_on_change_only() {
        let content = Arc::new(ScriptedContent {
            content: Mutex::new(ShareableContent {
                windows: vec![WindowInfo::new(1, "X", "a", true)],
                ..Default::default()
            }),
        });
        let notifier = LandscapeNotifier::new();
        notifier.add_source(InventoryWatcher::with_interval(
            Arc::clone(&content),
            Duration::from_millis(100),
        ));
        let mut sub = notifier.subscribe();
        assert_eq!(sub.recv().await, LandscapeEvent::Initial);

        // Title-only churn is ignored
        tokio::time::sleep(Duration::from_millis(150)).await;
        content.content.lock().unwrap().windows[0].title = "b".to_string();
        let quiet = tokio::time::timeout(Duration::from_millis(300), sub.recv()).await;
        assert!(quiet.is_err());

        content.content.lock().unwrap().windows[0].on_screen = false;
        let event = tokio::time::timeout(Duration::from_millis(250), sub.recv())
            .await
            .unwrap();
        assert_eq!(event, LandscapeEvent::InventoryChanged);
    }
}
