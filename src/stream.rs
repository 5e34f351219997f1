// Stream appender - ordered, auto-following log for live tabs
//
// Producers (a WebSocket connection, the mock server) call `deliver` from
// their own tasks. Each call is timestamped and queued on an unbounded
// channel; one drain task per appender applies events to the document sink
// strictly in submission order. Applying an event always ends with the cursor
// at end-of-content and the viewport scrolled to it.
//
// Releasing the subscription closes a gate shared with the drain task. The
// gate's lock is held while an event is applied, so once `release` returns
// nothing else reaches the sink. Producers only read the gate's flag and never
// wait on that lock.

use crate::view::{DocumentSink, ViewHandle};
use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

/// Timestamp prefix used by WebSocket logs
pub const EVENT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// How events are rendered into the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// `<timestamp> - <text>`, CRLF normalised, one entry per line
    WebSocket,
    /// Raw text as the mock server produced it
    MockServer,
}

impl StreamMode {
    pub fn format(&self, event: &StreamEvent) -> String {
        match self {
            Self::WebSocket => {
                let mut line = format!(
                    "{} - {}",
                    event.at.format(EVENT_TIMESTAMP_FORMAT),
                    event.text.replace("\r\n", "\n")
                );
                if !line.ends_with('\n') {
                    line.push('\n');
                }
                line
            }
            Self::MockServer => event.text.clone(),
        }
    }
}

/// One text fragment from a live source
#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub text: String,
    /// When `deliver` was called
    pub at: DateTime<Local>,
}

enum Message {
    Event(StreamEvent),
    /// Resolved once everything queued before it has been handled
    Settle(oneshot::Sender<()>),
}

/// Open while the owning session is live
///
/// `open` only flips from true to false, and only while `apply` is held.
#[derive(Debug)]
struct Gate {
    open: AtomicBool,
    apply: Mutex<()>,
}

impl Gate {
    fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            apply: Mutex::new(()),
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.apply.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Waits for an in-flight apply to finish
    fn close(&self) {
        let _apply = self.lock();
        self.open.store(false, Ordering::Release);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Appender
// ─────────────────────────────────────────────────────────────────────────────

/// Producer-side handle; cheap to clone and safe to use from any task
#[derive(Clone)]
pub struct StreamAppender {
    tx: mpsc::UnboundedSender<Message>,
    gate: Arc<Gate>,
    mode: StreamMode,
}

impl std::fmt::Debug for StreamAppender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAppender")
            .field("mode", &self.mode)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl StreamAppender {
    /// Bind a new appender to `sink` and start its drain task on `runtime`
    pub fn spawn(
        sink: Arc<dyn DocumentSink>,
        mode: StreamMode,
        runtime: &Handle,
    ) -> (Self, StreamSubscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = Arc::new(Gate::new());

        runtime.spawn(drain(rx, sink, mode, Arc::clone(&gate)));

        let appender = Self {
            tx,
            gate: Arc::clone(&gate),
            mode,
        };
        (appender, StreamSubscription { gate })
    }

    /// Queue `text` for the log
    ///
    /// Never waits on the sink. Returns `false` when the session is gone and the event
    /// was dropped.
    pub fn deliver(&self, text: impl Into<String>) -> bool {
        if self.is_closed() {
            return false;
        }

        let event = StreamEvent {
            text: text.into(),
            at: Local::now(),
        };
        self.tx.send(Message::Event(event)).is_ok()
    }

    /// Wait until every event delivered before this call was applied or dropped
    pub async fn settled(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Message::Settle(done_tx)).is_ok() {
            // Drain task gone means nothing is pending either
            let _ = done_rx.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        !self.gate.is_open()
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }
}

async fn drain(
    mut rx: mpsc::UnboundedReceiver<Message>,
    sink: Arc<dyn DocumentSink>,
    mode: StreamMode,
    gate: Arc<Gate>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            Message::Event(event) => {
                let _apply = gate.lock();
                if !gate.is_open() {
                    break;
                }
                sink.insert_at_end(&mode.format(&event));
                sink.move_cursor_to_end();
                sink.scroll_to_cursor();
            }
            Message::Settle(done) => {
                let _ = done.send(());
            }
        }
    }

    // Unblock anyone still waiting on a settle queued behind the close
    rx.close();
    while let Ok(message) = rx.try_recv() {
        if let Message::Settle(done) = message {
            let _ = done.send(());
        }
    }

    tracing::trace!(mode = ?mode, "Stream drain task finished");
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscription
// ─────────────────────────────────────────────────────────────────────────────

/// Session-side handle; releasing it ends the stream
#[derive(Debug)]
pub struct StreamSubscription {
    gate: Arc<Gate>,
}

impl StreamSubscription {
    pub fn is_released(&self) -> bool {
        !self.gate.is_open()
    }
}

impl ViewHandle for StreamSubscription {
    fn release(&self) {
        self.gate.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::memory::MemoryViews;
    use crate::view::{as_sink, ViewFactory};
    use chrono::TimeZone;

    fn log_sink(views: &MemoryViews, name: &str) -> Arc<dyn DocumentSink> {
        as_sink(views.log_view(name))
    }

    #[test]
    fn test_websocket_format() {
        let event = StreamEvent {
            text: "hello\r\nworld".to_string(),
            at: Local
                .with_ymd_and_hms(2025, 1, 2, 3, 4, 5)
                .single()
                .unwrap(),
        };
        assert_eq!(
            StreamMode::WebSocket.format(&event),
            "2025-01-02 03:04:05,000 - hello\nworld\n"
        );
        assert_eq!(StreamMode::MockServer.format(&event), "hello\r\nworld");
    }

    #[tokio::test]
    async fn test_events_applied_in_delivery_order() {
        let views = MemoryViews::new();
        let (appender, _sub) = StreamAppender::spawn(
            log_sink(&views, "mock"),
            StreamMode::MockServer,
            &Handle::current(),
        );

        for part in ["e1 ", "e2 ", "e3"] {
            assert!(appender.deliver(part));
        }
        appender.settled().await;

        let state = views.find("mock").unwrap().state();
        assert_eq!(state.content, "e1 e2 e3");
        assert!(state.is_following());
        assert_eq!(state.scroll_log, vec![(3, 3), (6, 6), (8, 8)]);
    }

    #[tokio::test]
    async fn test_concurrent_producer_order_preserved() {
        let views = MemoryViews::new();
        let (appender, _sub) = StreamAppender::spawn(
            log_sink(&views, "mock"),
            StreamMode::MockServer,
            &Handle::current(),
        );

        let producer = appender.clone();
        tokio::spawn(async move {
            for i in 0..50 {
                producer.deliver(format!("{},", i));
                if i % 7 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
        .await
        .unwrap();
        appender.settled().await;

        let expected: String = (0..50).map(|i| format!("{},", i)).collect();
        assert_eq!(views.find("mock").unwrap().content(), expected);
    }

    #[tokio::test]
    async fn test_deliver_after_release_is_noop() {
        let views = MemoryViews::new();
        let (appender, sub) = StreamAppender::spawn(
            log_sink(&views, "ws"),
            StreamMode::WebSocket,
            &Handle::current(),
        );

        sub.release();
        sub.release();

        assert!(!appender.deliver("late"));
        appender.settled().await;

        let state = views.find("ws").unwrap().state();
        assert!(state.content.is_empty());
        assert!(state.scroll_log.is_empty());
        assert!(sub.is_released());
    }

    /// Sink whose inserts take a while, like a busy UI thread
    #[derive(Default)]
    struct SlowSink {
        entered: AtomicBool,
        content: Mutex<String>,
    }

    impl DocumentSink for SlowSink {
        fn insert_at_end(&self, text: &str) {
            self.entered.store(true, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(300));
            self.content.lock().unwrap().push_str(text);
        }
        fn move_cursor_to_end(&self) {}
        fn scroll_to_cursor(&self) {}
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deliver_does_not_wait_for_slow_sink() {
        let sink = Arc::new(SlowSink::default());
        let (appender, _sub) = StreamAppender::spawn(
            Arc::clone(&sink) as Arc<dyn DocumentSink>,
            StreamMode::MockServer,
            &Handle::current(),
        );

        assert!(appender.deliver("one "));
        while !sink.entered.load(Ordering::SeqCst) {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let started = std::time::Instant::now();
        assert!(appender.deliver("two"));
        assert!(!appender.is_closed());
        assert!(started.elapsed() < std::time::Duration::from_millis(100));

        appender.settled().await;
        assert_eq!(*sink.content.lock().unwrap(), "one two");
    }

    #[tokio::test]
    async fn test_queued_events_dropped_once_released() {
        let views = MemoryViews::new();
        let (appender, sub) = StreamAppender::spawn(
            log_sink(&views, "ws"),
            StreamMode::MockServer,
            &Handle::current(),
        );

        // Current-thread runtime: the drain task cannot run before the release
        appender.deliver("queued");
        sub.release();
        appender.settled().await;

        assert!(views.find("ws").unwrap().content().is_empty());
    }
}
