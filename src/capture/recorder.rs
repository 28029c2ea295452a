// Session recorder
//
// A driver task appends instrumentation events to the session buffer in
// arrival order and flushes it on a fixed period. A flush only hands the
// buffer to the sink when it holds a full snapshot; otherwise the buffer is
// kept so a later flush can deliver a replayable session.

use super::sink::CaptureSink;
use super::source::InstrumentationSource;
use super::types::{
    CaptureState, CaptureStats, CapturedEvent, FlushOutcome, FlushReason, RecordingSession,
    SessionPayloadRef,
};
use parking_lot::Mutex;
use std::future::poll_fn;
use std::sync::Arc;
use std::task::Poll;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default period between automatic flushes
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub flush_interval: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

struct Shared {
    session: Mutex<RecordingSession>,
    /// Subscription to the source. Taken by whichever shutdown path runs first.
    events: Mutex<Option<mpsc::UnboundedReceiver<CapturedEvent>>>,
    stats: Mutex<CaptureStats>,
    state: Mutex<CaptureState>,
    sink: Arc<dyn CaptureSink>,
}

impl Shared {
    fn record(&self, event: CapturedEvent) {
        self.session.lock().push(event);
        self.stats.lock().events_captured += 1;
    }

    /// Next event from the source. The lock is only held while polling.
    async fn next_event(&self) -> Option<CapturedEvent> {
        poll_fn(|cx| match self.events.lock().as_mut() {
            Some(events) => events.poll_recv(cx),
            None => Poll::Ready(None),
        })
        .await
    }

    /// Unsubscribe and move every event already emitted into the buffer
    fn drain_source(&self) -> usize {
        let Some(mut events) = self.events.lock().take() else {
            return 0;
        };

        events.close();
        let mut drained = 0;
        while let Ok(event) = events.try_recv() {
            self.record(event);
            drained += 1;
        }
        drained
    }

    fn flush(&self, reason: FlushReason) -> FlushOutcome {
        let (body, count) = {
            let mut session = self.session.lock();
            if session.is_empty() {
                return FlushOutcome::Empty;
            }

            let buffered = session.len();
            if !session.has_full_snapshot() {
                self.stats.lock().flushes_skipped += 1;
                warn!(
                    "No full snapshot among {} buffered events, session not sent ({:?})",
                    buffered, reason
                );
                return FlushOutcome::MissingSnapshot { buffered };
            }

            let body = match serde_json::to_vec(&SessionPayloadRef {
                events: session.events(),
            }) {
                Ok(body) => body,
                Err(e) => {
                    warn!("Failed to encode session: {}", e);
                    return FlushOutcome::Unserializable { buffered };
                }
            };

            session.take();
            (body, buffered)
        };

        if reason == FlushReason::Teardown {
            self.sink.deliver_on_teardown(body, count);
        } else {
            self.sink.deliver(body, count);
        }

        let mut stats = self.stats.lock();
        stats.flushes_delivered += 1;
        stats.events_delivered += count as u64;
        debug!("Flushed {} session events ({:?})", count, reason);

        FlushOutcome::Delivered { events: count }
    }

    /// Move out of `Recording`. Returns false if already left.
    fn leave_recording(&self, next: CaptureState) -> bool {
        let mut state = self.state.lock();
        if *state != CaptureState::Recording {
            return false;
        }
        *state = next;
        true
    }
}

/// Records instrumentation events into deliverable sessions
pub struct RecordingCapture {
    config: CaptureConfig,
    source: Arc<dyn InstrumentationSource>,
}

impl RecordingCapture {
    /// A zero flush interval falls back to the default
    pub fn new(config: CaptureConfig, source: Arc<dyn InstrumentationSource>) -> Self {
        let config = if config.flush_interval.is_zero() {
            warn!(
                "Capture flush interval must be non-zero, using {:?}",
                DEFAULT_FLUSH_INTERVAL
            );
            CaptureConfig::default()
        } else {
            config
        };
        Self { config, source }
    }

    /// Subscribe to the source, request a full snapshot and start the
    /// periodic flush.
    pub fn start(&self, sink: Arc<dyn CaptureSink>) -> CaptureHandle {
        let id = uuid::Uuid::new_v4().to_string();
        let shared = Arc::new(Shared {
            session: Mutex::new(RecordingSession::new()),
            events: Mutex::new(Some(self.source.subscribe())),
            stats: Mutex::new(CaptureStats::default()),
            state: Mutex::new(CaptureState::Recording),
            sink,
        });
        let cancel = CancellationToken::new();

        self.source.request_full_snapshot();

        info!(
            "Starting session capture {} (flush every {:?})",
            id, self.config.flush_interval
        );
        let task = tokio::spawn(run_driver(
            id.clone(),
            Arc::clone(&shared),
            self.config.flush_interval,
            cancel.clone(),
        ));

        CaptureHandle {
            id,
            shared,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }
}

/// Owner handle of one running capture
pub struct CaptureHandle {
    id: String,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<Option<FlushOutcome>>>>,
}

impl CaptureHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Flush immediately, subject to the snapshot requirement
    pub fn flush_now(&self) -> FlushOutcome {
        self.shared.flush(FlushReason::Manual)
    }

    pub fn buffered(&self) -> usize {
        self.shared.session.lock().len()
    }

    pub fn stats(&self) -> CaptureStats {
        self.shared.stats.lock().clone()
    }

    pub fn state(&self) -> CaptureState {
        *self.shared.state.lock()
    }

    /// Cancel the periodic flush, unsubscribe and flush what remains.
    /// Returns `None` if the capture was already stopped or torn down.
    pub async fn stop(&self) -> Option<FlushOutcome> {
        if !self.shared.leave_recording(CaptureState::Stopped) {
            return None;
        }
        self.cancel.cancel();

        let task = self.task.lock().take();
        match task {
            Some(task) => match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Capture driver {} ended abnormally: {}", self.id, e);
                    None
                }
            },
            None => None,
        }
    }

    /// Synchronous final flush for host teardown. Runs at most once and
    /// never waits on the driver. Events the source emitted but the driver
    /// has not consumed yet are included.
    pub fn teardown(&self) -> Option<FlushOutcome> {
        if !self.shared.leave_recording(CaptureState::TornDown) {
            return None;
        }
        self.cancel.cancel();

        let drained = self.shared.drain_source();
        info!(
            "Tearing down session capture {} ({} pending events drained)",
            self.id, drained
        );
        Some(self.shared.flush(FlushReason::Teardown))
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_driver(
    id: String,
    shared: Arc<Shared>,
    period: Duration,
    cancel: CancellationToken,
) -> Option<FlushOutcome> {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut source_open = true;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            _ = ticker.tick() => {
                shared.flush(FlushReason::Periodic);
            }

            event = shared.next_event(), if source_open => match event {
                Some(event) => shared.record(event),
                None => {
                    warn!("Instrumentation source for capture {} ended", id);
                    source_open = false;
                }
            },
        }
    }

    // Keep events the source emitted before the stop
    shared.drain_source();

    if *shared.state.lock() == CaptureState::TornDown {
        debug!("Capture {} torn down, skipping final flush", id);
        return None;
    }

    // Dropped handle without an explicit stop
    shared.leave_recording(CaptureState::Stopped);

    let outcome = shared.flush(FlushReason::Stop);
    info!("Session capture {} stopped: {:?}", id, outcome);
    Some(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::sink::testing::RecordingSink;
    use crate::capture::source::CaptureHub;
    use serde_json::{json, Map};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::advance;

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn incremental(n: u64) -> CapturedEvent {
        let mut payload = Map::new();
        payload.insert("seq".to_string(), json!(n));
        CapturedEvent::new(3, payload)
    }

    fn hub_with_snapshots() -> CaptureHub {
        let hub = CaptureHub::new();
        hub.set_snapshot_provider(|| Some(CapturedEvent::full_snapshot(Map::new())));
        hub
    }

    fn start(hub: &CaptureHub) -> (Arc<RecordingSink>, CaptureHandle) {
        let sink = Arc::new(RecordingSink::default());
        let capture = RecordingCapture::new(CaptureConfig::default(), Arc::new(hub.clone()));
        let handle = capture.start(sink.clone());
        (sink, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_flush_delivers_and_clears() {
        let hub = hub_with_snapshots();
        let (sink, handle) = start(&hub);

        hub.emit(incremental(1));
        hub.emit(incremental(2));
        settle().await;
        assert_eq!(handle.buffered(), 3);

        advance(Duration::from_millis(9_999)).await;
        settle().await;
        assert_eq!(sink.count(), 0);

        advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(sink.count(), 1);
        assert_eq!(handle.buffered(), 0);

        let (body, teardown) = sink.last().unwrap();
        assert!(!teardown);
        let events = body["events"].as_array().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0]["type"], json!(2));
        assert_eq!(events[2]["seq"], json!(2));

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_without_snapshot_keeps_buffer() {
        let hub = CaptureHub::new();
        let (sink, handle) = start(&hub);

        hub.emit(incremental(1));
        hub.emit(incremental(2));
        settle().await;

        advance(DEFAULT_FLUSH_INTERVAL).await;
        settle().await;
        assert_eq!(sink.count(), 0);
        assert_eq!(handle.buffered(), 2);
        assert_eq!(handle.stats().flushes_skipped, 1);

        hub.emit(CapturedEvent::full_snapshot(Map::new()));
        settle().await;
        assert_eq!(handle.flush_now(), FlushOutcome::Delivered { events: 3 });
        assert_eq!(handle.buffered(), 0);
        assert_eq!(sink.count(), 1);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_flush_is_noop() {
        let hub = CaptureHub::new();
        let (sink, handle) = start(&hub);
        settle().await;

        assert_eq!(handle.flush_now(), FlushOutcome::Empty);
        advance(DEFAULT_FLUSH_INTERVAL * 3).await;
        settle().await;
        assert_eq!(sink.count(), 0);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_requests_snapshot_after_subscribing() {
        let hub = CaptureHub::new();
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&requests);
        hub.set_snapshot_provider(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(CapturedEvent::full_snapshot(Map::new()))
        });

        let (_sink, handle) = start(&hub);
        settle().await;

        assert_eq!(requests.load(Ordering::SeqCst), 1);
        assert_eq!(handle.buffered(), 1);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_flushes_and_unsubscribes() {
        let hub = hub_with_snapshots();
        let (sink, handle) = start(&hub);

        hub.emit(incremental(1));
        let outcome = handle.stop().await;

        assert_eq!(outcome, Some(FlushOutcome::Delivered { events: 2 }));
        assert_eq!(sink.count(), 1);
        assert_eq!(handle.state(), CaptureState::Stopped);
        assert_eq!(hub.emit(incremental(2)), 0);

        advance(DEFAULT_FLUSH_INTERVAL * 2).await;
        settle().await;
        assert_eq!(sink.count(), 1);
        assert_eq!(handle.stop().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_flushes_once_through_teardown_path() {
        let hub = hub_with_snapshots();
        let (sink, handle) = start(&hub);
        hub.emit(incremental(1));
        settle().await;

        assert_eq!(
            handle.teardown(),
            Some(FlushOutcome::Delivered { events: 2 })
        );
        assert_eq!(handle.teardown(), None);
        assert_eq!(handle.stop().await, None);

        settle().await;
        assert_eq!(sink.count(), 1);
        let (_, teardown) = sink.last().unwrap();
        assert!(teardown);
        assert_eq!(handle.state(), CaptureState::TornDown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_includes_events_not_yet_consumed() {
        let hub = hub_with_snapshots();
        let (sink, handle) = start(&hub);
        hub.emit(incremental(1));
        hub.emit(incremental(2));

        assert_eq!(
            handle.teardown(),
            Some(FlushOutcome::Delivered { events: 3 })
        );
        assert_eq!(handle.stats().events_captured, 3);
        assert_eq!(handle.buffered(), 0);
        assert_eq!(hub.emit(incremental(3)), 0);

        settle().await;
        assert_eq!(sink.count(), 1);
        let (body, teardown) = sink.last().unwrap();
        assert!(teardown);
        let events = body["events"].as_array().unwrap();
        assert_eq!(events[0]["type"], json!(2));
        assert_eq!(events[2]["seq"], json!(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_flush_interval_falls_back_to_default() {
        let hub = hub_with_snapshots();
        let sink = Arc::new(RecordingSink::default());
        let capture = RecordingCapture::new(
            CaptureConfig {
                flush_interval: Duration::ZERO,
            },
            Arc::new(hub.clone()),
        );
        let handle = capture.start(sink.clone());
        settle().await;

        advance(DEFAULT_FLUSH_INTERVAL - Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(sink.count(), 0);

        advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(sink.count(), 1);

        handle.stop().await;
    }
}
