// Live feed consumer
//
// One driver task per connection owns every timer of the consumer:
// - the debounce deadline for consumer notifications
// - the reconnect deadline after a transport drop
//
// Every received record lands in the rolling window immediately. Only the
// notification of the latest record in a burst is debounced.

use crate::auth::CredentialProvider;
use crate::stream::debounce::{Debouncer, DEFAULT_DEBOUNCE};
use crate::stream::transport::{feed_url, FeedEvent, FeedTransport};
use crate::stream::types::{ConnectionState, LiveSummary, StreamRecord, StreamResult, StreamStats};
use crate::window::{RollingWindow, DEFAULT_WINDOW_CAPACITY};
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default delay before reopening a dropped connection
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default number of records used for the live anomaly summary
pub const DEFAULT_SUMMARY_SPAN: usize = 10;

type RecordCallback = Arc<dyn Fn(&StreamRecord) + Send + Sync>;
type StateCallback = Arc<dyn Fn(&ConnectionState) + Send + Sync>;
type ConnectFuture = Pin<Box<dyn Future<Output = StreamResult<mpsc::Receiver<FeedEvent>>> + Send>>;

/// Live feed consumer configuration
#[derive(Debug, Clone)]
pub struct StreamConsumerConfig {
    /// Websocket base, e.g. `ws://localhost:8000`
    pub ws_base: String,
    pub debounce: Duration,
    pub reconnect_delay: Duration,
    pub window_capacity: usize,
}

impl Default for StreamConsumerConfig {
    fn default() -> Self {
        Self {
            ws_base: "ws://localhost:8000".to_string(),
            debounce: DEFAULT_DEBOUNCE,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            window_capacity: DEFAULT_WINDOW_CAPACITY,
        }
    }
}

/// State shared between the driver task and its handle
struct Shared {
    window: RwLock<RollingWindow<StreamRecord>>,
    state: RwLock<ConnectionState>,
    stats: Mutex<StreamStats>,
}

/// Factory for live feed connections
pub struct StreamConsumer {
    config: StreamConsumerConfig,
    transport: Arc<dyn FeedTransport>,
    record_callback: Arc<RwLock<Option<RecordCallback>>>,
    state_callback: Arc<RwLock<Option<StateCallback>>>,
}

impl StreamConsumer {
    pub fn new(config: StreamConsumerConfig, transport: Arc<dyn FeedTransport>) -> Self {
        Self {
            config,
            transport,
            record_callback: Arc::new(RwLock::new(None)),
            state_callback: Arc::new(RwLock::new(None)),
        }
    }

    /// Set the callback receiving debounced records. Callbacks run without
    /// any consumer lock held and may replace themselves.
    pub fn on_record<F>(&self, callback: F)
    where
        F: Fn(&StreamRecord) + Send + Sync + 'static,
    {
        *self.record_callback.write() = Some(Arc::new(callback));
    }

    /// Set the callback observing connection state transitions
    pub fn on_state<F>(&self, callback: F)
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        *self.state_callback.write() = Some(Arc::new(callback));
    }

    /// Open the live feed. The connection is kept alive until the returned
    /// handle is closed or dropped.
    pub fn connect(&self, credentials: Arc<dyn CredentialProvider>) -> StreamHandle {
        let id = uuid::Uuid::new_v4().to_string();
        let shared = Arc::new(Shared {
            window: RwLock::new(RollingWindow::new(self.config.window_capacity)),
            state: RwLock::new(ConnectionState::Connecting),
            stats: Mutex::new(StreamStats::default()),
        });
        let cancel = CancellationToken::new();

        let driver = Driver {
            id: id.clone(),
            config: self.config.clone(),
            transport: Arc::clone(&self.transport),
            credentials,
            shared: Arc::clone(&shared),
            record_callback: Arc::clone(&self.record_callback),
            state_callback: Arc::clone(&self.state_callback),
            cancel: cancel.clone(),
            debounce: Debouncer::new(self.config.debounce),
            attempt: 0,
        };

        info!("Starting live feed consumer {}", id);
        let task = tokio::spawn(driver.run());

        StreamHandle {
            id,
            shared,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }
}

/// Owner handle of one live feed connection
pub struct StreamHandle {
    id: String,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Window contents, newest first
    pub fn window(&self) -> Vec<StreamRecord> {
        self.shared.window.read().snapshot()
    }

    pub fn latest(&self) -> Option<StreamRecord> {
        self.shared.window.read().latest().cloned()
    }

    /// Anomaly breakdown over the newest `span` records
    pub fn summary(&self, span: usize) -> LiveSummary {
        let window = self.shared.window.read();
        let mut summary = LiveSummary {
            considered: 0,
            anomalies: 0,
            normal: 0,
        };
        for record in window.recent(span) {
            summary.considered += 1;
            if record.is_anomaly() {
                summary.anomalies += 1;
            } else {
                summary.normal += 1;
            }
        }
        summary
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.read().clone()
    }

    pub fn stats(&self) -> StreamStats {
        self.shared.stats.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel both timers and terminate the connection. No notification is
    /// delivered once this returns.
    pub async fn close(&self) {
        self.cancel.cancel();

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Live feed driver {} ended abnormally: {}", self.id, e);
            }
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Driver {
    id: String,
    config: StreamConsumerConfig,
    transport: Arc<dyn FeedTransport>,
    credentials: Arc<dyn CredentialProvider>,
    shared: Arc<Shared>,
    record_callback: Arc<RwLock<Option<RecordCallback>>>,
    state_callback: Arc<RwLock<Option<StateCallback>>>,
    cancel: CancellationToken,
    debounce: Debouncer<StreamRecord>,
    attempt: u64,
}

impl Driver {
    async fn run(mut self) {
        let mut connecting: Option<ConnectFuture> = Some(self.begin_connect());
        let mut feed: Option<mpsc::Receiver<FeedEvent>> = None;
        let mut reconnect_at: Option<Instant> = None;

        loop {
            let debounce_at = self.debounce.deadline();

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                _ = sleep_opt(debounce_at) => self.dispatch_pending(),

                result = await_connect(&mut connecting) => {
                    connecting = None;
                    match result {
                        Ok(rx) => {
                            info!("Live feed {} connected", self.id);
                            self.attempt = 0;
                            self.set_state(ConnectionState::Connected);
                            feed = Some(rx);
                        }
                        Err(e) => {
                            warn!("Live feed {} connection failed: {}", self.id, e);
                            reconnect_at = Some(self.schedule_reconnect());
                        }
                    }
                }

                event = recv_feed(&mut feed) => match event {
                    Some(FeedEvent::Frame(text)) => self.ingest(&text),
                    Some(FeedEvent::Error(e)) => {
                        warn!("Live feed {} transport error: {}", self.id, e);
                        feed = None;
                        reconnect_at = Some(self.schedule_reconnect());
                    }
                    None => {
                        warn!("Live feed {} closed", self.id);
                        feed = None;
                        reconnect_at = Some(self.schedule_reconnect());
                    }
                },

                _ = sleep_opt(reconnect_at) => {
                    reconnect_at = None;
                    connecting = Some(self.begin_connect());
                }
            }
        }

        // Dropping the receiver terminates the transport
        drop(feed);
        drop(connecting);
        if self.debounce.cancel().is_some() {
            debug!("Discarded pending notification on close");
        }
        self.set_state(ConnectionState::Closed);
        info!("Live feed consumer {} closed", self.id);
    }

    fn begin_connect(&mut self) -> ConnectFuture {
        self.shared.stats.lock().connection_attempts += 1;
        self.set_state(ConnectionState::Connecting);

        let transport = Arc::clone(&self.transport);
        let credentials = Arc::clone(&self.credentials);
        let ws_base = self.config.ws_base.clone();

        Box::pin(async move {
            let token = credentials.bearer_token().await?;
            let url = feed_url(&ws_base, token.as_deref())?;
            transport.open(&url).await
        })
    }

    fn schedule_reconnect(&mut self) -> Instant {
        self.attempt += 1;
        self.shared.stats.lock().reconnects_scheduled += 1;
        self.set_state(ConnectionState::Reconnecting {
            attempt: self.attempt,
        });

        info!(
            "Live feed {} reconnecting in {:?} (attempt {})",
            self.id, self.config.reconnect_delay, self.attempt
        );
        Instant::now() + self.config.reconnect_delay
    }

    fn ingest(&mut self, text: &str) {
        let record = match StreamRecord::from_frame(text) {
            Ok(record) => record,
            Err(e) => {
                self.shared.stats.lock().malformed_frames += 1;
                warn!("Dropping malformed live feed frame: {}", e);
                return;
            }
        };

        self.shared.window.write().push(record.clone());
        self.shared.stats.lock().records_received += 1;
        self.debounce.arm(record, Instant::now());
    }

    fn dispatch_pending(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }

        let Some(record) = self.debounce.fire() else {
            return;
        };

        self.shared.stats.lock().records_dispatched += 1;
        let callback = self.record_callback.read().clone();
        if let Some(callback) = callback {
            callback(&record);
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self.shared.state.write() = state.clone();
        let callback = self.state_callback.read().clone();
        if let Some(callback) = callback {
            callback(&state);
        }
    }
}

async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn await_connect(
    connecting: &mut Option<ConnectFuture>,
) -> StreamResult<mpsc::Receiver<FeedEvent>> {
    match connecting {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn recv_feed(feed: &mut Option<mpsc::Receiver<FeedEvent>>) -> Option<FeedEvent> {
    match feed {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthContext, StaticTokenSource};
    use async_trait::async_trait;
    use reqwest::Url;
    use tokio::time::advance;

    /// Transport whose connections are driven by the test
    #[derive(Default)]
    struct ScriptedTransport {
        senders: Mutex<Vec<Option<mpsc::Sender<FeedEvent>>>>,
        urls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn opens(&self) -> usize {
            self.urls.lock().len()
        }

        fn sender(&self, idx: usize) -> mpsc::Sender<FeedEvent> {
            self.senders.lock()[idx].clone().expect("connection dropped")
        }

        fn drop_connection(&self, idx: usize) {
            self.senders.lock()[idx] = None;
        }
    }

    #[async_trait]
    impl FeedTransport for ScriptedTransport {
        async fn open(&self, url: &Url) -> StreamResult<mpsc::Receiver<FeedEvent>> {
            let (tx, rx) = mpsc::channel(64);
            self.senders.lock().push(Some(tx));
            self.urls.lock().push(url.to_string());
            Ok(rx)
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn frame(seq: u64) -> FeedEvent {
        FeedEvent::Frame(format!(r#"{{"seq": {}, "anomaly": {}}}"#, seq, seq % 2))
    }

    fn seqs(records: &[StreamRecord]) -> Vec<u64> {
        records
            .iter()
            .map(|r| r.get("seq").and_then(|v| v.as_u64()).unwrap())
            .collect()
    }

    fn setup() -> (Arc<ScriptedTransport>, StreamConsumer, Arc<Mutex<Vec<StreamRecord>>>) {
        let transport = Arc::new(ScriptedTransport::default());
        let consumer = StreamConsumer::new(StreamConsumerConfig::default(), transport.clone());
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&delivered);
        consumer.on_record(move |record| sink.lock().push(record.clone()));
        (transport, consumer, delivered)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_delivers_only_latest_but_windows_all() {
        let (transport, consumer, delivered) = setup();
        let handle = consumer.connect(Arc::new(AuthContext::anonymous()));
        settle().await;
        assert_eq!(handle.state(), ConnectionState::Connected);

        let tx = transport.sender(0);
        tx.send(frame(1)).await.unwrap();
        settle().await;
        advance(Duration::from_millis(10)).await;
        tx.send(frame(2)).await.unwrap();
        settle().await;
        advance(Duration::from_millis(10)).await;
        tx.send(frame(3)).await.unwrap();
        settle().await;

        advance(Duration::from_millis(49)).await;
        settle().await;
        assert!(delivered.lock().is_empty());

        advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(seqs(&delivered.lock()), vec![3]);
        assert_eq!(seqs(&handle.window()), vec![3, 2, 1]);

        let stats = handle.stats();
        assert_eq!(stats.records_received, 3);
        assert_eq!(stats.records_dispatched, 1);

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_keeps_newest_hundred() {
        let (transport, consumer, _delivered) = setup();
        let handle = consumer.connect(Arc::new(AuthContext::anonymous()));
        settle().await;

        let tx = transport.sender(0);
        for seq in 0..150 {
            tx.send(frame(seq)).await.unwrap();
        }
        settle().await;

        let window = handle.window();
        assert_eq!(window.len(), 100);
        assert_eq!(seqs(&window)[0], 149);
        assert_eq!(seqs(&window)[99], 50);

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_reconnect_after_close_event() {
        let (transport, consumer, _delivered) = setup();
        let handle = consumer.connect(Arc::new(AuthContext::anonymous()));
        settle().await;
        assert_eq!(transport.opens(), 1);

        transport.drop_connection(0);
        settle().await;
        assert_eq!(handle.state(), ConnectionState::Reconnecting { attempt: 1 });

        advance(Duration::from_millis(4999)).await;
        settle().await;
        assert_eq!(transport.opens(), 1);

        advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(transport.opens(), 2);
        assert_eq!(handle.state(), ConnectionState::Connected);
        assert_eq!(handle.stats().reconnects_scheduled, 1);

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_reconnect() {
        let (transport, consumer, _delivered) = setup();
        let handle = consumer.connect(Arc::new(AuthContext::anonymous()));
        settle().await;

        transport.drop_connection(0);
        settle().await;

        handle.close().await;
        advance(Duration::from_secs(30)).await;
        settle().await;

        assert_eq!(transport.opens(), 1);
        assert_eq!(handle.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_during_debounce_suppresses_delivery() {
        let (transport, consumer, delivered) = setup();
        let handle = consumer.connect(Arc::new(AuthContext::anonymous()));
        settle().await;

        transport.sender(0).send(frame(7)).await.unwrap();
        settle().await;
        handle.close().await;

        advance(Duration::from_millis(200)).await;
        settle().await;

        assert!(delivered.lock().is_empty());
        assert_eq!(seqs(&handle.window()), vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frames_are_dropped() {
        let (transport, consumer, delivered) = setup();
        let handle = consumer.connect(Arc::new(AuthContext::anonymous()));
        settle().await;

        let tx = transport.sender(0);
        tx.send(FeedEvent::Frame("{not json".to_string())).await.unwrap();
        tx.send(FeedEvent::Frame("42".to_string())).await.unwrap();
        settle().await;
        advance(Duration::from_millis(100)).await;
        settle().await;

        assert!(handle.window().is_empty());
        assert!(delivered.lock().is_empty());
        assert_eq!(handle.stats().malformed_frames, 2);

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_fetched_per_connection() {
        let transport = Arc::new(ScriptedTransport::default());
        let consumer = StreamConsumer::new(StreamConsumerConfig::default(), transport.clone());
        let auth = AuthContext::new(Arc::new(StaticTokenSource::new("bearer-1")));
        let _session = auth.subscribe();

        let handle = consumer.connect(Arc::new(auth.clone()));
        settle().await;
        transport.drop_connection(0);
        settle().await;
        advance(DEFAULT_RECONNECT_DELAY).await;
        settle().await;

        let urls = transport.urls.lock().clone();
        assert_eq!(urls.len(), 2);
        assert!(urls
            .iter()
            .all(|u| u == "ws://localhost:8000/ws/stream?token=bearer-1"));
        assert_eq!(auth.session().unwrap().tokens_issued, 2);

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_credential_failure_schedules_reconnect() {
        let (transport, consumer, _delivered) = setup();
        // Token source present but no active session
        let auth = AuthContext::new(Arc::new(StaticTokenSource::new("t")));

        let handle = consumer.connect(Arc::new(auth));
        settle().await;

        assert_eq!(transport.opens(), 0);
        assert_eq!(handle.state(), ConnectionState::Reconnecting { attempt: 1 });
        assert_eq!(handle.stats().connection_attempts, 1);

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_counts_recent_anomalies() {
        let (transport, consumer, _delivered) = setup();
        let handle = consumer.connect(Arc::new(AuthContext::anonymous()));
        settle().await;

        let tx = transport.sender(0);
        for seq in 0..20 {
            tx.send(frame(seq)).await.unwrap();
        }
        settle().await;

        let summary = handle.summary(DEFAULT_SUMMARY_SPAN);
        assert_eq!(summary.considered, 10);
        assert_eq!(summary.anomalies, 5);
        assert_eq!(summary.normal, 5);

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_callback_may_replace_itself() {
        let transport = Arc::new(ScriptedTransport::default());
        let consumer = Arc::new(StreamConsumer::new(
            StreamConsumerConfig::default(),
            transport.clone(),
        ));
        let replaced = Arc::new(Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&consumer);
        let sink = Arc::clone(&replaced);
        consumer.on_record(move |_| {
            if let Some(consumer) = weak.upgrade() {
                let sink = Arc::clone(&sink);
                consumer.on_record(move |record| sink.lock().push(record.clone()));
            }
        });

        let handle = consumer.connect(Arc::new(AuthContext::anonymous()));
        settle().await;

        let tx = transport.sender(0);
        tx.send(frame(1)).await.unwrap();
        settle().await;
        advance(DEFAULT_DEBOUNCE).await;
        settle().await;
        assert!(replaced.lock().is_empty());

        tx.send(frame(2)).await.unwrap();
        settle().await;
        advance(DEFAULT_DEBOUNCE).await;
        settle().await;
        assert_eq!(seqs(&replaced.lock()), vec![2]);

        handle.close().await;
    }
}
