// Instrumentation sources
//
// A source pushes captured events to its subscribers. Dropping the receiver
// returned by `subscribe` unsubscribes.

use super::types::CapturedEvent;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

pub trait InstrumentationSource: Send + Sync {
    /// Start receiving events in emission order
    fn subscribe(&self) -> mpsc::UnboundedReceiver<CapturedEvent>;

    /// Ask for a full-state snapshot to be emitted. Sources that cannot
    /// produce one ignore the request.
    fn request_full_snapshot(&self) {}
}

type SnapshotProvider = Box<dyn Fn() -> Option<CapturedEvent> + Send + Sync>;

struct HubInner {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<CapturedEvent>>>,
    snapshot_provider: RwLock<Option<SnapshotProvider>>,
}

/// In-process instrumentation source fan-out
#[derive(Clone)]
pub struct CaptureHub {
    inner: Arc<HubInner>,
}

impl CaptureHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: Mutex::new(Vec::new()),
                snapshot_provider: RwLock::new(None),
            }),
        }
    }

    /// Install the function producing full-state snapshots on request
    pub fn set_snapshot_provider<F>(&self, provider: F)
    where
        F: Fn() -> Option<CapturedEvent> + Send + Sync + 'static,
    {
        *self.inner.snapshot_provider.write() = Some(Box::new(provider));
    }

    /// Send an event to every live subscriber. Returns how many received it.
    pub fn emit(&self, event: CapturedEvent) -> usize {
        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

impl Default for CaptureHub {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentationSource for CaptureHub {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<CapturedEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    fn request_full_snapshot(&self) {
        let snapshot = match self.inner.snapshot_provider.read().as_ref() {
            Some(provider) => provider(),
            None => {
                debug!("No snapshot provider installed, ignoring snapshot request");
                return;
            }
        };

        if let Some(event) = snapshot {
            self.emit(event);
        }
    }
}
