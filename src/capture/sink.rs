// Capture sinks
//
// A sink accepts a serialized session body and returns immediately. Delivery
// happens out of band and its result never reaches the capture.

use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Path of the session ingestion endpoint relative to the API base
pub const SESSION_PATH: &str = "/session";

pub trait CaptureSink: Send + Sync {
    /// Hand off a serialized `{"events": [...]}` body. Must not block.
    fn deliver(&self, body: Vec<u8>, events: usize);

    /// Delivery used when the host is going away
    fn deliver_on_teardown(&self, body: Vec<u8>, events: usize) {
        self.deliver(body, events)
    }
}

struct Beacon {
    body: Vec<u8>,
    events: usize,
}

/// Fire-and-forget HTTP delivery to `<api-base>/session`
pub struct HttpBeacon {
    endpoint: String,
    queue: Mutex<Option<mpsc::UnboundedSender<Beacon>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl HttpBeacon {
    /// Spawn the delivery worker. Requires a tokio runtime.
    pub fn spawn(client: Client, api_base: &str) -> Self {
        let endpoint = format!("{}{}", api_base.trim_end_matches('/'), SESSION_PATH);
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(client, endpoint.clone(), rx));

        Self {
            endpoint,
            queue: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Stop accepting beacons and wait up to `grace` for queued ones
    pub async fn shutdown(&self, grace: Duration) {
        drop(self.queue.lock().take());

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if tokio::time::timeout(grace, worker).await.is_err() {
                warn!("Session beacons still pending after {:?}, abandoning", grace);
            }
        }
    }
}

impl CaptureSink for HttpBeacon {
    fn deliver(&self, body: Vec<u8>, events: usize) {
        match self.queue.lock().as_ref() {
            Some(tx) => {
                if tx.send(Beacon { body, events }).is_err() {
                    warn!("Session beacon worker gone, dropping {} events", events);
                }
            }
            None => warn!("Session beacon shut down, dropping {} events", events),
        }
    }
}

async fn run_worker(client: Client, endpoint: String, mut rx: mpsc::UnboundedReceiver<Beacon>) {
    while let Some(beacon) = rx.recv().await {
        let result = client
            .post(&endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(beacon.body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!("Delivered session beacon with {} events", beacon.events);
            }
            Ok(response) => {
                warn!(
                    "Session endpoint rejected beacon ({} events): {}",
                    beacon.events,
                    response.status()
                );
            }
            Err(e) => warn!("Failed to send session beacon: {}", e),
        }
    }

    info!("Session beacon worker stopped");
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_endpoint_joins_api_base() {
        let beacon = HttpBeacon::spawn(Client::new(), "http://localhost:8000/");
        assert_eq!(beacon.endpoint(), "http://localhost:8000/session");
        beacon.shutdown(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn test_deliver_after_shutdown_is_dropped() {
        let beacon = HttpBeacon::spawn(Client::new(), "http://localhost:8000");
        beacon.shutdown(Duration::from_millis(100)).await;

        // Must not panic or block
        beacon.deliver(b"{\"events\":[]}".to_vec(), 0);
        assert!(beacon.queue.lock().is_none());
    }
}
