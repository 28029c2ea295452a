// Progressive reveal of large result sets
//
// The full set is available up front. A timer task moves one fixed-size chunk
// per tick from the pending queue into the revealed sequence so the view can
// render incrementally. Every reveal carries a generation number; ticks from a
// superseded reveal never touch the accumulator.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_CHUNK_SIZE: usize = 50;
pub const DEFAULT_REVEAL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct RevealConfig {
    pub chunk_size: usize,
    pub interval: Duration,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            interval: DEFAULT_REVEAL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealProgress {
    pub revealed: usize,
    pub total: usize,
}

impl RevealProgress {
    pub fn is_complete(&self) -> bool {
        self.revealed >= self.total
    }
}

type ProgressCallback = Arc<dyn Fn(RevealProgress) + Send + Sync>;

struct RevealState<T> {
    generation: u64,
    pending: VecDeque<T>,
    revealed: Vec<T>,
    total: usize,
    cancel: Option<CancellationToken>,
}

impl<T> RevealState<T> {
    fn progress(&self) -> RevealProgress {
        RevealProgress {
            revealed: self.revealed.len(),
            total: self.total,
        }
    }
}

/// Stops one reveal without clearing what it already revealed
#[derive(Debug, Clone)]
pub struct RevealCancel {
    generation: u64,
    token: CancellationToken,
}

impl RevealCancel {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub struct BatchRevealer<T> {
    config: RevealConfig,
    state: Arc<Mutex<RevealState<T>>>,
    progress_callback: Arc<RwLock<Option<ProgressCallback>>>,
}

impl<T: Send + 'static> BatchRevealer<T> {
    /// Chunk size is clamped to at least 1; a zero interval falls back to
    /// the default
    pub fn new(config: RevealConfig) -> Self {
        let interval = if config.interval.is_zero() {
            warn!(
                "Reveal interval must be non-zero, using {:?}",
                DEFAULT_REVEAL_INTERVAL
            );
            DEFAULT_REVEAL_INTERVAL
        } else {
            config.interval
        };
        let config = RevealConfig {
            chunk_size: config.chunk_size.max(1),
            interval,
        };

        Self {
            config,
            state: Arc::new(Mutex::new(RevealState {
                generation: 0,
                pending: VecDeque::new(),
                revealed: Vec::new(),
                total: 0,
                cancel: None,
            })),
            progress_callback: Arc::new(RwLock::new(None)),
        }
    }

    /// Set the callback invoked after every revealed chunk
    pub fn on_progress<F>(&self, callback: F)
    where
        F: Fn(RevealProgress) + Send + Sync + 'static,
    {
        *self.progress_callback.write() = Some(Arc::new(callback));
    }

    /// Start revealing `items`, superseding any reveal in progress
    pub fn reveal(&self, items: Vec<T>) -> RevealCancel {
        let token = CancellationToken::new();
        let (generation, progress) = {
            let mut state = self.state.lock();
            if let Some(previous) = state.cancel.take() {
                previous.cancel();
            }

            state.generation += 1;
            state.total = items.len();
            state.pending = items.into();
            state.revealed.clear();
            state.cancel = Some(token.clone());
            (state.generation, state.progress())
        };

        debug!(
            "Revealing {} items in chunks of {} (generation {})",
            progress.total, self.config.chunk_size, generation
        );
        self.notify(progress);

        if progress.is_complete() {
            token.cancel();
        } else {
            tokio::spawn(run_reveal(
                generation,
                self.config.clone(),
                Arc::clone(&self.state),
                Arc::clone(&self.progress_callback),
                token.clone(),
            ));
        }

        RevealCancel { generation, token }
    }

    /// Stop the current reveal, keeping what is already revealed
    pub fn cancel(&self) {
        if let Some(token) = self.state.lock().cancel.as_ref() {
            token.cancel();
        }
    }

    pub fn progress(&self) -> RevealProgress {
        self.state.lock().progress()
    }

    pub fn is_complete(&self) -> bool {
        self.progress().is_complete()
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    fn notify(&self, progress: RevealProgress) {
        notify(&self.progress_callback, progress);
    }
}

impl<T: Clone + Send + 'static> BatchRevealer<T> {
    /// Elements revealed so far, in input order
    pub fn revealed(&self) -> Vec<T> {
        self.state.lock().revealed.clone()
    }
}

impl<T> Drop for BatchRevealer<T> {
    fn drop(&mut self) {
        if let Some(token) = self.state.lock().cancel.as_ref() {
            token.cancel();
        }
    }
}

async fn run_reveal<T: Send + 'static>(
    generation: u64,
    config: RevealConfig,
    state: Arc<Mutex<RevealState<T>>>,
    progress_callback: Arc<RwLock<Option<ProgressCallback>>>,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            _ = ticker.tick() => {
                let progress = {
                    let mut state = state.lock();
                    if state.generation != generation {
                        break;
                    }

                    let take = config.chunk_size.min(state.pending.len());
                    let chunk: Vec<T> = state.pending.drain(..take).collect();
                    state.revealed.extend(chunk);
                    state.progress()
                };

                notify(&progress_callback, progress);

                if progress.is_complete() {
                    debug!("Reveal generation {} complete ({} items)", generation, progress.total);
                    break;
                }
            }
        }
    }
}

/// The callback runs without the registration lock held, so it may replace
/// itself through `on_progress`
fn notify(callback: &RwLock<Option<ProgressCallback>>, progress: RevealProgress) {
    let callback = callback.read().clone();
    if let Some(callback) = callback {
        callback(progress);
    }
}
