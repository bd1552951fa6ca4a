//! Replay-latest state holder.
//!
//! A `StateCell` owns the current value and a broadcast channel: `get` reads
//! the snapshot, `publish` swaps it and fans the new value out, and `watch`
//! yields the current value immediately followed by every subsequent publish.
//! Publication is synchronous and non-blocking.

use std::sync::RwLock;

use tokio::sync::broadcast;

/// Buffered publishes per subscriber before a slow watcher observes a lagged
/// stream.
const WATCH_CAPACITY: usize = 64;

/// A value cell whose subscribers replay the latest value.
pub struct StateCell<T> {
    latest: RwLock<T>,
    tx: broadcast::Sender<T>,
}

impl<T: Clone> StateCell<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            latest: RwLock::new(initial),
            tx,
        }
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> T {
        self.latest.read().expect("state cell lock poisoned").clone()
    }

    /// Replace the current value and fan it out to watchers. Watchers that
    /// have gone away are ignored.
    pub fn publish(&self, value: T) {
        // Holding the write lock across the send keeps publishes gapless
        // relative to `watch`.
        let mut latest = self.latest.write().expect("state cell lock poisoned");
        *latest = value.clone();
        let _ = self.tx.send(value);
    }

    /// Subscribe, receiving the current value immediately and then every
    /// future publish in order.
    pub fn watch(&self) -> StateWatch<T> {
        let latest = self.latest.read().expect("state cell lock poisoned");
        let rx = self.tx.subscribe();
        StateWatch {
            current: Some(latest.clone()),
            rx,
        }
    }
}

/// A subscription to a [`StateCell`].
pub struct StateWatch<T> {
    current: Option<T>,
    rx: broadcast::Receiver<T>,
}

impl<T: Clone> StateWatch<T> {
    /// The next value: first the snapshot taken at subscription, then each
    /// published value in order.
    pub async fn recv(&mut self) -> Result<T, broadcast::error::RecvError> {
        if let Some(value) = self.current.take() {
            return Ok(value);
        }
        self.rx.recv().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
