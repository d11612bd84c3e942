//! Observable values.
//!
//! A `Store<T>` holds one value. Writers replace or modify it; every write
//! notifies synchronous listeners (used to wire dependent stores together)
//! and publishes to a `tokio::sync::watch` channel for async consumers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct Store<T> {
    tx: watch::Sender<T>,
    listeners: Mutex<Vec<Listener<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Store<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Self {
            tx,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Read the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Receiver that observes every subsequent write.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
        self.notify();
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
        self.notify();
    }

    /// Register a listener called after every write.
    pub fn listen(&self, listener: impl Fn(&T) + Send + Sync + 'static) {
        self.listeners.lock().push(Arc::new(listener));
    }

    // Listeners run outside the lock so they may write to other stores.
    fn notify(&self) {
        let value = self.get();
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener(&value);
        }
    }
}

/// Monotonic counter used to drop results of superseded async work.
#[derive(Debug, Default)]
pub struct Generation(AtomicU64);

impl Generation {
    /// Invalidate everything started before this call.
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}
