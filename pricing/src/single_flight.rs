//! Request coalescing: one in-flight computation per key.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

type Registry<K, T> = Arc<Mutex<HashMap<K, watch::Receiver<Option<T>>>>>;

/// Coalesces concurrent requests for the same key onto one computation.
///
/// The computation runs on its own task, so it keeps going when every
/// waiter gives up; its result is delivered to whoever is still waiting and
/// the key is released once it completes. A computation that panics
/// releases the key too, with every waiter observing `None`.
pub struct SingleFlightGroup<K, T> {
    calls: Registry<K, T>,
}

impl<K, T> Clone for SingleFlightGroup<K, T> {
    fn clone(&self) -> Self {
        Self {
            calls: Arc::clone(&self.calls),
        }
    }
}

impl<K, T> Default for SingleFlightGroup<K, T> {
    fn default() -> Self {
        Self {
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, T> SingleFlightGroup<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the computation for `key`, starting it with `work` if none is running.
    ///
    /// `work` is only invoked by the caller that becomes the leader.
    pub fn join<F, Fut>(&self, key: K, work: F) -> Flight<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut calls = self.calls.lock();

        if let Some(rx) = calls.get(&key) {
            // A dead sender means the previous leader panicked.
            if rx.has_changed().is_ok() {
                return Flight {
                    rx: rx.clone(),
                    leader: false,
                };
            }
        }

        let (tx, rx) = watch::channel(None);
        calls.insert(key.clone(), rx.clone());
        drop(calls);

        let registry = Arc::clone(&self.calls);
        let fut = work();
        tokio::spawn(async move {
            let value = fut.await;
            // Publish before releasing the key so late joiners read the value.
            let _ = tx.send(Some(value));
            registry.lock().remove(&key);
        });

        Flight { rx, leader: true }
    }

    /// Number of computations currently running.
    pub fn in_flight(&self) -> usize {
        self.calls
            .lock()
            .values()
            .filter(|rx| rx.has_changed().is_ok())
            .count()
    }
}

/// A caller's handle on a shared computation.
pub struct Flight<T> {
    rx: watch::Receiver<Option<T>>,
    leader: bool,
}

impl<T: Clone> Flight<T> {
    /// Whether this caller started the computation.
    pub fn is_leader(&self) -> bool {
        self.leader
    }

    /// Wait for the shared result; `None` if the computation panicked.
    ///
    /// Dropping the returned future abandons the wait, not the computation.
    pub async fn wait(mut self) -> Option<T> {
        let value = match self.rx.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => {
                debug!("Shared computation ended without a result");
                None
            }
        };
        value
    }
}
