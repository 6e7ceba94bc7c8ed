//! Callback-style subscriptions over tokio broadcast channels.
//!
//! The session manager exposes two subscription shapes: the stream
//! `Subscriber` in `events`, and this registry for callers that want the
//! register/unregister pair. Unregistering stops delivery to that callback
//! without affecting other listeners.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use uuid::Uuid;

/// Handle identifying a registered callback.
pub type CallbackId = Uuid;

/// Trait bound for values delivered to callbacks.
pub trait CallbackData: Clone + Send + Sync + 'static {}

impl<T> CallbackData for T where T: Clone + Send + Sync + 'static {}

/// Registry of callbacks fed from a broadcast channel.
#[derive(Clone)]
pub struct CallbackRegistry<T: CallbackData> {
    /// The broadcast sender that distributes values to callback tasks.
    sender: broadcast::Sender<T>,

    /// Group label used in logs to tell registries apart.
    group: String,

    /// Listener task per callback, so unregistering can stop delivery.
    listeners: Arc<dashmap::DashMap<CallbackId, JoinHandle<()>>>,
}

impl<T: CallbackData> CallbackRegistry<T> {
    /// Create a new registry with a group label.
    pub fn with_group(group: &str) -> Self {
        let (sender, _) = broadcast::channel(64);
        Self {
            sender,
            group: group.to_string(),
            listeners: Arc::new(dashmap::DashMap::new()),
        }
    }

    /// Register a callback and return its id.
    ///
    /// The callback runs on a dedicated task; a callback returning an error
    /// is logged and does not unregister it.
    pub fn register<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        let mut receiver = self.sender.subscribe();
        let group = self.group.clone();
        let listeners = Arc::clone(&self.listeners);

        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(value) => {
                        if let Err(e) = callback(value) {
                            error!(
                                callback_id = %id,
                                group = %group,
                                error = %e,
                                "callback execution failed"
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(
                            callback_id = %id,
                            group = %group,
                            skipped,
                            "callback lagged behind, continuing"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            listeners.remove(&id);
        });

        self.listeners.insert(id, handle);
        debug!(callback_id = %id, group = %self.group, "registered callback");
        id
    }

    /// Unregister a callback by id. Returns false if it was not registered.
    pub fn unregister(&self, id: CallbackId) -> bool {
        match self.listeners.remove(&id) {
            Some((_, handle)) => {
                handle.abort();
                debug!(callback_id = %id, group = %self.group, "unregistered callback");
                true
            }
            None => {
                debug!(
                    callback_id = %id,
                    group = %self.group,
                    "attempted to unregister unknown callback"
                );
                false
            }
        }
    }

    /// Deliver a value to all registered callbacks.
    pub fn trigger(&self, value: T) -> usize {
        if self.listeners.is_empty() {
            return 0;
        }
        match self.sender.send(value) {
            Ok(count) => count,
            Err(_) => 0,
        }
    }

    /// Number of registered callbacks.
    pub fn count(&self) -> usize {
        self.listeners.len()
    }

    /// Remove every registered callback.
    pub fn clear(&self) {
        for entry in self.listeners.iter() {
            entry.value().abort();
        }
        self.listeners.clear();
    }
}
