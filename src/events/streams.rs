use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Generic event stream for reactive event handling.
///
/// Wraps a tokio broadcast channel with a small replay buffer so that a
/// subscriber attaching after an event was published can still observe it,
/// and with counters for monitoring.
pub struct EventStream<T: Clone + Send + 'static> {
    sender: broadcast::Sender<T>,
    buffer: Arc<RwLock<VecDeque<T>>>,
    buffer_size: usize,
    stats: Arc<RwLock<EventStreamStats>>,
}

/// Statistics for monitoring stream activity.
#[derive(Debug, Clone, Default)]
pub struct EventStreamStats {
    pub events_published: u64,
    pub events_dropped: u64,
}

impl<T: Clone + Send + 'static> EventStream<T> {
    /// Create a new event stream with the given channel capacity and replay
    /// buffer size.
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(RwLock::new(VecDeque::with_capacity(buffer_size))),
            buffer_size,
            stats: Arc::new(RwLock::new(EventStreamStats::default())),
        }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> Subscriber<T> {
        Subscriber {
            receiver: self.sender.subscribe(),
            buffer: Arc::clone(&self.buffer),
        }
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of receivers the event reached. An event published
    /// with no live subscribers is buffered for replay and counted as
    /// dropped, not treated as an error.
    pub async fn publish(&self, event: T) -> usize {
        let delivered = match self.sender.send(event.clone()) {
            Ok(receiver_count) => receiver_count,
            Err(_) => 0,
        };

        self.buffer_event(event).await;

        let mut stats = self.stats.write().await;
        if delivered == 0 {
            stats.events_dropped += 1;
        } else {
            stats.events_published += 1;
        }
        drop(stats);

        debug!(receivers = delivered, "event published");
        delivered
    }

    /// Store an event in the replay buffer, evicting the oldest entries.
    async fn buffer_event(&self, event: T) {
        let mut buffer = self.buffer.write().await;
        buffer.push_back(event);
        while buffer.len() > self.buffer_size {
            buffer.pop_front();
        }
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get current statistics.
    pub async fn stats(&self) -> EventStreamStats {
        self.stats.read().await.clone()
    }

    /// Reset statistics counters.
    pub async fn reset_stats(&self) {
        *self.stats.write().await = EventStreamStats::default();
    }
}

impl<T: Clone + Send + 'static> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            buffer: Arc::clone(&self.buffer),
            buffer_size: self.buffer_size,
            stats: Arc::clone(&self.stats),
        }
    }
}

/// Subscriber for receiving events from a stream.
pub struct Subscriber<T: Clone + Send + 'static> {
    receiver: broadcast::Receiver<T>,
    buffer: Arc<RwLock<VecDeque<T>>>,
}

impl<T: Clone + Send + 'static> Subscriber<T> {
    /// Receive the next event.
    pub async fn recv(&mut self) -> Result<T, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Replay the retained recent events.
    pub async fn replay_buffer(&self) -> Vec<T> {
        self.buffer.read().await.iter().cloned().collect()
    }
}
