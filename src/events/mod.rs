//! Reactive event plumbing shared by the session manager and the identity
//! provider clients. A single generic stream type backs both channels so
//! subscribers behave identically no matter which side they listen to.

pub mod streams;
pub use streams::{EventStream, EventStreamStats, Subscriber};

/// Broadcast channel capacity for session and provider event streams.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Number of recent events retained for replay to late subscribers.
pub const EVENT_REPLAY_BUFFER_SIZE: usize = 16;
