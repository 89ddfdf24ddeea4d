use crate::decode::DecodeLevel;

/// What happens to queued requests when the server is closed
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum ShutdownPolicy {
    /// Every request queued before the close is dispatched and answered
    #[default]
    Drain,
    /// The dispatch task stops immediately and queued requests are dropped
    Abort,
}

/// Configuration of a [`Server`](crate::server::Server)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct ServerConfig {
    /// Number of messages the request queue holds before submitters have to wait
    pub queue_capacity: usize,
    /// Maximum number of concurrent sessions per TCP listener, the oldest is closed when exceeded
    pub max_sessions: usize,
    /// Handling of queued requests on close
    pub shutdown: ShutdownPolicy,
    /// Decode level used for all logging of traffic
    pub decode: DecodeLevel,
}

impl ServerConfig {
    /// Default queue capacity
    pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
    /// Default maximum number of sessions per TCP listener
    pub const DEFAULT_MAX_SESSIONS: usize = 100;
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: Self::DEFAULT_QUEUE_CAPACITY,
            max_sessions: Self::DEFAULT_MAX_SESSIONS,
            shutdown: ShutdownPolicy::default(),
            decode: DecodeLevel::default(),
        }
    }
}
