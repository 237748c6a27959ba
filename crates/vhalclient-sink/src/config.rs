use std::time::Duration;

use vhalclient_frame::DEFAULT_MAX_PAYLOAD;

/// Default pause between failed connect attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(3);

/// Default bound on one readiness wait.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// What the background thread does while connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineMode {
    /// Read control messages and dispatch them to the callback.
    #[default]
    Control,
    /// Only keep the connection alive; inbound bytes belong to the caller.
    Passive,
}

/// Configuration for a [`ReconnectingEngine`](crate::ReconnectingEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fixed delay between connect attempts. No backoff, no retry cap.
    pub retry_delay: Duration,
    /// Upper bound on one wait for control traffic.
    pub poll_timeout: Duration,
    /// Largest payload `write_packet` accepts.
    pub max_payload_size: usize,
    /// Background thread behavior.
    pub mode: EngineMode,
    /// Name given to the background thread.
    pub thread_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            mode: EngineMode::Control,
            thread_name: "vhal-engine".to_string(),
        }
    }
}
