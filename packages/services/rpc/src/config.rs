use std::time::Duration;

pub const DEFAULT_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_RESUBSCRIBE_BACKOFF_MS: u64 = 100;
pub const DEFAULT_MAX_RESUBSCRIBE_BACKOFF_MS: u64 = 5000;

/// How inbound calls are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Handlers run on the poll task itself, a slow handler delays every following message.
    Inline,
    /// Handlers run on a bounded set of workers; calls queue up when all of them are busy.
    Pool { workers: usize },
}

impl Default for DispatchMode {
    fn default() -> Self {
        DispatchMode::Pool { workers: DEFAULT_WORKERS }
    }
}

#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Channel this engine subscribes to and asks replies on.
    pub channel: String,
    /// Default timeout of calls made through invokers.
    pub timeout: Duration,
    /// Sleep between polls when the transport had nothing.
    pub poll_interval: Duration,
    pub dispatch: DispatchMode,
    pub resubscribe_backoff: Duration,
    pub max_resubscribe_backoff: Duration,
    /// Fixed 13 bit salt of generated serials, random when `None`.
    pub salt: Option<u16>,
}

impl RpcConfig {
    pub fn new(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            dispatch: DispatchMode::default(),
            resubscribe_backoff: Duration::from_millis(DEFAULT_RESUBSCRIBE_BACKOFF_MS),
            max_resubscribe_backoff: Duration::from_millis(DEFAULT_MAX_RESUBSCRIBE_BACKOFF_MS),
            salt: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }
}
