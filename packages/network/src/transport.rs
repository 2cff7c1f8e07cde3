use thiserror::Error;

/// One message received from a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMsg {
    pub channel: String,
    pub payload: Vec<u8>,
}

impl ChannelMsg {
    pub fn new(channel: &str, payload: Vec<u8>) -> Self {
        Self {
            channel: channel.to_string(),
            payload,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Disconnected: {0}")]
    Disconnected(String),
    #[error("Not subscribed")]
    NotSubscribed,
    #[error("Transport error: {0}")]
    Other(String),
}

/// Pub/Sub broker connection owning at most one subscription.
///
/// Delivery is at-most-once and there is no ordering between channels.
/// `poll` must not block: it returns `Ok(None)` when nothing is pending.
#[mockall::automock]
#[async_trait::async_trait]
pub trait PubSubTransport: Send + Sync {
    async fn subscribe(&self, channel: &str) -> Result<(), TransportError>;
    async fn unsubscribe(&self) -> Result<(), TransportError>;
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), TransportError>;
    fn poll(&self) -> Result<Option<ChannelMsg>, TransportError>;
}
