pub mod transport;

pub use transport::{ChannelMsg, MockPubSubTransport, PubSubTransport, TransportError};
