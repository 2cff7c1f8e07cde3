//! Virtual Pub/Sub network living inside one process.
//!
//! A [`VnetEarth`] plays the broker, every [`VnetTransport`] is one client connection to it.

mod earth;
mod transport;

pub use earth::VnetEarth;
pub use transport::VnetTransport;
