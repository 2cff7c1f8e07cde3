//! Request/response calls layered on a Pub/Sub transport.
//!
//! Every [`RpcEngine`] listens on one channel. Calls carry a [`remrpc_identity::CorrelationId`] serial and the caller's
//! channel, answers are published back to that channel and matched by serial.

mod config;
mod engine;
mod error;
mod invoker;
mod msg;
mod pending;
mod registry;

pub use config::{DispatchMode, RpcConfig, DEFAULT_TIMEOUT_MS};
pub use engine::{RpcEngine, UNREGISTERED_DETAIL};
pub use error::{DecodeError, ErrorCode, HandlerError, RegistryError, RpcError};
pub use invoker::Invoker;
pub use msg::Envelope;
pub use pending::{CallOutcome, PendingGuard, PendingTable};
pub use registry::{reply, CallArgs, FunctionRegistry, RpcFunction};
pub use rmpv::{self, Value};
