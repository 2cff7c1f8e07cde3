use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Weak},
};

use async_std::{
    channel::{unbounded, Receiver, Sender},
    task::JoinHandle,
};
use remrpc_identity::CorrelationId;
use remrpc_utils::error_handle::ErrorUtils;
use rmpv::Value;

use super::EngineInner;
use crate::{
    error::{ErrorCode, HandlerError},
    msg::Envelope,
    registry::{CallArgs, RpcFunction},
};

/// Inbound call whose function was found in the registry.
pub(crate) struct InboundCall {
    pub serial: CorrelationId,
    pub reply_channel: Option<String>,
    pub name: String,
    pub function: Arc<dyn RpcFunction>,
    pub args: CallArgs,
}

pub(crate) enum Dispatcher {
    Inline,
    Pool(Sender<InboundCall>),
}

impl Dispatcher {
    pub async fn dispatch(&self, inner: &EngineInner, call: InboundCall) {
        match self {
            Dispatcher::Inline => {
                let InboundCall {
                    serial,
                    reply_channel,
                    name,
                    function,
                    args,
                } = call;
                let result = run_function(function.as_ref(), args);
                respond(inner, serial, reply_channel.as_deref(), &name, result).await;
            }
            Dispatcher::Pool(tx) => {
                tx.try_send(call).print_error("Should queue inbound call");
            }
        }
    }
}

/// Workers stop once the queue sender, owned by the poll loop, is gone or the engine is dropped.
pub(crate) fn spawn_workers(engine: Weak<EngineInner>, workers: usize) -> (Sender<InboundCall>, Vec<JoinHandle<()>>) {
    let (tx, rx) = unbounded();
    let handles = (0..workers).map(|worker| async_std::task::spawn(run_worker(engine.clone(), worker, rx.clone()))).collect();
    (tx, handles)
}

async fn run_worker(engine: Weak<EngineInner>, worker: usize, rx: Receiver<InboundCall>) {
    log::debug!("[RpcWorker {}] started", worker);
    while let Ok(call) = rx.recv().await {
        let inner = match engine.upgrade() {
            Some(inner) => inner,
            None => break,
        };
        let InboundCall {
            serial,
            reply_channel,
            name,
            function,
            args,
        } = call;
        log::trace!("[RpcWorker {}] run {} serial {}", worker, name, serial);
        let result = async_std::task::spawn_blocking(move || run_function(function.as_ref(), args)).await;
        respond(&inner, serial, reply_channel.as_deref(), &name, result).await;
    }
    log::debug!("[RpcWorker {}] stopped", worker);
}

/// Run a handler, turning a panic into a [`HandlerError`].
pub(crate) fn run_function(function: &dyn RpcFunction, args: CallArgs) -> Result<Value, HandlerError> {
    match catch_unwind(AssertUnwindSafe(|| function.invoke(args))) {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn respond(inner: &EngineInner, serial: CorrelationId, reply_channel: Option<&str>, name: &str, result: Result<Value, HandlerError>) {
    let answer = match result {
        Ok(result) => Envelope::Reply { serial, result },
        Err(err) => {
            log::warn!("[RpcEngine] function {} serial {} failed: {}", name, serial, err);
            Envelope::Error {
                serial,
                code: ErrorCode::CallFailed,
                detail: err.to_string(),
            }
        }
    };
    inner.send_answer(reply_channel, answer).await;
}
