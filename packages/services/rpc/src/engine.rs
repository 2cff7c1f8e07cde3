use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_std::{channel::Receiver, task::JoinHandle};
use parking_lot::Mutex;
use remrpc_identity::{CorrelationId, UniqueIdGenerator};
use remrpc_network::PubSubTransport;
use remrpc_utils::{error_handle::ErrorUtils, SystemTimer, Timer};
use rmpv::Value;

use crate::{
    config::{DispatchMode, RpcConfig},
    error::{RegistryError, RpcError},
    invoker::Invoker,
    msg::Envelope,
    pending::{CallOutcome, PendingTable},
    registry::{FunctionRegistry, RpcFunction},
};

use self::dispatch::Dispatcher;

mod dispatch;
mod poll;

pub const UNREGISTERED_DETAIL: &str = "Function not registered";

pub(crate) struct EngineInner {
    pub(crate) config: RpcConfig,
    pub(crate) transport: Arc<dyn PubSubTransport>,
    pub(crate) registry: FunctionRegistry,
    pub(crate) pending: PendingTable,
    id_gen: UniqueIdGenerator,
    closed: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EngineInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Publish a reply or error, unless the caller asked for no answer.
    pub(crate) async fn send_answer(&self, reply_channel: Option<&str>, answer: Envelope) {
        match reply_channel {
            Some(channel) => {
                log::debug!("[RpcEngine] send {} for {} to {}", answer.tag(), answer.serial(), channel);
                self.transport.publish(channel, answer.encode()).await.print_error("Should publish answer");
            }
            None => {
                log::debug!("[RpcEngine] skip {} for {}, no reply channel", answer.tag(), answer.serial());
            }
        }
    }

    pub(crate) fn on_answer(&self, serial: CorrelationId, outcome: CallOutcome) {
        if !self.pending.complete(serial, outcome) {
            log::debug!("[RpcEngine] discard answer for unknown serial {}", serial);
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("[RpcEngine] {} dropped without close, releasing subscription", self.config.channel);
        let transport = self.transport.clone();
        async_std::task::spawn(async move {
            transport.unsubscribe().await.print_error("Should unsubscribe");
        });
    }
}

/// RPC endpoint subscribed to one channel.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use remrpc::{reply, CallArgs, RpcConfig, RpcEngine};
/// use remrpc_transport_vnet::{VnetEarth, VnetTransport};
///
/// async fn run() {
///     let earth = Arc::new(VnetEarth::default());
///     let server = RpcEngine::start(RpcConfig::new("chan:server"), Arc::new(VnetTransport::new(earth.clone()))).await.unwrap();
///     server.register("add", |args: CallArgs| {
///         let (a, b): (i64, i64) = args.parse()?;
///         reply(a + b)
///     });
///
///     let client = RpcEngine::start(RpcConfig::new("chan:client"), Arc::new(VnetTransport::new(earth))).await.unwrap();
///     let sum: i64 = client.invoker("chan:server").call_as("add", (2, 3)).await.unwrap();
///     assert_eq!(sum, 5);
///
///     client.close().await;
///     server.close().await;
/// }
/// ```
#[derive(Clone)]
pub struct RpcEngine {
    inner: Arc<EngineInner>,
}

impl RpcEngine {
    pub async fn start(config: RpcConfig, transport: Arc<dyn PubSubTransport>) -> Result<Self, RpcError> {
        Self::start_with_timer(config, transport, Arc::new(SystemTimer())).await
    }

    pub async fn start_with_timer(config: RpcConfig, transport: Arc<dyn PubSubTransport>, timer: Arc<dyn Timer>) -> Result<Self, RpcError> {
        transport.subscribe(&config.channel).await?;
        let id_gen = match config.salt {
            Some(salt) => UniqueIdGenerator::with_salt(timer, salt),
            None => UniqueIdGenerator::new(timer),
        };

        let inner = Arc::new(EngineInner {
            config,
            transport,
            registry: FunctionRegistry::default(),
            pending: PendingTable::default(),
            id_gen,
            closed: AtomicBool::new(false),
            tasks: Mutex::new(vec![]),
        });

        let mut tasks = vec![];
        let dispatcher = match inner.config.dispatch {
            DispatchMode::Inline => Dispatcher::Inline,
            DispatchMode::Pool { workers } => {
                let (tx, workers) = dispatch::spawn_workers(Arc::downgrade(&inner), workers.max(1));
                tasks.extend(workers);
                Dispatcher::Pool(tx)
            }
        };
        tasks.push(async_std::task::spawn(poll::run_poll_loop(Arc::downgrade(&inner), dispatcher)));
        *inner.tasks.lock() = tasks;

        log::info!("[RpcEngine] started on {} with {:?}", inner.config.channel, inner.config.dispatch);
        Ok(Self { inner })
    }

    pub fn channel(&self) -> &str {
        &self.inner.config.channel
    }

    pub fn default_timeout(&self) -> Duration {
        self.inner.config.timeout
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Number of calls still waiting for an answer.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn register<F: RpcFunction + 'static>(&self, name: &str, function: F) {
        self.inner.registry.register(name, Arc::new(function));
    }

    pub fn deregister(&self, name: &str) -> Result<Arc<dyn RpcFunction>, RegistryError> {
        self.inner.registry.deregister(name)
    }

    pub fn registered_functions(&self) -> Vec<String> {
        self.inner.registry.names()
    }

    pub fn invoker(&self, channel: &str) -> Invoker {
        Invoker::new(self.clone(), channel, self.inner.config.timeout)
    }

    /// Call `function` on whichever engine listens on `channel` and wait for its answer.
    pub async fn call(&self, channel: &str, function: &str, args: Vec<Value>, kwargs: Vec<(Value, Value)>, timeout: Duration) -> Result<Value, RpcError> {
        let inner = &self.inner;
        if inner.is_closed() {
            return Err(RpcError::Closed);
        }

        let serial = inner.id_gen.next();
        let rx = inner.pending.insert(serial);
        let _guard = inner.pending.guard(serial);
        if inner.is_closed() {
            return Err(RpcError::Closed);
        }

        let call = Envelope::Call {
            serial,
            reply_channel: Some(inner.config.channel.clone()),
            function: function.to_string(),
            args,
            kwargs,
        };
        log::debug!("[RpcEngine] call {} on {} serial {}", function, channel, serial);
        if let Err(err) = inner.transport.publish(channel, call.encode()).await {
            log::warn!("[RpcEngine] publish call {} to {} failed: {}", function, channel, err);
            return Err(RpcError::Transport(err));
        }

        match async_std::future::timeout(timeout, rx.recv()).await {
            Ok(Ok(outcome)) => outcome_to_result(outcome),
            Ok(Err(_)) => {
                if inner.is_closed() {
                    Err(RpcError::Closed)
                } else {
                    Err(RpcError::RetvalError("Get return value failed".to_string()))
                }
            }
            Err(_) => {
                if let Some(outcome) = take_late_outcome(&inner.pending, serial, &rx) {
                    return outcome_to_result(outcome);
                }
                log::warn!("[RpcEngine] call {} on {} serial {} timed out after {:?}", function, channel, serial, timeout);
                Err(RpcError::Timeout)
            }
        }
    }

    /// Fire-and-forget call: the callee runs `function` but never answers.
    pub async fn emit(&self, channel: &str, function: &str, args: Vec<Value>, kwargs: Vec<(Value, Value)>) -> Result<(), RpcError> {
        if self.inner.is_closed() {
            return Err(RpcError::Closed);
        }
        let call = Envelope::Call {
            serial: self.inner.id_gen.next(),
            reply_channel: None,
            function: function.to_string(),
            args,
            kwargs,
        };
        log::debug!("[RpcEngine] emit {} on {}", function, channel);
        self.inner.transport.publish(channel, call.encode()).await?;
        Ok(())
    }

    /// Stop polling and release workers. Safe to call many times; outstanding calls fail with [`RpcError::Closed`].
    ///
    /// Dropping the last handle without calling this releases the subscription too, background tasks only keep a weak reference.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("[RpcEngine] closing {}", self.inner.config.channel);
        self.inner.transport.unsubscribe().await.print_error("Should unsubscribe");

        let tasks = std::mem::take(&mut *self.inner.tasks.lock());
        for task in tasks {
            task.cancel().await;
        }

        let dropped = self.inner.pending.clear();
        if dropped > 0 {
            log::warn!("[RpcEngine] closed with {} pending calls", dropped);
        }
    }
}

/// Abandon a timed out call, unless the poll loop completed it right as the timer fired.
fn take_late_outcome(pending: &PendingTable, serial: CorrelationId, rx: &Receiver<CallOutcome>) -> Option<CallOutcome> {
    if pending.remove(serial) {
        None
    } else {
        rx.try_recv().ok()
    }
}

fn outcome_to_result(outcome: CallOutcome) -> Result<Value, RpcError> {
    match outcome {
        CallOutcome::Reply(result) => Ok(result),
        CallOutcome::Error { code, detail } => Err(RpcError::CallError { code, detail }),
        CallOutcome::Anomaly(detail) => Err(RpcError::RetvalError(detail)),
    }
}
