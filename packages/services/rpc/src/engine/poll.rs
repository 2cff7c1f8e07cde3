use std::{sync::Weak, time::Duration};

use remrpc_network::{ChannelMsg, TransportError};

use super::{
    dispatch::{Dispatcher, InboundCall},
    EngineInner, UNREGISTERED_DETAIL,
};
use crate::{
    error::{DecodeError, ErrorCode},
    msg::Envelope,
    pending::CallOutcome,
    registry::CallArgs,
};

pub(crate) async fn run_poll_loop(engine: Weak<EngineInner>, dispatcher: Dispatcher) {
    // Some(backoff) while the subscription has to be restored
    let mut resubscribe: Option<Duration> = None;
    loop {
        let wait = {
            let inner = match engine.upgrade() {
                Some(inner) => inner,
                None => break,
            };
            if inner.is_closed() {
                break;
            }
            match resubscribe {
                Some(backoff) => match inner.transport.subscribe(&inner.config.channel).await {
                    Ok(()) => {
                        log::info!("[RpcEngine] resubscribed {}", inner.config.channel);
                        resubscribe = None;
                        None
                    }
                    Err(err) => {
                        let backoff = (backoff * 2).min(inner.config.max_resubscribe_backoff);
                        log::warn!("[RpcEngine] resubscribe {} failed: {}, retry in {:?}", inner.config.channel, err, backoff);
                        resubscribe = Some(backoff);
                        Some(backoff)
                    }
                },
                None => match drain(&inner, &dispatcher).await {
                    Ok(0) => Some(inner.config.poll_interval),
                    Ok(_) => None,
                    Err(err) => {
                        log::error!("[RpcEngine] poll on {} failed: {}", inner.config.channel, err);
                        resubscribe = Some(inner.config.resubscribe_backoff);
                        resubscribe
                    }
                },
            }
        };
        match wait {
            Some(wait) => async_std::task::sleep(wait).await,
            None => async_std::task::yield_now().await,
        }
    }
    log::info!("[RpcEngine] poll loop stopped");
}

/// Process every message available right now.
async fn drain(inner: &EngineInner, dispatcher: &Dispatcher) -> Result<usize, TransportError> {
    let mut count = 0;
    while let Some(msg) = inner.transport.poll()? {
        count += 1;
        on_msg(inner, dispatcher, msg).await;
        if inner.is_closed() {
            break;
        }
    }
    Ok(count)
}

async fn on_msg(inner: &EngineInner, dispatcher: &Dispatcher, msg: ChannelMsg) {
    let envelope = match Envelope::decode(&msg.payload) {
        Ok(envelope) => envelope,
        Err(DecodeError::MalformedAnswer { serial, field }) => {
            log::warn!("[RpcEngine] malformed {} in answer {} on {}", field, serial, msg.channel);
            inner.on_answer(serial, CallOutcome::Anomaly(format!("Malformed {} in answer", field)));
            return;
        }
        Err(err) => {
            log::error!("[RpcEngine] protocol unpack error on {}: {}", msg.channel, err);
            return;
        }
    };

    match envelope {
        Envelope::Call {
            serial,
            reply_channel,
            function,
            args,
            kwargs,
        } => match inner.registry.get(&function) {
            Some(handler) => {
                let call = InboundCall {
                    serial,
                    reply_channel,
                    name: function,
                    function: handler,
                    args: CallArgs::new(args, kwargs),
                };
                dispatcher.dispatch(inner, call).await;
            }
            None => {
                log::warn!("[RpcEngine] call to unregistered function {:?} serial {}", function, serial);
                let answer = Envelope::Error {
                    serial,
                    code: ErrorCode::Unregistered,
                    detail: UNREGISTERED_DETAIL.to_string(),
                };
                inner.send_answer(reply_channel.as_deref(), answer).await;
            }
        },
        Envelope::Reply { serial, result } => inner.on_answer(serial, CallOutcome::Reply(result)),
        Envelope::Error { serial, code, detail } => inner.on_answer(serial, CallOutcome::Error { code, detail }),
    }
}
