use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};

use async_std::channel::Sender;
use parking_lot::RwLock;
use remrpc_network::{ChannelMsg, TransportError};

/// In-process broker shared by [`crate::VnetTransport`]s.
#[derive(Default)]
pub struct VnetEarth {
    pub(crate) sub_id_seed: AtomicU64,
    offline: AtomicBool,
    outage_epoch: AtomicU64,
    published: AtomicUsize,
    channels: RwLock<HashMap<String, HashMap<u64, Sender<ChannelMsg>>>>,
}

impl VnetEarth {
    pub(crate) fn subscribe(&self, sub_id: u64, channel: &str, sender: Sender<ChannelMsg>) -> Result<(), TransportError> {
        self.check_online()?;
        let mut channels = self.channels.write();
        for subs in channels.values_mut() {
            subs.remove(&sub_id);
        }
        channels.entry(channel.to_string()).or_default().insert(sub_id, sender);
        log::debug!("[VnetEarth] sub {} subscribed {}", sub_id, channel);
        Ok(())
    }

    pub(crate) fn unsubscribe(&self, sub_id: u64) -> Result<(), TransportError> {
        self.check_online()?;
        self.channels.write().retain(|_, subs| {
            subs.remove(&sub_id);
            !subs.is_empty()
        });
        Ok(())
    }

    /// Deliver `payload` to every current subscriber of `channel`, returning how many received it.
    pub fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<usize, TransportError> {
        self.check_online()?;
        self.published.fetch_add(1, Ordering::Relaxed);
        let channels = self.channels.read();
        let mut receivers = 0;
        if let Some(subs) = channels.get(channel) {
            for (sub_id, sender) in subs {
                if sender.try_send(ChannelMsg::new(channel, payload.clone())).is_ok() {
                    receivers += 1;
                } else {
                    log::warn!("[VnetEarth] drop msg on {} for sub {}", channel, sub_id);
                }
            }
        }
        log::trace!("[VnetEarth] publish {} bytes on {} to {} subs", payload.len(), channel, receivers);
        Ok(receivers)
    }

    /// Simulate a broker outage. Going offline drops every subscription, they are not restored when back online.
    ///
    /// Each outage bumps an epoch, so handles subscribed before it keep reporting the disconnect until they resubscribe.
    pub fn set_offline(&self, offline: bool) {
        if offline && !self.offline.swap(true, Ordering::SeqCst) {
            log::warn!("[VnetEarth] going offline, dropping all subscriptions");
            let mut channels = self.channels.write();
            self.outage_epoch.fetch_add(1, Ordering::SeqCst);
            channels.clear();
        } else if !offline {
            self.offline.store(false, Ordering::SeqCst);
        }
    }

    /// Number of outages so far.
    pub fn outage_epoch(&self) -> u64 {
        self.outage_epoch.load(Ordering::SeqCst)
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Number of accepted publish calls.
    pub fn published_count(&self) -> usize {
        self.published.load(Ordering::Relaxed)
    }

    pub fn subscribers(&self, channel: &str) -> usize {
        self.channels.read().get(channel).map(|subs| subs.len()).unwrap_or(0)
    }

    fn check_online(&self) -> Result<(), TransportError> {
        if self.is_offline() {
            Err(TransportError::Disconnected("vnet offline".to_string()))
        } else {
            Ok(())
        }
    }
}
