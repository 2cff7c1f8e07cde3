use std::sync::{atomic::Ordering, Arc};

use async_std::channel::{unbounded, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use remrpc_network::{ChannelMsg, PubSubTransport, TransportError};

use crate::earth::VnetEarth;

pub struct VnetTransport {
    sub_id: u64,
    earth: Arc<VnetEarth>,
    /// Subscribed channel and the outage epoch seen when subscribing.
    channel: Mutex<Option<(String, u64)>>,
    tx: Sender<ChannelMsg>,
    rx: Receiver<ChannelMsg>,
}

impl VnetTransport {
    pub fn new(earth: Arc<VnetEarth>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            sub_id: earth.sub_id_seed.fetch_add(1, Ordering::Relaxed),
            earth,
            channel: Mutex::new(None),
            tx,
            rx,
        }
    }

    pub fn subscribed_channel(&self) -> Option<String> {
        self.channel.lock().as_ref().map(|(channel, _)| channel.clone())
    }
}

#[async_trait::async_trait]
impl PubSubTransport for VnetTransport {
    async fn subscribe(&self, channel: &str) -> Result<(), TransportError> {
        let epoch = self.earth.outage_epoch();
        self.earth.subscribe(self.sub_id, channel, self.tx.clone())?;
        *self.channel.lock() = Some((channel.to_string(), epoch));
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<(), TransportError> {
        if self.channel.lock().take().is_none() {
            return Err(TransportError::NotSubscribed);
        }
        self.earth.unsubscribe(self.sub_id)?;
        while self.rx.try_recv().is_ok() {}
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.earth.publish(channel, payload).map(|_| ())
    }

    fn poll(&self) -> Result<Option<ChannelMsg>, TransportError> {
        if self.earth.is_offline() {
            return Err(TransportError::Disconnected("vnet offline".to_string()));
        }
        if let Some((channel, epoch)) = self.channel.lock().as_ref() {
            if *epoch != self.earth.outage_epoch() {
                return Err(TransportError::Disconnected(format!("subscription {} lost in outage", channel)));
            }
        }
        match self.rx.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Closed) => Err(TransportError::Other("receiver closed".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use remrpc_network::{ChannelMsg, PubSubTransport, TransportError};

    use crate::{VnetEarth, VnetTransport};

    #[async_std::test]
    async fn simple_pub_sub() {
        let vnet = Arc::new(VnetEarth::default());
        let tran1 = VnetTransport::new(vnet.clone());
        let tran2 = VnetTransport::new(vnet.clone());

        tran1.subscribe("chan1").await.expect("Should subscribe");
        assert_eq!(vnet.subscribers("chan1"), 1);
        assert_eq!(tran1.subscribed_channel(), Some("chan1".to_string()));

        tran2.publish("chan1", vec![1, 2, 3]).await.expect("Should publish");
        assert_eq!(tran1.poll(), Ok(Some(ChannelMsg::new("chan1", vec![1, 2, 3]))));
        assert_eq!(tran1.poll(), Ok(None));
        assert_eq!(tran2.poll(), Ok(None));
        assert_eq!(vnet.published_count(), 1);
    }

    #[async_std::test]
    async fn publish_without_subscriber_should_be_dropped() {
        let vnet = Arc::new(VnetEarth::default());
        let tran1 = VnetTransport::new(vnet.clone());
        assert_eq!(vnet.publish("nobody", vec![1]), Ok(0));
        tran1.subscribe("nobody").await.expect("Should subscribe");
        assert_eq!(tran1.poll(), Ok(None));
    }

    #[async_std::test]
    async fn resubscribe_should_replace_channel() {
        let vnet = Arc::new(VnetEarth::default());
        let tran1 = VnetTransport::new(vnet.clone());
        tran1.subscribe("a").await.expect("Should subscribe");
        tran1.subscribe("b").await.expect("Should subscribe");
        assert_eq!(vnet.subscribers("a"), 0);
        assert_eq!(vnet.subscribers("b"), 1);
    }

    #[async_std::test]
    async fn unsubscribe_should_stop_delivery() {
        let vnet = Arc::new(VnetEarth::default());
        let tran1 = VnetTransport::new(vnet.clone());
        tran1.subscribe("chan").await.expect("Should subscribe");
        tran1.unsubscribe().await.expect("Should unsubscribe");
        assert_eq!(vnet.publish("chan", vec![1]), Ok(0));
        assert_eq!(tran1.poll(), Ok(None));
        assert_eq!(tran1.unsubscribe().await, Err(TransportError::NotSubscribed));
    }

    #[async_std::test]
    async fn offline_should_drop_subscriptions() {
        let vnet = Arc::new(VnetEarth::default());
        let tran1 = VnetTransport::new(vnet.clone());
        tran1.subscribe("chan").await.expect("Should subscribe");

        vnet.set_offline(true);
        assert!(matches!(tran1.poll(), Err(TransportError::Disconnected(_))));
        assert!(matches!(tran1.subscribe("chan").await, Err(TransportError::Disconnected(_))));
        assert!(matches!(vnet.publish("chan", vec![1]), Err(TransportError::Disconnected(_))));

        vnet.set_offline(false);
        assert_eq!(vnet.publish("chan", vec![1]), Ok(0));
        tran1.subscribe("chan").await.expect("Should subscribe");
        assert_eq!(vnet.publish("chan", vec![2]), Ok(1));
        assert_eq!(tran1.poll(), Ok(Some(ChannelMsg::new("chan", vec![2]))));
    }

    #[async_std::test]
    async fn brief_outage_should_be_reported_until_resubscribe() {
        let vnet = Arc::new(VnetEarth::default());
        let tran1 = VnetTransport::new(vnet.clone());
        let idle = VnetTransport::new(vnet.clone());
        tran1.subscribe("chan").await.expect("Should subscribe");

        vnet.set_offline(true);
        vnet.set_offline(false);
        assert_eq!(vnet.outage_epoch(), 1);
        assert!(matches!(tran1.poll(), Err(TransportError::Disconnected(_))));
        assert!(matches!(tran1.poll(), Err(TransportError::Disconnected(_))));
        assert_eq!(idle.poll(), Ok(None));

        tran1.subscribe("chan").await.expect("Should subscribe");
        assert_eq!(tran1.poll(), Ok(None));
        assert_eq!(vnet.publish("chan", vec![3]), Ok(1));
        assert_eq!(tran1.poll(), Ok(Some(ChannelMsg::new("chan", vec![3]))));
    }
}
