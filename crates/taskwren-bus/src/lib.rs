//! In-process event bus.
//!
//! Fan-out by topic over bounded mpsc channels. Publishing never blocks;
//! a slow subscriber drops messages rather than stalling the dispatch path.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use taskwren_schema::BusMessage;
use tokio::sync::{mpsc, RwLock};

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum Topic {
    InboundReceived,
    MessageAccepted,
    ReplyReady,
    NoticeReady,
    TurnFailed,
}

impl Topic {
    pub fn from_message(msg: &BusMessage) -> Self {
        match msg {
            BusMessage::InboundReceived { .. } => Topic::InboundReceived,
            BusMessage::MessageAccepted { .. } => Topic::MessageAccepted,
            BusMessage::ReplyReady { .. } => Topic::ReplyReady,
            BusMessage::NoticeReady { .. } => Topic::NoticeReady,
            BusMessage::TurnFailed { .. } => Topic::TurnFailed,
        }
    }
}

type Subscriber = mpsc::Sender<BusMessage>;

pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<Topic, Vec<Subscriber>>>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    pub async fn subscribe(&self, topic: Topic) -> mpsc::Receiver<BusMessage> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut subs = self.subscribers.write().await;
        subs.entry(topic).or_default().push(tx);
        rx
    }

    pub async fn publish(&self, msg: BusMessage) -> Result<()> {
        publish_to(&self.subscribers, msg).await
    }

    pub fn publisher(&self) -> BusPublisher {
        BusPublisher {
            subscribers: self.subscribers.clone(),
        }
    }
}

/// Cloneable publishing handle, detached from subscription management.
#[derive(Clone)]
pub struct BusPublisher {
    subscribers: Arc<RwLock<HashMap<Topic, Vec<Subscriber>>>>,
}

impl BusPublisher {
    pub async fn publish(&self, msg: BusMessage) -> Result<()> {
        publish_to(&self.subscribers, msg).await
    }
}

async fn publish_to(
    subscribers: &RwLock<HashMap<Topic, Vec<Subscriber>>>,
    msg: BusMessage,
) -> Result<()> {
    let topic = Topic::from_message(&msg);
    let subs = subscribers.read().await;
    if let Some(list) = subs.get(&topic) {
        for tx in list {
            if tx.try_send(msg.clone()).is_err() {
                tracing::debug!(?topic, "bus subscriber full or gone, message dropped");
            }
        }
    }
    Ok(())
}
