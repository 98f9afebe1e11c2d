//! Pub/sub bridge used by agents to publish telemetry and events.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::protocol::AgentId;

/// Default number of publications buffered per subscriber.
const BROKER_CAPACITY: usize = 1024;

#[async_trait]
pub trait PubSubClient: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// One published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub publisher: AgentId,
    pub payload: Vec<u8>,
}

/// In-process broker fanning publications out to every subscriber.
#[derive(Clone)]
pub struct LocalBroker {
    tx: broadcast::Sender<Publication>,
}

impl LocalBroker {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROKER_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Publication> {
        self.tx.subscribe()
    }

    /// Client bound to one agent.
    pub fn client(&self, agent_id: AgentId) -> BrokerClient {
        BrokerClient {
            agent_id,
            tx: self.tx.clone(),
            closed: AtomicBool::new(false),
        }
    }
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new()
    }
}

pub struct BrokerClient {
    agent_id: AgentId,
    tx: broadcast::Sender<Publication>,
    closed: AtomicBool,
}

#[async_trait]
impl PubSubClient for BrokerClient {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::internal(format!(
                "pub/sub client of agent {} is closed",
                self.agent_id
            )));
        }
        // No subscribers is not an error for a fire-and-forget bridge.
        let _ = self.tx.send(Publication {
            topic: topic.to_string(),
            publisher: self.agent_id,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
