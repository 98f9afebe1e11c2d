//! Message routing between agents.
//!
//! Handles:
//! - Resolution of a receiver to a local agent or a remote agency
//! - Local delivery onto bounded mailboxes
//! - Forwarding to remote agencies
//! - Recovery of undeliverable messages (one retry, then drop)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use super::peers::{PeerDirectory, RemoteEndpoint};
use super::remote::RemoteClient;
use super::AgentTable;
use crate::agent::Agent;
use crate::error::{Error, Result};
use crate::protocol::{ACLMessage, AgentId};

/// Where a receiver lives.
#[derive(Debug)]
pub enum Resolution {
    Local(Arc<Agent>),
    Remote(RemoteEndpoint),
    NotFound,
}

/// How a message was handed off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Placed on a local agent's inbound queue
    Local,
    /// Accepted by the intake of another agency
    Forwarded { address: String },
}

#[derive(Debug, Default)]
struct RouterStats {
    delivered: AtomicU64,
    forwarded: AtomicU64,
    congested: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct RouterStatsSnapshot {
    pub delivered: u64,
    pub forwarded: u64,
    pub congested: u64,
    pub retried: u64,
    pub dropped: u64,
}

struct RouterInner {
    agents: Arc<AgentTable>,
    peers: Arc<dyn PeerDirectory>,
    remote: RemoteClient,
    address: String,
    stats: RouterStats,
}

/// Routes ACL messages to their receivers. Cheap to clone.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    pub(crate) fn new(
        agents: Arc<AgentTable>,
        peers: Arc<dyn PeerDirectory>,
        remote: RemoteClient,
        address: String,
    ) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                agents,
                peers,
                remote,
                address,
                stats: RouterStats::default(),
            }),
        }
    }

    /// Advertised address of this node.
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    pub fn stats(&self) -> RouterStatsSnapshot {
        let s = &self.inner.stats;
        RouterStatsSnapshot {
            delivered: s.delivered.load(Ordering::Relaxed),
            forwarded: s.forwarded.load(Ordering::Relaxed),
            congested: s.congested.load(Ordering::Relaxed),
            retried: s.retried.load(Ordering::Relaxed),
            dropped: s.dropped.load(Ordering::Relaxed),
        }
    }

    /// Resolve a receiver. Local agents that are shutting down are skipped.
    pub async fn resolve(&self, agent_id: AgentId) -> Resolution {
        {
            let agents = self.inner.agents.read().await;
            if let Some(agent) = agents.get(&agent_id) {
                if agent.is_active() {
                    return Resolution::Local(Arc::clone(agent));
                }
            }
        }

        match self.inner.peers.resolve(agent_id).await {
            // A peer entry pointing back at this node would loop forever.
            Some(endpoint) if endpoint.address == self.inner.address => Resolution::NotFound,
            Some(endpoint) => Resolution::Remote(endpoint),
            None => Resolution::NotFound,
        }
    }

    /// One delivery attempt, no recovery.
    pub async fn send(&self, msg: &ACLMessage) -> Result<Delivery> {
        let target = self.resolve(msg.receiver).await;
        self.deliver_to(msg, target).await
    }

    /// Deliver to an already resolved target. The target may have changed
    /// since resolution; a local agent terminated in between shows up as
    /// `Undeliverable`.
    pub async fn deliver_to(&self, msg: &ACLMessage, target: Resolution) -> Result<Delivery> {
        match target {
            Resolution::Local(agent) => match agent.deliver(msg.clone()) {
                Ok(()) => {
                    self.inner.stats.delivered.fetch_add(1, Ordering::Relaxed);
                    Ok(Delivery::Local)
                }
                Err(Error::Congested(reason)) => Err(self.congested(msg, &reason)),
                Err(e) => Err(e),
            },
            Resolution::Remote(endpoint) => {
                let out = msg.stamped(&self.inner.address, &endpoint.address);
                self.inner
                    .remote
                    .post_messages(&endpoint.address, std::slice::from_ref(&out))
                    .await
                    .map_err(|e| {
                        Error::Undeliverable(format!(
                            "forwarding to node {} at {} failed: {}",
                            endpoint.node_id, endpoint.address, e
                        ))
                    })?;
                self.inner.stats.forwarded.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    sender = msg.sender,
                    receiver = msg.receiver,
                    "Forwarded message to {}",
                    endpoint.address
                );
                Ok(Delivery::Forwarded {
                    address: endpoint.address,
                })
            }
            Resolution::NotFound => Err(Error::Undeliverable(format!(
                "receiver {} is unknown to this node and its peers",
                msg.receiver
            ))),
        }
    }

    /// Deliver a message and recover if it turns out to be undeliverable.
    ///
    /// Messages that entered from another node are reported back to their
    /// origin, which owns the retry. Messages that originated here get one
    /// retry through [`Router::handle_undeliverable`].
    pub async fn dispatch(&self, msg: ACLMessage) -> Result<Delivery> {
        let target = self.resolve(msg.receiver).await;
        self.dispatch_to(msg, target).await
    }

    /// [`Router::dispatch`] for an already resolved target.
    pub async fn dispatch_to(&self, msg: ACLMessage, target: Resolution) -> Result<Delivery> {
        match self.deliver_to(&msg, target).await {
            Err(Error::Undeliverable(reason)) => self.recover(msg, reason).await,
            other => other,
        }
    }

    /// Count and log a message refused because a queue in front of the
    /// receiver is full.
    pub(crate) fn congested(&self, msg: &ACLMessage, reason: &str) -> Error {
        self.inner.stats.congested.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            sender = msg.sender,
            receiver = msg.receiver,
            "Delivery refused: {}",
            reason
        );
        Error::Congested(reason.to_string())
    }

    /// Deliver a batch. Each message is handled on its own; results keep the
    /// batch order.
    pub async fn dispatch_batch(&self, msgs: Vec<ACLMessage>) -> Vec<Result<Delivery>> {
        let mut results = Vec::with_capacity(msgs.len());
        for msg in msgs {
            let (sender, receiver) = (msg.sender, msg.receiver);
            let result = self.dispatch(msg).await;
            if let Err(e) = &result {
                tracing::warn!(sender, receiver, "Message not delivered: {}", e);
            }
            results.push(result);
        }
        results
    }

    /// Retry an undeliverable message exactly once via fresh resolution.
    /// A message that already is the retry copy is dropped.
    pub async fn handle_undeliverable(&self, msg: ACLMessage) -> Result<Delivery> {
        if msg.redelivery {
            let reason = "retry copy reported undeliverable".to_string();
            self.drop_message(&msg, &reason);
            return Err(Error::Undeliverable(reason));
        }

        self.inner.stats.retried.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            sender = msg.sender,
            receiver = msg.receiver,
            "Retrying undeliverable message"
        );

        let retry = msg.for_redelivery();
        match self.send(&retry).await {
            Ok(delivery) => Ok(delivery),
            Err(e) => {
                self.drop_message(&retry, &e.to_string());
                Err(e)
            }
        }
    }

    pub(crate) async fn recover(&self, msg: ACLMessage, reason: String) -> Result<Delivery> {
        if msg.redelivery {
            self.drop_message(&msg, &reason);
            return Err(Error::Undeliverable(reason));
        }

        if msg.is_remote_origin(&self.inner.address) {
            let origin = msg.agency_sender.clone();
            match self.inner.remote.post_undeliverable(&origin, &msg).await {
                Ok(()) => tracing::info!(
                    sender = msg.sender,
                    receiver = msg.receiver,
                    "Reported undeliverable message to {}",
                    origin
                ),
                Err(e) => self.drop_message(
                    &msg,
                    &format!("{}; reporting to {} failed: {}", reason, origin, e),
                ),
            }
            return Err(Error::Undeliverable(reason));
        }

        self.handle_undeliverable(msg).await
    }

    fn drop_message(&self, msg: &ACLMessage, reason: &str) {
        self.inner.stats.dropped.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            sender = msg.sender,
            receiver = msg.receiver,
            agency_sender = %msg.agency_sender,
            conversation_id = %msg.conversation_id,
            "Dropping undeliverable message: {}",
            reason
        );
    }
}
