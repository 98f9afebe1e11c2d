//! Enqueue-and-acknowledge intake for work arriving over the API.
//!
//! Handlers submit a [`Job`] and answer immediately; a full queue is refused
//! as `Congested` instead of holding the request. A single worker drains the
//! queue and never waits on the network:
//! - local deliveries are placed on mailboxes inline, in arrival order
//! - forwards go to one lane per peer address, each draining in order
//! - recovery of undeliverable messages runs as its own task
//!
//! Messages of one sender/receiver pair therefore keep their order while a
//! slow peer only delays traffic bound for that peer.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use super::agency::Agency;
use super::peers::RemoteEndpoint;
use super::routing::{Resolution, Router};
use crate::error::{Error, Result};
use crate::protocol::{ACLMessage, AgentInfo};

/// Work accepted from the API.
#[derive(Debug, Clone)]
pub enum Job {
    CreateAgent(AgentInfo),
    Messages(Vec<ACLMessage>),
    Undeliverable(ACLMessage),
}

impl Job {
    fn kind(&self) -> &'static str {
        match self {
            Job::CreateAgent(_) => "create_agent",
            Job::Messages(_) => "messages",
            Job::Undeliverable(_) => "undeliverable",
        }
    }
}

/// Submission side of the intake queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Intake {
    tx: mpsc::Sender<Job>,
}

impl Intake {
    /// Spawn the worker and return the submission handle. `capacity` bounds
    /// the job queue and every forwarding lane.
    pub fn start(agency: Arc<Agency>, capacity: usize) -> (Intake, JoinHandle<()>) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let worker = tokio::spawn(run_worker(agency, rx, capacity));
        (Intake { tx }, worker)
    }

    /// Queue a job without waiting. A full queue is `Congested`; a stopped
    /// worker is `Internal`.
    pub fn submit(&self, job: Job) -> Result<()> {
        let kind = job.kind();
        self.tx.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => {
                tracing::warn!("Intake queue full, {} job refused", kind);
                Error::Congested("intake queue is full".to_string())
            }
            TrySendError::Closed(_) => {
                Error::internal(format!("intake worker stopped, {} job lost", kind))
            }
        })
    }
}

type Forward = (ACLMessage, RemoteEndpoint);

/// Per-peer forwarding queues, keyed by peer address.
struct Lanes {
    router: Router,
    capacity: usize,
    lanes: HashMap<String, mpsc::Sender<Forward>>,
}

impl Lanes {
    fn new(router: Router, capacity: usize) -> Self {
        Self {
            router,
            capacity,
            lanes: HashMap::new(),
        }
    }

    async fn route(&mut self, msg: ACLMessage) {
        match self.router.resolve(msg.receiver).await {
            Resolution::Remote(endpoint) => self.forward(msg, endpoint),
            target => {
                // Local or unknown: settles without network I/O unless recovery is needed.
                let (sender, receiver) = (msg.sender, msg.receiver);
                match self.router.deliver_to(&msg, target).await {
                    Ok(_) => {}
                    Err(Error::Undeliverable(reason)) => spawn_recovery(&self.router, msg, reason),
                    Err(e) => tracing::warn!(sender, receiver, "Message not delivered: {}", e),
                }
            }
        }
    }

    fn forward(&mut self, msg: ACLMessage, endpoint: RemoteEndpoint) {
        let lane = self
            .lanes
            .entry(endpoint.address.clone())
            .or_insert_with(|| spawn_lane(self.router.clone(), self.capacity));

        match lane.try_send((msg, endpoint)) {
            Ok(()) => {}
            Err(TrySendError::Full((msg, endpoint))) => {
                let _ = self.router.congested(
                    &msg,
                    &format!("forwarding lane to {} is full", endpoint.address),
                );
            }
            Err(TrySendError::Closed((msg, endpoint))) => {
                // Lanes only stop with the runtime; replace it and go on.
                let address = endpoint.address.clone();
                let lane = spawn_lane(self.router.clone(), self.capacity);
                if lane.try_send((msg, endpoint)).is_err() {
                    tracing::error!("Fresh forwarding lane to {} refused a message", address);
                }
                self.lanes.insert(address, lane);
            }
        }
    }
}

fn spawn_lane(router: Router, capacity: usize) -> mpsc::Sender<Forward> {
    let (tx, mut rx) = mpsc::channel::<Forward>(capacity);
    tokio::spawn(async move {
        while let Some((msg, endpoint)) = rx.recv().await {
            match router.deliver_to(&msg, Resolution::Remote(endpoint)).await {
                Ok(_) => {}
                Err(Error::Undeliverable(reason)) => spawn_recovery(&router, msg, reason),
                Err(e) => tracing::warn!(
                    sender = msg.sender,
                    receiver = msg.receiver,
                    "Message not forwarded: {}",
                    e
                ),
            }
        }
    });
    tx
}

fn spawn_recovery(router: &Router, msg: ACLMessage, reason: String) {
    let router = router.clone();
    tokio::spawn(async move {
        let (sender, receiver) = (msg.sender, msg.receiver);
        if let Err(e) = router.recover(msg, reason).await {
            tracing::warn!(sender, receiver, "Message not delivered: {}", e);
        }
    });
}

async fn run_worker(agency: Arc<Agency>, mut rx: mpsc::Receiver<Job>, capacity: usize) {
    tracing::debug!("Intake worker started");
    let mut lanes = Lanes::new(agency.router().clone(), capacity);

    while let Some(job) = rx.recv().await {
        match job {
            Job::CreateAgent(info) => {
                let agency = Arc::clone(&agency);
                tokio::spawn(async move {
                    let id = info.id;
                    if let Err(e) = agency.create_agent(info).await {
                        tracing::error!(agent_id = id, "Failed to create agent: {}", e);
                    }
                });
            }
            Job::Messages(msgs) => {
                tracing::debug!("Processing batch of {} messages", msgs.len());
                for msg in msgs {
                    lanes.route(msg).await;
                }
            }
            Job::Undeliverable(msg) => {
                let router = agency.router().clone();
                tokio::spawn(async move {
                    let (sender, receiver) = (msg.sender, msg.receiver);
                    if let Err(e) = router.handle_undeliverable(msg).await {
                        tracing::warn!(sender, receiver, "Redelivery failed: {}", e);
                    }
                });
            }
        }
    }

    tracing::debug!("Intake worker stopped");
}

#[cfg(test)]
impl Intake {
    /// Submission handle with no worker behind it.
    pub(crate) fn detached(capacity: usize) -> (Intake, mpsc::Receiver<Job>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Intake { tx }, rx)
    }
}
