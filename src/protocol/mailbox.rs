//! Bounded inbound message channel of an agent.
//!
//! The agent record owns the [`Mailbox`] (sending side); the agent's task owns
//! the [`Inbox`] (receiving side). Closing the mailbox ends the task's message
//! stream once buffered messages have been drained.

use std::sync::Mutex;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;

use super::envelope::ACLMessage;
use super::types::AgentId;
use crate::error::{Error, Result};

/// Default queue bound of a mailbox.
pub const DEFAULT_INBOX_CAPACITY: usize = 256;

/// Sending side of an agent's inbound channel.
#[derive(Debug)]
pub struct Mailbox {
    agent_id: AgentId,
    capacity: usize,
    tx: Mutex<Option<mpsc::Sender<ACLMessage>>>,
}

/// Receiving side of an agent's inbound channel.
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::Receiver<ACLMessage>,
}

impl Mailbox {
    /// Create a mailbox and the matching inbox.
    pub fn channel(agent_id: AgentId, capacity: usize) -> (Mailbox, Inbox) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        (
            Mailbox {
                agent_id,
                capacity,
                tx: Mutex::new(Some(tx)),
            },
            Inbox { rx },
        )
    }

    /// Place a message on the queue without waiting.
    ///
    /// Fails with `Congested` when the queue is full and with `Undeliverable`
    /// once the mailbox has been closed.
    pub fn try_deliver(&self, msg: ACLMessage) -> Result<()> {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let tx = guard.as_ref().ok_or_else(|| {
            Error::Undeliverable(format!("inbox of agent {} is closed", self.agent_id))
        })?;

        match tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::Congested(format!(
                "inbox of agent {} is full ({} messages)",
                self.agent_id, self.capacity
            ))),
            Err(TrySendError::Closed(_)) => Err(Error::Undeliverable(format!(
                "agent {} no longer reads its inbox",
                self.agent_id
            ))),
        }
    }

    /// Close the mailbox. Returns true only for the call that actually closed it.
    pub fn close(&self) -> bool {
        let mut guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        guard.take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of messages waiting to be read.
    pub fn pending(&self) -> usize {
        match self.tx.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(tx) => self.capacity - tx.capacity(),
            None => 0,
        }
    }
}

impl Inbox {
    /// Wait for the next message. `None` once the mailbox is closed and drained.
    pub async fn recv(&mut self) -> Option<ACLMessage> {
        self.rx.recv().await
    }

    /// Take a message if one is queued.
    pub fn try_recv(&mut self) -> Option<ACLMessage> {
        self.rx.try_recv().ok()
    }

    pub fn into_stream(self) -> ReceiverStream<ACLMessage> {
        ReceiverStream::new(self.rx)
    }
}
