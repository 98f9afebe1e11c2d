//! Agent behaviour contract.
//!
//! The runtime treats behaviour as opaque: a task receives its agent and the
//! agent's inbox and runs until it returns. Closing the inbox at termination is
//! the only stop signal; tasks that loop on the inbox end on their own.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_stream::StreamExt;

use crate::agent::Agent;
use crate::error::Result;
use crate::protocol::{Inbox, Performative};

/// Caller-supplied behaviour executed once per agent.
#[async_trait]
pub trait AgentTask: Send + Sync {
    async fn run(&self, agent: Arc<Agent>, inbox: Inbox) -> Result<()>;
}

#[async_trait]
impl<F, Fut> AgentTask for F
where
    F: Fn(Arc<Agent>, Inbox) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn run(&self, agent: Arc<Agent>, inbox: Inbox) -> Result<()> {
        (self)(agent, inbox).await
    }
}

/// Default behaviour of the `agency` binary: logs every message and answers
/// requests with an `inform` carrying the same content.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoTask;

#[async_trait]
impl AgentTask for EchoTask {
    async fn run(&self, agent: Arc<Agent>, inbox: Inbox) -> Result<()> {
        agent.log_info(&format!("{} ready", agent.name()));

        let mut messages = inbox.into_stream();
        while let Some(msg) = messages.next().await {
            agent.log_info(&format!(
                "received {:?} from {}: {}",
                msg.performative, msg.sender, msg.content
            ));

            if msg.performative == Performative::Request {
                let reply = msg.reply(Performative::Inform, msg.content.clone());
                if let Err(e) = agent.send(reply).await {
                    agent.log_error(&format!("reply to {} failed: {}", msg.sender, e));
                }
            }
        }

        Ok(())
    }
}
