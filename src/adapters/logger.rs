//! Per-agent logger adapter.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::AgentId;

/// Logger handed to every agent. Writes are best-effort and never block.
#[async_trait]
pub trait AgentLogger: Send + Sync {
    fn info(&self, msg: &str);

    fn error(&self, msg: &str);

    /// Release the logger. Later writes are dropped.
    async fn close(&self) -> Result<()>;
}

/// Logger that writes through `tracing` with the agent id attached.
pub struct TracingLogger {
    agent_id: AgentId,
    closed: AtomicBool,
}

impl TracingLogger {
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl AgentLogger for TracingLogger {
    fn info(&self, msg: &str) {
        if !self.is_closed() {
            tracing::info!(agent_id = self.agent_id, "{}", msg);
        }
    }

    fn error(&self, msg: &str) {
        if !self.is_closed() {
            tracing::error!(agent_id = self.agent_id, "{}", msg);
        }
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(agent_id = self.agent_id, "Agent logger closed");
        }
        Ok(())
    }
}
