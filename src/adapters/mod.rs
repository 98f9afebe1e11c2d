//! Collaborator adapters wired into every agent.

use std::sync::Arc;

pub mod directory;
pub mod logger;
pub mod pubsub;

pub use directory::{DirectoryClient, LocalDirectory, Service};
pub use logger::{AgentLogger, TracingLogger};
pub use pubsub::{LocalBroker, Publication, PubSubClient};

use crate::error::Result;
use crate::protocol::AgentIdentity;

/// Adapters owned by one agent, closed exactly once at termination.
pub struct AgentAdapters {
    pub logger: Box<dyn AgentLogger>,
    pub pubsub: Box<dyn PubSubClient>,
    pub directory: Box<dyn DirectoryClient>,
}

/// Builds the adapters for a newly created agent.
pub trait AdapterFactory: Send + Sync {
    fn build(&self, identity: &AgentIdentity) -> Result<AgentAdapters>;
}

/// Adapter factory backed by in-process collaborators.
#[derive(Clone, Default)]
pub struct LocalAdapters {
    broker: LocalBroker,
    directory: Arc<LocalDirectory>,
}

impl LocalAdapters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broker(&self) -> &LocalBroker {
        &self.broker
    }

    pub fn directory(&self) -> &Arc<LocalDirectory> {
        &self.directory
    }
}

impl AdapterFactory for LocalAdapters {
    fn build(&self, identity: &AgentIdentity) -> Result<AgentAdapters> {
        Ok(AgentAdapters {
            logger: Box::new(TracingLogger::new(identity.agent_id)),
            pubsub: Box::new(self.broker.client(identity.agent_id)),
            directory: Box::new(self.directory.client(*identity)),
        })
    }
}
