//! The agency: registry of all locally hosted agents.
//!
//! Membership changes (create/remove) take the table's write lock; reads and
//! per-agent mutation never hold it for longer than a map lookup.

use std::sync::Arc;

use super::peers::{PeerDirectory, StaticPeers};
use super::remote::RemoteClient;
use super::routing::Router;
use super::AgentTable;
use crate::adapters::{AdapterFactory, LocalAdapters};
use crate::agent::Agent;
use crate::config::AgencyConfig;
use crate::error::{Error, Result};
use crate::protocol::{AgencyInfo, AgentId, AgentInfo, Status};
use crate::task::AgentTask;

pub struct Agency {
    name: String,
    mas_id: u64,
    node_id: u64,
    inbox_capacity: usize,
    agents: Arc<AgentTable>,
    router: Router,
    adapters: Arc<dyn AdapterFactory>,
    task: Arc<dyn AgentTask>,
}

impl Agency {
    /// Agency with in-process adapters and the peer table from `config`.
    pub fn new(config: &AgencyConfig, task: Arc<dyn AgentTask>) -> Result<Arc<Self>> {
        Self::with_parts(
            config,
            task,
            Arc::new(LocalAdapters::new()),
            Arc::new(StaticPeers::from_config(&config.peers)),
        )
    }

    pub fn with_parts(
        config: &AgencyConfig,
        task: Arc<dyn AgentTask>,
        adapters: Arc<dyn AdapterFactory>,
        peers: Arc<dyn PeerDirectory>,
    ) -> Result<Arc<Self>> {
        let agents = Arc::new(AgentTable::default());
        let remote = RemoteClient::new(config.forward_timeout())?;
        let router = Router::new(
            Arc::clone(&agents),
            peers,
            remote,
            config.advertised_address(),
        );

        Ok(Arc::new(Self {
            name: config.name.clone(),
            mas_id: config.mas_id,
            node_id: config.node_id,
            inbox_capacity: config.inbox_capacity,
            agents,
            router,
            adapters,
            task,
        }))
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Create an agent, register it and start its task.
    ///
    /// A duplicate id is a `Conflict` and leaves the existing agent untouched.
    pub async fn create_agent(&self, info: AgentInfo) -> Result<Arc<Agent>> {
        info.validate()?;

        let conflict = || Error::Conflict(format!("agent {} already exists", info.id));
        if self.agents.read().await.contains_key(&info.id) {
            return Err(conflict());
        }

        // Adapters may talk to remote collaborators; build them outside the table lock.
        let adapters = self.adapters.build(&info.identity())?;
        let agent = Agent::new(&info, adapters, self.router.clone(), self.inbox_capacity);

        {
            let mut agents = self.agents.write().await;
            if agents.contains_key(&info.id) {
                drop(agents);
                // Lost a race with another create; release what was built for this one.
                agent.terminate().await;
                return Err(conflict());
            }
            agents.insert(info.id, Arc::clone(&agent));
        }

        if info.spec.node_id != self.node_id {
            tracing::debug!(
                agent_id = info.id,
                "Agent declares node {} but is hosted on node {}",
                info.spec.node_id,
                self.node_id
            );
        }

        // Started outside the table lock.
        agent.start(Arc::clone(&self.task))?;
        Ok(agent)
    }

    /// Terminate an agent and drop it from the registry.
    ///
    /// The entry is removed only after termination has completed. Lookups in
    /// between see an inactive agent and report `NotFound`.
    pub async fn remove_agent(&self, id: AgentId) -> Result<()> {
        let agent = {
            let agents = self.agents.read().await;
            agents
                .get(&id)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("agent {}", id)))?
        };

        agent.terminate().await;

        let mut agents = self.agents.write().await;
        match agents.get(&id) {
            Some(current) if Arc::ptr_eq(current, &agent) => {
                agents.remove(&id);
                tracing::info!(agent_id = id, "Removed agent");
                Ok(())
            }
            _ => Err(Error::NotFound(format!("agent {}", id))),
        }
    }

    pub async fn get_agent(&self, id: AgentId) -> Result<Arc<Agent>> {
        let agents = self.agents.read().await;
        match agents.get(&id) {
            Some(agent) if agent.is_active() => Ok(Arc::clone(agent)),
            _ => Err(Error::NotFound(format!("agent {}", id))),
        }
    }

    pub async fn get_agent_status(&self, id: AgentId) -> Result<Status> {
        Ok(self.get_agent(id).await?.status())
    }

    pub async fn update_agent_custom(&self, id: AgentId, custom: String) -> Result<()> {
        self.get_agent(id).await?.update_custom_data(custom)
    }

    pub async fn get_agency_info(&self) -> Result<AgencyInfo> {
        let mut agents: Vec<AgentInfo> = {
            let table = self.agents.read().await;
            table
                .values()
                .filter(|a| a.is_active())
                .map(|a| a.info())
                .collect()
        };
        agents.sort_by_key(|a| a.id);

        Ok(AgencyInfo {
            mas_id: self.mas_id,
            name: self.name.clone(),
            id: self.node_id,
            address: self.router.address().to_string(),
            agents,
        })
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Terminate and remove every hosted agent.
    pub async fn shutdown(&self) {
        let ids: Vec<AgentId> = self.agents.read().await.keys().copied().collect();
        tracing::info!("Shutting down agency, terminating {} agents", ids.len());
        for id in ids {
            if let Err(e) = self.remove_agent(id).await {
                tracing::warn!(agent_id = id, "Failed to remove agent during shutdown: {}", e);
            }
        }
    }
}
