//! Resolution of agents hosted on other agency nodes.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::config::PeerConfig;
use crate::protocol::AgentId;

/// Where a remote agent lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    pub node_id: u64,
    /// Base URL of the owning agency
    pub address: String,
}

/// Peer directory consulted when an agent is not hosted locally.
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    async fn resolve(&self, agent_id: AgentId) -> Option<RemoteEndpoint>;
}

/// Peer table loaded from configuration, updatable at runtime.
#[derive(Debug, Default)]
pub struct StaticPeers {
    routes: RwLock<HashMap<AgentId, RemoteEndpoint>>,
}

impl StaticPeers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(peers: &[PeerConfig]) -> Self {
        let table = Self::new();
        for peer in peers {
            let endpoint = RemoteEndpoint {
                node_id: peer.node_id,
                address: peer.address.trim_end_matches('/').to_string(),
            };
            for agent_id in &peer.agents {
                table.insert(*agent_id, endpoint.clone());
            }
        }
        table
    }

    pub fn insert(&self, agent_id: AgentId, endpoint: RemoteEndpoint) {
        self.routes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(agent_id, endpoint);
    }

    pub fn remove(&self, agent_id: AgentId) -> Option<RemoteEndpoint> {
        self.routes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&agent_id)
    }

    pub fn len(&self) -> usize {
        self.routes.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PeerDirectory for StaticPeers {
    async fn resolve(&self, agent_id: AgentId) -> Option<RemoteEndpoint> {
        self.routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&agent_id)
            .cloned()
    }
}
