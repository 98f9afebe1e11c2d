//! Directory facilitator (DF) client: agents advertise and look up services.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::AgentIdentity;

/// Service advertised by an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Service {
    pub id: String,
    #[serde(rename = "agentid")]
    pub agent_id: u64,
    #[serde(rename = "nodeid")]
    pub node_id: u64,
    #[serde(rename = "masid")]
    pub mas_id: u64,
    pub desc: String,
}

#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Advertise a service; returns its id.
    async fn register(&self, desc: &str) -> Result<String>;

    async fn deregister(&self, service_id: &str) -> Result<()>;

    /// Services within the same MAS whose description matches exactly.
    async fn search(&self, desc: &str) -> Result<Vec<Service>>;

    /// Withdraw every service registered through this client.
    async fn close(&self) -> Result<()>;
}

/// In-process directory facilitator shared by all agents of the agency.
#[derive(Debug, Default)]
pub struct LocalDirectory {
    services: RwLock<HashMap<String, Service>>,
}

impl LocalDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(self: &Arc<Self>, identity: AgentIdentity) -> LocalDirectoryClient {
        LocalDirectoryClient {
            identity,
            directory: Arc::clone(self),
            registered: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.services.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, service: Service) {
        self.services
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(service.id.clone(), service);
    }

    fn remove(&self, service_id: &str) -> Option<Service> {
        self.services
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(service_id)
    }

    fn find(&self, mas_id: u64, desc: &str) -> Vec<Service> {
        self.services
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|s| s.mas_id == mas_id && s.desc == desc)
            .cloned()
            .collect()
    }
}

pub struct LocalDirectoryClient {
    identity: AgentIdentity,
    directory: Arc<LocalDirectory>,
    registered: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl LocalDirectoryClient {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::internal(format!(
                "directory client of agent {} is closed",
                self.identity.agent_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryClient for LocalDirectoryClient {
    async fn register(&self, desc: &str) -> Result<String> {
        self.ensure_open()?;
        if desc.trim().is_empty() {
            return Err(Error::InvalidInput("empty service description".to_string()));
        }

        let service = Service {
            id: ulid::Ulid::new().to_string(),
            agent_id: self.identity.agent_id,
            node_id: self.identity.node_id,
            mas_id: self.identity.mas_id,
            desc: desc.to_string(),
        };
        let id = service.id.clone();
        self.directory.insert(service);
        self.registered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(id.clone());
        Ok(id)
    }

    async fn deregister(&self, service_id: &str) -> Result<()> {
        self.ensure_open()?;
        let mut registered = self.registered.lock().unwrap_or_else(|e| e.into_inner());
        let pos = registered
            .iter()
            .position(|id| id == service_id)
            .ok_or_else(|| Error::NotFound(format!("service {}", service_id)))?;
        registered.remove(pos);
        self.directory.remove(service_id);
        Ok(())
    }

    async fn search(&self, desc: &str) -> Result<Vec<Service>> {
        self.ensure_open()?;
        Ok(self.directory.find(self.identity.mas_id, desc))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let ids = std::mem::take(&mut *self.registered.lock().unwrap_or_else(|e| e.into_inner()));
        for id in ids {
            self.directory.remove(&id);
        }
        Ok(())
    }
}
