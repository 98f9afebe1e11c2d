//! Core module - agency registry, message routing and intake.
//!
//! This module contains the heart of the agency node:
//! - Registry of locally hosted agents
//! - Routing of ACL messages to local mailboxes or remote agencies
//! - Enqueue-and-acknowledge intake for work arriving over the API

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::agent::Agent;
use crate::protocol::AgentId;

pub mod agency;
pub mod intake;
pub mod peers;
pub mod remote;
pub mod routing;

pub use agency::Agency;
pub use intake::{Intake, Job};
pub use peers::{PeerDirectory, RemoteEndpoint, StaticPeers};
pub use remote::RemoteClient;
pub use routing::{Delivery, Resolution, Router, RouterStatsSnapshot};

/// Agents hosted on this node, keyed by id.
pub type AgentTable = RwLock<HashMap<AgentId, Arc<Agent>>>;
