//! Agent communication protocol.
//!
//! This module defines the records the agency exchanges:
//! - Agent and agency descriptions with their wire names
//! - ACL message envelopes
//! - Bounded per-agent mailboxes

pub mod envelope;
pub mod mailbox;
pub mod types;

pub use envelope::{ACLMessage, AclBuilder};
pub use mailbox::{Inbox, Mailbox};
pub use types::{
    AgencyInfo, AgentId, AgentIdentity, AgentInfo, AgentSpec, Performative, Status, StatusCode,
};
