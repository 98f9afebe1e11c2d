//! Records exchanged between the agency, its agents and the outside world.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Globally unique agent identifier.
pub type AgentId = u64;

/// Agent lifecycle state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    #[default]
    Created,
    Running,
    Terminated,
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusCode::Created => write!(f, "created"),
            StatusCode::Running => write!(f, "running"),
            StatusCode::Terminated => write!(f, "terminated"),
        }
    }
}

/// Status of an agent as reported over the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Status {
    pub code: StatusCode,
    #[serde(rename = "lastupdate")]
    pub last_update: DateTime<Utc>,
}

impl Status {
    pub fn new(code: StatusCode) -> Self {
        Self {
            code,
            last_update: Utc::now(),
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::new(StatusCode::Created)
    }
}

/// Identity triple of an agent. Never changes after creation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AgentIdentity {
    #[serde(rename = "agentid")]
    pub agent_id: AgentId,
    #[serde(rename = "nodeid")]
    pub node_id: u64,
    #[serde(rename = "masid")]
    pub mas_id: u64,
}

/// Creation-time description of an agent.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AgentSpec {
    #[serde(rename = "nodeid", default)]
    pub node_id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub a_type: String,
    #[serde(rename = "subtype", default)]
    pub a_subtype: String,
    #[serde(default)]
    pub custom: String,
}

/// Agent description as decoded from `POST /agency/agents` and reported by
/// `GET /agency`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AgentInfo {
    pub spec: AgentSpec,
    #[serde(rename = "masid", default)]
    pub mas_id: u64,
    pub id: AgentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusCode>,
}

impl AgentInfo {
    pub fn new(id: AgentId, name: impl Into<String>, a_type: impl Into<String>) -> Self {
        Self {
            spec: AgentSpec {
                name: name.into(),
                a_type: a_type.into(),
                ..Default::default()
            },
            id,
            ..Default::default()
        }
    }

    pub fn with_node(mut self, node_id: u64) -> Self {
        self.spec.node_id = node_id;
        self
    }

    pub fn with_mas(mut self, mas_id: u64) -> Self {
        self.mas_id = mas_id;
        self
    }

    pub fn with_custom(mut self, custom: impl Into<String>) -> Self {
        self.spec.custom = custom.into();
        self
    }

    pub fn identity(&self) -> AgentIdentity {
        AgentIdentity {
            agent_id: self.id,
            node_id: self.spec.node_id,
            mas_id: self.mas_id,
        }
    }

    /// Reject records that cannot be hosted.
    pub fn validate(&self) -> Result<()> {
        if self.spec.name.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "agent {} has an empty name",
                self.id
            )));
        }
        if self.spec.a_type.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "agent {} has an empty type",
                self.id
            )));
        }
        Ok(())
    }
}

/// Summary of the agency returned by `GET /agency`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgencyInfo {
    #[serde(rename = "masid")]
    pub mas_id: u64,
    pub name: String,
    pub id: u64,
    pub address: String,
    pub agents: Vec<AgentInfo>,
}

/// FIPA communicative acts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Performative {
    AcceptProposal,
    Agree,
    Cancel,
    Cfp,
    Confirm,
    Disconfirm,
    Failure,
    #[default]
    Inform,
    InformIf,
    InformRef,
    NotUnderstood,
    Propagate,
    Propose,
    Proxy,
    QueryIf,
    QueryRef,
    Refuse,
    RejectProposal,
    Request,
    RequestWhen,
    RequestWhenever,
    Subscribe,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_info_wire_names() {
        let json = r#"{"spec":{"nodeid":5,"name":"pump","type":"device","subtype":"hvac","custom":"x"},"masid":2,"id":1}"#;
        let info: AgentInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.id, 1);
        assert_eq!(info.mas_id, 2);
        assert_eq!(info.spec.node_id, 5);
        assert_eq!(info.spec.a_type, "device");
        assert_eq!(info.spec.a_subtype, "hvac");
        assert!(info.status.is_none());
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        assert!(AgentInfo::new(1, "pump", "device").validate().is_ok());
        assert!(matches!(
            AgentInfo::new(1, " ", "device").validate(),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            AgentInfo::new(1, "pump", "").validate(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_status_code_serialization() {
        let status = Status::new(StatusCode::Running);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["code"], "running");
        assert!(json.get("lastupdate").is_some());
    }

    #[test]
    fn test_performative_names() {
        let p: Performative = serde_json::from_str(r#""accept_proposal""#).unwrap();
        assert_eq!(p, Performative::AcceptProposal);
        assert_eq!(Performative::default(), Performative::Inform);
    }
}
