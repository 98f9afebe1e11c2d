//! HTTP client for talking to other agency nodes.

use std::time::Duration;

use reqwest::Client;

use crate::error::{Error, Result};
use crate::protocol::{ACLMessage, AgencyInfo, AgentId, AgentInfo, Status};

/// Client for the agency API of another node. Every request is bounded by the
/// configured timeout; a timeout is reported like any connection failure.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    client: Client,
}

fn url(address: &str, path: &str) -> String {
    format!("{}/api{}", address.trim_end_matches('/'), path)
}

impl RemoteClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Hand messages to the message intake of another node.
    pub async fn post_messages(&self, address: &str, msgs: &[ACLMessage]) -> Result<()> {
        self.client
            .post(url(address, "/agency/msgs"))
            .json(msgs)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Report a message back to the node it came from.
    pub async fn post_undeliverable(&self, address: &str, msg: &ACLMessage) -> Result<()> {
        self.client
            .post(url(address, "/agency/msgundeliv"))
            .json(msg)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn get_agency(&self, address: &str) -> Result<AgencyInfo> {
        let info = self
            .client
            .get(url(address, "/agency"))
            .send()
            .await?
            .error_for_status()?
            .json::<AgencyInfo>()
            .await?;
        Ok(info)
    }

    pub async fn create_agent(&self, address: &str, info: &AgentInfo) -> Result<()> {
        self.client
            .post(url(address, "/agency/agents"))
            .json(info)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn remove_agent(&self, address: &str, id: AgentId) -> Result<()> {
        let response = self
            .client
            .delete(url(address, &format!("/agency/agents/{}", id)))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("agent {}", id)));
        }
        response.error_for_status()?;
        Ok(())
    }

    pub async fn agent_status(&self, address: &str, id: AgentId) -> Result<Status> {
        let response = self
            .client
            .get(url(address, &format!("/agency/agents/{}/status", id)))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("agent {}", id)));
        }
        Ok(response.error_for_status()?.json::<Status>().await?)
    }
}
