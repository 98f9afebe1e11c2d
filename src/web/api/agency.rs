//! API endpoints for the agency and its agents.
//!
//! Creation and message intake only validate the body and queue the work;
//! removal, status and custom data are answered synchronously.

use axum::{
    body::Bytes,
    extract::{OriginalUri, Path, State},
    http::StatusCode,
    Json,
};
use serde::de::DeserializeOwned;

use super::{fail, ApiError, AppState};
use crate::core::Job;
use crate::error::Error;
use crate::protocol::{ACLMessage, AgencyInfo, AgentId, AgentInfo, Status};

type Accepted = (StatusCode, &'static str);

fn decode<T: DeserializeOwned>(body: &Bytes) -> Result<T, Error> {
    serde_json::from_slice(body).map_err(|e| Error::InvalidInput(format!("malformed body: {}", e)))
}

/// Path ids that do not parse cannot name an agent.
fn parse_id(raw: &str) -> Result<AgentId, Error> {
    raw.parse::<AgentId>()
        .map_err(|_| Error::NotFound(format!("agent {}", raw)))
}

/// Describe this agency and its active agents.
pub async fn get_agency(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
) -> Result<Json<AgencyInfo>, ApiError> {
    let info = state
        .agency
        .get_agency_info()
        .await
        .map_err(|e| fail(&uri, e))?;
    Ok(Json(info))
}

/// Queue creation of an agent.
pub async fn post_agent(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    body: Bytes,
) -> Result<Accepted, ApiError> {
    let info: AgentInfo = decode(&body).map_err(|e| fail(&uri, e))?;
    tracing::debug!(agent_id = info.id, "Queueing agent creation");
    state
        .intake
        .submit(Job::CreateAgent(info))
        .map_err(|e| fail(&uri, e))?;
    Ok((StatusCode::CREATED, "Resource Created"))
}

/// Queue a batch of messages for delivery.
pub async fn post_messages(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    body: Bytes,
) -> Result<Accepted, ApiError> {
    let msgs: Vec<ACLMessage> = decode(&body).map_err(|e| fail(&uri, e))?;
    state
        .intake
        .submit(Job::Messages(msgs))
        .map_err(|e| fail(&uri, e))?;
    Ok((StatusCode::CREATED, "Resource Created"))
}

/// Queue a message another node could not deliver.
pub async fn post_undeliverable(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    body: Bytes,
) -> Result<Accepted, ApiError> {
    let msg: ACLMessage = decode(&body).map_err(|e| fail(&uri, e))?;
    state
        .intake
        .submit(Job::Undeliverable(msg))
        .map_err(|e| fail(&uri, e))?;
    Ok((StatusCode::CREATED, "Resource Created"))
}

pub async fn delete_agent(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Path(agentid): Path<String>,
) -> Result<Accepted, ApiError> {
    let id = parse_id(&agentid).map_err(|e| fail(&uri, e))?;
    state
        .agency
        .remove_agent(id)
        .await
        .map_err(|e| fail(&uri, e))?;
    Ok((StatusCode::OK, "Resource Deleted"))
}

pub async fn get_agent_status(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Path(agentid): Path<String>,
) -> Result<Json<Status>, ApiError> {
    let id = parse_id(&agentid).map_err(|e| fail(&uri, e))?;
    let status = state
        .agency
        .get_agent_status(id)
        .await
        .map_err(|e| fail(&uri, e))?;
    Ok(Json(status))
}

/// Replace an agent's custom data with the raw request body.
pub async fn put_agent_custom(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Path(agentid): Path<String>,
    body: Bytes,
) -> Result<Accepted, ApiError> {
    let id = parse_id(&agentid).map_err(|e| fail(&uri, e))?;
    let custom = String::from_utf8(body.to_vec())
        .map_err(|_| fail(&uri, Error::InvalidInput("custom data is not UTF-8".to_string())))?;
    state
        .agency
        .update_agent_custom(id, custom)
        .await
        .map_err(|e| fail(&uri, e))?;
    Ok((StatusCode::OK, "Resource Updated"))
}
