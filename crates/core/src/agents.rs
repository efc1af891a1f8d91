//! Conversational agent management.

use crate::{
    envelope::ApiResponse,
    error::{Error, Result},
    models::Agent,
    transport::{ApiRequest, HttpTransport},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
struct AgentList {
    agents: Vec<Agent>,
}

#[derive(Deserialize)]
struct AgentItem {
    agent: Agent,
}

#[derive(Deserialize)]
struct AgentCreated {
    agent_id: String,
}

/// Parameters for creating an agent.
#[derive(Debug, Clone, Serialize)]
pub struct CreateAgent {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,
}

/// `Agent ... not found`, the detail the server sends for unknown ids.
fn is_agent_not_found(detail: &str) -> bool {
    detail
        .find("Agent")
        .is_some_and(|start| detail[start..].contains("not found"))
}

#[derive(Clone)]
pub struct Agents {
    transport: Arc<dyn HttpTransport>,
}

impl Agents {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    pub async fn list(&self) -> Result<Vec<Agent>> {
        let response = self.transport.request(ApiRequest::get("agents")).await?;
        match ApiResponse::<AgentList>::parse(response) {
            Some(ApiResponse::Data(list)) => Ok(list.agents),
            _ => Err(Error::unknown("list agents")),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Agent> {
        let response = self
            .transport
            .request(ApiRequest::get(format!("agents/{id}")))
            .await?;
        match ApiResponse::<AgentItem>::parse(response) {
            Some(ApiResponse::Data(item)) => Ok(item.agent),
            _ => Err(Error::unknown("get agent")),
        }
    }

    /// Creates an agent and returns its id.
    pub async fn create(&self, params: CreateAgent) -> Result<String> {
        let request = ApiRequest::post("agents").with_body(serde_json::to_value(&params)?);
        let response = self.transport.request(request).await?;
        match ApiResponse::<AgentCreated>::parse(response) {
            Some(ApiResponse::Data(created)) => Ok(created.agent_id),
            _ => Err(Error::unknown("create agent")),
        }
    }

    /// Deletes an agent. Resolves to `false` when the agent does not exist.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let response = self
            .transport
            .request(ApiRequest::delete(format!("agents/{id}")))
            .await?;
        match ApiResponse::<AgentCreated>::parse(response) {
            Some(ApiResponse::Data(_)) => Ok(true),
            Some(ApiResponse::Detail(detail))
                if detail.message().is_some_and(is_agent_not_found) =>
            {
                Ok(false)
            }
            _ => Err(Error::unknown("delete agent")),
        }
    }
}
