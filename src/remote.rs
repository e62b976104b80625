use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::agent::AgentCapability;
use crate::credentials::Credential;
use crate::error::OrchestrationError;

const REMOTE_HTTP_TIMEOUT_SECS: u64 = 60;

/// Pre-registered agent definition resolved from the remote registry.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Authenticated handle to the remote agent service. Shared read-only across
/// all remote-variant invocations of a run.
pub struct RemoteAgentClient {
    http: reqwest::Client,
    endpoint: String,
    credential: Credential,
}

impl RemoteAgentClient {
    pub fn new(endpoint: impl Into<String>, credential: Credential) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REMOTE_HTTP_TIMEOUT_SECS))
            .build()
            .context("failed to build remote agent HTTP client")?;

        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            credential,
        })
    }

    /// Registry lookup by identifier. A network call in its own right; it
    /// can fail independently of any later invocation.
    pub async fn get_agent(&self, agent_id: &str) -> Result<AgentDefinition> {
        let url = format!("{}/agents/{}", self.endpoint, agent_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.credential.secret())
            .send()
            .await
            .with_context(|| format!("agent definition lookup for '{agent_id}' failed"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("agent definition lookup for '{agent_id}' returned {status}");
        }

        response
            .json::<AgentDefinition>()
            .await
            .with_context(|| format!("agent definition for '{agent_id}' was not valid JSON"))
    }

    pub async fn run_task(&self, agent_id: &str, task: &str) -> Result<String> {
        let url = format!("{}/agents/{}/runs", self.endpoint, agent_id);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.credential.secret())
            .json(&json!({ "input": task }))
            .send()
            .await
            .with_context(|| format!("task run against remote agent '{agent_id}' failed"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("task run against remote agent '{agent_id}' returned {status}");
        }

        let payload = response
            .json::<Value>()
            .await
            .context("remote agent run response was not valid JSON")?;
        payload
            .get("output")
            .and_then(Value::as_str)
            .map(|output| output.trim().to_string())
            .filter(|output| !output.is_empty())
            .context("remote agent run response contained no output text")
    }
}

/// Remotely-hosted member: delegates task execution to an external service
/// and treats it as a black box returning content.
pub struct RemoteAgent {
    name: String,
    description: String,
    definition: AgentDefinition,
    client: Arc<RemoteAgentClient>,
}

impl RemoteAgent {
    /// Resolves the pre-registered definition before the agent can join an
    /// orchestration, so an unknown identifier fails at construction rather
    /// than mid-run.
    pub async fn resolve(
        name: impl Into<String>,
        client: Arc<RemoteAgentClient>,
        agent_id: &str,
    ) -> Result<Self, OrchestrationError> {
        let name = name.into();
        let definition = client.get_agent(agent_id).await.map_err(|err| {
            OrchestrationError::Configuration(format!(
                "remote agent '{agent_id}' could not be resolved: {err:#}"
            ))
        })?;

        let description = definition
            .description
            .clone()
            .unwrap_or_else(|| "Remotely-hosted agent".to_string());

        Ok(Self {
            name,
            description,
            definition,
            client,
        })
    }

    pub fn definition(&self) -> &AgentDefinition {
        &self.definition
    }
}

#[async_trait]
impl AgentCapability for RemoteAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, task: &str) -> Result<String, OrchestrationError> {
        self.client
            .run_task(&self.definition.id, task)
            .await
            .map_err(|err| OrchestrationError::invocation(&self.name, &err))
    }
}
