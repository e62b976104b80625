use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::AgentCapability;
use crate::completion::{ChatCompletionClient, CompletionBackend, LocalAgent};
use crate::config::{RemoteSettings, RuntimeConfig};
use crate::credentials::resolve_remote_credential;
use crate::error::OrchestrationError;
use crate::remote::{RemoteAgent, RemoteAgentClient};

/// Builds the member set for one orchestration: catalog-defined local agents
/// first (name order), then the remote agent when remote settings are
/// present. Configuration problems fail here, before any dispatch. An
/// authentication failure is fatal for the remote member only: the roster
/// still builds and the remote slot carries the recorded error.
pub async fn build_members(
    cfg: &RuntimeConfig,
) -> Result<Vec<Arc<dyn AgentCapability>>, OrchestrationError> {
    let mut members: Vec<Arc<dyn AgentCapability>> = Vec::new();

    if !cfg.agents.is_empty() {
        let backend = build_completion_backend(cfg)?;
        for entry in &cfg.agents {
            members.push(Arc::new(LocalAgent::new(
                entry.name.clone(),
                entry.description.clone(),
                entry.instructions.clone(),
                backend.clone(),
            )));
        }
    }

    if let Some(remote) = cfg.remote.as_ref() {
        match resolve_remote_member(remote).await {
            Ok(agent) => members.push(agent),
            Err(err @ OrchestrationError::Authentication(_)) => {
                tracing::warn!(
                    agent = %remote.agent_name,
                    error = %err,
                    "remote agent credential unavailable; local members continue without it"
                );
                members.push(Arc::new(UnavailableAgent {
                    name: remote.agent_name.clone(),
                    error: err,
                }));
            }
            Err(err) => return Err(err),
        }
    }

    if members.is_empty() {
        return Err(OrchestrationError::Configuration(
            "no member agents configured; add entries to .ensemble/agents.toml or set remote \
             agent settings"
                .to_string(),
        ));
    }

    Ok(members)
}

async fn resolve_remote_member(
    remote: &RemoteSettings,
) -> Result<Arc<dyn AgentCapability>, OrchestrationError> {
    let credential = resolve_remote_credential(&remote.token_env)?;
    let client = RemoteAgentClient::new(remote.endpoint.clone(), credential)
        .map_err(|err| OrchestrationError::Configuration(format!("{err:#}")))?;
    let agent =
        RemoteAgent::resolve(remote.agent_name.clone(), Arc::new(client), &remote.agent_id)
            .await?;
    tracing::info!(
        agent = %remote.agent_name,
        agent_id = %remote.agent_id,
        "resolved remote agent definition"
    );
    Ok(Arc::new(agent))
}

/// Placeholder slot for a remote member whose credential could not be
/// acquired. Keeps the member attributable in the run; its slot reports the
/// recorded error on every invocation.
struct UnavailableAgent {
    name: String,
    error: OrchestrationError,
}

#[async_trait]
impl AgentCapability for UnavailableAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Remote agent (credential unavailable)"
    }

    async fn invoke(&self, _task: &str) -> Result<String, OrchestrationError> {
        Err(self.error.clone())
    }
}

fn build_completion_backend(
    cfg: &RuntimeConfig,
) -> Result<Arc<dyn CompletionBackend>, OrchestrationError> {
    let settings = cfg.completion.as_ref().ok_or_else(|| {
        OrchestrationError::Configuration(
            "local agents are configured but no completion endpoint/deployment is set; \
             set --endpoint and --deployment or their profile/env equivalents"
                .to_string(),
        )
    })?;
    let api_key = settings.api_key()?;

    let client = ChatCompletionClient::new(
        settings.endpoint.clone(),
        settings.deployment.clone(),
        api_key,
        settings.api_version.clone(),
    )
    .map_err(|err| OrchestrationError::Configuration(format!("{err:#}")))?;

    Ok(Arc::new(client))
}
