use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::agent::AgentCapability;
use crate::error::OrchestrationError;

pub const DEFAULT_API_VERSION: &str = "2024-10-21";
const COMPLETION_HTTP_TIMEOUT_SECS: u64 = 60;

/// Backend that turns (instructions, task) into completion text. Split out
/// from the agent so tests can substitute a deterministic implementation.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, instructions: &str, task: &str) -> Result<String>;
}

/// Chat-completion client for Azure-style deployments:
/// POST {endpoint}/openai/deployments/{deployment}/chat/completions
/// authenticated with an `api-key` header.
pub struct ChatCompletionClient {
    http: reqwest::Client,
    endpoint: String,
    deployment: String,
    api_key: String,
    api_version: String,
}

impl ChatCompletionClient {
    pub fn new(
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
        api_key: impl Into<String>,
        api_version: Option<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(COMPLETION_HTTP_TIMEOUT_SECS))
            .build()
            .context("failed to build completion HTTP client")?;

        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            deployment: deployment.into(),
            api_key: api_key.into(),
            api_version: api_version.unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        })
    }
}

#[async_trait]
impl CompletionBackend for ChatCompletionClient {
    async fn complete(&self, instructions: &str, task: &str) -> Result<String> {
        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.deployment, self.api_version
        );
        let body = json!({
            "messages": [
                {"role": "system", "content": instructions},
                {"role": "user", "content": task},
            ],
        });

        let response = self
            .http
            .post(&url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("completion request to deployment '{}' failed", self.deployment))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "completion request to deployment '{}' returned {}: {}",
                self.deployment,
                status,
                truncate_detail(&detail)
            );
        }

        let payload = response
            .json::<Value>()
            .await
            .context("completion response was not valid JSON")?;
        extract_completion_text(&payload)
    }
}

pub fn extract_completion_text(payload: &Value) -> Result<String> {
    let content = payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .context("completion response contained no message content")?;

    let trimmed = content.trim();
    if trimmed.is_empty() {
        anyhow::bail!("completion response message content was empty");
    }
    Ok(trimmed.to_string())
}

fn truncate_detail(detail: &str) -> &str {
    let cut = detail
        .char_indices()
        .nth(400)
        .map(|(idx, _)| idx)
        .unwrap_or(detail.len());
    detail[..cut].trim()
}

/// Locally-configured member: fixed instruction text plus a completion
/// backend, statelessly mapping a task to content.
pub struct LocalAgent {
    name: String,
    description: String,
    instructions: String,
    backend: Arc<dyn CompletionBackend>,
}

impl LocalAgent {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        instructions: impl Into<String>,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            instructions: instructions.into(),
            backend,
        }
    }
}

#[async_trait]
impl AgentCapability for LocalAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, task: &str) -> Result<String, OrchestrationError> {
        self.backend
            .complete(&self.instructions, task)
            .await
            .map_err(|err| OrchestrationError::invocation(&self.name, &err))
    }
}
