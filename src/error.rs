use std::time::Duration;

use thiserror::Error;

use crate::runtime::RuntimeState;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestrationError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("agent '{agent}' invocation failed: {message}")]
    AgentInvocation { agent: String, message: String },

    #[error("orchestration timed out after {waited:?}; outstanding members: {}", pending.join(", "))]
    Timeout {
        waited: Duration,
        pending: Vec<String>,
    },

    #[error("runtime is in state {state:?}; start() must be called before scheduling work")]
    RuntimeNotReady { state: RuntimeState },
}

impl OrchestrationError {
    pub fn invocation(agent: impl Into<String>, err: &anyhow::Error) -> Self {
        OrchestrationError::AgentInvocation {
            agent: agent.into(),
            message: format!("{err:#}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Auth,
    Agent,
    Timeout,
    Runtime,
    Internal,
}

impl ErrorCategory {
    pub fn code(self) -> &'static str {
        match self {
            ErrorCategory::Config => "CONFIG",
            ErrorCategory::Auth => "AUTH",
            ErrorCategory::Agent => "AGENT",
            ErrorCategory::Timeout => "TIMEOUT",
            ErrorCategory::Runtime => "RUNTIME",
            ErrorCategory::Internal => "INTERNAL",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            ErrorCategory::Config => {
                "Check .ensemble/config.toml and the --endpoint/--deployment flags, or set \
                 ENSEMBLE_COMPLETION_ENDPOINT and ENSEMBLE_DEPLOYMENT."
            }
            ErrorCategory::Auth => {
                "Export the credential named by --remote-token-env (default \
                 ENSEMBLE_REMOTE_TOKEN) and verify it has not expired."
            }
            ErrorCategory::Agent => {
                "One or more member agents failed. Retry with RUST_LOG=info for per-agent \
                 request logs."
            }
            ErrorCategory::Timeout => {
                "Raise --timeout-secs or drop slow members from the agent catalog."
            }
            ErrorCategory::Runtime => {
                "The runtime was used before start() or after stop_when_idle(); this is a bug \
                 in the calling code."
            }
            ErrorCategory::Internal => {
                "Retry with RUST_LOG=debug. If it persists, capture logs and open an issue."
            }
        }
    }
}

pub fn categorize_error(err: &anyhow::Error) -> ErrorCategory {
    match err.downcast_ref::<OrchestrationError>() {
        Some(OrchestrationError::Configuration(_)) => ErrorCategory::Config,
        Some(OrchestrationError::Authentication(_)) => ErrorCategory::Auth,
        Some(OrchestrationError::AgentInvocation { .. }) => ErrorCategory::Agent,
        Some(OrchestrationError::Timeout { .. }) => ErrorCategory::Timeout,
        Some(OrchestrationError::RuntimeNotReady { .. }) => ErrorCategory::Runtime,
        None => ErrorCategory::Internal,
    }
}

pub fn format_cli_error(err: &anyhow::Error) -> String {
    let category = categorize_error(err);
    format!("[{}] {:#}\nHint: {}", category.code(), err, category.hint())
}
