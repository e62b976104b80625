use async_trait::async_trait;

use crate::error::OrchestrationError;

/// A member of an orchestration: receives a task, returns textual content.
/// Implementations may perform network I/O but must not mutate shared state
/// beyond their own response.
#[async_trait]
pub trait AgentCapability: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn invoke(&self, task: &str) -> Result<String, OrchestrationError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub agent: String,
    pub content: String,
}

/// One slot per registered member: either its response content or the error
/// recorded for it. Members are never silently dropped from a run.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub agent: String,
    pub result: Result<String, OrchestrationError>,
}

impl AgentOutcome {
    pub fn response(&self) -> Option<Response> {
        self.result.as_ref().ok().map(|content| Response {
            agent: self.agent.clone(),
            content: content.clone(),
        })
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}
