use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::agent::{AgentCapability, AgentOutcome};
use crate::error::OrchestrationError;
use crate::runtime::{Runtime, TaskHandle};

/// Fans a single task out to every member concurrently. Member names must be
/// unique; duplicates are rejected here rather than at invoke time.
pub struct ConcurrentOrchestration {
    members: Vec<Arc<dyn AgentCapability>>,
}

impl ConcurrentOrchestration {
    pub fn new(members: Vec<Arc<dyn AgentCapability>>) -> Result<Self, OrchestrationError> {
        if members.is_empty() {
            return Err(OrchestrationError::Configuration(
                "orchestration requires at least one member agent".to_string(),
            ));
        }

        let mut seen = BTreeSet::<String>::new();
        for member in &members {
            if !seen.insert(member.name().to_string()) {
                return Err(OrchestrationError::Configuration(format!(
                    "duplicate agent name '{}' in member set",
                    member.name()
                )));
            }
        }

        Ok(Self { members })
    }

    pub fn member_names(&self) -> Vec<String> {
        self.members
            .iter()
            .map(|member| member.name().to_string())
            .collect()
    }

    /// Schedules one invocation per member onto the runtime without awaiting
    /// any of them, so total latency tracks the slowest member rather than
    /// the sum. The returned run is ephemeral: one per invocation, consumed
    /// by `get`.
    pub fn invoke(
        &self,
        task: &str,
        runtime: &Runtime,
    ) -> Result<OrchestrationRun, OrchestrationError> {
        if task.trim().is_empty() {
            return Err(OrchestrationError::Configuration(
                "task must not be empty".to_string(),
            ));
        }

        let mut slots = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let member = member.clone();
            let agent = member.name().to_string();
            let task = task.to_string();

            let scheduled = runtime.schedule(async move {
                let started = Instant::now();
                let result = member.invoke(&task).await;
                let elapsed_ms = started.elapsed().as_millis() as u64;
                match &result {
                    Ok(content) => tracing::debug!(
                        agent = %member.name(),
                        elapsed_ms,
                        chars = content.len(),
                        "member completed"
                    ),
                    Err(err) => tracing::warn!(
                        agent = %member.name(),
                        elapsed_ms,
                        error = %err,
                        "member failed"
                    ),
                }
                result
            });

            match scheduled {
                Ok(handle) => slots.push(RunSlot { agent, handle }),
                Err(err) => {
                    // Runtime refused mid-dispatch; don't leave earlier
                    // members running for a run that will never be collected.
                    for slot in &slots {
                        slot.handle.abort();
                    }
                    return Err(err);
                }
            }
        }

        Ok(OrchestrationRun { slots })
    }
}

struct RunSlot {
    agent: String,
    handle: TaskHandle<Result<String, OrchestrationError>>,
}

/// In-flight state of one orchestration call. Dropped handles detach, so a
/// run that is never collected does not block runtime drain.
pub struct OrchestrationRun {
    slots: Vec<RunSlot>,
}

impl OrchestrationRun {
    pub fn member_count(&self) -> usize {
        self.slots.len()
    }

    /// Collects one outcome per member, in registration order, waiting at
    /// most `wait` overall. If any member is still outstanding at the
    /// deadline the whole retrieval fails with `Timeout` and every
    /// unfinished member task is aborted; members that completed in time do
    /// not leak out as a partial success.
    pub async fn get(self, wait: Duration) -> Result<Vec<AgentOutcome>, OrchestrationError> {
        let deadline = Instant::now() + wait;
        let mut outcomes = Vec::with_capacity(self.slots.len());
        let mut slots = self.slots.into_iter();

        while let Some(mut slot) = slots.next() {
            let joined = tokio::time::timeout_at(deadline, slot.handle.join()).await;
            match joined {
                Ok(Ok(result)) => outcomes.push(AgentOutcome {
                    agent: slot.agent,
                    result,
                }),
                Ok(Err(join_err)) => {
                    let message = if join_err.is_panic() {
                        format!("member task panicked: {join_err}")
                    } else {
                        format!("member task was cancelled: {join_err}")
                    };
                    outcomes.push(AgentOutcome {
                        agent: slot.agent.clone(),
                        result: Err(OrchestrationError::AgentInvocation {
                            agent: slot.agent,
                            message,
                        }),
                    });
                }
                Err(_elapsed) => {
                    slot.handle.abort();
                    let mut pending = vec![slot.agent];
                    for rest in slots {
                        if !rest.handle.is_finished() {
                            rest.handle.abort();
                            pending.push(rest.agent);
                        }
                    }
                    return Err(OrchestrationError::Timeout {
                        waited: wait,
                        pending,
                    });
                }
            }
        }

        Ok(outcomes)
    }
}
