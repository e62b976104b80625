use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;

use crate::config::RuntimeConfig;
use crate::error::OrchestrationError;
use crate::orchestrator::ConcurrentOrchestration;
use crate::output::ResultSink;
use crate::roster::build_members;
use crate::runtime::Runtime;
use crate::telemetry::TelemetrySink;

/// One-shot orchestration: resolve the member roster, fan the task out,
/// collect within the configured wait budget, deliver attributed responses.
pub async fn run_ask(
    cfg: &RuntimeConfig,
    prompt_args: Vec<String>,
    telemetry: &TelemetrySink,
    sink: &mut dyn ResultSink,
) -> Result<()> {
    let task = resolve_task(prompt_args)?;
    let members = build_members(cfg).await?;
    let orchestration = ConcurrentOrchestration::new(members)?;

    let runtime = Runtime::new();
    runtime.start()?;

    let member_names = orchestration.member_names();
    tracing::info!(
        members = member_names.len(),
        timeout_secs = cfg.timeout_secs,
        "dispatching task to all members"
    );
    telemetry.emit(
        "orchestration.dispatched",
        json!({ "members": member_names, "task_chars": task.len() }),
    );

    let run = orchestration.invoke(&task, &runtime)?;
    let collected = run.get(Duration::from_secs(cfg.timeout_secs)).await;

    let result = match collected {
        Ok(outcomes) => {
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(content) => telemetry.emit(
                        "member.completed",
                        json!({ "agent": outcome.agent, "chars": content.len() }),
                    ),
                    Err(err) => telemetry.emit(
                        "member.failed",
                        json!({ "agent": outcome.agent, "error": err.to_string() }),
                    ),
                }
            }
            sink.deliver(&outcomes)?;
            Ok(())
        }
        Err(err) => {
            if let OrchestrationError::Timeout { pending, .. } = &err {
                telemetry.emit("orchestration.timeout", json!({ "pending": pending }));
            }
            Err(anyhow::Error::new(err))
        }
    };

    // Timed-out members were aborted by get(); drain covers the rest.
    runtime.stop_when_idle().await?;
    result
}

fn resolve_task(prompt_args: Vec<String>) -> Result<String> {
    let joined = prompt_args.join(" ").trim().to_string();
    if !joined.is_empty() {
        return Ok(joined);
    }

    print!("Task: ");
    io::stdout().flush().context("failed to flush stdout")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read task from stdin")?;

    let task = line.trim().to_string();
    if task.is_empty() {
        return Err(
            OrchestrationError::Configuration("task must not be empty".to_string()).into(),
        );
    }
    Ok(task)
}
