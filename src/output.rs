use std::io::{self, Write};

use anyhow::{Context, Result};

use crate::agent::AgentOutcome;

/// Consumes the ordered (agent, content) slots of a finished run. The only
/// contract is accepting UTF-8 text.
pub trait ResultSink {
    fn deliver(&mut self, outcomes: &[AgentOutcome]) -> Result<()>;
}

pub fn render_outcome(outcome: &AgentOutcome) -> String {
    match &outcome.result {
        Ok(content) => format!("# {}:\n {}\n", outcome.agent, content),
        Err(err) => format!("# {}:\n [failed] {}\n", outcome.agent, err),
    }
}

pub struct StdoutSink;

impl ResultSink for StdoutSink {
    fn deliver(&mut self, outcomes: &[AgentOutcome]) -> Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for outcome in outcomes {
            writeln!(out, "{}", render_outcome(outcome))
                .context("failed to write agent response to stdout")?;
        }
        Ok(())
    }
}
