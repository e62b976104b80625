use anyhow::Result;

use crate::config::{RuntimeConfig, env_nonempty};

pub fn run_doctor(cfg: &RuntimeConfig) -> Result<()> {
    println!(
        "Active profile: '{}' (config: {})",
        cfg.profile, cfg.config_path
    );

    match cfg.completion.as_ref() {
        Some(completion) => {
            let key_status = if env_nonempty(&completion.api_key_env).is_some() {
                "set"
            } else {
                "missing"
            };
            println!(
                "Completion backend: endpoint={} deployment={} api_key_env={} ({})",
                completion.endpoint, completion.deployment, completion.api_key_env, key_status
            );
        }
        None => {
            println!("Completion backend: <not configured>");
            if !cfg.agents.is_empty() {
                println!(
                    "Warning: {} local agent(s) configured but no completion endpoint; `ask` \
                     will fail at startup",
                    cfg.agents.len()
                );
            }
        }
    }

    match cfg.remote.as_ref() {
        Some(remote) => {
            let token_status = if env_nonempty(&remote.token_env).is_some() {
                "set"
            } else {
                "missing"
            };
            println!(
                "Remote agent: endpoint={} agent_id={} token_env={} ({})",
                remote.endpoint, remote.agent_id, remote.token_env, token_status
            );
        }
        None => println!("Remote agent: <not configured>"),
    }

    println!("Local agents ({}):", cfg.agents.len());
    for entry in &cfg.agents {
        println!("- {} (source={})", entry.name, entry.source.label());
    }

    println!("Retrieval wait budget: {}s", cfg.timeout_secs);
    println!(
        "Telemetry: enabled={} path={}",
        cfg.telemetry_enabled, cfg.telemetry_path
    );

    Ok(())
}
