use anyhow::Result;

use crate::config::{AgentPaths, RuntimeConfig};

pub fn run_agents_list(cfg: &RuntimeConfig, paths: &AgentPaths) -> Result<()> {
    println!("Member agents in roster order:");
    for entry in &cfg.agents {
        println!("  {} (local, source={})", entry.name, entry.source.label());
    }
    match cfg.remote.as_ref() {
        Some(remote) => println!("  {} (remote, id={})", remote.agent_name, remote.agent_id),
        None => println!("  <no remote agent configured>"),
    }
    println!("Local catalog: {}", paths.local_catalog.display());
    if let Some(global) = paths.global_catalog.as_ref() {
        println!("Global catalog: {}", global.display());
    } else {
        println!("Global catalog: <HOME not set>");
    }
    Ok(())
}

pub fn run_agents_show(cfg: &RuntimeConfig, name: &str) -> Result<()> {
    if let Some(entry) = cfg.agents.iter().find(|entry| entry.name == name) {
        println!("Agent: {} (local, source={})", entry.name, entry.source.label());
        println!("Description: {}", entry.description);
        println!("Instructions: {}", entry.instructions);
        return Ok(());
    }

    if let Some(remote) = cfg.remote.as_ref().filter(|remote| remote.agent_name == name) {
        println!("Agent: {} (remote)", remote.agent_name);
        println!("Endpoint: {}", remote.endpoint);
        println!("Agent id: {}", remote.agent_id);
        println!("Token env: {}", remote.token_env);
        return Ok(());
    }

    let mut names = cfg
        .agents
        .iter()
        .map(|entry| entry.name.clone())
        .collect::<Vec<String>>();
    if let Some(remote) = cfg.remote.as_ref() {
        names.push(remote.agent_name.clone());
    }
    Err(anyhow::anyhow!(
        "agent '{}' not found. Available agents: {}",
        name,
        names.join(", ")
    ))
}
