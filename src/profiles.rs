use anyhow::Result;

use crate::config::{ProfilesFile, RuntimeConfig};

pub fn run_profiles_list(profiles: &ProfilesFile, cfg: &RuntimeConfig) -> Result<()> {
    let mut names = profiles.profiles.keys().cloned().collect::<Vec<String>>();
    if !names.iter().any(|name| name == "default") {
        names.push("default".to_string());
    }
    names.sort();

    println!("Configured profiles (active='{}'):", cfg.profile);
    for name in names {
        let marker = if name == cfg.profile { "*" } else { " " };
        let source = if profiles.profiles.contains_key(&name) {
            "configured"
        } else {
            "implicit"
        };
        println!("{marker} {name} ({source})");
    }

    Ok(())
}

pub fn run_profiles_show(cfg: &RuntimeConfig) -> Result<()> {
    println!("Active profile: {}", cfg.profile);
    println!("Config path: {}", cfg.config_path);
    match cfg.completion.as_ref() {
        Some(completion) => {
            println!("Completion endpoint: {}", completion.endpoint);
            println!("Completion deployment: {}", completion.deployment);
            println!("Completion API key env: {}", completion.api_key_env);
            println!(
                "Completion API version: {}",
                completion.api_version.as_deref().unwrap_or("<default>")
            );
        }
        None => println!("Completion backend: <not configured>"),
    }
    match cfg.remote.as_ref() {
        Some(remote) => {
            println!("Remote endpoint: {}", remote.endpoint);
            println!("Remote agent id: {}", remote.agent_id);
            println!("Remote agent name: {}", remote.agent_name);
            println!("Remote token env: {}", remote.token_env);
        }
        None => println!("Remote agent: <not configured>"),
    }
    println!("Local agents: {}", cfg.agents.len());
    println!("Timeout (secs): {}", cfg.timeout_secs);
    println!("Telemetry enabled: {}", cfg.telemetry_enabled);
    println!("Telemetry path: {}", cfg.telemetry_path);
    Ok(())
}
