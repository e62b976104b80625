use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cli::Cli;
use crate::error::OrchestrationError;

pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Explicit configuration resolved once at startup. Constructors downstream
/// take this struct (or pieces of it); nothing reads process-wide mutable
/// state after resolution.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub profile: String,
    pub config_path: String,
    pub completion: Option<CompletionSettings>,
    pub remote: Option<RemoteSettings>,
    pub agents: Vec<LocalAgentEntry>,
    pub timeout_secs: u64,
    pub telemetry_enabled: bool,
    pub telemetry_path: String,
}

#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub endpoint: String,
    pub deployment: String,
    pub api_key_env: String,
    pub api_version: Option<String>,
}

impl CompletionSettings {
    /// The completion key is a required configuration value supplied through
    /// the environment, so absence is a configuration error, not an
    /// authentication one.
    pub fn api_key(&self) -> Result<String, OrchestrationError> {
        env_nonempty(&self.api_key_env).ok_or_else(|| {
            OrchestrationError::Configuration(format!(
                "completion API key env '{}' is not set or empty",
                self.api_key_env
            ))
        })
    }
}

#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub endpoint: String,
    pub agent_id: String,
    pub agent_name: String,
    pub token_env: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentSource {
    Implicit,
    Global,
    Local,
}

impl AgentSource {
    pub fn label(self) -> &'static str {
        match self {
            AgentSource::Implicit => "implicit",
            AgentSource::Global => "global",
            AgentSource::Local => "local",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalAgentEntry {
    pub name: String,
    pub source: AgentSource,
    pub description: String,
    pub instructions: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilesFile {
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub endpoint: Option<String>,
    pub deployment: Option<String>,
    pub api_key_env: Option<String>,
    pub api_version: Option<String>,
    pub remote_endpoint: Option<String>,
    pub remote_agent_id: Option<String>,
    pub remote_agent_name: Option<String>,
    pub remote_token_env: Option<String>,
    pub timeout_secs: Option<u64>,
    pub telemetry_enabled: Option<bool>,
    pub telemetry_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentCatalogFile {
    #[serde(default)]
    pub agents: HashMap<String, AgentFileConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentFileConfig {
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct AgentPaths {
    pub local_catalog: PathBuf,
    pub global_catalog: Option<PathBuf>,
}

pub fn default_agent_paths() -> AgentPaths {
    let local_catalog = PathBuf::from(".ensemble/agents.toml");
    let global_catalog = std::env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .map(|home| home.join(".ensemble/agents.toml"));
    AgentPaths {
        local_catalog,
        global_catalog,
    }
}

pub fn load_profiles(config_path: &str) -> Result<ProfilesFile, OrchestrationError> {
    let path = Path::new(config_path);
    if !path.exists() {
        return Ok(ProfilesFile::default());
    }

    let content = std::fs::read_to_string(path).map_err(|err| {
        OrchestrationError::Configuration(format!(
            "failed to read profile config file at '{}': {err}",
            path.display()
        ))
    })?;
    toml::from_str::<ProfilesFile>(&content).map_err(|err| {
        OrchestrationError::Configuration(format!(
            "invalid profile configuration in '{}': {err}",
            path.display()
        ))
    })
}

pub fn load_agent_catalog_file(path: &Path) -> Result<AgentCatalogFile, OrchestrationError> {
    if !path.exists() {
        return Ok(AgentCatalogFile::default());
    }

    let content = std::fs::read_to_string(path).map_err(|err| {
        OrchestrationError::Configuration(format!(
            "failed to read agent catalog file at '{}': {err}",
            path.display()
        ))
    })?;
    toml::from_str::<AgentCatalogFile>(&content).map_err(|err| {
        OrchestrationError::Configuration(format!(
            "invalid agent catalog in '{}': {err}",
            path.display()
        ))
    })
}

/// Built-in local members available without any catalog file.
fn implicit_agent_configs() -> HashMap<String, AgentFileConfig> {
    let mut agents = HashMap::new();
    agents.insert(
        "analyst".to_string(),
        AgentFileConfig {
            description: Some("Answers the task directly and concisely".to_string()),
            instructions: Some(
                "Answer the task directly and concisely, leading with the most actionable \
                 information."
                    .to_string(),
            ),
            enabled: None,
        },
    );
    agents.insert(
        "skeptic".to_string(),
        AgentFileConfig {
            description: Some("Flags risks, ambiguities, and missing information".to_string()),
            instructions: Some(
                "Review the task for risks, ambiguities, and missing information. Be concrete \
                 and list each finding on its own line."
                    .to_string(),
            ),
            enabled: None,
        },
    );
    agents
}

/// Resolves local member entries with local-over-global-over-implicit
/// precedence by agent name. Entries with `enabled = false` are removed,
/// which is also how a built-in member is switched off. The result is sorted
/// by name so the roster order is stable across runs.
pub fn load_local_agent_entries(
    paths: &AgentPaths,
) -> Result<Vec<LocalAgentEntry>, OrchestrationError> {
    let mut merged: HashMap<String, (AgentSource, AgentFileConfig)> = implicit_agent_configs()
        .into_iter()
        .map(|(name, config)| (name, (AgentSource::Implicit, config)))
        .collect();

    if let Some(global_path) = paths.global_catalog.as_ref() {
        let global = load_agent_catalog_file(global_path)?;
        for (name, config) in global.agents {
            merged.insert(name, (AgentSource::Global, config));
        }
    }

    let local = load_agent_catalog_file(&paths.local_catalog)?;
    for (name, config) in local.agents {
        merged.insert(name, (AgentSource::Local, config));
    }

    let mut entries = Vec::new();
    for (name, (source, config)) in merged {
        if !config.enabled.unwrap_or(true) {
            continue;
        }
        let instructions = config
            .instructions
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                OrchestrationError::Configuration(format!(
                    "agent '{name}' is missing required 'instructions'"
                ))
            })?
            .to_string();
        entries.push(LocalAgentEntry {
            description: config
                .description
                .unwrap_or_else(|| "Locally-configured agent".to_string()),
            instructions,
            name,
            source,
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

pub fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn first_present(cli_value: Option<&String>, profile_value: Option<&String>, fallback_env: &str) -> Option<String> {
    cli_value
        .cloned()
        .or_else(|| profile_value.cloned())
        .or_else(|| env_nonempty(fallback_env))
}

pub fn resolve_runtime_config(
    cli: &Cli,
    profiles: &ProfilesFile,
    agents: Vec<LocalAgentEntry>,
) -> Result<RuntimeConfig, OrchestrationError> {
    let selected = cli.profile.trim();
    if selected.is_empty() {
        return Err(OrchestrationError::Configuration(
            "profile name cannot be empty; set --profile <name>".to_string(),
        ));
    }

    let profile = if selected == "default" && !profiles.profiles.contains_key("default") {
        ProfileConfig::default()
    } else {
        profiles.profiles.get(selected).cloned().ok_or_else(|| {
            let mut names = profiles.profiles.keys().cloned().collect::<Vec<String>>();
            names.sort();
            if names.is_empty() {
                OrchestrationError::Configuration(format!(
                    "profile '{}' not found in '{}'; no profiles are defined yet",
                    selected, cli.config_path
                ))
            } else {
                OrchestrationError::Configuration(format!(
                    "profile '{}' not found in '{}'; available profiles: {}",
                    selected,
                    cli.config_path,
                    names.join(", ")
                ))
            }
        })?
    };

    // Azure env names are honored as a last resort so the original
    // deployment's environment keeps working unchanged.
    let endpoint = first_present(
        cli.endpoint.as_ref(),
        profile.endpoint.as_ref(),
        "AZURE_OPENAI_ENDPOINT",
    );
    let deployment = first_present(
        cli.deployment.as_ref(),
        profile.deployment.as_ref(),
        "AZURE_OPENAI_DEPLOYMENT_NAME",
    );
    let completion = match (endpoint, deployment) {
        (Some(endpoint), Some(deployment)) => Some(CompletionSettings {
            endpoint,
            deployment,
            api_key_env: cli
                .api_key_env
                .clone()
                .or(profile.api_key_env.clone())
                .unwrap_or_else(|| "AZURE_OPENAI_API_KEY".to_string()),
            api_version: profile.api_version.clone(),
        }),
        (Some(_), None) => {
            return Err(OrchestrationError::Configuration(
                "completion endpoint is set but deployment is missing; set --deployment or \
                 ENSEMBLE_DEPLOYMENT"
                    .to_string(),
            ));
        }
        (None, Some(_)) => {
            return Err(OrchestrationError::Configuration(
                "completion deployment is set but endpoint is missing; set --endpoint or \
                 ENSEMBLE_COMPLETION_ENDPOINT"
                    .to_string(),
            ));
        }
        (None, None) => None,
    };

    let remote_endpoint = first_present(
        cli.remote_endpoint.as_ref(),
        profile.remote_endpoint.as_ref(),
        "AZURE_AI_AGENT_ENDPOINT",
    );
    let remote_agent_id = first_present(
        cli.remote_agent_id.as_ref(),
        profile.remote_agent_id.as_ref(),
        "AZURE_AI_AGENT_ID",
    );
    let remote = match (remote_endpoint, remote_agent_id) {
        (Some(endpoint), Some(agent_id)) => Some(RemoteSettings {
            endpoint,
            agent_id,
            agent_name: profile
                .remote_agent_name
                .clone()
                .unwrap_or_else(|| "hosted".to_string()),
            token_env: cli
                .remote_token_env
                .clone()
                .or(profile.remote_token_env.clone())
                .unwrap_or_else(|| "ENSEMBLE_REMOTE_TOKEN".to_string()),
        }),
        (Some(_), None) => {
            return Err(OrchestrationError::Configuration(
                "remote endpoint is set but agent id is missing; set --remote-agent-id or \
                 ENSEMBLE_REMOTE_AGENT_ID"
                    .to_string(),
            ));
        }
        (None, Some(_)) => {
            return Err(OrchestrationError::Configuration(
                "remote agent id is set but endpoint is missing; set --remote-endpoint or \
                 ENSEMBLE_REMOTE_ENDPOINT"
                    .to_string(),
            ));
        }
        (None, None) => None,
    };

    Ok(RuntimeConfig {
        profile: selected.to_string(),
        config_path: cli.config_path.clone(),
        completion,
        remote,
        agents,
        timeout_secs: cli
            .timeout_secs
            .or(profile.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .max(1),
        telemetry_enabled: cli
            .telemetry_enabled
            .or(profile.telemetry_enabled)
            .unwrap_or(true),
        telemetry_path: cli
            .telemetry_path
            .clone()
            .or(profile.telemetry_path)
            .unwrap_or_else(|| ".ensemble/telemetry/events.jsonl".to_string()),
    })
}
