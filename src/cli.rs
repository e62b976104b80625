use clap::{Parser, Subcommand};

#[derive(Debug, Subcommand)]
pub enum ProfileCommands {
    #[command(about = "List configured profiles and highlight the active profile")]
    List,
    #[command(about = "Show the active profile's resolved runtime settings")]
    Show,
}

#[derive(Debug, Subcommand)]
pub enum AgentCommands {
    #[command(about = "List member agents resolved from catalogs and remote settings")]
    List,
    #[command(about = "Show one member agent's resolved configuration")]
    Show {
        #[arg(long)]
        name: String,
    },
}

const CLI_EXAMPLES: &str = "Examples:\n\
  ensemble-cli ask \"What should I order for a team of eight?\"\n\
  ensemble-cli --timeout-secs 30 ask \"Summarize the incident report\"\n\
  ensemble-cli --endpoint https://example.openai.azure.com --deployment gpt-4o ask \"hello\"\n\
  ensemble-cli agents list\n\
  ensemble-cli agents show --name analyst\n\
  ensemble-cli profiles show\n\
  ensemble-cli doctor\n\
\n\
Behavior:\n\
  - `ask` without arguments reads one task line from stdin.\n\
  - Every member agent receives the same task concurrently; responses are\n\
    printed per agent in roster order.\n\
  - The remote agent joins the roster only when --remote-endpoint and\n\
    --remote-agent-id (or their profile/env equivalents) are both set.";

#[derive(Debug, Parser)]
#[command(name = "ensemble-cli")]
#[command(about = "Fan one task out to local and remote agents concurrently")]
#[command(after_long_help = CLI_EXAMPLES)]
pub struct Cli {
    #[arg(long, env = "ENSEMBLE_PROFILE", default_value = "default")]
    pub profile: String,

    #[arg(long, env = "ENSEMBLE_CONFIG", default_value = ".ensemble/config.toml")]
    pub config_path: String,

    /// Chat-completion endpoint for local member agents.
    #[arg(long, env = "ENSEMBLE_COMPLETION_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Model deployment name for local member agents.
    #[arg(long, env = "ENSEMBLE_DEPLOYMENT")]
    pub deployment: Option<String>,

    /// Environment variable holding the completion API key.
    #[arg(long, env = "ENSEMBLE_API_KEY_ENV")]
    pub api_key_env: Option<String>,

    #[arg(long, env = "ENSEMBLE_REMOTE_ENDPOINT")]
    pub remote_endpoint: Option<String>,

    #[arg(long, env = "ENSEMBLE_REMOTE_AGENT_ID")]
    pub remote_agent_id: Option<String>,

    /// Environment variable holding the remote service bearer token.
    #[arg(long, env = "ENSEMBLE_REMOTE_TOKEN_ENV")]
    pub remote_token_env: Option<String>,

    /// Overall wait budget for collecting all member responses.
    #[arg(long, env = "ENSEMBLE_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    #[arg(long, env = "ENSEMBLE_TELEMETRY_ENABLED", action = clap::ArgAction::Set)]
    pub telemetry_enabled: Option<bool>,

    #[arg(long, env = "ENSEMBLE_TELEMETRY_PATH")]
    pub telemetry_path: Option<String>,

    #[arg(long, env = "RUST_LOG", default_value = "error")]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Dispatch one task to every member agent and print attributed responses")]
    Ask {
        /// Task text; omit to read one line from stdin.
        prompt: Vec<String>,
    },
    #[command(about = "Inspect the resolved member agent roster")]
    Agents {
        #[command(subcommand)]
        command: AgentCommands,
    },
    #[command(about = "Inspect profile configuration and active resolved settings")]
    Profiles {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    #[command(about = "Validate completion and remote-agent environment configuration")]
    Doctor,
}

pub fn command_label(command: &Commands) -> String {
    match command {
        Commands::Ask { .. } => "ask".to_string(),
        Commands::Agents { command } => match command {
            AgentCommands::List => "agents.list".to_string(),
            AgentCommands::Show { .. } => "agents.show".to_string(),
        },
        Commands::Profiles { command } => match command {
            ProfileCommands::List => "profiles.list".to_string(),
            ProfileCommands::Show => "profiles.show".to_string(),
        },
        Commands::Doctor => "doctor".to_string(),
    }
}
