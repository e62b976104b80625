use anyhow::Result;
use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use ensemble_cli::agents::{run_agents_list, run_agents_show};
use ensemble_cli::ask::run_ask;
use ensemble_cli::cli::{AgentCommands, Cli, Commands, ProfileCommands, command_label};
use ensemble_cli::config::{
    default_agent_paths, load_local_agent_entries, load_profiles, resolve_runtime_config,
};
use ensemble_cli::doctor::run_doctor;
use ensemble_cli::error::format_cli_error;
use ensemble_cli::output::StdoutSink;
use ensemble_cli::profiles::{run_profiles_list, run_profiles_show};
use ensemble_cli::telemetry::TelemetrySink;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_filter).unwrap_or_else(|_| EnvFilter::new("error"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli).await {
        eprintln!("{}", format_cli_error(&err));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let profiles = load_profiles(&cli.config_path)?;
    let agent_paths = default_agent_paths();
    let agent_entries = load_local_agent_entries(&agent_paths)?;
    let cfg = resolve_runtime_config(&cli, &profiles, agent_entries)?;
    let command = cli.command.unwrap_or(Commands::Ask { prompt: Vec::new() });

    let telemetry = TelemetrySink::new(&cfg, command_label(&command));

    let outcome = match command {
        Commands::Ask { prompt } => {
            let mut sink = StdoutSink;
            run_ask(&cfg, prompt, &telemetry, &mut sink).await
        }
        Commands::Agents { command } => match command {
            AgentCommands::List => run_agents_list(&cfg, &agent_paths),
            AgentCommands::Show { name } => run_agents_show(&cfg, &name),
        },
        Commands::Profiles { command } => match command {
            ProfileCommands::List => run_profiles_list(&profiles, &cfg),
            ProfileCommands::Show => run_profiles_show(&cfg),
        },
        Commands::Doctor => run_doctor(&cfg),
    };

    match &outcome {
        Ok(()) => telemetry.emit("command.completed", json!({})),
        Err(err) => telemetry.emit("command.failed", json!({ "error": format!("{err:#}") })),
    }

    outcome
}
