use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use drover::{dlog, Error, Fleet, FleetConfig, RequestOutcome, Result};

/// Drover - run a fleet of AI CLI agents from one place
#[derive(Parser, Debug)]
#[command(name = "drover")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    DROVER_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.drover/drover.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Fleet config file (defaults to ~/.drover/drover.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List configured agents and whether their CLI is installed
    Agents,

    /// Send a message to one agent and print its answer
    Send {
        /// Agent ID from the config file
        agent: String,

        /// The message to send
        message: String,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate the config file
    Check,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    drover::log::init_with_debug(cli.debug);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => FleetConfig::load_from(path)?,
        None => FleetConfig::load()?,
    };

    match cli.command {
        Command::Agents => {
            run_agents(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Check => {
            println!("Config OK: {} agents", config.agents.len());
            Ok(ExitCode::SUCCESS)
        }
        Command::Send {
            agent,
            message,
            json,
        } => run_send(&config, &agent, &message, json),
    }
}

fn run_agents(config: &FleetConfig) -> Result<()> {
    let agents = config.agent_configs()?;
    if agents.is_empty() {
        println!("No agents configured.");
        return Ok(());
    }
    println!(
        "{:<16} {:<24} {:<12} {:<10} {}",
        "ID", "NAME", "CLI", "TIMEOUT", "INSTALLED"
    );
    for agent in agents {
        println!(
            "{:<16} {:<24} {:<12} {:<10} {}",
            agent.id,
            agent.name,
            agent.variant.as_str(),
            format!("{}s", agent.timeout.as_secs()),
            if agent.is_available() { "yes" } else { "no" }
        );
    }
    Ok(())
}

fn run_send(config: &FleetConfig, agent: &str, message: &str, json: bool) -> Result<ExitCode> {
    let runtime = tokio::runtime::Runtime::new()?;
    let fleet = Fleet::from_config(config)?;
    if !fleet.is_alive(agent) {
        return Err(Error::AgentNotFound(agent.to_string()));
    }

    dlog!(agent: agent, "Send from the command line");
    let outcome = runtime.block_on(async {
        let outcome = fleet.send(agent, message).await;
        fleet.terminate_all();
        outcome
    });

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        match &outcome {
            RequestOutcome::Success(text) => println!("{}", text),
            RequestOutcome::Failure(reason) => eprintln!("Agent failed: {}", reason),
            RequestOutcome::Timeout => eprintln!("Agent timed out"),
        }
    }

    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
