use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sw_domain::config::{Config, ConfigSeverity};

mod bootstrap;
mod chat;
mod run;

#[derive(Parser)]
#[command(name = "switchboard", about = "Drive external tools from an LLM conversation", version)]
struct Cli {
    /// Path to the config file (default: discover switchboard.toml upwards).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat REPL.
    Chat {
        /// Resume an existing session by id.
        #[arg(long)]
        session: Option<String>,
    },
    /// Send one message and print the reply.
    Run {
        message: String,
        /// Resume an existing session by id.
        #[arg(long)]
        session: Option<String>,
        /// Approve every tool call without asking.
        #[arg(long)]
        approve_all: bool,
    },
    /// Validate or inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version.
    Version,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Check the config file for problems.
    Validate,
    /// Print the resolved configuration.
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        None | Some(Command::Chat { session: None }) => {
            let config = load_config(cli.config)?;
            chat::chat(config, None).await
        }
        Some(Command::Chat { session }) => {
            let config = load_config(cli.config)?;
            chat::chat(config, session).await
        }
        Some(Command::Run {
            message,
            session,
            approve_all,
        }) => {
            let config = load_config(cli.config)?;
            run::run(config, message, session, approve_all).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let config = load_config(cli.config)?;
            let issues = config.validate();
            for issue in &issues {
                eprintln!("{issue}");
            }
            if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
                std::process::exit(1);
            }
            eprintln!("config ok");
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let config = load_config(cli.config)?;
            println!("{}", toml_pretty(&config)?);
            Ok(())
        }
        Some(Command::Version) => {
            println!("switchboard {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured logging to stderr; stdout stays clean for responses.
fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the config from an explicit path or by walking up from cwd.
///
/// Configuration errors are fatal at startup; warnings are logged.
fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(p) => Config::load(&p).with_context(|| format!("loading {}", p.display()))?,
        None => {
            let cwd = std::env::current_dir().context("resolving working directory")?;
            match Config::discover(&cwd)? {
                Some((config, found)) => {
                    tracing::debug!(path = %found.display(), "config discovered");
                    config
                }
                None => {
                    tracing::warn!("no switchboard.toml found, using defaults");
                    Config::default()
                }
            }
        }
    };

    let issues = config.validate();
    let mut fatal = false;
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => {
                tracing::error!("config: {issue}");
                fatal = true;
            }
        }
    }
    if fatal {
        anyhow::bail!("config validation failed");
    }
    Ok(config)
}

fn toml_pretty(config: &Config) -> anyhow::Result<String> {
    toml::to_string_pretty(config).context("serializing config")
}
