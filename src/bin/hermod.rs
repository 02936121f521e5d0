//! hermod: operator CLI
//!
//! Route a request through the configured providers, inspect and edit the
//! routing policy, and probe provider health.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hermod::runtime::{self, RuntimeConfig, Secrets};
use hermod::{Health, Request};

/// Hermod provider router
#[derive(Parser)]
#[command(name = "hermod")]
#[command(version = hermod::PKG_VERSION)]
#[command(about = "Provider router with semantic response cache")]
struct Args {
    /// Path to runtime configuration file.
    #[arg(short, long, env = "HERMOD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Route one request and print the answer
    Route {
        /// Request text (or omit to read from stdin)
        text: Option<String>,
        /// Preferred model
        #[arg(short, long)]
        model: Option<String>,
        /// Conversation identifier passed to the provider
        #[arg(long)]
        conversation: Option<String>,
        /// Print the full routed response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or edit the routing policy
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Probe every registered provider
    Health,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the policy document
    Show,
    /// Restore the built-in defaults
    Reset,
    /// Enable a provider
    Enable { provider: String },
    /// Disable a provider
    Disable { provider: String },
    /// Change the default (and optionally fallback) provider
    SetDefault {
        provider: String,
        #[arg(long)]
        fallback: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = RuntimeConfig::load(args.config.as_deref())?;
    let store = runtime::open_store(&config)?;

    tracing::debug!(version = hermod::version_string(), "hermod starting");

    match args.command {
        Command::Config(cmd) => {
            match cmd {
                ConfigCommand::Show => {}
                ConfigCommand::Reset => {
                    store.reset_to_defaults()?;
                }
                ConfigCommand::Enable { provider } => {
                    store.set_provider_enabled(&provider, true)?;
                }
                ConfigCommand::Disable { provider } => {
                    store.set_provider_enabled(&provider, false)?;
                }
                ConfigCommand::SetDefault { provider, fallback } => {
                    let mut policy = store.get_policy();
                    policy.default_provider = provider;
                    if let Some(fallback) = fallback {
                        policy.fallback_provider = fallback;
                    }
                    store.update_policy(policy)?;
                }
            }
            println!("{}", store.export_json()?);
        }

        Command::Route {
            text,
            model,
            conversation,
            json,
        } => {
            let text = resolve_text(text, "route")?;
            let secrets = Secrets::load()?;
            let router = runtime::build_router(&config, &secrets, store)?;

            let mut request = Request::new(text);
            if let Some(model) = model {
                request = request.model_hint(model);
            }
            if let Some(id) = conversation {
                request = request.conversation_id(id);
            }

            let response = router.route(&request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", response.text);
                eprintln!(
                    "via {}/{}{}",
                    response.provider_used,
                    response.model_used,
                    match response.similarity {
                        Some(sim) => format!(" (cached, similarity {sim:.3})"),
                        None => String::new(),
                    }
                );
            }
        }

        Command::Health => {
            let secrets = Secrets::load()?;
            let router = runtime::build_router(&config, &secrets, store)?;
            let report = router.health_report().await;
            if report.is_empty() {
                println!("no providers registered");
            }
            for (provider, health) in report {
                let label = match health {
                    Health::Healthy => "healthy",
                    Health::Degraded => "degraded",
                    Health::Down => "down",
                };
                match router.latency(&provider) {
                    Some(avg) => println!("{provider}: {label} (avg {}ms)", avg.as_millis()),
                    None => println!("{provider}: {label}"),
                }
            }
        }
    }

    Ok(())
}

/// Resolve input text from a positional argument and/or stdin.
///
/// - arg only: use the argument
/// - stdin only: use stdin
/// - both: argument first, then stdin, separated by a blank line
/// - neither: error
fn resolve_text(arg: Option<String>, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    let stdin_is_pipe = !io::stdin().is_terminal();
    let stdin_text = if stdin_is_pipe {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim().to_string();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    } else {
        None
    };

    match (arg, stdin_text) {
        (Some(a), Some(s)) => Ok(format!("{a}\n\n{s}")),
        (Some(a), None) => Ok(a),
        (None, Some(s)) => Ok(s),
        (None, None) => {
            Err(format!("{command}: no input provided (pass text as argument or via stdin)").into())
        }
    }
}
