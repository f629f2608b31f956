use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use cg_domain::config::{LogFormat, ObservabilityConfig};
use cg_gateway::cli::{self, Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Ask { message, user, json } => {
            init_cli_tracing();
            let (config, _) = cli::load_config()?;
            cli::ask::run(&config, &user, &message, json).await
        }
        Command::Chat { user } => {
            let (config, _) = cli::load_config()?;
            init_tracing(&config.observability);
            cli::chat::chat(&config, user).await
        }
        Command::Capabilities(command) => {
            init_cli_tracing();
            let (config, _) = cli::load_config()?;
            cli::capabilities::run(&config, command).await
        }
        Command::Config(ConfigCommand::Validate) => {
            let (config, config_path) = cli::load_config()?;
            if !cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => {
            let (config, _) = cli::load_config()?;
            cli::config::show(&config)
        }
        Command::Version => {
            println!("concierge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured tracing for long-running commands, written to stderr so the
/// conversation on stdout stays readable. `RUST_LOG` overrides the
/// configured filter.
fn init_tracing(obs: &ObservabilityConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&obs.log_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    match obs.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .init(),
    }
}

/// Compact stderr-only tracing for one-shot commands.
///
/// Defaults to `warn` so diagnostic output does not pollute stdout.
fn init_cli_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
