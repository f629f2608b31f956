pub mod ask;
pub mod capabilities;
pub mod chat;
pub mod config;

use clap::{Parser, Subcommand};

/// Concierge: a personal assistant with per-user capabilities.
#[derive(Debug, Parser)]
#[command(name = "concierge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a single query and print the answer.
    Ask {
        /// The query to send.
        message: String,
        #[arg(long, default_value = "cli")]
        user: String,
        /// Print answer, correlation id and status as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Interactive conversation with memory.
    Chat {
        #[arg(long, default_value = "cli")]
        user: String,
    },
    /// Inspect and configure capabilities.
    #[command(subcommand)]
    Capabilities(CapabilitiesCommand),
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum CapabilitiesCommand {
    /// List every known capability kind.
    List,
    /// Show the parameters a kind needs from the user.
    Params { kind: String },
    /// Store parameters and enable a kind.
    Enable {
        kind: String,
        #[arg(long, default_value = "cli")]
        user: String,
        /// `key=value`, repeatable.
        #[arg(long = "param", value_parser = capabilities::parse_param)]
        params: Vec<(String, String)>,
    },
    /// Disable a kind. Its parameters are kept.
    Disable {
        kind: String,
        #[arg(long, default_value = "cli")]
        user: String,
    },
    /// Show which kinds are enabled.
    Status {
        #[arg(long, default_value = "cli")]
        user: String,
    },
    /// List commands of the kinds that are currently live.
    Commands {
        #[arg(long, default_value = "cli")]
        user: String,
    },
    /// Run an administrative command on a live kind.
    Run {
        kind: String,
        command: String,
        #[arg(long, default_value = "cli")]
        user: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `CG_CONFIG` (or `config.toml`).
/// A missing file means all defaults. Returns the config and the path used.
pub fn load_config() -> anyhow::Result<(cg_domain::config::Config, String)> {
    let config_path = std::env::var("CG_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = load_config_from(&config_path)?;
    Ok((config, config_path))
}

pub fn load_config_from(config_path: &str) -> anyhow::Result<cg_domain::config::Config> {
    if !std::path::Path::new(config_path).exists() {
        return Ok(cg_domain::config::Config::default());
    }
    let raw = std::fs::read_to_string(config_path)
        .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_means_defaults() {
        let config = load_config_from("/nonexistent/concierge.toml").unwrap();
        assert_eq!(config.orchestrator.max_iterations, 30);
        assert_eq!(config.sessions.memory_window, 10);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[orchestrator]\nmax_iterations = 5\nmissing_correlation_id = \"zero\"\n\n[sessions]\nmemory_window = 3"
        )
        .unwrap();

        let config = load_config_from(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.orchestrator.max_iterations, 5);
        assert_eq!(config.orchestrator.max_execution_secs, 60);
        assert_eq!(config.sessions.memory_window, 3);
        assert_eq!(config.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn broken_file_names_the_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[orchestrator\nmax_iterations = ").unwrap();
        let path = file.path().to_str().unwrap().to_owned();

        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains(&path));
    }

    #[test]
    fn enable_collects_repeated_params() {
        let cli = Cli::parse_from([
            "concierge",
            "capabilities",
            "enable",
            "googlesearch",
            "--param",
            "google_api_key=k",
            "--param",
            "google_cse_id=c",
        ]);
        match cli.command {
            Command::Capabilities(CapabilitiesCommand::Enable { kind, user, params }) => {
                assert_eq!(kind, "googlesearch");
                assert_eq!(user, "cli");
                assert_eq!(
                    params,
                    vec![
                        ("google_api_key".to_owned(), "k".to_owned()),
                        ("google_cse_id".to_owned(), "c".to_owned()),
                    ]
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
