//! `concierge capabilities ...`: administration without a conversation.
//!
//! These commands talk to the registry directly and never build a session,
//! so they work without a decision-maker API key.

use std::collections::BTreeMap;

use cg_capabilities::CapabilityRegistry;
use cg_domain::config::Config;

use super::CapabilitiesCommand;
use crate::bootstrap;

/// Clap value parser for `--param key=value`.
pub fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{raw}'"));
    }
    Ok((key.to_owned(), value.to_owned()))
}

pub async fn run(config: &Config, command: CapabilitiesCommand) -> anyhow::Result<()> {
    let registry = bootstrap::build_registry(config)?;

    match command {
        CapabilitiesCommand::List => {
            for name in registry.list_kinds() {
                let kind = registry.kind(name)?;
                println!("{name:<16} {}", kind.description());
            }
        }
        CapabilitiesCommand::Params { kind } => {
            let params = registry.required_parameters(&kind)?;
            if params.is_empty() {
                println!("{kind} needs no parameters");
            }
            for (name, description) in params {
                println!("{name:<20} {description}");
            }
        }
        CapabilitiesCommand::Enable { kind, user, params } => {
            let params: BTreeMap<String, String> = params.into_iter().collect();
            registry.enable(&user, &kind, &params)?;
            report_resolution(&registry, &user, &kind).await;
        }
        CapabilitiesCommand::Disable { kind, user } => {
            registry.disable(&user, &kind)?;
            println!("{kind} disabled for {user}");
        }
        CapabilitiesCommand::Status { user } => {
            for (kind, enabled) in registry.status(&user)? {
                println!("{kind:<16} {}", if enabled { "enabled" } else { "disabled" });
            }
        }
        CapabilitiesCommand::Commands { user } => {
            let resolved = registry.resolve(&user, Vec::new()).await;
            let commands = resolved.available_commands();
            if commands.values().all(BTreeMap::is_empty) {
                println!("no commands available for {user}");
            }
            for (kind, commands) in commands {
                for (name, description) in commands {
                    println!("{kind} {name:<16} {description}");
                }
            }
        }
        CapabilitiesCommand::Run { kind, command, user } => {
            registry.kind(&kind)?;
            let resolved = registry.resolve(&user, Vec::new()).await;
            let outcome = resolved.invoke_command(&kind, &command).await;
            println!("{kind} {command}: {outcome}");
            if !outcome.is_completed() {
                anyhow::bail!("command did not complete");
            }
        }
    }
    Ok(())
}

/// After an enable, say whether the kind actually resolves.
async fn report_resolution(registry: &CapabilityRegistry, user: &str, kind: &str) {
    let resolved = registry.resolve(user, Vec::new()).await;
    if resolved.is_live(kind) {
        println!("{kind} enabled for {user}");
        return;
    }
    let reason = resolved
        .skipped()
        .iter()
        .find(|s| s.kind == kind)
        .map(|s| s.reason.as_str())
        .unwrap_or("unknown reason");
    println!("{kind} enabled for {user} but inactive: {reason}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_split_on_first_equals() {
        assert_eq!(
            parse_param("url=http://ha.local:8123/?a=b"),
            Ok(("url".to_owned(), "http://ha.local:8123/?a=b".to_owned()))
        );
        assert_eq!(parse_param("token="), Ok(("token".to_owned(), String::new())));
    }

    #[test]
    fn params_need_a_name_and_separator() {
        assert!(parse_param("no-separator").is_err());
        assert!(parse_param(" =value").is_err());
    }
}
