//! `concierge chat`: interactive REPL.
//!
//! Each line is a turn for one user; memory carries across lines. Slash
//! commands administer that user's capabilities and rebuild the session
//! in place.

use std::collections::BTreeMap;

use cg_domain::config::Config;
use cg_sessions::SessionManager;

use super::capabilities::parse_param;
use crate::bootstrap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat(config: &Config, user: String) -> anyhow::Result<()> {
    let manager = bootstrap::build_session_manager(config)?;
    let summary = manager.get_or_create(&user).await;

    let history_path = dirs::home_dir()
        .unwrap_or_default()
        .join(".concierge")
        .join("chat_history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    eprintln!("Concierge interactive chat");
    eprintln!("User: {user}  |  tools: {}", summary.tools.join(", "));
    eprintln!("Type /help for commands, Ctrl+D to exit");
    eprintln!();

    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                if trimmed.starts_with('/') {
                    match parse_slash(trimmed) {
                        Ok(Slash::Exit) => break,
                        Ok(cmd) => {
                            if let Err(e) = run_slash(&manager, &user, cmd).await {
                                eprintln!("\x1B[31merror: {e}\x1B[0m");
                            }
                        }
                        Err(msg) => eprintln!("{msg}"),
                    }
                    continue;
                }

                match manager.ask(&user, trimmed).await {
                    Ok(reply) => {
                        println!("{}", reply.answer);
                        if let Some(id) = &reply.correlation_id {
                            eprintln!("\x1B[2m[correlation id: {id}]\x1B[0m");
                        }
                        println!();
                    }
                    Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    rl.save_history(&history_path).ok();
    eprintln!("Goodbye!");
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slash commands
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, PartialEq, Eq)]
enum Slash {
    Exit,
    Help,
    Status,
    Tools,
    Commands,
    Run { kind: String, command: String },
    Enable { kind: String, params: BTreeMap<String, String> },
    Disable { kind: String },
    Forget,
}

const HELP: &str = "\
Commands:
  /status                       Enabled capabilities
  /tools                        Tools offered in this session
  /commands                     Commands of live capabilities
  /run <kind> <command>         Run a capability command
  /enable <kind> [key=value..]  Store parameters and enable a capability
  /disable <kind>               Disable a capability
  /forget                       Drop this session, memory included
  /exit, /quit                  Exit the chat
  /help                         Show this help";

fn parse_slash(input: &str) -> Result<Slash, String> {
    let mut words = input.split_whitespace();
    let cmd = words.next().unwrap_or_default();
    let rest: Vec<&str> = words.collect();

    let usage = |u: &str| Err(format!("Usage: {u}"));
    Ok(match (cmd, rest.as_slice()) {
        ("/exit" | "/quit", _) => Slash::Exit,
        ("/help", _) => Slash::Help,
        ("/status", _) => Slash::Status,
        ("/tools", _) => Slash::Tools,
        ("/commands", _) => Slash::Commands,
        ("/forget", _) => Slash::Forget,
        ("/run", [kind, command]) => Slash::Run {
            kind: (*kind).to_owned(),
            command: (*command).to_owned(),
        },
        ("/run", _) => return usage("/run <kind> <command>"),
        ("/enable", [kind, params @ ..]) => Slash::Enable {
            kind: (*kind).to_owned(),
            params: params
                .iter()
                .map(|p| parse_param(p))
                .collect::<Result<_, _>>()?,
        },
        ("/enable", _) => return usage("/enable <kind> [key=value..]"),
        ("/disable", [kind]) => Slash::Disable {
            kind: (*kind).to_owned(),
        },
        ("/disable", _) => return usage("/disable <kind>"),
        (other, _) => return Err(format!("Unknown command: {other}  (type /help for a list)")),
    })
}

async fn run_slash(manager: &SessionManager, user: &str, cmd: Slash) -> anyhow::Result<()> {
    match cmd {
        Slash::Exit => {}
        Slash::Help => eprintln!("{HELP}"),
        Slash::Status => {
            for (kind, enabled) in manager.status(user)? {
                eprintln!("  {kind:<16} {}", if enabled { "enabled" } else { "disabled" });
            }
        }
        Slash::Tools => {
            let summary = manager.get_or_create(user).await;
            eprintln!("  tools: {}", summary.tools.join(", "));
            for skipped in &summary.skipped {
                eprintln!("  inactive {}: {}", skipped.kind, skipped.reason);
            }
        }
        Slash::Commands => {
            let commands = manager.available_commands(user).await;
            for (kind, commands) in commands {
                for (name, description) in commands {
                    eprintln!("  {kind} {name:<16} {description}");
                }
            }
        }
        Slash::Run { kind, command } => {
            let outcome = manager.run_command(user, &kind, &command).await?;
            eprintln!("  {kind} {command}: {outcome}");
        }
        Slash::Enable { kind, params } => {
            let summary = manager.enable(user, &kind, &params).await?;
            if summary.live.iter().any(|k| *k == kind) {
                eprintln!("  {kind} enabled");
            } else {
                let reason = summary
                    .skipped
                    .iter()
                    .find(|s| s.kind == kind)
                    .map(|s| s.reason.as_str())
                    .unwrap_or("unknown reason");
                eprintln!("  {kind} enabled but inactive: {reason}");
            }
        }
        Slash::Disable { kind } => {
            manager.disable(user, &kind).await?;
            eprintln!("  {kind} disabled");
        }
        Slash::Forget => {
            manager.evict(user).await;
            eprintln!("  session dropped");
        }
    }
    Ok(())
}
