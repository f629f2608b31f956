//! `concierge ask`: one query, one answer, exit.

use serde::Serialize;

use cg_domain::config::Config;
use cg_runtime::{TurnReply, TurnStatus};

use crate::bootstrap;

#[derive(Debug, Serialize)]
struct AskOutput<'a> {
    answer: &'a str,
    correlation_id: Option<&'a str>,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    partial: Option<&'a str>,
    iterations: usize,
}

impl<'a> From<&'a TurnReply> for AskOutput<'a> {
    fn from(reply: &'a TurnReply) -> Self {
        let (status, partial) = match &reply.status {
            TurnStatus::Completed => ("completed", None),
            TurnStatus::Degraded { reason, partial } => (reason.as_str(), partial.as_deref()),
        };
        Self {
            answer: &reply.answer,
            correlation_id: reply.correlation_id.as_deref(),
            status,
            partial,
            iterations: reply.iterations,
        }
    }
}

pub async fn run(config: &Config, user: &str, message: &str, json: bool) -> anyhow::Result<()> {
    let manager = bootstrap::build_session_manager(config)?;
    let reply = manager.ask(user, message).await?;

    if json {
        let out = serde_json::to_string_pretty(&AskOutput::from(&reply))
            .map_err(|e| anyhow::anyhow!("serializing reply: {e}"))?;
        println!("{out}");
        return Ok(());
    }

    println!("{}", reply.answer);
    if let Some(id) = &reply.correlation_id {
        eprintln!("\x1b[2m[correlation id: {id}]\x1b[0m");
    }
    if !reply.is_completed() {
        eprintln!("\x1b[2m(turn cut off after {} step(s))\x1b[0m", reply.iterations);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_runtime::CutoffReason;

    fn reply(status: TurnStatus) -> TurnReply {
        TurnReply {
            answer: "A".into(),
            correlation_id: Some("42".into()),
            status,
            iterations: 2,
            transcript: Vec::new(),
        }
    }

    #[test]
    fn completed_reply_json() {
        let reply = reply(TurnStatus::Completed);
        let value = serde_json::to_value(AskOutput::from(&reply)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "answer": "A",
                "correlation_id": "42",
                "status": "completed",
                "iterations": 2
            })
        );
    }

    #[test]
    fn degraded_reply_carries_partial_text() {
        let reply = reply(TurnStatus::Degraded {
            reason: CutoffReason::TimeBudget,
            partial: Some("half".into()),
        });
        let value = serde_json::to_value(AskOutput::from(&reply)).unwrap();
        assert_eq!(value["status"], "time_budget");
        assert_eq!(value["partial"], "half");
    }
}
