//! The decide/act loop.
//!
//! `DECIDE` asks the decision-maker for the next move, `ACT` runs the tool
//! calls it asked for, and `END` carries the answer out. The loop state is
//! an [`AgentState`] value handed from step to step; nothing outside one
//! `run` call can observe or mutate it.
//!
//! Termination: before every `DECIDE` the iteration count and the elapsed
//! wall-clock time are checked against the configured limits. Crossing
//! either yields a degraded [`TurnReply`] instead of another step. A
//! request already in flight is never cancelled.

use std::sync::Arc;
use std::time::Duration;

use cg_capabilities::{ToolOutput, ToolSet};
use cg_domain::config::OrchestratorConfig;
use cg_domain::error::{Error, Result};
use cg_domain::tool::{Message, Role, ToolCall, FINAL_ANSWER_TOOL};
use cg_domain::trace::TraceEvent;
use cg_providers::{ChatRequest, LlmProvider};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::Instrument;

use crate::final_answer::{self, FinalAnswer};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State and results
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Working state of one turn.
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    /// This turn's messages: the query, then assistant and tool messages
    /// in the order they were produced.
    pub messages: Vec<Message>,
    /// Prior exchanges, read-only for the whole turn.
    pub memory: Vec<Message>,
}

enum Step {
    Decide(AgentState),
    Act(AgentState, Vec<ToolCall>),
    End(AgentState, FinalAnswer),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutoffReason {
    IterationLimit,
    TimeBudget,
}

impl CutoffReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CutoffReason::IterationLimit => "iteration_limit",
            CutoffReason::TimeBudget => "time_budget",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnStatus {
    Completed,
    /// Cut off before a final answer. `partial` is the last non-empty
    /// assistant text seen during the turn, if any.
    Degraded {
        reason: CutoffReason,
        partial: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct TurnReply {
    pub answer: String,
    pub correlation_id: Option<String>,
    pub status: TurnStatus,
    /// Number of `DECIDE` steps taken.
    pub iterations: usize,
    /// This turn's messages, query first.
    pub transcript: Vec<Message>,
}

impl TurnReply {
    pub fn is_completed(&self) -> bool {
        self.status == TurnStatus::Completed
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Drives one turn at a time against a fixed tool set.
///
/// The tool set is captured at construction; a configuration change means
/// building a new orchestrator, never patching this one.
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    tools: ToolSet,
    config: OrchestratorConfig,
    temperature: Option<f32>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn LlmProvider>, tools: ToolSet, config: OrchestratorConfig) -> Self {
        Self {
            provider,
            tools,
            config,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    /// Run one turn for `query`, with `memory` as prior context.
    ///
    /// Returns `Err` only for an orchestration failure: a decision-maker
    /// error or a malformed structured call. Cutoffs are `Ok` with a
    /// degraded status.
    pub async fn run(&self, user_id: &str, query: &str, memory: Vec<Message>) -> Result<TurnReply> {
        let span = tracing::info_span!("turn", user_id = %user_id, tools = self.tools.len());
        let started = Instant::now();
        let result = self.run_loop(query, memory, started).instrument(span).await;

        let outcome = match &result {
            Ok(reply) => match &reply.status {
                TurnStatus::Completed => "completed",
                TurnStatus::Degraded { reason, .. } => reason.as_str(),
            },
            Err(_) => "failed",
        };
        TraceEvent::TurnCompleted {
            user_id: user_id.to_owned(),
            iterations: result.as_ref().map(|r| r.iterations).unwrap_or_default(),
            duration_ms: started.elapsed().as_millis() as u64,
            outcome: outcome.to_owned(),
        }
        .emit();
        result
    }

    async fn run_loop(&self, query: &str, memory: Vec<Message>, started: Instant) -> Result<TurnReply> {
        let mut iterations = 0usize;
        let mut step = Step::Decide(AgentState {
            messages: vec![Message::user(query)],
            memory,
        });

        loop {
            step = match step {
                Step::Decide(state) => {
                    if let Some(reason) = self.cutoff(iterations, started) {
                        tracing::warn!(iterations, reason = reason.as_str(), "turn cut off");
                        return Ok(self.degraded(state, reason, iterations));
                    }
                    iterations += 1;
                    self.decide(state, iterations).await?
                }
                Step::Act(state, calls) => Step::Decide(self.act(state, calls).await),
                Step::End(state, answer) => {
                    tracing::debug!(iterations, "turn completed");
                    return Ok(TurnReply {
                        answer: answer.output,
                        correlation_id: answer.correlation_id,
                        status: TurnStatus::Completed,
                        iterations,
                        transcript: state.messages,
                    });
                }
            };
        }
    }

    fn cutoff(&self, iterations: usize, started: Instant) -> Option<CutoffReason> {
        if iterations >= self.config.max_iterations {
            return Some(CutoffReason::IterationLimit);
        }
        if started.elapsed() >= Duration::from_secs(self.config.max_execution_secs) {
            return Some(CutoffReason::TimeBudget);
        }
        None
    }

    fn degraded(&self, state: AgentState, reason: CutoffReason, iterations: usize) -> TurnReply {
        let partial = state
            .messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .filter_map(|m| m.content.text())
            .find(|t| !t.trim().is_empty())
            .map(str::to_owned);
        TurnReply {
            answer: self.config.cutoff_message.clone(),
            correlation_id: None,
            status: TurnStatus::Degraded { reason, partial },
            iterations,
            transcript: state.messages,
        }
    }

    // ── DECIDE ────────────────────────────────────────────────────

    async fn decide(&self, mut state: AgentState, iteration: usize) -> Result<Step> {
        let mut tools = self.tools.definitions();
        tools.push(final_answer::definition());

        let mut messages = Vec::with_capacity(state.memory.len() + state.messages.len() + 1);
        if !self.config.system_prompt.is_empty() {
            messages.push(Message::system(&self.config.system_prompt));
        }
        messages.extend(state.memory.iter().cloned());
        messages.extend(state.messages.iter().cloned());

        let req = ChatRequest {
            messages,
            tools,
            temperature: self.temperature,
            ..Default::default()
        };

        let span = tracing::info_span!(
            "llm.call",
            provider = %self.provider.provider_id(),
            iteration,
        );
        let resp = self.provider.chat(&req).instrument(span).await?;

        for call in &resp.tool_calls {
            if call.tool_name != FINAL_ANSWER_TOOL {
                check_arguments(call)?;
            }
        }

        state
            .messages
            .push(Message::assistant_with_calls(&resp.content, &resp.tool_calls));

        if resp.tool_calls.is_empty() {
            let answer = FinalAnswer {
                output: resp.content,
                correlation_id: None,
            };
            return Ok(Step::End(state, answer));
        }

        // A final answer wins over anything else requested in the same step.
        if let Some(call) = resp.tool_calls.iter().find(|c| c.tool_name == FINAL_ANSWER_TOOL) {
            let answer = final_answer::parse(call)?.with_policy(self.config.missing_correlation_id);
            return Ok(Step::End(state, answer));
        }

        Ok(Step::Act(state, resp.tool_calls))
    }

    // ── ACT ───────────────────────────────────────────────────────

    async fn act(&self, mut state: AgentState, calls: Vec<ToolCall>) -> AgentState {
        for call in calls {
            let span = tracing::info_span!("tool.call", tool = %call.tool_name, call_id = %call.call_id);
            let started = Instant::now();
            let output = self.invoke(&call).instrument(span).await;

            TraceEvent::ToolInvoked {
                tool: call.tool_name.clone(),
                call_id: call.call_id.clone(),
                is_error: output.is_error,
                duration_ms: started.elapsed().as_millis() as u64,
            }
            .emit();

            state.messages.push(if output.is_error {
                Message::tool_error(call.call_id, output.content)
            } else {
                Message::tool_result(call.call_id, output.content)
            });
        }
        state
    }

    async fn invoke(&self, call: &ToolCall) -> ToolOutput {
        let Some(tool) = self.tools.get(&call.tool_name) else {
            tracing::warn!(tool = %call.tool_name, "decision-maker requested unknown tool");
            return ToolOutput::error(format!("tool not found: {}", call.tool_name));
        };
        let empty = Map::new();
        let args = match &call.arguments {
            Value::Object(map) => map,
            _ => &empty,
        };
        tool.invoke(args).await
    }
}

/// Tool arguments must be a JSON object (or absent).
fn check_arguments(call: &ToolCall) -> Result<()> {
    match &call.arguments {
        Value::Object(_) | Value::Null => Ok(()),
        other => Err(Error::MalformedCall {
            tool: call.tool_name.clone(),
            call_id: call.call_id.clone(),
            message: format!("arguments must be a JSON object, got {other}"),
        }),
    }
}
