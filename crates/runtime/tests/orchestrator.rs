use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cg_capabilities::{Tool, ToolOutput, ToolSet};
use cg_domain::config::{MissingCorrelationId, OrchestratorConfig};
use cg_domain::error::{Error, Result};
use cg_domain::tool::{Message, Role, ToolCall, ToolDefinition, FINAL_ANSWER_TOOL};
use cg_providers::{ChatRequest, ChatResponse, LlmProvider};
use cg_runtime::{CutoffReason, Orchestrator, TurnStatus};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

// ── Doubles ───────────────────────────────────────────────────────

/// Replays queued responses, then repeats `fallback` forever.
struct ScriptedProvider {
    queue: Mutex<VecDeque<Result<ChatResponse>>>,
    fallback: Option<ChatResponse>,
    delay: Option<Duration>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            queue: Mutex::new(responses.into_iter().map(Ok).collect()),
            fallback: None,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn repeating(response: ChatResponse) -> Self {
        Self {
            fallback: Some(response),
            ..Self::new(Vec::new())
        }
    }

    fn failing(err: Error) -> Self {
        let provider = Self::new(Vec::new());
        provider.queue.lock().push_back(Err(err));
        provider
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().push(req.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.queue.lock().pop_front();
        match next {
            Some(resp) => resp,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| Error::Other("script exhausted".into())),
        }
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }
}

/// Records every invocation and answers with a fixed output.
struct RecordingTool {
    name: &'static str,
    output: ToolOutput,
    seen: Mutex<Vec<Map<String, Value>>>,
}

impl RecordingTool {
    fn ok(name: &'static str, content: &str) -> Arc<Self> {
        Arc::new(Self {
            name,
            output: ToolOutput::ok(content),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn failing(name: &'static str, content: &str) -> Arc<Self> {
        Arc::new(Self {
            name,
            output: ToolOutput::error(content),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn invocations(&self) -> Vec<Map<String, Value>> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.into(),
            description: format!("{} tool", self.name),
            parameters: json!({"type": "object", "properties": {}}),
        }
    }

    fn name(&self) -> &str {
        self.name
    }

    async fn invoke(&self, args: &Map<String, Value>) -> ToolOutput {
        self.seen.lock().push(args.clone());
        self.output.clone()
    }
}

// ── Helpers ───────────────────────────────────────────────────────

fn text(content: &str) -> ChatResponse {
    ChatResponse {
        content: content.into(),
        ..Default::default()
    }
}

fn calls(content: &str, calls: Vec<ToolCall>) -> ChatResponse {
    ChatResponse {
        content: content.into(),
        tool_calls: calls,
        ..Default::default()
    }
}

fn call(id: &str, tool: &str, arguments: Value) -> ToolCall {
    ToolCall {
        call_id: id.into(),
        tool_name: tool.into(),
        arguments,
    }
}

fn final_answer(id: &str, arguments: Value) -> ToolCall {
    call(id, FINAL_ANSWER_TOOL, arguments)
}

fn toolset(tools: &[Arc<RecordingTool>]) -> ToolSet {
    let mut set = ToolSet::new();
    set.try_extend(tools.iter().map(|t| t.clone() as Arc<dyn Tool>).collect())
        .unwrap();
    set
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        system_prompt: "be helpful".into(),
        ..Default::default()
    }
}

fn orchestrator(provider: &Arc<ScriptedProvider>, tools: ToolSet, config: OrchestratorConfig) -> Orchestrator {
    Orchestrator::new(provider.clone() as Arc<dyn LlmProvider>, tools, config)
}

// ── Happy paths ───────────────────────────────────────────────────

#[tokio::test]
async fn plain_text_ends_the_turn() {
    let provider = Arc::new(ScriptedProvider::new(vec![text("hello there")]));
    let orch = orchestrator(&provider, ToolSet::new(), config());

    let reply = orch.run("u1", "hi", Vec::new()).await.unwrap();

    assert_eq!(reply.answer, "hello there");
    assert_eq!(reply.correlation_id, None);
    assert!(reply.is_completed());
    assert_eq!(reply.iterations, 1);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn final_answer_call_carries_correlation_id() {
    let provider = Arc::new(ScriptedProvider::new(vec![calls(
        "",
        vec![final_answer("c1", json!({"output": "X", "correlation_id": "42"}))],
    )]));
    let orch = orchestrator(&provider, ToolSet::new(), config());

    let reply = orch.run("u1", "q", Vec::new()).await.unwrap();

    assert_eq!(reply.answer, "X");
    assert_eq!(reply.correlation_id.as_deref(), Some("42"));
    assert_eq!(reply.status, TurnStatus::Completed);
}

#[tokio::test]
async fn final_answer_wins_over_sibling_calls() {
    let lookup = RecordingTool::ok("lookup", "data");
    let provider = Arc::new(ScriptedProvider::new(vec![calls(
        "",
        vec![
            call("c1", "lookup", json!({})),
            final_answer("c2", json!({"output": "done"})),
        ],
    )]));
    let orch = orchestrator(&provider, toolset(&[lookup.clone()]), config());

    let reply = orch.run("u1", "q", Vec::new()).await.unwrap();

    assert_eq!(reply.answer, "done");
    assert!(lookup.invocations().is_empty());
}

#[tokio::test]
async fn tool_result_is_fed_back_with_its_call_id() {
    let lookup = RecordingTool::ok("lookup", "the lights are on");
    let provider = Arc::new(ScriptedProvider::new(vec![
        calls("", vec![call("c1", "lookup", json!({"query": "lights"}))]),
        text("They are on."),
    ]));
    let orch = orchestrator(&provider, toolset(&[lookup.clone()]), config());

    let reply = orch.run("u1", "are the lights on?", Vec::new()).await.unwrap();

    assert_eq!(reply.answer, "They are on.");
    assert_eq!(reply.iterations, 2);
    assert_eq!(lookup.invocations(), vec![json!({"query": "lights"}).as_object().unwrap().clone()]);

    let requests = provider.requests.lock();
    let second = &requests[1];
    let last = second.messages.last().unwrap();
    assert_eq!(last.role, Role::Tool);
    assert_eq!(last.tool_result_id(), Some("c1"));
    assert_eq!(last.content.text(), Some("the lights are on"));
}

#[tokio::test]
async fn multiple_calls_run_in_emission_order() {
    let a = RecordingTool::ok("a", "from a");
    let b = RecordingTool::ok("b", "from b");
    let provider = Arc::new(ScriptedProvider::new(vec![
        calls("", vec![call("c1", "b", json!({})), call("c2", "a", json!({}))]),
        text("ok"),
    ]));
    let orch = orchestrator(&provider, toolset(&[a.clone(), b.clone()]), config());

    let reply = orch.run("u1", "q", Vec::new()).await.unwrap();

    let results: Vec<_> = reply
        .transcript
        .iter()
        .filter_map(|m| m.tool_result_id())
        .collect();
    assert_eq!(results, vec!["c1", "c2"]);
    assert_eq!(a.invocations().len(), 1);
    assert_eq!(b.invocations().len(), 1);
}

// ── Tool failures ─────────────────────────────────────────────────

#[tokio::test]
async fn unknown_tool_becomes_error_result() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        calls("", vec![call("c1", "teleport", json!({}))]),
        text("cannot do that"),
    ]));
    let orch = orchestrator(&provider, ToolSet::new(), config());

    let reply = orch.run("u1", "q", Vec::new()).await.unwrap();

    assert!(reply.is_completed());
    let tool_msg = reply.transcript.iter().find(|m| m.role == Role::Tool).unwrap();
    assert_eq!(tool_msg.content.text(), Some("tool not found: teleport"));
}

#[tokio::test]
async fn failing_tool_output_is_fed_back() {
    let broken = RecordingTool::failing("broken", "Error while connecting");
    let provider = Arc::new(ScriptedProvider::new(vec![
        calls("", vec![call("c1", "broken", Value::Null)]),
        text("sorry"),
    ]));
    let orch = orchestrator(&provider, toolset(&[broken.clone()]), config());

    let reply = orch.run("u1", "q", Vec::new()).await.unwrap();

    assert_eq!(reply.answer, "sorry");
    assert_eq!(broken.invocations(), vec![Map::new()]);
    let requests = provider.requests.lock();
    let second = &requests[1];
    assert_eq!(
        second.messages.last().unwrap().content.text(),
        Some("Error while connecting")
    );
}

#[tokio::test]
async fn malformed_arguments_fail_the_turn() {
    let lookup = RecordingTool::ok("lookup", "data");
    let provider = Arc::new(ScriptedProvider::new(vec![calls(
        "",
        vec![call("c9", "lookup", Value::String("{not json".into()))],
    )]));
    let orch = orchestrator(&provider, toolset(&[lookup.clone()]), config());

    let err = orch.run("u1", "q", Vec::new()).await.unwrap_err();

    assert!(matches!(err, Error::MalformedCall { ref call_id, .. } if call_id == "c9"));
    assert!(lookup.invocations().is_empty());
}

#[tokio::test]
async fn malformed_final_answer_fails_the_turn() {
    let provider = Arc::new(ScriptedProvider::new(vec![calls(
        "",
        vec![final_answer("c1", json!({"correlation_id": "1"}))],
    )]));
    let orch = orchestrator(&provider, ToolSet::new(), config());

    assert!(matches!(
        orch.run("u1", "q", Vec::new()).await,
        Err(Error::MalformedCall { .. })
    ));
}

#[tokio::test]
async fn provider_error_propagates() {
    let provider = Arc::new(ScriptedProvider::failing(Error::Provider {
        provider: "scripted".into(),
        message: "503".into(),
    }));
    let orch = orchestrator(&provider, ToolSet::new(), config());

    assert!(matches!(
        orch.run("u1", "q", Vec::new()).await,
        Err(Error::Provider { .. })
    ));
}

// ── Cutoffs ───────────────────────────────────────────────────────

#[tokio::test]
async fn iteration_limit_degrades_with_partial_text() {
    let looping = RecordingTool::ok("lookup", "more");
    let provider = Arc::new(ScriptedProvider::repeating(calls(
        "still thinking",
        vec![call("c1", "lookup", json!({}))],
    )));
    let cfg = OrchestratorConfig {
        max_iterations: 3,
        ..config()
    };
    let orch = orchestrator(&provider, toolset(&[looping.clone()]), cfg.clone());

    let reply = orch.run("u1", "q", Vec::new()).await.unwrap();

    assert_eq!(provider.calls(), 3);
    assert_eq!(reply.iterations, 3);
    assert_eq!(reply.answer, cfg.cutoff_message);
    assert_eq!(reply.correlation_id, None);
    assert_eq!(
        reply.status,
        TurnStatus::Degraded {
            reason: CutoffReason::IterationLimit,
            partial: Some("still thinking".into()),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn time_budget_is_checked_between_steps() {
    let looping = RecordingTool::ok("lookup", "more");
    let provider = Arc::new(
        ScriptedProvider::repeating(calls("", vec![call("c1", "lookup", json!({}))]))
            .with_delay(Duration::from_secs(40)),
    );
    let cfg = OrchestratorConfig {
        max_execution_secs: 60,
        ..config()
    };
    let orch = orchestrator(&provider, toolset(&[looping]), cfg);

    let reply = orch.run("u1", "q", Vec::new()).await.unwrap();

    // 0s and 40s start a step; at 80s the budget is spent.
    assert_eq!(provider.calls(), 2);
    assert_eq!(
        reply.status,
        TurnStatus::Degraded {
            reason: CutoffReason::TimeBudget,
            partial: None,
        }
    );
}

// ── Prompt layout ─────────────────────────────────────────────────

#[tokio::test]
async fn prompt_is_system_then_memory_then_query() {
    let provider = Arc::new(ScriptedProvider::new(vec![text("fine")]));
    let lookup = RecordingTool::ok("lookup", "data");
    let orch = orchestrator(&provider, toolset(&[lookup]), config());
    let memory = vec![Message::user("earlier"), Message::assistant("earlier answer")];

    orch.run("u1", "now", memory).await.unwrap();

    let requests = provider.requests.lock();
    let req = &requests[0];
    assert_eq!(
        req.messages,
        vec![
            Message::system("be helpful"),
            Message::user("earlier"),
            Message::assistant("earlier answer"),
            Message::user("now"),
        ]
    );
    let names: Vec<_> = req.tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["lookup", FINAL_ANSWER_TOOL]);
}

#[tokio::test]
async fn zero_policy_applies_to_final_answer_without_id() {
    let provider = Arc::new(ScriptedProvider::new(vec![calls(
        "",
        vec![final_answer("c1", json!({"output": "X"}))],
    )]));
    let cfg = OrchestratorConfig {
        missing_correlation_id: MissingCorrelationId::Zero,
        ..config()
    };
    let orch = orchestrator(&provider, ToolSet::new(), cfg);

    let reply = orch.run("u1", "q", Vec::new()).await.unwrap();

    assert_eq!(reply.correlation_id.as_deref(), Some("0"));
}
