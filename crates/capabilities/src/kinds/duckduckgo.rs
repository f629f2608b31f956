//! DuckDuckGo Instant Answer search. Needs no user parameters.

use std::sync::Arc;

use cg_domain::error::Result;
use cg_domain::tool::ToolDefinition;
use serde_json::{Map, Value};

use crate::capability::{
    required_str, string_args_schema, Capability, CapabilityKind, ParameterSpec, ResolvedParams,
    Tool, ToolOutput,
};
use crate::http;

pub const KIND: &str = "duckduckgo";

const ENDPOINT: &str = "https://api.duckduckgo.com/";
const NO_RESULT: &str = "No good DuckDuckGo Search Result was found";

pub struct DuckDuckGoKind {
    http: reqwest::Client,
    max_results: usize,
}

impl DuckDuckGoKind {
    pub fn new(http_timeout_ms: u64, max_results: usize) -> Result<Self> {
        Ok(Self {
            http: http::client(http_timeout_ms)?,
            max_results,
        })
    }
}

#[async_trait::async_trait]
impl CapabilityKind for DuckDuckGoKind {
    fn name(&self) -> &'static str {
        KIND
    }

    fn description(&self) -> &'static str {
        "Web search through DuckDuckGo"
    }

    fn parameters(&self) -> &'static [ParameterSpec] {
        &[]
    }

    async fn construct(&self, _params: ResolvedParams) -> Result<Arc<dyn Capability>> {
        Ok(Arc::new(DuckDuckGo {
            tool: Arc::new(SearchTool {
                http: self.http.clone(),
                max_results: self.max_results,
            }),
        }))
    }
}

struct DuckDuckGo {
    tool: Arc<SearchTool>,
}

impl Capability for DuckDuckGo {
    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        vec![self.tool.clone()]
    }
}

struct SearchTool {
    http: reqwest::Client,
    max_results: usize,
}

impl SearchTool {
    async fn search(&self, query: &str) -> Result<String> {
        let req = self.http.get(ENDPOINT).query(&[
            ("q", query),
            ("format", "json"),
            ("no_html", "1"),
            ("skip_disambig", "1"),
        ]);
        let body = http::send_json(req).await?;
        Ok(render(&body, self.max_results))
    }
}

#[async_trait::async_trait]
impl Tool for SearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "duckduckgo_search".into(),
            description: "A wrapper around DuckDuckGo Search. Useful for answering questions \
                          about current events. Input should be a search query."
                .into(),
            parameters: string_args_schema(&[("query", "Search query")]),
        }
    }

    fn name(&self) -> &str {
        "duckduckgo_search"
    }

    async fn invoke(&self, args: &Map<String, Value>) -> ToolOutput {
        match required_str(args, "query") {
            Ok(query) => ToolOutput::from_result(self.search(query).await, "DuckDuckGo search failed"),
            Err(out) => out,
        }
    }
}

/// Answer, abstract and related-topic snippets, in that order.
fn render(body: &Value, max_results: usize) -> String {
    let mut snippets: Vec<&str> = Vec::new();
    for key in ["Answer", "AbstractText", "Definition"] {
        if let Some(text) = body.get(key).and_then(Value::as_str).filter(|t| !t.is_empty()) {
            snippets.push(text);
        }
    }

    let topics = body
        .get("RelatedTopics")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for topic in topics {
        if snippets.len() >= max_results {
            break;
        }
        // Grouped topics nest their entries one level down.
        let entries = match topic.get("Topics").and_then(Value::as_array) {
            Some(nested) => nested.iter().collect::<Vec<_>>(),
            None => vec![topic],
        };
        for entry in entries {
            if let Some(text) = entry.get("Text").and_then(Value::as_str).filter(|t| !t.is_empty()) {
                snippets.push(text);
            }
        }
    }
    snippets.truncate(max_results.max(1));

    if snippets.is_empty() {
        NO_RESULT.to_owned()
    } else {
        snippets.join(" ")
    }
}
