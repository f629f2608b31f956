//! Google Custom Search JSON API.

use std::sync::Arc;

use cg_domain::error::Result;
use cg_domain::tool::ToolDefinition;
use serde_json::{Map, Value};

use crate::capability::{
    required_str, string_args_schema, Capability, CapabilityKind, ParameterSpec, ResolvedParams,
    Tool, ToolOutput,
};
use crate::http;

pub const KIND: &str = "googlesearch";

const ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";
const NO_RESULT: &str = "No good Google Search Result was found";

const PARAMETERS: &[ParameterSpec] = &[
    ParameterSpec::user("google_api_key", "Google API Key"),
    ParameterSpec::user("google_cse_id", "Google Search ID"),
];

pub struct GoogleSearchKind {
    http: reqwest::Client,
    max_results: usize,
}

impl GoogleSearchKind {
    pub fn new(http_timeout_ms: u64, max_results: usize) -> Result<Self> {
        Ok(Self {
            http: http::client(http_timeout_ms)?,
            max_results,
        })
    }
}

#[async_trait::async_trait]
impl CapabilityKind for GoogleSearchKind {
    fn name(&self) -> &'static str {
        KIND
    }

    fn description(&self) -> &'static str {
        "Web search through Google Programmable Search"
    }

    fn parameters(&self) -> &'static [ParameterSpec] {
        PARAMETERS
    }

    async fn construct(&self, params: ResolvedParams) -> Result<Arc<dyn Capability>> {
        Ok(Arc::new(GoogleSearch {
            tool: Arc::new(SearchTool {
                http: self.http.clone(),
                api_key: params.require("google_api_key")?.to_owned(),
                cse_id: params.require("google_cse_id")?.to_owned(),
                max_results: self.max_results,
            }),
        }))
    }
}

struct GoogleSearch {
    tool: Arc<SearchTool>,
}

impl Capability for GoogleSearch {
    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        vec![self.tool.clone()]
    }
}

struct SearchTool {
    http: reqwest::Client,
    api_key: String,
    cse_id: String,
    max_results: usize,
}

impl SearchTool {
    async fn search(&self, query: &str) -> Result<String> {
        // The API caps `num` at 10.
        let num = self.max_results.clamp(1, 10).to_string();
        let req = self.http.get(ENDPOINT).query(&[
            ("key", self.api_key.as_str()),
            ("cx", self.cse_id.as_str()),
            ("q", query),
            ("num", num.as_str()),
        ]);
        let body = http::send_json(req).await?;
        Ok(render(&body))
    }
}

#[async_trait::async_trait]
impl Tool for SearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "GoogleSearch".into(),
            description: "Search Google for recent results.".into(),
            parameters: string_args_schema(&[("query", "Search query")]),
        }
    }

    fn name(&self) -> &str {
        "GoogleSearch"
    }

    async fn invoke(&self, args: &Map<String, Value>) -> ToolOutput {
        match required_str(args, "query") {
            Ok(query) => ToolOutput::from_result(self.search(query).await, "Google search failed"),
            Err(out) => out,
        }
    }
}

fn render(body: &Value) -> String {
    let snippets: Vec<&str> = body
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.get("snippet").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if snippets.is_empty() {
        NO_RESULT.to_owned()
    } else {
        snippets.join(" ")
    }
}
