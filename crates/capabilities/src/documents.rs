//! Per-user document lookup backed by an external similarity index.

use std::sync::Arc;

use cg_domain::error::Result;
use cg_domain::tool::ToolDefinition;
use serde_json::{Map, Value};

use crate::capability::{required_str, string_args_schema, Tool, ToolOutput};

pub const DOCUMENT_LOOKUP_TOOL: &str = "document_lookup";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHit {
    pub content: String,
    /// Id of the message the document arrived with, if known.
    pub correlation_id: Option<String>,
}

/// The similarity-search collaborator. Indexing happens elsewhere.
#[async_trait::async_trait]
pub trait DocumentIndex: Send + Sync {
    async fn search(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<DocumentHit>>;
}

/// `document_lookup`, bound to one user's documents.
pub struct DocumentLookupTool {
    index: Arc<dyn DocumentIndex>,
    user_id: String,
    limit: usize,
}

impl DocumentLookupTool {
    pub fn new(index: Arc<dyn DocumentIndex>, user_id: impl Into<String>, limit: usize) -> Self {
        Self {
            index,
            user_id: user_id.into(),
            limit,
        }
    }
}

#[async_trait::async_trait]
impl Tool for DocumentLookupTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: DOCUMENT_LOOKUP_TOOL.into(),
            description: "Search the user's own documents (bills, letters, notes). \
                          Each result carries the message_id to report as correlation_id."
                .into(),
            parameters: string_args_schema(&[("query", "What to search for")]),
        }
    }

    fn name(&self) -> &str {
        DOCUMENT_LOOKUP_TOOL
    }

    async fn invoke(&self, args: &Map<String, Value>) -> ToolOutput {
        let query = match required_str(args, "query") {
            Ok(q) => q,
            Err(out) => return out,
        };
        match self.index.search(&self.user_id, query, self.limit).await {
            Ok(hits) if hits.is_empty() => ToolOutput::ok("No documents matched the query."),
            Ok(hits) => ToolOutput::ok(
                hits.iter()
                    .map(|h| match &h.correlation_id {
                        Some(id) => format!("message_id: {id}\n{}", h.content),
                        None => h.content.clone(),
                    })
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            ),
            Err(e) => ToolOutput::error(format!("document search failed: {e}")),
        }
    }
}
