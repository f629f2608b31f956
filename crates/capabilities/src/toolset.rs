use std::collections::HashMap;
use std::sync::Arc;

use cg_domain::tool::{ToolDefinition, FINAL_ANSWER_TOOL};

use crate::capability::Tool;

/// An ordered set of tools with unique names.
///
/// The final-answer name is reserved and can never be inserted.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// First name in `tools` that would clash with this set, the reserved
    /// final-answer name, or an earlier entry of `tools` itself.
    pub fn first_conflict(&self, tools: &[Arc<dyn Tool>]) -> Option<String> {
        let mut seen: Vec<&str> = Vec::with_capacity(tools.len());
        for tool in tools {
            let name = tool.name();
            if name == FINAL_ANSWER_TOOL || self.index.contains_key(name) || seen.contains(&name) {
                return Some(name.to_owned());
            }
            seen.push(name);
        }
        None
    }

    /// Insert all of `tools` or none of them.
    pub fn try_extend(&mut self, tools: Vec<Arc<dyn Tool>>) -> Result<(), String> {
        if let Some(name) = self.first_conflict(&tools) {
            return Err(name);
        }
        for tool in tools {
            self.index.insert(tool.name().to_owned(), self.tools.len());
            self.tools.push(tool);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_owned()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.tools.iter().map(|t| t.name())).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ToolOutput;
    use serde_json::{Map, Value};

    struct Named(&'static str);

    #[async_trait::async_trait]
    impl Tool for Named {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: self.0.into(),
                description: String::new(),
                parameters: serde_json::json!({"type": "object"}),
            }
        }
        fn name(&self) -> &str {
            self.0
        }
        async fn invoke(&self, _args: &Map<String, Value>) -> ToolOutput {
            ToolOutput::ok(self.0)
        }
    }

    fn tools(names: &[&'static str]) -> Vec<Arc<dyn Tool>> {
        names.iter().map(|n| Arc::new(Named(*n)) as Arc<dyn Tool>).collect()
    }

    #[test]
    fn keeps_insertion_order() {
        let mut set = ToolSet::new();
        set.try_extend(tools(&["b", "a"])).unwrap();
        set.try_extend(tools(&["c"])).unwrap();
        assert_eq!(set.names(), vec!["b", "a", "c"]);
        assert!(set.get("a").is_some());
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn conflicting_batch_is_rejected_whole() {
        let mut set = ToolSet::new();
        set.try_extend(tools(&["a"])).unwrap();
        assert_eq!(set.try_extend(tools(&["z", "a"])), Err("a".to_owned()));
        assert!(!set.contains("z"));
    }

    #[test]
    fn reserved_and_self_duplicate_names_are_rejected() {
        let mut set = ToolSet::new();
        assert_eq!(
            set.try_extend(tools(&[FINAL_ANSWER_TOOL])),
            Err(FINAL_ANSWER_TOOL.to_owned())
        );
        assert_eq!(set.try_extend(tools(&["x", "x"])), Err("x".to_owned()));
        assert!(set.is_empty());
    }
}
