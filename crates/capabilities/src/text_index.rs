//! Small keyword index used by the lookup tools of built-in kinds.

use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedText {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct KeywordIndex {
    entries: Vec<(IndexedText, HashSet<String>)>,
}

impl KeywordIndex {
    pub fn new(docs: Vec<IndexedText>) -> Self {
        let entries = docs
            .into_iter()
            .map(|doc| {
                let tokens = tokenize(&doc.text).chain(tokenize(&doc.id)).collect();
                (doc, tokens)
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sharing at least one token with `query`, best first.
    /// Ties keep insertion order.
    pub fn search(&self, query: &str, limit: usize) -> Vec<&IndexedText> {
        let terms: HashSet<String> = tokenize(query).collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, usize)> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, (_, tokens))| {
                let score = terms.iter().filter(|t| tokens.contains(*t)).count();
                (score > 0).then_some((score, i))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        scored
            .into_iter()
            .take(limit)
            .map(|(_, i)| &self.entries[i].0)
            .collect()
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(str::to_lowercase)
}
