use std::collections::VecDeque;

use cg_domain::tool::Message;

/// One committed user/assistant pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub user: Message,
    pub assistant: Message,
}

/// Sliding window over the last `window` exchanges, oldest dropped first.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    window: usize,
    exchanges: VecDeque<Exchange>,
}

impl ConversationMemory {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            exchanges: VecDeque::with_capacity(window),
        }
    }

    pub fn commit(&mut self, query: impl Into<String>, answer: impl Into<String>) {
        if self.window == 0 {
            return;
        }
        while self.exchanges.len() >= self.window {
            self.exchanges.pop_front();
        }
        self.exchanges.push_back(Exchange {
            user: Message::user(query),
            assistant: Message::assistant(answer),
        });
    }

    /// Flattened history, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.exchanges
            .iter()
            .flat_map(|e| [e.user.clone(), e.assistant.clone()])
            .collect()
    }

    pub fn exchanges(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter()
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }
}
