//! The budgeted in-memory conversation context.

use std::path::Path;

use repl_types::{Message, Role, StoreError};

use crate::counter::TokenCounter;

/// Ordered message sequence with a token budget.
///
/// Every mutation re-establishes the invariant that the summed token
/// estimates stay at or under the budget, trimming the oldest non-system
/// messages first. The most recent user message is never trimmed.
#[derive(Debug)]
pub struct ContextManager {
    messages: Vec<Message>,
    counter: TokenCounter,
    budget: usize,
    total_tokens: usize,
}

impl ContextManager {
    /// Create an empty context with the given token budget.
    #[must_use]
    pub fn new(budget: usize) -> Self {
        Self::with_counter(budget, TokenCounter::new())
    }

    /// Create an empty context with a custom counter.
    #[must_use]
    pub fn with_counter(budget: usize, counter: TokenCounter) -> Self {
        Self {
            messages: Vec::new(),
            counter,
            budget,
            total_tokens: 0,
        }
    }

    /// Append a message, computing its token estimate and trimming to
    /// budget.
    pub fn add(&mut self, role: Role, content: impl Into<String>) {
        self.push(Message::new(role, content));
    }

    /// Append a [`Role::Tool`] message.
    pub fn add_tool_result(&mut self, tool_name: impl Into<String>, content: impl Into<String>) {
        self.push(Message::tool(tool_name, content));
    }

    /// Append a pre-built message (used when replaying a stored session),
    /// recomputing its token estimate.
    pub fn push(&mut self, mut message: Message) {
        message.tokens = self.counter.estimate_message(&message);
        self.total_tokens += message.tokens;
        self.messages.push(message);
        self.trim();
    }

    /// Replace the content of the most recent user message (the enhanced
    /// prompt of a first-stage tool dispatch). No-op when no user message
    /// exists.
    pub fn rewrite_last_user(&mut self, content: impl Into<String>) {
        if let Some(idx) = self.messages.iter().rposition(|m| m.role == Role::User) {
            let message = &mut self.messages[idx];
            self.total_tokens = self.total_tokens.saturating_sub(message.tokens);
            message.content = content.into();
            message.tokens = self.counter.estimate_message(message);
            self.total_tokens += message.tokens;
            self.trim();
        }
    }

    /// Snapshot the sequence for an LLM request.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// The current sequence.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The running token total.
    #[must_use]
    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    /// The configured budget.
    #[must_use]
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Drop every message.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.total_tokens = 0;
    }

    /// Persist the message sequence as pretty JSON.
    pub async fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&self.messages)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Load a previously saved message sequence, re-estimating tokens and
    /// re-applying the budget.
    pub async fn load(path: &Path, budget: usize) -> Result<Self, StoreError> {
        let data = tokio::fs::read_to_string(path).await?;
        let messages: Vec<Message> = serde_json::from_str(&data)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut manager = Self::new(budget);
        for message in messages {
            manager.push(message);
        }
        Ok(manager)
    }

    /// While over budget, drop the oldest non-system message. A user
    /// message followed by its assistant completion is dropped as a pair to
    /// preserve alternation; the most recent user message is never dropped.
    fn trim(&mut self) {
        while self.total_tokens > self.budget {
            let Some(idx) = self.messages.iter().position(|m| m.role != Role::System) else {
                break;
            };
            let last_user = self.messages.iter().rposition(|m| m.role == Role::User);
            if Some(idx) == last_user {
                break;
            }
            let removed = self.messages.remove(idx);
            let mut dropped = removed.tokens;
            if removed.role == Role::User
                && self.messages.get(idx).is_some_and(|m| m.role == Role::Assistant)
            {
                // a dropped user turn takes its completion with it
                dropped += self.messages.remove(idx).tokens;
            }
            self.total_tokens = self.total_tokens.saturating_sub(dropped);
            tracing::debug!(
                dropped_tokens = dropped,
                total = self.total_tokens,
                "trimmed context to budget"
            );
        }
    }
}
