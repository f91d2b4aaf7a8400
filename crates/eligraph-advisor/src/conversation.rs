//! Conversation state for the chat surface.
//!
//! The history is a plain value owned by the caller: each turn takes the state in
//! and hands back the updated state with the reply.

use chrono::{DateTime, Utc};
use eligraph_rules::Facts;
use serde::{Deserialize, Serialize};

use crate::consultant::LlmConsultant;
use crate::evaluator::EligibilityEvaluator;
use crate::llm::Role;

pub const GREETING: &str =
    "Hello! I can help you find your academic path. How can I assist you today?";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl ChatMessage {
    fn now(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    messages: Vec<ChatMessage>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationState {
    /// A fresh conversation, opened by the assistant greeting.
    pub fn new() -> Self {
        Self {
            messages: vec![ChatMessage::now(Role::Assistant, GREETING)],
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_reply(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    #[must_use]
    pub fn with_message(mut self, role: Role, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::now(role, content));
        self
    }
}

/// Evaluator plus consultant: everything one chat turn needs.
#[derive(Clone)]
pub struct Advisor {
    evaluator: EligibilityEvaluator,
    consultant: LlmConsultant,
}

impl Advisor {
    pub fn new(evaluator: EligibilityEvaluator, consultant: LlmConsultant) -> Self {
        Self {
            evaluator,
            consultant,
        }
    }

    /// Record the query, answer it, record the answer.
    ///
    /// Neither an unavailable store nor an unreachable model fails the turn.
    pub async fn process_turn(
        &self,
        state: ConversationState,
        query: &str,
        facts: &Facts,
    ) -> (ConversationState, String) {
        let state = state.with_message(Role::User, query);
        let eligibility = self.evaluator.evaluate_or_empty(facts);
        tracing::debug!(matches = eligibility.len(), "processing chat turn");

        let reply = self.consultant.advise(query, &eligibility).await;
        (state.with_message(Role::Assistant, reply.clone()), reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_greeting() {
        let state = ConversationState::new();
        assert_eq!(state.len(), 1);
        assert_eq!(state.last_reply(), Some(GREETING));
    }

    #[test]
    fn messages_append_in_order() {
        let state = ConversationState::new()
            .with_message(Role::User, "hi")
            .with_message(Role::Assistant, "hello");
        let roles: Vec<Role> = state.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);
        assert_eq!(state.last_reply(), Some("hello"));
    }
}
