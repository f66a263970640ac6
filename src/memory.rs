//! Conversation state: the visible transcript and the model-facing memory.
//!
//! The two are kept apart. The transcript records everything the user saw,
//! including failed questions and the error they produced; memory only holds
//! completed question/answer exchanges, because it is replayed into every
//! prompt.

use serde::{Deserialize, Serialize};

/// One entry of the visible transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "content", rename_all = "lowercase")]
pub enum ConversationTurn {
    User(String),
    Assistant(String),
    /// A question that produced no answer, with the error shown to the user.
    Failed(String),
}

impl ConversationTurn {
    pub fn text(&self) -> &str {
        match self {
            ConversationTurn::User(t)
            | ConversationTurn::Assistant(t)
            | ConversationTurn::Failed(t) => t,
        }
    }
}

/// A completed question and its final answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
}

/// Ordered, unbounded record of completed exchanges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMemory {
    exchanges: Vec<Exchange>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.exchanges.push(Exchange {
            question: question.into(),
            answer: answer.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    pub fn clear(&mut self) {
        self.exchanges.clear();
    }

    /// Render the history as `Human:`/`Assistant:` lines, oldest first.
    /// Empty memory renders as the empty string.
    pub fn format_history(&self) -> String {
        self.exchanges
            .iter()
            .map(|e| format!("Human: {}\nAssistant: {}", e.question, e.answer))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_lists_exchanges_in_order() {
        let mut m = ConversationMemory::new();
        assert_eq!(m.format_history(), "");
        m.append("Who wrote it?", "Victor Hugo.");
        m.append("When?", "1862.");
        assert_eq!(m.len(), 2);
        assert_eq!(
            m.format_history(),
            "Human: Who wrote it?\nAssistant: Victor Hugo.\nHuman: When?\nAssistant: 1862."
        );
        assert_eq!(m.exchanges()[1].question, "When?");
    }

    #[test]
    fn clear_empties_memory() {
        let mut m = ConversationMemory::new();
        m.append("q", "a");
        m.clear();
        assert!(m.is_empty());
    }

    #[test]
    fn turns_serialise_with_role_tag() {
        let t = ConversationTurn::User("hi".into());
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
        assert_eq!(t.text(), "hi");

        let failed = ConversationTurn::Failed("[generation] HTTP 401".into());
        assert_eq!(
            serde_json::to_string(&failed).unwrap(),
            r#"{"role":"failed","content":"[generation] HTTP 401"}"#
        );
    }
}
