use super::{HistoryEntry, Message, Role};

/// Message list plus the parallel plain-text history, with the two
/// cycle-scoped flags. Mutated only through the methods below.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    chat_id: String,
    messages: Vec<Message>,
    history: Vec<HistoryEntry>,
    /// A request cycle is open
    pub loading: bool,
    /// The assistant message of the current cycle exists
    pub answer_started: bool,
}

impl Conversation {
    pub fn new(chat_id: String) -> Self {
        Self { chat_id, ..Self::default() }
    }

    /// Seed from stored messages; history gets one entry per message.
    pub fn from_messages(chat_id: String, messages: Vec<Message>) -> Self {
        let history = messages.iter().map(|m| HistoryEntry(m.role.into(), m.content.clone())).collect();
        Self { chat_id, messages, history, loading: false, answer_started: false }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn position(&self, message_id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.message_id == message_id)
    }

    pub fn find(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.message_id == message_id)
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_history(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
    }

    /// Append a fragment to the message with `message_id`. Returns false if absent.
    pub fn append_content(&mut self, message_id: &str, text: &str) -> bool {
        match self.messages.iter_mut().find(|m| m.message_id == message_id) {
            Some(msg) => {
                msg.content.push_str(text);
                true
            }
            None => false,
        }
    }

    /// Attach follow-up suggestions to an assistant message.
    /// No-op (false) if the id is gone, is not an assistant turn, or already has suggestions.
    pub fn set_suggestions(&mut self, message_id: &str, suggestions: Vec<String>) -> bool {
        match self.messages.iter_mut().find(|m| m.message_id == message_id) {
            Some(msg) if msg.role == Role::Assistant && msg.suggestions.is_none() => {
                msg.suggestions = Some(suggestions);
                true
            }
            _ => false,
        }
    }

    /// Keep only the first `len` messages and the first `len` history entries.
    pub fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
        self.history.truncate(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Speaker;
    use crate::state::test_helpers::MessageBuilder;

    fn sample() -> Conversation {
        Conversation::from_messages(
            "chat".to_string(),
            vec![
                MessageBuilder::user("q1").id("u1").build(),
                MessageBuilder::assistant("a1").id("a1").build(),
            ],
        )
    }

    #[test]
    fn from_messages_derives_history() {
        let conv = sample();
        assert_eq!(conv.history().len(), 2);
        assert_eq!(conv.history()[0], HistoryEntry(Speaker::Human, "q1".to_string()));
        assert_eq!(conv.history()[1], HistoryEntry(Speaker::Assistant, "a1".to_string()));
        assert!(!conv.loading);
    }

    #[test]
    fn append_content_matches_by_id() {
        let mut conv = sample();
        assert!(conv.append_content("a1", " more"));
        assert_eq!(conv.find("a1").unwrap().content, "a1 more");
        assert!(!conv.append_content("missing", "x"));
    }

    #[test]
    fn suggestions_are_set_once() {
        let mut conv = sample();
        assert!(conv.set_suggestions("a1", vec!["next?".to_string()]));
        assert!(!conv.set_suggestions("a1", vec!["again?".to_string()]));
        assert_eq!(conv.find("a1").unwrap().suggestions.as_deref(), Some(&["next?".to_string()][..]));
    }

    #[test]
    fn suggestions_ignore_absent_and_user_ids() {
        let mut conv = sample();
        assert!(!conv.set_suggestions("gone", vec!["x".to_string()]));
        assert!(!conv.set_suggestions("u1", vec!["x".to_string()]));
    }

    #[test]
    fn truncate_cuts_both_lists() {
        let mut conv = sample();
        conv.truncate(1);
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.history().len(), 1);
        conv.truncate(0);
        assert!(conv.is_empty());
        assert!(conv.history().is_empty());
    }
}
