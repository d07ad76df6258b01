//! Applies stream events to the conversation, one cycle at a time.

use al_base::event::ChatEvent;
use al_base::state::{Conversation, HistoryEntry, Message, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CyclePhase {
    #[default]
    Idle,
    AwaitingFirstContent,
    Streaming,
    Complete,
    Errored,
}

/// Bookkeeping for the open cycle that never lands on a Message.
#[derive(Debug, Clone, Default)]
pub struct Cycle {
    phase: CyclePhase,
    user_text: String,
    pending_sources: Option<Vec<Source>>,
    assistant_id: Option<String>,
    /// Raw text as received, for the history entry
    received: String,
}

impl Cycle {
    pub fn start(user_text: String) -> Self {
        Self { phase: CyclePhase::AwaitingFirstContent, user_text, ..Self::default() }
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn is_open(&self) -> bool {
        matches!(self.phase, CyclePhase::AwaitingFirstContent | CyclePhase::Streaming)
    }

    pub fn received(&self) -> &str {
        &self.received
    }
}

/// What applying an event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReduceOutcome {
    /// Event arrived outside an open cycle, or was a duplicate
    Ignored,
    /// The assistant message was created
    AnswerStarted,
    /// Content appended to the existing assistant message
    Appended,
    /// History updated, cycle complete
    Completed,
    /// Server error, cycle over; carries the message to show
    Errored(String),
}

pub fn apply_event(conv: &mut Conversation, cycle: &mut Cycle, event: ChatEvent) -> ReduceOutcome {
    if !cycle.is_open() {
        tracing::debug!(kind = event.kind(), "event outside an open cycle ignored");
        return ReduceOutcome::Ignored;
    }
    match event {
        ChatEvent::Error { data } => handle_error(conv, cycle, data),
        ChatEvent::Sources { data, message_id } => handle_sources(conv, cycle, data, message_id),
        ChatEvent::Message { data, message_id } => handle_message(conv, cycle, data, message_id),
        ChatEvent::MessageEnd { .. } => handle_message_end(conv, cycle),
    }
}

/// Close the cycle without a terminal event (transport failure or early end of body).
/// No history is written.
pub fn abort_cycle(conv: &mut Conversation, cycle: &mut Cycle) -> bool {
    if !cycle.is_open() {
        return false;
    }
    conv.loading = false;
    cycle.phase = CyclePhase::Errored;
    true
}

fn handle_error(conv: &mut Conversation, cycle: &mut Cycle, data: String) -> ReduceOutcome {
    conv.loading = false;
    cycle.phase = CyclePhase::Errored;
    ReduceOutcome::Errored(data)
}

fn handle_sources(conv: &mut Conversation, cycle: &mut Cycle, data: Vec<Source>, message_id: String) -> ReduceOutcome {
    if cycle.assistant_id.is_some() {
        tracing::debug!(%message_id, "duplicate sources event ignored");
        return ReduceOutcome::Ignored;
    }
    cycle.pending_sources = Some(data);
    start_answer(conv, cycle, message_id, String::new());
    ReduceOutcome::AnswerStarted
}

fn handle_message(conv: &mut Conversation, cycle: &mut Cycle, data: String, message_id: String) -> ReduceOutcome {
    cycle.received.push_str(&data);

    if cycle.assistant_id.is_none() {
        start_answer(conv, cycle, message_id, data);
        return ReduceOutcome::AnswerStarted;
    }
    if !conv.append_content(&message_id, &data) {
        tracing::debug!(%message_id, "fragment for unknown message id dropped from display");
    }
    ReduceOutcome::Appended
}

fn start_answer(conv: &mut Conversation, cycle: &mut Cycle, message_id: String, content: String) {
    let msg = Message::new_assistant(
        message_id.clone(),
        conv.chat_id().to_string(),
        content,
        cycle.pending_sources.clone(),
    );
    conv.push_message(msg);
    conv.answer_started = true;
    cycle.assistant_id = Some(message_id);
    cycle.phase = CyclePhase::Streaming;
}

fn handle_message_end(conv: &mut Conversation, cycle: &mut Cycle) -> ReduceOutcome {
    conv.push_history(HistoryEntry::human(cycle.user_text.clone()));
    conv.push_history(HistoryEntry::assistant(cycle.received.clone()));
    conv.loading = false;
    cycle.phase = CyclePhase::Complete;
    ReduceOutcome::Completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use al_base::state::{Role, Speaker};

    fn open(text: &str) -> (Conversation, Cycle) {
        let mut conv = Conversation::new("chat".to_string());
        conv.push_message(Message::new_user("u1".to_string(), "chat".to_string(), text.to_string()));
        conv.loading = true;
        (conv, Cycle::start(text.to_string()))
    }

    fn sources(id: &str) -> ChatEvent {
        ChatEvent::Sources { data: vec![Source::default()], message_id: id.to_string() }
    }

    fn fragment(id: &str, text: &str) -> ChatEvent {
        ChatEvent::Message { data: text.to_string(), message_id: id.to_string() }
    }

    fn end() -> ChatEvent {
        ChatEvent::MessageEnd { message_id: None }
    }

    #[test]
    fn message_then_end_builds_answer_and_history() {
        let (mut conv, mut cycle) = open("what is rust?");
        assert_eq!(apply_event(&mut conv, &mut cycle, fragment("a1", "A systems ")), ReduceOutcome::AnswerStarted);
        assert!(conv.answer_started);
        assert_eq!(apply_event(&mut conv, &mut cycle, fragment("a1", "language.")), ReduceOutcome::Appended);
        assert_eq!(cycle.phase(), CyclePhase::Streaming);
        assert!(conv.history().is_empty());

        assert_eq!(apply_event(&mut conv, &mut cycle, end()), ReduceOutcome::Completed);
        assert!(!conv.loading);
        assert_eq!(conv.len(), 2);
        let answer = conv.last_message().unwrap();
        assert_eq!(answer.role, Role::Assistant);
        assert_eq!(answer.message_id, "a1");
        assert_eq!(answer.content, "A systems language.");
        assert_eq!(
            conv.history(),
            &[HistoryEntry::human("what is rust?"), HistoryEntry::assistant("A systems language.")]
        );
    }

    #[test]
    fn sources_then_message_creates_one_assistant() {
        let (mut conv, mut cycle) = open("q");
        assert_eq!(apply_event(&mut conv, &mut cycle, sources("a1")), ReduceOutcome::AnswerStarted);
        let created = conv.last_message().unwrap();
        assert_eq!(created.content, "");
        assert!(created.has_sources());

        apply_event(&mut conv, &mut cycle, fragment("a1", "first"));
        apply_event(&mut conv, &mut cycle, fragment("a1", " second"));
        let assistants = conv.messages().iter().filter(|m| m.role == Role::Assistant).count();
        assert_eq!(assistants, 1);
        assert_eq!(conv.last_message().unwrap().content, "first second");
    }

    #[test]
    fn duplicate_sources_are_ignored() {
        let (mut conv, mut cycle) = open("q");
        apply_event(&mut conv, &mut cycle, sources("a1"));
        let second = ChatEvent::Sources { data: vec![Source::default(), Source::default()], message_id: "a1".to_string() };
        assert_eq!(apply_event(&mut conv, &mut cycle, second), ReduceOutcome::Ignored);
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.last_message().unwrap().sources.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn error_closes_cycle_without_history() {
        let (mut conv, mut cycle) = open("q");
        apply_event(&mut conv, &mut cycle, fragment("a1", "partial"));
        let outcome = apply_event(&mut conv, &mut cycle, ChatEvent::Error { data: "model offline".to_string() });
        assert_eq!(outcome, ReduceOutcome::Errored("model offline".to_string()));
        assert!(!conv.loading);
        assert!(conv.history().is_empty());
        assert_eq!(cycle.phase(), CyclePhase::Errored);

        // Absorbing: later events do nothing
        assert_eq!(apply_event(&mut conv, &mut cycle, end()), ReduceOutcome::Ignored);
        assert!(conv.history().is_empty());
    }

    #[test]
    fn end_without_content_leaves_only_user_message() {
        let (mut conv, mut cycle) = open("q");
        assert_eq!(apply_event(&mut conv, &mut cycle, end()), ReduceOutcome::Completed);
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.history().len(), 2);
        assert_eq!(conv.history()[1].speaker(), Speaker::Assistant);
        assert_eq!(conv.history()[1].text(), "");
        assert!(!conv.answer_started);
    }

    #[test]
    fn received_text_tracks_all_fragments() {
        let (mut conv, mut cycle) = open("q");
        apply_event(&mut conv, &mut cycle, fragment("a1", "one "));
        apply_event(&mut conv, &mut cycle, fragment("other", "two"));
        assert_eq!(cycle.received(), "one two");
        assert_eq!(conv.last_message().unwrap().content, "one ");
    }

    #[test]
    fn idle_cycle_ignores_everything() {
        let mut conv = Conversation::new("chat".to_string());
        let mut cycle = Cycle::default();
        assert_eq!(apply_event(&mut conv, &mut cycle, fragment("a1", "x")), ReduceOutcome::Ignored);
        assert!(conv.is_empty());
        assert!(!abort_cycle(&mut conv, &mut cycle));
    }

    #[test]
    fn abort_clears_loading() {
        let (mut conv, mut cycle) = open("q");
        assert!(abort_cycle(&mut conv, &mut cycle));
        assert!(!conv.loading);
        assert!(!cycle.is_open());
        assert!(conv.history().is_empty());
    }
}
