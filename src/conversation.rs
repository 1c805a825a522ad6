//! Finalized messages, the in-flight streaming reply, and observer fan-out.

use crate::error::ChatError;
use crate::events::{ChatEvent, Message, RejectReason};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Single active conversation.
///
/// Mutated only by the submission controller and the completion reconciler, both
/// running on one task, so no locking is involved. Every mutation is pushed to
/// subscribers before the method returns.
#[derive(Debug, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
    streaming_reply: String,
    awaiting_reply: bool,
    observers: Vec<mpsc::UnboundedSender<ChatEvent>>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. It receives every event emitted from now on.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ChatEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(tx);
        rx
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn streaming_reply(&self) -> &str {
        &self.streaming_reply
    }

    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    /// Accept a prompt if it is non-blank and nothing is in flight.
    ///
    /// On acceptance the user message is committed, the streaming reply is reset
    /// and `awaiting_reply` is raised. Otherwise nothing changes and the reason is returned.
    pub fn begin_submission(&mut self, prompt: &str) -> Result<(), RejectReason> {
        let reason = if self.awaiting_reply {
            Some(RejectReason::ReplyInFlight)
        } else if prompt.trim().is_empty() {
            Some(RejectReason::EmptyPrompt)
        } else {
            None
        };

        if let Some(reason) = reason {
            self.reject(reason);
            return Err(reason);
        }

        self.commit(Message::user(prompt));
        self.awaiting_reply = true;
        self.streaming_reply.clear();
        self.emit(ChatEvent::ReplyStarted);
        Ok(())
    }

    /// Notify observers that a submission was ignored. State is left untouched.
    pub fn reject(&mut self, reason: RejectReason) {
        debug!(?reason, "Submission rejected");
        self.emit(ChatEvent::SubmissionRejected { reason });
    }

    /// Append a content chunk to the streaming reply.
    pub fn apply_chunk(&mut self, chunk: &str) {
        if !self.awaiting_reply {
            debug!("Dropping chunk received outside of a request cycle");
            return;
        }
        self.streaming_reply.push_str(chunk);
        self.emit(ChatEvent::ChunkApplied {
            chunk: chunk.to_string(),
        });
    }

    /// Record a terminal error as a single assistant message.
    pub fn report_error(&mut self, error: ChatError) {
        info!(%error, "Request cycle failed");
        let message = Message::assistant(error.user_message());
        self.emit(ChatEvent::ErrorOccurred(error));
        self.commit(message);
    }

    /// Commit the accumulated reply (unless blank) and return to idle.
    ///
    /// Safe to call on every exit path, including after [`Self::report_error`].
    pub fn finish_reply(&mut self) {
        let reply = std::mem::take(&mut self.streaming_reply);
        if reply.trim().is_empty() {
            debug!("Discarding empty reply");
        } else {
            self.commit(Message::assistant(reply));
        }

        if self.awaiting_reply {
            self.awaiting_reply = false;
            self.emit(ChatEvent::ReplyFinished);
        }
    }

    fn commit(&mut self, message: Message) {
        self.messages.push(message.clone());
        self.emit(ChatEvent::MessageCommitted(message));
    }

    fn emit(&mut self, event: ChatEvent) {
        self.observers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Role;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ChatEvent>) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn accepted_submission_appends_user_message_and_awaits() {
        let mut state = ConversationState::new();
        let mut rx = state.subscribe();

        assert!(state.begin_submission("hi").is_ok());
        assert!(state.is_awaiting_reply());
        assert_eq!(state.messages(), &[Message::user("hi")]);
        assert_eq!(
            drain(&mut rx),
            vec![
                ChatEvent::MessageCommitted(Message::user("hi")),
                ChatEvent::ReplyStarted
            ]
        );
    }

    #[test]
    fn blank_and_concurrent_submissions_are_no_ops() {
        let mut state = ConversationState::new();
        assert_eq!(state.begin_submission("   \n"), Err(RejectReason::EmptyPrompt));
        assert!(state.messages().is_empty());
        assert!(!state.is_awaiting_reply());

        state.begin_submission("first").unwrap();
        assert_eq!(state.begin_submission("second"), Err(RejectReason::ReplyInFlight));
        assert_eq!(state.messages().len(), 1);
    }

    #[test]
    fn finish_commits_concatenated_chunks() {
        let mut state = ConversationState::new();
        state.begin_submission("hi").unwrap();
        state.apply_chunk("He");
        assert_eq!(state.streaming_reply(), "He");
        state.apply_chunk("llo!");
        state.finish_reply();

        assert!(!state.is_awaiting_reply());
        assert!(state.streaming_reply().is_empty());
        assert_eq!(
            state.messages(),
            &[Message::user("hi"), Message::assistant("Hello!")]
        );
    }

    #[test]
    fn empty_reply_is_discarded() {
        let mut state = ConversationState::new();
        state.begin_submission("hi").unwrap();
        state.apply_chunk("  ");
        state.finish_reply();
        assert_eq!(state.messages(), &[Message::user("hi")]);
        assert!(!state.is_awaiting_reply());
    }

    #[test]
    fn error_becomes_assistant_message() {
        let mut state = ConversationState::new();
        let mut rx = state.subscribe();
        state.begin_submission("hi").unwrap();
        state.report_error(ChatError::ServerReported {
            message: "boom".to_string(),
        });
        state.finish_reply();

        let last = state.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, "Server Error: boom");
        assert_eq!(drain(&mut rx).last(), Some(&ChatEvent::ReplyFinished));
    }

    #[test]
    fn chunks_outside_a_cycle_are_ignored() {
        let mut state = ConversationState::new();
        state.apply_chunk("stray");
        assert!(state.streaming_reply().is_empty());
    }

    #[test]
    fn closed_observers_are_pruned() {
        let mut state = ConversationState::new();
        let rx = state.subscribe();
        let mut live = state.subscribe();
        drop(rx);

        state.begin_submission("hi").unwrap();
        assert_eq!(state.observers.len(), 1);
        assert_eq!(drain(&mut live).len(), 2);
    }
}
