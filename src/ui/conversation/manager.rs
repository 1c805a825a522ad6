use crate::config::UiConfig;
use crate::events::{ChatEvent, RejectReason, SessionCommand, TuiEvent};
use crate::ui::conversation::{
    ComposerResult, ConversationComposer, ConversationHistory, SlashCommand, StreamingIndicator,
    get_help_text,
};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    widgets::Widget,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Actions that can be requested by the conversation manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationAction {
    None,
    Redraw,
    Exit,
}

/// View model of the conversation: mirrors session events into the widgets and
/// turns key presses into session commands.
pub struct ConversationManager {
    history: ConversationHistory,
    composer: ConversationComposer,
    indicator: StreamingIndicator,
    commands: mpsc::UnboundedSender<SessionCommand>,
    /// Input is locked: a prompt was sent or a reply is streaming
    awaiting_reply: bool,
    /// Between `ReplyStarted` and `ReplyFinished`
    reply_in_progress: bool,
}

impl ConversationManager {
    pub fn new(ui: &UiConfig, commands: mpsc::UnboundedSender<SessionCommand>) -> Self {
        Self {
            history: ConversationHistory::new(ui.show_timestamps),
            composer: ConversationComposer::new(ui.placeholder.clone()),
            indicator: StreamingIndicator::new(),
            commands,
            awaiting_reply: false,
            reply_in_progress: false,
        }
    }

    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Apply one session event. Every event changes what is on screen.
    pub fn apply_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::MessageCommitted(message) => self.history.add_message(message),
            ChatEvent::ReplyStarted => {
                self.reply_in_progress = true;
                self.set_awaiting(true);
                self.history.start_streaming_message();
                self.indicator.start_streaming();
            }
            ChatEvent::ChunkApplied { chunk } => {
                self.indicator.record_chunk(&chunk);
                self.history.push_streaming_chunk(&chunk);
            }
            ChatEvent::ErrorOccurred(error) => {
                debug!(%error, "Cycle error surfaced to the view");
            }
            ChatEvent::ReplyFinished => {
                self.reply_in_progress = false;
                self.set_awaiting(false);
                self.history.clear_streaming_message();
                self.indicator.stop_streaming();
            }
            ChatEvent::SubmissionRejected { reason } => {
                // No ReplyFinished follows a rejection; unlock unless a reply is streaming
                if !self.reply_in_progress {
                    self.set_awaiting(false);
                }
                let notice = match reason {
                    RejectReason::ReplyInFlight => "Still waiting for the previous reply.",
                    RejectReason::EmptyPrompt => "Nothing to send.",
                };
                self.history.set_notice(Some(notice.to_string()));
            }
        }
    }

    /// Handle a terminal event
    pub fn handle_tui_event(&mut self, event: TuiEvent) -> ConversationAction {
        match event {
            TuiEvent::Key(key) => self.handle_key(key),
            TuiEvent::Paste(text) => {
                self.composer.paste(&text);
                ConversationAction::Redraw
            }
            TuiEvent::Resize(..) => ConversationAction::Redraw,
            TuiEvent::Tick => {
                if self.awaiting_reply {
                    self.indicator.tick();
                    self.history.toggle_cursor();
                    ConversationAction::Redraw
                } else {
                    ConversationAction::None
                }
            }
        }
    }

    fn handle_key(&mut self, key: crossterm::event::KeyEvent) -> ConversationAction {
        match self.composer.handle_key(key) {
            ComposerResult::Submitted(prompt) => {
                self.history.set_notice(None);
                self.submit(prompt)
            }
            ComposerResult::Command(SlashCommand::Help) => {
                self.history.set_notice(Some(get_help_text()));
                ConversationAction::Redraw
            }
            ComposerResult::Command(SlashCommand::Quit) | ComposerResult::Quit => {
                ConversationAction::Exit
            }
            ComposerResult::None => ConversationAction::Redraw,
        }
    }

    fn submit(&mut self, prompt: String) -> ConversationAction {
        // Lock the composer now; the session confirms with ReplyStarted/ReplyFinished
        self.set_awaiting(true);
        if self.commands.send(SessionCommand::Submit { prompt }).is_err() {
            warn!("Session task is gone; cannot submit");
            self.set_awaiting(false);
            self.history
                .set_notice(Some("Chat session stopped. Restart to continue.".to_string()));
        }
        ConversationAction::Redraw
    }

    fn set_awaiting(&mut self, awaiting: bool) {
        self.awaiting_reply = awaiting;
        self.composer.set_busy(awaiting);
    }

    /// Render the conversation UI components
    pub fn render_conversation_ui(&self, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),    // History area
                Constraint::Length(1), // Thinking indicator
                Constraint::Length(3), // Composer area
            ])
            .split(area);

        self.history.clone().render(chunks[0], buf);
        self.indicator.clone().render(chunks[1], buf);
        self.composer.clone().render(chunks[2], buf);
    }
}
