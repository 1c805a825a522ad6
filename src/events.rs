use crate::error::ChatError;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// Author of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Assistant => "Assistant",
        }
    }
}

/// A finalized conversation message. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip, default = "chrono::Utc::now")]
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

// Timestamps are display metadata; two messages are equal when author and text match.
impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.role == other.role && self.content == other.content
    }
}

impl Eq for Message {}

/// Why a submission was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Prompt was empty after trimming
    EmptyPrompt,
    /// Another reply is still streaming
    ReplyInFlight,
}

/// State changes pushed to conversation observers
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A message was appended to the finalized list
    MessageCommitted(Message),

    /// A request cycle began; the streaming reply is empty
    ReplyStarted,

    /// A content chunk was appended to the streaming reply
    ChunkApplied { chunk: String },

    /// A terminal (or diagnostic) error was classified
    ErrorOccurred(ChatError),

    /// The cycle ended; nothing is awaited anymore
    ReplyFinished,

    /// A submission was ignored
    SubmissionRejected { reason: RejectReason },
}

/// Commands sent from the UI to the background session task
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Submit { prompt: String },
}

/// Terminal events fed into the UI loop
#[derive(Debug, Clone)]
pub enum TuiEvent {
    /// Key press event
    Key(crossterm::event::KeyEvent),

    /// Bracketed paste
    Paste(String),

    /// Terminal resize
    Resize(u16, u16),

    /// Periodic redraw for animations
    Tick,
}
