//! Failure classes of a request/stream cycle.

use thiserror::Error;

/// Everything that can go wrong between submitting a prompt and committing the reply.
///
/// Only [`ChatError::MalformedFrame`] is recoverable; every other variant ends the
/// current cycle and is surfaced to the user as a single assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// The backend answered with a non-2xx status
    #[error("request rejected with status {status}: {message}")]
    RequestRejected { status: u16, message: String },

    /// The backend answered with something other than an event stream
    #[error("expected text/event-stream, got {content_type:?}")]
    InvalidFormat { content_type: Option<String> },

    /// The response carried no body to stream
    #[error("response body is empty")]
    EmptyBody,

    /// A single SSE payload could not be parsed
    #[error("malformed frame ({reason}): {payload}")]
    MalformedFrame { payload: String, reason: String },

    /// The backend sent an explicit error event
    #[error("server reported an error: {message}")]
    ServerReported { message: String },

    /// Connection failure before or during the stream
    #[error("network error: {0}")]
    Network(String),
}

impl ChatError {
    /// Whether this error ends the current request cycle.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ChatError::MalformedFrame { .. })
    }

    /// Text of the assistant message shown to the user for this error.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::RequestRejected { message, .. } => format!("Error: {}", message),
            ChatError::InvalidFormat { .. } => {
                "Error: Invalid response format from server.".to_string()
            }
            ChatError::EmptyBody => "Failed to get response: Response body is empty".to_string(),
            ChatError::MalformedFrame { payload, .. } => {
                format!("Error: Corrupted data received. ({} bytes skipped)", payload.len())
            }
            ChatError::ServerReported { message } => format!("Server Error: {}", message),
            ChatError::Network(reason) => format!("Failed to get response: {}", reason),
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_malformed_frames_are_recoverable() {
        let malformed = ChatError::MalformedFrame {
            payload: "{oops".to_string(),
            reason: "eof".to_string(),
        };
        assert!(!malformed.is_fatal());
        assert!(ChatError::EmptyBody.is_fatal());
        assert!(ChatError::Network("reset".to_string()).is_fatal());
        assert!(
            ChatError::ServerReported {
                message: "boom".to_string()
            }
            .is_fatal()
        );
    }

    #[test]
    fn user_messages_match_the_visible_formats() {
        let rejected = ChatError::RequestRejected {
            status: 503,
            message: "HTTP error! status: 503".to_string(),
        };
        assert_eq!(rejected.user_message(), "Error: HTTP error! status: 503");

        let invalid = ChatError::InvalidFormat {
            content_type: Some("text/html".to_string()),
        };
        assert_eq!(
            invalid.user_message(),
            "Error: Invalid response format from server."
        );

        let server = ChatError::ServerReported {
            message: "quota exceeded".to_string(),
        };
        assert_eq!(server.user_message(), "Server Error: quota exceeded");

        let network = ChatError::Network("connection reset".to_string());
        assert_eq!(
            network.user_message(),
            "Failed to get response: connection reset"
        );
    }
}
