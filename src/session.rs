//! Submission controller: one request/stream cycle per accepted prompt.

use crate::conversation::ConversationState;
use crate::error::ChatError;
use crate::events::{ChatEvent, RejectReason, SessionCommand};
use crate::sse::{ServerEvent, SseParser};
use crate::transport::ChatClient;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How a request cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Prompt was not accepted; nothing was sent
    Rejected(RejectReason),
    /// Backend signalled the end of the reply
    Terminated,
    /// Network stream ended without a termination signal
    EndOfStream,
    /// Request or stream failed; an error message was committed
    Failed(ChatError),
}

/// Owns the conversation and drives request cycles against the backend
pub struct ChatSession {
    client: ChatClient,
    state: ConversationState,
    parser: SseParser,
    /// Commands from the UI when running under [`spawn`]
    commands: Option<mpsc::UnboundedReceiver<SessionCommand>>,
}

impl ChatSession {
    pub fn new(client: ChatClient) -> Self {
        Self {
            client,
            state: ConversationState::new(),
            parser: SseParser::new(),
            commands: None,
        }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ChatEvent> {
        self.state.subscribe()
    }

    /// Submit a prompt and run the whole cycle to completion.
    ///
    /// Whatever happens, the conversation is idle with an empty streaming reply
    /// when this returns.
    pub async fn submit(&mut self, prompt: &str) -> CycleOutcome {
        if let Err(reason) = self.begin(prompt) {
            return CycleOutcome::Rejected(reason);
        }

        let result = match self.client.send_request(prompt).await {
            Ok(stream) => self.read_reply(stream).await,
            Err(error) => Err(error),
        };
        self.conclude(result)
    }

    fn begin(&mut self, prompt: &str) -> Result<(), RejectReason> {
        self.state.begin_submission(prompt)?;
        self.parser.reset();
        Ok(())
    }

    /// Completion reconciler: commit the failure (if any) and the accumulated reply.
    fn conclude(&mut self, result: Result<CycleOutcome, ChatError>) -> CycleOutcome {
        // Still awaiting: anything queued now was sent mid-cycle
        self.reject_queued();

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(error) => {
                self.state.report_error(error.clone());
                CycleOutcome::Failed(error)
            }
        };

        self.state.finish_reply();
        info!(?outcome, "Request cycle finished");
        outcome
    }

    /// Feed a byte stream through the frame parser until it ends or a stopping
    /// event is classified.
    async fn read_reply<S, B>(&mut self, mut stream: S) -> Result<CycleOutcome, ChatError>
    where
        S: Stream<Item = Result<B, ChatError>> + Unpin,
        B: AsRef<[u8]>,
    {
        loop {
            let chunk = tokio::select! {
                chunk = stream.next() => chunk,
                Some(command) = recv_command(&mut self.commands) => {
                    reject_mid_cycle(&mut self.state, command);
                    continue;
                }
            };
            let Some(chunk) = chunk else {
                break;
            };
            let chunk = chunk?;
            let events = self.parser.feed(chunk.as_ref());
            if let Some(outcome) = self.apply_events(events) {
                // Conclusive signal: stop receiving bytes
                drop(stream);
                return Ok(outcome);
            }
        }

        debug!("Stream reached end of data");
        let events = self.parser.finish();
        Ok(self.apply_events(events).unwrap_or(CycleOutcome::EndOfStream))
    }

    /// Apply events in arrival order. Returns `Some` as soon as one of them ends the cycle.
    fn apply_events(&mut self, events: Vec<ServerEvent>) -> Option<CycleOutcome> {
        for event in events {
            let stops = event.stops_stream();
            let failure = match event {
                ServerEvent::ContentChunk(text) => {
                    self.state.apply_chunk(&text);
                    None
                }
                ServerEvent::Termination(kind) => {
                    debug!(?kind, "Termination signal");
                    None
                }
                ServerEvent::ServerError(message) => Some(ChatError::ServerReported { message }),
                ServerEvent::MalformedFrame { payload, reason } => {
                    Some(ChatError::MalformedFrame { payload, reason })
                }
            };

            if let Some(error) = failure {
                if error.is_fatal() {
                    warn!(%error, "Server reported an error");
                    self.state.report_error(error.clone());
                    return Some(CycleOutcome::Failed(error));
                }
                debug!(%error, "Skipping malformed frame");
            }

            if stops {
                return Some(CycleOutcome::Terminated);
            }
        }
        None
    }

    /// Reject every command already waiting in the queue.
    fn reject_queued(&mut self) {
        let Some(rx) = self.commands.as_mut() else {
            return;
        };
        while let Ok(command) = rx.try_recv() {
            reject_mid_cycle(&mut self.state, command);
        }
    }
}

/// Next UI command. Never resolves for a session that is driven directly.
async fn recv_command(
    commands: &mut Option<mpsc::UnboundedReceiver<SessionCommand>>,
) -> Option<SessionCommand> {
    match commands {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn reject_mid_cycle(state: &mut ConversationState, command: SessionCommand) {
    let SessionCommand::Submit { prompt } = command;
    debug!(prompt_chars = prompt.chars().count(), "Rejecting prompt sent mid-reply");
    state.reject(RejectReason::ReplyInFlight);
}

/// Handle to a session running on its own task
pub struct SessionHandle {
    pub commands: mpsc::UnboundedSender<SessionCommand>,
    pub events: mpsc::UnboundedReceiver<ChatEvent>,
    pub task: JoinHandle<()>,
}

/// Run `session` on a background task that processes submit commands one at a time.
///
/// Submissions that arrive while a reply is in flight are rejected, not queued.
pub fn spawn(mut session: ChatSession) -> SessionHandle {
    let events = session.subscribe();
    let (commands, rx) = mpsc::unbounded_channel();
    session.commands = Some(rx);

    let task = tokio::spawn(async move {
        // Commands sent during a cycle are rejected inside it, before ReplyFinished
        while let Some(SessionCommand::Submit { prompt }) =
            recv_command(&mut session.commands).await
        {
            session.submit(&prompt).await;
        }
        debug!("Session command channel closed");
    });

    SessionHandle {
        commands,
        events,
        task,
    }
}
