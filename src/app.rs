//! Interactive terminal chat.

use crate::config::Config;
use crate::events::ChatEvent;
use crate::logging::{self, LogTarget};
use crate::session::{self, ChatSession, SessionHandle};
use crate::transport::ChatClient;
use crate::tui::{self, EventHandler, Tui};
use crate::ui::conversation::{ConversationAction, ConversationManager};
use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Run the chat UI until the user quits.
pub async fn run(config: Config) -> Result<()> {
    logging::init(&config.log, LogTarget::File)?;

    let client = ChatClient::new(&config)?;
    info!(backend = %client.endpoint(), "Starting interactive chat");
    let SessionHandle {
        commands,
        mut events,
        task,
    } = session::spawn(ChatSession::new(client));

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut manager = ConversationManager::new(&config.ui, commands);

    let result = event_loop(&mut terminal, &mut manager, &mut events).await;

    tui::restore()?;
    drop(manager);
    task.abort();

    if let Err(ref e) = result {
        error!(error = %e, "Chat UI exited with an error");
    }
    info!("Interactive chat closed");
    result
}

async fn event_loop(
    terminal: &mut Tui,
    manager: &mut ConversationManager,
    events: &mut mpsc::UnboundedReceiver<ChatEvent>,
) -> Result<()> {
    let mut input = EventHandler::new();
    draw(terminal, manager)?;

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                manager.apply_event(event);
                draw(terminal, manager)?;
            }
            tui_event = input.next() => {
                let Some(tui_event) = tui_event else {
                    break;
                };
                match manager.handle_tui_event(tui_event) {
                    ConversationAction::Exit => break,
                    ConversationAction::Redraw => draw(terminal, manager)?,
                    ConversationAction::None => {}
                }
            }
        }
    }

    Ok(())
}

fn draw(terminal: &mut Tui, manager: &ConversationManager) -> Result<()> {
    terminal.draw(|frame| {
        let area = frame.size();
        manager.render_conversation_ui(area, frame.buffer_mut());
    })?;
    Ok(())
}
