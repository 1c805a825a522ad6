use crate::ui::conversation::commands::{SlashCommand, parse_slash_command};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Result returned when the user interacts with the conversation composer
#[derive(Debug, PartialEq)]
pub enum ComposerResult {
    Submitted(String),
    Command(SlashCommand),
    Quit,
    None,
}

/// State for the text field within the composer
#[derive(Debug, Clone, Default)]
pub struct TextAreaState {
    pub content: String,
    /// Cursor position in characters, not bytes
    pub cursor_position: usize,
}

impl TextAreaState {
    fn byte_offset(&self, char_index: usize) -> usize {
        self.content
            .char_indices()
            .nth(char_index)
            .map(|(offset, _)| offset)
            .unwrap_or(self.content.len())
    }

    fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Single-line prompt input
#[derive(Clone)]
pub struct ConversationComposer {
    state: TextAreaState,
    placeholder: String,
    busy: bool,
}

impl ConversationComposer {
    pub fn new(placeholder: String) -> Self {
        Self {
            state: TextAreaState::default(),
            placeholder,
            busy: false,
        }
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ComposerResult {
        if key.kind != KeyEventKind::Press {
            return ComposerResult::None;
        }

        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return ComposerResult::Quit;
            }
            KeyCode::Esc => return ComposerResult::Quit,
            KeyCode::Enter => return self.submit(),
            KeyCode::Char(c) => self.insert_char(c),
            KeyCode::Backspace => {
                self.backspace();
            }
            KeyCode::Delete => {
                self.delete();
            }
            KeyCode::Left => {
                self.state.cursor_position = self.state.cursor_position.saturating_sub(1);
            }
            KeyCode::Right => {
                if self.state.cursor_position < self.state.char_len() {
                    self.state.cursor_position += 1;
                }
            }
            KeyCode::Home => {
                self.state.cursor_position = 0;
            }
            KeyCode::End => {
                self.state.cursor_position = self.state.char_len();
            }
            _ => {}
        }

        ComposerResult::None
    }

    /// Insert pasted text at the cursor; line breaks become spaces.
    pub fn paste(&mut self, text: &str) {
        for c in text.chars() {
            self.insert_char(if c == '\n' || c == '\r' { ' ' } else { c });
        }
    }

    /// Take the draft unless a reply is pending or it is blank.
    fn submit(&mut self) -> ComposerResult {
        if self.busy || self.state.content.trim().is_empty() {
            return ComposerResult::None;
        }

        let content = std::mem::take(&mut self.state.content);
        self.state.cursor_position = 0;
        match parse_slash_command(&content) {
            Some(command) => ComposerResult::Command(command),
            None => ComposerResult::Submitted(content),
        }
    }

    /// Insert a character at the cursor position
    fn insert_char(&mut self, c: char) {
        let offset = self.state.byte_offset(self.state.cursor_position);
        self.state.content.insert(offset, c);
        self.state.cursor_position += 1;
    }

    /// Delete character before cursor
    fn backspace(&mut self) -> bool {
        if self.state.cursor_position == 0 {
            return false;
        }
        self.state.cursor_position -= 1;
        let offset = self.state.byte_offset(self.state.cursor_position);
        self.state.content.remove(offset);
        true
    }

    /// Delete character at cursor
    fn delete(&mut self) -> bool {
        if self.state.cursor_position >= self.state.char_len() {
            return false;
        }
        let offset = self.state.byte_offset(self.state.cursor_position);
        self.state.content.remove(offset);
        true
    }

    /// Disable submission while a reply is pending
    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    pub fn content(&self) -> &str {
        &self.state.content
    }
}

impl Widget for ConversationComposer {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let (title, style) = if self.busy {
            (" Thinking... ", Style::default().fg(Color::Yellow))
        } else {
            (" Send ⏎ ", Style::default().fg(Color::Green))
        };
        let block = Block::default().borders(Borders::ALL).title(title).style(style);

        let inner_area = block.inner(area);
        block.render(area, buf);

        if self.state.content.is_empty() {
            let placeholder_line = Line::from(vec![Span::styled(
                self.placeholder.as_str(),
                Style::default().fg(Color::DarkGray),
            )]);
            buf.set_line(inner_area.x, inner_area.y, &placeholder_line, inner_area.width);
            return;
        }

        // Keep the cursor visible when the draft is wider than the field
        let mut content = self.state.content.clone();
        content.insert(self.state.byte_offset(self.state.cursor_position), '▌');
        let width = inner_area.width as usize;
        let skip = (self.state.cursor_position + 1).saturating_sub(width);
        let visible: String = content.chars().skip(skip).collect();

        let line = Line::from(vec![Span::styled(visible, Style::default().fg(Color::White))]);
        buf.set_line(inner_area.x, inner_area.y, &line, inner_area.width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(composer: &mut ConversationComposer, text: &str) {
        for c in text.chars() {
            composer.handle_key(key(KeyCode::Char(c)));
        }
    }

    #[test]
    fn enter_submits_and_clears() {
        let mut composer = ConversationComposer::new("Ask".to_string());
        type_text(&mut composer, "hi");
        assert_eq!(
            composer.handle_key(key(KeyCode::Enter)),
            ComposerResult::Submitted("hi".to_string())
        );
        assert_eq!(composer.content(), "");
    }

    #[test]
    fn busy_composer_keeps_the_draft() {
        let mut composer = ConversationComposer::new("Ask".to_string());
        type_text(&mut composer, "next question");
        composer.set_busy(true);
        assert_eq!(composer.handle_key(key(KeyCode::Enter)), ComposerResult::None);
        assert_eq!(composer.content(), "next question");
    }

    #[test]
    fn blank_draft_is_not_submitted() {
        let mut composer = ConversationComposer::new("Ask".to_string());
        type_text(&mut composer, "   ");
        assert_eq!(composer.handle_key(key(KeyCode::Enter)), ComposerResult::None);
    }

    #[test]
    fn editing_handles_multibyte_characters() {
        let mut composer = ConversationComposer::new("Ask".to_string());
        type_text(&mut composer, "héllo");
        composer.handle_key(key(KeyCode::Left));
        composer.handle_key(key(KeyCode::Backspace));
        composer.handle_key(key(KeyCode::Home));
        composer.handle_key(key(KeyCode::Delete));
        assert_eq!(composer.content(), "élo");
    }

    #[test]
    fn slash_commands_and_quit_keys() {
        let mut composer = ConversationComposer::new("Ask".to_string());
        type_text(&mut composer, "/help");
        assert_eq!(
            composer.handle_key(key(KeyCode::Enter)),
            ComposerResult::Command(SlashCommand::Help)
        );
        assert_eq!(composer.handle_key(key(KeyCode::Esc)), ComposerResult::Quit);
        assert_eq!(
            composer.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            ComposerResult::Quit
        );
    }

    #[test]
    fn paste_flattens_newlines() {
        let mut composer = ConversationComposer::new("Ask".to_string());
        composer.paste("one\ntwo");
        assert_eq!(composer.content(), "one two");
    }
}
