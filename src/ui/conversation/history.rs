//! Conversation history display component

use crate::events::{Message, Role};
use crate::ui::conversation::markdown::render_markdown;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Conversation history display component.
///
/// Shows finalized messages followed by the reply that is still streaming, and
/// always follows the newest line.
#[derive(Clone)]
pub struct ConversationHistory {
    messages: Vec<Message>,
    streaming_message: Option<String>,
    notice: Option<String>,
    show_timestamps: bool,
    /// Toggles the typing cursor on each tick
    cursor_visible: bool,
}

impl ConversationHistory {
    pub fn new(show_timestamps: bool) -> Self {
        Self {
            messages: Vec::new(),
            streaming_message: None,
            notice: None,
            show_timestamps,
            cursor_visible: true,
        }
    }

    /// Add a finalized message
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Start showing an (initially empty) streaming reply
    pub fn start_streaming_message(&mut self) {
        self.streaming_message = Some(String::new());
    }

    /// Append a chunk to the streaming reply
    pub fn push_streaming_chunk(&mut self, chunk: &str) {
        self.streaming_message
            .get_or_insert_with(String::new)
            .push_str(chunk);
    }

    pub fn streaming_message(&self) -> Option<&str> {
        self.streaming_message.as_deref()
    }

    /// Clear the streaming message
    pub fn clear_streaming_message(&mut self) {
        self.streaming_message = None;
    }

    /// Show a local, non-conversation line at the bottom (help, warnings)
    pub fn set_notice(&mut self, notice: Option<String>) {
        self.notice = notice;
    }

    pub fn toggle_cursor(&mut self) {
        self.cursor_visible = !self.cursor_visible;
    }
}

impl Widget for ConversationHistory {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(" 💬 Conversation ");

        let inner_area = block.inner(area);
        block.render(area, buf);

        let mut all_lines: Vec<Line> = Vec::new();

        if self.messages.is_empty() && self.streaming_message.is_none() {
            all_lines.push(Line::from(vec![Span::styled(
                "Start by typing a question below.",
                Style::default().fg(Color::Gray),
            )]));
            all_lines.push(Line::from(vec![Span::styled(
                "Press Enter to send, /help for commands.",
                Style::default().fg(Color::DarkGray),
            )]));
        }

        for message in &self.messages {
            all_lines.extend(self.render_message(message, inner_area.width));
            // spacing between messages
            all_lines.push(Line::from(""));
        }

        // Nothing to show until the first chunk; the indicator line covers the wait
        let streaming = self.streaming_message.as_deref().filter(|text| !text.is_empty());
        if let Some(streaming_text) = streaming {
            all_lines.extend(self.render_streaming_message(streaming_text, inner_area.width));
        }

        if let Some(ref notice) = self.notice {
            for text in wrap_text(notice, inner_area.width as usize) {
                all_lines.push(Line::from(vec![Span::styled(
                    text,
                    Style::default().fg(Color::Yellow),
                )]));
            }
        }

        // Determine the range of lines to display from the bottom
        let height = inner_area.height as usize;
        let start = all_lines.len().saturating_sub(height);

        for (i, line) in all_lines[start..].iter().enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
        }
    }
}

impl ConversationHistory {
    fn header(&self, role: Role, timestamp: chrono::DateTime<chrono::Utc>) -> Line<'static> {
        let mut spans = vec![Span::styled(
            role.display_name(),
            role_style(role).add_modifier(Modifier::BOLD),
        )];
        if self.show_timestamps {
            let local = timestamp.with_timezone(&chrono::Local);
            spans.push(Span::styled(
                format!(" {}", local.format("%H:%M:%S")),
                Style::default().fg(Color::DarkGray),
            ));
        }
        Line::from(spans)
    }

    /// Render a single message into lines. Assistant replies are Markdown.
    fn render_message(&self, message: &Message, width: u16) -> Vec<Line<'static>> {
        let mut lines = vec![self.header(message.role, message.timestamp)];
        let content_width = width.saturating_sub(2) as usize;

        match message.role {
            Role::Assistant => {
                let style = role_style(Role::Assistant);
                for line in render_markdown(&message.content, content_width, style) {
                    let mut spans = vec![Span::raw("  ")];
                    spans.extend(line.spans);
                    lines.push(Line::from(spans));
                }
            }
            Role::User => {
                for content_line in wrap_text(&message.content, content_width) {
                    lines.push(Line::from(vec![
                        Span::raw("  "),
                        Span::styled(content_line, role_style(Role::User)),
                    ]));
                }
            }
        }

        lines
    }

    /// Render a streaming message with typing indicator
    fn render_streaming_message(&self, text: &str, width: u16) -> Vec<Line<'static>> {
        let mut lines = vec![self.header(Role::Assistant, chrono::Utc::now())];

        let cursor = if self.cursor_visible { "▋" } else { " " };
        let content_lines = wrap_text(text, width.saturating_sub(3) as usize);
        let last = content_lines.len().saturating_sub(1);
        for (i, content_line) in content_lines.into_iter().enumerate() {
            let mut spans = vec![
                Span::raw("  "),
                Span::styled(content_line, role_style(Role::Assistant)),
            ];
            if i == last {
                spans.push(Span::styled(cursor, Style::default().fg(Color::Yellow)));
            }
            lines.push(Line::from(spans));
        }

        lines
    }
}

/// Get content style based on role
fn role_style(role: Role) -> Style {
    match role {
        Role::User => Style::default().fg(Color::Blue),
        Role::Assistant => Style::default().fg(Color::Green),
    }
}

/// Wrap text to fit within the given width, keeping explicit line breaks,
/// leading indentation and runs of spaces.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let text = text.replace('\t', "    ");
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let body = paragraph.trim_start_matches(' ');
        let indent = &paragraph[..paragraph.len() - body.len()];
        // Continuation lines keep the indent unless it would eat most of the width
        let hang = if indent.len() * 2 < width { indent } else { "" };

        let mut current = indent.to_string();
        let mut start_width = indent.len();
        let mut current_width = start_width;

        for token in body.split_inclusive(' ') {
            let visible = token.trim_end_matches(' ').chars().count();
            if current_width > start_width && current_width + visible > width {
                lines.push(current.trim_end().to_string());
                current = hang.to_string();
                start_width = hang.len();
                current_width = start_width;
            }
            let token = if current_width == start_width {
                token.trim_start_matches(' ')
            } else {
                token
            };
            current.push_str(token);
            current_width += token.chars().count();
        }

        lines.push(current.trim_end().to_string());
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_on_word_boundaries() {
        assert_eq!(
            wrap_text("the quick brown fox", 10),
            vec!["the quick", "brown fox"]
        );
    }

    #[test]
    fn keeps_paragraph_breaks() {
        assert_eq!(wrap_text("one\n\ntwo", 20), vec!["one", "", "two"]);
    }

    #[test]
    fn long_words_get_their_own_line() {
        assert_eq!(
            wrap_text("a supercalifragilistic b", 5),
            vec!["a", "supercalifragilistic", "b"]
        );
    }

    #[test]
    fn streaming_chunks_accumulate_until_cleared() {
        let mut history = ConversationHistory::new(false);
        history.start_streaming_message();
        history.push_streaming_chunk("He");
        history.push_streaming_chunk("llo");
        assert_eq!(history.streaming_message(), Some("Hello"));
        history.clear_streaming_message();
        assert_eq!(history.streaming_message(), None);
    }

    #[test]
    fn renders_newest_lines_at_the_bottom() {
        let mut history = ConversationHistory::new(false);
        for i in 0..10 {
            history.add_message(Message::user(format!("message {}", i)));
        }
        let area = Rect::new(0, 0, 30, 5);
        let mut buf = Buffer::empty(area);
        history.render(area, &mut buf);

        let row: String = (0..area.width)
            .map(|x| buf.get(x, 2).symbol().to_string())
            .collect();
        assert!(row.contains("message 9"), "row was {:?}", row);
    }

    #[test]
    fn keeps_indentation_and_inner_spacing() {
        assert_eq!(wrap_text("    indented  code", 40), vec!["    indented  code"]);
        assert_eq!(
            wrap_text("  - item with words", 12),
            vec!["  - item", "  with words"]
        );
    }

    fn row_text(buf: &Buffer, y: u16) -> String {
        (0..buf.area.width)
            .map(|x| buf.get(x, y).symbol().to_string())
            .collect()
    }

    #[test]
    fn empty_streaming_reply_is_not_shown() {
        let mut history = ConversationHistory::new(false);
        history.add_message(Message::user("hi"));
        history.start_streaming_message();

        let area = Rect::new(0, 0, 30, 6);
        let mut buf = Buffer::empty(area);
        history.clone().render(area, &mut buf);
        assert!((0..area.height).all(|y| !row_text(&buf, y).contains("Assistant")));

        history.push_streaming_chunk("He");
        let mut buf = Buffer::empty(area);
        history.render(area, &mut buf);
        assert!((0..area.height).any(|y| row_text(&buf, y).contains("Assistant")));
    }

    #[test]
    fn assistant_replies_render_markdown() {
        let mut history = ConversationHistory::new(false);
        history.add_message(Message::assistant("**Bold** claim"));

        let area = Rect::new(0, 0, 30, 5);
        let mut buf = Buffer::empty(area);
        history.render(area, &mut buf);

        let row = (0..area.height)
            .map(|y| row_text(&buf, y))
            .find(|row| row.contains("Bold claim"))
            .expect("reply should be rendered without asterisks");
        assert!(!row.contains("**"));
    }
}
