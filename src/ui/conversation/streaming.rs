use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::Widget,
};

/// One-line "thinking" indicator shown while a reply is awaited
#[derive(Clone, Default)]
pub struct StreamingIndicator {
    is_streaming: bool,
    frame: usize,
    received_chars: usize,
}

impl StreamingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start streaming a new response
    pub fn start_streaming(&mut self) {
        self.is_streaming = true;
        self.frame = 0;
        self.received_chars = 0;
    }

    /// Count a received chunk
    pub fn record_chunk(&mut self, chunk: &str) {
        self.received_chars += chunk.chars().count();
    }

    pub fn stop_streaming(&mut self) {
        self.is_streaming = false;
    }

    /// Advance the dot animation
    pub fn tick(&mut self) {
        self.frame = self.frame.wrapping_add(1);
    }
}

impl Widget for StreamingIndicator {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if !self.is_streaming || area.height == 0 {
            return;
        }

        let dots = match self.frame % 4 {
            0 => ".",
            1 => "..",
            2 => "...",
            _ => "   ",
        };

        let status = if self.received_chars == 0 {
            "Assistant is thinking".to_string()
        } else {
            format!("Assistant is typing ({} chars)", self.received_chars)
        };

        let indicator = Line::from(vec![
            Span::styled("🤖 ", Style::default().fg(Color::Green)),
            Span::styled(status, Style::default().fg(Color::Green)),
            Span::styled(dots, Style::default().fg(Color::Yellow)),
        ]);
        buf.set_line(area.x, area.y, &indicator, area.width);
    }
}
