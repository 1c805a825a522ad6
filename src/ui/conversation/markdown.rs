//! Markdown rendering of finalized assistant messages into styled, wrapped lines.

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag};
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};

const BULLET: &str = "• ";
const QUOTE_BAR: &str = "│ ";
const CODE_INDENT: &str = "  ";

/// Render `text` as Markdown, wrapped to `width` columns.
///
/// Code blocks keep their indentation and are never re-wrapped.
pub fn render_markdown(text: &str, width: usize, base: Style) -> Vec<Line<'static>> {
    let mut renderer = MarkdownRenderer::new(width, base);
    for event in Parser::new_ext(text, Options::ENABLE_STRIKETHROUGH) {
        renderer.handle(event);
    }
    renderer.finish()
}

struct MarkdownRenderer {
    width: usize,
    base: Style,
    lines: Vec<Line<'static>>,
    /// Inline spans of the block being built
    spans: Vec<Span<'static>>,
    styles: Vec<Style>,
    /// Next number of each open list; `None` for bullet lists
    lists: Vec<Option<u64>>,
    item_marker: Option<String>,
    quote_depth: usize,
    code_block: Option<String>,
}

impl MarkdownRenderer {
    fn new(width: usize, base: Style) -> Self {
        Self {
            width,
            base,
            lines: Vec::new(),
            spans: Vec::new(),
            styles: Vec::new(),
            lists: Vec::new(),
            item_marker: None,
            quote_depth: 0,
            code_block: None,
        }
    }

    fn style(&self) -> Style {
        self.styles.last().copied().unwrap_or(self.base)
    }

    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => match self.code_block.as_mut() {
                Some(code) => code.push_str(&text),
                None => self.push_text(&text),
            },
            Event::Code(code) => {
                let style = self.style().fg(Color::Yellow);
                self.spans.push(Span::styled(code.into_string(), style));
            }
            Event::SoftBreak => self.push_text(" "),
            Event::HardBreak => self.flush(),
            Event::Rule => {
                self.block_gap();
                let rule = "─".repeat(self.width.clamp(1, 40));
                self.lines.push(Line::from(Span::styled(
                    rule,
                    Style::default().fg(Color::DarkGray),
                )));
            }
            Event::TaskListMarker(done) => self.push_text(if done { "[x] " } else { "[ ] " }),
            Event::Html(html) => self.push_text(html.trim_end()),
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {
                if self.item_marker.is_none() {
                    self.block_gap();
                }
            }
            Tag::Heading(level, ..) => {
                self.block_gap();
                let mut style = self.style().add_modifier(Modifier::BOLD);
                if level == HeadingLevel::H1 {
                    style = style.add_modifier(Modifier::UNDERLINED);
                }
                self.styles.push(style);
            }
            Tag::BlockQuote => {
                self.block_gap();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(_) => {
                self.block_gap();
                self.code_block = Some(String::new());
            }
            Tag::List(start) => {
                if self.lists.is_empty() {
                    self.block_gap();
                } else {
                    self.flush();
                }
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush();
                let marker = match self.lists.last_mut() {
                    Some(Some(number)) => {
                        let marker = format!("{}. ", number);
                        *number += 1;
                        marker
                    }
                    _ => BULLET.to_string(),
                };
                self.item_marker = Some(marker);
            }
            Tag::Emphasis => self.styles.push(self.style().add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.styles.push(self.style().add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => self
                .styles
                .push(self.style().add_modifier(Modifier::CROSSED_OUT)),
            Tag::Link(..) => self.styles.push(
                self.style()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::UNDERLINED),
            ),
            _ => {}
        }
    }

    fn end(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph | Tag::Item => self.flush(),
            Tag::Heading(..) => {
                self.flush();
                self.styles.pop();
            }
            Tag::BlockQuote => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            Tag::CodeBlock(_) => {
                if let Some(code) = self.code_block.take() {
                    self.push_code(&code);
                }
            }
            Tag::List(_) => {
                self.flush();
                self.lists.pop();
            }
            Tag::Emphasis | Tag::Strong | Tag::Strikethrough | Tag::Link(..) => {
                self.styles.pop();
            }
            _ => {}
        }
    }

    fn push_text(&mut self, text: &str) {
        self.spans.push(Span::styled(text.to_string(), self.style()));
    }

    fn push_code(&mut self, code: &str) {
        let prefix = format!("{}{}", QUOTE_BAR.repeat(self.quote_depth), CODE_INDENT);
        for line in code.trim_end_matches('\n').split('\n') {
            self.lines.push(Line::from(vec![
                Span::raw(prefix.clone()),
                Span::styled(line.replace('\t', "    "), Style::default().fg(Color::Yellow)),
            ]));
        }
    }

    /// Separate blocks with one blank line.
    fn block_gap(&mut self) {
        self.flush();
        if self.lines.last().is_some_and(|line| line.width() > 0) {
            self.lines.push(Line::default());
        }
    }

    /// Wrap the pending inline spans into lines under the current quote and list prefixes.
    fn flush(&mut self) {
        if self.spans.is_empty() && self.item_marker.is_none() {
            return;
        }

        let quote = QUOTE_BAR.repeat(self.quote_depth);
        let nesting = "  ".repeat(self.lists.len().saturating_sub(1));
        let hang = if self.lists.is_empty() { "" } else { "  " };
        let marker = self.item_marker.take();

        let first = format!("{}{}{}", quote, nesting, marker.as_deref().unwrap_or(hang));
        let rest_width = marker.as_ref().map_or(hang.len(), |m| m.chars().count());
        let rest = format!("{}{}{}", quote, nesting, " ".repeat(rest_width));

        let spans = std::mem::take(&mut self.spans);
        self.lines.extend(wrap_spans(spans, self.width, first, rest));
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.flush();
        if let Some(code) = self.code_block.take() {
            self.push_code(&code);
        }
        self.lines
    }
}

/// Greedy word wrap over styled spans. Breaks only at spaces; a word longer
/// than the width gets a line of its own.
fn wrap_spans(
    spans: Vec<Span<'static>>,
    width: usize,
    first_prefix: String,
    rest_prefix: String,
) -> Vec<Line<'static>> {
    let prefix_style = Style::default().fg(Color::DarkGray);
    let mut lines = Vec::new();
    let mut prefix_width = first_prefix.chars().count();
    let mut current = vec![Span::styled(first_prefix, prefix_style)];
    let mut current_width = prefix_width;

    for span in spans {
        let style = span.style;
        for token in span.content.split_inclusive(' ') {
            let visible = token.trim_end_matches(' ').chars().count();
            if current_width > prefix_width && current_width + visible > width {
                lines.push(finish_line(std::mem::take(&mut current)));
                prefix_width = rest_prefix.chars().count();
                current = vec![Span::styled(rest_prefix.clone(), prefix_style)];
                current_width = prefix_width;
            }

            let token = if current_width == prefix_width {
                token.trim_start_matches(' ')
            } else {
                token
            };
            if token.is_empty() {
                continue;
            }
            current_width += token.chars().count();
            current.push(Span::styled(token.to_string(), style));
        }
    }

    lines.push(finish_line(current));
    lines
}

fn finish_line(mut spans: Vec<Span<'static>>) -> Line<'static> {
    if let Some(last) = spans.last_mut() {
        let trimmed = last.content.trim_end_matches(' ').to_string();
        last.content = trimmed.into();
    }
    Line::from(spans)
}
