//! Markdown to styled terminal lines
//!
//! Assistant and system entries are run through a [`MarkdownRenderer`] before
//! they reach the message log. The renderer is fallible; callers fall back to
//! [`plain_lines`] when it refuses the input.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};
use thiserror::Error;

/// Deepest combined list/blockquote nesting we are willing to lay out
const MAX_NESTING: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarkdownError {
    #[error("unbalanced end tag: {0}")]
    Unbalanced(&'static str),
    #[error("nesting deeper than {} levels", MAX_NESTING)]
    TooDeep,
}

pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, source: &str) -> Result<Vec<Line<'static>>, MarkdownError>;
}

/// CommonMark renderer backed by pulldown-cmark
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalMarkdown;

impl MarkdownRenderer for TerminalMarkdown {
    fn render(&self, source: &str) -> Result<Vec<Line<'static>>, MarkdownError> {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);

        let mut builder = LineBuilder::new();
        for event in Parser::new_ext(source, options) {
            builder.event(event)?;
        }
        Ok(builder.finish())
    }
}

/// Split text into unstyled lines, one per source line
pub fn plain_lines(text: &str) -> Vec<Line<'static>> {
    text.split('\n')
        .map(|line| Line::from(line.trim_end_matches('\r').to_string()))
        .collect()
}

struct LineBuilder {
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
    styles: Vec<Style>,
    lists: Vec<Option<u64>>,
    quote_depth: usize,
    in_code_block: bool,
}

impl LineBuilder {
    fn new() -> Self {
        Self {
            lines: Vec::new(),
            current: Vec::new(),
            styles: vec![Style::default()],
            lists: Vec::new(),
            quote_depth: 0,
            in_code_block: false,
        }
    }

    fn style(&self) -> Style {
        self.styles.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, patch: Style) {
        let next = self.style().patch(patch);
        self.styles.push(next);
    }

    fn pop_style(&mut self, tag: &'static str) -> Result<(), MarkdownError> {
        // The base style is never popped
        if self.styles.len() <= 1 {
            return Err(MarkdownError::Unbalanced(tag));
        }
        self.styles.pop();
        Ok(())
    }

    fn check_depth(&self) -> Result<(), MarkdownError> {
        if self.lists.len() + self.quote_depth > MAX_NESTING {
            return Err(MarkdownError::TooDeep);
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        let style = self.style();
        self.current.push(Span::styled(text.to_string(), style));
    }

    fn flush(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let mut spans = Vec::with_capacity(self.current.len() + 1);
        if self.quote_depth > 0 {
            spans.push(Span::styled(
                "│ ".repeat(self.quote_depth),
                Style::default().fg(Color::DarkGray),
            ));
        }
        spans.append(&mut self.current);
        self.lines.push(Line::from(spans));
    }

    fn blank(&mut self) {
        if self.lines.last().is_some_and(|l| !l.spans.is_empty()) {
            self.lines.push(Line::default());
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), MarkdownError> {
        match event {
            Event::Start(tag) => self.start(tag)?,
            Event::End(tag) => self.end(tag)?,
            Event::Text(text) => {
                if self.in_code_block {
                    for line in text.lines() {
                        self.current.push(Span::styled(
                            format!("  {}", line),
                            Style::default().fg(Color::Yellow),
                        ));
                        self.flush();
                    }
                } else {
                    self.text(&text);
                }
            }
            Event::Code(code) => {
                let style = self.style().fg(Color::Yellow);
                self.current.push(Span::styled(code.to_string(), style));
            }
            // Raw HTML is shown as written, never interpreted
            Event::Html(html) => self.text(&html),
            Event::SoftBreak => self.text(" "),
            Event::HardBreak => self.flush(),
            Event::Rule => {
                self.flush();
                self.lines.push(Line::from(Span::styled(
                    "─".repeat(24),
                    Style::default().fg(Color::DarkGray),
                )));
                self.blank();
            }
            Event::TaskListMarker(checked) => {
                self.text(if checked { "[x] " } else { "[ ] " });
            }
            Event::FootnoteReference(name) => self.text(&format!("[^{}]", name)),
        }
        Ok(())
    }

    fn start(&mut self, tag: Tag<'_>) -> Result<(), MarkdownError> {
        match tag {
            Tag::Paragraph => {}
            Tag::Heading(level, _, _) => {
                self.flush();
                let color = match level {
                    HeadingLevel::H1 | HeadingLevel::H2 => Color::Cyan,
                    _ => Color::Blue,
                };
                self.push_style(Style::default().fg(color).add_modifier(Modifier::BOLD));
            }
            Tag::BlockQuote => {
                self.flush();
                self.quote_depth += 1;
                self.check_depth()?;
            }
            Tag::CodeBlock(kind) => {
                self.flush();
                self.in_code_block = true;
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        self.current.push(Span::styled(
                            format!("  [{}]", lang),
                            Style::default().fg(Color::DarkGray),
                        ));
                        self.flush();
                    }
                }
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(start);
                self.check_depth()?;
            }
            Tag::Item => {
                self.flush();
                let indent = "  ".repeat(self.lists.len().saturating_sub(1));
                let bullet = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let bullet = format!("{}{}. ", indent, n);
                        *n += 1;
                        bullet
                    }
                    _ => format!("{}• ", indent),
                };
                self.current.push(Span::styled(bullet, Style::default().fg(Color::Cyan)));
            }
            Tag::Emphasis => self.push_style(Style::default().add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.push_style(Style::default().add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => {
                self.push_style(Style::default().add_modifier(Modifier::CROSSED_OUT))
            }
            Tag::Link(_, _, _) => self.push_style(
                Style::default().fg(Color::Blue).add_modifier(Modifier::UNDERLINED),
            ),
            Tag::Image(_, url, _) => {
                self.text(&format!("[image: {}]", url));
            }
            Tag::FootnoteDefinition(_) | Tag::Table(_) | Tag::TableHead | Tag::TableRow
            | Tag::TableCell => {}
        }
        Ok(())
    }

    fn end(&mut self, tag: Tag<'_>) -> Result<(), MarkdownError> {
        match tag {
            Tag::Paragraph => {
                self.flush();
                if self.lists.is_empty() {
                    self.blank();
                }
            }
            Tag::Heading(..) => {
                self.pop_style("heading")?;
                self.flush();
                self.blank();
            }
            Tag::BlockQuote => {
                self.flush();
                self.quote_depth = self
                    .quote_depth
                    .checked_sub(1)
                    .ok_or(MarkdownError::Unbalanced("blockquote"))?;
                if self.quote_depth == 0 {
                    self.blank();
                }
            }
            Tag::CodeBlock(_) => {
                self.flush();
                self.in_code_block = false;
                self.blank();
            }
            Tag::List(_) => {
                self.flush();
                self.lists.pop().ok_or(MarkdownError::Unbalanced("list"))?;
                if self.lists.is_empty() {
                    self.blank();
                }
            }
            Tag::Item => self.flush(),
            Tag::Emphasis => self.pop_style("emphasis")?,
            Tag::Strong => self.pop_style("strong")?,
            Tag::Strikethrough => self.pop_style("strikethrough")?,
            Tag::Link(_, _, _) => self.pop_style("link")?,
            Tag::TableRow | Tag::TableHead => self.flush(),
            Tag::TableCell => self.text(" "),
            Tag::Image(..) | Tag::FootnoteDefinition(_) | Tag::Table(_) => {}
        }
        Ok(())
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.flush();
        while self.lines.last().is_some_and(|l| l.spans.is_empty()) {
            self.lines.pop();
        }
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_text(line: &Line<'_>) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    fn render(source: &str) -> Vec<Line<'static>> {
        TerminalMarkdown.render(source).unwrap()
    }

    #[test]
    fn test_bold_and_italic_are_styled() {
        let lines = render("plain **bold** and *soft*");
        assert_eq!(lines.len(), 1);
        assert_eq!(line_text(&lines[0]), "plain bold and soft");

        let bold = lines[0].spans.iter().find(|s| s.content == "bold").unwrap();
        assert!(bold.style.add_modifier.contains(Modifier::BOLD));
        let soft = lines[0].spans.iter().find(|s| s.content == "soft").unwrap();
        assert!(soft.style.add_modifier.contains(Modifier::ITALIC));
    }

    #[test]
    fn test_markers_do_not_leak() {
        let lines = render("Hi *there*");
        assert_eq!(line_text(&lines[0]), "Hi there");
    }

    #[test]
    fn test_unordered_list() {
        let lines = render("- one\n- two");
        let texts: Vec<String> = lines.iter().map(line_text).collect();
        assert_eq!(texts, vec!["• one", "• two"]);
    }

    #[test]
    fn test_ordered_list_numbers_from_start() {
        let lines = render("3. three\n4. four");
        let texts: Vec<String> = lines.iter().map(line_text).collect();
        assert_eq!(texts, vec!["3. three", "4. four"]);
    }

    #[test]
    fn test_code_block_keeps_lines() {
        let lines = render("```rust\nfn main() {}\nlet x = 1;\n```");
        let texts: Vec<String> = lines.iter().map(line_text).collect();
        assert_eq!(texts, vec!["  [rust]", "  fn main() {}", "  let x = 1;"]);
    }

    #[test]
    fn test_paragraphs_separated_by_blank_line() {
        let lines = render("first\n\nsecond");
        let texts: Vec<String> = lines.iter().map(line_text).collect();
        assert_eq!(texts, vec!["first", "", "second"]);
    }

    #[test]
    fn test_html_is_not_interpreted() {
        let lines = render("<b>hi</b>");
        assert!(line_text(&lines[0]).contains("<b>"));
    }

    #[test]
    fn test_excessive_nesting_is_refused() {
        let source = format!("{} deep", ">".repeat(MAX_NESTING + 4));
        assert_eq!(TerminalMarkdown.render(&source), Err(MarkdownError::TooDeep));
    }

    #[test]
    fn test_plain_lines_keeps_markup_literal() {
        let lines = plain_lines("**not bold**\nsecond");
        assert_eq!(lines.len(), 2);
        assert_eq!(line_text(&lines[0]), "**not bold**");
        assert!(lines[0].spans.iter().all(|s| s.style == Style::default()));
    }
}
