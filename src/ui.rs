use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use crate::app::App;
use crate::models;
use crate::session::{DisplayEntry, DisplayRole, Focus};

const TITLE: &str = " Gemini Chat ";
const INPUT_PLACEHOLDER: &str = "Type your message...";

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, message log, input form, footer
    let [header_area, log_area, form_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_log(app, frame, log_area);
    render_form(app, frame, form_area);
    render_footer(app, frame, footer_area);

    if app.session.focus() == Focus::ModelSelect {
        render_model_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let enabled = app.session.controls_enabled();
    let selector_style = if enabled {
        Style::default().fg(Color::Green).bold()
    } else {
        Style::default().fg(Color::Gray)
    };

    let title = Line::from(vec![
        Span::styled(TITLE, Style::default().fg(Color::Cyan).bold()),
        Span::styled(" Model: ", Style::default().fg(Color::White)),
        Span::styled(format!("[{} ▾]", app.session.model().name), selector_style),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn role_label(role: DisplayRole) -> Span<'static> {
    let (label, color) = match role {
        DisplayRole::System => ("System:", Color::DarkGray),
        DisplayRole::User => ("You:", Color::Cyan),
        DisplayRole::Assistant => ("Gemini:", Color::Yellow),
        DisplayRole::Error => ("Error:", Color::Red),
    };
    Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD))
}

fn entry_lines(entry: &DisplayEntry) -> Vec<Line<'static>> {
    let body_style = match entry.role {
        DisplayRole::User => Some(Style::default().fg(Color::Cyan)),
        DisplayRole::Error => Some(Style::default().fg(Color::Red)),
        DisplayRole::System | DisplayRole::Assistant => None,
    };

    let mut lines = Vec::with_capacity(entry.lines.len() + 2);
    lines.push(Line::from(role_label(entry.role)));
    for line in &entry.lines {
        lines.push(match body_style {
            Some(style) => line.clone().style(style),
            None => line.clone(),
        });
    }
    lines.push(Line::default());
    lines
}

fn render_log(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store area for mouse hit-testing and inner size for scroll calculations
    app.log_area = Some(area);
    app.log_height = area.height.saturating_sub(2);
    app.log_width = area.width.saturating_sub(2);
    app.sync_scroll();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Chat ");

    let log = log_paragraph(app)
        .block(block)
        .scroll((app.log_scroll, 0));

    frame.render_widget(log, area);
}

/// The wrapped message log, without its border; scrolling measures this same paragraph
pub fn log_paragraph(app: &App) -> Paragraph<'static> {
    let mut lines: Vec<Line<'static>> = app.session.entries().iter().flat_map(entry_lines).collect();

    if app.is_sending() {
        lines.push(Line::from(role_label(DisplayRole::Assistant)));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false })
}

fn render_form(app: &App, frame: &mut Frame, area: Rect) {
    let [input_area, send_area] = Layout::horizontal([
        Constraint::Min(0),
        Constraint::Length(10),
    ])
    .areas(area);

    let enabled = app.session.controls_enabled();
    let focused = enabled && app.session.focus() == Focus::Input;

    let border_color = if focused { Color::Yellow } else { Color::DarkGray };
    let title = if enabled { " Message " } else { " Waiting for reply " };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Visible portion of the input, scrolled by display width to keep the cursor in view
    // Inner width = total width - 2 (for borders)
    let inner_width = input_area.width.saturating_sub(2) as usize;
    let input = &app.session.input;
    let (visible_text, cursor_x) = input.visible_window(inner_width);

    let paragraph = if input.text().is_empty() {
        Paragraph::new(Span::styled(
            INPUT_PLACEHOLDER,
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ))
    } else {
        let color = if enabled { Color::Cyan } else { Color::DarkGray };
        Paragraph::new(visible_text).style(Style::default().fg(color))
    };

    frame.render_widget(paragraph.block(input_block), input_area);

    let send_style = if enabled {
        Style::default().fg(Color::Black).bg(Color::Green).bold()
    } else {
        Style::default().fg(Color::Gray).bg(Color::DarkGray)
    };
    let send = Paragraph::new(Line::from(Span::styled(" Send ", send_style)).centered())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        );
    frame.render_widget(send, send_area);

    // Show cursor only when the field can be edited
    if focused {
        frame.set_cursor_position((input_area.x + cursor_x + 1, input_area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match (app.session.controls_enabled(), app.session.focus()) {
        (false, _) => (" SENDING ", Style::default().bg(Color::Yellow).fg(Color::Black)),
        (true, Focus::ModelSelect) => (" MODEL ", Style::default().bg(Color::Magenta).fg(Color::White)),
        (true, Focus::Input) => (" CHAT ", Style::default().bg(Color::Blue).fg(Color::White)),
    };

    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    let hints: &[(&str, &str)] = match app.session.focus() {
        Focus::ModelSelect => &[(" j/k ", " nav "), (" Enter ", " select "), (" Esc ", " cancel ")],
        Focus::Input if app.session.controls_enabled() => &[
            (" Enter ", " send "),
            (" Tab ", " model "),
            (" PgUp/PgDn ", " scroll "),
            (" Esc ", " quit "),
        ],
        Focus::Input => &[(" PgUp/PgDn ", " scroll "), (" Ctrl+C ", " quit ")],
    };
    for (key, label) in hints {
        spans.push(Span::styled(*key, key_style));
        spans.push(Span::styled(*label, label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let catalog = models::all();

    // Calculate popup size and position (centered)
    let popup_width = 44.min(area.width.saturating_sub(4));
    let popup_height = (catalog.len() as u16 + 2).min(area.height.saturating_sub(4));

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Select Model ");

    let current = app.session.model_index();
    let items: Vec<ListItem> = catalog
        .iter()
        .enumerate()
        .map(|(i, model)| {
            let is_current = i == current;
            let prefix = if is_current { "* " } else { "  " };
            let style = if is_current {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!("{}{}", prefix, model.name)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.model_picker_state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionError, CompletionRequest, CompletionService};
    use async_trait::async_trait;
    use ratatui::{backend::TestBackend, layout::Position, Terminal};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct NeverCalled;

    #[async_trait]
    impl CompletionService for NeverCalled {
        async fn complete(&self, _request: &CompletionRequest) -> Result<Option<String>, CompletionError> {
            Ok(None)
        }
    }

    fn screen_text(app: &mut App) -> String {
        let backend = TestBackend::new(80, 20);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|frame| render(app, frame)).unwrap();
        let buffer = terminal.backend().buffer();
        buffer.content.iter().map(|cell| cell.symbol()).collect()
    }

    fn new_app() -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        App::new(Arc::new(NeverCalled), tx, 0)
    }

    #[test]
    fn test_initial_screen() {
        let mut app = new_app();
        let text = screen_text(&mut app);
        assert!(text.contains("Gemini Chat"));
        assert!(text.contains("Gemini 2.5 Flash"));
        assert!(text.contains("System: You are a helpful assistant."));
        assert!(text.contains(INPUT_PLACEHOLDER));
        assert!(text.contains("Send"));
    }

    #[test]
    fn test_error_entry_is_drawn() {
        let mut app = new_app();
        app.session.render(DisplayRole::Error, "Error: rate limited");
        let text = screen_text(&mut app);
        assert!(text.contains("Error: rate limited"));
    }

    #[test]
    fn test_long_reply_tail_is_visible_after_auto_scroll() {
        let mut app = new_app();
        app.session.submit_text("Hello");
        let word = "a".repeat(50);
        let reply = format!("{} ENDMARK", vec![word.as_str(); 12].join(" "));
        app.session.on_completion_result(Ok(Some(reply)));

        let text = screen_text(&mut app);
        assert!(text.contains("ENDMARK"), "newest reply cut off at scroll {}", app.log_scroll);
        assert!(app.follow_tail);
        assert_eq!(
            app.total_log_lines(),
            log_paragraph(&app).line_count(app.log_width) as u16
        );
    }

    #[test]
    fn test_cursor_follows_wide_characters() {
        let mut app = new_app();
        for c in "你好".chars() {
            app.session.input.insert(c);
        }
        let backend = TestBackend::new(80, 20);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        // Two wide characters after the left border
        assert_eq!(terminal.get_cursor_position().unwrap(), Position::new(5, 17));
    }

    #[test]
    fn test_model_picker_lists_catalog() {
        let mut app = new_app();
        app.open_model_picker();
        let text = screen_text(&mut app);
        for model in models::all() {
            assert!(text.contains(model.name), "missing {}", model.name);
        }
    }
}
