use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::App;
use crate::session::{Focus, InputField};
use crate::tui::AppEvent;

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Completion(result) => app.session.on_completion_result(result),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any state
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // Log scrolling stays available while a request is in flight
    match (key.code, app.session.focus()) {
        (KeyCode::PageUp, _) => app.scroll_half_page_up(),
        (KeyCode::PageDown, _) => app.scroll_half_page_down(),
        (_, Focus::ModelSelect) => handle_model_picker(app, key),
        (_, Focus::Input) => handle_input(app, key),
    }
}

fn handle_model_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Tab => app.close_model_picker(),
        KeyCode::Char('j') | KeyCode::Down => app.model_picker_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.model_picker_nav_up(),
        KeyCode::Enter => app.select_model(),
        _ => {}
    }
}

fn handle_input(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Esc {
        app.should_quit = true;
        return;
    }

    // Input, send and model selection are disabled while sending
    if !app.session.controls_enabled() {
        return;
    }

    match key.code {
        KeyCode::Enter => app.submit(),
        KeyCode::Tab => app.open_model_picker(),
        _ => edit_input(&mut app.session.input, key),
    }
}

fn edit_input(input: &mut InputField, key: KeyEvent) {
    match key.code {
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => input.left(),
        KeyCode::Right => input.right(),
        KeyCode::Home => input.home(),
        KeyCode::End => input.end(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => input.insert(c),
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_log = app
        .log_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_log {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionError, CompletionRequest, CompletionService};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct SilentService;

    #[async_trait]
    impl CompletionService for SilentService {
        async fn complete(&self, _request: &CompletionRequest) -> Result<Option<String>, CompletionError> {
            Ok(None)
        }
    }

    fn new_app() -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (App::new(Arc::new(SilentService), tx, 0), rx)
    }

    fn press(app: &mut App, code: KeyCode) {
        handle_event(app, AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE)));
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    #[tokio::test]
    async fn test_enter_submits_and_completion_restores_idle() {
        let (mut app, mut rx) = new_app();
        type_text(&mut app, "Hello");
        press(&mut app, KeyCode::Enter);
        assert!(app.is_sending());
        assert_eq!(app.session.input.text(), "");

        // Keys are ignored while sending
        type_text(&mut app, "more");
        assert_eq!(app.session.input.text(), "");

        let event = rx.recv().await.unwrap();
        handle_event(&mut app, event);
        assert!(!app.is_sending());
        assert_eq!(app.session.transcript().len(), 3);

        type_text(&mut app, "x");
        assert_eq!(app.session.input.text(), "x");
    }

    #[tokio::test]
    async fn test_enter_on_blank_input_does_nothing() {
        let (mut app, _rx) = new_app();
        type_text(&mut app, "   ");
        press(&mut app, KeyCode::Enter);
        assert!(!app.is_sending());
        assert_eq!(app.session.transcript().len(), 1);
    }

    #[tokio::test]
    async fn test_tab_opens_picker_and_enter_selects() {
        let (mut app, _rx) = new_app();
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.session.focus(), Focus::ModelSelect);
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.session.model_index(), 1);
        assert_eq!(app.session.focus(), Focus::Input);
    }

    #[tokio::test]
    async fn test_ctrl_c_and_esc_quit() {
        let (mut app, _rx) = new_app();
        handle_event(
            &mut app,
            AppEvent::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
        );
        assert!(app.should_quit);
        assert_eq!(app.session.input.text(), "");

        let (mut app, _rx) = new_app();
        press(&mut app, KeyCode::Esc);
        assert!(app.should_quit);
    }

    #[test]
    fn test_point_in_rect() {
        let rect = Rect::new(2, 2, 4, 4);
        assert!(point_in_rect(2, 2, rect));
        assert!(point_in_rect(5, 5, rect));
        assert!(!point_in_rect(6, 5, rect));
        assert!(!point_in_rect(1, 3, rect));
    }
}
