use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::sync::mpsc;
use tracing::warn;

use crate::completion::{CompletionError, CompletionRequest, CompletionService};
use crate::markdown::TerminalMarkdown;
use crate::models;
use crate::session::{ChatSession, Phase};
use crate::tui::AppEvent;
use crate::ui;

pub struct App {
    // Core state
    pub should_quit: bool,
    pub session: ChatSession,

    // Completion plumbing
    service: Arc<dyn CompletionService>,
    events: mpsc::UnboundedSender<AppEvent>,

    // Message log scrolling
    pub log_scroll: u16,
    pub log_height: u16, // Inner height of the log area for scroll calculations
    pub log_width: u16,  // Inner width of the log area for wrap calculations
    pub follow_tail: bool,

    // Model picker state
    pub model_picker_state: ListState,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Panel area for mouse hit-testing (updated during render)
    pub log_area: Option<Rect>,
}

impl App {
    pub fn new(
        service: Arc<dyn CompletionService>,
        events: mpsc::UnboundedSender<AppEvent>,
        model_index: usize,
    ) -> Self {
        let mut session = ChatSession::new(Box::new(TerminalMarkdown));
        if !session.select_model(model_index) {
            warn!(model_index, "Ignoring out-of-range model selection");
        }

        Self {
            should_quit: false,
            session,
            service,
            events,
            log_scroll: 0,
            log_height: 0,
            log_width: 0,
            follow_tail: true,
            model_picker_state: ListState::default(),
            animation_frame: 0,
            log_area: None,
        }
    }

    pub fn is_sending(&self) -> bool {
        self.session.phase() == Phase::Sending
    }

    /// Submit the input field; if a turn starts, run its request in the background
    pub fn submit(&mut self) {
        if let Some(request) = self.session.submit() {
            self.animation_frame = 0;
            self.follow_tail = true;
            self.dispatch(request);
        }
    }

    /// Run the request on its own task and post the single outcome back to the event loop
    fn dispatch(&self, request: CompletionRequest) {
        let service = Arc::clone(&self.service);
        let events = self.events.clone();

        tokio::spawn(async move {
            let result = AssertUnwindSafe(service.complete(&request))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    Err(CompletionError::Task(format!(
                        "Completion task failed: {}",
                        panic_message(payload.as_ref())
                    )))
                });
            if events.send(AppEvent::Completion(result)).is_err() {
                warn!("Event loop closed before completion could be delivered");
            }
        });
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_sending() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Model picker methods
    pub fn open_model_picker(&mut self) {
        if self.session.open_model_select() {
            self.model_picker_state.select(Some(self.session.model_index()));
        }
    }

    pub fn close_model_picker(&mut self) {
        self.session.close_model_select();
    }

    pub fn model_picker_nav_down(&mut self) {
        let len = models::all().len();
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some((i + 1).min(len - 1)));
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        if let Some(i) = self.model_picker_state.selected() {
            self.session.select_model(i);
        }
        self.close_model_picker();
    }

    // Log scrolling
    /// Rows the log occupies once word-wrapped to the current width
    pub fn total_log_lines(&self) -> u16 {
        // Use actual log width for wrap calculation, default to 50 if not set
        let wrap_width = if self.log_width > 0 { self.log_width } else { 50 };
        let total = ui::log_paragraph(self).line_count(wrap_width);
        total.min(u16::MAX as usize) as u16
    }

    fn max_scroll(&self) -> u16 {
        let visible_height = if self.log_height > 0 { self.log_height } else { 20 };
        self.total_log_lines().saturating_sub(visible_height)
    }

    pub fn scroll_log_to_bottom(&mut self) {
        self.log_scroll = self.max_scroll();
    }

    pub fn scroll_up(&mut self, rows: u16) {
        self.log_scroll = self.log_scroll.saturating_sub(rows);
        self.follow_tail = false;
    }

    pub fn scroll_down(&mut self, rows: u16) {
        let max = self.max_scroll();
        self.log_scroll = self.log_scroll.saturating_add(rows).min(max);
        self.follow_tail = self.log_scroll >= max;
    }

    pub fn scroll_half_page_up(&mut self) {
        self.scroll_up((self.log_height / 2).max(1));
    }

    pub fn scroll_half_page_down(&mut self) {
        self.scroll_down((self.log_height / 2).max(1));
    }

    /// Called before drawing: jump to the newest entry when one was added
    pub fn sync_scroll(&mut self) {
        if self.session.take_scroll_request() {
            self.follow_tail = true;
        }
        if self.follow_tail {
            self.scroll_log_to_bottom();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Focus;
    use async_trait::async_trait;

    struct EchoService;

    #[async_trait]
    impl CompletionService for EchoService {
        async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, CompletionError> {
            Ok(request.messages.last().map(|m| format!("echo: {}", m.content)))
        }
    }

    struct PanickingService;

    #[async_trait]
    impl CompletionService for PanickingService {
        async fn complete(&self, _request: &CompletionRequest) -> Result<Option<String>, CompletionError> {
            panic!("backend exploded");
        }
    }

    fn app_with(service: Arc<dyn CompletionService>) -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (App::new(service, tx, 0), rx)
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.session.input.insert(c);
        }
    }

    async fn next_completion(rx: &mut mpsc::UnboundedReceiver<AppEvent>) -> Result<Option<String>, CompletionError> {
        match rx.recv().await {
            Some(AppEvent::Completion(result)) => result,
            other => panic!("expected completion event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_dispatches_and_delivers_result() {
        let (mut app, mut rx) = app_with(Arc::new(EchoService));
        type_text(&mut app, "ping");
        app.submit();
        assert!(app.is_sending());

        let result = next_completion(&mut rx).await;
        app.session.on_completion_result(result);

        assert!(!app.is_sending());
        assert_eq!(app.session.transcript().last().unwrap().content, "echo: ping");
    }

    #[tokio::test]
    async fn test_panicking_task_becomes_error_entry() {
        let (mut app, mut rx) = app_with(Arc::new(PanickingService));
        type_text(&mut app, "ping");
        app.submit();

        let result = next_completion(&mut rx).await;
        match &result {
            Err(CompletionError::Task(msg)) => assert!(msg.contains("backend exploded"), "{}", msg),
            other => panic!("expected task error, got {:?}", other),
        }
        app.session.on_completion_result(result);
        assert!(!app.is_sending());
        assert_eq!(app.session.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_model_picker_selects_and_returns_focus() {
        let (mut app, _rx) = app_with(Arc::new(EchoService));
        app.open_model_picker();
        assert_eq!(app.session.focus(), Focus::ModelSelect);
        app.model_picker_nav_down();
        app.model_picker_nav_down();
        app.select_model();
        assert_eq!(app.session.model_index(), 2);
        assert_eq!(app.session.focus(), Focus::Input);

        for _ in 0..10 {
            app.model_picker_nav_down();
        }
        assert_eq!(app.model_picker_state.selected(), Some(models::all().len() - 1));
    }

    #[tokio::test]
    async fn test_model_picker_unavailable_while_sending() {
        let (mut app, _rx) = app_with(Arc::new(EchoService));
        type_text(&mut app, "ping");
        app.submit();
        app.open_model_picker();
        assert_eq!(app.session.focus(), Focus::Input);
    }

    #[tokio::test]
    async fn test_scroll_follows_tail_until_user_scrolls_up() {
        let (mut app, _rx) = app_with(Arc::new(EchoService));
        app.log_height = 2;
        app.log_width = 40;
        for i in 0..5 {
            app.session.render(crate::session::DisplayRole::Error, &format!("entry {}", i));
        }
        app.sync_scroll();
        let bottom = app.log_scroll;
        assert!(bottom > 0);
        assert_eq!(bottom, app.total_log_lines() - 2);

        app.scroll_up(3);
        assert!(!app.follow_tail);
        app.sync_scroll();
        assert_eq!(app.log_scroll, bottom - 3);

        app.scroll_down(100);
        assert!(app.follow_tail);
        assert_eq!(app.log_scroll, bottom);
    }
}
