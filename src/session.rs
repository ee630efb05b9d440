//! Chat session controller
//!
//! Owns the transcript, the visible message log and the idle/sending phase.
//! A turn is split in two halves so the terminal stays responsive while the
//! request is in flight: [`ChatSession::submit`] hands back the request to
//! dispatch, and [`ChatSession::on_completion_result`] folds the outcome back in.

use ratatui::text::Line;
use tracing::{error, info, warn};
use unicode_width::UnicodeWidthChar;

use crate::completion::{CompletionError, CompletionRequest};
use crate::markdown::{plain_lines, MarkdownRenderer};
use crate::models::{self, ModelInfo};
use crate::state::{ChatMessage, SYSTEM_PROMPT};

/// Shown (and recorded) when the service answers without any content
pub const PLACEHOLDER_REPLY: &str = "No response generated.";
pub const UNKNOWN_ERROR: &str = "Unknown error occurred";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Input,
    ModelSelect,
}

/// Roles an entry in the message log can have. `Error` never reaches the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayRole {
    System,
    User,
    Assistant,
    Error,
}

#[derive(Debug, Clone)]
pub struct DisplayEntry {
    pub role: DisplayRole,
    pub lines: Vec<Line<'static>>,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Single-line text input with a character cursor
#[derive(Debug, Default, Clone)]
pub struct InputField {
    text: String,
    cursor: usize,
}

impl InputField {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.text.chars().count() {
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.text.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.text.chars().count();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    /// Part of the text that fits in `width` terminal columns with the cursor in view,
    /// and the cursor's column within it. Wide characters take two columns.
    pub fn visible_window(&self, width: usize) -> (String, u16) {
        if width == 0 {
            return (String::new(), 0);
        }
        let chars: Vec<char> = self.text.chars().collect();
        let columns = |c: &char| c.width().unwrap_or(0);

        // Scroll until the cursor cell itself fits
        let mut start = 0;
        let mut cursor_col: usize = chars[..self.cursor].iter().map(columns).sum();
        while cursor_col >= width && start < self.cursor {
            cursor_col -= columns(&chars[start]);
            start += 1;
        }

        let mut visible = String::new();
        let mut used = 0;
        for c in &chars[start..] {
            let w = columns(c);
            if used + w > width {
                break;
            }
            visible.push(*c);
            used += w;
        }
        (visible, cursor_col as u16)
    }
}

pub struct ChatSession {
    transcript: Vec<ChatMessage>,
    entries: Vec<DisplayEntry>,
    model_index: usize,
    phase: Phase,
    focus: Focus,
    pub input: InputField,
    renderer: Box<dyn MarkdownRenderer>,
    scroll_request: bool,
}

impl ChatSession {
    pub fn new(renderer: Box<dyn MarkdownRenderer>) -> Self {
        let mut session = Self {
            transcript: vec![ChatMessage::system(SYSTEM_PROMPT)],
            entries: Vec::new(),
            model_index: 0,
            phase: Phase::Idle,
            focus: Focus::Input,
            input: InputField::default(),
            renderer,
            scroll_request: false,
        };
        session.render(DisplayRole::System, &format!("System: {}", SYSTEM_PROMPT));
        session
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn entries(&self) -> &[DisplayEntry] {
        &self.entries
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    /// Input, send control and model selector are usable
    pub fn controls_enabled(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn model_index(&self) -> usize {
        self.model_index
    }

    pub fn model(&self) -> &'static ModelInfo {
        // model_index is only ever set from a validated catalog position
        &models::all()[self.model_index]
    }

    /// Change the selected model. Refused while a request is outstanding.
    pub fn select_model(&mut self, index: usize) -> bool {
        if !self.controls_enabled() || models::get(index).is_none() {
            return false;
        }
        if self.model_index != index {
            self.model_index = index;
            info!(model = self.model().id, "Model selected");
        }
        true
    }

    pub fn open_model_select(&mut self) -> bool {
        if !self.controls_enabled() {
            return false;
        }
        self.focus = Focus::ModelSelect;
        true
    }

    pub fn close_model_select(&mut self) {
        self.focus = Focus::Input;
    }

    /// Submit whatever is in the input field
    pub fn submit(&mut self) -> Option<CompletionRequest> {
        let text = self.input.text().to_string();
        self.submit_text(&text)
    }

    /// Start a turn with `text`. Returns the request to dispatch, or `None`
    /// when the text is blank or a request is already in flight.
    pub fn submit_text(&mut self, text: &str) -> Option<CompletionRequest> {
        let text = text.trim();
        if text.is_empty() || self.phase == Phase::Sending {
            return None;
        }

        self.input.clear();
        self.phase = Phase::Sending;
        self.focus = Focus::Input;

        self.render(DisplayRole::User, text);
        self.transcript.push(ChatMessage::user(text));

        let request = CompletionRequest {
            model: self.model().id.to_string(),
            messages: self.transcript.clone(),
        };
        info!(
            model = %request.model,
            messages = request.messages.len(),
            chars = text.chars().count(),
            "Submitting chat turn"
        );
        Some(request)
    }

    /// Fold the outcome of the in-flight request back into the session
    pub fn on_completion_result(&mut self, result: Result<Option<String>, CompletionError>) {
        if self.phase != Phase::Sending {
            warn!("Completion result arrived with no request outstanding; ignoring");
            return;
        }

        match result {
            Ok(content) => {
                // Empty and absent content are treated the same
                let reply = content
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| PLACEHOLDER_REPLY.to_string());
                info!(chars = reply.chars().count(), "Completion received");
                self.render(DisplayRole::Assistant, &reply);
                self.transcript.push(ChatMessage::assistant(reply));
            }
            Err(err) => {
                error!(error = %err, "Completion failed");
                let message = err.to_string();
                let message = if message.trim().is_empty() {
                    UNKNOWN_ERROR.to_string()
                } else {
                    message
                };
                self.render(DisplayRole::Error, &format!("Error: {}", message));
            }
        }

        self.phase = Phase::Idle;
        self.focus = Focus::Input;
    }

    /// Append an entry to the message log. Assistant and system text is
    /// formatted as Markdown; user and error text is always shown verbatim.
    pub fn render(&mut self, role: DisplayRole, text: &str) {
        let lines = match role {
            DisplayRole::Assistant | DisplayRole::System => {
                match self.renderer.render(text) {
                    Ok(lines) => lines,
                    Err(err) => {
                        warn!(error = %err, "Markdown rendering failed; showing raw text");
                        plain_lines(text)
                    }
                }
            }
            DisplayRole::User | DisplayRole::Error => plain_lines(text),
        };
        self.entries.push(DisplayEntry { role, lines });
        self.scroll_request = true;
    }

    /// True once after each new entry, so the view can jump to the bottom
    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.scroll_request)
    }
}
