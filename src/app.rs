use std::sync::Arc;

use nexus_core::{ConversationController, ConversationSnapshot, Error, TurnOutcome};
use tokio::task::JoinHandle;
use tracing::warn;

pub struct Suggestion {
    pub title: &'static str,
    pub description: &'static str,
    pub prompt: &'static str,
}

/// Starter prompts offered while the conversation is empty
pub const SUGGESTIONS: &[Suggestion] = &[
    Suggestion {
        title: "Explain AI and machine learning",
        description: "Get a simple explanation of AI concepts",
        prompt: "Explain artificial intelligence and machine learning in simple terms.",
    },
    Suggestion {
        title: "Creative writing assistant",
        description: "Get help with creative writing",
        prompt: "Help me write a short story about a space traveler who discovers a new planet.",
    },
    Suggestion {
        title: "Code review and help",
        description: "Get coding assistance",
        prompt: "Can you help me make this Rust function more idiomatic? fn first(v: &Vec<i32>) -> i32 { v[0] }",
    },
    Suggestion {
        title: "Learning recommendations",
        description: "Get personalized learning resources",
        prompt: "I want to learn Rust. What resources do you recommend for beginners?",
    },
];

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub struct App {
    pub should_quit: bool,
    pub controller: Arc<ConversationController>,

    // Latest state published by the controller
    pub conversation: ConversationSnapshot,

    // Input box
    pub input: String,
    pub cursor: usize, // cursor position in chars
    pub max_input_chars: usize,

    // Chat pane
    pub scroll: u16,
    pub follow_bottom: bool,
    pub chat_height: u16, // inner height, updated during render
    pub chat_width: u16,  // inner width, updated during render

    pub turn_task: Option<JoinHandle<nexus_core::Result<TurnOutcome>>>,
    // Text of the in-flight submission, restored if the controller rejects it
    pub submitted_text: Option<String>,
    pub status: Option<String>,
    // Ctrl+L asks first; the next key answers
    pub confirm_clear: bool,
    // Last suggestion pulled into the input, if any
    pub suggestion: Option<usize>,

    pub animation_frame: u8, // 0-2 for ellipsis animation
}

impl App {
    pub fn new(controller: Arc<ConversationController>) -> Self {
        let conversation = controller.snapshot();
        let max_input_chars = controller.max_input_chars();

        let mut app = Self {
            should_quit: false,
            controller,
            conversation,
            input: String::new(),
            cursor: 0,
            max_input_chars,
            scroll: 0,
            follow_bottom: true,
            chat_height: 0,
            chat_width: 0,
            turn_task: None,
            submitted_text: None,
            status: None,
            confirm_clear: false,
            suggestion: None,
            animation_frame: 0,
        };
        app.scroll_to_bottom();
        app
    }

    pub fn is_pending(&self) -> bool {
        self.conversation.is_pending() || self.turn_task.is_some()
    }

    /// The controller is waiting on the completion service
    pub fn is_thinking(&self) -> bool {
        self.conversation.is_pending()
    }

    pub fn input_chars(&self) -> usize {
        self.input.chars().count()
    }

    pub fn apply_snapshot(&mut self, snapshot: ConversationSnapshot) {
        self.conversation = snapshot;
        if self.follow_bottom {
            self.scroll_to_bottom();
        }
    }

    /// Hand the input to the controller on a background task
    pub fn submit(&mut self) {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return;
        }
        if self.is_pending() {
            self.status = Some("Still waiting for the last reply".to_string());
            return;
        }

        let controller = self.controller.clone();
        let prompt = text.clone();
        self.turn_task = Some(tokio::spawn(async move { controller.submit(&prompt).await }));

        self.submitted_text = Some(text);
        self.input.clear();
        self.cursor = 0;
        self.status = None;
        self.follow_bottom = true;
    }

    /// Collect the result of a finished turn, if any
    pub async fn poll_turn(&mut self) {
        let finished = self.turn_task.as_ref().is_some_and(|t| t.is_finished());
        if !finished {
            return;
        }
        let Some(task) = self.turn_task.take() else {
            return;
        };

        let submitted = self.submitted_text.take();
        match task.await {
            Ok(Ok(_)) => {}
            Ok(Err(e @ (Error::Validation(_) | Error::Busy))) => {
                if self.input.is_empty() {
                    if let Some(text) = submitted {
                        self.cursor = text.chars().count();
                        self.input = text;
                    }
                }
                self.status = Some(e.to_string());
            }
            Ok(Err(e)) => self.status = Some(e.to_string()),
            Err(e) => {
                warn!(error = %e, "turn task did not complete");
                self.status = Some("Request was interrupted".to_string());
            }
        }
    }

    /// Ask before wiping the conversation
    pub fn request_clear(&mut self) {
        if self.conversation.messages.is_empty() && !self.is_thinking() {
            self.status = Some("Nothing to clear".to_string());
            return;
        }
        self.confirm_clear = true;
        self.status = Some("Clear all chat history? (y/n)".to_string());
    }

    pub fn answer_clear(&mut self, confirmed: bool) {
        self.confirm_clear = false;
        if confirmed {
            self.clear_history();
        } else {
            self.status = None;
        }
    }

    fn clear_history(&mut self) {
        self.controller.clear_history();
        self.scroll = 0;
        self.follow_bottom = true;
        self.status = Some("History cleared".to_string());
    }

    /// Fill the input with the next starter prompt; only on an empty conversation
    pub fn cycle_suggestion(&mut self) {
        if !self.conversation.messages.is_empty() || self.is_pending() {
            return;
        }
        let next = self.suggestion.map_or(0, |i| (i + 1) % SUGGESTIONS.len());
        self.suggestion = Some(next);

        self.input.clear();
        self.cursor = 0;
        self.insert_str(SUGGESTIONS[next].prompt);
        self.status = None;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_thinking() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Input editing

    pub fn insert_char(&mut self, c: char) {
        if self.input_chars() >= self.max_input_chars {
            return;
        }
        let byte_pos = char_to_byte_index(&self.input, self.cursor);
        self.input.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn insert_str(&mut self, text: &str) {
        for c in text.chars() {
            // Newlines would break the single-line input box
            self.insert_char(if c == '\n' || c == '\r' { ' ' } else { c });
        }
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.input, self.cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.input_chars() {
            let byte_pos = char_to_byte_index(&self.input, self.cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.input_chars());
    }

    pub fn cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor = self.input_chars();
    }

    // Chat scrolling

    pub fn scroll_up(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_sub(lines);
        self.follow_bottom = false;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.max_scroll();
        self.scroll = (self.scroll + lines).min(max);
        self.follow_bottom = self.scroll >= max;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = self.max_scroll();
    }

    fn max_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.total_chat_lines().saturating_sub(visible_height)
    }

    /// Rendered height of the chat, matching the layout in `ui::render_chat`
    fn total_chat_lines(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 { self.chat_width as usize } else { 50 };

        let mut total_lines: u16 = 0;
        for msg in &self.conversation.messages {
            total_lines = total_lines.saturating_add(1); // "You:" or "AI:"
            for line in msg.content.lines() {
                let char_count = line.chars().count();
                let wrapped = (char_count / wrap_width) + 1;
                total_lines = total_lines.saturating_add(wrapped.min(u16::MAX as usize) as u16);
            }
            total_lines = total_lines.saturating_add(1); // blank line after message
        }

        if self.is_thinking() {
            total_lines = total_lines.saturating_add(2); // "AI:" + "Thinking..."
        }
        total_lines
    }
}
