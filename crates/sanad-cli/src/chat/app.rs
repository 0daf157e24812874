//! Chat screen state

use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// How long a status message stays visible
const STATUS_TIMEOUT: Duration = Duration::from_secs(3);

/// What a key press asks the event loop to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    None,
    Send,
    Reload,
    Quit,
}

/// Application state
#[derive(Debug, Default)]
pub struct App {
    /// Whether the app should exit
    pub should_quit: bool,
    /// Message being composed
    pub input: String,
    /// Cursor position in `input`, in characters
    pub cursor: usize,
    /// Lines scrolled up from the newest message
    pub scroll: usize,
    /// Status message to display temporarily
    pub status_message: Option<String>,
    /// When the status message was set (for auto-dismiss)
    pub status_message_time: Option<Instant>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a status message (will auto-dismiss after 3 seconds)
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.status_message_time = Some(Instant::now());
    }

    /// Check and clear expired status message
    pub fn check_status_timeout(&mut self) {
        if let Some(time) = self.status_message_time {
            if time.elapsed() > STATUS_TIMEOUT {
                self.status_message = None;
                self.status_message_time = None;
            }
        }
    }

    /// Map a key press to an action; editing keys are ignored while `locked`
    pub fn handle_key(&mut self, key: KeyEvent, locked: bool) -> KeyAction {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => KeyAction::Quit,
            KeyCode::Char('c') if ctrl => KeyAction::Quit,
            KeyCode::Char('r') if ctrl => KeyAction::Reload,
            KeyCode::Up => {
                self.scroll = self.scroll.saturating_add(1);
                KeyAction::None
            }
            KeyCode::Down => {
                self.scroll = self.scroll.saturating_sub(1);
                KeyAction::None
            }
            KeyCode::PageUp => {
                self.scroll = self.scroll.saturating_add(10);
                KeyAction::None
            }
            KeyCode::PageDown | KeyCode::End => {
                self.scroll = 0;
                KeyAction::None
            }
            _ if locked => KeyAction::None,
            KeyCode::Enter => KeyAction::Send,
            KeyCode::Char(c) if !ctrl => {
                self.insert_char(c);
                KeyAction::None
            }
            KeyCode::Backspace => {
                self.delete_char();
                KeyAction::None
            }
            KeyCode::Left => {
                self.cursor = self.cursor.saturating_sub(1);
                KeyAction::None
            }
            KeyCode::Right => {
                if self.cursor < self.input.chars().count() {
                    self.cursor += 1;
                }
                KeyAction::None
            }
            KeyCode::Home => {
                self.cursor = 0;
                KeyAction::None
            }
            _ => KeyAction::None,
        }
    }

    /// Insert character at cursor position
    pub fn insert_char(&mut self, c: char) {
        let at = self.byte_index(self.cursor);
        self.input.insert(at, c);
        self.cursor += 1;
    }

    /// Delete character before cursor
    pub fn delete_char(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let at = self.byte_index(self.cursor);
            self.input.remove(at);
        }
    }

    /// Clear the composer after a confirmed send
    pub fn clear_input(&mut self) {
        self.input.clear();
        self.cursor = 0;
        self.scroll = 0;
    }

    fn byte_index(&self, chars: usize) -> usize {
        self.input
            .char_indices()
            .nth(chars)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    #[test]
    fn test_typing_and_editing() {
        let mut app = App::new();
        for c in "helo".chars() {
            app.handle_key(key(KeyCode::Char(c)), false);
        }
        app.handle_key(key(KeyCode::Left), false);
        app.handle_key(key(KeyCode::Char('l')), false);
        assert_eq!(app.input, "hello");

        app.handle_key(key(KeyCode::End), false);
        app.handle_key(key(KeyCode::Home), false);
        app.handle_key(key(KeyCode::Backspace), false);
        assert_eq!(app.input, "hello");
    }

    #[test]
    fn test_multibyte_input() {
        let mut app = App::new();
        for c in "سلم".chars() {
            app.insert_char(c);
        }
        app.cursor = 2;
        app.insert_char('ا');
        assert_eq!(app.input, "سلام");

        app.delete_char();
        assert_eq!(app.input, "سلم");
        assert_eq!(app.cursor, 2);
    }

    #[test]
    fn test_actions() {
        let mut app = App::new();
        assert_eq!(app.handle_key(key(KeyCode::Enter), false), KeyAction::Send);
        assert_eq!(app.handle_key(ctrl('r'), false), KeyAction::Reload);
        assert_eq!(app.handle_key(ctrl('c'), false), KeyAction::Quit);
        assert_eq!(app.handle_key(key(KeyCode::Esc), true), KeyAction::Quit);
        // Ctrl+letter never reaches the input
        assert!(app.input.is_empty());
    }

    #[test]
    fn test_locked_while_sending() {
        let mut app = App::new();
        app.insert_char('x');

        assert_eq!(app.handle_key(key(KeyCode::Enter), true), KeyAction::None);
        app.handle_key(key(KeyCode::Char('y')), true);
        app.handle_key(key(KeyCode::Backspace), true);
        assert_eq!(app.input, "x");

        // Scrolling still works
        app.handle_key(key(KeyCode::Up), true);
        assert_eq!(app.scroll, 1);
    }

    #[test]
    fn test_clear_input() {
        let mut app = App::new();
        app.insert_char('x');
        app.scroll = 4;
        app.clear_input();
        assert!(app.input.is_empty());
        assert_eq!(app.cursor, 0);
        assert_eq!(app.scroll, 0);
    }
}
