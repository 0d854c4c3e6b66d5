//! Keyboard and resize input
//!
//! crossterm's async stream lets the run loop wait on input alongside its
//! timers without a dedicated reader thread.

use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use nodekeeper_core::{NodeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    Key(KeyEvent),
    Resize(u16, u16),
    /// Mouse, focus, paste and key release
    Ignored,
}

impl From<Event> for AppEvent {
    fn from(event: Event) -> Self {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => AppEvent::Key(key),
            Event::Resize(width, height) => AppEvent::Resize(width, height),
            _ => AppEvent::Ignored,
        }
    }
}

#[derive(Default)]
pub struct EventSource {
    input: EventStream,
}

impl EventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` once stdin is closed
    pub async fn next(&mut self) -> Option<Result<AppEvent>> {
        self.input.next().await.map(|read| {
            read.map(AppEvent::from)
                .map_err(|e| NodeError::Dashboard(format!("terminal input: {}", e)))
        })
    }
}

/// q, Esc or Ctrl-C
pub fn is_quit_event(key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q' | 'Q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}
