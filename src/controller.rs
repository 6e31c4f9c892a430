use std::time::Duration;
use tracing::trace;

use crate::domain::{Message, RtvConfig, RtvError};
use crate::model::Model;
use ratatui::crossterm::event::{self, Event, KeyCode};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &RtvConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    /// Wait up to the poll time for a key press. Returning without one lets
    /// the caller handle server replies.
    pub fn handle_event(&self, _model: &Model) -> Result<Option<Message>, RtvError> {
        if event::poll(Duration::from_millis(self.event_poll_time))?
            && let Event::Key(key) = event::read()?
            && key.kind == event::KeyEventKind::Press
        {
            return Ok(self.handle_key(key));
        }
        Ok(None)
    }

    fn handle_key(&self, key: event::KeyEvent) -> Option<Message> {
        let message = match key.code {
            KeyCode::Char('q') => Some(Message::Quit),
            KeyCode::Char('?') => Some(Message::Help),
            KeyCode::Esc => Some(Message::Exit),
            KeyCode::Left => Some(Message::MoveLeft),
            KeyCode::Right => Some(Message::MoveRight),
            KeyCode::Char('s') => Some(Message::SortAscending),
            KeyCode::Char('S') => Some(Message::SortDescending),
            KeyCode::Char('x') => Some(Message::HideColumn),
            KeyCode::Char('g') => Some(Message::Histogram),
            KeyCode::Char('a') => Some(Message::AllRows),
            KeyCode::Char('n') => Some(Message::NoRows),
            KeyCode::Char('r') => Some(Message::Refresh),
            KeyCode::Char('h') => Some(Message::Home),
            KeyCode::Char('c') => Some(Message::CancelRequests),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}
