use std::fmt;
use std::io::Error;

use derive_setters::Setters;

pub const HELP_TEXT: &str = "
rtv - remote table viewer

  q         Quit
  ?         Show this help
  Esc       Close popup

  Left      Select previous column
  Right     Select next column
  s         Sort ascending by selected column
  S         Sort descending by selected column
  x         Hide selected column
  g         Range of selected column

  a         Show all columns
  n         Show no columns
  r         Refresh
  h         Go back to the first table
  c         Cancel running requests
";

#[derive(Debug, Clone, Setters)]
pub struct RtvConfig {
    pub event_poll_time: u64,
    pub max_column_width: usize,
}

impl Default for RtvConfig {
    fn default() -> Self {
        Self {
            event_poll_time: 100,
            max_column_width: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message {
    Quit,
    MoveLeft,
    MoveRight,
    SortAscending,
    SortDescending,
    HideColumn,
    Histogram,
    AllRows,
    NoRows,
    Refresh,
    Home,
    CancelRequests,
    Help,
    Exit,
}

#[derive(Debug)]
pub enum RtvError {
    IoError(Error),
    JsonError(serde_json::Error),
    WebSocketError(Box<tungstenite::Error>),
    ConnectionClosed,
    InvalidDirective(i32),
}

impl fmt::Display for RtvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtvError::IoError(e) => write!(f, "I/O error: {e}"),
            RtvError::JsonError(e) => write!(f, "JSON error: {e}"),
            RtvError::WebSocketError(e) => write!(f, "websocket error: {e}"),
            RtvError::ConnectionClosed => write!(f, "connection to server closed"),
            RtvError::InvalidDirective(d) => write!(f, "invalid column directive {d}"),
        }
    }
}

impl std::error::Error for RtvError {}

impl From<Error> for RtvError {
    fn from(err: Error) -> Self {
        RtvError::IoError(err)
    }
}

impl From<serde_json::Error> for RtvError {
    fn from(err: serde_json::Error) -> Self {
        RtvError::JsonError(err)
    }
}

impl From<tungstenite::Error> for RtvError {
    fn from(err: tungstenite::Error) -> Self {
        RtvError::WebSocketError(Box::new(err))
    }
}
