//! Per-connection protocol state

use crate::sink::response::SinkResponse;

/// Where the session is in the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Reading commands; everything is acknowledged
    #[default]
    Command,
    /// DATA received - collecting body lines until a lone "."
    BodyCapture,
}

/// What the connection loop should do after a line has been handled
#[derive(Debug, PartialEq, Eq)]
pub enum SessionAction {
    /// Send the reply and keep reading
    Reply(SinkResponse),
    /// Body line captured; nothing is sent back
    Silent,
    /// The body is complete: send the reply, then hand the lines off
    Completed {
        response: SinkResponse,
        body: Vec<String>,
    },
    /// Send the reply and close the connection
    Close(SinkResponse),
}

/// Manages the state and captured body for a single connection
#[derive(Debug, Default)]
pub struct SinkSession {
    /// Current state of the session
    state: SessionState,
    /// Raw lines received since the last DATA
    body: Vec<String>,
}

impl SinkSession {
    /// Create a new session in command state
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Lines captured so far for the current message
    pub fn body(&self) -> &[String] {
        &self.body
    }

    /// Process one line with its terminator already stripped.
    ///
    /// Matching is done on a trimmed, lower-cased copy. The line itself is
    /// what gets captured, so encoded payloads keep their case.
    pub fn handle_line(&mut self, line: &str) -> SessionAction {
        let command = normalize(line);

        if command == "quit" {
            return SessionAction::Close(SinkResponse::quit());
        }

        match self.state {
            SessionState::Command => {
                if command.starts_with("data") {
                    self.state = SessionState::BodyCapture;
                    self.body.clear();
                    SessionAction::Reply(SinkResponse::data_start())
                } else {
                    SessionAction::Reply(SinkResponse::ok())
                }
            }
            SessionState::BodyCapture => {
                if command == "." {
                    self.state = SessionState::Command;
                    SessionAction::Completed {
                        response: SinkResponse::queued(),
                        body: std::mem::take(&mut self.body),
                    }
                } else {
                    self.body.push(line.to_owned());
                    SessionAction::Silent
                }
            }
        }
    }
}

/// Lower-cased, trimmed form of a line used for command matching
pub fn normalize(line: &str) -> String {
    line.trim().to_lowercase()
}
