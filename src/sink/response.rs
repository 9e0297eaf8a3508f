//! Reply lines sent back to the client

use std::io::Write;

use crate::sink::error::SinkError;

/// Placeholder queue id reported for every accepted message
pub const QUEUE_ID: &str = "31337";

/// A single-line reply: a three digit status code and a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkResponse {
    /// The status code (e.g. 220, 250, 354)
    pub code: u16,
    /// The human-readable message
    pub message: String,
}

impl SinkResponse {
    /// Create a new response
    pub fn new(code: u16, message: &str) -> Self {
        Self {
            code,
            message: message.to_owned(),
        }
    }

    /// Greeting sent as soon as a client connects (220)
    pub fn greeting(hostname: &str) -> Self {
        Self::new(220, &format!("{hostname} SMTP mail-sink"))
    }

    /// Generic acknowledgment (250)
    pub fn ok() -> Self {
        Self::new(250, "Ok")
    }

    /// Acknowledgment of a completed message body (250)
    pub fn queued() -> Self {
        Self::new(250, &format!("Ok, queued as {QUEUE_ID}"))
    }

    /// Switch to body capture (354)
    pub fn data_start() -> Self {
        Self::new(354, "End data with <CR><LF>.<CR><LF>.")
    }

    /// Reply to QUIT (221)
    pub fn quit() -> Self {
        Self::new(221, "Bye")
    }

    /// Format the response for sending over the wire
    pub fn format(&self) -> String {
        format!("{} {}\r\n", self.code, self.message)
    }

    /// Write this response as one line and flush it
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), SinkError> {
        writer.write_all(self.format().as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

/// Write `"<code> <message>"` to the client.
pub fn respond<W: Write>(writer: &mut W, code: u16, message: &str) -> Result<(), SinkError> {
    SinkResponse::new(code, message).write_to(writer)
}
