//! Error types for the mail sink

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid base64 payload for {filename}: {source}")]
    Decode {
        filename: String,
        source: base64::DecodeError,
    },

    #[error("Could not write attachment {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Attachment workers have stopped")]
    WorkersStopped,

    #[error("Attachment queue is full")]
    QueueFull,
}

impl SinkError {
    /// Whether the error came from the peer going away rather than from us.
    pub fn is_disconnect(&self) -> bool {
        match self {
            SinkError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
