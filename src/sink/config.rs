//! Server configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sink::error::SinkError;

/// Immutable settings shared by the acceptor, every session and the
/// attachment workers. Built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    /// Interface to listen on
    pub listen_interface: String,
    /// Port to listen on
    pub listen_port: u16,
    /// Hostname announced in the greeting
    pub hostname: String,
    /// Log every body line as it arrives
    pub log_body: bool,
    /// Decode attachments found in message bodies and write them to disk
    pub save_attachments: bool,
    /// Where decoded attachments are written
    pub attachment_dir: PathBuf,
    /// Number of threads decoding and writing attachments
    pub attachment_workers: usize,
    /// Bodies that may wait for a worker before sessions block on hand-off
    pub attachment_queue: usize,
    /// How often the connection count is logged
    pub stats_interval: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            listen_interface: "localhost".to_owned(),
            listen_port: 25,
            hostname: "localhost".to_owned(),
            log_body: false,
            save_attachments: false,
            attachment_dir: PathBuf::from("."),
            attachment_workers: 2,
            attachment_queue: 64,
            stats_interval: Duration::from_secs(5),
        }
    }
}

impl SinkConfig {
    /// Default configuration greeting with `hostname`
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_owned(),
            ..Self::default()
        }
    }

    pub fn with_listen(mut self, interface: &str, port: u16) -> Self {
        self.listen_interface = interface.to_owned();
        self.listen_port = port;
        self
    }

    pub fn with_log_body(mut self, log_body: bool) -> Self {
        self.log_body = log_body;
        self
    }

    pub fn with_save_attachments(mut self, save: bool) -> Self {
        self.save_attachments = save;
        self
    }

    pub fn with_attachment_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.attachment_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_attachment_workers(mut self, workers: usize) -> Self {
        self.attachment_workers = workers;
        self
    }

    pub fn with_attachment_queue(mut self, capacity: usize) -> Self {
        self.attachment_queue = capacity;
        self
    }

    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// `interface:port`, suitable for `TcpListener::bind`
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_interface, self.listen_port)
    }

    /// Reject settings that would leave the server unable to make progress
    pub fn validate(&self) -> Result<(), SinkError> {
        if self.attachment_workers == 0 {
            return Err(SinkError::InvalidConfig(
                "at least one attachment worker is required".to_owned(),
            ));
        }
        if self.attachment_queue == 0 {
            return Err(SinkError::InvalidConfig(
                "attachment queue capacity must be positive".to_owned(),
            ));
        }
        if self.stats_interval.is_zero() {
            return Err(SinkError::InvalidConfig(
                "stats interval must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}
