//! # mail-sink
//!
//! mail-sink is a permissive SMTP responder for testing code that sends mail.
//!
//! It accepts every connection, answers almost every line with `250 Ok` and,
//! when asked to, pulls base64 attachments out of message bodies and writes
//! them to disk.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mail_sink::{SinkConfig, SinkServer};
//! use std::thread;
//!
//! let config = SinkConfig::new("test.local")
//!     .with_listen("127.0.0.1", 2525)
//!     .with_save_attachments(true)
//!     .with_attachment_dir("/tmp");
//!
//! let server = SinkServer::bind(config).unwrap();
//! let shutdown = server.shutdown_handle().unwrap();
//! let running = thread::spawn(move || server.run());
//!
//! // Application sends email to localhost:2525
//! // ...
//!
//! // Stop accepting, finish writing attachments
//! shutdown.shutdown();
//! running.join().unwrap().unwrap();
//! ```
//!
//! ## Protocol
//!
//! - Greeting: `220 <hostname> SMTP mail-sink`
//! - `QUIT` (any case, any state): `221 Bye`, connection closed
//! - A line starting with `DATA`: `354 End data with <CR><LF>.<CR><LF>.`
//! - `.` after `DATA`: `250 Ok, queued as 31337`
//! - Body lines: no reply
//! - Anything else: `250 Ok`
//!
//! ## Attachments
//!
//! Bodies are scanned with a few heuristics rather than a MIME parser. A
//! `filename="..."` marker names the attachment, a
//! `Content-Transfer-Encoding: base64` line starts the payload, and a line
//! starting with `--` ends it. See [`extract_attachments`].
//!
//! ## Notes
//!
//! - Nothing is ever rejected, validated or delivered.
//! - SMTP authentication is not supported.
//! - SSL/TLS connection is not supported.
//! - Attachments with the same name overwrite each other.

mod sink;

pub use sink::{
    Attachment, AttachmentJob, AttachmentQueue, AttachmentWorkers, SessionAction, SessionState,
    ShutdownHandle, SinkConfig, SinkError, SinkResponse, SinkServer, SinkSession, SinkStats,
    StatsReporter, extract_attachments, respond, save_attachments, serve_connection,
};
