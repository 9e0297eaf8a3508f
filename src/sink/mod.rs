//! SMTP sink implementation

pub mod attachment;
pub mod config;
pub mod error;
pub mod response;
pub mod server;
pub mod session;
pub mod stats;
pub mod worker;

pub use attachment::{Attachment, extract_attachments, save_attachments};
pub use config::SinkConfig;
pub use error::SinkError;
pub use response::{SinkResponse, respond};
pub use server::{ShutdownHandle, SinkServer, serve_connection};
pub use session::{SessionAction, SessionState, SinkSession};
pub use stats::{SinkStats, StatsReporter};
pub use worker::{AttachmentJob, AttachmentQueue, AttachmentWorkers};
