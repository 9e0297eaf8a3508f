//! Process-wide counters and the periodic reporter

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{info, warn};

/// Counters shared between the acceptor, sessions and workers.
///
/// Relaxed ordering throughout: readers only need an eventually accurate
/// figure.
#[derive(Debug, Default)]
pub struct SinkStats {
    accepted_connections: AtomicUsize,
    messages_received: AtomicUsize,
    attachments_saved: AtomicUsize,
}

impl SinkStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_accepted(&self) {
        self.accepted_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn attachments_saved_add(&self, count: usize) {
        self.attachments_saved.fetch_add(count, Ordering::Relaxed);
    }

    pub fn accepted_connections(&self) -> usize {
        self.accepted_connections.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> usize {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn attachments_saved(&self) -> usize {
        self.attachments_saved.load(Ordering::Relaxed)
    }
}

/// Background thread logging the counters at a fixed interval
#[derive(Debug)]
pub struct StatsReporter {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl StatsReporter {
    /// Start reporting every `interval` until [`StatsReporter::stop`] is called
    pub fn spawn(stats: Arc<SinkStats>, interval: Duration) -> std::io::Result<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("sink-stats".to_owned())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => info!(
                            "Stats: {} connections, {} messages, {} attachments saved",
                            stats.accepted_connections(),
                            stats.messages_received(),
                            stats.attachments_saved()
                        ),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;

        Ok(Self { stop, handle })
    }

    /// Stop the reporter and wait for its thread to exit
    pub fn stop(self) {
        // Err only if the reporter thread is already gone
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            warn!("Stats reporter panicked");
        }
    }
}
