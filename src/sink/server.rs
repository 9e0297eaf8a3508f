//! Connection acceptor and the per-connection read loop

use crate::sink::config::SinkConfig;
use crate::sink::error::SinkError;
use crate::sink::response::SinkResponse;
use crate::sink::session::{SessionAction, SessionState, SinkSession, normalize};
use crate::sink::stats::{SinkStats, StatsReporter};
use crate::sink::worker::{AttachmentJob, AttachmentQueue, AttachmentWorkers};

use log::{debug, error, info, warn};
use std::io::{BufRead, BufReader, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts connections and runs one session thread per client
#[derive(Debug)]
pub struct SinkServer {
    listener: TcpListener,
    config: Arc<SinkConfig>,
    stats: Arc<SinkStats>,
    shutdown: Arc<AtomicBool>,
}

impl SinkServer {
    /// Bind to the interface and port named in `config`
    pub fn bind(config: SinkConfig) -> Result<Self, SinkError> {
        config.validate()?;
        let listener = TcpListener::bind(config.listen_addr())?;
        Self::with_listener(listener, config)
    }

    /// Serve on an already bound listener
    pub fn with_listener(listener: TcpListener, config: SinkConfig) -> Result<Self, SinkError> {
        config.validate()?;
        Ok(Self {
            listener,
            config: Arc::new(config),
            stats: Arc::new(SinkStats::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SinkError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<SinkStats> {
        Arc::clone(&self.stats)
    }

    /// Handle that stops [`SinkServer::run`] from another thread
    pub fn shutdown_handle(&self) -> Result<ShutdownHandle, SinkError> {
        Ok(ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
            addr: self.local_addr()?,
        })
    }

    /// Accept connections until shut down (blocking).
    ///
    /// On shutdown, queued attachment work is finished before returning.
    /// Sessions still open are left to run on their own threads.
    pub fn run(self) -> Result<(), SinkError> {
        info!("SMTP sink listening on {}", self.local_addr()?);

        let workers = if self.config.save_attachments {
            Some(AttachmentWorkers::spawn(
                self.config.attachment_workers,
                self.config.attachment_queue,
                self.config.attachment_dir.clone(),
                Arc::clone(&self.stats),
            )?)
        } else {
            None
        };
        let reporter = StatsReporter::spawn(Arc::clone(&self.stats), self.config.stats_interval)?;

        for stream in self.listener.incoming() {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            match stream {
                Ok(stream) => {
                    self.stats.connection_accepted();
                    let config = Arc::clone(&self.config);
                    let stats = Arc::clone(&self.stats);
                    let queue = workers.as_ref().map(AttachmentWorkers::queue);

                    let spawned = thread::Builder::new()
                        .name("sink-session".to_owned())
                        .spawn(move || handle_client(stream, &config, queue.as_ref(), &stats));
                    if let Err(e) = spawned {
                        error!("Could not start session thread: {e}");
                    }
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                    // Errors like EMFILE repeat until a descriptor frees up
                    thread::sleep(ACCEPT_BACKOFF);
                }
            }
        }

        info!("SMTP sink shutting down");
        if let Some(workers) = workers {
            workers.shutdown();
        }
        reporter.stop();
        Ok(())
    }
}

/// Stops a running [`SinkServer`]
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    addr: SocketAddr,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.flag.swap(true, Ordering::SeqCst) {
            return;
        }
        // The accept loop only notices the flag once accept() returns
        let mut addr = self.addr;
        if addr.ip().is_unspecified() {
            addr.set_ip(match addr.ip() {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
            });
        }
        if let Err(e) = TcpStream::connect(addr) {
            warn!("Could not wake accept loop on {addr}: {e}");
        }
    }
}

/// Run one client connection to completion
fn handle_client(
    stream: TcpStream,
    config: &SinkConfig,
    queue: Option<&AttachmentQueue>,
    stats: &SinkStats,
) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_owned());
    info!("Accepted connection from {peer}");

    let result = stream
        .try_clone()
        .map_err(SinkError::from)
        .and_then(|read_half| {
            let mut reader = BufReader::new(read_half);
            let mut writer = stream;
            serve_connection(&mut reader, &mut writer, &peer, config, queue, stats)
        });

    match result {
        Ok(()) => {}
        Err(e) if e.is_disconnect() => debug!("{peer}: {e}"),
        Err(e) => warn!("Error on connection {peer}: {e}"),
    }
    info!("Closing connection to {peer}");
}

/// Greet the client, then read and answer lines until QUIT or end of stream.
///
/// Completed bodies go to `queue`, when one is given, after the 250 reply
/// is sent. The hand-off never waits: a full or closed queue is logged and
/// the body skipped. Read and write failures end the session and are
/// returned.
pub fn serve_connection<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
    peer: &str,
    config: &SinkConfig,
    queue: Option<&AttachmentQueue>,
    stats: &SinkStats,
) -> Result<(), SinkError> {
    SinkResponse::greeting(&config.hostname).write_to(writer)?;

    let mut session = SinkSession::new();
    let mut line_buffer = Vec::new();
    loop {
        line_buffer.clear();
        if reader.read_until(b'\n', &mut line_buffer)? == 0 {
            debug!("{peer}: connection closed by client");
            return Ok(());
        }

        let text = String::from_utf8_lossy(&line_buffer);
        let line = text.trim_end_matches(['\r', '\n']);

        if let Some(logged) = loggable_line(session.state(), line, config.log_body) {
            info!("{peer}: {logged}");
        }

        match session.handle_line(line) {
            SessionAction::Reply(response) => response.write_to(writer)?,
            SessionAction::Silent => {}
            SessionAction::Completed { response, body } => {
                response.write_to(writer)?;
                stats.message_received();
                if let Some(queue) = queue {
                    let job = AttachmentJob {
                        peer: peer.to_owned(),
                        body,
                    };
                    if let Err(e) = queue.submit(job) {
                        warn!("{peer}: attachments not scanned: {e}");
                    }
                }
            }
            SessionAction::Close(response) => {
                response.write_to(writer)?;
                return Ok(());
            }
        }
    }
}

/// Text to log for a received line, if any.
///
/// Commands are logged in normalized, quoted form. Body lines are logged
/// as received, and only when `log_body` is set.
fn loggable_line(state: SessionState, line: &str, log_body: bool) -> Option<String> {
    match state {
        SessionState::Command => Some(format!("{:?}", normalize(line))),
        SessionState::BodyCapture if log_body => Some(line.to_owned()),
        SessionState::BodyCapture => None,
    }
}
