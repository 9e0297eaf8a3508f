//! Worker pool that decodes and writes attachments off the session threads

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use log::{debug, error};

use crate::sink::attachment::save_attachments;
use crate::sink::error::SinkError;
use crate::sink::stats::SinkStats;

/// A completed message body waiting to be scanned
#[derive(Debug)]
pub struct AttachmentJob {
    /// Peer the body came from, for logging
    pub peer: String,
    pub body: Vec<String>,
}

/// Cloneable handle sessions use to hand bodies to the workers.
///
/// Every clone shares one sender slot; closing the queue empties the slot, so
/// the channel disconnects as soon as the last in-flight submit returns.
#[derive(Clone, Debug)]
pub struct AttachmentQueue {
    sender: Arc<RwLock<Option<Sender<AttachmentJob>>>>,
}

impl AttachmentQueue {
    /// Open a queue holding at most `capacity` bodies
    pub fn bounded(capacity: usize) -> (Self, Receiver<AttachmentJob>) {
        let (sender, receiver) = channel::bounded(capacity);
        let queue = Self {
            sender: Arc::new(RwLock::new(Some(sender))),
        };
        (queue, receiver)
    }

    /// Queue a body for scanning without waiting.
    ///
    /// Fails with [`SinkError::QueueFull`] when every slot is taken and with
    /// [`SinkError::WorkersStopped`] once the queue has been closed.
    pub fn submit(&self, job: AttachmentJob) -> Result<(), SinkError> {
        let slot = self
            .sender
            .read()
            .map_err(|_| SinkError::WorkersStopped)?;
        let sender = slot.as_ref().ok_or(SinkError::WorkersStopped)?;

        sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::QueueFull,
            TrySendError::Disconnected(_) => SinkError::WorkersStopped,
        })
    }

    /// Refuse further bodies. Bodies already accepted stay queued.
    pub fn close(&self) {
        match self.sender.write() {
            Ok(mut slot) => {
                slot.take();
            }
            Err(poisoned) => {
                poisoned.into_inner().take();
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().map(|slot| slot.is_none()).unwrap_or(true)
    }
}

/// Fixed set of threads draining a bounded queue of bodies
pub struct AttachmentWorkers {
    queue: AttachmentQueue,
    workers: Vec<JoinHandle<()>>,
}

impl AttachmentWorkers {
    /// Start `count` workers writing into `dir`
    pub fn spawn(
        count: usize,
        capacity: usize,
        dir: PathBuf,
        stats: Arc<SinkStats>,
    ) -> Result<Self, SinkError> {
        let (queue, receiver) = AttachmentQueue::bounded(capacity);

        let mut workers = Vec::with_capacity(count);
        for id in 0..count {
            let receiver = receiver.clone();
            let dir = dir.clone();
            let stats = Arc::clone(&stats);
            let handle = thread::Builder::new()
                .name(format!("sink-attach-{id}"))
                .spawn(move || run_worker(id, receiver, &dir, &stats))?;
            workers.push(handle);
        }

        Ok(Self { queue, workers })
    }

    pub fn queue(&self) -> AttachmentQueue {
        self.queue.clone()
    }

    /// Close the queue, let the workers finish every body accepted so far,
    /// then join them.
    pub fn shutdown(self) {
        self.queue.close();
        for handle in self.workers {
            if handle.join().is_err() {
                error!("Attachment worker panicked");
            }
        }
    }
}

fn run_worker(id: usize, receiver: Receiver<AttachmentJob>, dir: &Path, stats: &SinkStats) {
    // Ends once the queue is closed and empty
    for job in receiver.iter() {
        debug!(
            "Attachment worker {id}: scanning {} lines from {}",
            job.body.len(),
            job.peer
        );
        let saved = save_attachments(&job.body, dir);
        stats.attachments_saved_add(saved);
    }
}
