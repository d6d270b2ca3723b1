//! Bounded chunk handoff between the receive and playback threads
//!
//! Chunks own their bytes, so nothing in the queue aliases the ring buffer.
//! Closing the [`QueueShutdown`] handle wakes both a producer blocked on a
//! full queue and a consumer blocked on an empty one.

use bytes::Bytes;
use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError, TrySendError};
use parking_lot::Mutex;

use crate::config::QueueFullPolicy;
use crate::error::PipelineError;

/// Fixed-size block of PCM bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    data: Bytes,
    sequence: u64,
}

impl Chunk {
    pub fn new(data: Bytes, sequence: u64) -> Self {
        Self { data, sequence }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Position in the producer's output, starting at 0
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// Create a queue holding at most `capacity` chunks
pub fn handoff_queue(
    capacity: usize,
    policy: QueueFullPolicy,
) -> (ChunkSender, ChunkReceiver, QueueShutdown) {
    let (tx, rx) = bounded(capacity);
    let (cancel_tx, cancel_rx) = bounded::<()>(0);

    (
        ChunkSender {
            tx,
            cancelled: cancel_rx.clone(),
            policy,
        },
        ChunkReceiver {
            rx,
            cancelled: cancel_rx,
        },
        QueueShutdown {
            cancel: Mutex::new(Some(cancel_tx)),
        },
    )
}

/// Producer half
pub struct ChunkSender {
    tx: Sender<Chunk>,
    cancelled: Receiver<()>,
    policy: QueueFullPolicy,
}

impl ChunkSender {
    /// Enqueue a chunk according to the queue-full policy
    ///
    /// `Block` waits for space or shutdown. `Drop` fails at once with
    /// [`PipelineError::QueueFull`], handing nothing to the queue.
    pub fn push(&self, chunk: Chunk) -> Result<(), PipelineError> {
        if is_cancelled(&self.cancelled) {
            return Err(PipelineError::QueueClosed);
        }

        match self.policy {
            QueueFullPolicy::Block => select! {
                send(self.tx, chunk) -> res => res.map_err(|_| PipelineError::QueueClosed),
                recv(self.cancelled) -> _ => Err(PipelineError::QueueClosed),
            },
            QueueFullPolicy::Drop => self.tx.try_send(chunk).map_err(|e| match e {
                TrySendError::Full(_) => PipelineError::QueueFull,
                TrySendError::Disconnected(_) => PipelineError::QueueClosed,
            }),
        }
    }

    pub fn policy(&self) -> QueueFullPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tx.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(0)
    }
}

/// Consumer half
pub struct ChunkReceiver {
    rx: Receiver<Chunk>,
    cancelled: Receiver<()>,
}

impl ChunkReceiver {
    /// Block for the next chunk
    ///
    /// Returns `None` after shutdown, or once every producer is gone and
    /// the queue has drained.
    pub fn pop(&self) -> Option<Chunk> {
        if is_cancelled(&self.cancelled) {
            return None;
        }
        select! {
            recv(self.rx) -> msg => msg.ok(),
            recv(self.cancelled) -> _ => None,
        }
    }

    pub fn try_pop(&self) -> Option<Chunk> {
        if is_cancelled(&self.cancelled) {
            return None;
        }
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Cancels both halves of a queue
pub struct QueueShutdown {
    cancel: Mutex<Option<Sender<()>>>,
}

impl QueueShutdown {
    /// Wake any blocked push or pop; idempotent
    pub fn shutdown(&self) {
        self.cancel.lock().take();
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.lock().is_none()
    }
}

fn is_cancelled(cancelled: &Receiver<()>) -> bool {
    matches!(cancelled.try_recv(), Err(TryRecvError::Disconnected))
}
