//! Outbound peer links.
//!
//! One `PeerLink` per peer, created eagerly at node construction in peer-set
//! order. Each link is a small actor task owning one outbound TCP stream:
//! it connects in the background, retries on a fixed delay while the peer is
//! unreachable, and writes the frames handed to it in FIFO order, so frame
//! order per sender→receiver pair is preserved.
//!
//! Sends never block the caller: a frame is either accepted onto the link's
//! bounded buffer or refused with a typed error. Frames addressed to an
//! unreachable peer are discarded, not replayed when the peer comes back;
//! a peer that starts late sees only traffic sent after it is up.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use lattice_core::Pid;

/// Frames buffered per link before sends start failing with `QueueFull`.
const LINK_QUEUE_DEPTH: usize = 1024;

/// Per-send failures. None of these stop the dispatcher: one peer's
/// trouble must not halt delivery to the rest of a broadcast.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("peer {0} is unreachable")]
    PeerUnreachable(Pid),

    #[error("link to peer {0} is closed")]
    LinkClosed(Pid),

    #[error("send queue for peer {0} is full")]
    QueueFull(Pid),
}

/// Cloneable view of a link's connectivity.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    peer: Pid,
    connected: Arc<AtomicBool>,
}

impl LinkHandle {
    /// The pid this link targets.
    pub fn peer(&self) -> Pid {
        self.peer
    }

    /// Whether the underlying stream is currently established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

/// An outbound, self-healing link to one peer.
#[derive(Debug)]
pub struct PeerLink {
    peer: Pid,
    frames: mpsc::Sender<Vec<u8>>,
    connected: Arc<AtomicBool>,
    actor: JoinHandle<()>,
}

impl PeerLink {
    /// Spawn the link actor. Returns immediately; the connection is
    /// established in the background and self-heals as the peer comes and
    /// goes.
    pub fn spawn(peer: Pid, addr: String, reconnect_delay: Duration) -> Self {
        let (frames_tx, frames_rx) = mpsc::channel(LINK_QUEUE_DEPTH);
        let connected = Arc::new(AtomicBool::new(false));
        let actor = tokio::spawn(run_link(
            peer,
            addr,
            reconnect_delay,
            frames_rx,
            Arc::clone(&connected),
        ));

        Self {
            peer,
            frames: frames_tx,
            connected,
            actor,
        }
    }

    /// The pid this link targets.
    pub fn peer(&self) -> Pid {
        self.peer
    }

    /// A cloneable connectivity view.
    pub fn handle(&self) -> LinkHandle {
        LinkHandle {
            peer: self.peer,
            connected: Arc::clone(&self.connected),
        }
    }

    /// Whether the underlying stream is currently established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Hand a frame to the link.
    ///
    /// Fails fast instead of blocking: `PeerUnreachable` while the stream
    /// is down, `QueueFull` when the buffer is at capacity. An accepted
    /// frame is written in order behind earlier accepted frames.
    pub fn send(&self, frame: Vec<u8>) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Err(LinkError::PeerUnreachable(self.peer));
        }

        match self.frames.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(LinkError::QueueFull(self.peer)),
            Err(TrySendError::Closed(_)) => Err(LinkError::LinkClosed(self.peer)),
        }
    }

    /// Close the link: already-accepted frames drain to the socket, the
    /// stream shuts down, and the actor exits. Consuming `self` makes the
    /// close happen exactly once.
    pub async fn close(self) {
        drop(self.frames);
        if self.actor.await.is_err() {
            warn!(peer = self.peer, "link actor panicked during close");
        }
    }
}

enum PumpEnd {
    /// All senders dropped and the buffer drained.
    Closed,
    WriteFailed(io::Error),
}

async fn run_link(
    peer: Pid,
    addr: String,
    reconnect_delay: Duration,
    mut frames: mpsc::Receiver<Vec<u8>>,
    connected: Arc<AtomicBool>,
) {
    loop {
        match TcpStream::connect(&addr).await {
            Ok(mut stream) => {
                connected.store(true, Ordering::Release);
                info!(peer, %addr, "link established");

                let end = pump(&mut stream, &mut frames).await;
                connected.store(false, Ordering::Release);

                match end {
                    PumpEnd::Closed => {
                        let _ = stream.shutdown().await;
                        debug!(peer, "link closed");
                        return;
                    }
                    PumpEnd::WriteFailed(err) => {
                        warn!(peer, %err, "link write failed, reconnecting");
                    }
                }
            }
            Err(err) => {
                debug!(peer, %addr, %err, "connect failed");

                // No replay for an unreachable peer: anything buffered at
                // this point was addressed to it while it was down.
                while frames.try_recv().is_ok() {}

                match timeout(reconnect_delay, frames.recv()).await {
                    Err(_) => {}
                    Ok(None) => return,
                    Ok(Some(_frame)) => {
                        warn!(peer, "dropping frame for unreachable peer");
                    }
                }
            }
        }
    }
}

async fn pump(stream: &mut TcpStream, frames: &mut mpsc::Receiver<Vec<u8>>) -> PumpEnd {
    while let Some(frame) = frames.recv().await {
        if let Err(err) = stream.write_all(&frame).await {
            return PumpEnd::WriteFailed(err);
        }
    }
    PumpEnd::Closed
}
