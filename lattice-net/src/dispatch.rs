//! Outbound dispatch loop.
//!
//! The dispatcher is the single consumer of a node's outbound queue. It
//! resolves each envelope's destination against the peer set, serializes
//! the envelope once, and hands the frame to the matching link(s). When the
//! outbound queue closes it closes every link exactly once and exits; that
//! queue closure is the only shutdown signal it honors.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use lattice_core::{Destination, Envelope, PeerSet, Pid};

use crate::link::{LinkError, PeerLink};
use crate::wire::{EnvelopeCodec, WireError};

/// Per-envelope dispatch failures. All of them drop the envelope and leave
/// the dispatcher running.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("destination pid {0} is not in the peer set")]
    UnknownDestination(Pid),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Encode(#[from] WireError),
}

/// The outbound dispatch task.
///
/// `links` is index-aligned with `peers`: the link at position `i` targets
/// the peer at position `i`.
#[derive(Debug)]
pub struct Dispatcher {
    local: Pid,
    peers: PeerSet,
    links: Vec<PeerLink>,
    codec: EnvelopeCodec,
    outbound: mpsc::Receiver<Envelope>,
    sent: Arc<AtomicU64>,
}

impl Dispatcher {
    /// Assemble the dispatcher. `links` must be index-aligned with `peers`.
    pub fn new(
        local: Pid,
        peers: PeerSet,
        links: Vec<PeerLink>,
        codec: EnvelopeCodec,
        outbound: mpsc::Receiver<Envelope>,
        sent: Arc<AtomicU64>,
    ) -> Self {
        debug_assert_eq!(peers.len(), links.len());
        Self {
            local,
            peers,
            links,
            codec,
            outbound,
            sent,
        }
    }

    /// Consume the outbound queue until it closes, then close every link.
    pub async fn run(mut self) {
        while let Some(envelope) = self.outbound.recv().await {
            if let Err(err) = self.dispatch(&envelope) {
                match err {
                    DispatchError::Link(_) => {
                        warn!(sender = envelope.sender, %err, "dropping envelope");
                    }
                    DispatchError::UnknownDestination(_) | DispatchError::Encode(_) => {
                        error!(sender = envelope.sender, %err, "dropping envelope");
                    }
                }
            }
        }

        info!(pid = self.local, "outbound queue closed, closing links");
        for link in self.links.drain(..) {
            link.close().await;
        }
    }

    fn dispatch(&self, envelope: &Envelope) -> Result<(), DispatchError> {
        let frame = self.codec.encode(envelope)?;

        match envelope.destination {
            Destination::Broadcast => {
                // Fan out in peer-set order. Each per-peer send stands
                // alone: a refused send is logged and the rest continue.
                for link in &self.links {
                    match link.send(frame.clone()) {
                        Ok(()) => {
                            self.sent.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            warn!(peer = link.peer(), %err, "broadcast send skipped");
                        }
                    }
                }
                Ok(())
            }
            Destination::Unicast(pid) => {
                let index = self
                    .peers
                    .index_of(pid)
                    .ok_or(DispatchError::UnknownDestination(pid))?;
                self.links[index].send(frame)?;
                self.sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }
}
