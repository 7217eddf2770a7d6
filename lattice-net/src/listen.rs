//! Inbound listen loop.
//!
//! The listener owns the node's one bound endpoint. An accept loop hands
//! each inbound socket to a reader task; readers decode length-prefixed
//! frames and funnel the envelopes into the listen loop, which pushes them
//! onto the inbound queue and counts them.
//!
//! The listen loop terminates itself: if no frame arrives within the idle
//! window, it closes the inbound queue and releases the endpoint. A
//! disabled idle window (`None`) waits indefinitely. There is no external
//! cancel signal; the loop also winds down if the inbox consumer is gone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use lattice_core::{Envelope, Pid};

use crate::wire::{EnvelopeCodec, WireError};

/// Decoded envelopes buffered between socket readers and the listen loop.
const READER_QUEUE_DEPTH: usize = 64;

/// The inbound listen task.
#[derive(Debug)]
pub struct Listener {
    local: Pid,
    socket: TcpListener,
    codec: EnvelopeCodec,
    idle_timeout: Option<Duration>,
    inbound: mpsc::Sender<Envelope>,
    received: Arc<AtomicU64>,
}

impl Listener {
    /// Assemble the listener around an already-bound socket.
    pub fn new(
        local: Pid,
        socket: TcpListener,
        codec: EnvelopeCodec,
        idle_timeout: Option<Duration>,
        inbound: mpsc::Sender<Envelope>,
        received: Arc<AtomicU64>,
    ) -> Self {
        Self {
            local,
            socket,
            codec,
            idle_timeout,
            inbound,
            received,
        }
    }

    /// Receive until the idle window elapses with no frame, then close the
    /// inbound queue and release the endpoint.
    pub async fn run(self) {
        let Listener {
            local,
            socket,
            codec,
            idle_timeout,
            inbound,
            received,
        } = self;

        let (frames_tx, mut frames_rx) = mpsc::channel(READER_QUEUE_DEPTH);
        let accept = tokio::spawn(accept_loop(socket, codec, frames_tx));

        loop {
            let next = match idle_timeout {
                Some(window) => match timeout(window, frames_rx.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        info!(pid = local, "idle window elapsed, closing inbox");
                        break;
                    }
                },
                None => frames_rx.recv().await,
            };

            match next {
                Some(envelope) => {
                    if inbound.send(envelope).await.is_err() {
                        debug!(pid = local, "inbox receiver dropped, stopping listener");
                        break;
                    }
                    received.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }

        // Dropping the accept task tears down the endpoint and every
        // per-socket reader; dropping `inbound` closes the inbox.
        accept.abort();
    }
}

async fn accept_loop(socket: TcpListener, codec: EnvelopeCodec, frames: mpsc::Sender<Envelope>) {
    let mut readers = JoinSet::new();
    loop {
        while readers.try_join_next().is_some() {}

        match socket.accept().await {
            Ok((stream, remote)) => {
                debug!(%remote, "inbound connection accepted");
                readers.spawn(read_frames(stream, codec.clone(), frames.clone()));
            }
            Err(err) => {
                warn!(%err, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn read_frames(mut stream: TcpStream, codec: EnvelopeCodec, frames: mpsc::Sender<Envelope>) {
    let remote = stream.peer_addr().ok();
    loop {
        match codec.read_envelope(&mut stream).await {
            Ok(envelope) => {
                if frames.send(envelope).await.is_err() {
                    return;
                }
            }
            Err(WireError::Malformed(err)) => {
                // The frame length was honored, so the stream is still in
                // sync; report the bad frame and keep reading.
                error!(?remote, %err, "discarding malformed frame");
            }
            Err(WireError::FrameTooLarge { size, max }) => {
                error!(?remote, size, max, "oversized frame, dropping connection");
                return;
            }
            Err(_) => {
                debug!(?remote, "inbound connection closed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    async fn wait_for_count(counter: &AtomicU64, expected: u64) {
        for _ in 0..200 {
            if counter.load(Ordering::Relaxed) == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "count stuck at {} (expected {})",
            counter.load(Ordering::Relaxed),
            expected
        );
    }

    async fn start_listener(
        idle: Option<Duration>,
    ) -> (String, mpsc::Receiver<Envelope>, Arc<AtomicU64>) {
        let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap().to_string();
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let received = Arc::new(AtomicU64::new(0));

        let listener = Listener::new(
            1,
            socket,
            EnvelopeCodec::new(),
            idle,
            inbound_tx,
            Arc::clone(&received),
        );
        tokio::spawn(listener.run());

        (addr, inbound_rx, received)
    }

    #[tokio::test]
    async fn test_idle_timeout_closes_inbox() {
        let window = Duration::from_millis(200);
        let (_addr, mut inbound, _received) = start_listener(Some(window)).await;

        let started = tokio::time::Instant::now();
        assert!(inbound.recv().await.is_none());
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(150), "closed too early");
        assert!(elapsed < Duration::from_secs(2), "closed too late");
    }

    #[tokio::test]
    async fn test_frames_are_delivered_and_counted() {
        let (addr, mut inbound, received) = start_listener(Some(Duration::from_secs(5))).await;
        let codec = EnvelopeCodec::new();

        let mut stream = TcpStream::connect(&addr).await.unwrap();
        for seq in 0..3i64 {
            let frame = codec
                .encode(&Envelope::unicast(1, 2, "m").with_correlation_id(seq))
                .unwrap();
            stream.write_all(&frame).await.unwrap();
        }

        for seq in 0..3i64 {
            let envelope = inbound.recv().await.unwrap();
            assert_eq!(envelope.correlation_id, seq);
        }
        wait_for_count(&received, 3).await;
    }

    #[tokio::test]
    async fn test_malformed_frame_is_discarded_not_forwarded() {
        let (addr, mut inbound, received) = start_listener(Some(Duration::from_secs(5))).await;
        let codec = EnvelopeCodec::new();

        let mut stream = TcpStream::connect(&addr).await.unwrap();

        let garbage = b"{]";
        let mut bad = (garbage.len() as u32).to_be_bytes().to_vec();
        bad.extend_from_slice(garbage);
        stream.write_all(&bad).await.unwrap();

        let good = codec.encode(&Envelope::unicast(1, 2, "real")).unwrap();
        stream.write_all(&good).await.unwrap();

        // Only the well-formed envelope comes through.
        let envelope = inbound.recv().await.unwrap();
        assert_eq!(envelope.payload, serde_json::Value::from("real"));
        wait_for_count(&received, 1).await;
    }
}
