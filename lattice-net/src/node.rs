//! The node handle: construction, the public surface, and shutdown.
//!
//! Constructing a [`Node`] resolves membership, binds the inbound endpoint,
//! opens one outbound link per peer, and starts the two long-running tasks
//! (dispatcher and listener), in that order. Any failure before the tasks
//! start aborts construction; no partial node is ever returned.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use lattice_core::{ClusterConfig, ConfigError, Envelope, NodeIdentity, PeerSet, Pid};

use crate::dispatch::Dispatcher;
use crate::link::{LinkHandle, PeerLink};
use crate::listen::Listener;
use crate::membership::{Membership, MembershipError};
use crate::wire::EnvelopeCodec;

/// Idle window after which the listener closes the inbox.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(2);

/// Delay between connect attempts to an unreachable peer.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Capacity of the outbound and inbound queues.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Fatal construction errors. Anything that goes wrong after construction
/// is per-message and surfaces through logs and counters instead.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("cluster configuration error: {0}")]
    Cluster(#[from] ConfigError),

    #[error("membership error: {0}")]
    Membership(#[from] MembershipError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("node configuration error: {0}")]
    Config(String),
}

/// Runtime configuration for one node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// This node's pid; must be present in the cluster configuration.
    pub pid: Pid,
    /// The static cluster topology.
    pub cluster: ClusterConfig,
    /// Listener idle window; `None` waits for frames indefinitely.
    pub idle_timeout: Option<Duration>,
    /// Delay between connect attempts to an unreachable peer.
    pub reconnect_delay: Duration,
    /// Maximum wire frame body size.
    pub max_frame_size: usize,
    /// Capacity of the outbound and inbound queues.
    pub queue_depth: usize,
}

impl NodeConfig {
    /// Create a new config builder.
    pub fn builder() -> NodeConfigBuilder {
        NodeConfigBuilder::default()
    }
}

/// Builder for [`NodeConfig`].
#[derive(Debug, Default)]
pub struct NodeConfigBuilder {
    pid: Option<Pid>,
    cluster: Option<ClusterConfig>,
    idle_timeout: Option<Option<Duration>>,
    reconnect_delay: Option<Duration>,
    max_frame_size: Option<usize>,
    queue_depth: Option<usize>,
}

impl NodeConfigBuilder {
    /// Set this node's pid.
    pub fn pid(mut self, pid: Pid) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Set the cluster topology.
    pub fn cluster(mut self, cluster: ClusterConfig) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Load the cluster topology from a configuration file.
    pub fn cluster_file(self, path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let cluster = ClusterConfig::from_path(path)?;
        Ok(self.cluster(cluster))
    }

    /// Set the listener idle window.
    pub fn idle_timeout(mut self, window: Duration) -> Self {
        self.idle_timeout = Some(Some(window));
        self
    }

    /// Keep the listener waiting for frames indefinitely.
    pub fn idle_timeout_disabled(mut self) -> Self {
        self.idle_timeout = Some(None);
        self
    }

    /// Set the delay between connect attempts to an unreachable peer.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = Some(delay);
        self
    }

    /// Set the maximum wire frame body size.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = Some(size);
        self
    }

    /// Set the capacity of the outbound and inbound queues.
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = Some(depth);
        self
    }

    /// Build the config.
    pub fn build(self) -> Result<NodeConfig, NodeError> {
        Ok(NodeConfig {
            pid: self
                .pid
                .ok_or_else(|| NodeError::Config("pid is required".into()))?,
            cluster: self
                .cluster
                .ok_or_else(|| NodeError::Config("cluster is required".into()))?,
            idle_timeout: self.idle_timeout.unwrap_or(Some(DEFAULT_IDLE_TIMEOUT)),
            reconnect_delay: self.reconnect_delay.unwrap_or(DEFAULT_RECONNECT_DELAY),
            max_frame_size: self.max_frame_size.unwrap_or(EnvelopeCodec::DEFAULT_MAX_FRAME),
            queue_depth: self.queue_depth.unwrap_or(DEFAULT_QUEUE_DEPTH),
        })
    }
}

/// Error returned when sending on a closed outbound queue.
#[derive(Debug, Error)]
#[error("outbound queue is closed")]
pub struct OutboxClosed;

/// Cloneable sink half of the outbound queue.
///
/// The outbound queue closes when every `Outbox` handle has been dropped,
/// the node's own included; that closure is the documented shutdown signal
/// for the dispatcher.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Envelope>,
}

impl Outbox {
    /// Queue an envelope for dispatch.
    pub async fn send(&self, envelope: Envelope) -> Result<(), OutboxClosed> {
        self.tx.send(envelope).await.map_err(|_| OutboxClosed)
    }
}

/// A running cluster node: identity, peer set, the two queues, and the two
/// delivery counters.
#[derive(Debug)]
pub struct Node {
    identity: NodeIdentity,
    peers: PeerSet,
    outbox: Outbox,
    inbox: Mutex<mpsc::Receiver<Envelope>>,
    link_handles: Vec<LinkHandle>,
    sent: Arc<AtomicU64>,
    received: Arc<AtomicU64>,
    idle_timeout: Option<Duration>,
    dispatcher: JoinHandle<()>,
    listener: JoinHandle<()>,
}

impl Node {
    /// Start a node: resolve membership, bind the inbound endpoint, open
    /// the outbound links, and spawn the dispatcher and listener tasks.
    pub async fn start(config: NodeConfig) -> Result<Node, NodeError> {
        let membership = Membership::resolve(config.pid, &config.cluster)?;
        let identity = membership.identity().clone();
        let peers = membership.peers().clone();
        let codec = EnvelopeCodec::with_max_frame(config.max_frame_size);

        let socket = TcpListener::bind(identity.addr())
            .await
            .map_err(|source| NodeError::Bind {
                addr: identity.addr().to_string(),
                source,
            })?;

        let links: Vec<PeerLink> = membership
            .peers()
            .iter()
            .zip(membership.peer_addrs())
            .map(|(pid, addr)| PeerLink::spawn(pid, addr.clone(), config.reconnect_delay))
            .collect();
        let link_handles = links.iter().map(PeerLink::handle).collect();

        let (outbox_tx, outbox_rx) = mpsc::channel(config.queue_depth);
        let (inbox_tx, inbox_rx) = mpsc::channel(config.queue_depth);
        let sent = Arc::new(AtomicU64::new(0));
        let received = Arc::new(AtomicU64::new(0));

        let dispatcher = tokio::spawn(
            Dispatcher::new(
                identity.pid(),
                peers.clone(),
                links,
                codec.clone(),
                outbox_rx,
                Arc::clone(&sent),
            )
            .run(),
        );
        let listener = tokio::spawn(
            Listener::new(
                identity.pid(),
                socket,
                codec,
                config.idle_timeout,
                inbox_tx,
                Arc::clone(&received),
            )
            .run(),
        );

        info!(
            pid = identity.pid(),
            addr = identity.addr(),
            peers = peers.len(),
            "node started"
        );

        Ok(Node {
            identity,
            peers,
            outbox: Outbox { tx: outbox_tx },
            inbox: Mutex::new(inbox_rx),
            link_handles,
            sent,
            received,
            idle_timeout: config.idle_timeout,
            dispatcher,
            listener,
        })
    }

    /// This node's pid.
    pub fn pid(&self) -> Pid {
        self.identity.pid()
    }

    /// The address this node's listener is bound to.
    pub fn addr(&self) -> &str {
        self.identity.addr()
    }

    /// The ordered peer set.
    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    /// A cloneable handle on the outbound queue.
    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    /// Queue an envelope for dispatch.
    pub async fn send(&self, envelope: Envelope) -> Result<(), OutboxClosed> {
        self.outbox.send(envelope).await
    }

    /// Receive the next inbound envelope. Returns `None` once the listener
    /// has closed the inbox (idle window elapsed) and the queue is drained.
    pub async fn recv(&self) -> Option<Envelope> {
        self.inbox.lock().await.recv().await
    }

    /// Messages handed to outbound links so far.
    pub fn messages_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Messages delivered to the inbox so far.
    pub fn messages_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Whether the outbound link to `pid` is currently established.
    pub fn is_peer_connected(&self, pid: Pid) -> bool {
        self.link_handles
            .iter()
            .any(|handle| handle.peer() == pid && handle.is_connected())
    }

    /// Whether every outbound link is currently established.
    pub fn all_peers_connected(&self) -> bool {
        self.link_handles.iter().all(LinkHandle::is_connected)
    }

    /// Shut the node down: drop its outbox handle (once every external
    /// [`Outbox`] clone is gone too, the dispatcher closes each link and
    /// exits) and join both tasks. The listener is joined through its idle
    /// window when one is configured, and aborted when the window is
    /// disabled, since it would otherwise wait forever.
    pub async fn shutdown(self) {
        let Node {
            identity,
            outbox,
            inbox,
            idle_timeout,
            dispatcher,
            listener,
            ..
        } = self;

        drop(outbox);
        drop(inbox);

        if dispatcher.await.is_err() {
            warn!(pid = identity.pid(), "dispatcher panicked");
        }

        match idle_timeout {
            Some(_) => {
                if listener.await.is_err() {
                    warn!(pid = identity.pid(), "listener panicked");
                }
            }
            None => listener.abort(),
        }

        info!(pid = identity.pid(), "node shut down");
    }
}
