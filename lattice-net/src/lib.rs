//! Networking layer for the lattice cluster transport.
//!
//! This crate turns a static cluster configuration into a running node:
//! one outbound link per peer, one bound inbound endpoint, and two
//! long-running tasks moving envelopes between the queues and the wire.
//!
//! # Architecture
//!
//! The layer is organized into five components:
//!
//! 1. **Membership** (`membership.rs`) - static configuration resolved into
//!    one node's identity, peer set and peer addresses
//! 2. **Wire** (`wire.rs`) - length-prefixed JSON envelope frames
//! 3. **Links** (`link.rs`) - one self-healing outbound TCP link per peer
//! 4. **Dispatch** (`dispatch.rs`) - the outbound queue consumer: unicast
//!    routing and broadcast fan-out
//! 5. **Listen** (`listen.rs`) - the inbound endpoint: accept, decode,
//!    deliver, and the idle-timeout termination path
//!
//! The **node handle** (`node.rs`) assembles all of the above behind a
//! small public surface.
//!
//! # Example
//!
//! ```ignore
//! use lattice_core::{ClusterConfig, Envelope};
//! use lattice_net::{Node, NodeConfig};
//!
//! let config = NodeConfig::builder()
//!     .pid(1)
//!     .cluster_file("./cluster.json")?
//!     .build()?;
//!
//! let node = Node::start(config).await?;
//! node.send(Envelope::broadcast(node.pid(), "hello there")).await?;
//! while let Some(envelope) = node.recv().await {
//!     println!("from {}: {}", envelope.sender, envelope.payload);
//! }
//! ```

pub mod dispatch;
pub mod link;
pub mod listen;
pub mod membership;
pub mod node;
pub mod wire;

pub use dispatch::{DispatchError, Dispatcher};
pub use link::{LinkError, LinkHandle, PeerLink};
pub use listen::Listener;
pub use membership::{Membership, MembershipError};
pub use node::{Node, NodeConfig, NodeConfigBuilder, NodeError, Outbox, OutboxClosed};
pub use wire::{EnvelopeCodec, WireError};
