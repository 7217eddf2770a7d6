//! Lattice Core - Fundamental types for the lattice cluster transport.
//!
//! This crate provides the data types shared by every part of the system:
//!
//! - [`envelope`] - The envelope, the unit of communication, with its
//!   tagged unicast/broadcast destination
//! - [`identity`] - Node identity and the ordered, immutable peer set
//! - [`config`] - The static cluster configuration schema and its
//!   validation
//!
//! Nothing here touches the network; the machinery lives in `lattice-net`.
//!
//! # Example
//!
//! ```rust
//! use lattice_core::{ClusterConfig, Destination, Envelope, ServerEntry};
//!
//! let cluster = ClusterConfig::new(vec![
//!     ServerEntry::new(1, "127.0.0.1:9001"),
//!     ServerEntry::new(2, "127.0.0.1:9002"),
//! ])
//! .unwrap();
//! assert_eq!(cluster.address_of(2), Some("127.0.0.1:9002"));
//!
//! let envelope = Envelope::broadcast(1, "hello there").with_correlation_id(7);
//! assert_eq!(envelope.destination, Destination::Broadcast);
//! ```

pub mod config;
pub mod envelope;
pub mod identity;

pub use config::{ClusterConfig, ConfigError, ServerEntry};
pub use envelope::{Destination, Envelope};
pub use identity::{NodeIdentity, PeerSet, Pid};
