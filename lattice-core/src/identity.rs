//! Node identity and peer set types.

use serde::{Deserialize, Serialize};

/// Identifier of a node within the cluster.
///
/// Pids are small positive integers, unique for the cluster's lifetime;
/// 0 is reserved and never valid.
pub type Pid = u32;

/// A node's fixed identity: its pid and the `host:port` address it binds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pid: Pid,
    addr: String,
}

impl NodeIdentity {
    /// Create an identity from a pid and its configured address.
    pub fn new(pid: Pid, addr: impl Into<String>) -> Self {
        Self {
            pid,
            addr: addr.into(),
        }
    }

    /// The node's pid.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// The `host:port` address the node binds for inbound traffic.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl std::fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node {} @ {}", self.pid, self.addr)
    }
}

/// The ordered set of peer pids for one node (every cluster member except
/// the node itself), in configuration order.
///
/// Built once at construction and immutable afterwards. The outbound link
/// table is index-aligned with this set: the link at position `i` targets
/// the peer returned by `index_of`'s inverse at `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSet {
    pids: Vec<Pid>,
}

impl PeerSet {
    /// Build a peer set from an ordered list of pids.
    pub fn new(pids: Vec<Pid>) -> Self {
        Self { pids }
    }

    /// Number of peers.
    pub fn len(&self) -> usize {
        self.pids.len()
    }

    /// True for a single-node cluster.
    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    /// Iterate the peer pids in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = Pid> + '_ {
        self.pids.iter().copied()
    }

    /// Whether `pid` is a member of this set.
    pub fn contains(&self, pid: Pid) -> bool {
        self.pids.contains(&pid)
    }

    /// Position of `pid` in the set, if present.
    ///
    /// A linear scan; peer sets are small.
    pub fn index_of(&self, pid: Pid) -> Option<usize> {
        self.pids.iter().position(|&p| p == pid)
    }

    /// The pids as a slice, in configuration order.
    pub fn as_slice(&self) -> &[Pid] {
        &self.pids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_accessors() {
        let identity = NodeIdentity::new(3, "127.0.0.1:9003");
        assert_eq!(identity.pid(), 3);
        assert_eq!(identity.addr(), "127.0.0.1:9003");
        assert_eq!(format!("{}", identity), "node 3 @ 127.0.0.1:9003");
    }

    #[test]
    fn test_peer_set_preserves_order() {
        let peers = PeerSet::new(vec![4, 1, 7]);
        let collected: Vec<Pid> = peers.iter().collect();
        assert_eq!(collected, vec![4, 1, 7]);
        assert_eq!(peers.as_slice(), &[4, 1, 7]);
    }

    #[test]
    fn test_peer_set_index_of() {
        let peers = PeerSet::new(vec![4, 1, 7]);
        assert_eq!(peers.index_of(4), Some(0));
        assert_eq!(peers.index_of(7), Some(2));
        assert_eq!(peers.index_of(2), None);
        assert!(peers.contains(1));
        assert!(!peers.contains(2));
    }

    #[test]
    fn test_peer_set_empty() {
        let peers = PeerSet::new(Vec::new());
        assert!(peers.is_empty());
        assert_eq!(peers.len(), 0);
        assert_eq!(peers.index_of(1), None);
    }
}
