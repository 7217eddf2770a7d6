//! Membership resolution: from static configuration to one node's view of
//! the cluster.
//!
//! Resolution runs once at node construction and produces an immutable
//! value: the node's own identity plus the ordered peer set and the
//! parallel list of peer addresses. There is no discovery and no mutation
//! afterwards; the peer set is fixed for the node's lifetime.

use thiserror::Error;

use lattice_core::{ClusterConfig, NodeIdentity, PeerSet, Pid};

/// Errors resolving a node's membership.
#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("pid {0} is not present in the cluster configuration")]
    UnknownPid(Pid),
}

/// One node's resolved view of the cluster.
///
/// `peer_addrs()[i]` is the address of `peers().as_slice()[i]`; the
/// outbound link table is built in the same order, so the three stay
/// index-aligned for the node's lifetime.
#[derive(Debug, Clone)]
pub struct Membership {
    identity: NodeIdentity,
    peers: PeerSet,
    peer_addrs: Vec<String>,
}

impl Membership {
    /// Resolve membership for `pid` against a validated configuration.
    ///
    /// The peer set is every configured pid other than `pid`, in
    /// configuration order. A `pid` absent from the configuration is a
    /// fatal error: the node cannot know its own address.
    pub fn resolve(pid: Pid, cluster: &ClusterConfig) -> Result<Self, MembershipError> {
        let own_addr = cluster
            .address_of(pid)
            .ok_or(MembershipError::UnknownPid(pid))?
            .to_string();

        let mut peers = Vec::with_capacity(cluster.len().saturating_sub(1));
        let mut peer_addrs = Vec::with_capacity(cluster.len().saturating_sub(1));
        for entry in cluster.servers() {
            if entry.pid != pid {
                peers.push(entry.pid);
                peer_addrs.push(entry.addr.clone());
            }
        }

        Ok(Self {
            identity: NodeIdentity::new(pid, own_addr),
            peers: PeerSet::new(peers),
            peer_addrs,
        })
    }

    /// The node's own identity.
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// The ordered peer set.
    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    /// Peer addresses, index-aligned with [`Membership::peers`].
    pub fn peer_addrs(&self) -> &[String] {
        &self.peer_addrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::ServerEntry;

    fn test_cluster() -> ClusterConfig {
        ClusterConfig::new(vec![
            ServerEntry::new(1, "127.0.0.1:9001"),
            ServerEntry::new(2, "127.0.0.1:9002"),
            ServerEntry::new(3, "127.0.0.1:9003"),
        ])
        .unwrap()
    }

    #[test]
    fn test_resolve_excludes_self_preserves_order() {
        let membership = Membership::resolve(2, &test_cluster()).unwrap();

        assert_eq!(membership.identity().pid(), 2);
        assert_eq!(membership.identity().addr(), "127.0.0.1:9002");
        assert_eq!(membership.peers().as_slice(), &[1, 3]);
    }

    #[test]
    fn test_peer_addresses_are_index_aligned() {
        let membership = Membership::resolve(1, &test_cluster()).unwrap();

        assert_eq!(membership.peers().as_slice(), &[2, 3]);
        assert_eq!(
            membership.peer_addrs(),
            &["127.0.0.1:9002".to_string(), "127.0.0.1:9003".to_string()]
        );
    }

    #[test]
    fn test_unknown_pid_is_fatal() {
        let result = Membership::resolve(9, &test_cluster());
        assert!(matches!(result, Err(MembershipError::UnknownPid(9))));
    }

    #[test]
    fn test_single_node_cluster_has_no_peers() {
        let cluster = ClusterConfig::new(vec![ServerEntry::new(1, "127.0.0.1:9001")]).unwrap();
        let membership = Membership::resolve(1, &cluster).unwrap();
        assert!(membership.peers().is_empty());
        assert!(membership.peer_addrs().is_empty());
    }
}
