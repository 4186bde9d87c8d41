//! Routing-peer provisioning and teardown
//!
//! The suite talks BGP to a set of external routing peers. Depending on the
//! resolved [`Topology`] these are pre-existing external containers, a
//! single daemon on the host network, or containers the suite creates on
//! the cluster network (optionally augmented with a VRF-isolated set on a
//! disjoint network).
//!
//! The actual container/process plumbing sits behind the [`PeerRuntime`]
//! trait; [`DockerRuntime`] is the real implementation.

mod docker;

pub use docker::DockerRuntime;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::retry::{retry_with_backoff, RetryConfig};
use crate::topology::{PeerRole, Topology};
use crate::{Error, Result, CLUSTER_NETWORK, VRF_NETWORK};

/// Where a peer's daemon runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerLocation {
    /// Container created by the suite on the named docker network
    Container {
        /// Docker network the container is attached to
        network: String,
    },
    /// Container sharing the host's network namespace
    HostNetwork,
    /// Pre-existing container the suite attached to but does not own
    External,
}

/// Handle to one external routing peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingPeer {
    /// Container name (also the peer's identity for teardown)
    pub name: String,
    /// Role the peer plays in the topology
    pub role: PeerRole,
    /// Address the nodes reach the peer at, once known
    pub address: Option<String>,
    /// Peer belongs to the VRF-isolated augmentation set
    pub vrf: bool,
    /// Where the daemon runs
    pub location: PeerLocation,
}

/// Ordered collection of routing-peer handles
///
/// Built once during setup, read-only for the spec packages, drained once
/// during teardown. The suite lifecycle controller is the sole owner.
#[derive(Debug, Clone, Default)]
pub struct PeerSet {
    peers: Vec<RoutingPeer>,
}

impl PeerSet {
    /// Create an empty peer set
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of peers in the set
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// True when no peers are registered
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Iterate the peers in provisioning order
    pub fn iter(&self) -> impl Iterator<Item = &RoutingPeer> {
        self.peers.iter()
    }

    /// Peers of the primary (non-VRF) set, in order
    pub fn default_peers(&self) -> impl Iterator<Item = &RoutingPeer> {
        self.peers.iter().filter(|p| !p.vrf)
    }

    /// Peers of the VRF augmentation set, in order
    pub fn vrf_peers(&self) -> impl Iterator<Item = &RoutingPeer> {
        self.peers.iter().filter(|p| p.vrf)
    }

    fn push(&mut self, peer: RoutingPeer) {
        self.peers.push(peer);
    }

    fn drain_where(&mut self, vrf: bool) -> Vec<RoutingPeer> {
        let (drained, kept) = std::mem::take(&mut self.peers)
            .into_iter()
            .partition(|p| p.vrf == vrf);
        self.peers = kept;
        drained
    }
}

/// Container/process operations a peer backend must support
///
/// The docker-backed implementation is [`DockerRuntime`]; lifecycle tests
/// substitute a stub.
#[async_trait]
pub trait PeerRuntime: Send + Sync {
    /// Create a containerized peer on the given network
    async fn launch_container(&self, role: PeerRole, network: &str, vrf: bool)
        -> Result<RoutingPeer>;

    /// Create the single host-network peer
    ///
    /// Fails with a setup error when the host cannot run it (typically a
    /// port conflict on the BGP port).
    async fn launch_host_daemon(&self) -> Result<RoutingPeer>;

    /// Attach to a pre-existing external container for the given role
    async fn attach_external(&self, role: PeerRole) -> Result<RoutingPeer>;

    /// Check that the peer's daemon answers
    async fn probe(&self, peer: &RoutingPeer) -> Result<()>;

    /// Remove the peer; a peer that is already gone counts as removed
    async fn remove(&self, peer: &RoutingPeer) -> Result<()>;
}

/// Roles provisioned on the VRF network in the default topology
const VRF_ROLES: [PeerRole; 2] = [PeerRole::IbgpSingleHop, PeerRole::EbgpSingleHop];

/// Stand up the peers for the resolved topology
///
/// Peers are registered into `peers` as soon as they exist, so on a
/// mid-provisioning failure the caller still holds handles to whatever
/// partially started and a later teardown pass can remove it. No rollback
/// runs here; a setup failure aborts the suite with the partial state left
/// in place for inspection.
///
/// Every peer must answer its liveness probe (bounded by `probe_retry`)
/// before this returns success.
pub async fn provision<R>(
    runtime: &R,
    topology: &Topology,
    peers: &mut PeerSet,
    probe_retry: &RetryConfig,
) -> Result<()>
where
    R: PeerRuntime + ?Sized,
{
    match topology {
        Topology::ExplicitList(roles) => {
            for role in roles {
                let peer = runtime.attach_external(*role).await?;
                info!(peer = %peer.name, "attached external peer");
                peers.push(peer);
            }
        }
        Topology::HostNetwork => {
            let peer = runtime.launch_host_daemon().await?;
            info!(peer = %peer.name, "started host-network peer");
            peers.push(peer);
        }
        Topology::Containerized { vrf } => {
            for role in PeerRole::ALL {
                let peer = runtime.launch_container(role, CLUSTER_NETWORK, false).await?;
                info!(peer = %peer.name, network = CLUSTER_NETWORK, "started peer container");
                peers.push(peer);
            }
            if *vrf {
                for role in VRF_ROLES {
                    let peer = runtime.launch_container(role, VRF_NETWORK, true).await?;
                    info!(peer = %peer.name, network = VRF_NETWORK, "started VRF peer container");
                    peers.push(peer);
                }
            }
        }
    }

    probe_all(runtime, peers, probe_retry).await
}

/// Wait until every registered peer answers its liveness probe
async fn probe_all<R>(runtime: &R, peers: &PeerSet, config: &RetryConfig) -> Result<()>
where
    R: PeerRuntime + ?Sized,
{
    for peer in peers.iter() {
        retry_with_backoff(config, &format!("probe {}", peer.name), || {
            runtime.probe(peer)
        })
        .await
        .map_err(|e| {
            Error::setup(format!(
                "peer {} never answered its liveness probe: {}",
                peer.name, e
            ))
        })?;
        debug!(peer = %peer.name, "peer is live");
    }
    Ok(())
}

/// Tear down one half of the peer set (default or VRF), best-effort
///
/// Every peer of the selected half is removed from the runtime; removal
/// failures are collected, not short-circuited. Peers that are already
/// gone count as removed, which is what makes calling this twice safe. A
/// peer whose removal hard-fails stays registered in the set so a later
/// pass can retry it.
pub async fn teardown<R>(runtime: &R, peers: &mut PeerSet, vrf: bool) -> Result<()>
where
    R: PeerRuntime + ?Sized,
{
    let mut failures = Vec::new();

    for peer in peers.drain_where(vrf) {
        match runtime.remove(&peer).await {
            Ok(()) => debug!(peer = %peer.name, "peer removed"),
            Err(e) => {
                failures.push(format!("{}: {}", peer.name, e));
                peers.push(peer);
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::teardown(format!(
            "failed to remove peers: {}",
            failures.join(", ")
        )))
    }
}
