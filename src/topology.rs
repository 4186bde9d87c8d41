//! Peer topology selection
//!
//! Three independent configuration signals decide which routing-peer
//! topology the suite stands up, with a strict precedence order: an
//! explicit peer-name list beats the host-network toggle, which beats the
//! default containerized mode. Only the default mode carries the optional
//! VRF augmentation, and only when the deployment under test is not running
//! in native BGP mode.

use std::fmt;
use std::str::FromStr;

use crate::config::SuiteConfig;
use crate::{Error, Result};

/// Recognized roles for external routing peers
///
/// These four names are the complete allow-list for the explicit
/// peer-container configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// iBGP peer one hop from the nodes
    IbgpSingleHop,
    /// iBGP peer behind an extra routed hop
    IbgpMultiHop,
    /// eBGP peer one hop from the nodes
    EbgpSingleHop,
    /// eBGP peer behind an extra routed hop
    EbgpMultiHop,
}

impl PeerRole {
    /// All roles, in the order the default topology provisions them
    pub const ALL: [PeerRole; 4] = [
        PeerRole::IbgpSingleHop,
        PeerRole::IbgpMultiHop,
        PeerRole::EbgpSingleHop,
        PeerRole::EbgpMultiHop,
    ];

    /// The container/peer name for this role
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerRole::IbgpSingleHop => "ibgp-single-hop",
            PeerRole::IbgpMultiHop => "ibgp-multi-hop",
            PeerRole::EbgpSingleHop => "ebgp-single-hop",
            PeerRole::EbgpMultiHop => "ebgp-multi-hop",
        }
    }

    /// Whether the peer sits behind an extra routed hop
    pub fn multi_hop(&self) -> bool {
        matches!(self, PeerRole::IbgpMultiHop | PeerRole::EbgpMultiHop)
    }
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeerRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ibgp-single-hop" => Ok(PeerRole::IbgpSingleHop),
            "ibgp-multi-hop" => Ok(PeerRole::IbgpMultiHop),
            "ebgp-single-hop" => Ok(PeerRole::EbgpSingleHop),
            "ebgp-multi-hop" => Ok(PeerRole::EbgpMultiHop),
            other => Err(Error::configuration(format!(
                "unrecognized peer role {:?} (valid: ibgp-single-hop, ibgp-multi-hop, \
                 ebgp-single-hop, ebgp-multi-hop)",
                other
            ))),
        }
    }
}

/// The resolved choice among provisioning modes
///
/// Exactly one variant is selected per suite run. The VRF augmentation is
/// additive and exists only on the containerized variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    /// Attach to pre-existing external containers matching these roles
    ExplicitList(Vec<PeerRole>),
    /// One routing peer running as a host-local process
    HostNetwork,
    /// Containerized peers on the cluster network
    Containerized {
        /// Also stand up the VRF-isolated peer set
        vrf: bool,
    },
}

impl Topology {
    /// Resolve the topology from runtime configuration
    ///
    /// Precedence: explicit list > host-network toggle > default. Peer
    /// names in the explicit list are validated against the allow-list up
    /// front, before anything is provisioned.
    pub fn resolve(cfg: &SuiteConfig) -> Result<Topology> {
        if !cfg.external_peers.is_empty() {
            let roles = cfg
                .external_peers
                .split(',')
                .map(|name| name.trim().parse())
                .collect::<Result<Vec<PeerRole>>>()?;
            return Ok(Topology::ExplicitList(roles));
        }

        if cfg.run_on_host {
            return Ok(Topology::HostNetwork);
        }

        Ok(Topology::Containerized {
            vrf: !cfg.native_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SuiteConfig {
        SuiteConfig::default()
    }

    #[test]
    fn explicit_list_takes_precedence_over_everything() {
        let config = SuiteConfig {
            external_peers: "ibgp-single-hop,ebgp-multi-hop".to_string(),
            run_on_host: true,
            native_mode: true,
            ..cfg()
        };
        let topology = Topology::resolve(&config).expect("valid roles");
        assert_eq!(
            topology,
            Topology::ExplicitList(vec![PeerRole::IbgpSingleHop, PeerRole::EbgpMultiHop])
        );
    }

    #[test]
    fn explicit_list_preserves_order() {
        let config = SuiteConfig {
            external_peers: "ebgp-multi-hop,ibgp-single-hop".to_string(),
            ..cfg()
        };
        match Topology::resolve(&config).unwrap() {
            Topology::ExplicitList(roles) => {
                assert_eq!(roles, vec![PeerRole::EbgpMultiHop, PeerRole::IbgpSingleHop]);
            }
            other => panic!("expected explicit list, got {:?}", other),
        }
    }

    #[test]
    fn bogus_role_is_a_configuration_error() {
        let config = SuiteConfig {
            external_peers: "ibgp-single-hop,bogus-role".to_string(),
            ..cfg()
        };
        match Topology::resolve(&config) {
            Err(Error::Configuration(msg)) => assert!(msg.contains("bogus-role")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn host_toggle_beats_the_default() {
        let config = SuiteConfig {
            run_on_host: true,
            ..cfg()
        };
        assert_eq!(Topology::resolve(&config).unwrap(), Topology::HostNetwork);
    }

    #[test]
    fn default_mode_carries_vrf_unless_native() {
        assert_eq!(
            Topology::resolve(&cfg()).unwrap(),
            Topology::Containerized { vrf: true }
        );

        let native = SuiteConfig {
            native_mode: true,
            ..cfg()
        };
        assert_eq!(
            Topology::resolve(&native).unwrap(),
            Topology::Containerized { vrf: false }
        );
    }

    #[test]
    fn every_role_round_trips_through_its_name() {
        for role in PeerRole::ALL {
            assert_eq!(role.as_str().parse::<PeerRole>().unwrap(), role);
        }
    }
}
