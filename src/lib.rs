//! Keel E2E - environment orchestrator for the Keel load-balancer test suite
//!
//! Keel is a bare-metal Kubernetes load balancer; its end-to-end suite runs
//! against a live cluster plus a set of external routing peers. This crate is
//! the suite's bootstrap/teardown orchestrator: it decides which peer topology
//! to stand up, builds namespace-scoped configuration updaters for the system
//! under test, publishes the shared handles the test packages consume, and
//! guarantees symmetric, idempotent teardown no matter which topology was
//! chosen or which setup step failed.
//!
//! The test specifications themselves (BGP/L2/webhook assertions) are external
//! collaborators reached through the [`suite::SpecRunner`] trait; this crate
//! owns exactly one suite lifecycle: one setup, one run, one teardown.
//!
//! # Modules
//!
//! - [`config`] - Runtime configuration surface and validation
//! - [`topology`] - Peer topology selection (explicit / host / containerized + VRF)
//! - [`peers`] - Routing-peer provisioning and teardown
//! - [`updater`] - Namespace-scoped custom-resource updaters
//! - [`report`] - Diagnostics reporter
//! - [`context`] - Write-once published suite state
//! - [`suite`] - Suite lifecycle state machine
//! - [`retry`] - Bounded backoff used by the liveness probe
//! - [`error`] - Error taxonomy

#![deny(missing_docs)]

pub mod config;
pub mod context;
pub mod error;
pub mod peers;
pub mod report;
pub mod retry;
pub mod suite;
pub mod topology;
pub mod updater;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Namespace the Keel control plane is installed into
///
/// The primary config updater is bound to this namespace; the auxiliary
/// updater is bound to [`aux_namespace`]'s derivation of it.
pub const KEEL_NAMESPACE: &str = "keel-system";

/// Default port opened by test service pods
pub const DEFAULT_SERVICE_POD_PORT: u16 = 80;

/// Docker network the cluster nodes are attached to
///
/// Containerized peers join this network so no extra routing is needed
/// between them and the nodes.
pub const CLUSTER_NETWORK: &str = "kind";

/// Docker network used by the VRF-isolated peer set
///
/// Must stay disjoint from [`CLUSTER_NETWORK`]; VRF peers reach the nodes
/// through a VRF instead of the shared segment.
pub const VRF_NETWORK: &str = "vrf-net";

/// Derive the auxiliary namespace name from the primary one
///
/// The auxiliary namespace exists only so cross-namespace validation specs
/// have a second, disjoint namespace to target.
pub fn aux_namespace(primary: &str) -> String {
    format!("{}-other", primary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aux_namespace_is_derived_and_disjoint() {
        let aux = aux_namespace(KEEL_NAMESPACE);
        assert_eq!(aux, "keel-system-other");
        assert_ne!(aux, KEEL_NAMESPACE);
    }
}
