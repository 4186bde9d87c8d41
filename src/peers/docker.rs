//! Docker-backed peer runtime
//!
//! Drives the `docker` CLI to create, probe, and remove routing-peer
//! containers. Cluster-network peers join the kind network directly; VRF
//! peers get their own network, created on demand; the host-network peer
//! is a container sharing the host's network namespace.

use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{PeerLocation, PeerRuntime, RoutingPeer};
use crate::topology::PeerRole;
use crate::{Error, Result};

/// Default routing-daemon image for suite-created peers
const DEFAULT_PEER_IMAGE: &str = "quay.io/frrouting/frr:9.1.0";

/// Label stamped on every container the suite creates
///
/// Lets a human (or a later cleanup pass) find leftovers from a run that
/// failed mid-provisioning.
const PEER_LABEL: &str = "app=keel-e2e-peer";

/// Container name of the host-network peer
const HOST_PEER_NAME: &str = "host-peer";

/// [`PeerRuntime`] implementation backed by the `docker` CLI
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    image: String,
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self {
            image: DEFAULT_PEER_IMAGE.to_string(),
        }
    }
}

impl DockerRuntime {
    /// Create a runtime using the default peer image
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a runtime with a custom peer image
    pub fn with_image(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
        }
    }

    async fn docker(&self, args: &[&str]) -> Result<Output> {
        debug!(args = ?args, "docker");
        let output = Command::new("docker").args(args).output().await?;
        Ok(output)
    }

    /// Run docker and fail with a setup error on non-zero exit
    async fn docker_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.docker(args).await?;
        if !output.status.success() {
            return Err(Error::setup(format!(
                "docker {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Create the docker network if it does not exist yet
    async fn ensure_network(&self, network: &str) -> Result<()> {
        let inspect = self.docker(&["network", "inspect", network]).await?;
        if inspect.status.success() {
            return Ok(());
        }

        let create = self.docker(&["network", "create", network]).await?;
        if create.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&create.stderr);
        // Racing a concurrent create is fine; anything else is not.
        if stderr.contains("already exists") {
            return Ok(());
        }
        Err(Error::setup(format!(
            "docker network create {} failed: {}",
            network,
            stderr.trim()
        )))
    }

    /// Read the container's address on the given network
    async fn container_address(&self, name: &str, network: &str) -> Result<String> {
        let fmt = format!(
            "{{{{(index .NetworkSettings.Networks {:?}).IPAddress}}}}",
            network
        );
        self.docker_checked(&["inspect", "-f", &fmt, name]).await
    }

    /// First address of a container regardless of network
    async fn any_address(&self, name: &str) -> Result<Option<String>> {
        let out = self
            .docker_checked(&[
                "inspect",
                "-f",
                "{{range .NetworkSettings.Networks}}{{.IPAddress}} {{end}}",
                name,
            ])
            .await?;
        Ok(out.split_whitespace().next().map(str::to_string))
    }
}

/// Container name for a suite-created peer
fn container_name(role: PeerRole, vrf: bool) -> String {
    if vrf {
        format!("{}-vrf", role)
    } else {
        role.to_string()
    }
}

#[async_trait]
impl PeerRuntime for DockerRuntime {
    async fn launch_container(
        &self,
        role: PeerRole,
        network: &str,
        vrf: bool,
    ) -> Result<RoutingPeer> {
        self.ensure_network(network).await?;

        let name = container_name(role, vrf);
        self.docker_checked(&[
            "run",
            "-d",
            "--privileged",
            "--name",
            &name,
            "--network",
            network,
            "--label",
            PEER_LABEL,
            &self.image,
        ])
        .await?;

        let address = self.container_address(&name, network).await?;
        Ok(RoutingPeer {
            name,
            role,
            address: Some(address),
            vrf,
            location: PeerLocation::Container {
                network: network.to_string(),
            },
        })
    }

    async fn launch_host_daemon(&self) -> Result<RoutingPeer> {
        // A container on the host netns binds the real BGP port; a port
        // conflict surfaces here as a failed run.
        self.docker_checked(&[
            "run",
            "-d",
            "--privileged",
            "--network",
            "host",
            "--name",
            HOST_PEER_NAME,
            "--label",
            PEER_LABEL,
            &self.image,
        ])
        .await?;

        Ok(RoutingPeer {
            name: HOST_PEER_NAME.to_string(),
            role: PeerRole::IbgpSingleHop,
            address: None,
            vrf: false,
            location: PeerLocation::HostNetwork,
        })
    }

    async fn attach_external(&self, role: PeerRole) -> Result<RoutingPeer> {
        let name = role.to_string();
        let output = self
            .docker(&["inspect", "-f", "{{.State.Running}}", &name])
            .await?;
        if !output.status.success() {
            return Err(Error::setup(format!(
                "external peer container {:?} not found",
                name
            )));
        }
        if String::from_utf8_lossy(&output.stdout).trim() != "true" {
            return Err(Error::setup(format!(
                "external peer container {:?} exists but is not running",
                name
            )));
        }

        let address = self.any_address(&name).await?;
        Ok(RoutingPeer {
            name,
            role,
            address,
            vrf: false,
            location: PeerLocation::External,
        })
    }

    async fn probe(&self, peer: &RoutingPeer) -> Result<()> {
        self.docker_checked(&["exec", &peer.name, "vtysh", "-c", "show version"])
            .await?;
        Ok(())
    }

    async fn remove(&self, peer: &RoutingPeer) -> Result<()> {
        // External peers are referenced, never owned; leave them running.
        if peer.location == PeerLocation::External {
            debug!(peer = %peer.name, "external peer left in place");
            return Ok(());
        }

        let output = self.docker(&["rm", "-f", &peer.name]).await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("No such container") {
            debug!(peer = %peer.name, "peer already gone");
            return Ok(());
        }
        Err(Error::teardown(format!(
            "docker rm {} failed: {}",
            peer.name,
            stderr.trim()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_names_keep_the_sets_disjoint() {
        assert_eq!(
            container_name(PeerRole::IbgpSingleHop, false),
            "ibgp-single-hop"
        );
        assert_eq!(
            container_name(PeerRole::IbgpSingleHop, true),
            "ibgp-single-hop-vrf"
        );
    }

    #[test]
    fn custom_image_is_used() {
        let runtime = DockerRuntime::with_image("frr:local");
        assert_eq!(runtime.image, "frr:local");
    }
}
