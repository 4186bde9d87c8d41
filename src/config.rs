//! Runtime configuration surface for the suite
//!
//! All scalar/string configuration is consumed exactly once at startup and
//! carried in [`SuiteConfig`]. Flag parsing itself is an external concern;
//! the e2e entry point loads the same surface from environment variables
//! (see [`SuiteConfig::from_env`]), and nothing else in the crate re-parses
//! any of these values.

use std::net::IpAddr;
use std::path::PathBuf;

use crate::{Error, Result, DEFAULT_SERVICE_POD_PORT, KEEL_NAMESPACE};

/// Name of the presence-only environment toggle selecting host-network
/// peer mode
///
/// Setting this variable (to any value) is equivalent to requesting a
/// single routing peer running as a host-local process instead of a
/// container.
pub const RUN_ON_HOST_ENV: &str = "RUN_PEER_ON_HOST_NETWORK";

/// Suite-wide runtime configuration
///
/// Mirrors the flag surface of the suite one-to-one; every field is plain
/// data. Validation happens in [`SuiteConfig::validate`], before any
/// cluster or container resource is touched.
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    /// Comma-separated names of pre-existing external peer containers
    ///
    /// Non-empty takes precedence over every other topology input. Valid
    /// names are the four roles in [`crate::topology::PeerRole`].
    pub external_peers: String,
    /// Run the routing peer as a host-local process (env-driven toggle)
    pub run_on_host: bool,
    /// The deployment under test runs BGP natively, without VRF isolation
    ///
    /// Suppresses the VRF peer-set augmentation in the default topology.
    pub native_mode: bool,
    /// IPv4 service address range (CIDR)
    pub ipv4_service_range: String,
    /// IPv6 service address range (CIDR)
    pub ipv6_service_range: String,
    /// Comma-separated node-side interface names (interface selector specs)
    pub node_nics: String,
    /// Comma-separated local interface names (interface selector specs)
    pub local_nics: String,
    /// Directory test-failure diagnostics are dumped into
    pub report_path: PathBuf,
    /// Namespace the metrics stack (Prometheus) runs in, if any
    pub metrics_namespace: String,
    /// Port number that test service pods open
    pub service_pod_port: u16,
    /// Skip docker invocations (the BGP daemon runs directly on the host)
    pub skip_docker: bool,
    /// Path to the kubeconfig used by the reporter and the client factory
    pub kubeconfig: Option<PathBuf>,
    /// Namespace Keel is installed into
    pub namespace: String,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            external_peers: String::new(),
            run_on_host: false,
            native_mode: false,
            ipv4_service_range: String::new(),
            ipv6_service_range: String::new(),
            node_nics: String::new(),
            local_nics: String::new(),
            report_path: PathBuf::from("/tmp/report"),
            metrics_namespace: "monitoring".to_string(),
            service_pod_port: DEFAULT_SERVICE_POD_PORT,
            skip_docker: false,
            kubeconfig: None,
            namespace: KEEL_NAMESPACE.to_string(),
        }
    }
}

impl SuiteConfig {
    /// Load the configuration surface from `KEEL_E2E_*` environment
    /// variables, falling back to defaults
    ///
    /// `KUBECONFIG` and [`RUN_ON_HOST_ENV`] are honored the way the suite
    /// has always consumed them: `KUBECONFIG` as a path, the host toggle as
    /// presence-only.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok();
        let mut cfg = Self::default();

        if let Some(v) = var("KEEL_E2E_EXTERNAL_PEERS") {
            cfg.external_peers = v;
        }
        cfg.run_on_host = std::env::var_os(RUN_ON_HOST_ENV).is_some();
        cfg.native_mode = var("KEEL_E2E_NATIVE_MODE").is_some_and(|v| v == "true" || v == "1");
        if let Some(v) = var("KEEL_E2E_IPV4_SERVICE_RANGE") {
            cfg.ipv4_service_range = v;
        }
        if let Some(v) = var("KEEL_E2E_IPV6_SERVICE_RANGE") {
            cfg.ipv6_service_range = v;
        }
        if let Some(v) = var("KEEL_E2E_NODE_NICS") {
            cfg.node_nics = v;
        }
        if let Some(v) = var("KEEL_E2E_LOCAL_NICS") {
            cfg.local_nics = v;
        }
        if let Some(v) = var("KEEL_E2E_REPORT_PATH") {
            cfg.report_path = PathBuf::from(v);
        }
        if let Some(v) = var("KEEL_E2E_METRICS_NAMESPACE") {
            cfg.metrics_namespace = v;
        }
        if let Some(v) = var("KEEL_E2E_SERVICE_POD_PORT") {
            if let Ok(port) = v.parse() {
                cfg.service_pod_port = port;
            }
        }
        cfg.skip_docker = var("KEEL_E2E_SKIP_DOCKER").is_some_and(|v| v == "true" || v == "1");
        cfg.kubeconfig = var("KUBECONFIG").map(PathBuf::from);

        cfg
    }

    /// Range/format-check the required inputs
    ///
    /// Fails fast with a configuration error; the lifecycle controller
    /// calls this before creating any resource.
    pub fn validate(&self) -> Result<()> {
        if self.kubeconfig.is_none() {
            return Err(Error::configuration("KUBECONFIG env var not set"));
        }

        let (v4, _) = parse_cidr(&self.ipv4_service_range)?;
        if !v4.is_ipv4() {
            return Err(Error::configuration(format!(
                "ipv4 service range {:?} is not an IPv4 CIDR",
                self.ipv4_service_range
            )));
        }

        let (v6, _) = parse_cidr(&self.ipv6_service_range)?;
        if !v6.is_ipv6() {
            return Err(Error::configuration(format!(
                "ipv6 service range {:?} is not an IPv6 CIDR",
                self.ipv6_service_range
            )));
        }

        Ok(())
    }
}

/// Parse an address range in CIDR notation into (address, prefix length)
pub fn parse_cidr(s: &str) -> Result<(IpAddr, u8)> {
    let (addr, prefix) = s
        .split_once('/')
        .ok_or_else(|| Error::configuration(format!("{:?} is not in CIDR notation", s)))?;

    let addr: IpAddr = addr
        .parse()
        .map_err(|e| Error::configuration(format!("bad address in {:?}: {}", s, e)))?;
    let prefix: u8 = prefix
        .parse()
        .map_err(|e| Error::configuration(format!("bad prefix length in {:?}: {}", s, e)))?;

    let max = if addr.is_ipv4() { 32 } else { 128 };
    if prefix > max {
        return Err(Error::configuration(format!(
            "prefix length /{} out of range for {:?}",
            prefix, s
        )));
    }

    Ok((addr, prefix))
}

/// Split a comma-separated configuration value into its elements
///
/// Note the quirk, preserved as observed suite behavior: an empty input
/// yields a single empty-string element, not an empty list. Spec packages
/// that consume interface lists have always seen `[""]` for "unset".
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',').map(str::to_string).collect()
}
