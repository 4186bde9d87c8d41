//! Write-once published suite state
//!
//! There is no ambient global state: the lifecycle controller builds one
//! [`SuiteContext`] during its Publishing phase and hands it to the
//! spec-execution collaborator by shared reference. The struct is fully
//! populated at construction and never mutated afterwards, which keeps the
//! "write once, read many, no lock needed" contract for every spec package
//! that consumes it.
//!
//! The updaters are the one exception to pure immutability: they stay
//! usable by spec packages (apply/clean of Keel configuration), so they
//! ride behind an async mutex. The controller keeps its own handles for
//! teardown.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::split_list;
use crate::peers::PeerSet;
use crate::report::Reporter;
use crate::updater::Updater;

/// Shared, lockable handle to a namespace-scoped updater
pub type SharedUpdater = Arc<Mutex<Box<dyn Updater + Send>>>;

/// The cross-cutting values exposed to every spec package
///
/// Built exactly once, after provisioning succeeds and before any spec
/// runs. Spec packages hold non-owning references; the lifecycle
/// controller remains the sole owner of the underlying resources.
pub struct SuiteContext {
    /// The provisioned routing peers, in provisioning order
    pub peers: PeerSet,
    /// Updater bound to the Keel namespace
    pub updater: SharedUpdater,
    /// Updater bound to the auxiliary (cross-namespace validation) namespace
    pub updater_other_ns: SharedUpdater,
    /// Suite-wide diagnostics reporter
    pub reporter: Arc<Reporter>,
    /// Directory failure diagnostics are dumped into
    pub report_path: PathBuf,
    /// Namespace the metrics stack runs in
    pub metrics_namespace: String,
    /// Node-side interface names (split from the configured comma list)
    pub node_nics: Vec<String>,
    /// Local interface names (split from the configured comma list)
    pub local_nics: Vec<String>,
    /// Port test service pods open
    pub service_pod_port: u16,
    /// The BGP daemon runs on the host, skip docker invocations
    pub skip_docker: bool,
}

impl SuiteContext {
    /// Publish the suite state: pure assignment of every slot at once
    ///
    /// Interface lists arrive as the raw comma-separated configuration
    /// values and are split here; an empty value yields a single
    /// empty-string element (see [`split_list`]). Performs no validation -
    /// calling this with incomplete inputs is a configuration bug in the
    /// lifecycle controller, which is also the only caller and calls it
    /// exactly once.
    #[allow(clippy::too_many_arguments)]
    pub fn publish(
        peers: PeerSet,
        updater: SharedUpdater,
        updater_other_ns: SharedUpdater,
        reporter: Reporter,
        metrics_namespace: impl Into<String>,
        node_nics: &str,
        local_nics: &str,
        service_pod_port: u16,
        skip_docker: bool,
    ) -> Arc<Self> {
        let report_path = reporter.report_path().to_path_buf();
        Arc::new(Self {
            peers,
            updater,
            updater_other_ns,
            reporter: Arc::new(reporter),
            report_path,
            metrics_namespace: metrics_namespace.into(),
            node_nics: split_list(node_nics),
            local_nics: split_list(local_nics),
            service_pod_port,
            skip_docker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::updater::Updater;
    use crate::Result;
    use async_trait::async_trait;

    struct NullUpdater(&'static str);

    #[async_trait]
    impl Updater for NullUpdater {
        fn namespace(&self) -> &str {
            self.0
        }
        async fn apply(&mut self, _manifest: &str) -> Result<()> {
            Ok(())
        }
        async fn clean(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn shared(ns: &'static str) -> SharedUpdater {
        Arc::new(Mutex::new(Box::new(NullUpdater(ns)) as Box<dyn Updater + Send>))
    }

    /// Readers never see a half-populated context: construction takes
    /// every slot at once, so "published" and "fully populated" are the
    /// same thing.
    #[tokio::test]
    async fn publish_populates_every_slot() {
        let reporter = Reporter::new(None, "/tmp/report", "keel-system");
        let ctx = SuiteContext::publish(
            PeerSet::new(),
            shared("keel-system"),
            shared("keel-system-other"),
            reporter,
            "monitoring",
            "eth0,eth1",
            "",
            80,
            false,
        );

        assert_eq!(ctx.metrics_namespace, "monitoring");
        assert_eq!(ctx.node_nics, vec!["eth0", "eth1"]);
        // The documented empty-split quirk survives publication.
        assert_eq!(ctx.local_nics, vec![""]);
        assert_eq!(ctx.report_path, PathBuf::from("/tmp/report"));
        assert_eq!(ctx.service_pod_port, 80);
        assert_eq!(ctx.updater.lock().await.namespace(), "keel-system");
        assert_eq!(
            ctx.updater_other_ns.lock().await.namespace(),
            "keel-system-other"
        );
    }
}
